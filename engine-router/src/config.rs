//! Configuration for the engine runtime.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use simhost_engine_protocol::RequestKind;
use simhost_model_cache::{FsBlobStore, ModelBlobCache};

use crate::error::ConfigError;

/// Top-level configuration. Every field has a default, so an empty file is
/// a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Persistent model cache.
    pub cache: CacheConfig,

    /// Request routing.
    pub router: RouterConfig,

    /// Model source.
    pub model: ModelConfig,
}

impl EngineConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Set the cache root directory.
    pub fn with_cache_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.cache.root = root.into();
        self
    }

    /// Set how long callers wait for a reply.
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.router.response_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set how long `Initialize` callers wait, model download included.
    pub fn with_initialize_timeout(mut self, timeout: Duration) -> Self {
        self.router.initialize_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the default model URL.
    pub fn with_model_url(mut self, url: impl Into<String>) -> Self {
        self.model.url = Some(url.into());
        self
    }
}

/// Configuration for the persistent model cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding cached stores.
    pub root: PathBuf,

    /// Name of the store holding model payloads.
    pub store_name: String,

    /// Largest payload accepted; bigger writes fail (and are re-fetched on
    /// demand instead).
    pub max_payload_bytes: Option<u64>,
}

impl CacheConfig {
    /// Build the cache this configuration describes.
    pub fn build(&self) -> ModelBlobCache {
        let mut store = FsBlobStore::new(&self.root);
        if let Some(max) = self.max_payload_bytes {
            store = store.with_max_payload_bytes(max);
        }
        ModelBlobCache::new(Arc::new(store), self.store_name.clone())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: dirs::cache_dir().unwrap_or_default().join("simhost/models"),
            store_name: simhost_model_cache::DEFAULT_STORE_NAME.to_string(),
            max_payload_bytes: None,
        }
    }
}

/// Configuration for request routing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// How long a caller waits for a reply before giving up.
    pub response_timeout_ms: u64,

    /// Reply timeout for `Initialize`, which may include a full model
    /// download. Keep it above `model.fetch_timeout_secs`.
    pub initialize_timeout_ms: u64,
}

impl RouterConfig {
    /// Reply timeout as a [`Duration`].
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Reply timeout for a request of `kind`.
    pub fn timeout_for(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::Initialize => Duration::from_millis(self.initialize_timeout_ms),
            _ => self.response_timeout(),
        }
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: 30_000,
            initialize_timeout_ms: 180_000,
        }
    }
}

/// Configuration for the model source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model loaded by [`crate::EngineRuntime::initialize_default`].
    pub url: Option<String>,

    /// Timeout for a single model download.
    pub fetch_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            url: None,
            fetch_timeout_secs: 120,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_empty_document_is_default() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.router.response_timeout(), Duration::from_secs(30));
        assert!(
            config.router.timeout_for(RequestKind::Initialize)
                > Duration::from_secs(config.model.fetch_timeout_secs)
        );
        assert_eq!(
            config.router.timeout_for(RequestKind::Status),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_partial_document() {
        let config = EngineConfig::from_toml_str(
            r#"
            [cache]
            root = "/var/cache/simhost"
            max_payload_bytes = 1048576

            [router]
            response_timeout_ms = 250
            initialize_timeout_ms = 5000

            [model]
            url = "https://models.example/encoder.onnx"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.root, PathBuf::from("/var/cache/simhost"));
        assert_eq!(config.cache.store_name, "model-cache");
        assert_eq!(config.cache.max_payload_bytes, Some(1_048_576));
        assert_eq!(config.router.response_timeout(), Duration::from_millis(250));
        assert_eq!(config.router.initialize_timeout_ms, 5000);
        assert_eq!(
            config.model.url.as_deref(),
            Some("https://models.example/encoder.onnx")
        );
        assert_eq!(config.model.fetch_timeout_secs, 120);
    }

    #[test]
    fn test_invalid_document() {
        let err = EngineConfig::from_toml_str("[router]\nresponse_timeout_ms = \"soon\"")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = EngineConfig::load(temp_dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_builder_setters() {
        let config = EngineConfig::default()
            .with_cache_root("/tmp/models")
            .with_response_timeout(Duration::from_millis(1500))
            .with_initialize_timeout(Duration::from_secs(600))
            .with_model_url("https://m/a.bin");

        assert_eq!(config.cache.root, PathBuf::from("/tmp/models"));
        assert_eq!(config.router.response_timeout_ms, 1500);
        assert_eq!(
            config.router.timeout_for(RequestKind::Initialize),
            Duration::from_secs(600)
        );
        assert_eq!(config.model.url.as_deref(), Some("https://m/a.bin"));
    }
}
