//! Configuration system (layered: code > env > TOML file).

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;

use crate::error::HyvError;
use crate::store::{FsStore, MemoryStore};

/// Layered configuration for model adapters and stores.
///
/// Resolution order: values set in code override environment variables
/// (a `.env` file is loaded if present), which override the TOML file passed
/// to [`HyvConfig::load`].
#[derive(Clone, Default)]
pub struct HyvConfig {
    api_keys: Arc<RwLock<HashMap<String, String>>>,
    base_urls: Arc<RwLock<HashMap<String, String>>>,
    weaviate_headers: Arc<RwLock<BTreeMap<String, String>>>,
    memory_capacity: Option<usize>,
    store_dir: Option<PathBuf>,
}

impl fmt::Debug for HyvConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let services: Vec<String> = read(&self.api_keys).keys().cloned().collect();
        f.debug_struct("HyvConfig")
            .field("api_keys_for", &services)
            .field("base_urls", &self.base_urls)
            .field("memory_capacity", &self.memory_capacity)
            .field("store_dir", &self.store_dir)
            .finish()
    }
}

/// On-disk TOML layout.
///
/// ```toml
/// memory_capacity = 100
/// store_dir = "out/messages"
///
/// [openai]
/// api_key = "sk-..."
///
/// [weaviate]
/// url = "https://my-cluster.weaviate.network"
/// api_key = "..."
///
/// [weaviate.headers]
/// X-OpenAI-Api-Key = "sk-..."
///
/// [automatic1111]
/// url = "http://127.0.0.1:7861"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    memory_capacity: Option<usize>,
    store_dir: Option<PathBuf>,
    #[serde(default)]
    openai: ServiceSection,
    #[serde(default)]
    weaviate: WeaviateSection,
    #[serde(default)]
    automatic1111: UrlSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceSection {
    api_key: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct UrlSection {
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct WeaviateSection {
    url: Option<String>,
    api_key: Option<String>,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

impl HyvConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from environment variables only.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::new();
        config.apply_env();
        config
    }

    /// Load a TOML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, HyvError> {
        let _ = dotenvy::dotenv();
        let mut config = Self::from_file(path)?;
        config.apply_env();
        Ok(config)
    }

    /// Load a TOML file without consulting the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, HyvError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            HyvError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, HyvError> {
        let file: ConfigFile =
            toml::from_str(raw).map_err(|e| HyvError::Configuration(e.to_string()))?;

        let mut config = Self::new();
        config.memory_capacity = file.memory_capacity;
        config.store_dir = file.store_dir;
        if let Some(key) = file.openai.api_key {
            config.set_api_key("openai", key);
        }
        if let Some(url) = file.openai.base_url {
            config.set_base_url("openai", url);
        }
        if let Some(url) = file.weaviate.url {
            config.set_base_url("weaviate", url);
        }
        if let Some(key) = file.weaviate.api_key {
            config.set_api_key("weaviate", key);
        }
        for (name, value) in file.weaviate.headers {
            config.set_weaviate_header(&name, value);
        }
        if let Some(url) = file.automatic1111.url {
            config.set_base_url("automatic1111", url);
        }
        Ok(config)
    }

    fn apply_env(&mut self) {
        let env = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        for (env_var, service) in [("OPENAI_API_KEY", "openai"), ("WEAVIATE_API_KEY", "weaviate")] {
            if let Some(key) = env(env_var) {
                self.set_api_key(service, key);
            }
        }
        for (env_var, service) in [("OPENAI_BASE_URL", "openai"), ("AUTOMATIC1111_URL", "automatic1111")] {
            if let Some(url) = env(env_var) {
                self.set_base_url(service, url);
            }
        }

        let weaviate_url = env("WEAVIATE_URL").or_else(|| {
            let host = env("WEAVIATE_HOST")?;
            let scheme = env("WEAVIATE_SCHEME").unwrap_or_else(|| "https".to_string());
            Some(format!("{scheme}://{host}"))
        });
        if let Some(url) = weaviate_url {
            self.set_base_url("weaviate", url);
            // Server-side vectorizers authenticate with the caller's OpenAI key.
            if let Some(key) = env("OPENAI_API_KEY") {
                self.set_weaviate_header("X-OpenAI-Api-Key", key);
            }
        }

        if let Some(raw) = env("HYV_MEMORY_CAPACITY") {
            match raw.parse() {
                Ok(capacity) => self.memory_capacity = Some(capacity),
                Err(_) => tracing::warn!(value = %raw, "ignoring invalid HYV_MEMORY_CAPACITY"),
            }
        }
        if let Some(dir) = env("HYV_STORE_DIR") {
            self.store_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn set_api_key(&self, service: &str, key: String) {
        write(&self.api_keys).insert(service.to_string(), key);
    }

    pub fn get_api_key(&self, service: &str) -> Option<String> {
        read(&self.api_keys).get(service).cloned()
    }

    pub fn set_base_url(&self, service: &str, url: String) {
        write(&self.base_urls).insert(service.to_string(), url);
    }

    pub fn get_base_url(&self, service: &str) -> Option<String> {
        read(&self.base_urls).get(service).cloned()
    }

    pub fn set_weaviate_header(&self, name: &str, value: String) {
        write(&self.weaviate_headers).insert(name.to_string(), value);
    }

    /// Extra headers sent with every Weaviate request.
    pub fn weaviate_headers(&self) -> Vec<(String, String)> {
        read(&self.weaviate_headers)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn has_credentials(&self, service: &str) -> bool {
        self.get_api_key(service).is_some()
    }

    pub fn with_memory_capacity(mut self, capacity: usize) -> Self {
        self.memory_capacity = Some(capacity);
        self
    }

    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    pub fn memory_capacity(&self) -> usize {
        self.memory_capacity
            .unwrap_or(crate::store::memory::DEFAULT_CAPACITY)
    }

    /// Directory for the filesystem store; defaults to `~/.hyv/messages`.
    pub fn store_dir(&self) -> PathBuf {
        self.store_dir.clone().unwrap_or_else(default_store_dir)
    }

    pub fn memory_store(&self) -> Result<MemoryStore, HyvError> {
        MemoryStore::with_capacity(self.memory_capacity())
    }

    pub fn fs_store(&self) -> FsStore {
        FsStore::new(self.store_dir())
    }

    #[cfg(feature = "weaviate")]
    pub fn weaviate_store(&self) -> Result<crate::store::WeaviateStore, HyvError> {
        crate::store::WeaviateStore::from_config(self)
    }
}

fn default_store_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().join(".hyv").join("messages"))
        .unwrap_or_else(|| PathBuf::from(".hyv/messages"))
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
memory_capacity = 7
store_dir = "out/messages"

[openai]
api_key = "file-key"

[weaviate]
url = "http://localhost:8080"

[weaviate.headers]
X-OpenAI-Api-Key = "vectorizer-key"

[automatic1111]
url = "http://gpu-box:7861"
"#;

    #[test]
    fn parses_toml_sections() {
        let config = HyvConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.get_api_key("openai"), Some("file-key".to_string()));
        assert_eq!(
            config.get_base_url("weaviate"),
            Some("http://localhost:8080".to_string())
        );
        assert_eq!(
            config.get_base_url("automatic1111"),
            Some("http://gpu-box:7861".to_string())
        );
        assert_eq!(config.memory_capacity(), 7);
        assert_eq!(config.store_dir(), PathBuf::from("out/messages"));
        assert_eq!(
            config.weaviate_headers(),
            vec![("X-OpenAI-Api-Key".to_string(), "vectorizer-key".to_string())]
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = HyvConfig::from_toml_str("colour = \"blue\"").unwrap_err();
        assert!(matches!(err, HyvError::Configuration(_)));
    }

    #[test]
    fn explicit_key_overrides_file_value() {
        let config = HyvConfig::from_toml_str(SAMPLE).unwrap();
        config.set_api_key("openai", "code-key".to_string());
        assert_eq!(config.get_api_key("openai"), Some("code-key".to_string()));
    }

    #[test]
    fn defaults_apply_without_file() {
        let config = HyvConfig::new();
        assert_eq!(config.memory_capacity(), crate::store::memory::DEFAULT_CAPACITY);
        assert!(config.store_dir().ends_with("messages"));
        assert!(!config.has_credentials("openai"));
    }

    #[test]
    fn from_file_reports_missing_path() {
        let dir = TempDir::new().unwrap();
        let err = HyvConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, HyvError::Configuration(msg) if msg.contains("absent.toml")));
    }

    #[test]
    fn store_factories_follow_settings() {
        let dir = TempDir::new().unwrap();
        let config = HyvConfig::new()
            .with_memory_capacity(3)
            .with_store_dir(dir.path());

        assert_eq!(config.memory_store().unwrap().capacity(), 3);
        assert_eq!(config.fs_store().dir(), dir.path());
        assert!(HyvConfig::new().with_memory_capacity(0).memory_store().is_err());
    }

    #[cfg(feature = "weaviate")]
    #[test]
    fn weaviate_store_requires_url() {
        let err = HyvConfig::new().weaviate_store().unwrap_err();
        assert!(matches!(err, HyvError::Configuration(msg) if msg.contains("WEAVIATE_URL")));
    }
}
