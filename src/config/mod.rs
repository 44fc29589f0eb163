//! Configuration management for joblens
//!
//! Loads TOML configuration, applies `JOBLENS_SECTION__KEY` environment
//! overrides, and validates the result before anything is constructed
//! from it.

use crate::error::{JoblensError, Result};
use crate::router::RoutingConfig;
use crate::sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub record_store: RecordStoreConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Storage configuration for local engine state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Fingerprint database file, relative paths resolve under `data_dir`
    pub fingerprint_db: PathBuf,
}

/// Where order records come from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordStoreConfig {
    /// "json" reads a local order book file; "memory" starts empty
    pub kind: String,
    /// Order book path for the json kind
    #[serde(default)]
    pub orders_file: Option<PathBuf>,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    /// "local" runs the ONNX model in-process; "hashing" is the
    /// deterministic lightweight fallback
    pub provider: String,
    pub dimension: usize,
}

/// Result cache tunables beyond the per-entry TTLs in `[routing]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Background sweep interval for stale entry eviction
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 60,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(JoblensError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| JoblensError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| JoblensError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| JoblensError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: JOBLENS_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("JOBLENS_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        fn parse<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
            value.parse().map_err(|_| JoblensError::InvalidConfigValue {
                path: path.to_string(),
                message: format!("Cannot parse '{}'", value),
            })
        }

        match path {
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "EMBEDDING__PROVIDER" => self.embedding.provider = value.to_string(),
            "EMBEDDING__DIMENSION" => self.embedding.dimension = parse(path, value)?,
            "RECORD_STORE__KIND" => self.record_store.kind = value.to_string(),
            "RECORD_STORE__ORDERS_FILE" => {
                self.record_store.orders_file = Some(PathBuf::from(value))
            }
            "ROUTING__CALL_TIMEOUT_MS" => self.routing.call_timeout_ms = parse(path, value)?,
            "ROUTING__FRESH_TTL_SECS" => self.routing.fresh_ttl_secs = parse(path, value)?,
            "ROUTING__GENERAL_TTL_SECS" => self.routing.general_ttl_secs = parse(path, value)?,
            "SYNC__BATCH_SIZE" => self.sync.batch_size = parse(path, value)?,
            "SYNC__BATCH_DELAY_MS" => self.sync.batch_delay_ms = parse(path, value)?,
            "CACHE__SWEEP_INTERVAL_SECS" => {
                self.cache.sweep_interval_secs = parse(path, value)?
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| JoblensError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("joblens").join("config.toml"))
    }

    /// Get the default data directory
    pub fn default_data_dir() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| JoblensError::Config("Cannot determine home directory".to_string()))?;

        Ok(home_dir.join(".joblens"))
    }

    /// Fingerprint database path with relative paths resolved under the
    /// data directory
    pub fn fingerprint_db_path(&self) -> PathBuf {
        if self.storage.fingerprint_db.is_absolute() {
            self.storage.fingerprint_db.clone()
        } else {
            self.storage.data_dir.join(&self.storage.fingerprint_db)
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = PathBuf::from("~/.joblens");

        Self {
            storage: StorageConfig {
                data_dir,
                fingerprint_db: PathBuf::from("fingerprints.db"),
            },
            record_store: RecordStoreConfig {
                kind: "json".to_string(),
                orders_file: Some(PathBuf::from("orders.json")),
            },
            embedding: EmbeddingConfig {
                model: "all-MiniLM-L6-v2".to_string(),
                provider: "local".to_string(),
                dimension: 384,
            },
            routing: RoutingConfig::default(),
            cache: CacheConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.embedding.model, config.embedding.model);
        assert_eq!(
            parsed.routing.relaxation_thresholds,
            config.routing.relaxation_thresholds
        );
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, JoblensError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_optional_sections_default() {
        let minimal = r#"
            [storage]
            data_dir = "/tmp/joblens"
            fingerprint_db = "fp.db"

            [record_store]
            kind = "memory"

            [embedding]
            model = "all-MiniLM-L6-v2"
            provider = "hashing"
            dimension = 384
        "#;
        let config: Config = toml::from_str(minimal).unwrap();
        assert_eq!(config.routing.relaxation_thresholds, vec![0.75, 0.6, 0.45, 0.3]);
        assert_eq!(config.sync.batch_size, 25);
    }

    #[test]
    fn test_fingerprint_db_path_resolution() {
        let mut config = Config::default();
        config.storage.data_dir = PathBuf::from("/var/lib/joblens");
        config.storage.fingerprint_db = PathBuf::from("fp.db");
        assert_eq!(
            config.fingerprint_db_path(),
            PathBuf::from("/var/lib/joblens/fp.db")
        );

        config.storage.fingerprint_db = PathBuf::from("/elsewhere/fp.db");
        assert_eq!(config.fingerprint_db_path(), PathBuf::from("/elsewhere/fp.db"));
    }
}
