//! Configuration management for the chainfold indexer

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct IndexerConfig {
    #[validate]
    pub reduce: ReduceConfig,
    #[validate]
    pub storage: StorageConfig,
    pub monitoring: MonitoringConfig,
    #[validate]
    pub publisher: PublisherConfig,
    #[validate]
    pub cache: CacheConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ReduceConfig {
    #[validate(range(min = 1, max = 10000))]
    pub max_revertable_events: usize,
    #[validate(range(min = 1, max = 1024))]
    pub max_concurrent_reductions: usize,
    #[validate(range(min = 0, max = 10))]
    pub conflict_retries: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Rocksdb,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[validate]
    pub rocksdb: RocksDBConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RocksDBConfig {
    pub path: PathBuf,
    pub enable_compression: bool,
    #[validate(range(min = 100, max = 10000))]
    pub max_open_files: i32,
    #[validate(range(min = 16, max = 2048))]
    pub write_buffer_size_mb: usize,
    #[validate(range(min = 2, max = 16))]
    pub max_write_buffer_number: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub structured_logging: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct PublisherConfig {
    #[validate(range(min = 1, max = 1_000_000))]
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    #[validate(range(min = 1, max = 86400))]
    pub token_standard_ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// Drop NFT logs of collections the indexer has no token for
    pub require_known_collections: bool,
}

impl Default for ReduceConfig {
    fn default() -> Self {
        Self {
            max_revertable_events: 100,
            max_concurrent_reductions: 16,
            conflict_retries: 1,
        }
    }
}

impl Default for RocksDBConfig {
    fn default() -> Self {
        Self {
            path: "./data/rocksdb".into(),
            enable_compression: true,
            max_open_files: 1000,
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            structured_logging: false,
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self { channel_capacity: 1024 }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            token_standard_ttl_secs: 300,
        }
    }
}

impl IndexerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;

        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from an optional file layered under
    /// `CHAINFOLD__SECTION__KEY` environment overrides
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path).required(false));
        }
        let config: Self = builder
            .add_source(
                ::config::Environment::with_prefix("CHAINFOLD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate_all()?;

        Ok(config)
    }

    /// Ensure required directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        if self.storage.backend == StorageBackend::Rocksdb {
            std::fs::create_dir_all(&self.storage.rocksdb.path)?;
        }
        Ok(())
    }

    /// Range checks plus cross-field rules
    pub fn validate_all(&self) -> Result<()> {
        Validate::validate(self)?;
        if self.monitoring.log_level.parse::<tracing::Level>().is_err() {
            return Err(anyhow::anyhow!(
                "Unknown log level: {}",
                self.monitoring.log_level
            ));
        }
        if self.storage.backend == StorageBackend::Rocksdb && self.storage.rocksdb.path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("RocksDB path cannot be empty"));
        }
        Ok(())
    }
}
