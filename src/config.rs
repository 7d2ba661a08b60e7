use crate::hasher::FingerprintMode;
use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Worker count. `None` means one per available CPU.
    pub concurrency: Option<usize>,
    pub fingerprint: FingerprintMode,
    pub ignore_patterns: Vec<String>,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub memory_max_entries: usize,
    pub memory_max_bytes: usize,
    /// RocksDB directory for the persistent tier. `None` disables it.
    pub disk_path: Option<PathBuf>,
    /// Recompute everything, still writing results through both tiers.
    pub bypass: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_max_entries: 1024,
            memory_max_bytes: 256 * 1024 * 1024,
            disk_path: Some(PathBuf::from("export_ingest_cache.db")),
            bypass: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            multiplier: 2.0,
            max_delay_ms: 2_000,
        }
    }
}

impl AppConfig {
    pub fn worker_count(&self) -> usize {
        match self.concurrency {
            Some(n) if n > 0 => n,
            _ => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

/// Read `Config.toml` (optional) and `EXPORT_INGEST__*` environment overrides,
/// e.g. `EXPORT_INGEST__CACHE__BYPASS=true`.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("EXPORT_INGEST").separator("__"))
        .build()?;
    builder.try_deserialize::<AppConfig>()
}
