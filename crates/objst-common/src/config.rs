//! Configuration types for objst
//!
//! This module defines configuration structures used across components.
//! Every section deserializes with defaults so a partial TOML file is valid.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration for an objst process
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Bucket (storage) configuration
    pub bucket: BucketConfig,
    /// HTTP facade configuration
    pub http: HttpConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Bucket configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    /// Base directory holding the payload, name and meta stores
    pub data_dir: PathBuf,
    /// Options shared by the three stores
    pub store: StoreConfig,
    /// Background maintenance
    pub maintenance: MaintenanceConfig,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./objst-data"),
            store: StoreConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl BucketConfig {
    /// Create config with data directory
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    /// Directory of the payload store (id -> object record)
    #[must_use]
    pub fn payload_dir(&self) -> PathBuf {
        self.data_dir.join("payload")
    }

    /// Directory of the name index ((name, owner) -> id)
    #[must_use]
    pub fn names_dir(&self) -> PathBuf {
        self.data_dir.join("names")
    }

    /// Directory of the meta index (id -> metadata)
    #[must_use]
    pub fn metas_dir(&self) -> PathBuf {
        self.data_dir.join("metas")
    }
}

/// Storage engine options applied to each store
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Page cache size per store
    pub cache_size_bytes: usize,
    /// How long an operation waits for a store that is being compacted
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_size_bytes: 64 * 1024 * 1024, // 64 MB
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    /// Busy timeout as a [`Duration`]
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Background maintenance (compaction) configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Run the periodic compaction task
    pub enabled: bool,
    /// Seconds between compaction cycles
    pub interval_secs: u64,
    /// Minimum share of reclaimable space before a store is compacted
    pub discard_ratio: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 10 * 60, // 10 minutes
            discard_ratio: 0.7,
        }
    }
}

impl MaintenanceConfig {
    /// Interval as a [`Duration`]
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// HTTP facade configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen address
    pub listen: SocketAddr,
    /// Maximum accepted request body (upload) size
    pub max_upload_size: usize,
    /// Multipart form field carrying the file
    pub form_key: String,
    /// Header the default authenticator reads the owner from
    pub owner_header: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_upload_size: 32 << 20, // 32 MB
            form_key: "file".to_string(),
            owner_header: "x-objst-owner".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bucket.maintenance.interval(), Duration::from_secs(600));
        assert!((config.bucket.maintenance.discard_ratio - 0.7).abs() < f64::EPSILON);
        assert_eq!(config.http.max_upload_size, 32 * 1024 * 1024);
        assert_eq!(config.http.listen.port(), 8080);
    }

    #[test]
    fn test_store_dirs() {
        let config = BucketConfig::with_data_dir("/srv/objst");
        assert_eq!(config.payload_dir(), PathBuf::from("/srv/objst/payload"));
        assert_eq!(config.names_dir(), PathBuf::from("/srv/objst/names"));
        assert_eq!(config.metas_dir(), PathBuf::from("/srv/objst/metas"));
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [bucket]
            data_dir = "/data"

            [bucket.maintenance]
            interval_secs = 30

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.bucket.data_dir, PathBuf::from("/data"));
        assert_eq!(config.bucket.maintenance.interval_secs, 30);
        assert!(config.bucket.maintenance.enabled);
        assert_eq!(config.http.form_key, "file");
        assert_eq!(config.logging.level, "debug");
    }
}
