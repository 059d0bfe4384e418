use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strata_types::Author;

use crate::error::{ContentError, ContentResult};

/// Store-wide settings, usually read from a TOML file.
///
/// Every key is optional; missing keys take their defaults and unknown keys
/// are rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding one sub-directory per tenant.
    pub root: PathBuf,
    /// Branch new repositories start on.
    pub branch: String,
    /// Author recorded when a caller does not supply one.
    pub default_author: Author,
    pub quotas: QuotaLimits,
    pub cache: CacheConfig,
    pub sync: SyncConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            branch: "main".to_string(),
            default_author: Author::default(),
            quotas: QuotaLimits::default(),
            cache: CacheConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ContentResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            ContentError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> ContentResult<Self> {
        toml::from_str(text).map_err(|e| ContentError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> ContentResult<String> {
        toml::to_string_pretty(self).map_err(|e| ContentError::Serialization(e.to_string()))
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }
}

/// Resource ceilings applied per tenant. Zero means unlimited.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuotaLimits {
    pub max_pages: u64,
    pub max_storage_bytes: u64,
    pub max_records_per_table: u64,
    pub max_columns_per_table: u64,
    pub max_asset_size_bytes: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Record tables held at once before the oldest is evicted.
    pub max_record_tables: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_record_tables: 100,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Timeout for one background push or pull.
    pub timeout_secs: u64,
    /// Concurrent background syncs.
    pub workers: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            workers: 4,
        }
    }
}

impl SyncConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = StoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.branch, "main");
        assert_eq!(config.cache.max_record_tables, 100);
        assert_eq!(config.sync.timeout(), Duration::from_secs(60));
        assert_eq!(config.quotas.max_pages, 0);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = StoreConfig::from_toml_str(
            r#"
            root = "/srv/strata"

            [default_author]
            name = "ops"
            email = "ops@example.com"

            [quotas]
            max_pages = 50
            max_asset_size_bytes = 1048576

            [sync]
            workers = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.root, PathBuf::from("/srv/strata"));
        assert_eq!(config.default_author.name, "ops");
        assert_eq!(config.quotas.max_pages, 50);
        assert_eq!(config.quotas.max_asset_size_bytes, 1_048_576);
        assert_eq!(config.quotas.max_storage_bytes, 0);
        assert_eq!(config.sync.workers, 2);
        assert_eq!(config.sync.timeout_secs, 60);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = StoreConfig::from_toml_str("colour = \"blue\"").unwrap_err();
        assert!(matches!(err, ContentError::Config(_)));
        assert!(StoreConfig::from_toml_str("[quotas]\nmax_users = 3").is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = StoreConfig::default().with_root("/data");
        config.quotas.max_records_per_table = 10;
        let text = config.to_toml_string().unwrap();
        assert_eq!(StoreConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strata.toml");
        fs::write(&path, "branch = \"trunk\"\n").unwrap();
        assert_eq!(StoreConfig::load(&path).unwrap().branch, "trunk");
        assert!(StoreConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
