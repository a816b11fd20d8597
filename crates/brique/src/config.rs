//! Node configuration
//!
//! Loaded from TOML. Every field has a default, so an empty or missing file
//! yields a working in-memory node. A few fields can be overridden from the
//! environment with the `BRIQUE_` prefix.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{NodeError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name announced to peers
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// SQLite database file; in-memory when absent
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub delegation: DelegationSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSection {
    /// Bound on each transport request
    #[serde(default = "default_transport_timeout")]
    pub transport_timeout_secs: u64,

    /// A peer seen within this window is Online
    #[serde(default = "default_online_window")]
    pub online_window_secs: u64,

    /// Page size for sync history queries
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationSection {
    /// Lifetime of certificates issued by this node
    #[serde(default = "default_validity_days")]
    pub validity_days: u64,
}

// Defaults
fn default_instance_name() -> String { "brique-node".to_string() }
fn default_log_filter() -> String { "info".to_string() }
fn default_transport_timeout() -> u64 { 30 }
fn default_online_window() -> u64 { 300 }
fn default_history_limit() -> usize { 50 }
fn default_validity_days() -> u64 { 365 }

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            transport_timeout_secs: default_transport_timeout(),
            online_window_secs: default_online_window(),
            history_limit: default_history_limit(),
        }
    }
}

impl Default for DelegationSection {
    fn default() -> Self {
        Self {
            validity_days: default_validity_days(),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            database_path: None,
            log_filter: default_log_filter(),
            sync: SyncSection::default(),
            delegation: DelegationSection::default(),
        }
    }
}

impl NodeConfig {
    /// Load from a TOML file, then apply `BRIQUE_*` environment overrides.
    ///
    /// A missing file is not an error: defaults are used.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml_str(&content)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Apply `BRIQUE_INSTANCE_NAME`, `BRIQUE_DATABASE_PATH` and
    /// `BRIQUE_LOG_FILTER` as returned by `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("BRIQUE_INSTANCE_NAME") {
            self.instance_name = name;
        }
        if let Some(path) = lookup("BRIQUE_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(filter) = lookup("BRIQUE_LOG_FILTER") {
            self.log_filter = filter;
        }
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.transport_timeout_secs)
    }

    pub fn online_window(&self) -> Duration {
        Duration::from_secs(self.sync.online_window_secs)
    }

    pub fn delegation_validity(&self) -> Duration {
        Duration::from_secs(self.delegation.validity_days.saturating_mul(86_400))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_toml_is_default() {
        let config = NodeConfig::from_toml_str("").unwrap();
        assert_eq!(config, NodeConfig::default());
        assert_eq!(config.online_window(), Duration::from_secs(300));
        assert_eq!(config.database_path, None);
    }

    #[test]
    fn test_partial_sections() {
        let config = NodeConfig::from_toml_str(
            r#"
instance_name = "repair-cafe-3"
database_path = "/var/lib/brique/brique.db"

[sync]
transport_timeout_secs = 5

[delegation]
validity_days = 30
"#,
        )
        .unwrap();

        assert_eq!(config.instance_name, "repair-cafe-3");
        assert_eq!(config.transport_timeout(), Duration::from_secs(5));
        assert_eq!(config.sync.history_limit, 50);
        assert_eq!(config.delegation_validity(), Duration::from_secs(30 * 86_400));
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_invalid_toml() {
        let err = NodeConfig::from_toml_str("[sync]\ntransport_timeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, NodeError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("BRIQUE_INSTANCE_NAME", "bench"),
            ("BRIQUE_LOG_FILTER", "brique=debug"),
        ]);
        let mut config = NodeConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.instance_name, "bench");
        assert_eq!(config.log_filter, "brique=debug");
        assert_eq!(config.database_path, None);
    }

    #[test]
    fn test_load_missing_and_present_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = NodeConfig::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(missing.sync, SyncSection::default());

        let path = dir.path().join("brique.toml");
        std::fs::write(&path, "[sync]\nhistory_limit = 7\n").unwrap();
        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.sync.history_limit, 7);
    }
}
