//! Config schema types.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockboxConfig {
    pub session: SessionConfig,
    pub kdf: KdfConfig,
    pub storage: StorageConfig,
    pub metrics: MetricsConfig,
}

/// Session inactivity window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Seconds of inactivity before the vault locks itself.
    pub timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { timeout_secs: 900 }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Argon2id cost parameters for newly created vaults.
///
/// Existing vaults keep the parameters stored in their profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KdfConfig {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Passes over memory.
    pub t_cost: u32,
    /// Lanes.
    pub p_cost: u32,
}

impl Default for KdfConfig {
    fn default() -> Self {
        Self {
            m_cost: 65536,
            t_cost: 3,
            p_cost: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// SQLite database path. Defaults to `<data_dir>/lockbox.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Install the metrics recorder at startup.
    pub enabled: bool,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config: LockboxConfig = toml::from_str("").unwrap();
        assert_eq!(config, LockboxConfig::default());
        assert_eq!(config.session.timeout(), Duration::from_secs(900));
        assert_eq!(config.kdf.m_cost, 65536);
        assert!(config.storage.database.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: LockboxConfig = toml::from_str("[kdf]\nt_cost = 5\n").unwrap();
        assert_eq!(config.kdf.t_cost, 5);
        assert_eq!(config.kdf.m_cost, 65536);
        assert_eq!(config.session.timeout_secs, 900);
    }

    #[test]
    fn unknown_field_is_rejected() {
        assert!(toml::from_str::<LockboxConfig>("[session]\ntimeout = 5\n").is_err());
    }
}
