//! Chama configuration file handling
//!
//! Operator settings in TOML: group rule defaults, storage backend and
//! logging. The file lives in the data directory by default
//! (`~/.local/share/chama/config.toml` on Linux).
//!
//! Rule values here are deployment-wide defaults. Per-group capacity is
//! copied onto each group when it is created and is not re-read afterwards.

use chama::group::GroupRules;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default pool size for the SQLite store
const DEFAULT_MAX_CONNECTIONS: u32 = 4;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write config file '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid invitation_ttl '{value}': {source}")]
    Duration {
        value: String,
        source: humantime::DurationError,
    },

    #[error("Invalid rules: {0}")]
    Rules(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChamaConfig {
    #[serde(default)]
    pub rules: RulesConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[rules]`: every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RulesConfig {
    #[serde(flatten)]
    pub rules: GroupRules,

    /// Human-readable override for `invitation_ttl_secs`, e.g. `"7days"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitation_ttl: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

pub fn default_database_path() -> PathBuf {
    default_data_dir().join("chama.db")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_database_path(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl RulesConfig {
    /// Effective rules with `invitation_ttl` applied and validated.
    pub fn resolve(&self) -> Result<GroupRules, ConfigError> {
        let mut rules = self.rules.clone();
        if let Some(ttl) = &self.invitation_ttl {
            let parsed: Duration =
                humantime::parse_duration(ttl).map_err(|source| ConfigError::Duration {
                    value: ttl.clone(),
                    source,
                })?;
            rules.invitation_ttl_secs = parsed.as_secs();
        }
        rules.validate().map_err(ConfigError::Rules)?;
        Ok(rules)
    }
}

impl ChamaConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(database_path: &Path) -> String {
        format!(
            r#"# Chama service configuration
#
# Rule values are defaults for newly created groups. A group keeps the
# capacity it was created with.

[rules]
# Approved members required before the creator can approve the group
default_min_members = 3

# Member capacity
default_max_members = 20

# Distinct nominators needed to promote a member to admin
promotion_threshold = 2

# Approving admin votes needed to authorize a payout.
# A single rejecting vote always rejects the request.
payout_approval_quorum = 2

# When false, an admin's second vote on the same request is refused
# instead of replacing the first one
allow_vote_overwrite = true

# How long an invitation stays valid
invitation_ttl = "7days"

[storage]
# "sqlite" or "memory" (memory loses all state on exit)
backend = "sqlite"
path = "{database_path}"
max_connections = 4

[logging]
# Log level: trace, debug, info, warn, error
# RUST_LOG overrides this when set
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/chama/chama.log"
"#,
            database_path = database_path.display()
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(config_path: &Path, database_path: &Path) -> Result<(), ConfigError> {
        write_file(config_path, &Self::generate_default_toml(database_path))
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, contents).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Get the default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chama")
}

/// Get the default config file path
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = ChamaConfig::default();
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert_eq!(config.storage.max_connections, 4);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.rules.resolve().unwrap(), GroupRules::default());
    }

    #[test]
    fn test_create_default_config_loads() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");
        let db_path = temp_dir.path().join("chama.db");

        ChamaConfig::create_default(&config_path, &db_path).unwrap();
        let config = ChamaConfig::load(&config_path).unwrap();

        assert_eq!(config.storage.path, db_path);
        let rules = config.rules.resolve().unwrap();
        assert_eq!(rules.payout_approval_quorum, 2);
        assert_eq!(rules.invitation_ttl_secs, 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(
            &config_path,
            "[rules]\npayout_approval_quorum = 1\ninvitation_ttl = \"36h\"\n",
        )
        .unwrap();

        let config = ChamaConfig::load(&config_path).unwrap();
        let rules = config.rules.resolve().unwrap();
        assert_eq!(rules.payout_approval_quorum, 1);
        assert_eq!(rules.promotion_threshold, 2);
        assert_eq!(rules.invitation_ttl_secs, 36 * 60 * 60);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_bad_ttl_rejected() {
        let rules = RulesConfig {
            rules: GroupRules::default(),
            invitation_ttl: Some("soon".to_string()),
        };
        assert!(matches!(rules.resolve(), Err(ConfigError::Duration { .. })));
    }

    #[test]
    fn test_zero_quorum_rejected() {
        let rules = RulesConfig {
            rules: GroupRules::default().with_payout_quorum(0),
            invitation_ttl: None,
        };
        assert!(matches!(rules.resolve(), Err(ConfigError::Rules(_))));
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = ChamaConfig::load(&temp_dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
