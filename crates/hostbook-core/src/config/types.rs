//! Configuration types for Hostbook
//!
//! Defines the structure of `config.toml`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Names that can never be used as workspaces
pub const DEFAULT_BLACKLIST: &[&str] = &["reports", "cwe"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostbookConfig {
    /// Database server settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Workspace management settings
    #[serde(default)]
    pub workspaces: WorkspacesConfig,
}

/// Database section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// CouchDB server URI, credentials may be embedded (supports ${ENV_VAR} syntax)
    #[serde(default = "default_couch_uri")]
    pub couch_uri: String,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_couch_uri() -> String {
    "http://127.0.0.1:5984".to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            couch_uri: default_couch_uri(),
            timeout_secs: default_timeout(),
        }
    }
}

impl DatabaseConfig {
    /// Request timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Workspaces section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspacesConfig {
    /// Reserved names rejected by name validation
    #[serde(default = "default_blacklist")]
    pub blacklist: Vec<String>,

    /// Change feed polling interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_blacklist() -> Vec<String> {
    DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect()
}

fn default_poll_interval() -> u64 {
    1000
}

impl Default for WorkspacesConfig {
    fn default() -> Self {
        Self {
            blacklist: default_blacklist(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl WorkspacesConfig {
    /// Polling interval as a [`Duration`]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
