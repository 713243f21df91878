//! Configuration module for Hostbook
//!
//! Handles loading and parsing of `config.toml` with support for
//! environment variable expansion.

mod loader;
mod types;

pub use loader::{
    load_config, load_from_file, sample_config, user_config_display, user_config_path,
    ConfigError,
};
pub use types::{DatabaseConfig, HostbookConfig, WorkspacesConfig, DEFAULT_BLACKLIST};
