//! Hostbook Core - Workspace lifecycle library for Hostbook
//!
//! This crate provides the UI-agnostic backend functionality:
//! - Workspace lifecycle (create, open, close, remove) with a single active workspace
//! - Database connectors (CouchDB over HTTP, in-memory)
//! - Entity mappers for workspace and host documents
//! - Change feed watching
//! - Configuration loading
//!
//! Any UI consumes this crate through [`WorkspaceManager`] and listens on
//! the [`NotificationBus`].
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐   create/open  ┌────────────────────┐
//! │   Any UI          │ ──────────────→│  WorkspaceManager  │
//! │ (CLI, TUI, GUI)   │                │                    │
//! │                   │ ←──────────────│  NotificationBus   │
//! └───────────────────┘  Notification  └────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use hostbook_core::{build_manager, load_config, Notification};
//!
//! let config = load_config(None)?;
//! let (manager, bus) = build_manager(&config);
//!
//! manager.open_workspace("acme")?;
//!
//! while let Some(notif) = bus.try_recv() {
//!     if let Notification::WorkspaceLoaded { hosts } = notif {
//!         println!("{} hosts", hosts.len());
//!     }
//! }
//! ```

// Public API modules
pub mod error;
pub mod notifications;

// Backend modules
pub mod changes;
pub mod config;
pub mod db;
pub mod mappers;

// Workspace management
pub mod workspace;

use std::sync::Arc;

// Re-export commonly used types
pub use changes::{ChangeWatcher, ChangesManager};
pub use config::{load_config, HostbookConfig};
pub use db::{ConnectorProvider, CouchProvider, DbConnector, MemoryProvider, SharedConnector};
pub use error::{ConnectorError, Result, WorkspaceError};
pub use mappers::{Entity, MapperManager};
pub use notifications::{Notification, NotificationBus};
pub use workspace::{DbKind, Host, Workspace, WorkspaceManager, WorkspaceType};

/// Wire a manager against CouchDB using the given configuration
pub fn build_manager(config: &HostbookConfig) -> (WorkspaceManager, NotificationBus) {
    let provider = Arc::new(CouchProvider::new(&config.database));
    build_manager_with(config, provider)
}

/// Wire a manager against any connector provider
pub fn build_manager_with(
    config: &HostbookConfig,
    provider: Arc<dyn ConnectorProvider>,
) -> (WorkspaceManager, NotificationBus) {
    let bus = NotificationBus::default();
    let watcher = Arc::new(ChangesManager::new(
        bus.clone(),
        config.workspaces.poll_interval(),
    ));
    let manager = WorkspaceManager::new(
        provider,
        Arc::new(MapperManager::new()),
        watcher,
        bus.clone(),
        config.workspaces.blacklist.iter().cloned(),
    );
    (manager, bus)
}

/// Get the crate version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
