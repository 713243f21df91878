//! Workspace management module
//!
//! A workspace is a named project dataset living in its own database.
//! Exactly one workspace is active at a time.
//!
//! # Architecture
//!
//! ```text
//! WorkspaceManager
//!     │
//!     ├── ConnectorProvider (create / acquire / remove databases)
//!     │
//!     ├── MapperManager (rebound to the active database)
//!     │   └── Workspace + Host documents
//!     │
//!     ├── ChangeWatcher (follows the active database's change feed)
//!     │
//!     └── NotificationBus (workspace changed / loaded / connection problems)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use hostbook_core::{DbKind, WorkspaceManager};
//!
//! let ws = manager.create_workspace("acme", "External pentest", DbKind::CouchDb)?;
//! let ws = manager.open_workspace("acme")?;
//! manager.close_workspace();
//! ```

mod manager;
mod types;

pub use manager::WorkspaceManager;
pub use types::{DbKind, Host, Workspace, WorkspaceType};
