//! Database connector layer
//!
//! Defines the contracts the workspace manager depends on:
//! - [`DbConnector`]: a live handle to one workspace database
//! - [`ConnectorProvider`]: creates, opens, removes and lists databases
//!
//! Two providers ship with the crate: [`MemoryProvider`] (in-process) and
//! [`CouchProvider`] (CouchDB over HTTP).

mod couch;
mod memory;

pub use couch::{CouchConnector, CouchProvider};
pub use memory::{MemoryConnector, MemoryProvider};

use crate::error::ConnectorError;
use crate::workspace::DbKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Sequence marker meaning "start from the current end of the feed"
pub const SEQ_NOW: &str = "now";

/// Shared connector handle
pub type SharedConnector = Arc<dyn DbConnector>;

/// A single entry of a database change feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChange {
    /// Document ID
    pub id: String,

    /// Whether the document was deleted
    #[serde(default)]
    pub deleted: bool,
}

/// A batch of changes plus the sequence to resume from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    pub changes: Vec<DocumentChange>,
    pub last_seq: String,
}

/// Live handle to one workspace database
pub trait DbConnector: Send + Sync {
    /// Name of the database this connector is bound to
    fn db_name(&self) -> &str;

    /// Fetch a document by ID
    fn get_document(&self, id: &str) -> Result<Option<Value>, ConnectorError>;

    /// Insert or replace a document
    fn save_document(&self, id: &str, doc: Value) -> Result<(), ConnectorError>;

    /// All documents in the database
    fn all_documents(&self) -> Result<Vec<Value>, ConnectorError>;

    /// Changes after `since` ([`SEQ_NOW`] returns no changes and the current sequence)
    fn changes_since(&self, since: &str) -> Result<ChangeBatch, ConnectorError>;
}

/// Creates, opens, removes and enumerates workspace databases
pub trait ConnectorProvider: Send + Sync {
    /// Names of all workspace databases
    fn list_names(&self) -> Result<Vec<String>, ConnectorError>;

    /// Create a database. `Ok(None)` means the provider declined without an error.
    fn create(&self, name: &str, kind: DbKind) -> Result<Option<SharedConnector>, ConnectorError>;

    /// Open an existing database
    fn acquire(&self, name: &str) -> Result<SharedConnector, ConnectorError>;

    /// Delete a database
    fn remove(&self, name: &str) -> Result<bool, ConnectorError>;

    /// Check whether a database exists
    fn exists(&self, name: &str) -> Result<bool, ConnectorError>;

    /// Raw kind tag of a database
    fn kind_of(&self, name: &str) -> Result<String, ConnectorError>;

    /// Raw kind tags this provider can create
    fn supported_kinds(&self) -> Vec<String>;

    /// Re-read connection settings
    fn reload_config(&self) -> Result<(), ConnectorError>;
}
