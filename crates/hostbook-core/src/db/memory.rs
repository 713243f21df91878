//! In-process document store
//!
//! Used for tests and offline sessions. Every write is appended to a
//! sequence-numbered change log so the change watcher behaves the same as
//! against CouchDB.

use super::{ChangeBatch, ConnectorProvider, DbConnector, DocumentChange, SharedConnector, SEQ_NOW};
use crate::error::ConnectorError;
use crate::workspace::DbKind;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Default)]
struct MemoryDb {
    docs: BTreeMap<String, Value>,
    log: Vec<DocumentChange>,
}

/// Connector to one in-memory database
pub struct MemoryConnector {
    name: String,
    db: RwLock<MemoryDb>,
}

impl MemoryConnector {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            db: RwLock::new(MemoryDb::default()),
        }
    }

    /// Delete a document, recording the change
    pub fn delete_document(&self, id: &str) -> bool {
        let mut db = self.db.write();
        let removed = db.docs.remove(id).is_some();
        if removed {
            db.log.push(DocumentChange {
                id: id.to_string(),
                deleted: true,
            });
        }
        removed
    }

    /// Number of documents stored
    pub fn len(&self) -> usize {
        self.db.read().docs.len()
    }

    /// Whether the database is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse_seq(since: &str) -> Result<usize, ConnectorError> {
    since
        .parse()
        .map_err(|_| ConnectorError::other(format!("Invalid sequence: {}", since)))
}

impl DbConnector for MemoryConnector {
    fn db_name(&self) -> &str {
        &self.name
    }

    fn get_document(&self, id: &str) -> Result<Option<Value>, ConnectorError> {
        Ok(self.db.read().docs.get(id).cloned())
    }

    fn save_document(&self, id: &str, doc: Value) -> Result<(), ConnectorError> {
        let mut db = self.db.write();
        db.docs.insert(id.to_string(), doc);
        db.log.push(DocumentChange {
            id: id.to_string(),
            deleted: false,
        });
        Ok(())
    }

    fn all_documents(&self) -> Result<Vec<Value>, ConnectorError> {
        Ok(self.db.read().docs.values().cloned().collect())
    }

    fn changes_since(&self, since: &str) -> Result<ChangeBatch, ConnectorError> {
        let db = self.db.read();
        let end = db.log.len();
        let start = if since == SEQ_NOW {
            end
        } else {
            parse_seq(since)?.min(end)
        };

        Ok(ChangeBatch {
            changes: db.log[start..].to_vec(),
            last_seq: end.to_string(),
        })
    }
}

/// Provider holding any number of in-memory databases
#[derive(Default)]
pub struct MemoryProvider {
    dbs: RwLock<BTreeMap<String, Arc<MemoryConnector>>>,
}

impl MemoryProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed handle to a database, for seeding data
    pub fn connector(&self, name: &str) -> Option<Arc<MemoryConnector>> {
        self.dbs.read().get(name).cloned()
    }

    /// Create a bare database without going through a workspace
    pub fn insert_db(&self, name: &str) -> Arc<MemoryConnector> {
        self.dbs
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryConnector::new(name)))
            .clone()
    }
}

impl ConnectorProvider for MemoryProvider {
    fn list_names(&self) -> Result<Vec<String>, ConnectorError> {
        Ok(self.dbs.read().keys().cloned().collect())
    }

    fn create(&self, name: &str, kind: DbKind) -> Result<Option<SharedConnector>, ConnectorError> {
        let mut dbs = self.dbs.write();
        if dbs.contains_key(name) {
            return Ok(None);
        }
        tracing::debug!("Creating in-memory {} database '{}'", kind, name);
        let connector = Arc::new(MemoryConnector::new(name));
        dbs.insert(name.to_string(), connector.clone());
        Ok(Some(connector as SharedConnector))
    }

    fn acquire(&self, name: &str) -> Result<SharedConnector, ConnectorError> {
        self.dbs
            .read()
            .get(name)
            .cloned()
            .map(|c| c as SharedConnector)
            .ok_or_else(|| ConnectorError::not_found(format!("Database {} does not exist", name)))
    }

    fn remove(&self, name: &str) -> Result<bool, ConnectorError> {
        Ok(self.dbs.write().remove(name).is_some())
    }

    fn exists(&self, name: &str) -> Result<bool, ConnectorError> {
        Ok(self.dbs.read().contains_key(name))
    }

    fn kind_of(&self, name: &str) -> Result<String, ConnectorError> {
        if self.dbs.read().contains_key(name) {
            Ok(DbKind::CouchDb.tag().to_string())
        } else {
            Err(ConnectorError::not_found(format!("Database {} does not exist", name)))
        }
    }

    fn supported_kinds(&self) -> Vec<String> {
        vec![DbKind::CouchDb.tag().to_string()]
    }

    fn reload_config(&self) -> Result<(), ConnectorError> {
        Ok(())
    }
}
