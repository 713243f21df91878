//! Mapper registry
//!
//! Translates between stored documents and domain entities. The registry is
//! a shared, re-targetable resource: the workspace manager rebinds it to a
//! new connector every time a workspace is created or opened.

use crate::db::SharedConnector;
use crate::error::ConnectorError;
use crate::workspace::{Host, Workspace};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Document field holding the entity type tag
const TYPE_FIELD: &str = "type";

/// A domain object persisted as one document
pub trait Entity: Serialize + DeserializeOwned {
    /// Type tag stored in every document of this entity
    const TYPE: &'static str;

    /// Document ID
    fn doc_id(&self) -> &str;
}

impl Entity for Workspace {
    const TYPE: &'static str = "Workspace";

    fn doc_id(&self) -> &str {
        &self.name
    }
}

impl Entity for Host {
    const TYPE: &'static str = "Host";

    fn doc_id(&self) -> &str {
        &self.id
    }
}

fn has_type(doc: &Value, tag: &str) -> bool {
    doc.get(TYPE_FIELD).and_then(Value::as_str) == Some(tag)
}

/// Registry of entity mappers bound to one connector at a time
#[derive(Default)]
pub struct MapperManager {
    connector: RwLock<Option<SharedConnector>>,
}

impl MapperManager {
    /// Create an unbound registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-target all mappers at a connector
    pub fn bind(&self, connector: SharedConnector) {
        tracing::debug!("Binding mappers to '{}'", connector.db_name());
        *self.connector.write() = Some(connector);
    }

    /// Whether a connector is bound
    pub fn is_bound(&self) -> bool {
        self.connector.read().is_some()
    }

    /// Name of the bound database
    pub fn bound_db(&self) -> Option<String> {
        self.connector
            .read()
            .as_ref()
            .map(|c| c.db_name().to_string())
    }

    fn connector(&self) -> Result<SharedConnector, ConnectorError> {
        self.connector
            .read()
            .clone()
            .ok_or_else(|| ConnectorError::other("Mappers are not bound to a database"))
    }

    /// Persist an entity
    pub fn save<E: Entity>(&self, entity: &E) -> Result<(), ConnectorError> {
        let mut doc = serde_json::to_value(entity)?;
        let obj = doc
            .as_object_mut()
            .ok_or_else(|| ConnectorError::other(format!("{} is not a JSON object", E::TYPE)))?;
        obj.insert(TYPE_FIELD.to_string(), Value::String(E::TYPE.to_string()));

        self.connector()?.save_document(entity.doc_id(), doc)
    }

    /// Find an entity by ID
    pub fn find<E: Entity>(&self, id: &str) -> Result<Option<E>, ConnectorError> {
        match self.connector()?.get_document(id)? {
            Some(doc) if has_type(&doc, E::TYPE) => Ok(Some(serde_json::from_value(doc)?)),
            _ => Ok(None),
        }
    }

    /// All entities of one type
    pub fn find_all<E: Entity>(&self) -> Result<Vec<E>, ConnectorError> {
        self.connector()?
            .all_documents()?
            .into_iter()
            .filter(|doc| has_type(doc, E::TYPE))
            .map(|doc| serde_json::from_value(doc).map_err(ConnectorError::from))
            .collect()
    }

    /// Load a workspace document together with its hosts
    pub fn find_workspace(&self, name: &str) -> Result<Option<Workspace>, ConnectorError> {
        let Some(mut workspace) = self.find::<Workspace>(name)? else {
            return Ok(None);
        };
        workspace.hosts = self.find_all::<Host>()?;
        Ok(Some(workspace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ConnectorProvider, DbConnector, MemoryProvider};
    use crate::workspace::DbKind;
    use serde_json::json;

    fn bound() -> (MapperManager, MemoryProvider) {
        let provider = MemoryProvider::new();
        let conn = provider.create("alpha", DbKind::CouchDb).unwrap().unwrap();
        let mappers = MapperManager::new();
        mappers.bind(conn);
        (mappers, provider)
    }

    #[test]
    fn test_unbound_registry_fails() {
        let mappers = MapperManager::new();
        assert!(!mappers.is_bound());
        assert!(mappers.save(&Workspace::new("alpha", "")).is_err());
    }

    #[test]
    fn test_save_and_find_workspace_with_hosts() {
        let (mappers, _provider) = bound();
        mappers.save(&Workspace::new("alpha", "pentest")).unwrap();
        mappers.save(&Host::new("h1", "10.0.0.1").with_os("linux")).unwrap();
        mappers.save(&Host::new("h2", "10.0.0.2")).unwrap();

        let ws = mappers.find_workspace("alpha").unwrap().unwrap();
        assert_eq!(ws.description, "pentest");
        assert_eq!(ws.hosts.len(), 2);
        assert_eq!(ws.hosts[0].os, "linux");
    }

    #[test]
    fn test_type_tag_must_match() {
        let (mappers, provider) = bound();
        let conn = provider.connector("alpha").unwrap();
        conn.save_document("alpha", json!({"type": "Note", "name": "alpha"}))
            .unwrap();

        assert!(mappers.find_workspace("alpha").unwrap().is_none());
    }

    #[test]
    fn test_rebind_targets_new_db() {
        let (mappers, provider) = bound();
        let beta = provider.create("beta", DbKind::CouchDb).unwrap().unwrap();
        mappers.bind(beta);
        assert_eq!(mappers.bound_db().as_deref(), Some("beta"));

        mappers.save(&Workspace::new("beta", "")).unwrap();
        assert!(provider.connector("alpha").unwrap().is_empty());
    }
}
