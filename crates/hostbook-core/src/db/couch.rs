//! CouchDB connector over HTTP
//!
//! Talks to the CouchDB REST API with a blocking `ureq` agent. Credentials
//! are taken from the userinfo part of the configured URI.

use super::{ChangeBatch, ConnectorProvider, DbConnector, DocumentChange, SharedConnector};
use crate::config::{load_config, DatabaseConfig};
use crate::error::ConnectorError;
use crate::workspace::DbKind;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

/// Percent-encode a database name or document ID for use as a path segment
fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

/// Connection settings derived from configuration
#[derive(Clone)]
struct CouchSettings {
    base_url: String,
    agent: ureq::Agent,
}

impl CouchSettings {
    fn from_config(config: &DatabaseConfig) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(config.timeout()).build();
        Self {
            base_url: config.couch_uri.trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn db_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, encode_segment(name))
    }
}

#[derive(Deserialize)]
struct AllDocsRow {
    id: String,
    #[serde(default)]
    doc: Option<Value>,
}

#[derive(Deserialize)]
struct AllDocsResponse {
    rows: Vec<AllDocsRow>,
}

#[derive(Deserialize)]
struct ChangesResponse {
    results: Vec<DocumentChange>,
    last_seq: Value,
}

/// Handle to one CouchDB database
pub struct CouchConnector {
    name: String,
    settings: CouchSettings,
}

impl CouchConnector {
    fn db_url(&self) -> String {
        self.settings.db_url(&self.name)
    }

    fn doc_url(&self, id: &str) -> String {
        format!("{}/{}", self.db_url(), encode_segment(id))
    }
}

impl DbConnector for CouchConnector {
    fn db_name(&self) -> &str {
        &self.name
    }

    fn get_document(&self, id: &str) -> Result<Option<Value>, ConnectorError> {
        match self.settings.agent.get(&self.doc_url(id)).call() {
            Ok(response) => Ok(Some(response.into_json()?)),
            Err(ureq::Error::Status(404, _)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_document(&self, id: &str, mut doc: Value) -> Result<(), ConnectorError> {
        // Updates must carry the current revision
        let rev = self
            .get_document(id)?
            .and_then(|existing| existing.get("_rev").cloned());

        if let (Some(rev), Some(obj)) = (rev, doc.as_object_mut()) {
            obj.insert("_rev".to_string(), rev);
        }

        self.settings.agent.put(&self.doc_url(id)).send_json(doc)?;
        Ok(())
    }

    fn all_documents(&self) -> Result<Vec<Value>, ConnectorError> {
        let url = format!("{}/_all_docs?include_docs=true", self.db_url());
        let response: AllDocsResponse = self.settings.agent.get(&url).call()?.into_json()?;

        Ok(response
            .rows
            .into_iter()
            .filter(|row| !row.id.starts_with("_design/"))
            .filter_map(|row| row.doc)
            .collect())
    }

    fn changes_since(&self, since: &str) -> Result<ChangeBatch, ConnectorError> {
        let url = format!("{}/_changes?since={}", self.db_url(), encode_segment(since));
        let response: ChangesResponse = self.settings.agent.get(&url).call()?.into_json()?;

        // CouchDB 1.x reports numeric sequences, 2.x and later opaque strings
        let last_seq = match response.last_seq {
            Value::String(s) => s,
            other => other.to_string(),
        };

        Ok(ChangeBatch {
            changes: response.results,
            last_seq,
        })
    }
}

/// Connector provider backed by a CouchDB server
pub struct CouchProvider {
    settings: RwLock<CouchSettings>,

    /// Config file to re-read on reload (user config when `None`)
    config_path: Option<PathBuf>,
}

impl CouchProvider {
    /// Create a provider from database settings
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            settings: RwLock::new(CouchSettings::from_config(config)),
            config_path: None,
        }
    }

    /// Reload from this file instead of the user config
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Server URL currently in use
    pub fn base_url(&self) -> String {
        self.settings.read().base_url.clone()
    }

    fn connector(&self, name: &str) -> SharedConnector {
        Arc::new(CouchConnector {
            name: name.to_string(),
            settings: self.settings.read().clone(),
        })
    }
}

impl ConnectorProvider for CouchProvider {
    fn list_names(&self) -> Result<Vec<String>, ConnectorError> {
        let settings = self.settings.read().clone();
        let url = format!("{}/_all_dbs", settings.base_url);
        let names: Vec<String> = settings.agent.get(&url).call()?.into_json()?;

        // System databases are never workspaces
        Ok(names.into_iter().filter(|n| !n.starts_with('_')).collect())
    }

    fn create(&self, name: &str, kind: DbKind) -> Result<Option<SharedConnector>, ConnectorError> {
        let settings = self.settings.read().clone();
        tracing::debug!("Creating {} database '{}'", kind, name);

        match settings.agent.put(&settings.db_url(name)).call() {
            Ok(_) => Ok(Some(self.connector(name))),
            Err(ureq::Error::Status(412, _)) => {
                tracing::warn!("Database '{}' already exists", name);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn acquire(&self, name: &str) -> Result<SharedConnector, ConnectorError> {
        let settings = self.settings.read().clone();
        settings.agent.head(&settings.db_url(name)).call()?;
        Ok(self.connector(name))
    }

    fn remove(&self, name: &str) -> Result<bool, ConnectorError> {
        let settings = self.settings.read().clone();
        match settings.agent.delete(&settings.db_url(name)).call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(404, _)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn exists(&self, name: &str) -> Result<bool, ConnectorError> {
        let settings = self.settings.read().clone();
        match settings.agent.head(&settings.db_url(name)).call() {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(404, _)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn kind_of(&self, name: &str) -> Result<String, ConnectorError> {
        if self.exists(name)? {
            Ok(DbKind::CouchDb.tag().to_string())
        } else {
            Err(ConnectorError::not_found(format!("Database {} does not exist", name)))
        }
    }

    fn supported_kinds(&self) -> Vec<String> {
        vec![DbKind::CouchDb.tag().to_string()]
    }

    fn reload_config(&self) -> Result<(), ConnectorError> {
        let config = load_config(self.config_path.as_deref())
            .map_err(|e| ConnectorError::other(e.to_string()))?;
        *self.settings.write() = CouchSettings::from_config(&config.database);
        tracing::info!("Reloaded database settings");
        Ok(())
    }
}
