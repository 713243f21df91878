//! Workspace type definitions
//!
//! Core types for workspace management - serializable for persistence and IPC.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backing store technology of a workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbKind {
    /// CouchDB document store
    #[serde(rename = "couchdb")]
    CouchDb,
}

impl DbKind {
    /// All kinds this build knows about
    pub const ALL: &'static [DbKind] = &[DbKind::CouchDb];

    /// Raw tag as reported by connector providers
    pub fn tag(&self) -> &'static str {
        match self {
            DbKind::CouchDb => "couchdb",
        }
    }

    /// Parse a raw provider tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.tag() == tag)
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            DbKind::CouchDb => "CouchDB",
        }
    }

    /// Inverse of [`DbKind::label`]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.label() == label)
    }
}

impl Default for DbKind {
    fn default() -> Self {
        Self::CouchDb
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Resolved type of a workspace, as shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum WorkspaceType {
    /// A recognized backing store
    Known(DbKind),

    /// The provider reported a tag we have no mapping for
    Unknown(String),
}

impl WorkspaceType {
    /// Resolve a raw provider tag
    pub fn from_tag(tag: &str) -> Self {
        DbKind::from_tag(tag)
            .map(WorkspaceType::Known)
            .unwrap_or_else(|| WorkspaceType::Unknown(tag.to_string()))
    }

    /// Display label ("CouchDB", or "Unknown")
    pub fn label(&self) -> &'static str {
        match self {
            WorkspaceType::Known(kind) => kind.label(),
            WorkspaceType::Unknown(_) => "Unknown",
        }
    }

    /// The backing kind, if recognized
    pub fn kind(&self) -> Option<DbKind> {
        match self {
            WorkspaceType::Known(kind) => Some(*kind),
            WorkspaceType::Unknown(_) => None,
        }
    }
}

impl fmt::Display for WorkspaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A host record stored in a workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    /// Document identifier
    pub id: String,

    /// Host name or address
    pub name: String,

    /// Operating system, if known
    #[serde(default)]
    pub os: String,

    /// Free-form notes
    #[serde(default)]
    pub description: String,
}

impl Host {
    /// Create a new host record
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            os: String::new(),
            description: String::new(),
        }
    }

    /// Set the operating system
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }
}

/// A named, isolated project dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    /// Unique name, also the database name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Hosts loaded from the workspace database
    ///
    /// Hosts are stored as their own documents, never inside the
    /// workspace document.
    #[serde(skip)]
    pub hosts: Vec<Host>,
}

impl Workspace {
    /// Create a new workspace with no hosts
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            hosts: Vec::new(),
        }
    }

    /// Workspace name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Hosts currently loaded
    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }
}
