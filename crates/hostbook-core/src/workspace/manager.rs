//! WorkspaceManager - Central coordinator for workspace lifecycle
//!
//! Creates, opens, closes and removes workspaces, and keeps the mapper
//! registry and change watcher pointed at the single active workspace.

use super::types::{DbKind, Workspace, WorkspaceType};
use crate::changes::ChangeWatcher;
use crate::db::{ConnectorProvider, SharedConnector};
use crate::error::{ConnectorError, Result, WorkspaceError};
use crate::mappers::MapperManager;
use crate::notifications::{Notification, NotificationBus};
use parking_lot::{Mutex, RwLock};
use regex::Regex;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

/// Lowercase letter first, then lowercase letters, digits and `_$()+-/`
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_$()+\-/]*$").expect("valid name pattern"));

/// Manages workspace lifecycle and the active workspace
pub struct WorkspaceManager {
    /// Database connector provider
    provider: Arc<dyn ConnectorProvider>,

    /// Mapper registry, rebound on every create/open
    mappers: Arc<MapperManager>,

    /// Change watcher, restarted on every create/open
    watcher: Arc<dyn ChangeWatcher>,

    /// Outgoing notifications
    bus: NotificationBus,

    /// Reserved names
    blacklist: HashSet<String>,

    /// Currently active workspace
    active: RwLock<Option<Workspace>>,

    /// Serializes lifecycle sequences (stop watcher, rebind, start watcher)
    lifecycle: Mutex<()>,
}

impl WorkspaceManager {
    /// Create a new WorkspaceManager
    pub fn new<I, S>(
        provider: Arc<dyn ConnectorProvider>,
        mappers: Arc<MapperManager>,
        watcher: Arc<dyn ChangeWatcher>,
        bus: NotificationBus,
        blacklist: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            provider,
            mappers,
            watcher,
            bus,
            blacklist: blacklist.into_iter().map(Into::into).collect(),
            active: RwLock::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    // ========== Queries ==========

    /// Names of all workspaces known to the database server
    pub fn workspace_names(&self) -> Result<Vec<String>> {
        Ok(self.provider.list_names()?)
    }

    /// Whether a workspace database exists
    pub fn workspace_exists(&self, name: &str) -> Result<bool> {
        Ok(self.provider.exists(name)?)
    }

    fn is_listed(&self, name: &str) -> Result<bool> {
        Ok(self.workspace_names()?.iter().any(|n| n == name))
    }

    /// Reserved names rejected by [`WorkspaceManager::is_workspace_name_valid`]
    pub fn blacklist(&self) -> &HashSet<String> {
        &self.blacklist
    }

    /// Check a candidate workspace name
    pub fn is_workspace_name_valid(&self, name: &str) -> bool {
        NAME_PATTERN.is_match(name) && !self.blacklist.contains(name)
    }

    // ========== Workspace Types ==========

    /// Resolved type of a workspace
    pub fn workspace_type(&self, name: &str) -> Result<WorkspaceType> {
        let tag = self.provider.kind_of(name)?;
        Ok(WorkspaceType::from_tag(&tag))
    }

    /// Map a display label back to its kind
    pub fn named_type_to_kind(&self, label: &str) -> Option<DbKind> {
        DbKind::from_label(label)
    }

    /// Types the provider can create
    pub fn available_workspace_types(&self) -> Vec<WorkspaceType> {
        self.provider
            .supported_kinds()
            .iter()
            .map(|tag| WorkspaceType::from_tag(tag))
            .collect()
    }

    /// Re-read connection settings
    pub fn refresh_configuration(&self) -> Result<()> {
        Ok(self.provider.reload_config()?)
    }

    // ========== Active Workspace ==========

    /// Get the currently active workspace
    pub fn active_workspace(&self) -> Option<Workspace> {
        self.active.read().clone()
    }

    /// Replace the active workspace reference
    pub fn set_active_workspace(&self, workspace: Workspace) {
        *self.active.write() = Some(workspace);
    }

    /// Whether `name` is the active workspace
    ///
    /// Fails with [`WorkspaceError::NoActiveWorkspace`] when nothing is active.
    pub fn is_active(&self, name: &str) -> Result<bool> {
        self.active
            .read()
            .as_ref()
            .map(|ws| ws.name == name)
            .ok_or(WorkspaceError::NoActiveWorkspace)
    }

    // ========== Lifecycle ==========

    /// Create a workspace and make it active
    ///
    /// Returns `Ok(None)` when the provider declines to create the database
    /// without reporting an error (e.g. it already exists). Nothing is
    /// activated in that case.
    pub fn create_workspace(
        &self,
        name: &str,
        description: &str,
        kind: DbKind,
    ) -> Result<Option<Workspace>> {
        let _guard = self.lifecycle.lock();
        let workspace = Workspace::new(name, description);

        let connector = match self.provider.create(name, kind) {
            Ok(Some(connector)) => connector,
            Ok(None) => {
                tracing::warn!("Provider declined to create workspace '{}'", name);
                return Ok(None);
            }
            Err(ConnectorError::Unauthorized(msg)) => {
                tracing::warn!("Not authorized to create '{}': {}", name, msg);
                return Err(WorkspaceError::create_unauthorized());
            }
            Err(e) => return Err(WorkspaceError::backend(e.to_string())),
        };

        self.close_locked();
        self.mappers.bind(connector.clone());
        self.mappers.save(&workspace)?;
        self.activate(workspace.clone(), connector)?;

        tracing::info!("Created workspace '{}'", name);
        Ok(Some(workspace))
    }

    /// Open an existing workspace and make it active
    pub fn open_workspace(&self, name: &str) -> Result<Workspace> {
        let _guard = self.lifecycle.lock();

        if !self.is_listed(name)? {
            return Err(WorkspaceError::not_found(name));
        }

        self.close_locked();

        let connector = match self.provider.acquire(name) {
            Ok(connector) => connector,
            Err(ConnectorError::Unauthorized(msg)) => {
                tracing::warn!("Not authorized to open '{}': {}", name, msg);
                return Err(WorkspaceError::access_unauthorized());
            }
            Err(e) => {
                tracing::warn!("Cannot connect to workspace '{}': {}", name, e);
                self.bus.connection_problem(e.to_string());
                return Err(WorkspaceError::backend(e.to_string()));
            }
        };

        self.mappers.bind(connector.clone());
        let workspace = self
            .mappers
            .find_workspace(name)?
            .ok_or_else(|| WorkspaceError::load_failed(name))?;

        self.activate(workspace.clone(), connector)?;

        tracing::info!("Opened workspace '{}'", name);
        Ok(workspace)
    }

    /// Stop live synchronization of the active workspace
    ///
    /// The active reference is kept: a closed workspace remains the
    /// last-known context until another one is created or opened.
    pub fn close_workspace(&self) {
        let _guard = self.lifecycle.lock();
        self.close_locked();
    }

    /// Delete a workspace database
    ///
    /// Unknown names are ignored and return `Ok(None)` without contacting
    /// the provider for a deletion.
    pub fn remove_workspace(&self, name: &str) -> Result<Option<bool>> {
        let _guard = self.lifecycle.lock();

        if !self.is_listed(name)? {
            return Ok(None);
        }

        let is_active = self
            .active
            .read()
            .as_ref()
            .is_some_and(|ws| ws.name == name);
        if is_active {
            self.close_locked();
        }

        let removed = self.provider.remove(name)?;
        if removed {
            tracing::info!("Removed workspace '{}'", name);
            self.bus.publish(Notification::WorkspaceRemoved {
                name: name.to_string(),
            });
        }
        Ok(Some(removed))
    }

    /// Rewrite a missing workspace document
    ///
    /// Used when a database is listed but cannot be opened because its
    /// workspace document is gone. Returns `Ok(true)` if a document was
    /// written. The repair goes through its own mapper registry, so the
    /// active workspace, its mappers and its watcher are left untouched.
    pub fn repair_workspace(&self, name: &str, description: &str) -> Result<bool> {
        let _guard = self.lifecycle.lock();

        if !self.is_listed(name)? {
            return Err(WorkspaceError::not_found(name));
        }

        let connector = match self.provider.acquire(name) {
            Ok(connector) => connector,
            Err(ConnectorError::Unauthorized(_)) => {
                return Err(WorkspaceError::access_unauthorized())
            }
            Err(e) => return Err(WorkspaceError::backend(e.to_string())),
        };

        let mappers = MapperManager::new();
        mappers.bind(connector);

        if mappers.find_workspace(name)?.is_some() {
            return Ok(false);
        }

        mappers.save(&Workspace::new(name, description))?;
        tracing::info!("Rebuilt workspace document for '{}'", name);
        Ok(true)
    }

    fn close_locked(&self) {
        self.watcher.unwatch();
    }

    fn activate(&self, workspace: Workspace, connector: SharedConnector) -> Result<()> {
        let workspace_type = self.workspace_type(&workspace.name)?;

        self.set_active_workspace(workspace.clone());
        self.bus.workspace_changed(&workspace, workspace_type.label());
        self.bus.workspace_loaded(&workspace.hosts);
        self.watcher.watch(self.mappers.clone(), connector);
        Ok(())
    }
}

impl Drop for WorkspaceManager {
    fn drop(&mut self) {
        self.watcher.unwatch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::ChangesManager;
    use crate::db::{DbConnector, MemoryProvider};
    use crate::workspace::Host;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    /// Records watch/unwatch calls in order
    #[derive(Default)]
    struct RecordingWatcher {
        calls: Mutex<Vec<String>>,
    }

    impl RecordingWatcher {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    impl ChangeWatcher for RecordingWatcher {
        fn watch(&self, _mappers: Arc<MapperManager>, connector: SharedConnector) {
            self.calls
                .lock()
                .push(format!("watch:{}", connector.db_name()));
        }

        fn unwatch(&self) {
            self.calls.lock().push("unwatch".to_string());
        }
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Failure {
        None,
        Unauthorized,
        Connection,
    }

    /// Wraps a memory provider and injects failures
    struct FlakyProvider {
        inner: MemoryProvider,
        failure: Mutex<Failure>,
        unreachable: Mutex<HashSet<String>>,
        removals: Mutex<Vec<String>>,
    }

    impl FlakyProvider {
        fn new() -> Self {
            Self {
                inner: MemoryProvider::new(),
                failure: Mutex::new(Failure::None),
                unreachable: Mutex::new(HashSet::new()),
                removals: Mutex::new(Vec::new()),
            }
        }

        fn fail_with(&self, failure: Failure) {
            *self.failure.lock() = failure;
        }

        /// Make `acquire` of one database fail with a connection error
        fn make_unreachable(&self, name: &str) {
            self.unreachable.lock().insert(name.to_string());
        }

        fn check(&self) -> std::result::Result<(), ConnectorError> {
            match *self.failure.lock() {
                Failure::None => Ok(()),
                Failure::Unauthorized => Err(ConnectorError::unauthorized("bad credentials")),
                Failure::Connection => Err(ConnectorError::connection("connection refused")),
            }
        }
    }

    impl ConnectorProvider for FlakyProvider {
        fn list_names(&self) -> std::result::Result<Vec<String>, ConnectorError> {
            self.inner.list_names()
        }

        fn create(
            &self,
            name: &str,
            kind: DbKind,
        ) -> std::result::Result<Option<SharedConnector>, ConnectorError> {
            self.check()?;
            self.inner.create(name, kind)
        }

        fn acquire(&self, name: &str) -> std::result::Result<SharedConnector, ConnectorError> {
            self.check()?;
            if self.unreachable.lock().contains(name) {
                return Err(ConnectorError::connection("connection refused"));
            }
            self.inner.acquire(name)
        }

        fn remove(&self, name: &str) -> std::result::Result<bool, ConnectorError> {
            self.removals.lock().push(name.to_string());
            self.inner.remove(name)
        }

        fn exists(&self, name: &str) -> std::result::Result<bool, ConnectorError> {
            self.inner.exists(name)
        }

        fn kind_of(&self, name: &str) -> std::result::Result<String, ConnectorError> {
            self.inner.kind_of(name)
        }

        fn supported_kinds(&self) -> Vec<String> {
            self.inner.supported_kinds()
        }

        fn reload_config(&self) -> std::result::Result<(), ConnectorError> {
            self.inner.reload_config()
        }
    }

    struct Fixture {
        manager: WorkspaceManager,
        provider: Arc<FlakyProvider>,
        watcher: Arc<RecordingWatcher>,
        bus: NotificationBus,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(FlakyProvider::new());
        let watcher = Arc::new(RecordingWatcher::default());
        let bus = NotificationBus::default();
        let manager = WorkspaceManager::new(
            provider.clone(),
            Arc::new(MapperManager::new()),
            watcher.clone(),
            bus.clone(),
            ["reports", "cwe"],
        );
        Fixture {
            manager,
            provider,
            watcher,
            bus,
        }
    }

    #[test]
    fn test_name_validation() {
        let f = fixture();
        let m = &f.manager;

        assert!(m.is_workspace_name_valid("proj1"));
        assert!(m.is_workspace_name_valid("a"));
        assert!(m.is_workspace_name_valid("team/web-app_(2)+$x"));

        assert!(!m.is_workspace_name_valid(""));
        assert!(!m.is_workspace_name_valid("Proj1"));
        assert!(!m.is_workspace_name_valid("_proj"));
        assert!(!m.is_workspace_name_valid("1proj"));
        assert!(!m.is_workspace_name_valid("proj one"));
        assert!(!m.is_workspace_name_valid("proj.1"));
        assert!(!m.is_workspace_name_valid("projA"));
        assert!(!m.is_workspace_name_valid("reports"));
        assert!(!m.is_workspace_name_valid("cwe"));
        assert!(m.is_workspace_name_valid("reports2"));
        assert!(m.blacklist().contains("cwe"));
    }

    #[test]
    fn test_no_active_workspace_initially() {
        let f = fixture();
        assert!(f.manager.active_workspace().is_none());
        assert_eq!(
            f.manager.is_active("alpha"),
            Err(WorkspaceError::NoActiveWorkspace)
        );
    }

    #[test]
    fn test_create_activates_and_notifies() {
        let f = fixture();
        let ws = f
            .manager
            .create_workspace("alpha", "desc", DbKind::CouchDb)
            .unwrap()
            .unwrap();

        assert_eq!(ws.name, "alpha");
        assert_eq!(f.manager.active_workspace().unwrap().name, "alpha");
        assert_eq!(f.manager.is_active("alpha"), Ok(true));
        assert_eq!(f.manager.is_active("beta"), Ok(false));

        assert_eq!(
            f.bus.drain(10),
            vec![
                Notification::workspace_changed(Workspace::new("alpha", "desc"), "CouchDB"),
                Notification::workspace_loaded(vec![]),
            ]
        );
        assert_eq!(f.watcher.calls(), vec!["unwatch", "watch:alpha"]);
    }

    #[test]
    fn test_second_create_stops_previous_watcher_first() {
        let f = fixture();
        f.manager
            .create_workspace("alpha", "a", DbKind::CouchDb)
            .unwrap();
        f.manager
            .create_workspace("beta", "b", DbKind::CouchDb)
            .unwrap();

        assert_eq!(
            f.watcher.calls(),
            vec!["unwatch", "watch:alpha", "unwatch", "watch:beta"]
        );
        assert_eq!(f.manager.active_workspace().unwrap().name, "beta");
    }

    #[test]
    fn test_create_declined() {
        let f = fixture();
        f.provider.inner.insert_db("alpha");

        let result = f
            .manager
            .create_workspace("alpha", "desc", DbKind::CouchDb)
            .unwrap();
        assert!(result.is_none());
        assert!(f.manager.active_workspace().is_none());
        assert!(f.watcher.calls().is_empty());
        assert!(f.bus.try_recv().is_none());
    }

    #[test]
    fn test_create_unauthorized() {
        let f = fixture();
        f.provider.fail_with(Failure::Unauthorized);

        let err = f
            .manager
            .create_workspace("alpha", "desc", DbKind::CouchDb)
            .unwrap_err();
        assert_eq!(err, WorkspaceError::create_unauthorized());
        assert!(err.to_string().contains("couch_uri"));
        assert!(f.manager.active_workspace().is_none());
        assert!(f.watcher.calls().is_empty());
    }

    #[test]
    fn test_create_other_failure_not_published() {
        let f = fixture();
        f.provider.fail_with(Failure::Connection);

        let err = f
            .manager
            .create_workspace("alpha", "desc", DbKind::CouchDb)
            .unwrap_err();
        assert_eq!(
            err,
            WorkspaceError::Backend("Connection error: connection refused".into())
        );
        assert!(f.bus.try_recv().is_none());
    }

    #[test]
    fn test_open_unknown_keeps_active() {
        let f = fixture();
        f.manager
            .create_workspace("alpha", "a", DbKind::CouchDb)
            .unwrap();
        let calls_before = f.watcher.calls();

        let err = f.manager.open_workspace("ghost").unwrap_err();
        assert_eq!(err, WorkspaceError::not_found("ghost"));
        assert_eq!(f.manager.active_workspace().unwrap().name, "alpha");
        assert_eq!(f.watcher.calls(), calls_before);
    }

    #[test]
    fn test_reopen_round_trips_description_and_hosts() {
        let f = fixture();
        f.manager
            .create_workspace("alpha", "External pentest", DbKind::CouchDb)
            .unwrap();
        f.manager
            .create_workspace("beta", "other", DbKind::CouchDb)
            .unwrap();

        let alpha = f.provider.inner.connector("alpha").unwrap();
        alpha
            .save_document(
                "h1",
                serde_json::json!({"type": "Host", "id": "h1", "name": "10.0.0.1"}),
            )
            .unwrap();
        f.bus.drain(100);

        let ws = f.manager.open_workspace("alpha").unwrap();
        assert_eq!(ws.description, "External pentest");
        assert_eq!(ws.hosts, vec![Host::new("h1", "10.0.0.1")]);
        assert_eq!(f.manager.is_active("alpha"), Ok(true));
        assert_eq!(
            f.bus.drain(10)[1],
            Notification::workspace_loaded(vec![Host::new("h1", "10.0.0.1")])
        );
    }

    #[test]
    fn test_open_unauthorized() {
        let f = fixture();
        f.provider.inner.insert_db("alpha");
        f.provider.fail_with(Failure::Unauthorized);

        let err = f.manager.open_workspace("alpha").unwrap_err();
        assert_eq!(err, WorkspaceError::access_unauthorized());
        assert!(f.bus.try_recv().is_none());
    }

    #[test]
    fn test_open_connection_failure_is_published() {
        let f = fixture();
        f.provider.inner.insert_db("alpha");
        f.provider.fail_with(Failure::Connection);

        let err = f.manager.open_workspace("alpha").unwrap_err();
        assert!(matches!(err, WorkspaceError::Backend(_)));
        assert_eq!(
            f.bus.try_recv(),
            Some(Notification::connection_problem(
                "Connection error: connection refused"
            ))
        );
    }

    #[test]
    fn test_open_without_workspace_document() {
        let f = fixture();
        f.manager
            .create_workspace("alpha", "a", DbKind::CouchDb)
            .unwrap();
        f.provider.inner.insert_db("legacy");

        let err = f.manager.open_workspace("legacy").unwrap_err();
        assert_eq!(err, WorkspaceError::load_failed("legacy"));
        // Previous workspace stays closed but still referenced
        assert_eq!(
            f.watcher.calls(),
            vec!["unwatch", "watch:alpha", "unwatch"]
        );
        assert_eq!(f.manager.active_workspace().unwrap().name, "alpha");
    }

    #[test]
    fn test_close_keeps_active_reference() {
        let f = fixture();
        f.manager
            .create_workspace("alpha", "a", DbKind::CouchDb)
            .unwrap();
        f.manager.close_workspace();

        assert_eq!(f.watcher.calls().last().unwrap(), "unwatch");
        assert_eq!(f.manager.is_active("alpha"), Ok(true));
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let f = fixture();
        assert_eq!(f.manager.remove_workspace("ghost"), Ok(None));
        assert!(f.provider.removals.lock().is_empty());
    }

    #[test]
    fn test_remove_active_stops_watcher() {
        let f = fixture();
        f.manager
            .create_workspace("alpha", "a", DbKind::CouchDb)
            .unwrap();
        f.bus.drain(10);

        assert_eq!(f.manager.remove_workspace("alpha"), Ok(Some(true)));
        assert_eq!(f.watcher.calls().last().unwrap(), "unwatch");
        assert!(!f.manager.workspace_exists("alpha").unwrap());
        assert_eq!(
            f.bus.try_recv(),
            Some(Notification::WorkspaceRemoved {
                name: "alpha".into()
            })
        );
    }

    #[test]
    fn test_type_mapping_is_inverse() {
        let f = fixture();
        f.manager
            .create_workspace("alpha", "a", DbKind::CouchDb)
            .unwrap();

        assert_eq!(
            f.manager.workspace_type("alpha").unwrap(),
            WorkspaceType::Known(DbKind::CouchDb)
        );
        for ty in f.manager.available_workspace_types() {
            let kind = ty.kind().unwrap();
            assert_eq!(f.manager.named_type_to_kind(ty.label()), Some(kind));
        }
        assert_eq!(f.manager.named_type_to_kind("Postgres"), None);
    }

    #[test]
    fn test_repair_rebuilds_missing_document() {
        let f = fixture();
        f.manager
            .create_workspace("alpha", "a", DbKind::CouchDb)
            .unwrap();
        f.provider.inner.insert_db("legacy");

        assert_eq!(f.manager.repair_workspace("legacy", "restored"), Ok(true));
        assert_eq!(f.manager.repair_workspace("legacy", "again"), Ok(false));
        assert_eq!(
            f.manager.repair_workspace("ghost", ""),
            Err(WorkspaceError::not_found("ghost"))
        );

        let ws = f.manager.open_workspace("legacy").unwrap();
        assert_eq!(ws.description, "restored");
    }

    #[test]
    fn test_repair_leaves_active_watcher_alone() {
        let provider = Arc::new(FlakyProvider::new());
        let mappers = Arc::new(MapperManager::new());
        let bus = NotificationBus::default();
        let manager = WorkspaceManager::new(
            provider.clone(),
            mappers.clone(),
            Arc::new(ChangesManager::new(bus.clone(), Duration::from_millis(5))),
            bus.clone(),
            Vec::<String>::new(),
        );
        manager
            .create_workspace("alpha", "a", DbKind::CouchDb)
            .unwrap();

        let legacy = provider.inner.insert_db("legacy");
        legacy
            .save_document(
                "lh",
                serde_json::json!({"type": "Host", "id": "lh", "name": "LEGACY-HOST"}),
            )
            .unwrap();
        provider.make_unreachable("alpha");

        assert_eq!(manager.repair_workspace("legacy", "restored"), Ok(true));
        assert_eq!(mappers.bound_db().as_deref(), Some("alpha"));
        assert_eq!(manager.active_workspace().unwrap().name, "alpha");
        bus.drain(100);

        let alpha = provider.inner.connector("alpha").unwrap();
        alpha
            .save_document(
                "h1",
                serde_json::json!({"type": "Host", "id": "h1", "name": "10.0.0.1"}),
            )
            .unwrap();

        let mut loaded = None;
        for _ in 0..200 {
            if let Some(Notification::WorkspaceLoaded { hosts }) =
                bus.recv_timeout(Duration::from_millis(10))
            {
                loaded = Some(hosts);
                break;
            }
        }
        assert_eq!(loaded.unwrap(), vec![Host::new("h1", "10.0.0.1")]);
    }
}
