//! Change feed watching
//!
//! [`ChangesManager`] follows the change feed of the active workspace on a
//! background thread and republishes what it sees on the notification bus.
//! Only one database is watched at a time.

use crate::db::{SharedConnector, SEQ_NOW};
use crate::mappers::MapperManager;
use crate::notifications::{Notification, NotificationBus};
use crate::workspace::Host;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Subscribes to live updates of one workspace database
pub trait ChangeWatcher: Send + Sync {
    /// Start watching a database; any previous subscription is stopped first
    fn watch(&self, mappers: Arc<MapperManager>, connector: SharedConnector);

    /// Stop watching (no-op if nothing is watched)
    fn unwatch(&self);
}

struct WatchHandle {
    db: String,
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

/// Polling change watcher
pub struct ChangesManager {
    bus: NotificationBus,
    poll_interval: Duration,
    current: Mutex<Option<WatchHandle>>,
}

impl ChangesManager {
    /// Create a watcher that polls every `poll_interval`
    pub fn new(bus: NotificationBus, poll_interval: Duration) -> Self {
        Self {
            bus,
            poll_interval,
            current: Mutex::new(None),
        }
    }

    /// Name of the database being watched
    pub fn watched_db(&self) -> Option<String> {
        self.current.lock().as_ref().map(|h| h.db.clone())
    }

    /// Sequence to start following from, read before the thread starts
    fn starting_seq(connector: &SharedConnector, bus: &NotificationBus) -> String {
        match connector.changes_since(SEQ_NOW) {
            Ok(batch) => batch.last_seq,
            Err(e) => {
                tracing::warn!("Cannot read change feed of '{}': {}", connector.db_name(), e);
                bus.connection_problem(e.to_string());
                SEQ_NOW.to_string()
            }
        }
    }

    fn poll_loop(
        mappers: Arc<MapperManager>,
        connector: SharedConnector,
        bus: NotificationBus,
        interval: Duration,
        mut since: String,
        stop_rx: crossbeam_channel::Receiver<()>,
    ) {
        loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }

            match connector.changes_since(&since) {
                Ok(batch) => {
                    since = batch.last_seq;
                    if batch.changes.is_empty() {
                        continue;
                    }
                    tracing::debug!(
                        "{} change(s) in '{}'",
                        batch.changes.len(),
                        connector.db_name()
                    );
                    bus.publish(Notification::ChangesDetected {
                        workspace: connector.db_name().to_string(),
                        changes: batch.changes,
                    });
                    Self::reload_hosts(&mappers, &bus);
                }
                Err(e) => {
                    tracing::warn!("Polling '{}' failed: {}", connector.db_name(), e);
                    bus.connection_problem(e.to_string());
                }
            }
        }

        tracing::debug!("Stopped watching '{}'", connector.db_name());
    }

    fn reload_hosts(mappers: &MapperManager, bus: &NotificationBus) {
        match mappers.find_all::<Host>() {
            Ok(hosts) => bus.workspace_loaded(&hosts),
            Err(e) => {
                tracing::warn!("Reloading hosts failed: {}", e);
                bus.connection_problem(e.to_string());
            }
        }
    }
}

impl ChangeWatcher for ChangesManager {
    fn watch(&self, mappers: Arc<MapperManager>, connector: SharedConnector) {
        self.unwatch();

        let db = connector.db_name().to_string();
        let (stop_tx, stop_rx) = bounded(1);
        let bus = self.bus.clone();
        let interval = self.poll_interval;
        let since = Self::starting_seq(&connector, &bus);

        let thread = std::thread::spawn(move || {
            Self::poll_loop(mappers, connector, bus, interval, since, stop_rx);
        });

        tracing::debug!("Watching '{}'", db);
        *self.current.lock() = Some(WatchHandle {
            db,
            stop_tx,
            thread,
        });
    }

    fn unwatch(&self) {
        let Some(handle) = self.current.lock().take() else {
            return;
        };

        let _ = handle.stop_tx.send(());
        if handle.thread.join().is_err() {
            tracing::warn!("Watcher thread for '{}' panicked", handle.db);
        }
    }
}

impl Drop for ChangesManager {
    fn drop(&mut self) {
        self.unwatch();
    }
}
