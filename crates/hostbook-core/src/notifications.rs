//! Notifications that the Hostbook core sends to any UI
//!
//! These notifications inform the UI about workspace switches, data loads
//! and connectivity problems. They are serializable so they can cross a
//! process boundary unchanged.

use crate::db::DocumentChange;
use crate::workspace::{Host, Workspace};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Notifications that the core sends to any UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    /// The active workspace changed
    WorkspaceChanged {
        /// The newly active workspace
        workspace: Workspace,

        /// Display label of its backing store
        workspace_type: String,
    },

    /// Workspace data (hosts) was loaded or reloaded
    WorkspaceLoaded {
        /// Hosts of the active workspace
        hosts: Vec<Host>,
    },

    /// The database server could not be reached
    ConnectionProblem {
        /// Error message
        message: String,
    },

    /// The change feed of the watched workspace reported changes
    ChangesDetected {
        /// Workspace name
        workspace: String,

        /// Changed documents
        changes: Vec<DocumentChange>,
    },

    /// A workspace was removed
    WorkspaceRemoved {
        /// Workspace name
        name: String,
    },
}

impl Notification {
    /// Create a WorkspaceChanged notification
    pub fn workspace_changed(workspace: Workspace, workspace_type: impl Into<String>) -> Self {
        Notification::WorkspaceChanged {
            workspace,
            workspace_type: workspace_type.into(),
        }
    }

    /// Create a WorkspaceLoaded notification
    pub fn workspace_loaded(hosts: Vec<Host>) -> Self {
        Notification::WorkspaceLoaded { hosts }
    }

    /// Create a ConnectionProblem notification
    pub fn connection_problem(message: impl Into<String>) -> Self {
        Notification::ConnectionProblem {
            message: message.into(),
        }
    }
}

/// Process-wide publish point for notifications
///
/// Backed by a bounded crossbeam channel. Cloning the bus shares the
/// channel; every receiver competes for the same messages.
#[derive(Clone)]
pub struct NotificationBus {
    tx: Sender<Notification>,
    rx: Receiver<Notification>,
}

impl NotificationBus {
    /// Create a new bus with specified capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// Publish a notification
    ///
    /// Never blocks: when the bus is full the notification is dropped.
    pub fn publish(&self, notification: Notification) {
        match self.tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(n)) => {
                tracing::warn!("Notification bus full, dropping {:?}", n);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Announce a workspace switch
    pub fn workspace_changed(&self, workspace: &Workspace, workspace_type: &str) {
        self.publish(Notification::workspace_changed(
            workspace.clone(),
            workspace_type,
        ));
    }

    /// Announce loaded workspace data
    pub fn workspace_loaded(&self, hosts: &[Host]) {
        self.publish(Notification::workspace_loaded(hosts.to_vec()));
    }

    /// Announce a connectivity problem
    pub fn connection_problem(&self, message: impl Into<String>) {
        self.publish(Notification::connection_problem(message));
    }

    /// Get a receiver for listeners
    pub fn subscribe(&self) -> Receiver<Notification> {
        self.rx.clone()
    }

    /// Receive the next notification with timeout
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Notification> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Try to receive without blocking
    pub fn try_recv(&self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }

    /// Drain up to `max` notifications
    pub fn drain(&self, max: usize) -> Vec<Notification> {
        let mut notifications = Vec::with_capacity(max.min(64));
        while notifications.len() < max {
            match self.rx.try_recv() {
                Ok(n) => notifications.push(n),
                Err(_) => break,
            }
        }
        notifications
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
