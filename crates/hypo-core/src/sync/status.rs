//! Sync status signal
//!
//! The engine publishes its state over a `watch` channel so a UI can show
//! "syncing", "offline" and the last error without polling.

use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// Coarse sync state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// No pass has run yet
    Idle,
    /// A pass is in progress
    Syncing,
    /// The last pass finished without failures
    Synced,
    /// The remote store could not be reached
    Offline,
    /// The last pass failed or finished with failures
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
            SyncStatus::Offline => "offline",
            SyncStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Status together with the details a UI shows next to it
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub status: SyncStatus,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: SyncStatus::Idle,
            last_error: None,
            last_synced_at: None,
        }
    }
}

/// Publisher side of the status channel
#[derive(Debug)]
pub struct StatusSignal {
    tx: watch::Sender<StatusSnapshot>,
}

impl Default for StatusSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StatusSnapshot::default());
        Self { tx }
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }

    /// Current status
    pub fn current(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn syncing(&self) {
        self.tx.send_modify(|s| s.status = SyncStatus::Syncing);
    }

    pub(crate) fn synced(&self) {
        self.tx.send_modify(|s| {
            s.status = SyncStatus::Synced;
            s.last_error = None;
            s.last_synced_at = Some(Utc::now());
        });
    }

    pub(crate) fn failed(&self, offline: bool, message: String) {
        self.tx.send_modify(|s| {
            s.status = if offline {
                SyncStatus::Offline
            } else {
                SyncStatus::Error
            };
            s.last_error = Some(message);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let signal = StatusSignal::new();
        let rx = signal.subscribe();
        assert_eq!(rx.borrow().status, SyncStatus::Idle);

        signal.syncing();
        assert_eq!(signal.current().status, SyncStatus::Syncing);

        signal.failed(true, "no route to host".into());
        let snapshot = rx.borrow().clone();
        assert_eq!(snapshot.status, SyncStatus::Offline);
        assert_eq!(snapshot.last_error.as_deref(), Some("no route to host"));

        signal.synced();
        let snapshot = signal.current();
        assert_eq!(snapshot.status, SyncStatus::Synced);
        assert!(snapshot.last_error.is_none());
        assert!(snapshot.last_synced_at.is_some());
    }

    #[test]
    fn test_display() {
        assert_eq!(SyncStatus::Offline.to_string(), "offline");
    }
}
