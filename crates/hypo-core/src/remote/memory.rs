//! In-process remote store
//!
//! Holds rows in memory and counts every write, so the sync engine can be
//! exercised without a network. Reads and writes can be switched to fail to
//! simulate being offline.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::models::{RemoteRow, RowPayload};

#[derive(Debug, Default)]
struct MemoryState {
    rows: Vec<RemoteRow>,
    inserts: usize,
    updates: usize,
    deletes: usize,
    offline: bool,
    fail_writes: bool,
}

/// Remote store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<MemoryState>,
}

impl MemoryRemote {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row as-is, bypassing the write counters
    pub fn seed(&self, row: RemoteRow) {
        self.state().rows.push(row);
    }

    /// Snapshot of every stored row
    pub fn rows(&self) -> Vec<RemoteRow> {
        self.state().rows.clone()
    }

    /// Look up a row by id
    pub fn row(&self, id: &str) -> Option<RemoteRow> {
        self.state().rows.iter().find(|r| r.id == id).cloned()
    }

    /// Number of rows stored
    pub fn len(&self) -> usize {
        self.state().rows.len()
    }

    /// Whether the store holds no rows
    pub fn is_empty(&self) -> bool {
        self.state().rows.is_empty()
    }

    /// Total inserts, updates and delete batches performed
    pub fn write_count(&self) -> usize {
        let state = self.state();
        state.inserts + state.updates + state.deletes
    }

    /// Number of inserts performed
    pub fn insert_count(&self) -> usize {
        self.state().inserts
    }

    /// Number of updates performed
    pub fn update_count(&self) -> usize {
        self.state().updates
    }

    /// Make every operation fail as if the network were down
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Make writes fail while reads keep working
    pub fn set_fail_writes(&self, fail: bool) {
        self.state().fail_writes = fail;
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        // A panicking test must not poison every later assertion
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_write(state: &MemoryState) -> RemoteResult<()> {
        if state.offline {
            return Err(RemoteError::Unreachable("memory remote is offline".into()));
        }
        if state.fail_writes {
            return Err(RemoteError::Status {
                status: 503,
                body: "writes disabled".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn select_by_owner(&self, owner_id: &str) -> RemoteResult<Vec<RemoteRow>> {
        let state = self.state();
        if state.offline {
            return Err(RemoteError::Unreachable("memory remote is offline".into()));
        }
        Ok(state
            .rows
            .iter()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, payload: &RowPayload) -> RemoteResult<String> {
        let mut state = self.state();
        Self::check_write(&state)?;
        let id = Uuid::new_v4().to_string();
        state.rows.push(RemoteRow::from_payload(id.clone(), payload));
        state.inserts += 1;
        Ok(id)
    }

    async fn update(&self, id: &str, payload: &RowPayload) -> RemoteResult<()> {
        let mut state = self.state();
        Self::check_write(&state)?;
        state.updates += 1;
        // PATCH semantics: updating a missing row matches nothing and succeeds
        if let Some(row) = state.rows.iter_mut().find(|r| r.id == id) {
            let created_at = row.created_at;
            *row = RemoteRow::from_payload(id, payload);
            row.created_at = created_at;
        }
        Ok(())
    }

    async fn delete_many(&self, ids: &[String]) -> RemoteResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut state = self.state();
        Self::check_write(&state)?;
        state.rows.retain(|r| !ids.contains(&r.id));
        state.deletes += 1;
        Ok(())
    }
}
