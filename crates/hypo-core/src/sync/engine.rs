//! Sync engine
//!
//! Reconciles the local entry store with the remote rows of one owner.
//! Conflicts resolve per record by last-writer-wins on `updated_at`;
//! unlinked entries find their remote counterpart by content key.
//!
//! A pass runs in six steps:
//!
//! 1. Read every remote row of the owner (failure aborts the pass)
//! 2. Split local entries into linked and unlinked
//! 3. Linked entries: pull, push or drop depending on the remote row
//! 4. Unlinked entries: link by content key, otherwise insert
//! 5. Unclaimed rows: link to an unlinked local or materialize a new entry
//! 6. Collapse remote duplicates, then local duplicates

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::dedup::deduplicate_local;
use super::lock::OwnerLocks;
use super::status::{StatusSignal, StatusSnapshot};
use crate::content_key::content_key;
use crate::error::{Error, Result};
use crate::models::{Entry, RemoteRow};
use crate::remote::{RemoteError, RemoteStore};
use crate::storage::EntryStore;

/// A remote write that failed during a pass
#[derive(Debug, Clone, PartialEq)]
pub struct SyncFailure {
    /// What was attempted ("insert", "update", "dedup", ...)
    pub operation: &'static str,
    pub entry_id: Option<Uuid>,
    pub remote_id: Option<String>,
    pub message: String,
    /// Whether the failure was a connectivity problem
    pub offline: bool,
}

impl SyncFailure {
    fn remote(operation: &'static str, error: &RemoteError) -> Self {
        Self {
            operation,
            entry_id: None,
            remote_id: None,
            message: error.to_string(),
            offline: error.is_offline(),
        }
    }

    fn from_error(operation: &'static str, error: &Error) -> Self {
        Self {
            operation,
            entry_id: None,
            remote_id: None,
            message: error.to_string(),
            offline: error.is_offline(),
        }
    }

    fn entry(mut self, id: Uuid) -> Self {
        self.entry_id = Some(id);
        self
    }

    fn row(mut self, id: &str) -> Self {
        self.remote_id = Some(id.to_string());
        self
    }
}

/// What a pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Local entries overwritten by a newer remote row
    pub pulled: usize,
    /// Remote rows overwritten by a newer local entry
    pub pushed: usize,
    /// Local entries inserted as new remote rows
    pub inserted: usize,
    /// Unlinked entries linked to an existing row by content key
    pub linked: usize,
    /// Remote rows copied into new local entries
    pub materialized: usize,
    /// Local entries removed because their row was deleted remotely
    pub deleted_local: usize,
    /// Equal timestamps with diverged content, resolved to the remote copy
    pub tie_conflicts: usize,
    pub remote_duplicates: usize,
    pub local_duplicates: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    /// Total number of writes performed on either side
    pub fn writes(&self) -> usize {
        self.pulled
            + self.pushed
            + self.inserted
            + self.linked
            + self.materialized
            + self.deleted_local
            + self.tie_conflicts
            + self.remote_duplicates
            + self.local_duplicates
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    fn record(&mut self, failure: SyncFailure) {
        warn!(
            "Sync {} failed (entry {:?}, row {:?}): {}",
            failure.operation, failure.entry_id, failure.remote_id, failure.message
        );
        self.failures.push(failure);
    }
}

/// Result of calling [`SyncEngine::sync_all`]
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// The pass ran to the end
    Completed(SyncReport),
    /// Another pass for the same owner was in flight
    Skipped,
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            SyncOutcome::Skipped => None,
        }
    }
}

/// Local entries sharing a content key, as seen while handling unclaimed rows
#[derive(Default)]
struct KeySlot {
    linked: usize,
    unlinked: Vec<Entry>,
}

/// Reconciles the local store with a remote store
pub struct SyncEngine {
    store: Arc<Mutex<EntryStore>>,
    remote: Arc<dyn RemoteStore>,
    locks: OwnerLocks,
    status: StatusSignal,
}

impl SyncEngine {
    pub fn new(store: Arc<Mutex<EntryStore>>, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            remote,
            locks: OwnerLocks::new(),
            status: StatusSignal::new(),
        }
    }

    /// Share a lock registry with other engines over the same data
    pub fn with_locks(mut self, locks: OwnerLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn store(&self) -> &Arc<Mutex<EntryStore>> {
        &self.store
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    /// Watch the status signal
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    /// Current status
    pub fn status(&self) -> StatusSnapshot {
        self.status.current()
    }

    /// Reconcile every local entry with every remote row of `owner_id`
    ///
    /// Returns [`SyncOutcome::Skipped`] without doing anything if a pass for
    /// the same owner is already running.
    pub async fn sync_all(&self, owner_id: &str) -> Result<SyncOutcome> {
        let Some(_guard) = self.locks.try_acquire(owner_id) else {
            debug!("Sync for {} already in progress, skipping", owner_id);
            return Ok(SyncOutcome::Skipped);
        };

        self.status.syncing();
        info!("Syncing entries for owner {}", owner_id);

        match self.run(owner_id).await {
            Ok(report) => {
                match report.failures.first() {
                    None => self.status.synced(),
                    Some(first) => {
                        let offline = report.failures.iter().all(|f| f.offline);
                        self.status.failed(offline, first.message.clone());
                    }
                }
                info!(
                    "Sync finished: {} pulled, {} pushed, {} inserted, {} linked, {} materialized, {} failures",
                    report.pulled,
                    report.pushed,
                    report.inserted,
                    report.linked,
                    report.materialized,
                    report.failures.len()
                );
                Ok(SyncOutcome::Completed(report))
            }
            Err(e) => {
                warn!("Sync aborted: {}", e);
                self.status.failed(e.is_offline(), e.to_string());
                Err(e)
            }
        }
    }

    async fn run(&self, owner_id: &str) -> Result<SyncReport> {
        let mut rows = self
            .remote
            .select_by_owner(owner_id)
            .await
            .map_err(Error::RemoteUnavailable)?;
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        debug!("Read {} remote rows", rows.len());

        let mut report = SyncReport::default();
        let rows_by_id: HashMap<&str, &RemoteRow> =
            rows.iter().map(|r| (r.id.as_str(), r)).collect();
        let mut claimed: HashSet<String> = HashSet::new();

        let locals = self.store.lock().await.get_all_entries()?;
        let (linked, mut unlinked): (Vec<Entry>, Vec<Entry>) =
            locals.into_iter().partition(Entry::is_linked);

        for entry in linked {
            let Some(remote_id) = entry.remote_id.clone() else {
                continue;
            };
            match rows_by_id.get(remote_id.as_str()) {
                Some(row) => {
                    claimed.insert(remote_id);
                    self.reconcile_linked(owner_id, entry, row, &mut report)
                        .await?;
                }
                None => {
                    debug!(
                        "Row {} gone remotely, deleting entry {}",
                        remote_id, entry.id
                    );
                    self.store.lock().await.delete_entry(entry.id)?;
                    report.deleted_local += 1;
                }
            }
        }

        let mut candidates: HashMap<String, VecDeque<&RemoteRow>> = HashMap::new();
        for row in rows.iter().filter(|r| !claimed.contains(&r.id)) {
            candidates
                .entry(content_key(&row.content, &row.source))
                .or_default()
                .push_back(row);
        }

        unlinked.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        for entry in unlinked {
            let key = content_key(&entry.text, &entry.source);
            match candidates.get_mut(&key).and_then(VecDeque::pop_front) {
                Some(row) => {
                    claimed.insert(row.id.clone());
                    self.link(owner_id, entry, row, &mut report).await?;
                }
                None => self.insert(owner_id, entry, &mut report).await?,
            }
        }

        self.absorb_unclaimed(owner_id, &rows, &claimed, &mut report)
            .await?;

        match self.collapse_remote_duplicates(owner_id).await {
            Ok(collapse) => {
                report.remote_duplicates += collapse.removed;
                report.local_duplicates += deduplicate_local(&mut *self.store.lock().await)?;
                self.reconcile_relinked(owner_id, &collapse.relinked, &mut report)
                    .await?;
            }
            Err(Error::LocalStorage(e)) => return Err(Error::LocalStorage(e)),
            Err(e) => {
                report.record(SyncFailure::from_error("dedup", &e));
                report.local_duplicates += deduplicate_local(&mut *self.store.lock().await)?;
            }
        }

        Ok(report)
    }

    /// Handle remote rows no local entry claimed
    async fn absorb_unclaimed(
        &self,
        owner_id: &str,
        rows: &[RemoteRow],
        claimed: &HashSet<String>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let mut slots: HashMap<String, KeySlot> = HashMap::new();
        for entry in self.store.lock().await.get_all_entries()? {
            let slot = slots
                .entry(content_key(&entry.text, &entry.source))
                .or_default();
            if entry.is_linked() {
                slot.linked += 1;
            } else {
                slot.unlinked.push(entry);
            }
        }
        for slot in slots.values_mut() {
            slot.unlinked
                .sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        }

        for row in rows.iter().filter(|r| !claimed.contains(&r.id)) {
            let slot = slots
                .entry(content_key(&row.content, &row.source))
                .or_default();

            if let Some(entry) = slot.unlinked.pop() {
                slot.linked += 1;
                self.link(owner_id, entry, row, report).await?;
            } else if slot.linked > 0 {
                debug!("Row {} duplicates a linked entry, leaving it for dedup", row.id);
            } else {
                let entry = Entry::from_remote(row);
                debug!("Materializing row {} as entry {}", row.id, entry.id);
                self.store.lock().await.add_entry(&entry)?;
                slot.linked += 1;
                report.materialized += 1;
            }
        }
        Ok(())
    }

    /// Link an unlinked entry to `row`, then reconcile the pair
    async fn link(
        &self,
        owner_id: &str,
        mut entry: Entry,
        row: &RemoteRow,
        report: &mut SyncReport,
    ) -> Result<()> {
        debug!("Linking entry {} to row {}", entry.id, row.id);
        self.store
            .lock()
            .await
            .set_remote_id(entry.id, Some(&row.id))?;
        entry.remote_id = Some(row.id.clone());
        report.linked += 1;
        self.reconcile_linked(owner_id, entry, row, report).await
    }

    /// Push an unlinked entry as a new row
    async fn insert(&self, owner_id: &str, entry: Entry, report: &mut SyncReport) -> Result<()> {
        match self.remote.insert(&entry.to_payload(owner_id)).await {
            Ok(remote_id) => {
                debug!("Inserted entry {} as row {}", entry.id, remote_id);
                self.store
                    .lock()
                    .await
                    .set_remote_id(entry.id, Some(&remote_id))?;
                report.inserted += 1;
            }
            Err(e) => report.record(SyncFailure::remote("insert", &e).entry(entry.id)),
        }
        Ok(())
    }

    /// Last-writer-wins between a linked entry and its row
    pub(crate) async fn reconcile_linked(
        &self,
        owner_id: &str,
        mut entry: Entry,
        row: &RemoteRow,
        report: &mut SyncReport,
    ) -> Result<()> {
        match entry.updated_at.timestamp_millis().cmp(&row.updated_millis()) {
            Ordering::Less => {
                entry.apply_remote(row);
                self.store.lock().await.update_entry(&entry)?;
                report.pulled += 1;
            }
            Ordering::Greater => {
                let mut payload = entry.to_payload(owner_id);
                // The row keeps its own creation time so dedup ordering is stable
                payload.created_at = row.created_at;
                match self.remote.update(&row.id, &payload).await {
                    Ok(()) => report.pushed += 1,
                    Err(e) => report.record(
                        SyncFailure::remote("update", &e)
                            .entry(entry.id)
                            .row(&row.id),
                    ),
                }
            }
            Ordering::Equal if !entry.same_content_as(row) => {
                warn!(
                    "Entry {} and row {} share updated_at but differ, keeping remote copy",
                    entry.id, row.id
                );
                entry.apply_remote(row);
                self.store.lock().await.update_entry(&entry)?;
                report.tie_conflicts += 1;
            }
            Ordering::Equal => {}
        }
        Ok(())
    }
}
