//! Background push worker
//!
//! Single-entry edits are pushed to the remote store without making the
//! caller wait. Jobs go over an unbounded channel to a spawned task; failures
//! are logged and forwarded to an error sink. A failed push is not retried
//! here, the next full sync picks the change up.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::models::Entry;
use crate::remote::RemoteStore;
use crate::storage::EntryStore;

/// Work for the push worker
#[derive(Debug, Clone, PartialEq)]
pub enum PushJob {
    /// Insert or overwrite the remote copy of an entry
    Upsert(Entry),
    /// Delete a remote row
    Delete(String),
}

/// A job that could not be applied
#[derive(Debug, Clone, PartialEq)]
pub struct PushFailure {
    pub job: PushJob,
    pub message: String,
    pub offline: bool,
}

/// Handle for submitting jobs to a running worker
#[derive(Debug)]
pub struct PushHandle {
    tx: mpsc::UnboundedSender<PushJob>,
    task: JoinHandle<()>,
}

impl PushHandle {
    /// Queue a job; never waits
    ///
    /// Returns `false` if the worker has stopped.
    pub fn submit(&self, job: PushJob) -> bool {
        match self.tx.send(job) {
            Ok(()) => true,
            Err(e) => {
                warn!("Push worker stopped, dropping {:?}", e.0);
                false
            }
        }
    }

    /// Stop accepting jobs and wait for queued ones to finish
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!("Push worker ended abnormally: {}", e);
        }
    }
}

struct PushWorker {
    store: Arc<Mutex<EntryStore>>,
    remote: Arc<dyn RemoteStore>,
    owner_id: String,
    failures: mpsc::UnboundedSender<PushFailure>,
}

/// Spawn a push worker for `owner_id`
///
/// Returns the submit handle and the receiving end of the error sink.
pub fn spawn_push_worker(
    store: Arc<Mutex<EntryStore>>,
    remote: Arc<dyn RemoteStore>,
    owner_id: impl Into<String>,
) -> (PushHandle, mpsc::UnboundedReceiver<PushFailure>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (failure_tx, failure_rx) = mpsc::unbounded_channel();

    let worker = PushWorker {
        store,
        remote,
        owner_id: owner_id.into(),
        failures: failure_tx,
    };
    let task = tokio::spawn(worker.run(rx));

    (PushHandle { tx, task }, failure_rx)
}

impl PushWorker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<PushJob>) {
        while let Some(job) = rx.recv().await {
            if let Err((message, offline)) = self.apply(&job).await {
                warn!("Push failed: {}", message);
                // Nobody listening is fine
                let _ = self.failures.send(PushFailure {
                    job,
                    message,
                    offline,
                });
            }
        }
        debug!("Push worker for {} finished", self.owner_id);
    }

    async fn apply(&self, job: &PushJob) -> Result<(), (String, bool)> {
        match job {
            PushJob::Upsert(entry) => self.upsert(entry).await,
            PushJob::Delete(remote_id) => self
                .remote
                .delete_many(std::slice::from_ref(remote_id))
                .await
                .map_err(|e| (e.to_string(), e.is_offline())),
        }
    }

    async fn upsert(&self, entry: &Entry) -> Result<(), (String, bool)> {
        // A sync may have linked or removed the entry since the job was queued
        let current = self
            .store
            .lock()
            .await
            .get_entry(entry.id)
            .map_err(|e| (e.to_string(), false))?;
        let Some(current) = current else {
            debug!("Entry {} gone before push, skipping", entry.id);
            return Ok(());
        };

        let payload = current.to_payload(&self.owner_id);
        match current.remote_id.as_deref() {
            Some(remote_id) => self
                .remote
                .update(remote_id, &payload)
                .await
                .map_err(|e| (e.to_string(), e.is_offline())),
            None => {
                let remote_id = self
                    .remote
                    .insert(&payload)
                    .await
                    .map_err(|e| (e.to_string(), e.is_offline()))?;
                let linked = self
                    .store
                    .lock()
                    .await
                    .set_remote_id(current.id, Some(&remote_id))
                    .map_err(|e| (e.to_string(), false))?;
                if !linked {
                    // Deleted locally while the insert was in flight
                    debug!(
                        "Entry {} deleted during push, removing row {}",
                        current.id, remote_id
                    );
                    return self
                        .remote
                        .delete_many(std::slice::from_ref(&remote_id))
                        .await
                        .map_err(|e| (e.to_string(), e.is_offline()));
                }
                debug!("Pushed entry {} as row {}", current.id, remote_id);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RemoteRow, RowPayload};
    use crate::remote::{MemoryRemote, RemoteResult};
    use crate::sync::SyncEngine;
    use async_trait::async_trait;
    use tokio::sync::Notify;

    fn setup() -> (Arc<Mutex<EntryStore>>, Arc<MemoryRemote>) {
        (
            Arc::new(Mutex::new(EntryStore::open_in_memory().unwrap())),
            Arc::new(MemoryRemote::new()),
        )
    }

    #[tokio::test]
    async fn test_upsert_inserts_and_links() {
        let (store, remote) = setup();
        let entry = Entry::new("Memento mori");
        store.lock().await.add_entry(&entry).unwrap();

        let (handle, _failures) = spawn_push_worker(store.clone(), remote.clone(), "owner");
        assert!(handle.submit(PushJob::Upsert(entry.clone())));
        handle.shutdown().await;

        let linked = store.lock().await.get_entry(entry.id).unwrap().unwrap();
        let remote_id = linked.remote_id.unwrap();
        assert_eq!(remote.row(&remote_id).unwrap().content, "Memento mori");
    }

    /// Remote whose inserts wait until the test lets them through
    #[derive(Default)]
    struct GatedRemote {
        inner: MemoryRemote,
        entered: Notify,
        gate: Notify,
    }

    #[async_trait]
    impl RemoteStore for GatedRemote {
        async fn select_by_owner(&self, owner_id: &str) -> RemoteResult<Vec<RemoteRow>> {
            self.inner.select_by_owner(owner_id).await
        }

        async fn insert(&self, payload: &RowPayload) -> RemoteResult<String> {
            self.entered.notify_one();
            self.gate.notified().await;
            self.inner.insert(payload).await
        }

        async fn update(&self, id: &str, payload: &RowPayload) -> RemoteResult<()> {
            self.inner.update(id, payload).await
        }

        async fn delete_many(&self, ids: &[String]) -> RemoteResult<()> {
            self.inner.delete_many(ids).await
        }
    }

    #[tokio::test]
    async fn test_delete_during_insert_removes_new_row() {
        let store = Arc::new(Mutex::new(EntryStore::open_in_memory().unwrap()));
        let remote = Arc::new(GatedRemote::default());
        let entry = Entry::new("Memento mori");
        store.lock().await.add_entry(&entry).unwrap();

        let (handle, mut failures) = spawn_push_worker(store.clone(), remote.clone(), "owner");
        handle.submit(PushJob::Upsert(entry.clone()));

        remote.entered.notified().await;
        let unlinked = store.lock().await.delete_entry(entry.id).unwrap();
        assert_eq!(unlinked, None);
        remote.gate.notify_one();
        handle.shutdown().await;

        assert_eq!(remote.inner.insert_count(), 1);
        assert!(remote.inner.is_empty());
        assert!(failures.try_recv().is_err());

        // A later sync must not bring the entry back
        let engine = SyncEngine::new(store.clone(), remote);
        engine.sync_all("owner").await.unwrap();
        assert!(store.lock().await.get_all_entries().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_updates_linked_entry() {
        let (store, remote) = setup();
        let mut entry = Entry::new("first");
        let remote_id = remote.insert(&entry.to_payload("owner")).await.unwrap();
        entry.remote_id = Some(remote_id.clone());
        entry.set_text("second");
        store.lock().await.add_entry(&entry).unwrap();

        let (handle, _failures) = spawn_push_worker(store.clone(), remote.clone(), "owner");
        handle.submit(PushJob::Upsert(entry));
        handle.shutdown().await;

        assert_eq!(remote.row(&remote_id).unwrap().content, "second");
        assert_eq!(remote.insert_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_row() {
        let (store, remote) = setup();
        let remote_id = remote
            .insert(&Entry::new("bye").to_payload("owner"))
            .await
            .unwrap();

        let (handle, _failures) = spawn_push_worker(store, remote.clone(), "owner");
        handle.submit(PushJob::Delete(remote_id));
        handle.shutdown().await;

        assert!(remote.is_empty());
    }

    #[tokio::test]
    async fn test_failures_reach_error_sink() {
        let (store, remote) = setup();
        remote.set_offline(true);

        let (handle, mut failures) = spawn_push_worker(store, remote, "owner");
        handle.submit(PushJob::Delete("r1".into()));
        handle.shutdown().await;

        let failure = failures.recv().await.unwrap();
        assert_eq!(failure.job, PushJob::Delete("r1".into()));
        assert!(failure.offline);
    }
}
