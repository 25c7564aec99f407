//! Per-invocation state shared by the command handlers
//!
//! Opens the local store and journal, and when a remote is configured wires
//! up the push worker and a sync engine over the same store.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use hypo_core::sync::PushFailure;
use hypo_core::{
    spawn_push_worker, Config, EntryStore, Error, Journal, OwnerLocks, RemoteStore, RestRemote,
    SyncEngine, SyncOutcome,
};

use crate::output::Output;

pub struct Session {
    pub config: Config,
    pub journal: Journal,
    remote: Option<Arc<dyn RemoteStore>>,
    // Shared by every engine this session hands out
    locks: OwnerLocks,
    failures: Option<mpsc::UnboundedReceiver<PushFailure>>,
}

impl Session {
    /// Open the local store, and the remote if sync is configured
    pub async fn open(config: Config) -> Result<Self> {
        let store = EntryStore::open(&config).map_err(|e| match e.recovery_suggestion() {
            Some(hint) => anyhow::anyhow!("Failed to open local store: {}\n{}", e, hint),
            None => anyhow::Error::new(e).context("Failed to open local store"),
        })?;
        let store = Arc::new(Mutex::new(store));
        let mut journal = Journal::open(store.clone())
            .await
            .context("Failed to load entries")?;

        let remote: Option<Arc<dyn RemoteStore>> = match RestRemote::from_config(&config)
            .context("Failed to set up remote store")?
        {
            Some(remote) if config.remote_configured() => Some(Arc::new(remote)),
            _ => None,
        };

        let mut failures = None;
        if let (Some(remote), Some(owner_id)) = (&remote, &config.owner_id) {
            let (handle, rx) = spawn_push_worker(store, remote.clone(), owner_id.clone());
            journal = journal.with_push(handle);
            failures = Some(rx);
            debug!("Push worker started for {}", owner_id);
        }

        Ok(Self {
            config,
            journal,
            remote,
            locks: OwnerLocks::new(),
            failures,
        })
    }

    /// The configured remote and owner, if sync is set up
    pub fn remote(&self) -> Option<(&dyn RemoteStore, &str)> {
        match (&self.remote, &self.config.owner_id) {
            (Some(remote), Some(owner)) => Some((remote.as_ref(), owner.as_str())),
            _ => None,
        }
    }

    /// A sync engine over the journal's store
    pub fn engine(&self) -> Result<(SyncEngine, String)> {
        match (&self.remote, &self.config.owner_id) {
            (Some(remote), Some(owner)) => Ok((
                SyncEngine::new(self.journal.store().clone(), remote.clone())
                    .with_locks(self.locks.clone()),
                owner.clone(),
            )),
            _ => Err(Error::NotConfigured).context(
                "Sync is not configured. Set it up with:\n  \
                 hypo config set remote_url https://your-project.supabase.co\n  \
                 hypo config set remote_api_key <key>\n  \
                 hypo config set owner_id <user id>\n  \
                 hypo config set sync_enabled true",
            ),
        }
    }

    pub fn is_remote_configured(&self) -> bool {
        self.remote.is_some()
    }

    /// Sync quietly before reading, if sync is configured
    ///
    /// Failures are reported as a warning; the command then works on local
    /// data.
    pub async fn auto_sync(&mut self, output: &Output) {
        let Ok((engine, owner)) = self.engine() else {
            return;
        };

        match engine.sync_all(&owner).await {
            Ok(SyncOutcome::Completed(report)) => {
                if let Some(first) = report.failures.first() {
                    output.warning(&format!("Auto-sync incomplete: {}", first.message));
                }
            }
            Ok(SyncOutcome::Skipped) => {}
            Err(e) => output.warning(&format!("Auto-sync failed: {}", e)),
        }

        if let Err(e) = self.journal.reindex().await {
            warn!("Failed to rebuild search index: {}", e);
        }
    }

    /// Wait for queued pushes and report any that failed
    pub async fn close(self, output: &Output) {
        self.journal.shutdown().await;

        if let Some(mut failures) = self.failures {
            while let Ok(failure) = failures.try_recv() {
                let hint = if failure.offline {
                    " (offline, will be retried on next sync)"
                } else {
                    ""
                };
                output.warning(&format!("Push failed: {}{}", failure.message, hint));
            }
        }
    }
}
