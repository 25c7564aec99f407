//! Content-based deduplication
//!
//! Two records are the same logical note when their content keys match.
//! Remote duplicates collapse onto the earliest-created row; local duplicates
//! collapse onto the linked, earliest-created entry.

use std::collections::HashMap;

use tracing::{debug, info};
use uuid::Uuid;

use super::engine::{SyncEngine, SyncReport};
use crate::content_key::content_key;
use crate::error::{Error, Result};
use crate::models::{Entry, RemoteRow};
use crate::storage::{EntryStore, StorageResult};

/// Remote rows sharing one content key
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    /// Row that survives
    pub canonical: RemoteRow,
    /// Ids of the rows to delete
    pub doomed: Vec<String>,
}

/// Group remote rows by content key, keeping the earliest-created row
///
/// Rows are ordered by `created_at`, ties broken by id. Only groups with at
/// least one duplicate are returned.
pub fn plan_remote_dedup(rows: &[RemoteRow]) -> Vec<DuplicateGroup> {
    let mut sorted: Vec<&RemoteRow> = rows.iter().collect();
    sorted.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut groups: Vec<DuplicateGroup> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();
    for row in sorted {
        let key = content_key(&row.content, &row.source);
        match by_key.get(&key) {
            Some(&idx) => groups[idx].doomed.push(row.id.clone()),
            None => {
                by_key.insert(key, groups.len());
                groups.push(DuplicateGroup {
                    canonical: row.clone(),
                    doomed: Vec::new(),
                });
            }
        }
    }

    groups.retain(|g| !g.doomed.is_empty());
    groups
}

/// Pick the local entries to delete so that one entry per content key remains
///
/// The survivor is the linked entry if any, then the earliest-created, then
/// the smallest id.
pub fn plan_local_dedup(entries: &[Entry]) -> Vec<Uuid> {
    let mut groups: HashMap<String, Vec<&Entry>> = HashMap::new();
    for entry in entries {
        groups
            .entry(content_key(&entry.text, &entry.source))
            .or_default()
            .push(entry);
    }

    let mut doomed: Vec<Uuid> = Vec::new();
    for mut group in groups.into_values().filter(|g| g.len() > 1) {
        group.sort_by(|a, b| {
            b.is_linked()
                .cmp(&a.is_linked())
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        doomed.extend(group.iter().skip(1).map(|e| e.id));
    }
    doomed.sort();
    doomed
}

/// Remove local duplicates and their cached artifacts
///
/// Returns the number of entries removed. Never touches the remote store.
pub fn deduplicate_local(store: &mut EntryStore) -> StorageResult<usize> {
    let entries = store.get_all_entries()?;
    let doomed = plan_local_dedup(&entries);
    for id in &doomed {
        debug!("Removing local duplicate {}", id);
        store.delete_entry(*id)?;
    }
    if !doomed.is_empty() {
        info!("Removed {} local duplicates", doomed.len());
    }
    Ok(doomed.len())
}

/// Outcome of collapsing remote duplicates
#[derive(Debug, Default)]
pub(crate) struct RemoteCollapse {
    pub removed: usize,
    /// Surviving rows that picked up entries from deleted rows
    pub relinked: Vec<RemoteRow>,
}

impl SyncEngine {
    /// Delete remote duplicates for `owner_id`
    ///
    /// Local entries linked to a doomed row are re-pointed at the surviving
    /// row before anything is deleted. Returns the number of rows removed.
    pub async fn deduplicate_remote(&self, owner_id: &str) -> Result<usize> {
        let collapse = self.collapse_remote_duplicates(owner_id).await?;
        let mut report = SyncReport::default();
        self.reconcile_relinked(owner_id, &collapse.relinked, &mut report)
            .await?;
        Ok(collapse.removed)
    }

    /// Delete local duplicates
    pub async fn deduplicate_local(&self) -> Result<usize> {
        let mut store = self.store().lock().await;
        Ok(deduplicate_local(&mut store)?)
    }

    pub(crate) async fn collapse_remote_duplicates(
        &self,
        owner_id: &str,
    ) -> Result<RemoteCollapse> {
        let rows = self
            .remote()
            .select_by_owner(owner_id)
            .await
            .map_err(Error::RemoteUnavailable)?;

        let groups = plan_remote_dedup(&rows);
        if groups.is_empty() {
            return Ok(RemoteCollapse::default());
        }

        let mut doomed_all: Vec<String> = Vec::new();
        let mut relinked: Vec<RemoteRow> = Vec::new();
        {
            let mut store = self.store().lock().await;
            for group in &groups {
                let mut moved = 0;
                for doomed in &group.doomed {
                    moved += store.relink_remote_id(doomed, &group.canonical.id)?;
                }
                if moved > 0 {
                    debug!(
                        "Relinked {} entries to surviving row {}",
                        moved, group.canonical.id
                    );
                    relinked.push(group.canonical.clone());
                }
                doomed_all.extend(group.doomed.iter().cloned());
            }
        }

        self.remote()
            .delete_many(&doomed_all)
            .await
            .map_err(Error::RemoteWriteFailed)?;
        info!("Removed {} remote duplicates", doomed_all.len());

        Ok(RemoteCollapse {
            removed: doomed_all.len(),
            relinked,
        })
    }

    /// Reconcile entries that were moved onto a surviving row
    pub(crate) async fn reconcile_relinked(
        &self,
        owner_id: &str,
        rows: &[RemoteRow],
        report: &mut SyncReport,
    ) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let locals = self.store().lock().await.get_all_entries()?;
        for row in rows {
            for entry in locals
                .iter()
                .filter(|e| e.remote_id.as_deref() == Some(row.id.as_str()))
            {
                self.reconcile_linked(owner_id, entry.clone(), row, report)
                    .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryRemote, RemoteStore};
    use chrono::DateTime;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    fn row(id: &str, content: &str, created_ms: i64) -> RemoteRow {
        RemoteRow {
            id: id.to_string(),
            owner_id: "owner".to_string(),
            content: content.to_string(),
            source: String::new(),
            tags: Vec::new(),
            created_at: DateTime::from_timestamp_millis(created_ms).unwrap(),
            updated_at: DateTime::from_timestamp_millis(created_ms).unwrap(),
        }
    }

    fn entry(text: &str, created_ms: i64, remote_id: Option<&str>) -> Entry {
        let mut entry = Entry::new(text);
        entry.created_at = DateTime::from_timestamp_millis(created_ms).unwrap();
        entry.updated_at = entry.created_at;
        entry.remote_id = remote_id.map(String::from);
        entry
    }

    #[test]
    fn test_plan_remote_keeps_earliest() {
        let rows = vec![
            row("late", "Know thyself", 200),
            row("early", "Know  thyself #wisdom", 100),
            row("other", "Memento mori", 150),
        ];
        let groups = plan_remote_dedup(&rows);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].canonical.id, "early");
        assert_eq!(groups[0].doomed, vec!["late"]);
    }

    #[test]
    fn test_plan_remote_breaks_ties_by_id() {
        let rows = vec![row("b", "same", 100), row("a", "same", 100)];
        let groups = plan_remote_dedup(&rows);
        assert_eq!(groups[0].canonical.id, "a");
        assert_eq!(groups[0].doomed, vec!["b"]);
    }

    #[test]
    fn test_plan_remote_no_duplicates() {
        let rows = vec![row("a", "one", 1), row("b", "two", 2)];
        assert!(plan_remote_dedup(&rows).is_empty());
    }

    #[test]
    fn test_plan_local_prefers_linked_then_earliest() {
        let unlinked_early = entry("Know thyself", 10, None);
        let linked_late = entry("Know thyself", 20, Some("r1"));
        let unlinked_later = entry("Know thyself #wisdom", 30, None);

        let doomed = plan_local_dedup(&[
            unlinked_early.clone(),
            linked_late.clone(),
            unlinked_later.clone(),
        ]);
        assert_eq!(doomed.len(), 2);
        assert!(doomed.contains(&unlinked_early.id));
        assert!(doomed.contains(&unlinked_later.id));
        assert!(!doomed.contains(&linked_late.id));
    }

    #[test]
    fn test_deduplicate_local_is_idempotent() {
        let mut store = EntryStore::open_in_memory().unwrap();
        let keep = entry("Memento mori", 10, None);
        let dup = entry("Memento   mori", 20, None);
        store.add_entry(&keep).unwrap();
        store.add_entry(&dup).unwrap();
        store.put_embedding(dup.id, &[1.0, 0.0]).unwrap();

        assert_eq!(deduplicate_local(&mut store).unwrap(), 1);
        assert_eq!(deduplicate_local(&mut store).unwrap(), 0);

        assert!(store.get_entry(keep.id).unwrap().is_some());
        assert!(store.get_entry(dup.id).unwrap().is_none());
        assert!(store.get_embedding(dup.id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deduplicate_remote_relinks_to_survivor() {
        let store = Arc::new(Mutex::new(EntryStore::open_in_memory().unwrap()));
        let remote = Arc::new(MemoryRemote::new());
        remote.seed(row("early", "Know thyself", 100));
        remote.seed(row("late", "Know  thyself", 200));
        remote.seed(row("other", "Memento mori", 150));

        let on_late = entry("Know  thyself", 200, Some("late"));
        let on_other = entry("Memento mori", 150, Some("other"));
        {
            let mut store = store.lock().await;
            store.add_entry(&on_late).unwrap();
            store.add_entry(&on_other).unwrap();
        }

        let dyn_remote: Arc<dyn RemoteStore> = remote.clone();
        let engine = SyncEngine::new(store.clone(), dyn_remote);
        assert_eq!(engine.deduplicate_remote("owner").await.unwrap(), 1);
        assert_eq!(engine.deduplicate_remote("owner").await.unwrap(), 0);

        assert!(remote.row("late").is_none());
        assert_eq!(remote.len(), 2);

        let relinked = store.lock().await.get_entry(on_late.id).unwrap().unwrap();
        assert_eq!(relinked.remote_id.as_deref(), Some("early"));
        // The relinked entry was newer, so its text won on the survivor
        assert_eq!(remote.row("early").unwrap().content, "Know  thyself");

        let locals = store.lock().await.get_all_entries().unwrap();
        for local in &locals {
            let remote_id = local.remote_id.as_deref().unwrap();
            assert!(remote.row(remote_id).is_some(), "{} is dangling", remote_id);
        }
    }
}
