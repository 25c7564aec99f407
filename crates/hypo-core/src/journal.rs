//! Entry operations
//!
//! `Journal` is what a front end talks to: it writes entries to the local
//! store, keeps the text index current, and hands single-entry changes to the
//! push worker when sync is set up. Nothing here waits on the network.

use std::sync::Arc;

use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{normalize_tags, Entry, TagCount};
use crate::search::TextIndex;
use crate::storage::EntryStore;
use crate::sync::{PushHandle, PushJob};
use crate::tags::{detect_source, parse_tags};

/// Fields to change on an existing entry; `None` leaves a field alone
#[derive(Debug, Clone, Default)]
pub struct EntryChanges {
    pub text: Option<String>,
    pub source: Option<String>,
    pub tags: Option<Vec<String>>,
}

/// Local entry collection with search and background push
pub struct Journal {
    store: Arc<Mutex<EntryStore>>,
    index: TextIndex,
    push: Option<PushHandle>,
}

impl Journal {
    /// Open over a store, indexing every entry in it
    pub async fn open(store: Arc<Mutex<EntryStore>>) -> Result<Self> {
        let entries = store.lock().await.get_all_entries()?;
        let index = TextIndex::from_entries(&entries);
        debug!("Indexed {} entries", index.len());
        Ok(Self {
            store,
            index,
            push: None,
        })
    }

    /// Push single-entry changes through `handle`
    pub fn with_push(mut self, handle: PushHandle) -> Self {
        self.push = Some(handle);
        self
    }

    pub fn store(&self) -> &Arc<Mutex<EntryStore>> {
        &self.store
    }

    pub fn index(&self) -> &TextIndex {
        &self.index
    }

    /// Rebuild the search index from the store, e.g. after a sync or import
    pub async fn reindex(&mut self) -> Result<()> {
        let entries = self.store.lock().await.get_all_entries()?;
        self.index.rebuild(&entries);
        Ok(())
    }

    /// Create an entry
    ///
    /// `#hashtags` in the text become tags. Without an explicit source, a
    /// trailing "— Author" attribution is split off the text.
    pub async fn add(
        &mut self,
        text: &str,
        source: Option<&str>,
        tags: &[String],
    ) -> Result<Entry> {
        let (text, source) = match source {
            Some(source) => (text.trim().to_string(), source.trim().to_string()),
            None => detect_source(text.trim()),
        };

        let mut entry = Entry::new(text);
        entry.source = source;
        let mut all_tags = parse_tags(&entry.text);
        all_tags.extend(tags.iter().cloned());
        entry.tags = normalize_tags(all_tags);

        self.store.lock().await.add_entry(&entry)?;
        self.index.insert(&entry);
        self.submit(PushJob::Upsert(entry.clone()));
        debug!("Added entry {}", entry.id);
        Ok(entry)
    }

    /// Apply changes to an entry
    ///
    /// Returns `None` if the entry does not exist.
    pub async fn update(&mut self, id: Uuid, changes: EntryChanges) -> Result<Option<Entry>> {
        let mut store = self.store.lock().await;
        let Some(mut entry) = store.get_entry(id)? else {
            return Ok(None);
        };

        if let Some(text) = changes.text {
            if changes.tags.is_none() {
                let mut tags = entry.tags.clone();
                tags.extend(parse_tags(&text));
                entry.set_tags(tags);
            }
            entry.set_text(text);
        }
        if let Some(source) = changes.source {
            entry.set_source(source);
        }
        if let Some(tags) = changes.tags {
            entry.set_tags(tags);
        }

        store.update_entry(&entry)?;
        drop(store);

        self.index.update(&entry);
        self.submit(PushJob::Upsert(entry.clone()));
        Ok(Some(entry))
    }

    /// Delete an entry, its cached artifacts and, if linked, its remote row
    ///
    /// Returns `false` if the entry did not exist.
    pub async fn delete(&mut self, id: Uuid) -> Result<bool> {
        let mut store = self.store.lock().await;
        if store.get_entry(id)?.is_none() {
            return Ok(false);
        }
        let remote_id = store.delete_entry(id)?;
        drop(store);

        self.index.remove(id);
        if let Some(remote_id) = remote_id {
            self.submit(PushJob::Delete(remote_id));
        }
        Ok(true)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Entry>> {
        Ok(self.store.lock().await.get_entry(id)?)
    }

    /// Every entry, newest first, optionally only those carrying `tag`
    pub async fn list(&self, tag: Option<&str>) -> Result<Vec<Entry>> {
        let store = self.store.lock().await;
        let entries = match tag {
            Some(tag) => store.get_entries_by_tag(&tag.trim().to_lowercase())?,
            None => store.get_all_entries()?,
        };
        Ok(entries)
    }

    /// Ranked search over text, source and tags
    pub async fn search(&self, query: &str) -> Result<Vec<Entry>> {
        let ids = self.index.search(query);
        let store = self.store.lock().await;
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entry) = store.get_entry(id)? {
                results.push(entry);
            }
        }
        Ok(results)
    }

    /// A random entry, avoiding `exclude` when there is a choice
    pub async fn random(&self, exclude: Option<Uuid>) -> Result<Option<Entry>> {
        let entries = self.store.lock().await.get_all_entries()?;
        let candidates: Vec<&Entry> = entries
            .iter()
            .filter(|e| Some(e.id) != exclude)
            .collect();
        let pick = candidates
            .choose(&mut rand::thread_rng())
            .map(|e| (*e).clone())
            .or_else(|| entries.first().cloned());
        Ok(pick)
    }

    /// Tags with usage counts, most used first
    pub async fn tags(&self) -> Result<Vec<TagCount>> {
        Ok(self.store.lock().await.get_tags_with_counts()?)
    }

    /// Remove every local entry and cached artifact
    ///
    /// Remote rows are left alone. Returns the number of entries removed.
    pub async fn clear(&mut self) -> Result<usize> {
        let mut store = self.store.lock().await;
        let count = store.entry_count()? as usize;
        store.clear_all()?;
        drop(store);
        self.index = TextIndex::new();
        Ok(count)
    }

    /// Cache an externally computed embedding for an entry
    pub async fn put_embedding(&self, id: Uuid, vector: &[f32]) -> Result<()> {
        Ok(self.store.lock().await.put_embedding(id, vector)?)
    }

    /// Entries most similar to `id` by cached embedding, best first
    pub async fn similar(&self, id: Uuid, limit: usize) -> Result<Vec<(Entry, f32)>> {
        let store = self.store.lock().await;
        let Some(target) = store.get_embedding(id)? else {
            return Ok(Vec::new());
        };

        let mut scored = Vec::new();
        for entry in store.get_all_entries()? {
            if entry.id == id {
                continue;
            }
            if let Some(vector) = store.get_embedding(entry.id)? {
                scored.push((entry, cosine_similarity(&target, &vector)));
            }
        }
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.id.cmp(&b.0.id)));
        scored.truncate(limit);
        Ok(scored)
    }

    /// Wait for queued pushes to finish
    pub async fn shutdown(self) {
        if let Some(push) = self.push {
            push.shutdown().await;
        }
    }

    fn submit(&self, job: PushJob) {
        if let Some(push) = &self.push {
            push.submit(job);
        }
    }
}

/// Cosine similarity of two vectors; 0.0 when either is all zeros
///
/// Vectors of different lengths are compared over their common prefix.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryRemote, RemoteStore};
    use crate::sync::spawn_push_worker;

    async fn journal() -> Journal {
        let store = Arc::new(Mutex::new(EntryStore::open_in_memory().unwrap()));
        Journal::open(store).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_parses_tags_and_source() {
        let mut journal = journal().await;
        let entry = journal
            .add("Know thyself #wisdom — Socrates", None, &["Greek".to_string()])
            .await
            .unwrap();

        assert_eq!(entry.text, "Know thyself #wisdom");
        assert_eq!(entry.source, "Socrates");
        assert_eq!(entry.tags, vec!["wisdom", "greek"]);
        assert_eq!(journal.search("thyself").await.unwrap(), vec![entry]);
    }

    #[tokio::test]
    async fn test_update_reindexes() {
        let mut journal = journal().await;
        let entry = journal.add("Amor fati", Some(""), &[]).await.unwrap();

        let updated = journal
            .update(
                entry.id,
                EntryChanges {
                    text: Some("Memento mori #stoic".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.tags, vec!["stoic"]);
        assert!(updated.updated_at >= entry.updated_at);

        assert!(journal.search("fati").await.unwrap().is_empty());
        assert_eq!(journal.search("memento").await.unwrap().len(), 1);
        assert!(journal
            .update(Uuid::new_v4(), EntryChanges::default())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_delete_purges_reads_search_and_artifact() {
        let mut journal = journal().await;
        let entry = journal.add("The obstacle is the way", None, &[]).await.unwrap();
        journal.put_embedding(entry.id, &[0.1, 0.2]).await.unwrap();

        assert!(journal.delete(entry.id).await.unwrap());
        assert!(journal.get(entry.id).await.unwrap().is_none());
        assert!(journal.search("obstacle").await.unwrap().is_empty());
        assert!(journal
            .store()
            .lock()
            .await
            .get_embedding(entry.id)
            .unwrap()
            .is_none());
        assert!(!journal.delete(entry.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_edits_are_pushed_in_background() {
        let store = Arc::new(Mutex::new(EntryStore::open_in_memory().unwrap()));
        let remote = Arc::new(MemoryRemote::new());
        let (handle, _failures) = spawn_push_worker(store.clone(), remote.clone(), "owner");
        let mut journal = Journal::open(store.clone()).await.unwrap().with_push(handle);

        let entry = journal.add("Pushed note", None, &[]).await.unwrap();
        journal.shutdown().await;

        let linked = store.lock().await.get_entry(entry.id).unwrap().unwrap();
        let remote_id = linked.remote_id.unwrap();
        let rows = remote.select_by_owner("owner").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, remote_id);

        let (handle, _failures) = spawn_push_worker(store.clone(), remote.clone(), "owner");
        let mut journal = Journal::open(store).await.unwrap().with_push(handle);
        journal.delete(entry.id).await.unwrap();
        journal.shutdown().await;
        assert!(remote.is_empty());
    }

    #[tokio::test]
    async fn test_list_random_tags_and_clear() {
        let mut journal = journal().await;
        assert!(journal.random(None).await.unwrap().is_none());

        let a = journal.add("One #a #b", None, &[]).await.unwrap();
        let b = journal.add("Two #a", None, &[]).await.unwrap();

        assert_eq!(journal.list(None).await.unwrap().len(), 2);
        assert_eq!(journal.list(Some("B")).await.unwrap(), vec![a.clone()]);

        let picked = journal.random(Some(a.id)).await.unwrap().unwrap();
        assert_eq!(picked.id, b.id);

        let tags = journal.tags().await.unwrap();
        assert_eq!(tags[0].name, "a");
        assert_eq!(tags[0].count, 2);

        assert_eq!(journal.clear().await.unwrap(), 2);
        assert!(journal.list(None).await.unwrap().is_empty());
        assert!(journal.index().is_empty());
    }

    #[tokio::test]
    async fn test_similar_by_embedding() {
        let mut journal = journal().await;
        let a = journal.add("alpha", None, &[]).await.unwrap();
        let b = journal.add("beta", None, &[]).await.unwrap();
        let c = journal.add("gamma", None, &[]).await.unwrap();
        journal.put_embedding(a.id, &[1.0, 0.0]).await.unwrap();
        journal.put_embedding(b.id, &[0.9, 0.1]).await.unwrap();
        journal.put_embedding(c.id, &[0.0, 1.0]).await.unwrap();

        let similar = journal.similar(a.id, 1).await.unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].0.id, b.id);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
