//! SQLite-backed entry store
//!
//! The durable on-device collection of entries, plus a side cache of derived
//! per-entry artifacts (embedding vectors) keyed by entry id.
//!
//! ## Tables
//!
//! - `entries` - Entry records
//! - `entry_tags` - Tags for each entry
//! - `embeddings` - Cached vectors, removed together with their entry
//!
//! Single-record operations run in their own transaction and need no external
//! locking beyond exclusive access to the connection.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use super::error::{StorageError, StorageResult};
use super::schema::{get_flag, init_schema, needs_init, set_flag};
use crate::config::Config;
use crate::models::{Entry, TagCount};

const ENTRY_COLUMNS: &str = "id, remote_id, text, source, created_at, updated_at";

/// Local store of entries
pub struct EntryStore {
    conn: Connection,
}

impl EntryStore {
    /// Open or create the database described by the configuration
    pub fn open(config: &Config) -> StorageResult<Self> {
        Self::open_path(&config.sqlite_path())
    }

    /// Open or create the database at a specific path
    pub fn open_path(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StorageError::from_io(e, parent.to_path_buf()))?;
        }

        let classify = |e| StorageError::from_sqlite(e, path.to_path_buf());
        let conn = Connection::open(path).map_err(classify)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(classify)?;

        if needs_init(&conn) {
            init_schema(&conn).map_err(classify)?;
        }

        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    // ==================== Entry Operations ====================

    /// Add a new entry
    pub fn add_entry(&mut self, entry: &Entry) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        insert_entry(&tx, entry)?;
        tx.commit()?;
        Ok(())
    }

    /// Overwrite an existing entry with the given values
    ///
    /// Timestamps are written as given. Returns `false` when no entry with
    /// this id exists.
    pub fn update_entry(&mut self, entry: &Entry) -> StorageResult<bool> {
        let tx = self.conn.transaction()?;
        let changed = tx.execute(
            r#"
            UPDATE entries
            SET remote_id = ?, text = ?, source = ?, created_at = ?, updated_at = ?
            WHERE id = ?
            "#,
            params![
                entry.remote_id,
                entry.text,
                entry.source,
                entry.created_at.timestamp_millis(),
                entry.updated_at.timestamp_millis(),
                entry.id.to_string(),
            ],
        )?;
        if changed > 0 {
            write_tags(&tx, entry)?;
        }
        tx.commit()?;
        Ok(changed > 0)
    }

    /// Delete an entry and its cached artifacts
    ///
    /// Returns the remote id the entry was linked to, if any, so the caller
    /// can remove the remote counterpart.
    pub fn delete_entry(&mut self, id: Uuid) -> StorageResult<Option<String>> {
        let tx = self.conn.transaction()?;
        let remote_id: Option<Option<String>> = tx
            .query_row(
                "SELECT remote_id FROM entries WHERE id = ?",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        tx.execute(
            "DELETE FROM entry_tags WHERE entry_id = ?",
            params![id.to_string()],
        )?;
        tx.execute("DELETE FROM entries WHERE id = ?", params![id.to_string()])?;
        tx.execute(
            "DELETE FROM embeddings WHERE entry_id = ?",
            params![id.to_string()],
        )?;
        tx.commit()?;
        Ok(remote_id.flatten())
    }

    /// Get an entry by ID
    pub fn get_entry(&self, id: Uuid) -> StorageResult<Option<Entry>> {
        let sql = format!("SELECT {} FROM entries WHERE id = ?", ENTRY_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![id.to_string()], EntryRow::from_row)
            .optional()?;
        row.map(|r| self.hydrate_entry(r)).transpose()
    }

    /// Get the entry linked to a remote row
    pub fn get_entry_by_remote_id(&self, remote_id: &str) -> StorageResult<Option<Entry>> {
        let sql = format!(
            "SELECT {} FROM entries WHERE remote_id = ? ORDER BY created_at LIMIT 1",
            ENTRY_COLUMNS
        );
        let row = self
            .conn
            .query_row(&sql, params![remote_id], EntryRow::from_row)
            .optional()?;
        row.map(|r| self.hydrate_entry(r)).transpose()
    }

    /// Get all entries, newest first
    pub fn get_all_entries(&self) -> StorageResult<Vec<Entry>> {
        let sql = format!(
            "SELECT {} FROM entries ORDER BY created_at DESC, id",
            ENTRY_COLUMNS
        );
        self.query_entries(&sql, [])
    }

    /// Get entries carrying a tag, newest first
    pub fn get_entries_by_tag(&self, tag: &str) -> StorageResult<Vec<Entry>> {
        let sql = r#"
            SELECT e.id, e.remote_id, e.text, e.source, e.created_at, e.updated_at
            FROM entries e
            JOIN entry_tags t ON e.id = t.entry_id
            WHERE t.tag = ?
            ORDER BY e.created_at DESC, e.id
        "#;
        self.query_entries(sql, params![tag])
    }

    /// Link or unlink an entry without touching its timestamps
    pub fn set_remote_id(&mut self, id: Uuid, remote_id: Option<&str>) -> StorageResult<bool> {
        let changed = self.conn.execute(
            "UPDATE entries SET remote_id = ? WHERE id = ?",
            params![remote_id, id.to_string()],
        )?;
        Ok(changed > 0)
    }

    /// Re-point every entry linked to `from` at `to`
    ///
    /// Returns the number of entries changed.
    pub fn relink_remote_id(&mut self, from: &str, to: &str) -> StorageResult<usize> {
        let changed = self.conn.execute(
            "UPDATE entries SET remote_id = ? WHERE remote_id = ?",
            params![to, from],
        )?;
        Ok(changed)
    }

    /// Replace the whole collection in one transaction
    pub fn replace_all(&mut self, entries: &[Entry]) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        clear_all_data(&tx)?;
        for entry in entries {
            insert_entry(&tx, entry)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Remove every entry and cached artifact
    pub fn clear_all(&mut self) -> StorageResult<()> {
        let tx = self.conn.transaction()?;
        clear_all_data(&tx)?;
        tx.commit()?;
        Ok(())
    }

    // ==================== Tags & Stats ====================

    /// Get tags with usage counts, most used first
    pub fn get_tags_with_counts(&self) -> StorageResult<Vec<TagCount>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT tag, COUNT(entry_id) AS count
            FROM entry_tags
            GROUP BY tag
            ORDER BY count DESC, tag
            "#,
        )?;

        let tags = stmt
            .query_map([], |row| {
                Ok(TagCount {
                    name: row.get(0)?,
                    count: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tags)
    }

    /// Get entry count
    pub fn entry_count(&self) -> StorageResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))
            .map_err(Into::into)
    }

    /// Get count of entries linked to a remote row
    pub fn linked_count(&self) -> StorageResult<i64> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM entries WHERE remote_id IS NOT NULL",
                [],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    // ==================== Embedding Cache ====================

    /// Store the embedding vector for an entry
    pub fn put_embedding(&mut self, entry_id: Uuid, vector: &[f32]) -> StorageResult<()> {
        let bytes: Vec<u8> = vector.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO embeddings (entry_id, vector, created_at)
            VALUES (?, ?, ?)
            "#,
            params![entry_id.to_string(), bytes, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    /// Get the cached embedding vector for an entry
    pub fn get_embedding(&self, entry_id: Uuid) -> StorageResult<Option<Vec<f32>>> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT vector FROM embeddings WHERE entry_id = ?",
                params![entry_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let Some(bytes) = bytes else {
            return Ok(None);
        };
        if bytes.len() % 4 != 0 {
            return Err(StorageError::CorruptRow {
                table: "embeddings",
                details: format!("vector of {} bytes for {}", bytes.len(), entry_id),
            });
        }
        let vector = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Ok(Some(vector))
    }

    /// Drop the cached embedding for an entry
    pub fn delete_embedding(&mut self, entry_id: Uuid) -> StorageResult<()> {
        self.conn.execute(
            "DELETE FROM embeddings WHERE entry_id = ?",
            params![entry_id.to_string()],
        )?;
        Ok(())
    }

    /// Get count of cached embeddings
    pub fn embedding_count(&self) -> StorageResult<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
            .map_err(Into::into)
    }

    // ==================== Flags ====================

    /// Whether a one-shot flag has been recorded
    pub fn flag_is_set(&self, key: &str) -> StorageResult<bool> {
        Ok(get_flag(&self.conn, key)?.as_deref() == Some("1"))
    }

    /// Record a one-shot flag
    pub fn set_flag(&mut self, key: &str) -> StorageResult<()> {
        set_flag(&self.conn, key, "1")?;
        Ok(())
    }

    // ==================== Private helpers ====================

    fn query_entries<P: rusqlite::Params>(&self, sql: &str, params: P) -> StorageResult<Vec<Entry>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, EntryRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(|row| self.hydrate_entry(row)).collect()
    }

    /// Hydrate an entry with its tags
    fn hydrate_entry(&self, row: EntryRow) -> StorageResult<Entry> {
        let id = Uuid::parse_str(&row.id).map_err(|e| StorageError::CorruptRow {
            table: "entries",
            details: format!("invalid UUID '{}': {}", row.id, e),
        })?;

        let mut stmt = self
            .conn
            .prepare("SELECT tag FROM entry_tags WHERE entry_id = ? ORDER BY position")?;
        let tags = stmt
            .query_map(params![row.id], |r| r.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(Entry {
            id,
            remote_id: row.remote_id,
            text: row.text,
            source: row.source,
            tags,
            created_at: millis_to_datetime(row.created_at)?,
            updated_at: millis_to_datetime(row.updated_at)?,
        })
    }
}

// ==================== Internal structs ====================

struct EntryRow {
    id: String,
    remote_id: Option<String>,
    text: String,
    source: String,
    created_at: i64,
    updated_at: i64,
}

impl EntryRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            remote_id: row.get(1)?,
            text: row.get(2)?,
            source: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

// ==================== Transaction helpers ====================

fn insert_entry(tx: &Transaction, entry: &Entry) -> StorageResult<()> {
    tx.execute(
        r#"
        INSERT INTO entries (id, remote_id, text, source, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
        params![
            entry.id.to_string(),
            entry.remote_id,
            entry.text,
            entry.source,
            entry.created_at.timestamp_millis(),
            entry.updated_at.timestamp_millis(),
        ],
    )?;
    write_tags(tx, entry)
}

/// Replace the tag set of an entry
fn write_tags(tx: &Transaction, entry: &Entry) -> StorageResult<()> {
    tx.execute(
        "DELETE FROM entry_tags WHERE entry_id = ?",
        params![entry.id.to_string()],
    )?;
    for (i, tag) in entry.tags.iter().enumerate() {
        tx.execute(
            "INSERT OR IGNORE INTO entry_tags (entry_id, tag, position) VALUES (?, ?, ?)",
            params![entry.id.to_string(), tag, i as i64],
        )?;
    }
    Ok(())
}

/// Clear all data from tables (preserving schema and flags)
fn clear_all_data(tx: &Transaction) -> StorageResult<()> {
    tx.execute("DELETE FROM entry_tags", [])?;
    tx.execute("DELETE FROM embeddings", [])?;
    tx.execute("DELETE FROM entries", [])?;
    Ok(())
}

fn millis_to_datetime(ms: i64) -> StorageResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| StorageError::CorruptRow {
        table: "entries",
        details: format!("timestamp out of range: {}", ms),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry_at(text: &str, created_ms: i64) -> Entry {
        let mut entry = Entry::new(text);
        entry.created_at = DateTime::from_timestamp_millis(created_ms).unwrap();
        entry.updated_at = entry.created_at;
        entry
    }

    #[test]
    fn test_add_and_get_entry() {
        let mut store = EntryStore::open_in_memory().unwrap();

        let mut entry = Entry::new("The unexamined life is not worth living");
        entry.set_source("Socrates");
        entry.add_tag("philosophy");
        store.add_entry(&entry).unwrap();

        let found = store.get_entry(entry.id).unwrap().unwrap();
        assert_eq!(found, entry);

        assert!(store.get_entry(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_get_all_entries_newest_first() {
        let mut store = EntryStore::open_in_memory().unwrap();
        store.add_entry(&entry_at("old", 1_000)).unwrap();
        store.add_entry(&entry_at("new", 3_000)).unwrap();
        store.add_entry(&entry_at("mid", 2_000)).unwrap();

        let texts: Vec<_> = store
            .get_all_entries()
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect();
        assert_eq!(texts, vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_update_entry() {
        let mut store = EntryStore::open_in_memory().unwrap();
        let mut entry = Entry::new("draft");
        store.add_entry(&entry).unwrap();

        entry.set_text("final");
        entry.set_tags(vec!["done".to_string()]);
        assert!(store.update_entry(&entry).unwrap());

        let found = store.get_entry(entry.id).unwrap().unwrap();
        assert_eq!(found.text, "final");
        assert_eq!(found.tags, vec!["done"]);
        assert_eq!(found.updated_at, entry.updated_at);

        let missing = Entry::new("nope");
        assert!(!store.update_entry(&missing).unwrap());
    }

    #[test]
    fn test_delete_entry_purges_embedding() {
        let mut store = EntryStore::open_in_memory().unwrap();
        let mut entry = Entry::new("to delete");
        entry.remote_id = Some("remote-1".to_string());
        entry.add_tag("gone");
        store.add_entry(&entry).unwrap();
        store.put_embedding(entry.id, &[0.5, -1.0, 2.25]).unwrap();

        let remote_id = store.delete_entry(entry.id).unwrap();
        assert_eq!(remote_id.as_deref(), Some("remote-1"));
        assert!(store.get_entry(entry.id).unwrap().is_none());
        assert!(store.get_embedding(entry.id).unwrap().is_none());
        assert!(store.get_tags_with_counts().unwrap().is_empty());

        // Deleting again is harmless
        assert_eq!(store.delete_entry(entry.id).unwrap(), None);
    }

    #[test]
    fn test_get_entries_by_tag() {
        let mut store = EntryStore::open_in_memory().unwrap();

        let mut a = Entry::new("a");
        a.add_tag("stoic");
        let mut b = Entry::new("b");
        b.add_tag("zen");
        store.add_entry(&a).unwrap();
        store.add_entry(&b).unwrap();

        let stoic = store.get_entries_by_tag("stoic").unwrap();
        assert_eq!(stoic.len(), 1);
        assert_eq!(stoic[0].id, a.id);
        assert!(store.get_entries_by_tag("none").unwrap().is_empty());
    }

    #[test]
    fn test_remote_links() {
        let mut store = EntryStore::open_in_memory().unwrap();
        let a = Entry::new("a");
        let b = Entry::new("b");
        store.add_entry(&a).unwrap();
        store.add_entry(&b).unwrap();

        store.set_remote_id(a.id, Some("dup")).unwrap();
        store.set_remote_id(b.id, Some("dup")).unwrap();
        assert_eq!(store.linked_count().unwrap(), 2);

        assert_eq!(store.relink_remote_id("dup", "canon").unwrap(), 2);
        let found = store.get_entry_by_remote_id("canon").unwrap();
        assert!(found.is_some());
        assert!(store.get_entry_by_remote_id("dup").unwrap().is_none());

        store.set_remote_id(a.id, None).unwrap();
        assert_eq!(store.linked_count().unwrap(), 1);
    }

    #[test]
    fn test_tags_with_counts() {
        let mut store = EntryStore::open_in_memory().unwrap();
        for tags in [vec!["a", "b"], vec!["a"], vec!["c", "a"]] {
            let mut e = Entry::new("x");
            e.set_tags(tags.into_iter().map(String::from).collect());
            store.add_entry(&e).unwrap();
        }

        let tags = store.get_tags_with_counts().unwrap();
        assert_eq!(tags[0], TagCount { name: "a".into(), count: 3 });
        assert_eq!(tags.len(), 3);
    }

    #[test]
    fn test_replace_all_and_clear() {
        let mut store = EntryStore::open_in_memory().unwrap();
        store.add_entry(&Entry::new("first")).unwrap();

        let replacement = vec![Entry::new("second"), Entry::new("third")];
        store.replace_all(&replacement).unwrap();
        assert_eq!(store.entry_count().unwrap(), 2);
        assert!(store
            .get_all_entries()
            .unwrap()
            .iter()
            .all(|e| e.text != "first"));

        store.clear_all().unwrap();
        assert_eq!(store.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_replace_all_is_atomic() {
        let mut store = EntryStore::open_in_memory().unwrap();
        let keep = Entry::new("keep");
        store.add_entry(&keep).unwrap();

        // Duplicate ids violate the primary key halfway through
        let dup = Entry::new("dup");
        let result = store.replace_all(&[dup.clone(), dup]);
        assert!(result.is_err());

        let all = store.get_all_entries().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, keep.id);
    }

    #[test]
    fn test_embedding_roundtrip() {
        let mut store = EntryStore::open_in_memory().unwrap();
        let entry = Entry::new("vector");
        store.add_entry(&entry).unwrap();

        store.put_embedding(entry.id, &[1.0, 0.0, -0.5]).unwrap();
        assert_eq!(
            store.get_embedding(entry.id).unwrap(),
            Some(vec![1.0, 0.0, -0.5])
        );
        assert_eq!(store.embedding_count().unwrap(), 1);

        store.delete_embedding(entry.id).unwrap();
        assert_eq!(store.embedding_count().unwrap(), 0);
    }

    #[test]
    fn test_flags() {
        let mut store = EntryStore::open_in_memory().unwrap();
        assert!(!store.flag_is_set("bracket_migration").unwrap());
        store.set_flag("bracket_migration").unwrap();
        assert!(store.flag_is_set("bracket_migration").unwrap());
    }

    #[test]
    fn test_data_persists_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("hypo.db");

        let entry = Entry::new("persistent");
        {
            let mut store = EntryStore::open_path(&path).unwrap();
            store.add_entry(&entry).unwrap();
        }

        let store = EntryStore::open_path(&path).unwrap();
        assert_eq!(store.entry_count().unwrap(), 1);
        assert_eq!(store.get_entry(entry.id).unwrap().unwrap().text, "persistent");
    }
}
