//! Export and import of the local collection
//!
//! The transfer document is JSON:
//!
//! ```json
//! { "version": 1, "entries": [ ... ], "exportedAt": "2024-01-01T00:00:00Z" }
//! ```
//!
//! Entries use camelCase field names and epoch-millisecond timestamps. Import
//! accepts older documents leniently (numeric ids, missing timestamps), but
//! the whole document is validated before anything is written.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::content_key::content_key;
use crate::error::{Error, Result};
use crate::models::{normalize_tags, now_millis, truncate_millis, Entry};
use crate::storage::{EntryStore, StorageError};

/// Current transfer document version
pub const EXPORT_VERSION: u32 = 1;

/// A full export of the local collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub version: u32,
    pub entries: Vec<Entry>,
    pub exported_at: DateTime<Utc>,
}

/// How imported entries combine with the existing collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Swap the local collection for the imported one
    #[default]
    Replace,
    /// Add only entries whose id and content key are new
    Merge,
}

/// What an import did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub applied: usize,
    pub skipped: usize,
}

/// Entry as found in an import document
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImportedEntry {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    remote_id: Option<Value>,
    text: String,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    updated_at: Option<Value>,
}

impl ImportedEntry {
    fn into_entry(self, position: usize) -> Result<Entry> {
        // Older exports used integer ids; those get a fresh identity
        let id = match &self.id {
            Some(Value::String(s)) => Uuid::parse_str(s).unwrap_or_else(|_| Uuid::new_v4()),
            _ => Uuid::new_v4(),
        };
        let remote_id = match self.remote_id {
            Some(Value::String(s)) if !s.is_empty() => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let created_at = parse_timestamp(self.created_at.as_ref(), "createdAt", position)?;
        let updated_at = parse_timestamp(self.updated_at.as_ref(), "updatedAt", position)?;
        let created_at = created_at.or(updated_at).unwrap_or_else(now_millis);
        let updated_at = updated_at.unwrap_or(created_at).max(created_at);

        Ok(Entry {
            id,
            remote_id,
            text: self.text,
            source: self.source.unwrap_or_default(),
            tags: normalize_tags(self.tags.unwrap_or_default()),
            created_at,
            updated_at,
        })
    }
}

/// Accept epoch milliseconds or an RFC 3339 string
fn parse_timestamp(
    value: Option<&Value>,
    field: &str,
    position: usize,
) -> Result<Option<DateTime<Utc>>> {
    let invalid = || Error::MalformedImport(format!("entry {}: invalid {}", position, field));
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let millis = n.as_i64().ok_or_else(invalid)?;
            DateTime::from_timestamp_millis(millis)
                .map(Some)
                .ok_or_else(invalid)
        }
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|ts| Some(truncate_millis(ts.with_timezone(&Utc))))
            .map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

/// Snapshot the local collection
pub fn export_document(store: &EntryStore) -> Result<ExportDocument> {
    Ok(ExportDocument {
        version: EXPORT_VERSION,
        entries: store.get_all_entries()?,
        exported_at: Utc::now(),
    })
}

/// Serialize the local collection as a pretty-printed transfer document
pub fn export_json(store: &EntryStore) -> Result<String> {
    let document = export_document(store)?;
    let json = serde_json::to_string_pretty(&document).map_err(StorageError::Serialization)?;
    info!("Exported {} entries", document.entries.len());
    Ok(json)
}

/// Validate a transfer document and turn it into entries
///
/// Fails with [`Error::MalformedImport`] if the payload is not JSON, if
/// `entries` is missing or not an array, or if any entry is unusable.
pub fn parse_import(json: &str) -> Result<Vec<Entry>> {
    let document: Value = serde_json::from_str(json)
        .map_err(|e| Error::MalformedImport(format!("not valid JSON: {}", e)))?;

    let items = match document.get("entries") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(Error::MalformedImport("`entries` is not an array".into())),
        None => return Err(Error::MalformedImport("`entries` is missing".into())),
    };

    items
        .iter()
        .enumerate()
        .map(|(position, item)| {
            let imported: ImportedEntry = serde_json::from_value(item.clone())
                .map_err(|e| Error::MalformedImport(format!("entry {}: {}", position, e)))?;
            imported.into_entry(position)
        })
        .collect()
}

/// Import a transfer document into the local store
pub fn import_json(store: &mut EntryStore, json: &str, mode: ImportMode) -> Result<ImportReport> {
    let entries = parse_import(json)?;
    let report = match mode {
        ImportMode::Replace => replace(store, entries)?,
        ImportMode::Merge => merge(store, entries)?,
    };
    info!(
        "Imported {} entries ({} skipped, {:?})",
        report.applied, report.skipped, mode
    );
    Ok(report)
}

fn replace(store: &mut EntryStore, entries: Vec<Entry>) -> Result<ImportReport> {
    let mut ids = HashSet::new();
    let total = entries.len();
    let unique: Vec<Entry> = entries.into_iter().filter(|e| ids.insert(e.id)).collect();

    store.replace_all(&unique)?;
    Ok(ImportReport {
        applied: unique.len(),
        skipped: total - unique.len(),
    })
}

fn merge(store: &mut EntryStore, entries: Vec<Entry>) -> Result<ImportReport> {
    let existing = store.get_all_entries()?;
    let mut ids: HashSet<Uuid> = existing.iter().map(|e| e.id).collect();
    let mut keys: HashSet<String> = existing
        .iter()
        .map(|e| content_key(&e.text, &e.source))
        .collect();

    let mut report = ImportReport::default();
    for entry in entries {
        let key = content_key(&entry.text, &entry.source);
        if ids.contains(&entry.id) || keys.contains(&key) {
            debug!("Skipping imported entry {}, already present", entry.id);
            report.skipped += 1;
            continue;
        }
        store.add_entry(&entry)?;
        ids.insert(entry.id);
        keys.insert(key);
        report.applied += 1;
    }
    Ok(report)
}
