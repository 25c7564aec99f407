//! Data models for hypo
//!
//! Defines the local `Entry` record and the `RemoteRow` shape used by the
//! shared remote store. Timestamps are compared at millisecond precision on
//! both sides, which is what the local store persists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single note, quote or reflection kept on this device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Local identity, stable for the lifetime of the record
    pub id: Uuid,
    /// Id of the remote row this entry is linked to, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    /// Free text body (may still carry inline `#tag` markup)
    pub text: String,
    /// Attribution, e.g. "Marcus Aurelius, Meditations"
    #[serde(default)]
    pub source: String,
    /// Tags, lowercase and unique
    #[serde(default)]
    pub tags: Vec<String>,
    /// When this entry was created
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// When this entry was last changed
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    /// Create a new unlinked entry with the given text
    pub fn new(text: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: Uuid::new_v4(),
            remote_id: None,
            text: text.into(),
            source: String::new(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an entry with a specific ID (for loading from storage)
    pub fn with_id(id: Uuid, text: impl Into<String>) -> Self {
        Self {
            id,
            ..Self::new(text)
        }
    }

    /// Materialize a local entry from a remote row
    ///
    /// The new entry is linked to the row and carries its timestamps.
    pub fn from_remote(row: &RemoteRow) -> Self {
        Self {
            id: Uuid::new_v4(),
            remote_id: Some(row.id.clone()),
            text: row.content.clone(),
            source: row.source.clone(),
            tags: normalize_tags(row.tags.iter().cloned()),
            created_at: truncate_millis(row.created_at),
            updated_at: truncate_millis(row.updated_at),
        }
    }

    /// Whether this entry carries a reference to a remote row
    pub fn is_linked(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Update the text
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.touch();
    }

    /// Update the source
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = source.into();
        self.touch();
    }

    /// Add a tag
    pub fn add_tag(&mut self, tag: impl Into<String>) {
        let tag = tag.into().trim().to_lowercase();
        if !tag.is_empty() && !self.tags.contains(&tag) {
            self.tags.push(tag);
            self.touch();
        }
    }

    /// Remove a tag
    pub fn remove_tag(&mut self, tag: &str) {
        if let Some(pos) = self.tags.iter().position(|t| t == tag) {
            self.tags.remove(pos);
            self.touch();
        }
    }

    /// Set all tags (replacing existing)
    pub fn set_tags(&mut self, tags: Vec<String>) {
        self.tags = normalize_tags(tags);
        self.touch();
    }

    /// Overwrite content fields from a newer remote row
    ///
    /// Takes the remote timestamp rather than bumping to now, so a following
    /// sync sees both sides as equal.
    pub fn apply_remote(&mut self, row: &RemoteRow) {
        self.text = row.content.clone();
        self.source = row.source.clone();
        self.tags = normalize_tags(row.tags.iter().cloned());
        self.updated_at = truncate_millis(row.updated_at);
    }

    /// Whether text, source and tags agree with a remote row
    pub fn same_content_as(&self, row: &RemoteRow) -> bool {
        self.text == row.content
            && self.source == row.source
            && tag_set(&self.tags) == tag_set(&row.tags)
    }

    /// Build the payload that represents this entry in the remote store
    pub fn to_payload(&self, owner_id: &str) -> RowPayload {
        RowPayload {
            owner_id: owner_id.to_string(),
            content: self.text.clone(),
            source: self.source.clone(),
            tags: self.tags.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Tags flattened into a single space separated string
    pub fn tags_text(&self) -> String {
        self.tags.join(" ")
    }

    fn touch(&mut self) {
        let now = now_millis();
        // updated_at never moves backwards, even if the clock does
        if now > self.updated_at {
            self.updated_at = now;
        }
    }
}

/// A row in the shared remote store
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteRow {
    /// Remote identity (text or integer keys are both accepted)
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    /// Owner the row belongs to
    #[serde(rename = "user_id")]
    pub owner_id: String,
    /// Note body
    pub content: String,
    /// Attribution
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
    /// Tags
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    /// When the row was created
    pub created_at: DateTime<Utc>,
    /// When the row was last changed
    pub updated_at: DateTime<Utc>,
}

impl RemoteRow {
    /// Build a row from an insert payload and the id the store assigned
    pub fn from_payload(id: impl Into<String>, payload: &RowPayload) -> Self {
        Self {
            id: id.into(),
            owner_id: payload.owner_id.clone(),
            content: payload.content.clone(),
            source: payload.source.clone(),
            tags: payload.tags.clone(),
            created_at: payload.created_at,
            updated_at: payload.updated_at,
        }
    }

    /// Last change time in epoch milliseconds
    pub fn updated_millis(&self) -> i64 {
        self.updated_at.timestamp_millis()
    }
}

/// Column values written to the remote store on insert and update
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowPayload {
    #[serde(rename = "user_id")]
    pub owner_id: String,
    pub content: String,
    pub source: String,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A tag together with the number of entries carrying it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagCount {
    pub name: String,
    pub count: i64,
}

/// Lowercase, trim and deduplicate tags, keeping first-seen order
pub fn normalize_tags(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

fn tag_set(tags: &[String]) -> Vec<String> {
    let mut set = normalize_tags(tags.iter().cloned());
    set.sort();
    set
}

/// Current time truncated to the millisecond precision the store keeps
pub fn now_millis() -> DateTime<Utc> {
    truncate_millis(Utc::now())
}

/// Drop sub-millisecond precision from a timestamp
pub fn truncate_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, found {}",
            other
        ))),
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
