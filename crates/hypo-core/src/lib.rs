//! Hypo Core Library
//!
//! This crate provides the core functionality for hypo, a local-first
//! collection of notes, quotes and reflections that syncs with a shared
//! remote row store and stays searchable offline.
//!
//! # Architecture
//!
//! - **SQLite**: local source of truth for entries and cached embeddings
//! - **Remote store**: flat rows scoped by owner (PostgREST / Supabase)
//! - **Sync**: whole-record last-writer-wins, with content-key dedup
//! - **Search**: in-memory ranked index rebuilt from the local store
//!
//! # Quick Start
//!
//! ```text
//! let store = Arc::new(Mutex::new(EntryStore::open(&config)?));
//! let mut journal = Journal::open(store.clone()).await?;
//! journal.add("Know thyself #wisdom — Socrates", None, &[]).await?;
//!
//! let remote = Arc::new(RestRemote::from_config(&config)?.unwrap());
//! let engine = SyncEngine::new(store, remote);
//! engine.sync_all("owner-id").await?;
//! ```
//!
//! # Modules
//!
//! - `journal`: entry operations (main entry point)
//! - `models`: local entries and remote rows
//! - `storage`: SQLite entry store
//! - `remote`: remote row store trait and implementations
//! - `sync`: sync engine, dedup and background push
//! - `search`: full-text index
//! - `transfer`: JSON export and import
//! - `config`: application configuration

pub mod config;
pub mod content_key;
pub mod error;
pub mod journal;
pub mod migrate;
pub mod models;
pub mod remote;
pub mod search;
pub mod storage;
pub mod sync;
pub mod tags;
pub mod transfer;

pub use config::Config;
pub use content_key::content_key;
pub use error::{Error, Result};
pub use journal::{cosine_similarity, EntryChanges, Journal};
pub use migrate::{migrate_bracket_tags, MigrationReport};
pub use models::{Entry, RemoteRow, RowPayload, TagCount};
pub use remote::{MemoryRemote, RemoteError, RemoteStore, RestRemote};
pub use search::TextIndex;
pub use storage::{EntryStore, StorageError};
pub use sync::{
    spawn_push_worker, OwnerLocks, PushHandle, PushJob, StatusSnapshot, SyncEngine, SyncOutcome,
    SyncReport, SyncStatus,
};
pub use transfer::{export_json, import_json, ImportMode, ImportReport};
