//! Storage layer
//!
//! SQLite is the local source of truth. Entries, their tags and the
//! embedding side cache live in one database file under the data directory.

pub mod entries;
pub mod error;
pub mod schema;

pub use entries::EntryStore;
pub use error::{StorageError, StorageResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
