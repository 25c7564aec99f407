//! Remote row store
//!
//! The shared store is a flat collection of rows scoped by owner. The sync
//! engine only needs four operations from it, expressed by [`RemoteStore`]:
//!
//! - select every row of an owner
//! - insert a row and learn its id
//! - overwrite a row by id
//! - delete a set of rows by id
//!
//! Two implementations ship with the crate: [`RestRemote`] talks to a
//! PostgREST endpoint (the Supabase REST API), and [`MemoryRemote`] keeps rows
//! in process for tests and offline use.

mod error;
mod memory;
mod rest;

pub use error::{RemoteError, RemoteResult};
pub use memory::MemoryRemote;
pub use rest::RestRemote;

use async_trait::async_trait;

use crate::models::{RemoteRow, RowPayload};

/// Operations the sync engine consumes from the remote store
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every row belonging to `owner_id`
    async fn select_by_owner(&self, owner_id: &str) -> RemoteResult<Vec<RemoteRow>>;

    /// Insert a row, returning the id the store assigned
    async fn insert(&self, payload: &RowPayload) -> RemoteResult<String>;

    /// Overwrite the row with the given id
    async fn update(&self, id: &str, payload: &RowPayload) -> RemoteResult<()>;

    /// Delete every row whose id is in `ids`
    async fn delete_many(&self, ids: &[String]) -> RemoteResult<()>;
}
