//! Sync between the local store and the remote row store
//!
//! - `engine`: full reconciliation passes (`SyncEngine::sync_all`)
//! - `dedup`: content-key deduplication on both sides
//! - `push`: fire-and-forget pushes of single edits
//! - `lock`: per-owner run locks
//! - `status`: status signal for UIs

pub mod dedup;
pub mod engine;
pub mod lock;
pub mod push;
pub mod status;

pub use dedup::{deduplicate_local, plan_local_dedup, plan_remote_dedup, DuplicateGroup};
pub use engine::{SyncEngine, SyncFailure, SyncOutcome, SyncReport};
pub use lock::{OwnerGuard, OwnerLocks};
pub use push::{spawn_push_worker, PushFailure, PushHandle, PushJob};
pub use status::{StatusSignal, StatusSnapshot, SyncStatus};
