//! One-shot data migrations
//!
//! Early versions stored tags inline as `[tag, other tag]` groups in the note
//! text. The bracket migration moves those groups into the tag list, locally
//! and on the remote rows of the owner. A flag in the database makes it run
//! once per device.

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::{normalize_tags, truncate_millis, RowPayload};
use crate::remote::RemoteStore;
use crate::storage::EntryStore;
use crate::tags::{extract_bracket_tags, has_bracket_tags};

/// Flag recorded once the bracket migration completed
pub const BRACKET_MIGRATION_FLAG: &str = "bracket_migration";

/// What a migration run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// The flag was already set; nothing ran
    pub already_done: bool,
    pub local_updated: usize,
    pub remote_updated: usize,
    pub remote_failures: usize,
}

/// Move bracket tag groups into tags
///
/// `remote` is the store and owner whose rows should be rewritten too. The
/// flag is only recorded when every remote write succeeded, so a partial
/// remote pass is retried on the next run.
pub async fn migrate_bracket_tags(
    store: &Mutex<EntryStore>,
    remote: Option<(&dyn RemoteStore, &str)>,
) -> Result<MigrationReport> {
    if store.lock().await.flag_is_set(BRACKET_MIGRATION_FLAG)? {
        debug!("Bracket migration already done");
        return Ok(MigrationReport {
            already_done: true,
            ..Default::default()
        });
    }

    let mut report = MigrationReport {
        local_updated: migrate_local(&mut *store.lock().await)?,
        ..Default::default()
    };

    if let Some((remote, owner_id)) = remote {
        migrate_remote(remote, owner_id, &mut report).await?;
    }

    if report.remote_failures == 0 {
        store.lock().await.set_flag(BRACKET_MIGRATION_FLAG)?;
    }
    info!(
        "Bracket migration: {} local, {} remote entries rewritten",
        report.local_updated, report.remote_updated
    );
    Ok(report)
}

fn migrate_local(store: &mut EntryStore) -> Result<usize> {
    let mut updated = 0;
    for mut entry in store.get_all_entries()? {
        if !has_bracket_tags(&entry.text) {
            continue;
        }
        let (clean, found) = extract_bracket_tags(&entry.text);
        let mut tags = entry.tags.clone();
        tags.extend(found);
        entry.set_tags(tags);
        entry.set_text(clean);
        store.update_entry(&entry)?;
        updated += 1;
    }
    Ok(updated)
}

async fn migrate_remote(
    remote: &dyn RemoteStore,
    owner_id: &str,
    report: &mut MigrationReport,
) -> Result<()> {
    let rows = remote
        .select_by_owner(owner_id)
        .await
        .map_err(Error::RemoteUnavailable)?;

    for row in rows.iter().filter(|r| has_bracket_tags(&r.content)) {
        let (clean, found) = extract_bracket_tags(&row.content);
        let mut payload = RowPayload {
            owner_id: owner_id.to_string(),
            content: clean,
            source: row.source.clone(),
            tags: normalize_tags(row.tags.iter().cloned().chain(found)),
            created_at: row.created_at,
            updated_at: truncate_millis(Utc::now()),
        };
        if payload.updated_at <= row.updated_at {
            payload.updated_at = truncate_millis(row.updated_at) + chrono::Duration::milliseconds(1);
        }

        match remote.update(&row.id, &payload).await {
            Ok(()) => report.remote_updated += 1,
            Err(e) => {
                warn!("Failed to migrate remote row {}: {}", row.id, e);
                report.remote_failures += 1;
            }
        }
    }
    Ok(())
}
