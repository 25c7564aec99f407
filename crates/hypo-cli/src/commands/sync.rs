//! Sync, dedup and migration command handlers

use anyhow::{bail, Context, Result};

use hypo_core::sync::deduplicate_local;
use hypo_core::{migrate_bracket_tags, SyncOutcome};

use crate::output::Output;
use crate::session::Session;

/// Reconcile local entries with the remote store
pub async fn sync(session: &mut Session, output: &Output) -> Result<()> {
    let (engine, owner_id) = session.engine()?;

    output.message(&format!("Syncing entries for {}...", owner_id));

    let outcome = engine.sync_all(&owner_id).await?;
    let SyncOutcome::Completed(report) = outcome else {
        output.message("A sync is already running.");
        return Ok(());
    };

    output.print_sync_report(&report);
    session.journal.reindex().await?;

    if let Some(first) = report.failures.first() {
        if report.failures.iter().all(|f| f.offline) {
            bail!("Sync incomplete, remote unreachable: {}", first.message);
        }
        bail!("Sync incomplete: {}", first.message);
    }
    Ok(())
}

/// Remove duplicate entries, remotely when configured and always locally
pub async fn dedup(session: &mut Session, output: &Output) -> Result<()> {
    let remote_removed = match session.engine() {
        Ok((engine, owner_id)) => match engine.deduplicate_remote(&owner_id).await {
            Ok(removed) => removed,
            Err(e) => {
                output.warning(&format!("Skipped remote duplicates: {}", e));
                0
            }
        },
        Err(_) => 0,
    };

    let local_removed = {
        let mut store = session.journal.store().lock().await;
        deduplicate_local(&mut store).context("Failed to remove local duplicates")?
    };
    session.journal.reindex().await?;

    if output.is_json() {
        println!(
            "{}",
            serde_json::json!({"remote_removed": remote_removed, "local_removed": local_removed})
        );
    } else {
        output.success(&format!(
            "Removed {} remote and {} local duplicate(s)",
            remote_removed, local_removed
        ));
    }
    Ok(())
}

/// Move legacy `[tag]` groups out of entry text
pub async fn migrate(session: &mut Session, output: &Output) -> Result<()> {
    let report = migrate_bracket_tags(session.journal.store(), session.remote())
        .await
        .context("Bracket tag migration failed")?;
    session.journal.reindex().await?;

    output.print_migration_report(&report);
    Ok(())
}
