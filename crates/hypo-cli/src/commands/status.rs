//! Status command handler

use anyhow::Result;

use hypo_core::migrate::BRACKET_MIGRATION_FLAG;

use crate::output::{Output, OutputFormat};
use crate::session::Session;

/// Show local contents and sync configuration
pub async fn show(session: &Session, output: &Output) -> Result<()> {
    let config = &session.config;
    let (entries, linked, embeddings, migrated) = {
        let store = session.journal.store().lock().await;
        (
            store.entry_count()?,
            store.linked_count()?,
            store.embedding_count()?,
            store.flag_is_set(BRACKET_MIGRATION_FLAG)?,
        )
    };
    let db_path = config.sqlite_path();
    let db_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    match output.format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "data_dir": config.data_dir,
                    "database_size": db_size,
                    "sync": {
                        "configured": session.is_remote_configured(),
                        "enabled": config.sync_enabled,
                        "remote_url": config.remote_url,
                        "owner_id": config.owner_id,
                        "table": config.remote_table
                    },
                    "counts": {
                        "entries": entries,
                        "linked": linked,
                        "unsynced": entries - linked,
                        "embeddings": embeddings
                    },
                    "bracket_migration_done": migrated
                })
            );
        }
        OutputFormat::Quiet => {
            println!("{}", entries);
        }
        OutputFormat::Human => {
            println!("hypo status");
            println!("===========");
            println!();
            println!("Sync:");
            println!(
                "  Status: {}",
                if session.is_remote_configured() {
                    "enabled"
                } else if config.sync_enabled {
                    "enabled, but remote_url or owner_id is missing"
                } else {
                    "disabled"
                }
            );
            if let Some(ref url) = config.remote_url {
                println!("  Remote: {} ({})", url, config.remote_table);
            }
            if let Some(ref owner) = config.owner_id {
                println!("  Owner:  {}", owner);
            }
            println!();
            println!("Storage:");
            println!("  Location: {}", config.data_dir.display());
            println!("  Size:     {}", human_size(db_size));
            println!();
            println!("Contents:");
            println!("  Entries:    {}", entries);
            println!("  Unsynced:   {}", entries - linked);
            println!("  Embeddings: {}", embeddings);
            if !migrated {
                println!();
                println!("Legacy [tag] groups not migrated yet. Run `hypo migrate`.");
            }
        }
    }

    Ok(())
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(512), "512 B");
        assert_eq!(human_size(2048), "2.0 KB");
        assert_eq!(human_size(5 * 1024 * 1024 + 512 * 1024), "5.5 MB");
    }
}
