//! Export and import command handlers

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use hypo_core::{export_json, import_json, ImportMode};

use crate::output::Output;
use crate::session::Session;

/// Write the collection as JSON to `path`, or stdout
pub async fn export(session: &Session, path: Option<PathBuf>, output: &Output) -> Result<()> {
    let json = {
        let store = session.journal.store().lock().await;
        export_json(&store).context("Failed to export entries")?
    };

    match path {
        Some(path) => {
            fs::write(&path, json)
                .with_context(|| format!("Failed to write export file: {:?}", path))?;
            output.success(&format!("Exported to {}", path.display()));
        }
        None => println!("{}", json),
    }
    Ok(())
}

/// Read a transfer document and apply it to the local store
pub async fn import(
    session: &mut Session,
    path: PathBuf,
    merge: bool,
    output: &Output,
) -> Result<()> {
    let json = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read import file: {:?}", path))?;
    let mode = if merge {
        ImportMode::Merge
    } else {
        ImportMode::Replace
    };

    let report = {
        let mut store = session.journal.store().lock().await;
        import_json(&mut store, &json, mode).context("Import failed")?
    };
    session.journal.reindex().await?;

    output.print_import_report(&report);
    Ok(())
}
