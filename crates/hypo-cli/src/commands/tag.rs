//! Tag command handlers

use anyhow::Result;

use hypo_core::Journal;

use crate::output::Output;

/// List all tags with usage counts
pub async fn list(journal: &Journal, output: &Output) -> Result<()> {
    let tags = journal.tags().await?;
    output.print_tags(&tags);
    Ok(())
}
