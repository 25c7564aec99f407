//! Entry command handlers

use anyhow::{bail, Context, Result};
use uuid::Uuid;

use hypo_core::{Entry, EntryChanges, Journal};

use crate::editor::{confirm, edit_text};
use crate::output::Output;

/// Create a new entry
///
/// With no text on the command line the editor is opened.
pub async fn add(
    journal: &mut Journal,
    text: Vec<String>,
    source: Option<String>,
    tags: Vec<String>,
    output: &Output,
) -> Result<()> {
    let text = if text.is_empty() {
        edit_text("")?
    } else {
        text.join(" ")
    };
    if text.trim().is_empty() {
        bail!("Nothing to add: entry text is empty");
    }

    let entry = journal
        .add(&text, source.as_deref(), &tags)
        .await
        .context("Failed to add entry")?;

    output.success(&format!("Added entry: {}", entry.id));
    output.print_entry(&entry);
    Ok(())
}

/// List entries, optionally filtered by tag
pub async fn list(journal: &Journal, tag: Option<String>, output: &Output) -> Result<()> {
    let tag = tag.as_deref().map(|t| t.trim_start_matches('#'));
    let entries = journal.list(tag).await?;
    output.print_entries(&entries);
    Ok(())
}

/// Show a single entry
pub async fn show(journal: &Journal, id: String, output: &Output) -> Result<()> {
    let entry = find_entry(journal, &id).await?;
    output.print_entry(&entry);
    Ok(())
}

/// Edit an entry
///
/// Fields given as flags are replaced directly; with no flags the text is
/// opened in the editor.
pub async fn edit(
    journal: &mut Journal,
    id: String,
    text: Option<String>,
    source: Option<String>,
    tags: Option<Vec<String>>,
    output: &Output,
) -> Result<()> {
    let entry = find_entry(journal, &id).await?;

    let mut changes = EntryChanges {
        text,
        source,
        tags,
    };
    if changes.text.is_none() && changes.source.is_none() && changes.tags.is_none() {
        let edited = edit_text(&entry.text)?;
        if edited.is_empty() {
            bail!("Entry text cannot be empty. Use `hypo delete` to remove it.");
        }
        if edited == entry.text {
            output.message("No changes.");
            return Ok(());
        }
        changes.text = Some(edited);
    }

    let updated = journal
        .update(entry.id, changes)
        .await
        .context("Failed to update entry")?
        .ok_or_else(|| anyhow::anyhow!("Entry not found: {}", id))?;

    output.success("Entry updated");
    output.print_entry(&updated);
    Ok(())
}

/// Delete an entry
pub async fn delete(journal: &mut Journal, id: String, yes: bool, output: &Output) -> Result<()> {
    let entry = find_entry(journal, &id).await?;

    if !yes && output.should_prompt() {
        println!(
            "Delete entry: {} - {}",
            &entry.id.to_string()[..8],
            entry.text.lines().next().unwrap_or("")
        );
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    journal
        .delete(entry.id)
        .await
        .context("Failed to delete entry")?;

    output.success(&format!("Deleted entry: {}", entry.id));
    Ok(())
}

/// Search entries
pub async fn search(journal: &Journal, query: Vec<String>, output: &Output) -> Result<()> {
    let entries = journal.search(&query.join(" ")).await?;
    output.print_entries(&entries);
    Ok(())
}

/// Show a random entry
pub async fn random(journal: &Journal, output: &Output) -> Result<()> {
    match journal.random(None).await? {
        Some(entry) => output.print_entry(&entry),
        None => output.message("No entries yet. Add one with `hypo add`."),
    }
    Ok(())
}

/// Remove every local entry
pub async fn clear(journal: &mut Journal, yes: bool, output: &Output) -> Result<()> {
    if !yes {
        if !output.should_prompt() {
            bail!("Refusing to clear without confirmation. Pass --yes.");
        }
        println!("This removes every entry on this device. Remote rows are kept.");
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let removed = journal.clear().await.context("Failed to clear entries")?;
    output.success(&format!("Removed {} entries", removed));
    Ok(())
}

async fn find_entry(journal: &Journal, id: &str) -> Result<Entry> {
    let uuid = parse_entry_id(id, journal).await?;
    journal
        .get(uuid)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Entry not found: {}", id))
}

/// Parse an entry ID (supports full UUID or prefix)
async fn parse_entry_id(id: &str, journal: &Journal) -> Result<Uuid> {
    if let Ok(uuid) = Uuid::parse_str(id) {
        return Ok(uuid);
    }

    let entries = journal.list(None).await?;
    match match_prefix(&entries, id).as_slice() {
        [] => bail!("No entry found matching: {}", id),
        [only] => Ok(only.id),
        matches => {
            eprintln!("Multiple entries match '{}':", id);
            for entry in matches {
                eprintln!("  {} - {}", entry.id, entry.text.lines().next().unwrap_or(""));
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}

fn match_prefix<'a>(entries: &'a [Entry], prefix: &str) -> Vec<&'a Entry> {
    let prefix = prefix.to_lowercase();
    entries
        .iter()
        .filter(|e| e.id.to_string().starts_with(&prefix))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_prefix() {
        let a = Entry::with_id(
            Uuid::parse_str("aaaa1111-0000-4000-8000-000000000000").unwrap(),
            "one",
        );
        let b = Entry::with_id(
            Uuid::parse_str("aaaa2222-0000-4000-8000-000000000000").unwrap(),
            "two",
        );
        let entries = vec![a.clone(), b];

        assert_eq!(match_prefix(&entries, "aaaa").len(), 2);
        assert_eq!(match_prefix(&entries, "AAAA1").len(), 1);
        assert_eq!(match_prefix(&entries, "aaaa1")[0].id, a.id);
        assert!(match_prefix(&entries, "bbbb").is_empty());
    }
}
