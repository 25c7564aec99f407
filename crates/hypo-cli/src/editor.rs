//! Interactive editing support
//!
//! Entry text is composed in the user's editor through a temporary
//! Markdown file. Confirmation prompts only run on an interactive stdin.

use std::env;
use std::fs;
use std::io::{self, Write};
use std::process::Command;

use anyhow::{bail, Context, Result};
use tempfile::Builder;

/// Editors tried in order when neither $EDITOR nor $VISUAL is set
const FALLBACK_EDITORS: [&str; 4] = ["nano", "vim", "vi", "notepad"];

/// Open `initial` in the editor and return what the user saved
///
/// Surrounding blank lines and trailing spaces are dropped.
pub fn edit_text(initial: &str) -> Result<String> {
    let editor = find_editor()?;

    let mut file = Builder::new()
        .prefix("hypo_entry_")
        .suffix(".md")
        .tempfile()
        .context("Failed to create temp file for editing")?;
    file.write_all(initial.as_bytes())
        .context("Failed to write temp file for editing")?;
    file.flush()?;

    // The editor may be "code --wait" or similar
    let mut parts = editor.split_whitespace();
    let program = parts.next().unwrap_or(editor.as_str());
    let status = Command::new(program)
        .args(parts)
        .arg(file.path())
        .status()
        .with_context(|| format!("Failed to run editor: {}", editor))?;

    if !status.success() {
        bail!(
            "Editor '{}' exited with {}. Check that your editor is configured correctly.",
            editor,
            status
        );
    }

    let content = fs::read_to_string(file.path())
        .with_context(|| format!("Failed to read edited file: {:?}", file.path()))?;
    Ok(clean_edited(&content))
}

fn clean_edited(content: &str) -> String {
    content
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn find_editor() -> Result<String> {
    let configured = ["EDITOR", "VISUAL"]
        .iter()
        .filter_map(|var| env::var(var).ok())
        .find(|value| !value.trim().is_empty());
    if let Some(editor) = configured {
        return Ok(editor);
    }

    match FALLBACK_EDITORS.iter().find(|e| command_exists(e)) {
        Some(editor) => Ok(editor.to_string()),
        None => bail!(
            "No editor found. Set $EDITOR, or pass the text on the command line.\n\
             Example: export EDITOR=nano"
        ),
    }
}

fn command_exists(cmd: &str) -> bool {
    Command::new("which")
        .arg(cmd)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Ask a yes/no question, defaulting to no
///
/// Without a TTY on stdin nothing is asked and the answer is no.
pub fn confirm(prompt: &str) -> Result<bool> {
    if !atty::is(atty::Stream::Stdin) {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_exists() {
        #[cfg(unix)]
        assert!(command_exists("ls"));

        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_clean_edited() {
        assert_eq!(
            clean_edited("\n\nKnow thyself   \n— Socrates\n\n"),
            "Know thyself\n— Socrates"
        );
        assert_eq!(clean_edited("   \n"), "");
    }
}
