//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use hypo_core::sync::SyncReport;
use hypo_core::tags::strip_tags;
use hypo_core::{Entry, ImportReport, MigrationReport, TagCount};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a single entry in full
    pub fn print_entry(&self, entry: &Entry) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", entry.id);
                println!();
                println!("{}", entry.text);
                println!();
                if !entry.source.is_empty() {
                    println!("Source:   {}", entry.source);
                }
                if !entry.tags.is_empty() {
                    println!("Tags:     {}", format_tags(&entry.tags));
                }
                if let Some(ref remote_id) = entry.remote_id {
                    println!("Remote:   {}", remote_id);
                }
                println!("Created:  {}", entry.created_at.format("%Y-%m-%d %H:%M"));
                println!("Updated:  {}", entry.updated_at.format("%Y-%m-%d %H:%M"));
            }
            OutputFormat::Json => print_json(entry),
            OutputFormat::Quiet => {
                println!("{}", entry.id);
            }
        }
    }

    /// Print a list of entries, one line each
    pub fn print_entries(&self, entries: &[Entry]) {
        match self.format {
            OutputFormat::Human => {
                if entries.is_empty() {
                    println!("No entries found.");
                    return;
                }
                for entry in entries {
                    let mut line = format!(
                        "{} | {}",
                        short_id(entry),
                        truncate_line(&strip_tags(&entry.text), 50)
                    );
                    if !entry.source.is_empty() {
                        line.push_str(&format!(" | {}", truncate(&entry.source, 25)));
                    }
                    if !entry.tags.is_empty() {
                        line.push_str(&format!(" | {}", format_tags(&entry.tags)));
                    }
                    println!("{}", line);
                }
                println!("\n{} entr{}", entries.len(), plural_y(entries.len()));
            }
            OutputFormat::Json => print_json(&entries),
            OutputFormat::Quiet => {
                for entry in entries {
                    println!("{}", entry.id);
                }
            }
        }
    }

    /// Print a list of tags
    pub fn print_tags(&self, tags: &[TagCount]) {
        match self.format {
            OutputFormat::Human => {
                if tags.is_empty() {
                    println!("No tags found.");
                    return;
                }
                for tag in tags {
                    println!("#{} ({})", tag.name, tag.count);
                }
                println!("\n{} tag(s)", tags.len());
            }
            OutputFormat::Json => print_json(&tags),
            OutputFormat::Quiet => {
                for tag in tags {
                    println!("{}", tag.name);
                }
            }
        }
    }

    /// Print what a sync run did
    pub fn print_sync_report(&self, report: &SyncReport) {
        match self.format {
            OutputFormat::Human => {
                if report.writes() == 0 && !report.has_failures() {
                    println!("✓ Already up to date");
                    return;
                }
                let counts = [
                    ("pulled", report.pulled),
                    ("pushed", report.pushed),
                    ("inserted", report.inserted),
                    ("linked", report.linked),
                    ("downloaded", report.materialized),
                    ("removed locally", report.deleted_local),
                    ("remote duplicates", report.remote_duplicates),
                    ("local duplicates", report.local_duplicates),
                ];
                for (label, count) in counts.iter().filter(|(_, c)| *c > 0) {
                    println!("  {:<18} {}", label, count);
                }
                if report.tie_conflicts > 0 {
                    println!(
                        "  {} entr{} with equal timestamps took the remote copy",
                        report.tie_conflicts,
                        plural_y(report.tie_conflicts)
                    );
                }
                if report.has_failures() {
                    println!();
                    println!("⚠ {} operation(s) failed:", report.failures.len());
                    for failure in &report.failures {
                        println!("  {}: {}", failure.operation, failure.message);
                    }
                } else {
                    println!("✓ Sync complete");
                }
            }
            OutputFormat::Json => {
                let failures: Vec<_> = report
                    .failures
                    .iter()
                    .map(|f| {
                        serde_json::json!({
                            "operation": f.operation,
                            "entry_id": f.entry_id,
                            "remote_id": f.remote_id,
                            "message": f.message,
                            "offline": f.offline
                        })
                    })
                    .collect();
                print_json(&serde_json::json!({
                    "pulled": report.pulled,
                    "pushed": report.pushed,
                    "inserted": report.inserted,
                    "linked": report.linked,
                    "materialized": report.materialized,
                    "deleted_local": report.deleted_local,
                    "tie_conflicts": report.tie_conflicts,
                    "remote_duplicates": report.remote_duplicates,
                    "local_duplicates": report.local_duplicates,
                    "failures": failures
                }));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print the outcome of an import
    pub fn print_import_report(&self, report: &ImportReport) {
        match self.format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "applied": report.applied,
                "skipped": report.skipped
            })),
            _ => self.success(&format!(
                "Imported {} entr{} ({} skipped)",
                report.applied,
                plural_y(report.applied),
                report.skipped
            )),
        }
    }

    /// Print the outcome of the bracket tag migration
    pub fn print_migration_report(&self, report: &MigrationReport) {
        match self.format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "already_done": report.already_done,
                "local_updated": report.local_updated,
                "remote_updated": report.remote_updated,
                "remote_failures": report.remote_failures
            })),
            _ if report.already_done => self.message("Migration already done."),
            _ => {
                self.success(&format!(
                    "Migrated {} local and {} remote entr{}",
                    report.local_updated,
                    report.remote_updated,
                    plural_y(report.remote_updated)
                ));
                if report.remote_failures > 0 {
                    self.warning(&format!(
                        "{} remote row(s) could not be rewritten; run `hypo migrate` again",
                        report.remote_failures
                    ));
                }
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning to stderr, except in quiet mode
    pub fn warning(&self, msg: &str) {
        if !self.is_quiet() {
            eprintln!("⚠ {}", msg);
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to render JSON: {}", e),
    }
}

fn short_id(entry: &Entry) -> String {
    entry.id.to_string()[..8].to_string()
}

fn format_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|t| format!("#{}", t))
        .collect::<Vec<_>>()
        .join(" ")
}

fn plural_y(count: usize) -> &'static str {
    if count == 1 {
        "y"
    } else {
        "ies"
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("Ἓν οἶδα ὅτι οὐδὲν οἶδα", 8), "Ἓν οἶ...");
        assert_eq!(truncate("— Socrates", 20), "— Socrates");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("single line", 20), "single line");
        assert_eq!(truncate_line("line one\nline two", 20), "line one");
        assert_eq!(
            truncate_line("very long single line here", 10),
            "very lo..."
        );
    }

    #[test]
    fn test_format_tags() {
        assert_eq!(format_tags(&["stoic".into(), "fate".into()]), "#stoic #fate");
        assert_eq!(format_tags(&[]), "");
    }

    #[test]
    fn test_plural() {
        assert_eq!(plural_y(1), "y");
        assert_eq!(plural_y(0), "ies");
        assert_eq!(plural_y(3), "ies");
    }
}
