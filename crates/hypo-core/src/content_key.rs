//! Content keys
//!
//! Two records describe the same logical note when their text and source
//! agree once tag markup and whitespace noise are removed. The content key is
//! that canonical form; it never looks at ids, tags or timestamps.

use crate::tags::strip_markup;

/// Joins the text and source parts of a key
///
/// Normalization drops NUL from both halves, so the separator cannot be
/// produced by either side.
pub const SEPARATOR: char = '\u{0}';

/// Canonical dedup key for a note's text and source
pub fn content_key(text: &str, source: &str) -> String {
    let text = normalize(&strip_markup(text));
    let source = normalize(source);
    let mut key = String::with_capacity(text.len() + source.len() + 1);
    key.push_str(&text);
    key.push(SEPARATOR);
    key.push_str(&source);
    key
}

/// Collapse whitespace runs to single spaces, trim, and drop NUL characters
fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| word.replace(SEPARATOR, ""))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
