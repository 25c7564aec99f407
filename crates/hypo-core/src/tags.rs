//! Inline tag markup
//!
//! Entries carry tags two ways: as `#hashtags` inside the text, and (in older
//! data) as bracket groups like `[stoicism, ethics]`. These helpers parse and
//! strip both forms.

use once_cell::sync::Lazy;
use regex::Regex;

static HASHTAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([a-zA-Z0-9_-]+)").expect("valid hashtag pattern"));

static BRACKET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]+)\]").expect("valid bracket pattern"));

static MULTI_SPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"  +").expect("valid space pattern"));

// A dash preceded by whitespace (or the start) and followed by the attribution
static SOURCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)[—–-]\s*([^\n]+?)\s*$").expect("valid source pattern"));

/// Longest trailing attribution accepted by [`detect_source`]
const MAX_SOURCE_LEN: usize = 120;

/// Parse `#hashtags` from text
///
/// Returns unique lowercase tag names in order of first appearance.
pub fn parse_tags(text: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for cap in HASHTAG_RE.captures_iter(text) {
        let tag = cap[1].to_lowercase();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

/// Strip `#hashtags` from text for display
pub fn strip_tags(text: &str) -> String {
    let stripped = HASHTAG_RE.replace_all(text, "");
    MULTI_SPACE_RE.replace_all(&stripped, " ").trim().to_string()
}

/// Remove every form of inline tag markup, hashtags and bracket groups alike
pub fn strip_markup(text: &str) -> String {
    let without_brackets = BRACKET_RE.replace_all(text, "");
    HASHTAG_RE.replace_all(&without_brackets, "").into_owned()
}

/// Detect a trailing "— Author, Work" attribution
///
/// Returns `(text, source)`. When nothing that looks like a name is found the
/// text comes back unchanged with an empty source.
pub fn detect_source(text: &str) -> (String, String) {
    if let Some(caps) = SOURCE_RE.captures(text) {
        let whole = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let source = caps[1].trim();
        if !source.is_empty()
            && source.chars().count() < MAX_SOURCE_LEN
            && !source.contains('.')
        {
            return (text[..whole].trim().to_string(), source.to_string());
        }
    }
    (text.to_string(), String::new())
}

/// Pull legacy `[tag, other tag]` groups out of text
///
/// Returns the cleaned text and the tags found, lowercased with inner
/// whitespace turned into dashes.
pub fn extract_bracket_tags(text: &str) -> (String, Vec<String>) {
    let mut tags: Vec<String> = Vec::new();
    for cap in BRACKET_RE.captures_iter(text) {
        for part in cap[1].split(',') {
            let tag = part
                .trim()
                .to_lowercase()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join("-");
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }

    if tags.is_empty() && !BRACKET_RE.is_match(text) {
        return (text.to_string(), tags);
    }

    let stripped = BRACKET_RE.replace_all(text, "");
    let clean = MULTI_SPACE_RE.replace_all(&stripped, " ").trim().to_string();
    (clean, tags)
}

/// Whether the text still contains a legacy bracket group
pub fn has_bracket_tags(text: &str) -> bool {
    BRACKET_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tags() {
        let tags = parse_tags("The unexamined life #Philosophy #wisdom #philosophy");
        assert_eq!(tags, vec!["philosophy", "wisdom"]);
        assert!(parse_tags("no tags here").is_empty());
    }

    #[test]
    fn test_strip_tags() {
        assert_eq!(strip_tags("Know thyself #wisdom #greek"), "Know thyself");
        assert_eq!(strip_tags("a #x  b"), "a b");
    }

    #[test]
    fn test_strip_markup_removes_brackets() {
        let stripped = strip_markup("[ethics, stoicism] Memento mori #death");
        assert_eq!(stripped.trim(), "Memento mori");
    }

    #[test]
    fn test_detect_source() {
        let (text, source) =
            detect_source("Waste no more time arguing\n— Marcus Aurelius, Meditations");
        assert_eq!(text, "Waste no more time arguing");
        assert_eq!(source, "Marcus Aurelius, Meditations");
    }

    #[test]
    fn test_detect_source_rejects_sentences() {
        let input = "First part - and then a sentence. With periods.";
        let (text, source) = detect_source(input);
        assert_eq!(text, input);
        assert!(source.is_empty());
    }

    #[test]
    fn test_detect_source_ignores_hyphenated_words() {
        let (text, source) = detect_source("A well-known saying");
        assert_eq!(text, "A well-known saying");
        assert!(source.is_empty());
    }

    #[test]
    fn test_extract_bracket_tags() {
        let (text, tags) = extract_bracket_tags("Amor fati [Stoic Ethics, nietzsche] always");
        assert_eq!(text, "Amor fati always");
        assert_eq!(tags, vec!["stoic-ethics", "nietzsche"]);
    }

    #[test]
    fn test_extract_bracket_tags_without_brackets() {
        let (text, tags) = extract_bracket_tags("plain text");
        assert_eq!(text, "plain text");
        assert!(tags.is_empty());
        assert!(!has_bracket_tags("plain text"));
        assert!(has_bracket_tags("[x] plain"));
    }

    #[test]
    fn test_empty_brackets_are_not_a_tag_group() {
        assert!(!has_bracket_tags("let v = vec![]; done"));
        let (text, tags) = extract_bracket_tags("An empty list [] stays [todo]");
        assert_eq!(text, "An empty list [] stays");
        assert_eq!(tags, vec!["todo"]);
        assert_eq!(strip_markup("keep [] this"), "keep [] this");
    }
}
