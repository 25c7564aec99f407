//! In-memory full-text index over entries
//!
//! Indexes three fields per entry (text, source, flattened tags) and ranks
//! matches with BM25 scoring per field, weighted by a per-field boost. Query
//! terms match exactly, by prefix, or within a bounded edit distance, and
//! are combined with OR.
//!
//! Postings live in a `BTreeMap` so prefix lookups are range scans and every
//! score is summed in the same order, which keeps ranking deterministic.

use std::collections::{BTreeMap, HashMap, HashSet};

use uuid::Uuid;

use crate::models::Entry;

/// Indexed fields, in posting order
const FIELD_COUNT: usize = 3;
const TEXT: usize = 0;
const SOURCE: usize = 1;
const TAGS: usize = 2;

/// Score multiplier per field
const BOOSTS: [f64; FIELD_COUNT] = [2.0, 1.5, 1.0];

/// BM25 term saturation
const BM25_K1: f64 = 1.2;
/// BM25 length normalization
const BM25_B: f64 = 0.7;

/// Weight of a prefix match relative to an exact one
const PREFIX_WEIGHT: f64 = 0.375;
/// Weight of a fuzzy match relative to an exact one
const FUZZY_WEIGHT: f64 = 0.45;
/// Allowed edit distance as a fraction of the query term length
const FUZZY_RATIO: f64 = 0.3;
/// Hard cap on the allowed edit distance
const MAX_EDIT_DISTANCE: usize = 6;

/// A ranked search result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    pub id: Uuid,
    pub score: f64,
}

#[derive(Debug, Clone)]
struct IndexedDoc {
    lengths: [usize; FIELD_COUNT],
    terms: Vec<String>,
}

/// Ranked text index, owned by whoever needs search
#[derive(Debug, Clone, Default)]
pub struct TextIndex {
    docs: HashMap<Uuid, IndexedDoc>,
    postings: BTreeMap<String, BTreeMap<Uuid, [u32; FIELD_COUNT]>>,
    total_lengths: [usize; FIELD_COUNT],
}

impl TextIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index over `entries`
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a Entry>) -> Self {
        let mut index = Self::new();
        index.rebuild(entries);
        index
    }

    /// Discard everything and index `entries`
    pub fn rebuild<'a>(&mut self, entries: impl IntoIterator<Item = &'a Entry>) {
        self.docs.clear();
        self.postings.clear();
        self.total_lengths = [0; FIELD_COUNT];
        for entry in entries {
            self.insert(entry);
        }
    }

    /// Index one entry, replacing any previous version with the same id
    pub fn insert(&mut self, entry: &Entry) {
        self.remove(entry.id);

        let mut fields: [Vec<String>; FIELD_COUNT] = Default::default();
        fields[TEXT] = tokenize(&entry.text);
        fields[SOURCE] = tokenize(&entry.source);
        fields[TAGS] = tokenize(&entry.tags_text());

        let mut terms: Vec<String> = Vec::new();
        let mut lengths = [0; FIELD_COUNT];
        for (field, tokens) in fields.iter().enumerate() {
            lengths[field] = tokens.len();
            self.total_lengths[field] += tokens.len();
            for token in tokens {
                let freqs = self
                    .postings
                    .entry(token.clone())
                    .or_default()
                    .entry(entry.id)
                    .or_insert([0; FIELD_COUNT]);
                freqs[field] += 1;
                if !terms.contains(token) {
                    terms.push(token.clone());
                }
            }
        }

        self.docs.insert(entry.id, IndexedDoc { lengths, terms });
    }

    /// Drop an entry from the index; unknown ids are ignored
    pub fn remove(&mut self, id: Uuid) -> bool {
        let Some(doc) = self.docs.remove(&id) else {
            return false;
        };
        for (field, len) in doc.lengths.iter().enumerate() {
            self.total_lengths[field] -= len;
        }
        for term in &doc.terms {
            if let Some(posting) = self.postings.get_mut(term) {
                posting.remove(&id);
                if posting.is_empty() {
                    self.postings.remove(term);
                }
            }
        }
        true
    }

    /// Re-index an entry after it changed
    pub fn update(&mut self, entry: &Entry) {
        self.remove(entry.id);
        self.insert(entry);
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.docs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Ids of matching entries, best first
    pub fn search(&self, query: &str) -> Vec<Uuid> {
        self.search_scored(query).into_iter().map(|h| h.id).collect()
    }

    /// Matching entries with their scores, best first
    ///
    /// Ordered by score descending, then id ascending.
    pub fn search_scored(&self, query: &str) -> Vec<SearchHit> {
        let mut seen = HashSet::new();
        let mut query_terms = tokenize(query);
        query_terms.retain(|t| seen.insert(t.clone()));
        if query_terms.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let mut scores: BTreeMap<Uuid, f64> = BTreeMap::new();
        for query_term in &query_terms {
            for (term, weight) in self.expand(query_term) {
                self.score_term(term, weight, &mut scores);
            }
        }

        let mut hits: Vec<SearchHit> = scores
            .into_iter()
            .map(|(id, score)| SearchHit { id, score })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits
    }

    /// Indexed terms matching a query term, with their match weights
    fn expand<'a>(&'a self, query_term: &str) -> BTreeMap<&'a str, f64> {
        let mut matches: BTreeMap<&str, f64> = BTreeMap::new();
        let query_len = query_term.chars().count();

        for (term, _) in self
            .postings
            .range::<str, _>((std::ops::Bound::Included(query_term), std::ops::Bound::Unbounded))
            .take_while(|(term, _)| term.starts_with(query_term))
        {
            let weight = if term.as_str() == query_term {
                1.0
            } else {
                let extra = term.chars().count() - query_len;
                PREFIX_WEIGHT * distance_penalty(query_len, extra)
            };
            keep_best(&mut matches, term, weight);
        }

        let max_distance = max_edit_distance(query_len);
        if max_distance > 0 {
            for term in self.postings.keys() {
                let len = term.chars().count();
                if len.abs_diff(query_len) > max_distance {
                    continue;
                }
                let distance = levenshtein(query_term, term);
                if distance > 0 && distance <= max_distance {
                    let weight = FUZZY_WEIGHT * distance_penalty(query_len, distance);
                    keep_best(&mut matches, term, weight);
                }
            }
        }

        matches
    }

    fn score_term(&self, term: &str, weight: f64, scores: &mut BTreeMap<Uuid, f64>) {
        let Some(posting) = self.postings.get(term) else {
            return;
        };
        let doc_count = self.docs.len() as f64;

        for field in 0..FIELD_COUNT {
            let field_docs = posting.values().filter(|f| f[field] > 0).count();
            if field_docs == 0 {
                continue;
            }
            let avg_len = self.total_lengths[field] as f64 / doc_count;
            let idf = (1.0 + (doc_count - field_docs as f64 + 0.5) / (field_docs as f64 + 0.5)).ln();

            for (id, freqs) in posting {
                let tf = freqs[field];
                if tf == 0 {
                    continue;
                }
                let len = self.docs.get(id).map(|d| d.lengths[field]).unwrap_or(0) as f64;
                let tf = tf as f64;
                let norm = if avg_len > 0.0 { len / avg_len } else { 1.0 };
                let saturation =
                    tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * norm));
                *scores.entry(*id).or_insert(0.0) += weight * BOOSTS[field] * idf * saturation;
            }
        }
    }
}

fn keep_best<'a>(matches: &mut BTreeMap<&'a str, f64>, term: &'a str, weight: f64) {
    let slot = matches.entry(term).or_insert(0.0);
    if weight > *slot {
        *slot = weight;
    }
}

/// Shrinks a match weight as the matched term drifts from the query
fn distance_penalty(query_len: usize, distance: usize) -> f64 {
    query_len as f64 / (query_len as f64 + FUZZY_RATIO * distance as f64)
}

/// Largest edit distance tolerated for a query term of `len` characters
pub fn max_edit_distance(len: usize) -> usize {
    ((len as f64 * FUZZY_RATIO).round() as usize).min(MAX_EDIT_DISTANCE)
}

/// Split into lowercase alphanumeric tokens
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Levenshtein edit distance over chars
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}
