//! Target matching: decides whether a node plausibly answers a semantic
//! description before any candidate scoring happens. Exact and substring
//! equality with a small edit-distance tolerance, plus a keyword-overlap
//! fallback for paraphrased targets.

use strsim::levenshtein;

use crate::model::Node;

/// Edit distance tolerated between normalized strings.
const MAX_EDIT_DISTANCE: usize = 2;

/// Fraction of target words that must appear in the node text for the
/// overlap fallback to fire.
const OVERLAP_THRESHOLD: f32 = 0.6;

/// Lowercase, trim, collapse internal whitespace.
pub fn normalize(s: &str) -> String {
    s.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Tolerant string equality: exact, substring in either direction, or
/// within a small edit distance after normalization.
pub fn fuzzy_match(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return a == b;
    }
    if a == b || a.contains(&b) || b.contains(&a) {
        return true;
    }
    levenshtein(&a, &b) <= MAX_EDIT_DISTANCE
}

/// Fraction of the target's words found somewhere in the haystack.
pub fn keyword_overlap(target: &str, haystack: &str) -> f32 {
    let hay = normalize(haystack);
    let words: Vec<String> = normalize(target)
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let hits = words.iter().filter(|w| hay.contains(w.as_str())).count();
    hits as f32 / words.len() as f32
}

/// Does this node plausibly answer the semantic target? Checks the
/// label-like fields and every attribute value with `fuzzy_match`, then
/// falls back to keyword overlap across the node's text and aria label.
pub fn matches_target(node: &Node, target: &str) -> bool {
    let target = target.trim();
    if target.is_empty() {
        return false;
    }
    for field in node.label_fields() {
        if fuzzy_match(field, target) {
            return true;
        }
    }
    for value in node.attributes.values() {
        if fuzzy_match(value, target) {
            return true;
        }
    }
    keyword_overlap(target, &node.haystack()) >= OVERLAP_THRESHOLD
}
