//! Shared lexical patterns for validators.
//!
//! Regexes are compiled once and reused by the atomicity and specificity
//! checks as well as the extractor's candidate pre-check.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Vague, low-information referents, labelled for the violation message.
    pub static ref VAGUE_PATTERNS: Vec<(&'static str, Regex)> = vec![
        ("indefinite pronoun", Regex::new(r"(?i)\b(something|someone|somebody|somewhere|somehow|anything|whatever)\b").unwrap()),
        ("unspecified matters", Regex::new(r"(?i)\b(various|several|certain|some|other|many|a few|a number of)\s+(matters|things|issues|topics|stuff|items|aspects|points|concerns)\b").unwrap()),
        ("filler noun", Regex::new(r"(?i)\b(stuff|things)\b").unwrap()),
        ("trailing list", Regex::new(r"(?i)(\betc\b\.?|\band so on\b|\band so forth\b|\band stuff\b|\band things\b)").unwrap()),
    ];

    /// Two clauses joined by a semicolon.
    pub static ref SEMICOLON_CLAUSES: Regex = Regex::new(
        r"[A-Za-z0-9][^;]*;\s*[A-Za-z0-9]"
    ).unwrap();
}

/// Labels of every vague pattern found in the text, in pattern order.
pub fn vague_referents(text: &str) -> Vec<&'static str> {
    VAGUE_PATTERNS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(text))
        .map(|(label, _)| *label)
        .collect()
}

/// Check if two clauses are joined by a semicolon.
pub fn has_semicolon_clauses(text: &str) -> bool {
    SEMICOLON_CLAUSES.is_match(text)
}
