//! Text normalization and significant-term extraction.
//!
//! Every comparison between a query and a folder or file name goes through
//! [`normalize`] first, so that `"Cocina_Integral-ÑANDÚ.v2"` and
//! `"cocina integral nandu v2"` compare equal.
//!
//! # Algorithm
//!
//! 1. Lower-case.
//! 2. Unicode compatibility decomposition (NFKD), dropping combining marks.
//! 3. Replace `+ _ - .` with spaces.
//! 4. Drop every remaining character that is not `a-z`, `0-9` or whitespace.
//! 5. Collapse whitespace runs to a single space and trim.
//!
//! The output alphabet is `[a-z0-9 ]` with no leading, trailing or repeated
//! spaces, which makes the function idempotent.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Articles, prepositions and conjunctions ignored when extracting terms.
pub const STOPWORDS: &[&str] = &[
    "de", "la", "el", "y", "en", "a", "por", "para", "con", "sin", "sobre",
];

/// Normalize free text for comparison. See the module docs for the steps.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();

    let mut cleaned = String::with_capacity(lowered.len());
    for c in lowered.nfkd() {
        if is_combining_mark(c) {
            continue;
        }
        match c {
            '+' | '_' | '-' | '.' => cleaned.push(' '),
            'a'..='z' | '0'..='9' => cleaned.push(c),
            c if c.is_whitespace() => cleaned.push(' '),
            _ => {}
        }
    }

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize, split on whitespace, and drop stopwords and one-character
/// tokens. Order of the surviving terms is preserved.
pub fn significant_terms(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .filter(|term| term.len() > 1 && !STOPWORDS.contains(term))
        .map(str::to_string)
        .collect()
}
