//! Reference-code extraction.
//!
//! A reference is three letters followed, with optional whitespace, by three
//! to five digits: `BLZ 6472`, `cdb_9493`, `Mueble ABC12345 roble`. The
//! canonical form is `"LETTERS DIGITS"` upper-cased.
//!
//! Extraction runs on [`normalize`]d text, so the separators `+ _ - .`
//! behave like whitespace and accents do not break a match.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::text::normalize;

static REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z]{3})\s*([0-9]{3,5})").expect("reference pattern is valid"));

static TECHNICAL_SHEET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ficha\s*tecnica").expect("technical sheet pattern is valid"));

/// Extract the first reference code from `text`, or `None` if absent.
///
/// ```rust
/// use reference_finder_core::reference::extract_reference;
///
/// assert_eq!(extract_reference("BLZ 6472 - Ejemplo").as_deref(), Some("BLZ 6472"));
/// assert_eq!(extract_reference("cdb_9493_closet.pdf").as_deref(), Some("CDB 9493"));
/// assert_eq!(extract_reference("Mesa de comedor"), None);
/// ```
pub fn extract_reference(text: &str) -> Option<String> {
    reference_in_normalized(&normalize(text))
}

/// [`extract_reference`] for text that is already normalized.
pub fn reference_in_normalized(normalized: &str) -> Option<String> {
    let caps = REFERENCE_RE.captures(normalized)?;
    Some(format!("{} {}", caps[1].to_uppercase(), &caps[2]))
}

/// Technical-sheet check against a canonical reference and a normalized name.
pub fn technical_sheet_for(reference: &str, normalized_name: &str) -> bool {
    if !TECHNICAL_SHEET_RE.is_match(normalized_name) {
        return false;
    }
    let reference = reference.to_lowercase();
    normalized_name.contains(&reference)
        || reference.split(' ').any(|part| normalized_name.contains(part))
}
