//! Match evaluation and file classification.
//!
//! A [`Matcher`] is built once per request. Queries are prepared up front
//! ([`PreparedQuery`]) and every directory entry name is normalized once
//! ([`EntryName`]) so that classifying one entry against N live queries costs
//! N cheap comparisons rather than N normalizations.
//!
//! # Reference mode
//!
//! An entry matches when the references extracted from the query and from
//! the entry name are equal. When either side carries no reference, the
//! whole normalized query must be a substring of the normalized name. When
//! both sides carry a reference and they differ, the entry does not match,
//! so `CDB 9493` never matches `CDB 94933`.
//!
//! Spreadsheets additionally match when they are the technical sheet for the
//! query's reference (see [`technical_sheet_for`]).
//!
//! # File-name mode
//!
//! Every significant term of the query must appear in the normalized name,
//! either as a substring or as one of its whitespace-separated tokens.

use std::collections::BTreeSet;
use std::path::Path;

use crate::models::{FileKind, SearchMode, SearchRequest};
use crate::reference::{reference_in_normalized, technical_sheet_for};
use crate::text::{normalize, significant_terms};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "webp"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "wmv", "flv", "mkv", "avchd", "webm"];
const EXCEL_EXTENSIONS: &[&str] = &["xls", "xlsx"];
const WORD_EXTENSIONS: &[&str] = &["doc", "docx"];

/// A query term with everything the evaluator needs precomputed.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub index: usize,
    pub text: String,
    pub normalized: String,
    pub reference: Option<String>,
    pub terms: Vec<String>,
}

impl PreparedQuery {
    pub fn new(index: usize, text: &str) -> Self {
        let normalized = normalize(text);
        Self {
            index,
            text: text.to_string(),
            reference: reference_in_normalized(&normalized),
            terms: significant_terms(&normalized),
            normalized,
        }
    }

    /// The string handed to the path cache: the reference when one exists,
    /// otherwise the raw query.
    pub fn cache_key(&self) -> &str {
        self.reference.as_deref().unwrap_or(&self.text)
    }
}

/// A directory entry name, normalized once.
#[derive(Debug, Clone)]
pub struct EntryName<'a> {
    pub raw: &'a str,
    pub normalized: String,
    pub reference: Option<String>,
}

impl<'a> EntryName<'a> {
    pub fn new(raw: &'a str) -> Self {
        let normalized = normalize(raw);
        Self {
            raw,
            reference: reference_in_normalized(&normalized),
            normalized,
        }
    }
}

/// Per-request match evaluator.
#[derive(Debug, Clone)]
pub struct Matcher {
    mode: SearchMode,
    file_types: BTreeSet<FileKind>,
    custom_extensions: BTreeSet<String>,
    queries: Vec<PreparedQuery>,
}

impl Matcher {
    pub fn new(request: &SearchRequest) -> Self {
        Self {
            mode: request.mode(),
            file_types: request.file_types().clone(),
            custom_extensions: request.custom_extensions().clone(),
            queries: request
                .queries()
                .iter()
                .enumerate()
                .map(|(i, q)| PreparedQuery::new(i, q))
                .collect(),
        }
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn queries(&self) -> &[PreparedQuery] {
        &self.queries
    }

    pub fn wants(&self, kind: FileKind) -> bool {
        self.file_types.contains(&kind)
    }

    /// Whether `name` satisfies `query` under this matcher's mode.
    pub fn name_matches(&self, query: &PreparedQuery, name: &EntryName<'_>) -> bool {
        match self.mode {
            SearchMode::Reference => reference_equal(query, name),
            SearchMode::FileName => terms_contained(query, name),
        }
    }

    /// Classify a file by extension. Custom extensions take precedence and
    /// map to [`FileKind::Other`]. Unknown extensions yield `None`.
    pub fn classify(&self, file_name: &str) -> Option<FileKind> {
        let ext = Path::new(file_name)
            .extension()?
            .to_string_lossy()
            .to_ascii_lowercase();
        if self.custom_extensions.contains(&ext) {
            return Some(FileKind::Other);
        }
        classify_extension(&ext)
    }

    /// The file's kind if it is one the request asked for.
    pub fn accepts_file(&self, file_name: &str) -> Option<FileKind> {
        self.classify(file_name).filter(|kind| self.wants(*kind))
    }

    /// Evaluate a directory against one query. Only counts when folders were
    /// requested.
    pub fn match_dir(&self, query: &PreparedQuery, name: &EntryName<'_>) -> bool {
        self.wants(FileKind::Folder) && self.name_matches(query, name)
    }

    /// Evaluate a file of an already accepted `kind` against one query.
    pub fn match_file(&self, query: &PreparedQuery, name: &EntryName<'_>, kind: FileKind) -> bool {
        if self.name_matches(query, name) {
            return true;
        }
        match (self.mode, kind, &query.reference) {
            (SearchMode::Reference, FileKind::Excel, Some(reference)) => {
                technical_sheet_for(reference, &name.normalized)
            }
            _ => false,
        }
    }

    /// Every query in `queries` that a directory named `name` matches.
    pub fn evaluate_dir<'q>(&self, queries: &'q [PreparedQuery], name: &str) -> Vec<&'q PreparedQuery> {
        if !self.wants(FileKind::Folder) {
            return Vec::new();
        }
        let entry = EntryName::new(name);
        queries.iter().filter(|q| self.match_dir(q, &entry)).collect()
    }

    /// The kind of a file named `name` and every query in `queries` it
    /// matches, or `None` when files of its kind were not requested.
    pub fn evaluate_file<'q>(
        &self,
        queries: &'q [PreparedQuery],
        name: &str,
    ) -> Option<(FileKind, Vec<&'q PreparedQuery>)> {
        let kind = self.accepts_file(name)?;
        let entry = EntryName::new(name);
        let hits = queries
            .iter()
            .filter(|q| self.match_file(q, &entry, kind))
            .collect();
        Some((kind, hits))
    }
}

fn classify_extension(ext: &str) -> Option<FileKind> {
    if IMAGE_EXTENSIONS.contains(&ext) {
        Some(FileKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(FileKind::Video)
    } else if ext == "pdf" {
        Some(FileKind::Pdf)
    } else if WORD_EXTENSIONS.contains(&ext) {
        Some(FileKind::Word)
    } else if ext == "txt" {
        Some(FileKind::Text)
    } else if EXCEL_EXTENSIONS.contains(&ext) {
        Some(FileKind::Excel)
    } else {
        None
    }
}

fn reference_equal(query: &PreparedQuery, name: &EntryName<'_>) -> bool {
    match (&query.reference, &name.reference) {
        (Some(q), Some(n)) => q == n,
        _ => !query.normalized.is_empty() && name.normalized.contains(&query.normalized),
    }
}

// A query whose every word is a stopword falls back to whole-phrase
// containment instead of matching everything.
fn terms_contained(query: &PreparedQuery, name: &EntryName<'_>) -> bool {
    if query.terms.is_empty() {
        return !query.normalized.is_empty() && name.normalized.contains(&query.normalized);
    }
    query.terms.iter().all(|term| {
        name.normalized.contains(term.as_str())
            || name.normalized.split(' ').any(|token| token == term)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(mode: SearchMode, kinds: &[FileKind], queries: &[&str]) -> Matcher {
        let mut b = SearchRequest::builder(mode).queries(queries.iter().copied()).root("/r");
        for k in kinds {
            b = b.file_type(*k);
        }
        Matcher::new(&b.build().unwrap())
    }

    fn is_exact_match(query: &str, name: &str) -> bool {
        reference_equal(&PreparedQuery::new(0, query), &EntryName::new(name))
    }

    fn dir_hits(m: &Matcher, name: &str) -> Vec<usize> {
        m.evaluate_dir(m.queries(), name).iter().map(|q| q.index).collect()
    }

    fn file_hits(m: &Matcher, name: &str) -> Option<(FileKind, Vec<usize>)> {
        m.evaluate_file(m.queries(), name)
            .map(|(kind, hits)| (kind, hits.iter().map(|q| q.index).collect()))
    }

    #[test]
    fn reference_equality_across_formats() {
        assert!(is_exact_match("CDB 9493", "cdb_9493_closet.pdf"));
        assert!(is_exact_match("CDB 9493", "CDB9493"));
        assert!(is_exact_match("cdb-9493 mesa", "Mueble CDB 9493"));
    }

    #[test]
    fn reference_digit_boundary() {
        assert!(!is_exact_match("CDB 9493", "CDB 94933"));
        assert!(!is_exact_match("CDB 9493", "CDB 9494"));
    }

    #[test]
    fn reference_fallback_to_substring() {
        assert!(is_exact_match("Nombre de Mueble", "BLZ 6472 Nombre de Mueble"));
        assert!(is_exact_match("nombre-de-mueble", "Nombre de Mueble final"));
        assert!(!is_exact_match("Nombre de Mueble", "Otro Mueble"));
        assert!(!is_exact_match("", "anything"));
    }

    #[test]
    fn filename_terms_any_order() {
        let m = matcher(SearchMode::FileName, &[FileKind::Pdf], &["cocina mueble"]);
        let q = &m.queries()[0];
        assert!(m.name_matches(q, &EntryName::new("Mueble_de_Cocina_v2.pdf")));
        assert!(!m.name_matches(q, &EntryName::new("Mueble de bano.pdf")));
    }

    #[test]
    fn filename_terms_match_inside_words() {
        // Term containment is substring based, so "mesa" hits "mesas".
        let m = matcher(SearchMode::FileName, &[FileKind::Folder], &["mesa"]);
        assert_eq!(dir_hits(&m, "Mesas Auxiliares"), vec![0]);
    }

    #[test]
    fn filename_stopword_only_query() {
        let m = matcher(SearchMode::FileName, &[FileKind::Folder], &["de la"]);
        assert!(dir_hits(&m, "Mesa comedor").is_empty());
        assert_eq!(dir_hits(&m, "Casa de la Abuela"), vec![0]);
    }

    #[test]
    fn classify_extension_table() {
        let m = matcher(SearchMode::Reference, &[FileKind::Folder], &["x"]);
        assert_eq!(m.classify("a.JPG"), Some(FileKind::Image));
        assert_eq!(m.classify("a.webm"), Some(FileKind::Video));
        assert_eq!(m.classify("a.pdf"), Some(FileKind::Pdf));
        assert_eq!(m.classify("a.docx"), Some(FileKind::Word));
        assert_eq!(m.classify("a.txt"), Some(FileKind::Text));
        assert_eq!(m.classify("a.xlsx"), Some(FileKind::Excel));
        assert_eq!(m.classify("a.dwg"), None);
        assert_eq!(m.classify("README"), None);
    }

    #[test]
    fn custom_extensions_override() {
        let req = SearchRequest::builder(SearchMode::Reference)
            .query("ABC 123")
            .root("/r")
            .file_type(FileKind::Other)
            .custom_extensions(["dwg", "pdf"])
            .build()
            .unwrap();
        let m = Matcher::new(&req);
        assert_eq!(m.classify("plano.DWG"), Some(FileKind::Other));
        assert_eq!(m.classify("ficha.pdf"), Some(FileKind::Other));
        assert_eq!(m.accepts_file("foto.jpg"), None);
    }

    #[test]
    fn files_filtered_by_requested_kind() {
        let m = matcher(SearchMode::Reference, &[FileKind::Image], &["BLZ 6472"]);
        assert_eq!(file_hits(&m, "BLZ 6472.jpg"), Some((FileKind::Image, vec![0])));
        assert_eq!(file_hits(&m, "BLZ 6472.pdf"), None);
        assert!(dir_hits(&m, "BLZ 6472").is_empty());
    }

    #[test]
    fn technical_sheet_matches_spreadsheets_only() {
        let m = matcher(
            SearchMode::Reference,
            &[FileKind::Excel, FileKind::Pdf],
            &["CDB 9493"],
        );
        assert_eq!(
            file_hits(&m, "Ficha Tecnica 9493.xlsx"),
            Some((FileKind::Excel, vec![0]))
        );
        assert_eq!(file_hits(&m, "Ficha Tecnica 9493.pdf"), Some((FileKind::Pdf, vec![])));
    }

    #[test]
    fn evaluates_every_query() {
        let m = matcher(
            SearchMode::Reference,
            &[FileKind::Folder],
            &["BLZ 6472", "Mesa", "blz6472"],
        );
        assert_eq!(dir_hits(&m, "BLZ-6472 Mesa"), vec![0, 1, 2]);
    }

    #[test]
    fn evaluates_a_subset_of_queries() {
        let m = matcher(SearchMode::Reference, &[FileKind::Folder], &["BLZ 6472", "ABC 123"]);
        let only_second = &m.queries()[1..];
        let hits = m.evaluate_dir(only_second, "ABC 123 Silla");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 1);
        assert!(m.evaluate_dir(only_second, "BLZ 6472").is_empty());
    }

    #[test]
    fn cache_key_prefers_reference() {
        assert_eq!(PreparedQuery::new(0, "mueble blz_6472").cache_key(), "BLZ 6472");
        assert_eq!(PreparedQuery::new(0, "Mesa comedor").cache_key(), "Mesa comedor");
    }
}
