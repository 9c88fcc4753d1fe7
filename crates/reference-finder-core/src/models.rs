//! Core data models shared by the engine, the path cache and the CLI.
//!
//! A [`SearchRequest`] is immutable once built; [`SearchRequest::builder`]
//! performs all validation up front so that a running search never fails
//! for a caller-visible reason.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::text::normalize;

/// Default walker pool width.
pub const DEFAULT_MAX_WORKERS: usize = 12;
/// Default cap on candidates returned by one path cache lookup.
pub const DEFAULT_DB_RESULT_CAP: usize = 50;

/// How query terms are compared against entry names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Structured reference codes (`BLZ 6472`).
    Reference,
    /// Free-text name fragments, matched term by term.
    #[serde(alias = "name", alias = "file_name")]
    FileName,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Reference => "reference",
            SearchMode::FileName => "filename",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reference" | "ref" => Ok(SearchMode::Reference),
            "filename" | "file_name" | "name" => Ok(SearchMode::FileName),
            other => Err(format!(
                "unknown search mode '{}' (expected 'reference' or 'filename')",
                other
            )),
        }
    }
}

/// Entry classification used both as a request filter and on results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Folder,
    Image,
    Video,
    Excel,
    Pdf,
    Word,
    Text,
    Other,
}

impl FileKind {
    pub const ALL: [FileKind; 8] = [
        FileKind::Folder,
        FileKind::Image,
        FileKind::Video,
        FileKind::Excel,
        FileKind::Pdf,
        FileKind::Word,
        FileKind::Text,
        FileKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Folder => "folder",
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Excel => "excel",
            FileKind::Pdf => "pdf",
            FileKind::Word => "word",
            FileKind::Text => "text",
            FileKind::Other => "other",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileKind {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        FileKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == lowered)
            .ok_or_else(|| RequestError::UnknownFileType(s.to_string()))
    }
}

/// An immutable, validated search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    queries: Vec<String>,
    roots: BTreeSet<PathBuf>,
    file_types: BTreeSet<FileKind>,
    custom_extensions: BTreeSet<String>,
    mode: SearchMode,
    max_workers: usize,
    db_result_cap: usize,
    cache_only: bool,
}

impl SearchRequest {
    pub fn builder(mode: SearchMode) -> SearchRequestBuilder {
        SearchRequestBuilder::new(mode)
    }

    /// Query terms in the order they were supplied. Indexes into this slice
    /// are the `query_index` carried by every [`SearchResult`].
    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    pub fn roots(&self) -> &BTreeSet<PathBuf> {
        &self.roots
    }

    pub fn file_types(&self) -> &BTreeSet<FileKind> {
        &self.file_types
    }

    /// Lower-cased extensions without a leading dot.
    pub fn custom_extensions(&self) -> &BTreeSet<String> {
        &self.custom_extensions
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn db_result_cap(&self) -> usize {
        self.db_result_cap
    }

    /// Only consult the path cache; skip the live walk.
    pub fn cache_only(&self) -> bool {
        self.cache_only
    }
}

/// Builder for [`SearchRequest`]. Errors are deferred to [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct SearchRequestBuilder {
    queries: Vec<String>,
    roots: BTreeSet<PathBuf>,
    file_types: BTreeSet<FileKind>,
    custom_extensions: BTreeSet<String>,
    mode: SearchMode,
    max_workers: usize,
    db_result_cap: usize,
    cache_only: bool,
    error: Option<RequestError>,
}

impl SearchRequestBuilder {
    fn new(mode: SearchMode) -> Self {
        Self {
            queries: Vec::new(),
            roots: BTreeSet::new(),
            file_types: BTreeSet::new(),
            custom_extensions: BTreeSet::new(),
            mode,
            max_workers: DEFAULT_MAX_WORKERS,
            db_result_cap: DEFAULT_DB_RESULT_CAP,
            cache_only: false,
            error: None,
        }
    }

    /// Add one query term. Surrounding whitespace is trimmed and blank
    /// terms are ignored.
    pub fn query(mut self, query: impl AsRef<str>) -> Self {
        let trimmed = query.as_ref().trim();
        if !trimmed.is_empty() {
            self.queries.push(trimmed.to_string());
        }
        self
    }

    pub fn queries<I, S>(self, queries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        queries.into_iter().fold(self, |b, q| b.query(q))
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.roots.insert(root.into());
        self
    }

    pub fn roots<I, P>(self, roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        roots.into_iter().fold(self, |b, r| b.root(r))
    }

    pub fn file_type(mut self, kind: FileKind) -> Self {
        self.file_types.insert(kind);
        self
    }

    /// Add file type filters by name (`"folder"`, `"pdf"`, ...). The first
    /// unknown name is reported by [`build`](Self::build).
    pub fn file_type_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            match name.as_ref().parse::<FileKind>() {
                Ok(kind) => {
                    self.file_types.insert(kind);
                }
                Err(e) => {
                    self.error.get_or_insert(e);
                }
            }
        }
        self
    }

    /// Add an extension evaluated under [`FileKind::Other`]. A leading dot
    /// is stripped and the value lower-cased.
    pub fn custom_extension(mut self, ext: impl AsRef<str>) -> Self {
        let ext = ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase();
        if !ext.is_empty() {
            self.custom_extensions.insert(ext);
        }
        self
    }

    pub fn custom_extensions<I, S>(self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        exts.into_iter().fold(self, |b, e| b.custom_extension(e))
    }

    pub fn max_workers(mut self, n: usize) -> Self {
        self.max_workers = n;
        self
    }

    pub fn db_result_cap(mut self, n: usize) -> Self {
        self.db_result_cap = n;
        self
    }

    pub fn cache_only(mut self, cache_only: bool) -> Self {
        self.cache_only = cache_only;
        self
    }

    /// Validate and freeze the request.
    ///
    /// With no file type filter at all the request searches for folders.
    pub fn build(self) -> Result<SearchRequest, RequestError> {
        if let Some(e) = self.error {
            return Err(e);
        }
        if self.queries.is_empty() {
            return Err(RequestError::EmptyQueries);
        }
        if self.roots.is_empty() {
            return Err(RequestError::EmptyRoots);
        }
        if !self.custom_extensions.is_empty() && !self.file_types.contains(&FileKind::Other) {
            return Err(RequestError::CustomExtensionsWithoutOther);
        }
        if self.max_workers == 0 {
            return Err(RequestError::InvalidLimit {
                name: "max_workers",
            });
        }
        if self.db_result_cap == 0 {
            return Err(RequestError::InvalidLimit {
                name: "db_result_cap",
            });
        }

        let mut file_types = self.file_types;
        if file_types.is_empty() {
            file_types.insert(FileKind::Folder);
        }

        Ok(SearchRequest {
            queries: self.queries,
            roots: self.roots,
            file_types,
            custom_extensions: self.custom_extensions,
            mode: self.mode,
            max_workers: self.max_workers,
            db_result_cap: self.db_result_cap,
            cache_only: self.cache_only,
        })
    }
}

/// One match: a path, what it is, and which query found it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchResult {
    pub path: PathBuf,
    pub kind: FileKind,
    pub query: String,
    pub query_index: usize,
}

/// A folder record in the persistent path cache.
///
/// Timestamps are Unix seconds. `folder_name` is stored normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub id: i64,
    pub folder_name: String,
    pub path: String,
    pub content_hash: Option<String>,
    pub created_at: i64,
    pub last_updated: i64,
    pub is_deleted: bool,
    pub parent_path: Option<String>,
    pub total_items: i64,
}

impl CacheEntry {
    /// Build a fresh (unsaved) record for the folder at `path`.
    pub fn for_folder(path: &Path, content_hash: Option<String>, total_items: i64, now: i64) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id: 0,
            folder_name: normalize(&name),
            path: path.to_string_lossy().into_owned(),
            content_hash,
            created_at: now,
            last_updated: now,
            is_deleted: false,
            parent_path: path.parent().map(|p| p.to_string_lossy().into_owned()),
            total_items,
        }
    }

    pub fn path_buf(&self) -> PathBuf {
        PathBuf::from(&self.path)
    }
}

/// Change-log record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Created,
    Updated,
    Moved,
    Deleted,
    Restored,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "CREATED",
            ChangeKind::Updated => "UPDATED",
            ChangeKind::Moved => "MOVED",
            ChangeKind::Deleted => "DELETED",
            ChangeKind::Restored => "RESTORED",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(ChangeKind::Created),
            "UPDATED" => Ok(ChangeKind::Updated),
            "MOVED" => Ok(ChangeKind::Moved),
            "DELETED" => Ok(ChangeKind::Deleted),
            "RESTORED" => Ok(ChangeKind::Restored),
            other => Err(format!("unknown change type '{}'", other)),
        }
    }
}

/// One append-only change-log row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeLogEntry {
    pub folder_id: i64,
    pub change: ChangeKind,
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub changed_at: i64,
}

/// Aggregate counters over the path cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub live_entries: i64,
    pub deleted_entries: i64,
    pub changes: i64,
    /// `(change type, count)` ordered by change type.
    pub changes_by_kind: Vec<(String, i64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SearchRequestBuilder {
        SearchRequest::builder(SearchMode::Reference)
            .query("BLZ 6472")
            .root("/mnt/catalog")
    }

    #[test]
    fn builder_defaults() {
        let req = base().build().unwrap();
        assert_eq!(req.max_workers(), DEFAULT_MAX_WORKERS);
        assert_eq!(req.db_result_cap(), DEFAULT_DB_RESULT_CAP);
        assert!(!req.cache_only());
        assert!(req.file_types().contains(&FileKind::Folder));
        assert_eq!(req.file_types().len(), 1);
    }

    #[test]
    fn queries_keep_order_and_skip_blanks() {
        let req = SearchRequest::builder(SearchMode::FileName)
            .queries(["  mesa comedor ", "", "  ", "silla"])
            .root("/r")
            .build()
            .unwrap();
        assert_eq!(req.queries(), &["mesa comedor".to_string(), "silla".to_string()]);
    }

    #[test]
    fn empty_queries_rejected() {
        let err = SearchRequest::builder(SearchMode::Reference)
            .queries(["", "   "])
            .root("/r")
            .build()
            .unwrap_err();
        assert_eq!(err, RequestError::EmptyQueries);
    }

    #[test]
    fn empty_roots_rejected() {
        let err = SearchRequest::builder(SearchMode::Reference)
            .query("BLZ 6472")
            .build()
            .unwrap_err();
        assert_eq!(err, RequestError::EmptyRoots);
    }

    #[test]
    fn unknown_file_type_rejected() {
        let err = base()
            .file_type_names(["folder", "spreadsheet"])
            .build()
            .unwrap_err();
        assert_eq!(err, RequestError::UnknownFileType("spreadsheet".into()));
    }

    #[test]
    fn custom_extensions_need_other() {
        let err = base().custom_extension(".dwg").build().unwrap_err();
        assert_eq!(err, RequestError::CustomExtensionsWithoutOther);

        let req = base()
            .file_type(FileKind::Other)
            .custom_extensions([".DWG", "skp"])
            .build()
            .unwrap();
        assert!(req.custom_extensions().contains("dwg"));
        assert!(req.custom_extensions().contains("skp"));
    }

    #[test]
    fn zero_limits_rejected() {
        assert_eq!(
            base().max_workers(0).build().unwrap_err(),
            RequestError::InvalidLimit { name: "max_workers" }
        );
        assert_eq!(
            base().db_result_cap(0).build().unwrap_err(),
            RequestError::InvalidLimit {
                name: "db_result_cap"
            }
        );
    }

    #[test]
    fn file_kind_parsing() {
        assert_eq!("PDF".parse::<FileKind>().unwrap(), FileKind::Pdf);
        assert_eq!(" excel ".parse::<FileKind>().unwrap(), FileKind::Excel);
        assert!("xls".parse::<FileKind>().is_err());
    }

    #[test]
    fn search_mode_parsing() {
        assert_eq!("Reference".parse::<SearchMode>().unwrap(), SearchMode::Reference);
        assert_eq!("name".parse::<SearchMode>().unwrap(), SearchMode::FileName);
        assert!("fuzzy".parse::<SearchMode>().is_err());
    }

    #[test]
    fn cache_entry_for_folder() {
        let e = CacheEntry::for_folder(Path::new("/nas/cat/BLZ-6472 Mesa"), None, 3, 100);
        assert_eq!(e.folder_name, "blz 6472 mesa");
        assert_eq!(e.parent_path.as_deref(), Some("/nas/cat"));
        assert_eq!(e.total_items, 3);
        assert!(!e.is_deleted);
    }
}
