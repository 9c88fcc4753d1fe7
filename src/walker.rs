//! Concurrent filesystem walker.
//!
//! The walk is split at the first level: every root is enumerated once,
//! files found directly under a root are evaluated on the spot, and each
//! immediate subdirectory becomes one task on a bounded rayon pool. A task
//! walks its subtree depth-first on a single thread with `walkdir`,
//! evaluating every entry against every query.
//!
//! Shared state is limited to the [`ResultSink`], the I/O error counter and
//! the completed-subdirectory counter. The latter is guarded by a mutex so
//! progress callbacks are emitted in increasing order even though tasks
//! finish on different threads.
//!
//! Cancellation is polled before every entry. A task that observes it stops
//! without counting its subdirectory as completed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use globset::GlobSet;
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use reference_finder_core::matcher::PreparedQuery;
use reference_finder_core::{FileKind, Matcher, SearchResult};

use crate::cancel::CancelToken;
use crate::config::{build_globset, Config};
use crate::events::SearchObserver;
use crate::sink::ResultSink;

/// Traversal settings that come from configuration rather than the request.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub follow_symlinks: bool,
    /// Directories whose name contains any of these (case-insensitively)
    /// are not descended into.
    pub recycle_markers: Vec<String>,
    /// Directory names matching this set are not descended into.
    pub exclude: GlobSet,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            recycle_markers: vec!["@Recycle".to_string(), "$RECYCLE.BIN".to_string()],
            exclude: GlobSet::empty(),
        }
    }
}

impl WalkOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            follow_symlinks: config.walk.follow_symlinks,
            recycle_markers: config.search.recycle_markers.clone(),
            exclude: build_globset(&config.walk.exclude_globs)
                .context("walk.exclude_globs")?,
        })
    }

    pub fn skips_dir(&self, name: &str) -> bool {
        let lowered = name.to_lowercase();
        self.recycle_markers
            .iter()
            .any(|m| lowered.contains(&m.to_lowercase()))
            || self.exclude.is_match(name)
    }

    fn walkdir(&self, dir: &Path) -> WalkDir {
        WalkDir::new(dir).follow_links(self.follow_symlinks)
    }
}

/// What a walk accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkReport {
    /// First-level subdirectories across all roots.
    pub total: usize,
    /// Subdirectories whose subtree was fully walked.
    pub completed: usize,
    pub interrupted: bool,
}

pub struct Walker {
    matcher: Arc<Matcher>,
    sink: Arc<ResultSink>,
    observer: Arc<dyn SearchObserver>,
    cancel: CancelToken,
    options: WalkOptions,
    io_errors: AtomicUsize,
}

impl Walker {
    pub fn new(
        matcher: Arc<Matcher>,
        sink: Arc<ResultSink>,
        observer: Arc<dyn SearchObserver>,
        cancel: CancelToken,
        options: WalkOptions,
    ) -> Self {
        Self {
            matcher,
            sink,
            observer,
            cancel,
            options,
            io_errors: AtomicUsize::new(0),
        }
    }

    pub fn io_errors(&self) -> usize {
        self.io_errors.load(Ordering::Relaxed)
    }

    /// Walk every root with a pool of `max_workers` threads, evaluating all
    /// queries in a single pass.
    pub fn run(&self, roots: &[PathBuf], max_workers: usize) -> Result<WalkReport> {
        let subdirs = self.enumerate_roots(roots);
        let total = subdirs.len();
        debug!(roots = roots.len(), subdirectories = total, "walk planned");

        if total == 0 {
            let interrupted = self.cancel.is_cancelled();
            if !interrupted {
                self.observer.on_walk_progress(1.0);
            }
            return Ok(WalkReport {
                total,
                completed: 0,
                interrupted,
            });
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("rfind-walk-{}", i))
            .build()
            .context("Failed to build walker thread pool")?;

        let completed = Mutex::new(0usize);
        pool.install(|| {
            subdirs.par_iter().for_each(|dir| {
                if self.cancel.is_cancelled() {
                    return;
                }
                if !self.walk_subtree(dir, self.matcher.queries()) {
                    return;
                }
                let mut done = completed.lock();
                if self.cancel.is_cancelled() {
                    return;
                }
                *done += 1;
                self.observer.on_walk_progress(*done as f64 / total as f64);
                self.observer.on_directory_processed(*done, total, dir);
            });
        });

        let completed = *completed.lock();
        Ok(WalkReport {
            total,
            completed,
            interrupted: completed < total && self.cancel.is_cancelled(),
        })
    }

    /// Evaluate the subtree below `dir` (not `dir` itself) against a single
    /// query. Used for the nested scan of a verified cache hit. Returns
    /// `false` if interrupted.
    pub fn scan_tree(&self, dir: &Path, query: &PreparedQuery) -> bool {
        let walker = self
            .options
            .walkdir(dir)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| !self.skip(e));
        self.drive(walker, std::slice::from_ref(query))
    }

    /// One-level enumeration of every root. Files directly under a root are
    /// evaluated here; the subdirectories to walk are returned sorted.
    fn enumerate_roots(&self, roots: &[PathBuf]) -> Vec<PathBuf> {
        let mut subdirs = Vec::new();
        for root in roots {
            if self.cancel.is_cancelled() {
                break;
            }
            let entries = self.options.walkdir(root).min_depth(1).max_depth(1);
            for entry in entries {
                let entry = match entry {
                    Ok(e) => e,
                    Err(err) => {
                        self.record_io_error(&err);
                        continue;
                    }
                };
                if entry.file_type().is_dir() {
                    if self.skip(&entry) {
                        debug!(path = %entry.path().display(), "skipping directory");
                        continue;
                    }
                    subdirs.push(entry.into_path());
                } else {
                    self.visit(&entry, self.matcher.queries());
                }
            }
        }
        subdirs.sort();
        subdirs
    }

    /// Walk `dir` and everything beneath it. Returns `false` if interrupted.
    fn walk_subtree(&self, dir: &Path, queries: &[PreparedQuery]) -> bool {
        let walker = self
            .options
            .walkdir(dir)
            .into_iter()
            .filter_entry(|e| !self.skip(e));
        self.drive(walker, queries)
    }

    fn drive<I>(&self, entries: I, queries: &[PreparedQuery]) -> bool
    where
        I: Iterator<Item = walkdir::Result<DirEntry>>,
    {
        for entry in entries {
            if self.cancel.is_cancelled() {
                return false;
            }
            match entry {
                Ok(entry) => self.visit(&entry, queries),
                Err(err) => self.record_io_error(&err),
            }
        }
        true
    }

    fn skip(&self, entry: &DirEntry) -> bool {
        entry.file_type().is_dir() && self.options.skips_dir(&entry.file_name().to_string_lossy())
    }

    fn visit(&self, entry: &DirEntry, queries: &[PreparedQuery]) {
        let raw = entry.file_name().to_string_lossy();
        if entry.file_type().is_dir() {
            for q in self.matcher.evaluate_dir(queries, &raw) {
                self.emit(entry.path(), FileKind::Folder, q);
            }
        } else if let Some((kind, hits)) = self.matcher.evaluate_file(queries, &raw) {
            for q in hits {
                self.emit(entry.path(), kind, q);
            }
        }
    }

    fn emit(&self, path: &Path, kind: FileKind, query: &PreparedQuery) {
        self.sink.offer(SearchResult {
            path: path.to_path_buf(),
            kind,
            query: query.text.clone(),
            query_index: query.index,
        });
    }

    fn record_io_error(&self, err: &walkdir::Error) {
        self.io_errors.fetch_add(1, Ordering::Relaxed);
        match err.path() {
            Some(path) => warn!(path = %path.display(), error = %err, "skipping unreadable entry"),
            None => warn!(error = %err, "skipping unreadable entry"),
        }
    }
}
