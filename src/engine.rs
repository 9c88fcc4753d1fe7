//! Search orchestration.
//!
//! A search is a small state machine driven by an index into the ordered
//! query list:
//!
//! ```text
//! Idle ─▶ CacheLookup(0) ─▶ CacheLookup(1) ─▶ … ─▶ Walk ─▶ Completed
//!               │                  │                 │
//!               └──────────────────┴─────────────────┴──▶ Interrupted
//! ```
//!
//! The cache lookup phase runs on the search task, one query at a time.
//! Every candidate returned by the [`PathCache`] is re-checked with the
//! [`Matcher`] and verified on disk before it is emitted. Stale candidates
//! are repaired when the folder can be found again next to where it was
//! recorded, and soft-deleted otherwise.
//!
//! The walk phase hands the optimized root set to the [`Walker`] on a
//! blocking thread. Results from both phases go through one shared
//! [`ResultSink`], so a folder found in the cache is never emitted again by
//! the walk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use reference_finder_core::cache::{now_ts, PathCache};
use reference_finder_core::matcher::{EntryName, PreparedQuery};
use reference_finder_core::models::CacheEntry;
use reference_finder_core::paths::{is_under, optimize_roots};
use reference_finder_core::text::normalize;
use reference_finder_core::{FileKind, Matcher, SearchMode, SearchRequest, SearchResult};

use crate::cancel::CancelToken;
use crate::events::{SearchObserver, SearchOutcome, SearchPhase, SearchState, SearchSummary};
use crate::sink::ResultSink;
use crate::walker::{WalkOptions, Walker};

/// Entry point for running searches against one path cache.
#[derive(Clone)]
pub struct SearchEngine {
    cache: Arc<dyn PathCache>,
    walk_options: WalkOptions,
}

impl SearchEngine {
    pub fn new(cache: Arc<dyn PathCache>) -> Self {
        Self {
            cache,
            walk_options: WalkOptions::default(),
        }
    }

    pub fn with_walk_options(mut self, options: WalkOptions) -> Self {
        self.walk_options = options;
        self
    }

    /// Start `request` on the current tokio runtime and return immediately.
    ///
    /// Progress and results are reported through `observer` while the
    /// search runs. Must be called from within a tokio runtime.
    pub fn start_search(
        &self,
        request: SearchRequest,
        observer: Arc<dyn SearchObserver>,
    ) -> SearchHandle {
        self.start_search_with_token(request, observer, CancelToken::new())
    }

    /// [`start_search`](Self::start_search) with a cancellation token the
    /// caller already holds.
    pub fn start_search_with_token(
        &self,
        request: SearchRequest,
        observer: Arc<dyn SearchObserver>,
        cancel: CancelToken,
    ) -> SearchHandle {
        let id = Uuid::new_v4();
        let run = SearchRun::new(
            self.cache.clone(),
            request,
            observer,
            cancel.clone(),
            self.walk_options.clone(),
        );
        let task = tokio::spawn(run.execute().instrument(info_span!("search", %id)));
        SearchHandle { id, cancel, task }
    }
}

/// A running search.
pub struct SearchHandle {
    id: Uuid,
    cancel: CancelToken,
    task: JoinHandle<SearchOutcome>,
}

impl SearchHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Request cooperative interruption. The search finishes as
    /// [`SearchState::Interrupted`] with whatever it found so far.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn wait(self) -> Result<SearchOutcome> {
        self.task.await.context("search task panicked")
    }
}

enum Step {
    CacheLookup { next_query: usize },
    Walk,
    Done(SearchState),
}

struct SearchRun {
    cache: Arc<dyn PathCache>,
    request: SearchRequest,
    matcher: Arc<Matcher>,
    sink: Arc<ResultSink>,
    walker: Arc<Walker>,
    observer: Arc<dyn SearchObserver>,
    cancel: CancelToken,
    roots: Vec<PathBuf>,
    summary: SearchSummary,
}

impl SearchRun {
    fn new(
        cache: Arc<dyn PathCache>,
        request: SearchRequest,
        observer: Arc<dyn SearchObserver>,
        cancel: CancelToken,
        walk_options: WalkOptions,
    ) -> Self {
        let matcher = Arc::new(Matcher::new(&request));
        let sink = Arc::new(ResultSink::new(request.queries(), observer.clone()));
        let walker = Arc::new(Walker::new(
            matcher.clone(),
            sink.clone(),
            observer.clone(),
            cancel.clone(),
            walk_options,
        ));
        let roots = optimize_roots(request.roots().iter().cloned());
        Self {
            cache,
            request,
            matcher,
            sink,
            walker,
            observer,
            cancel,
            roots,
            summary: SearchSummary::default(),
        }
    }

    async fn execute(mut self) -> SearchOutcome {
        let started = Instant::now();
        info!(
            mode = %self.request.mode(),
            queries = self.request.queries().len(),
            roots = self.roots.len(),
            "search started"
        );

        self.enter(SearchPhase::CacheLookup);
        let mut step = Step::CacheLookup { next_query: 0 };
        let state = loop {
            step = match step {
                Step::CacheLookup { next_query } => self.cache_step(next_query).await,
                Step::Walk => self.walk_step().await,
                Step::Done(state) => break state,
            };
        };

        self.summary.results = self.sink.len();
        self.summary.io_errors = self.walker.io_errors();
        self.summary.elapsed_ms = started.elapsed().as_millis() as u64;

        let outcome = SearchOutcome {
            state,
            groups: self.sink.grouped(),
            summary: self.summary.clone(),
        };
        self.enter(match state {
            SearchState::Completed => SearchPhase::Completed,
            SearchState::Interrupted => SearchPhase::Interrupted,
        });
        info!(
            results = outcome.summary.results,
            cache_hits = outcome.summary.cache_hits,
            elapsed_ms = outcome.summary.elapsed_ms,
            "search finished"
        );
        self.observer.on_completed(&outcome);
        outcome
    }

    fn enter(&self, phase: SearchPhase) {
        debug!(?phase, "phase");
        self.observer.on_phase(phase);
    }

    async fn cache_step(&mut self, index: usize) -> Step {
        if self.cancel.is_cancelled() {
            return Step::Done(SearchState::Interrupted);
        }

        let total = self.matcher.queries().len();
        if index >= total {
            if self.request.cache_only() {
                self.observer.on_walk_progress(1.0);
                return Step::Done(SearchState::Completed);
            }
            self.enter(SearchPhase::Walk);
            return Step::Walk;
        }

        let query = self.matcher.queries()[index].clone();
        self.lookup_query(&query).await;
        self.observer.on_db_progress((index + 1) as f64 / total as f64);
        Step::CacheLookup {
            next_query: index + 1,
        }
    }

    async fn lookup_query(&mut self, query: &PreparedQuery) {
        let term = match self.matcher.mode() {
            SearchMode::Reference => query.cache_key(),
            SearchMode::FileName => query.text.as_str(),
        };
        let entries = match self
            .cache
            .lookup(term, &self.roots, self.request.db_result_cap())
            .await
        {
            Ok(entries) => entries,
            Err(err) => {
                warn!(query = %query.text, error = %err, "cache lookup failed");
                self.summary.cache_errors += 1;
                return;
            }
        };
        debug!(query = %query.text, candidates = entries.len(), "cache lookup");

        for entry in entries {
            if self.cancel.is_cancelled() {
                return;
            }
            if !self
                .matcher
                .name_matches(query, &EntryName::new(&entry.folder_name))
            {
                continue;
            }
            let path = entry.path_buf();
            if is_dir(&path).await {
                self.accept_hit(path, query).await;
            } else {
                self.repair(entry, query).await;
            }
        }
    }

    /// Emit a verified folder and, in reference mode, scan beneath it for
    /// the same query.
    async fn accept_hit(&mut self, path: PathBuf, query: &PreparedQuery) {
        let emitted = self.sink.offer(SearchResult {
            path: path.clone(),
            kind: FileKind::Folder,
            query: query.text.clone(),
            query_index: query.index,
        });
        if emitted {
            self.summary.cache_hits += 1;
        }
        if self.matcher.mode() != SearchMode::Reference {
            return;
        }

        let walker = self.walker.clone();
        let query = query.clone();
        let dir = path.clone();
        if let Err(err) = tokio::task::spawn_blocking(move || walker.scan_tree(&dir, &query)).await
        {
            warn!(path = %path.display(), error = %err, "nested scan failed");
        }
    }

    /// A cached folder is gone. Look for it again under its recorded parent;
    /// relocate the record if found, otherwise soft-delete it and let the
    /// walk decide.
    async fn repair(&mut self, entry: CacheEntry, query: &PreparedQuery) {
        let relocated = match entry.parent_path.as_deref() {
            Some(parent) => find_relocated(Path::new(parent), &entry, &self.roots).await,
            None => None,
        };

        match relocated {
            Some(new_path) => {
                let moved = CacheEntry {
                    id: entry.id,
                    created_at: entry.created_at,
                    ..CacheEntry::for_folder(
                        &new_path,
                        entry.content_hash.clone(),
                        entry.total_items,
                        now_ts(),
                    )
                };
                match self.cache.relocate(&entry.path, &moved).await {
                    Ok(_) => {
                        info!(from = %entry.path, to = %new_path.display(), "cache entry relocated");
                        self.summary.cache_repairs += 1;
                    }
                    Err(err) => {
                        warn!(path = %entry.path, error = %err, "cache relocate failed");
                        self.summary.cache_errors += 1;
                    }
                }
                self.accept_hit(new_path, query).await;
            }
            None => {
                debug!(path = %entry.path, "stale cache entry");
                self.summary.stale_entries += 1;
                if let Err(err) = self.cache.soft_delete(&entry.path).await {
                    warn!(path = %entry.path, error = %err, "cache soft delete failed");
                    self.summary.cache_errors += 1;
                }
            }
        }
    }

    async fn walk_step(&mut self) -> Step {
        if self.cancel.is_cancelled() {
            return Step::Done(SearchState::Interrupted);
        }

        let walker = self.walker.clone();
        let roots = self.roots.clone();
        let workers = self.request.max_workers();
        let joined = tokio::task::spawn_blocking(move || walker.run(&roots, workers)).await;

        let report = match joined {
            Ok(Ok(report)) => report,
            Ok(Err(err)) => {
                warn!(error = %err, "walk failed");
                return Step::Done(self.state_after_failure());
            }
            Err(err) => {
                warn!(error = %err, "walk task panicked");
                return Step::Done(self.state_after_failure());
            }
        };

        self.summary.directories_total = report.total;
        self.summary.directories_walked = report.completed;
        if report.interrupted {
            Step::Done(SearchState::Interrupted)
        } else {
            Step::Done(SearchState::Completed)
        }
    }

    fn state_after_failure(&mut self) -> SearchState {
        self.summary.walk_failed = true;
        if self.cancel.is_cancelled() {
            SearchState::Interrupted
        } else {
            self.observer.on_walk_progress(1.0);
            SearchState::Completed
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// A sibling directory under `parent` whose normalized name equals the
/// entry's, still inside one of `roots`.
async fn find_relocated(parent: &Path, entry: &CacheEntry, roots: &[PathBuf]) -> Option<PathBuf> {
    let wanted = normalize(&entry.folder_name);
    let mut children = match tokio::fs::read_dir(parent).await {
        Ok(children) => children,
        Err(err) => {
            debug!(parent = %parent.display(), error = %err, "cannot read recorded parent");
            return None;
        }
    };

    let old = Path::new(&entry.path);
    loop {
        let child = match children.next_entry().await {
            Ok(Some(child)) => child,
            Ok(None) => return None,
            Err(err) => {
                debug!(parent = %parent.display(), error = %err, "cannot list recorded parent");
                return None;
            }
        };
        let path = child.path();
        if path == old || normalize(&child.file_name().to_string_lossy()) != wanted {
            continue;
        }
        if !roots.iter().any(|root| is_under(&path, root)) {
            continue;
        }
        if is_dir(&path).await {
            return Some(path);
        }
    }
}
