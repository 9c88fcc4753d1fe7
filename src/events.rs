//! Streaming contract between the search engine and its consumers.
//!
//! A running search reports through a [`SearchObserver`]. Every method has a
//! no-op default, so a consumer implements only what it needs. Callbacks
//! arrive on engine and walker threads and must not block for long.
//!
//! Consumers that prefer a queue can use [`ChannelObserver`], which forwards
//! each callback as a [`SearchEvent`] into a tokio unbounded channel.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::mpsc;

use reference_finder_core::SearchResult;

/// Engine lifecycle. `Completed` and `Interrupted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPhase {
    Idle,
    CacheLookup,
    Walk,
    Completed,
    Interrupted,
}

/// How a search ended. Interruption is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchState {
    Completed,
    Interrupted,
}

/// Results for one query, in emission order.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResults {
    pub index: usize,
    pub query: String,
    pub results: Vec<SearchResult>,
}

/// Counters collected during one search.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchSummary {
    pub results: usize,
    /// Verified cache hits emitted during the lookup phase.
    pub cache_hits: usize,
    /// Stale cache entries whose new location was found and recorded.
    pub cache_repairs: usize,
    /// Stale cache entries that could not be repaired and were soft-deleted.
    pub stale_entries: usize,
    pub cache_errors: usize,
    pub directories_total: usize,
    pub directories_walked: usize,
    /// Directory enumeration failures absorbed by the walker.
    pub io_errors: usize,
    /// The walk could not run to the end (pool creation failed or a walker
    /// thread panicked). Results found before the failure are kept.
    pub walk_failed: bool,
    pub elapsed_ms: u64,
}

/// Final report handed to [`SearchObserver::on_completed`] and returned by
/// [`SearchHandle::wait`](crate::engine::SearchHandle::wait).
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub state: SearchState,
    /// One group per query, in the order queries were supplied.
    pub groups: Vec<QueryResults>,
    pub summary: SearchSummary,
}

impl SearchOutcome {
    pub fn total_results(&self) -> usize {
        self.groups.iter().map(|g| g.results.len()).sum()
    }

    /// Queries that produced at least one result.
    pub fn found(&self) -> impl Iterator<Item = &QueryResults> {
        self.groups.iter().filter(|g| !g.results.is_empty())
    }

    /// Queries that produced nothing.
    pub fn not_found(&self) -> impl Iterator<Item = &QueryResults> {
        self.groups.iter().filter(|g| g.results.is_empty())
    }
}

pub trait SearchObserver: Send + Sync {
    fn on_phase(&self, _phase: SearchPhase) {}

    /// A new, deduplicated result.
    fn on_result(&self, _result: &SearchResult) {}

    /// Fraction of query terms processed against the cache, in `[0, 1]`.
    fn on_db_progress(&self, _fraction: f64) {}

    /// Fraction of first-level subdirectories walked, in `[0, 1]`.
    /// Successive values are non-decreasing.
    fn on_walk_progress(&self, _fraction: f64) {}

    fn on_directory_processed(&self, _completed: usize, _total: usize, _path: &Path) {}

    fn on_completed(&self, _outcome: &SearchOutcome) {}
}

/// Observer that ignores everything.
pub struct NoopObserver;

impl SearchObserver for NoopObserver {}

/// Owned form of every observer callback.
#[derive(Debug, Clone)]
pub enum SearchEvent {
    Phase(SearchPhase),
    Result(SearchResult),
    DbProgress(f64),
    WalkProgress(f64),
    DirectoryProcessed {
        completed: usize,
        total: usize,
        path: PathBuf,
    },
    Completed(SearchOutcome),
}

/// Forwards callbacks into an unbounded channel. Sends to a dropped
/// receiver are ignored.
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SearchEvent>,
}

impl ChannelObserver {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SearchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: SearchEvent) {
        let _ = self.tx.send(event);
    }
}

impl SearchObserver for ChannelObserver {
    fn on_phase(&self, phase: SearchPhase) {
        self.send(SearchEvent::Phase(phase));
    }

    fn on_result(&self, result: &SearchResult) {
        self.send(SearchEvent::Result(result.clone()));
    }

    fn on_db_progress(&self, fraction: f64) {
        self.send(SearchEvent::DbProgress(fraction));
    }

    fn on_walk_progress(&self, fraction: f64) {
        self.send(SearchEvent::WalkProgress(fraction));
    }

    fn on_directory_processed(&self, completed: usize, total: usize, path: &Path) {
        self.send(SearchEvent::DirectoryProcessed {
            completed,
            total,
            path: path.to_path_buf(),
        });
    }

    fn on_completed(&self, outcome: &SearchOutcome) {
        self.send(SearchEvent::Completed(outcome.clone()));
    }
}
