//! Per-request result accumulator and dedup set.
//!
//! Shared by the cache lookup phase and every walker thread. The first
//! writer of a `(path, query)` pair wins; later offers of the same pair are
//! dropped silently. Paths are compared by [`path_key`], so the same folder
//! reached through non-normalized paths counts once. Case is significant.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use reference_finder_core::paths::path_key;
use reference_finder_core::SearchResult;

use crate::events::{QueryResults, SearchObserver};

struct State {
    seen: HashSet<(String, usize)>,
    groups: Vec<Vec<SearchResult>>,
}

pub struct ResultSink {
    queries: Vec<String>,
    state: Mutex<State>,
    observer: Arc<dyn SearchObserver>,
}

impl ResultSink {
    pub fn new(queries: &[String], observer: Arc<dyn SearchObserver>) -> Self {
        Self {
            queries: queries.to_vec(),
            state: Mutex::new(State {
                seen: HashSet::new(),
                groups: vec![Vec::new(); queries.len()],
            }),
            observer,
        }
    }

    /// Record `result` and stream it to the observer unless the same path
    /// was already recorded for the same query. Returns whether it was new.
    pub fn offer(&self, result: SearchResult) -> bool {
        let key = (path_key(&result.path), result.query_index);
        {
            let mut state = self.state.lock();
            if result.query_index >= state.groups.len() || !state.seen.insert(key) {
                return false;
            }
            state.groups[result.query_index].push(result.clone());
        }
        debug!(path = %result.path.display(), kind = %result.kind, query = result.query_index, "match");
        self.observer.on_result(&result);
        true
    }

    pub fn len(&self) -> usize {
        self.state.lock().seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of everything recorded so far, grouped by query in the
    /// order queries were supplied.
    pub fn grouped(&self) -> Vec<QueryResults> {
        let state = self.state.lock();
        self.queries
            .iter()
            .enumerate()
            .map(|(index, query)| QueryResults {
                index,
                query: query.clone(),
                results: state.groups[index].clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopObserver;
    use reference_finder_core::FileKind;
    use std::path::PathBuf;

    fn result(path: &str, q: usize) -> SearchResult {
        SearchResult {
            path: PathBuf::from(path),
            kind: FileKind::Folder,
            query: format!("q{}", q),
            query_index: q,
        }
    }

    #[test]
    fn first_writer_wins_per_query() {
        let sink = ResultSink::new(&["a".into(), "b".into()], Arc::new(NoopObserver));
        assert!(sink.offer(result("/r/X", 0)));
        assert!(!sink.offer(result("/r/X", 0)));
        assert!(!sink.offer(result("/r/./X/", 0)));
        assert!(sink.offer(result("/r/x", 0)));
        assert!(sink.offer(result("/r/X", 1)));
        assert_eq!(sink.len(), 3);

        let groups = sink.grouped();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].results.len(), 2);
        assert_eq!(groups[1].results.len(), 1);
    }

    #[test]
    fn out_of_range_query_is_rejected() {
        let sink = ResultSink::new(&["a".into()], Arc::new(NoopObserver));
        assert!(!sink.offer(result("/r/X", 3)));
        assert!(sink.is_empty());
    }
}
