//! Path cache abstraction.
//!
//! The [`PathCache`] trait is the persistent memory of where folders were
//! last seen. The search engine receives it as an injected capability, so
//! the SQLite-backed implementation in the `reference-finder` crate and the
//! [`memory::InMemoryPathCache`] used in tests are interchangeable.
//!
//! A cache entry is a *candidate*: callers must verify the path on disk
//! before trusting it.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`lookup`](PathCache::lookup) | Live entries whose name contains every significant term, under the given roots |
//! | [`get`](PathCache::get) | One entry by exact path, deleted or not |
//! | [`upsert`](PathCache::upsert) | Insert, update or restore an entry, logging the change |
//! | [`soft_delete`](PathCache::soft_delete) | Mark an entry deleted without removing it |
//! | [`relocate`](PathCache::relocate) | Move an entry to a new path (stale-entry repair) |
//! | [`entries_under`](PathCache::entries_under) | Live entries beneath a root (reconciliation) |
//! | [`change_log`](PathCache::change_log) | Audit trail for one path |
//! | [`stats`](PathCache::stats) | Aggregate counters |

pub mod memory;

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CacheEntry, CacheStats, ChangeKind, ChangeLogEntry};
use crate::paths::{folded_key, key_is_under};
use crate::text::significant_terms;

#[async_trait]
pub trait PathCache: Send + Sync {
    /// Up to `limit` live entries whose normalized folder name contains every
    /// significant term of `term`, restricted to paths under one of
    /// `candidate_roots`. A term with no significant words yields nothing.
    async fn lookup(
        &self,
        term: &str,
        candidate_roots: &[PathBuf],
        limit: usize,
    ) -> Result<Vec<CacheEntry>>;

    async fn get(&self, path: &str) -> Result<Option<CacheEntry>>;

    /// Insert or update the record for `entry.path`.
    ///
    /// Returns the change that was logged, or `None` when the stored record
    /// already had the same name, hash, parent and item count.
    async fn upsert(&self, entry: &CacheEntry) -> Result<Option<ChangeKind>>;

    /// Returns `false` if there was no live entry at `path`.
    async fn soft_delete(&self, path: &str) -> Result<bool>;

    /// Point the record stored at `old_path` to `entry.path`, logging a
    /// `MOVED` change. Returns `false` if `old_path` is unknown.
    async fn relocate(&self, old_path: &str, entry: &CacheEntry) -> Result<bool>;

    async fn entries_under(&self, root: &Path) -> Result<Vec<CacheEntry>>;

    /// Change-log rows for the entry currently stored at `path`, oldest first.
    async fn change_log(&self, path: &str) -> Result<Vec<ChangeLogEntry>>;

    async fn stats(&self) -> Result<CacheStats>;
}

/// Lookup terms for a cache query.
pub fn lookup_terms(term: &str) -> Vec<String> {
    significant_terms(term)
}

/// Case-folded keys for a set of candidate roots.
pub fn root_keys(roots: &[PathBuf]) -> Vec<String> {
    roots.iter().map(|r| folded_key(r)).collect()
}

/// Whether a stored path lies under any of the precomputed root keys.
pub fn under_any(path: &str, root_keys: &[String]) -> bool {
    let key = folded_key(Path::new(path));
    root_keys.iter().any(|root| key_is_under(&key, root))
}

/// Decide which change an upsert represents against the stored record.
pub fn classify_upsert(existing: Option<&CacheEntry>, incoming: &CacheEntry) -> Option<ChangeKind> {
    match existing {
        None => Some(ChangeKind::Created),
        Some(old) if old.is_deleted => Some(ChangeKind::Restored),
        Some(old)
            if old.folder_name != incoming.folder_name
                || old.content_hash != incoming.content_hash
                || old.parent_path != incoming.parent_path
                || old.total_items != incoming.total_items =>
        {
            Some(ChangeKind::Updated)
        }
        Some(_) => None,
    }
}

/// Current time as Unix seconds.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}
