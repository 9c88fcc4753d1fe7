//! In-memory [`PathCache`] implementation for tests and embedding.
//!
//! Entries and the change log live in `Vec`s behind a single
//! `std::sync::RwLock`. Ids are assigned sequentially from 1, so iteration
//! order matches insertion order like the SQLite backend's rowid order.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::Result;
use async_trait::async_trait;

use super::{classify_upsert, lookup_terms, now_ts, root_keys, under_any, PathCache};
use crate::models::{CacheEntry, CacheStats, ChangeKind, ChangeLogEntry};
use crate::paths::is_under;

#[derive(Default)]
struct Inner {
    entries: Vec<CacheEntry>,
    by_path: HashMap<String, usize>,
    changes: Vec<ChangeLogEntry>,
}

impl Inner {
    fn log(&mut self, folder_id: i64, change: ChangeKind, old_path: Option<&str>, new_path: Option<&str>) {
        let last = self.changes.last().map(|c| c.changed_at).unwrap_or(i64::MIN);
        self.changes.push(ChangeLogEntry {
            folder_id,
            change,
            old_path: old_path.map(str::to_string),
            new_path: new_path.map(str::to_string),
            changed_at: now_ts().max(last),
        });
    }
}

/// In-memory path cache.
#[derive(Default)]
pub struct InMemoryPathCache {
    inner: RwLock<Inner>,
}

impl InMemoryPathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a cache pre-populated with `entries` (each logged as `CREATED`).
    pub fn with_entries<I: IntoIterator<Item = CacheEntry>>(entries: I) -> Self {
        let cache = Self::new();
        {
            let mut inner = cache.write();
            for entry in entries {
                insert(&mut inner, entry);
            }
        }
        cache
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn insert(inner: &mut Inner, mut entry: CacheEntry) -> i64 {
    let id = inner.entries.len() as i64 + 1;
    entry.id = id;
    let path = entry.path.clone();
    inner.by_path.insert(path.clone(), inner.entries.len());
    inner.entries.push(entry);
    inner.log(id, ChangeKind::Created, None, Some(&path));
    id
}

#[async_trait]
impl PathCache for InMemoryPathCache {
    async fn lookup(
        &self,
        term: &str,
        candidate_roots: &[PathBuf],
        limit: usize,
    ) -> Result<Vec<CacheEntry>> {
        let terms = lookup_terms(term);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        let keys = root_keys(candidate_roots);
        let inner = self.read();
        Ok(inner
            .entries
            .iter()
            .filter(|e| !e.is_deleted)
            .filter(|e| terms.iter().all(|t| e.folder_name.contains(t.as_str())))
            .filter(|e| under_any(&e.path, &keys))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get(&self, path: &str) -> Result<Option<CacheEntry>> {
        let inner = self.read();
        Ok(inner.by_path.get(path).map(|&i| inner.entries[i].clone()))
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<Option<ChangeKind>> {
        let mut inner = self.write();
        let slot = inner.by_path.get(&entry.path).copied();
        let change = classify_upsert(slot.map(|i| &inner.entries[i]), entry);

        match (slot, change) {
            (None, _) => {
                insert(&mut inner, entry.clone());
            }
            (Some(i), Some(kind)) => {
                let stored = &mut inner.entries[i];
                stored.folder_name = entry.folder_name.clone();
                stored.content_hash = entry.content_hash.clone();
                stored.parent_path = entry.parent_path.clone();
                stored.total_items = entry.total_items;
                stored.last_updated = entry.last_updated;
                stored.is_deleted = false;
                let id = stored.id;
                inner.log(id, kind, None, Some(&entry.path));
            }
            (Some(_), None) => {}
        }
        Ok(change)
    }

    async fn soft_delete(&self, path: &str) -> Result<bool> {
        let mut inner = self.write();
        let Some(i) = inner.by_path.get(path).copied() else {
            return Ok(false);
        };
        if inner.entries[i].is_deleted {
            return Ok(false);
        }
        inner.entries[i].is_deleted = true;
        inner.entries[i].last_updated = now_ts();
        let id = inner.entries[i].id;
        inner.log(id, ChangeKind::Deleted, Some(path), None);
        Ok(true)
    }

    async fn relocate(&self, old_path: &str, entry: &CacheEntry) -> Result<bool> {
        let mut inner = self.write();
        let Some(i) = inner.by_path.get(old_path).copied() else {
            return Ok(false);
        };

        // The new path is already known: retire the old record instead of
        // violating path uniqueness.
        if let Some(j) = inner.by_path.get(&entry.path).copied() {
            if i != j {
                if !inner.entries[i].is_deleted {
                    inner.entries[i].is_deleted = true;
                    let id = inner.entries[i].id;
                    inner.log(id, ChangeKind::Deleted, Some(old_path), None);
                }
                let id = inner.entries[j].id;
                if inner.entries[j].is_deleted {
                    inner.entries[j].is_deleted = false;
                    inner.log(id, ChangeKind::Restored, None, Some(&entry.path));
                }
                return Ok(true);
            }
        }

        inner.by_path.remove(old_path);
        inner.by_path.insert(entry.path.clone(), i);
        let stored = &mut inner.entries[i];
        stored.path = entry.path.clone();
        stored.folder_name = entry.folder_name.clone();
        stored.parent_path = entry.parent_path.clone();
        stored.last_updated = entry.last_updated;
        stored.is_deleted = false;
        let id = stored.id;
        inner.log(id, ChangeKind::Moved, Some(old_path), Some(&entry.path));
        Ok(true)
    }

    async fn entries_under(&self, root: &Path) -> Result<Vec<CacheEntry>> {
        let inner = self.read();
        Ok(inner
            .entries
            .iter()
            .filter(|e| !e.is_deleted && is_under(Path::new(&e.path), root))
            .cloned()
            .collect())
    }

    async fn change_log(&self, path: &str) -> Result<Vec<ChangeLogEntry>> {
        let inner = self.read();
        let Some(&i) = inner.by_path.get(path) else {
            return Ok(Vec::new());
        };
        let id = inner.entries[i].id;
        Ok(inner
            .changes
            .iter()
            .filter(|c| c.folder_id == id)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<CacheStats> {
        let inner = self.read();
        let deleted = inner.entries.iter().filter(|e| e.is_deleted).count() as i64;
        let mut by_kind: HashMap<&'static str, i64> = HashMap::new();
        for c in &inner.changes {
            *by_kind.entry(c.change.as_str()).or_default() += 1;
        }
        let mut changes_by_kind: Vec<(String, i64)> = by_kind
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        changes_by_kind.sort();
        Ok(CacheStats {
            live_entries: inner.entries.len() as i64 - deleted,
            deleted_entries: deleted,
            changes: inner.changes.len() as i64,
            changes_by_kind,
        })
    }
}
