//! SQLite-backed [`PathCache`] implementation.
//!
//! Maps each [`PathCache`] operation onto the `folder_references` and
//! `folder_changes` tables created by [`migrate`](crate::migrate). Every
//! mutation and its change-log row are written in one transaction.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use reference_finder_core::cache::{classify_upsert, lookup_terms, now_ts, root_keys, under_any, PathCache};
use reference_finder_core::models::{CacheEntry, CacheStats, ChangeKind, ChangeLogEntry};
use reference_finder_core::paths::is_under;

const ENTRY_COLUMNS: &str =
    "id, folder_name, path, hash, created_at, last_updated, is_deleted, parent_path, total_items";

/// Rows fetched per round trip while collecting in-scope lookup results.
const LOOKUP_PAGE: usize = 256;

/// SQLite implementation of the [`PathCache`] trait.
pub struct SqlitePathCache {
    pool: SqlitePool,
}

impl SqlitePathCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_entry(row: &SqliteRow) -> CacheEntry {
    CacheEntry {
        id: row.get("id"),
        folder_name: row.get("folder_name"),
        path: row.get("path"),
        content_hash: row.get("hash"),
        created_at: row.get("created_at"),
        last_updated: row.get("last_updated"),
        is_deleted: row.get::<i64, _>("is_deleted") != 0,
        parent_path: row.get("parent_path"),
        total_items: row.get("total_items"),
    }
}

async fn fetch_by_path(conn: &mut SqliteConnection, path: &str) -> Result<Option<CacheEntry>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM folder_references WHERE path = ?",
        ENTRY_COLUMNS
    ))
    .bind(path)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row.as_ref().map(row_to_entry))
}

/// Append a change-log row. `changed_at` never goes backwards even if the
/// wall clock does.
async fn log_change(
    conn: &mut SqliteConnection,
    folder_id: i64,
    change: ChangeKind,
    old_path: Option<&str>,
    new_path: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO folder_changes (folder_id, change_type, old_path, new_path, changed_at)
        SELECT ?, ?, ?, ?, MAX(?, COALESCE(MAX(changed_at), 0)) FROM folder_changes
        "#,
    )
    .bind(folder_id)
    .bind(change.as_str())
    .bind(old_path)
    .bind(new_path)
    .bind(now_ts())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn mark_deleted(conn: &mut SqliteConnection, entry: &CacheEntry) -> Result<()> {
    sqlx::query("UPDATE folder_references SET is_deleted = 1, last_updated = ? WHERE id = ?")
        .bind(now_ts())
        .bind(entry.id)
        .execute(&mut *conn)
        .await?;
    log_change(conn, entry.id, ChangeKind::Deleted, Some(&entry.path), None).await
}

#[async_trait]
impl PathCache for SqlitePathCache {
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

        let like_clauses = vec!["folder_name LIKE ?"; terms.len()].join(" AND ");
        let sql = format!(
            "SELECT {} FROM folder_references WHERE {} AND is_deleted = 0 ORDER BY id LIMIT ? OFFSET ?",
            ENTRY_COLUMNS, like_clauses
        );

        // Root filtering needs path normalization, so rows are paged in and
        // filtered until `limit` in-scope entries are collected.
        let keys = root_keys(candidate_roots);
        let page = limit.max(LOOKUP_PAGE) as i64;
        let mut offset: i64 = 0;
        let mut found = Vec::new();
        while found.len() < limit {
            let mut query = sqlx::query(&sql);
            for t in &terms {
                query = query.bind(format!("%{}%", t));
            }
            let rows = query.bind(page).bind(offset).fetch_all(&self.pool).await?;
            let fetched = rows.len() as i64;
            found.extend(
                rows.iter()
                    .map(row_to_entry)
                    .filter(|e| under_any(&e.path, &keys))
                    .take(limit - found.len()),
            );
            if fetched < page {
                break;
            }
            offset += fetched;
        }
        Ok(found)
    }

    async fn get(&self, path: &str) -> Result<Option<CacheEntry>> {
        let mut conn = self.pool.acquire().await?;
        fetch_by_path(&mut conn, path).await
    }

    async fn upsert(&self, entry: &CacheEntry) -> Result<Option<ChangeKind>> {
        let mut tx = self.pool.begin().await?;
        let existing = fetch_by_path(&mut tx, &entry.path).await?;
        let change = classify_upsert(existing.as_ref(), entry);

        match (&existing, change) {
            (None, _) => {
                let id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO folder_references
                        (folder_name, path, hash, created_at, last_updated, is_deleted, parent_path, total_items)
                    VALUES (?, ?, ?, ?, ?, 0, ?, ?)
                    RETURNING id
                    "#,
                )
                .bind(&entry.folder_name)
                .bind(&entry.path)
                .bind(&entry.content_hash)
                .bind(entry.created_at)
                .bind(entry.last_updated)
                .bind(&entry.parent_path)
                .bind(entry.total_items)
                .fetch_one(&mut *tx)
                .await?;
                log_change(&mut tx, id, ChangeKind::Created, None, Some(&entry.path)).await?;
            }
            (Some(old), Some(kind)) => {
                sqlx::query(
                    r#"
                    UPDATE folder_references
                    SET folder_name = ?, hash = ?, last_updated = ?, is_deleted = 0,
                        parent_path = ?, total_items = ?
                    WHERE id = ?
                    "#,
                )
                .bind(&entry.folder_name)
                .bind(&entry.content_hash)
                .bind(entry.last_updated)
                .bind(&entry.parent_path)
                .bind(entry.total_items)
                .bind(old.id)
                .execute(&mut *tx)
                .await?;
                log_change(&mut tx, old.id, kind, None, Some(&entry.path)).await?;
            }
            (Some(_), None) => {}
        }

        tx.commit().await?;
        Ok(change)
    }

    async fn soft_delete(&self, path: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let deleted = match fetch_by_path(&mut tx, path).await? {
            Some(entry) if !entry.is_deleted => {
                mark_deleted(&mut tx, &entry).await?;
                true
            }
            _ => false,
        };
        tx.commit().await?;
        Ok(deleted)
    }

    async fn relocate(&self, old_path: &str, entry: &CacheEntry) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let Some(old) = fetch_by_path(&mut tx, old_path).await? else {
            return Ok(false);
        };

        match fetch_by_path(&mut tx, &entry.path).await? {
            Some(target) if target.id != old.id => {
                if !old.is_deleted {
                    mark_deleted(&mut tx, &old).await?;
                }
                if target.is_deleted {
                    sqlx::query("UPDATE folder_references SET is_deleted = 0, last_updated = ? WHERE id = ?")
                        .bind(now_ts())
                        .bind(target.id)
                        .execute(&mut *tx)
                        .await?;
                    log_change(&mut tx, target.id, ChangeKind::Restored, None, Some(&entry.path))
                        .await?;
                }
            }
            _ => {
                sqlx::query(
                    r#"
                    UPDATE folder_references
                    SET path = ?, folder_name = ?, parent_path = ?, last_updated = ?, is_deleted = 0
                    WHERE id = ?
                    "#,
                )
                .bind(&entry.path)
                .bind(&entry.folder_name)
                .bind(&entry.parent_path)
                .bind(entry.last_updated)
                .bind(old.id)
                .execute(&mut *tx)
                .await?;
                log_change(&mut tx, old.id, ChangeKind::Moved, Some(old_path), Some(&entry.path))
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn entries_under(&self, root: &Path) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM folder_references WHERE is_deleted = 0 ORDER BY id",
            ENTRY_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(row_to_entry)
            .filter(|e| is_under(Path::new(&e.path), root))
            .collect())
    }

    async fn change_log(&self, path: &str) -> Result<Vec<ChangeLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT c.folder_id, c.change_type, c.old_path, c.new_path, c.changed_at
            FROM folder_changes c
            JOIN folder_references f ON f.id = c.folder_id
            WHERE f.path = ?
            ORDER BY c.changed_at ASC, c.id ASC
            "#,
        )
        .bind(path)
        .fetch_all(&self.pool)
        .await?;

        let mut log = Vec::with_capacity(rows.len());
        for row in &rows {
            let change: String = row.get("change_type");
            log.push(ChangeLogEntry {
                folder_id: row.get("folder_id"),
                change: change.parse().map_err(anyhow::Error::msg)?,
                old_path: row.get("old_path"),
                new_path: row.get("new_path"),
                changed_at: row.get("changed_at"),
            });
        }
        Ok(log)
    }

    async fn stats(&self) -> Result<CacheStats> {
        let live_entries: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM folder_references WHERE is_deleted = 0")
                .fetch_one(&self.pool)
                .await?;
        let deleted_entries: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM folder_references WHERE is_deleted = 1")
                .fetch_one(&self.pool)
                .await?;
        let changes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM folder_changes")
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query(
            "SELECT change_type, COUNT(*) AS n FROM folder_changes GROUP BY change_type ORDER BY change_type",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(CacheStats {
            live_entries,
            deleted_entries,
            changes,
            changes_by_kind: rows
                .iter()
                .map(|r| (r.get("change_type"), r.get("n")))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn cache() -> SqlitePathCache {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        SqlitePathCache::new(pool)
    }

    fn entry(path: &str) -> CacheEntry {
        CacheEntry::for_folder(Path::new(path), Some("h".into()), 2, 100)
    }

    #[tokio::test]
    async fn upsert_then_lookup() {
        let c = cache().await;
        assert_eq!(
            c.upsert(&entry("/nas/cat/BLZ 6472 Mesa")).await.unwrap(),
            Some(ChangeKind::Created)
        );
        c.upsert(&entry("/nas/cat/BLZ 6473 Silla")).await.unwrap();
        c.upsert(&entry("/other/BLZ 6472")).await.unwrap();

        let hits = c
            .lookup("BLZ 6472", &[PathBuf::from("/NAS/cat")], 50)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].folder_name, "blz 6472 mesa");
        assert_eq!(hits[0].parent_path.as_deref(), Some("/nas/cat"));
    }

    #[tokio::test]
    async fn lookup_cap_applies_after_root_filter() {
        let c = cache().await;
        for i in 0..5 {
            c.upsert(&entry(&format!("/elsewhere/mesa {}", i))).await.unwrap();
        }
        c.upsert(&entry("/r/mesa 9")).await.unwrap();
        let hits = c.lookup("mesa", &[PathBuf::from("/r")], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/r/mesa 9");
    }

    #[tokio::test]
    async fn lookup_pages_past_out_of_scope_rows() {
        let c = cache().await;
        for i in 0..LOOKUP_PAGE + 40 {
            c.upsert(&entry(&format!("/elsewhere/mesa {}", i))).await.unwrap();
        }
        c.upsert(&entry("/r/mesa a")).await.unwrap();
        c.upsert(&entry("/r/mesa b")).await.unwrap();
        c.upsert(&entry("/r/mesa c")).await.unwrap();

        let hits = c.lookup("mesa", &[PathBuf::from("/r")], 2).await.unwrap();
        let paths: Vec<&str> = hits.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/r/mesa a", "/r/mesa b"]);
    }

    #[tokio::test]
    async fn upsert_is_change_aware() {
        let c = cache().await;
        let e = entry("/r/ABC 123");
        c.upsert(&e).await.unwrap();
        assert_eq!(c.upsert(&e).await.unwrap(), None);
        let mut changed = e.clone();
        changed.content_hash = Some("other".into());
        assert_eq!(c.upsert(&changed).await.unwrap(), Some(ChangeKind::Updated));
        assert!(c.soft_delete(&e.path).await.unwrap());
        assert_eq!(c.upsert(&changed).await.unwrap(), Some(ChangeKind::Restored));

        let kinds: Vec<_> = c
            .change_log(&e.path)
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.change)
            .collect();
        assert_eq!(
            kinds,
            vec![
                ChangeKind::Created,
                ChangeKind::Updated,
                ChangeKind::Deleted,
                ChangeKind::Restored
            ]
        );
    }

    #[tokio::test]
    async fn soft_delete_hides_entry() {
        let c = cache().await;
        c.upsert(&entry("/r/ABC 123")).await.unwrap();
        assert!(c.soft_delete("/r/ABC 123").await.unwrap());
        assert!(!c.soft_delete("/r/ABC 123").await.unwrap());
        assert!(!c.soft_delete("/r/missing").await.unwrap());
        assert!(c
            .lookup("ABC 123", &[PathBuf::from("/r")], 10)
            .await
            .unwrap()
            .is_empty());
        assert!(c.get("/r/ABC 123").await.unwrap().unwrap().is_deleted);
    }

    #[tokio::test]
    async fn relocate_keeps_id_and_logs_move() {
        let c = cache().await;
        c.upsert(&entry("/r/old/ABC 123")).await.unwrap();
        let before = c.get("/r/old/ABC 123").await.unwrap().unwrap();

        assert!(c
            .relocate("/r/old/ABC 123", &entry("/r/new/ABC 123"))
            .await
            .unwrap());
        let after = c.get("/r/new/ABC 123").await.unwrap().unwrap();
        assert_eq!(before.id, after.id);
        assert!(c.get("/r/old/ABC 123").await.unwrap().is_none());

        let log = c.change_log("/r/new/ABC 123").await.unwrap();
        let last = log.last().unwrap();
        assert_eq!(last.change, ChangeKind::Moved);
        assert_eq!(last.old_path.as_deref(), Some("/r/old/ABC 123"));
        assert!(log.windows(2).all(|w| w[0].changed_at <= w[1].changed_at));
    }

    #[tokio::test]
    async fn entries_under_and_stats() {
        let c = cache().await;
        c.upsert(&entry("/r/a/ABC 123")).await.unwrap();
        c.upsert(&entry("/r/b/ABC 124")).await.unwrap();
        c.upsert(&entry("/s/ABC 125")).await.unwrap();
        c.soft_delete("/r/b/ABC 124").await.unwrap();

        let under = c.entries_under(Path::new("/r")).await.unwrap();
        assert_eq!(under.len(), 1);

        let stats = c.stats().await.unwrap();
        assert_eq!(stats.live_entries, 2);
        assert_eq!(stats.deleted_entries, 1);
        assert_eq!(stats.changes, 4);
        assert_eq!(
            stats.changes_by_kind,
            vec![("CREATED".to_string(), 3), ("DELETED".to_string(), 1)]
        );
    }
}
