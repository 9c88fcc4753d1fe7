use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the path cache schema on an open pool. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per known folder
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS folder_references (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            folder_name TEXT NOT NULL,
            path TEXT UNIQUE NOT NULL,
            hash TEXT,
            created_at INTEGER NOT NULL,
            last_updated INTEGER NOT NULL,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            parent_path TEXT,
            total_items INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only change log
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS folder_changes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            folder_id INTEGER NOT NULL,
            change_type TEXT NOT NULL,
            old_path TEXT,
            new_path TEXT,
            changed_at INTEGER NOT NULL,
            FOREIGN KEY (folder_id) REFERENCES folder_references(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_folder_path ON folder_references(path)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_folder_hash ON folder_references(hash)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_parent_path ON folder_references(parent_path)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_folder_name ON folder_references(folder_name)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_folder_changes_folder ON folder_changes(folder_id, changed_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
