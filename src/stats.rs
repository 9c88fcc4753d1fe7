//! Path cache statistics and history.
//!
//! `rfind cache stats` gives a quick summary of what the cache knows: live
//! and deleted folder records, the size of the change log and its breakdown
//! by change type. `rfind cache history <PATH>` prints the change log of one
//! folder.

use anyhow::Result;

use reference_finder_core::cache::PathCache;

use crate::config::Config;
use crate::db;
use crate::sqlite_cache::SqlitePathCache;

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let cache = SqlitePathCache::new(pool.clone());
    let stats = cache.stats().await?;

    let last_change: Option<i64> = sqlx::query_scalar("SELECT MAX(changed_at) FROM folder_changes")
        .fetch_one(&pool)
        .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("rfind path cache");
    println!("================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Folders:     {}", stats.live_entries);
    println!("  Deleted:     {}", stats.deleted_entries);
    println!("  Changes:     {}", stats.changes);
    println!(
        "  Last change: {}",
        last_change
            .map(format_ts_relative)
            .unwrap_or_else(|| "never".to_string())
    );

    if !stats.changes_by_kind.is_empty() {
        println!();
        println!("  By change type:");
        println!("  {:<12} {:>8}", "TYPE", "COUNT");
        println!("  {}", "-".repeat(21));
        for (kind, count) in &stats.changes_by_kind {
            println!("  {:<12} {:>8}", kind, count);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Print the change log for the folder recorded at `path`.
pub async fn run_history(config: &Config, path: &str) -> Result<()> {
    let pool = db::connect(config).await?;
    let cache = SqlitePathCache::new(pool.clone());

    let Some(entry) = cache.get(path).await? else {
        anyhow::bail!("No cache entry for path: {}", path);
    };
    let log = cache.change_log(path).await?;

    println!("{}", entry.path);
    println!(
        "  status: {}   items: {}   updated: {}",
        if entry.is_deleted { "deleted" } else { "live" },
        entry.total_items,
        format_ts_relative(entry.last_updated)
    );
    println!();
    println!("  {:<17} {:<9} {}", "WHEN", "CHANGE", "PATHS");
    println!("  {}", "-".repeat(60));
    for change in &log {
        let paths = match (&change.old_path, &change.new_path) {
            (Some(old), Some(new)) => format!("{} -> {}", old, new),
            (Some(old), None) => old.clone(),
            (None, Some(new)) => new.clone(),
            (None, None) => String::new(),
        };
        println!(
            "  {:<17} {:<9} {}",
            format_ts_iso(change.changed_at),
            change.change.as_str(),
            paths
        );
    }

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
pub fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_are_humanized() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn relative_timestamps() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 3 * 3600), "3 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }
}
