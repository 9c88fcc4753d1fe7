//! Cache refresh and reconciliation.
//!
//! `rfind cache refresh` walks the given roots and records every directory
//! whose name carries a reference code. Each record stores the normalized
//! folder name, the parent path, the number of direct children and a
//! SHA-256 over the sorted child names, so a later refresh can tell whether
//! the folder changed.
//!
//! After a complete walk, live cache entries under the refreshed roots whose
//! folder no longer exists are soft-deleted. An interrupted refresh skips
//! that step because it has not seen the whole tree.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use reference_finder_core::cache::{now_ts, PathCache};
use reference_finder_core::models::{CacheEntry, ChangeKind};
use reference_finder_core::paths::optimize_roots;
use reference_finder_core::reference::extract_reference;

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::db;
use crate::sqlite_cache::SqlitePathCache;
use crate::walker::WalkOptions;

/// One directory found by the scan.
#[derive(Debug, Clone)]
struct ScannedFolder {
    path: PathBuf,
    content_hash: String,
    total_items: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub directories_scanned: usize,
    pub folders_found: usize,
    pub created: usize,
    pub updated: usize,
    pub restored: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub io_errors: usize,
    pub interrupted: bool,
}

/// Refresh the cache for `roots`. Nested roots are collapsed first.
pub async fn refresh_roots(
    cache: &dyn PathCache,
    roots: &[PathBuf],
    options: &WalkOptions,
    cancel: &CancelToken,
) -> Result<RefreshReport> {
    let roots = optimize_roots(roots.iter().cloned());
    let mut report = RefreshReport::default();

    for root in &roots {
        let scan_root = root.clone();
        let scan_options = options.clone();
        let scan_cancel = cancel.clone();
        let scan = tokio::task::spawn_blocking(move || {
            scan_tree(&scan_root, &scan_options, &scan_cancel)
        })
        .await
        .context("refresh scan panicked")?;

        report.directories_scanned += scan.directories;
        report.io_errors += scan.io_errors;
        report.folders_found += scan.folders.len();

        let now = now_ts();
        for folder in &scan.folders {
            let entry = CacheEntry::for_folder(
                &folder.path,
                Some(folder.content_hash.clone()),
                folder.total_items,
                now,
            );
            match cache.upsert(&entry).await? {
                Some(ChangeKind::Created) => report.created += 1,
                Some(ChangeKind::Restored) => report.restored += 1,
                Some(_) => report.updated += 1,
                None => report.unchanged += 1,
            }
        }

        if scan.interrupted || cancel.is_cancelled() {
            report.interrupted = true;
            break;
        }

        for entry in cache.entries_under(root).await? {
            if tokio::fs::metadata(&entry.path).await.is_ok() {
                continue;
            }
            if cache.soft_delete(&entry.path).await? {
                debug!(path = %entry.path, "folder gone");
                report.deleted += 1;
            }
        }
        info!(root = %root.display(), "root refreshed");
    }

    Ok(report)
}

struct Scan {
    folders: Vec<ScannedFolder>,
    directories: usize,
    io_errors: usize,
    interrupted: bool,
}

fn scan_tree(root: &Path, options: &WalkOptions, cancel: &CancelToken) -> Scan {
    let mut scan = Scan {
        folders: Vec::new(),
        directories: 0,
        io_errors: 0,
        interrupted: false,
    };

    let walker = walkdir::WalkDir::new(root)
        .min_depth(1)
        .follow_links(options.follow_symlinks)
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir() && options.skips_dir(&e.file_name().to_string_lossy()))
        });

    for entry in walker {
        if cancel.is_cancelled() {
            scan.interrupted = true;
            break;
        }
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry");
                scan.io_errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        scan.directories += 1;
        if extract_reference(&entry.file_name().to_string_lossy()).is_none() {
            continue;
        }
        match snapshot(entry.path()) {
            Ok((content_hash, total_items)) => scan.folders.push(ScannedFolder {
                path: entry.into_path(),
                content_hash,
                total_items,
            }),
            Err(err) => {
                warn!(path = %entry.path().display(), error = %err, "cannot list folder");
                scan.io_errors += 1;
            }
        }
    }

    scan
}

/// SHA-256 over the sorted names of a directory's children, and their count.
fn snapshot(dir: &Path) -> std::io::Result<(String, i64)> {
    let mut names = Vec::new();
    for child in std::fs::read_dir(dir)? {
        names.push(child?.file_name().to_string_lossy().into_owned());
    }
    names.sort();

    let mut hasher = Sha256::new();
    for name in &names {
        hasher.update(name.as_bytes());
        hasher.update(b"\n");
    }
    Ok((format!("{:x}", hasher.finalize()), names.len() as i64))
}

/// `rfind cache refresh [ROOT...]`
pub async fn run_refresh(config: &Config, roots: &[String]) -> Result<()> {
    let roots = config.resolve_roots(roots);
    if roots.is_empty() {
        anyhow::bail!("No roots given and none configured under [roots]");
    }

    let pool = db::connect(config).await?;
    let cache = SqlitePathCache::new(pool.clone());
    let options = WalkOptions::from_config(config)?;

    let cancel = CancelToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let report = refresh_roots(&cache, &roots, &options, &cancel).await?;

    println!("cache refresh");
    for root in &roots {
        println!("  root: {}", root.display());
    }
    println!("  directories scanned: {}", report.directories_scanned);
    println!("  reference folders: {}", report.folders_found);
    println!("  created: {}", report.created);
    println!("  updated: {}", report.updated);
    println!("  restored: {}", report.restored);
    println!("  unchanged: {}", report.unchanged);
    println!("  deleted: {}", report.deleted);
    if report.io_errors > 0 {
        println!("  unreadable entries: {}", report.io_errors);
    }
    if report.interrupted {
        println!("interrupted");
    } else {
        println!("ok");
    }

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reference_finder_core::cache::memory::InMemoryPathCache;
    use std::fs;
    use tempfile::TempDir;

    fn tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let r = tmp.path();
        fs::create_dir_all(r.join("Sala/BLZ 6472 Mesa")).unwrap();
        fs::write(r.join("Sala/BLZ 6472 Mesa/a.jpg"), b"x").unwrap();
        fs::create_dir_all(r.join("Cocina/CDB-9493")).unwrap();
        fs::create_dir_all(r.join("@Recycle/ABC 123")).unwrap();
        tmp
    }

    #[tokio::test]
    async fn records_reference_folders_only() {
        let tmp = tree();
        let cache = InMemoryPathCache::new();
        let report = refresh_roots(
            &cache,
            &[tmp.path().to_path_buf()],
            &WalkOptions::default(),
            &CancelToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.folders_found, 2);
        assert_eq!(report.created, 2);
        assert!(!report.interrupted);

        let entry = cache
            .get(&tmp.path().join("Sala/BLZ 6472 Mesa").to_string_lossy())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.folder_name, "blz 6472 mesa");
        assert_eq!(entry.total_items, 1);
        assert!(entry.content_hash.is_some());
        assert_eq!(
            entry.parent_path.as_deref(),
            Some(tmp.path().join("Sala").to_string_lossy().as_ref())
        );
    }

    #[tokio::test]
    async fn second_refresh_is_unchanged_then_detects_changes() {
        let tmp = tree();
        let cache = InMemoryPathCache::new();
        let roots = [tmp.path().to_path_buf()];
        let opts = WalkOptions::default();
        let cancel = CancelToken::new();

        refresh_roots(&cache, &roots, &opts, &cancel).await.unwrap();
        let again = refresh_roots(&cache, &roots, &opts, &cancel).await.unwrap();
        assert_eq!(again.unchanged, 2);
        assert_eq!(again.created + again.updated, 0);

        fs::write(tmp.path().join("Sala/BLZ 6472 Mesa/b.jpg"), b"x").unwrap();
        fs::remove_dir_all(tmp.path().join("Cocina/CDB-9493")).unwrap();
        let third = refresh_roots(&cache, &roots, &opts, &cancel).await.unwrap();
        assert_eq!(third.updated, 1);
        assert_eq!(third.deleted, 1);

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.live_entries, 1);
        assert_eq!(stats.deleted_entries, 1);
    }

    #[tokio::test]
    async fn cancelled_refresh_keeps_existing_entries() {
        let tmp = tree();
        let cache = InMemoryPathCache::new();
        let ghost = CacheEntry::for_folder(&tmp.path().join("Gone/XYZ 999"), None, 0, 1);
        cache.upsert(&ghost).await.unwrap();

        let cancel = CancelToken::new();
        cancel.cancel();
        let report = refresh_roots(&cache, &[tmp.path().to_path_buf()], &WalkOptions::default(), &cancel)
            .await
            .unwrap();
        assert!(report.interrupted);
        assert_eq!(report.deleted, 0);
        assert!(!cache.get(&ghost.path).await.unwrap().unwrap().is_deleted);
    }

    #[test]
    fn snapshot_hash_ignores_listing_order() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        for name in ["x", "y", "z"] {
            fs::write(a.path().join(name), b"").unwrap();
        }
        for name in ["z", "x", "y"] {
            fs::write(b.path().join(name), b"").unwrap();
        }
        assert_eq!(snapshot(a.path()).unwrap(), snapshot(b.path()).unwrap());
        assert_eq!(snapshot(a.path()).unwrap().1, 3);
    }
}
