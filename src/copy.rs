//! `rfind search --copy-to`: copy search results into one directory.
//!
//! Folder results are copied recursively and file results directly, each
//! into `<dest>/<name>`. A path reported for several queries is copied
//! once. One failed copy does not stop the others; every outcome is
//! collected into a [`CopyReport`].

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use walkdir::WalkDir;

use reference_finder_core::FileKind;

use crate::events::SearchOutcome;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CopyReport {
    pub copied: Vec<PathBuf>,
    pub failed: Vec<CopyFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CopyFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Copy every result in `outcome` into `dest`, creating it if needed.
pub fn copy_results(outcome: &SearchOutcome, dest: &Path) -> Result<CopyReport> {
    fs::create_dir_all(dest)
        .with_context(|| format!("Failed to create copy destination: {}", dest.display()))?;

    let mut seen = HashSet::new();
    let mut report = CopyReport::default();
    for result in outcome.groups.iter().flat_map(|g| g.results.iter()) {
        if !seen.insert(result.path.clone()) {
            continue;
        }
        let copied = if result.kind == FileKind::Folder {
            copy_dir(&result.path, dest)
        } else {
            copy_file(&result.path, dest)
        };
        match copied {
            Ok(target) => {
                info!(from = %result.path.display(), to = %target.display(), "copied");
                report.copied.push(result.path.clone());
            }
            Err(err) => {
                warn!(path = %result.path.display(), error = %err, "copy failed");
                report.failed.push(CopyFailure {
                    path: result.path.clone(),
                    error: format!("{:#}", err),
                });
            }
        }
    }
    Ok(report)
}

fn target_for(src: &Path, dest: &Path) -> Result<PathBuf> {
    let name = match src.file_name() {
        Some(name) => name,
        None => bail!("Path has no file name: {}", src.display()),
    };
    let target = dest.join(name);
    if target.exists() {
        bail!("Destination already exists: {}", target.display());
    }
    Ok(target)
}

fn copy_file(src: &Path, dest: &Path) -> Result<PathBuf> {
    let target = target_for(src, dest)?;
    fs::copy(src, &target)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), target.display()))?;
    Ok(target)
}

fn copy_dir(src: &Path, dest: &Path) -> Result<PathBuf> {
    let target = target_for(src, dest)?;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.with_context(|| format!("Failed to read {}", src.display()))?;
        let rel = entry.path().strip_prefix(src)?;
        let to = target.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&to)
                .with_context(|| format!("Failed to create directory: {}", to.display()))?;
        } else {
            fs::copy(entry.path(), &to).with_context(|| {
                format!("Failed to copy {} to {}", entry.path().display(), to.display())
            })?;
        }
    }
    Ok(target)
}

/// Print which results were copied and which were not.
pub fn print_report(report: &CopyReport, dest: &Path) {
    println!("copied to {}: {}", dest.display(), report.copied.len());
    for path in &report.copied {
        println!("  ok      {}", path.display());
    }
    if !report.failed.is_empty() {
        println!("failed: {}", report.failed.len());
        for failure in &report.failed {
            println!("  failed  {}  ({})", failure.path.display(), failure.error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{QueryResults, SearchState, SearchSummary};
    use reference_finder_core::SearchResult;
    use tempfile::TempDir;

    fn outcome(results: Vec<(PathBuf, FileKind, usize)>) -> SearchOutcome {
        let mut groups = vec![
            QueryResults {
                index: 0,
                query: "BLZ 6472".into(),
                results: Vec::new(),
            },
            QueryResults {
                index: 1,
                query: "blz-6472".into(),
                results: Vec::new(),
            },
        ];
        for (path, kind, q) in results {
            let query = groups[q].query.clone();
            groups[q].results.push(SearchResult {
                path,
                kind,
                query,
                query_index: q,
            });
        }
        SearchOutcome {
            state: SearchState::Completed,
            groups,
            summary: SearchSummary::default(),
        }
    }

    #[test]
    fn copies_folders_recursively_and_files_directly() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let folder = src.path().join("BLZ 6472 Mesa");
        fs::create_dir_all(folder.join("fotos")).unwrap();
        fs::write(folder.join("fotos/frente.jpg"), b"jpg").unwrap();
        let file = src.path().join("blz_6472.pdf");
        fs::write(&file, b"pdf").unwrap();

        let report = copy_results(
            &outcome(vec![
                (folder.clone(), FileKind::Folder, 0),
                (file.clone(), FileKind::Pdf, 0),
                (folder.clone(), FileKind::Folder, 1),
            ]),
            &dest.path().join("out"),
        )
        .unwrap();

        assert_eq!(report.copied, vec![folder, file]);
        assert!(report.failed.is_empty());
        let out = dest.path().join("out");
        assert_eq!(
            fs::read(out.join("BLZ 6472 Mesa/fotos/frente.jpg")).unwrap(),
            b"jpg"
        );
        assert_eq!(fs::read(out.join("blz_6472.pdf")).unwrap(), b"pdf");
    }

    #[test]
    fn failures_are_reported_without_stopping() {
        let src = TempDir::new().unwrap();
        let dest = TempDir::new().unwrap();
        let present = src.path().join("ABC 123.pdf");
        fs::write(&present, b"x").unwrap();
        let missing = src.path().join("ABC 999");
        fs::write(dest.path().join("taken.pdf"), b"old").unwrap();
        let taken = src.path().join("taken.pdf");
        fs::write(&taken, b"new").unwrap();

        let report = copy_results(
            &outcome(vec![
                (missing.clone(), FileKind::Folder, 0),
                (present.clone(), FileKind::Pdf, 0),
                (taken.clone(), FileKind::Pdf, 0),
            ]),
            dest.path(),
        )
        .unwrap();

        assert_eq!(report.copied, vec![present]);
        let failed: Vec<&PathBuf> = report.failed.iter().map(|f| &f.path).collect();
        assert_eq!(failed, vec![&missing, &taken]);
        assert!(report.failed[1].error.contains("already exists"));
        assert_eq!(fs::read(dest.path().join("taken.pdf")).unwrap(), b"old");
    }
}
