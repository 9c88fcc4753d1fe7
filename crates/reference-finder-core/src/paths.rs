//! Root path de-overlap and path keys.
//!
//! Paths are compared through [`path_key`]: a lexical normalization
//! (`.` dropped, `..` folded, separators unified) that keeps case, so
//! `Cat` and `cat` stay distinct directories. [`folded_key`] adds case
//! folding for the cache prefix filter only.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

/// Normalized comparison key for a path.
///
/// ```rust
/// use std::path::Path;
/// use reference_finder_core::paths::path_key;
///
/// assert_eq!(path_key(Path::new("/NAS/Catalog/./renders/../x/")), "/NAS/Catalog/x");
/// ```
pub fn path_key(path: &Path) -> String {
    let mut prefix = String::new();
    let mut rooted = false;
    let mut parts: Vec<String> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix = p.as_os_str().to_string_lossy().into_owned(),
            Component::RootDir => rooted = true,
            Component::CurDir => {}
            Component::ParentDir => {
                if parts.pop().is_none() && !rooted {
                    parts.push("..".to_string());
                }
            }
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
        }
    }

    let mut key = prefix;
    if rooted {
        key.push('/');
    }
    key.push_str(&parts.join("/"));
    key
}

/// [`path_key`] folded to lower case.
pub fn folded_key(path: &Path) -> String {
    path_key(path).to_lowercase()
}

/// Number of named segments below the root.
pub fn depth(path: &Path) -> usize {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
}

/// Whether `path` is `root` or lies beneath it, compared segment-wise so
/// that `/data/ab` is not considered to be under `/data/a`.
pub fn is_under(path: &Path, root: &Path) -> bool {
    key_is_under(&path_key(path), &path_key(root))
}

/// [`is_under`] over precomputed keys.
pub fn key_is_under(path_key: &str, root_key: &str) -> bool {
    if path_key == root_key {
        return true;
    }
    if root_key.ends_with('/') {
        return path_key.starts_with(root_key);
    }
    path_key.len() > root_key.len()
        && path_key.starts_with(root_key)
        && path_key.as_bytes()[root_key.len()] == b'/'
}

/// Collapse overlapping roots so that no subtree is walked twice.
///
/// Duplicates (by [`path_key`]) are merged and every root that lies beneath
/// another requested root is dropped. The surviving roots are returned
/// deepest first, ties broken by key so the order is deterministic.
///
/// ```rust
/// use std::path::PathBuf;
/// use reference_finder_core::paths::optimize_roots;
///
/// let roots = ["/a/b", "/c", "/a"].map(PathBuf::from);
/// let kept = optimize_roots(roots);
/// assert_eq!(kept.len(), 2);
/// assert!(kept.contains(&PathBuf::from("/a")));
/// assert!(kept.contains(&PathBuf::from("/c")));
/// ```
pub fn optimize_roots<I, P>(roots: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: Into<PathBuf>,
{
    let mut unique: BTreeMap<String, PathBuf> = BTreeMap::new();
    for root in roots {
        let root = root.into();
        unique.entry(path_key(&root)).or_insert(root);
    }

    let mut candidates: Vec<(String, PathBuf)> = unique.into_iter().collect();
    candidates.sort_by(|a, b| depth(&a.1).cmp(&depth(&b.1)).then_with(|| a.0.cmp(&b.0)));

    let mut kept: Vec<(String, PathBuf)> = Vec::new();
    for (key, root) in candidates {
        if kept.iter().any(|(k, _)| key_is_under(&key, k)) {
            continue;
        }
        kept.push((key, root));
    }

    kept.sort_by(|a, b| depth(&b.1).cmp(&depth(&a.1)).then_with(|| a.0.cmp(&b.0)));
    kept.into_iter().map(|(_, root)| root).collect()
}
