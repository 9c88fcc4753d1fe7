//! TOML configuration.
//!
//! ```toml
//! [db]
//! path = "./data/rfind.sqlite"
//!
//! [search]
//! max_workers = 12
//! db_result_cap = 50
//! mode = "reference"
//! recycle_markers = ["@Recycle", "$RECYCLE.BIN"]
//!
//! [walk]
//! follow_symlinks = false
//! exclude_globs = ["*.tmp"]
//!
//! [roots]
//! catalog = "/mnt/nas/catalog"
//! ```

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use reference_finder_core::models::{DEFAULT_DB_RESULT_CAP, DEFAULT_MAX_WORKERS};
use reference_finder_core::SearchMode;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub walk: WalkConfig,
    /// Named roots, selectable by name on the command line.
    #[serde(default)]
    pub roots: BTreeMap<String, PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_db_result_cap")]
    pub db_result_cap: usize,
    #[serde(default = "default_mode")]
    pub mode: SearchMode,
    #[serde(default = "default_recycle_markers")]
    pub recycle_markers: Vec<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            db_result_cap: DEFAULT_DB_RESULT_CAP,
            mode: SearchMode::Reference,
            recycle_markers: default_recycle_markers(),
        }
    }
}

fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}
fn default_db_result_cap() -> usize {
    DEFAULT_DB_RESULT_CAP
}
fn default_mode() -> SearchMode {
    SearchMode::Reference
}
fn default_recycle_markers() -> Vec<String> {
    vec!["@Recycle".to_string(), "$RECYCLE.BIN".to_string()]
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct WalkConfig {
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Glob patterns matched against directory names; matching subtrees are
    /// not descended into.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Config {
    /// Resolve a root given either as a name from `[roots]` or as a path.
    pub fn resolve_root(&self, name_or_path: &str) -> PathBuf {
        self.roots
            .get(name_or_path)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(name_or_path))
    }

    /// Resolve every entry, or all configured roots when `names` is empty.
    pub fn resolve_roots(&self, names: &[String]) -> Vec<PathBuf> {
        if names.is_empty() {
            return self.roots.values().cloned().collect();
        }
        names.iter().map(|n| self.resolve_root(n)).collect()
    }
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(
            Glob::new(pattern).with_context(|| format!("Invalid glob pattern: '{}'", pattern))?,
        );
    }
    Ok(builder.build()?)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.search.max_workers == 0 {
        anyhow::bail!("search.max_workers must be >= 1");
    }

    if config.search.db_result_cap == 0 {
        anyhow::bail!("search.db_result_cap must be >= 1");
    }

    if config
        .search
        .recycle_markers
        .iter()
        .any(|m| m.trim().is_empty())
    {
        anyhow::bail!("search.recycle_markers must not contain empty strings");
    }

    build_globset(&config.walk.exclude_globs).context("walk.exclude_globs")?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("rfind.toml");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "[db]\npath = \"./data/rfind.sqlite\"\n");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.search.max_workers, 12);
        assert_eq!(cfg.search.db_result_cap, 50);
        assert_eq!(cfg.search.mode, SearchMode::Reference);
        assert_eq!(cfg.search.recycle_markers, vec!["@Recycle", "$RECYCLE.BIN"]);
        assert!(!cfg.walk.follow_symlinks);
        assert!(cfg.roots.is_empty());
    }

    #[test]
    fn full_config_parses() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            r#"
[db]
path = "/tmp/x.sqlite"

[search]
max_workers = 4
db_result_cap = 10
mode = "filename"
recycle_markers = ["@Recycle"]

[walk]
follow_symlinks = true
exclude_globs = ["*.tmp", "node_modules"]

[roots]
catalog = "/mnt/nas/catalog"
renders = "/mnt/nas/catalog/renders"
"#,
        );
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.search.max_workers, 4);
        assert_eq!(cfg.search.mode, SearchMode::FileName);
        assert!(cfg.walk.follow_symlinks);
        assert_eq!(cfg.roots.len(), 2);
        assert_eq!(cfg.resolve_root("catalog"), PathBuf::from("/mnt/nas/catalog"));
        assert_eq!(cfg.resolve_root("/elsewhere"), PathBuf::from("/elsewhere"));
        assert_eq!(cfg.resolve_roots(&[]).len(), 2);
    }

    #[test]
    fn rejects_zero_workers() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "[db]\npath = \"x\"\n[search]\nmax_workers = 0\n");
        let err = load_config(&path).unwrap_err().to_string();
        assert!(err.contains("max_workers"), "{}", err);
    }

    #[test]
    fn rejects_zero_cap() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "[db]\npath = \"x\"\n[search]\ndb_result_cap = 0\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_bad_glob() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "[db]\npath = \"x\"\n[walk]\nexclude_globs = [\"a[\"]\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_empty_marker() {
        let tmp = TempDir::new().unwrap();
        let path = write(
            &tmp,
            "[db]\npath = \"x\"\n[search]\nrecycle_markers = [\"\"]\n",
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rejects_unknown_mode() {
        let tmp = TempDir::new().unwrap();
        let path = write(&tmp, "[db]\npath = \"x\"\n[search]\nmode = \"fuzzy\"\n");
        assert!(load_config(&path).is_err());
    }
}
