//! `rfind search`: run one search from the command line.
//!
//! Results stream to the progress reporter on stderr while the search runs.
//! When it finishes, stdout receives the results grouped by query, then the
//! queries that found something, the queries that found nothing, and the
//! elapsed time. With `--json` stdout receives the whole
//! [`SearchOutcome`](crate::events::SearchOutcome) as one JSON document instead.
//!
//! Ctrl-C cancels the search; whatever was found so far is still printed.
//!
//! With `--copy-to <DIR>` every result is then copied into `DIR` (see
//! [`copy`](crate::copy)) and the copy report follows the results.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use reference_finder_core::cache::PathCache;
use reference_finder_core::{FileKind, SearchMode, SearchRequest};

use crate::config::Config;
use crate::copy;
use crate::db;
use crate::engine::SearchEngine;
use crate::events::{SearchOutcome, SearchState};
use crate::progress::{format_number, ProgressMode};
use crate::sqlite_cache::SqlitePathCache;
use crate::walker::WalkOptions;

/// Command-line options for one search. Unset values fall back to config.
#[derive(Debug, Clone, Default)]
pub struct SearchOptions {
    pub queries: Vec<String>,
    /// Root paths or names from `[roots]`. Empty means every configured root.
    pub roots: Vec<String>,
    pub mode: Option<SearchMode>,
    pub file_types: Vec<String>,
    pub extensions: Vec<String>,
    pub workers: Option<usize>,
    pub db_cap: Option<usize>,
    pub cache_only: bool,
    pub json: bool,
    pub progress: Option<ProgressMode>,
    /// Copy every result into this directory after the search.
    pub copy_to: Option<PathBuf>,
}

/// Build a validated request from CLI options and config defaults.
pub fn build_request(config: &Config, opts: &SearchOptions) -> Result<SearchRequest> {
    let mut builder = SearchRequest::builder(opts.mode.unwrap_or(config.search.mode))
        .queries(&opts.queries)
        .roots(config.resolve_roots(&opts.roots))
        .file_type_names(&opts.file_types)
        .custom_extensions(&opts.extensions)
        .max_workers(opts.workers.unwrap_or(config.search.max_workers))
        .db_result_cap(opts.db_cap.unwrap_or(config.search.db_result_cap))
        .cache_only(opts.cache_only);
    if !opts.extensions.is_empty() {
        builder = builder.file_type(FileKind::Other);
    }
    Ok(builder.build()?)
}

pub async fn run_search(config: &Config, opts: SearchOptions) -> Result<()> {
    let request = build_request(config, &opts)?;

    let pool = db::connect(config).await?;
    let cache: Arc<dyn PathCache> = Arc::new(SqlitePathCache::new(pool.clone()));
    let engine = SearchEngine::new(cache).with_walk_options(WalkOptions::from_config(config)?);

    let progress = opts.progress.unwrap_or_else(ProgressMode::default_for_tty);
    let handle = engine.start_search(request, progress.observer());

    let cancel = handle.cancel_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = handle.wait().await?;
    ctrl_c.abort();

    let copied = match &opts.copy_to {
        Some(dest) => Some(copy::copy_results(&outcome, dest)?),
        None => None,
    };

    if opts.json {
        let mut doc = serde_json::to_value(&outcome)?;
        if let Some(report) = &copied {
            doc["copy"] = serde_json::to_value(report)?;
        }
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        print_outcome(&outcome);
        if let (Some(report), Some(dest)) = (&copied, &opts.copy_to) {
            println!();
            copy::print_report(report, dest);
        }
    }

    pool.close().await;
    Ok(())
}

fn print_outcome(outcome: &SearchOutcome) {
    if outcome.total_results() == 0 {
        println!("No results.");
    }

    for group in outcome.found() {
        println!("{} ({})", group.query, group.results.len());
        for result in &group.results {
            println!("  {:<7} {}", result.kind.as_str(), result.path.display());
        }
        println!();
    }

    let found: Vec<&str> = outcome.found().map(|g| g.query.as_str()).collect();
    let missing: Vec<&str> = outcome.not_found().map(|g| g.query.as_str()).collect();
    if !found.is_empty() {
        println!("found: {}", found.join(", "));
    }
    if !missing.is_empty() {
        println!("not found: {}", missing.join(", "));
    }

    let summary = &outcome.summary;
    println!(
        "{} results  ({} from cache, {} directories walked)  in {:.2}s",
        format_number(summary.results as u64),
        format_number(summary.cache_hits as u64),
        format_number(summary.directories_walked as u64),
        summary.elapsed_ms as f64 / 1000.0
    );
    if summary.walk_failed {
        println!("walk failed; results may be incomplete");
    }
    if summary.io_errors > 0 {
        println!("{} unreadable entries skipped", format_number(summary.io_errors as u64));
    }
    if outcome.state == SearchState::Interrupted {
        println!("interrupted");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DbConfig, SearchConfig, WalkConfig};
    use std::collections::BTreeMap;

    fn config() -> Config {
        let mut roots = BTreeMap::new();
        roots.insert("catalog".to_string(), PathBuf::from("/mnt/nas/catalog"));
        Config {
            db: DbConfig {
                path: PathBuf::from("./data/rfind.sqlite"),
            },
            search: SearchConfig::default(),
            walk: WalkConfig::default(),
            roots,
        }
    }

    #[test]
    fn request_uses_config_defaults_and_named_roots() {
        let opts = SearchOptions {
            queries: vec!["BLZ 6472".into(), "  ".into()],
            ..SearchOptions::default()
        };
        let req = build_request(&config(), &opts).unwrap();
        assert_eq!(req.queries(), &["BLZ 6472".to_string()]);
        assert!(req.roots().contains(&PathBuf::from("/mnt/nas/catalog")));
        assert_eq!(req.mode(), SearchMode::Reference);
        assert!(req.file_types().contains(&FileKind::Folder));
        assert_eq!(req.max_workers(), 12);
    }

    #[test]
    fn extensions_imply_other() {
        let opts = SearchOptions {
            queries: vec!["BLZ 6472".into()],
            roots: vec!["/tmp".into()],
            extensions: vec![".DWG".into()],
            ..SearchOptions::default()
        };
        let req = build_request(&config(), &opts).unwrap();
        assert!(req.file_types().contains(&FileKind::Other));
        assert!(req.custom_extensions().contains("dwg"));
    }

    #[test]
    fn unknown_type_is_rejected() {
        let opts = SearchOptions {
            queries: vec!["BLZ 6472".into()],
            file_types: vec!["spreadsheet".into()],
            ..SearchOptions::default()
        };
        let err = build_request(&config(), &opts).unwrap_err();
        assert!(err.to_string().contains("spreadsheet"));
    }
}
