//! # rfind
//!
//! The `rfind` binary finds folders and files by reference code or by name
//! across large network trees. It checks a persistent path cache first and
//! then walks the selected roots concurrently.
//!
//! ## Usage
//!
//! ```bash
//! rfind --config ./config/rfind.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rfind init` | Create the SQLite path cache and run schema migrations |
//! | `rfind search <QUERY>...` | Search the cache and the roots |
//! | `rfind cache refresh [ROOT...]` | Record reference folders found under the roots |
//! | `rfind cache stats` | Summarize the path cache |
//! | `rfind cache history <PATH>` | Show the change log of one folder |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the cache
//! rfind init
//!
//! # Find two references under a named root
//! rfind search "BLZ 6472" "CDB 9493" --root catalog
//!
//! # Folders and images, by name
//! rfind search "mesa comedor" --mode filename --type folder --type image
//!
//! # Only ask the cache
//! rfind search "BLZ 6472" --cache-only --json
//!
//! # Copy everything found into a local folder
//! rfind search "BLZ 6472" --type folder --type image --copy-to ./pedido
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use reference_finder::config;
use reference_finder::migrate;
use reference_finder::progress::ProgressMode;
use reference_finder::refresh;
use reference_finder::search::{self, SearchOptions};
use reference_finder::stats;
use reference_finder_core::SearchMode;

/// rfind: find reference folders and files across network trees.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/rfind.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rfind",
    about = "Find reference folders and files across network trees",
    version,
    long_about = "rfind looks up query terms in a persistent path cache, verifies the hits on disk, \
    and then walks the selected roots with a bounded pool of worker threads, matching every entry \
    against every query in a single pass."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rfind.toml`.
    #[arg(long, global = true, default_value = "./config/rfind.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the path cache schema.
    ///
    /// Creates the SQLite database file and the folder and change-log
    /// tables. Running it again is safe.
    Init,

    /// Search for folders and files.
    ///
    /// Each query is looked up in the path cache first. Verified cache hits
    /// are reported immediately; then the roots are walked once for all
    /// queries together.
    Search {
        /// One or more query terms, e.g. `"BLZ 6472"`.
        #[arg(required = true)]
        queries: Vec<String>,

        /// Root to search: a path or a name from `[roots]`. Repeatable.
        /// Defaults to every configured root.
        #[arg(long = "root", short = 'r')]
        roots: Vec<String>,

        /// Matching mode: `reference` or `filename`. Defaults to `search.mode`.
        #[arg(long)]
        mode: Option<SearchMode>,

        /// File type to report: folder, image, video, excel, pdf, word, text,
        /// other. Repeatable. Defaults to folder.
        #[arg(long = "type", short = 't')]
        types: Vec<String>,

        /// Extra extension reported as `other`. Repeatable.
        #[arg(long = "ext")]
        extensions: Vec<String>,

        /// Walker pool width. Defaults to `search.max_workers`.
        #[arg(long)]
        workers: Option<usize>,

        /// Maximum cache candidates per query. Defaults to `search.db_result_cap`.
        #[arg(long)]
        db_cap: Option<usize>,

        /// Only consult the cache; do not walk the roots.
        #[arg(long)]
        cache_only: bool,

        /// Print the final outcome as JSON on stdout.
        #[arg(long)]
        json: bool,

        /// Progress on stderr: `human`, `json` or `off`. Defaults to human
        /// when stderr is a terminal.
        #[arg(long)]
        progress: Option<ProgressMode>,

        /// Copy every result into this directory: folders recursively,
        /// files directly.
        #[arg(long, value_name = "DIR")]
        copy_to: Option<PathBuf>,
    },

    /// Maintain the path cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Walk roots and record every folder whose name carries a reference.
    ///
    /// Records for folders that no longer exist under the refreshed roots
    /// are marked deleted.
    Refresh {
        /// Roots to refresh (paths or names from `[roots]`). Defaults to
        /// every configured root.
        roots: Vec<String>,
    },

    /// Show cache counters and change-log breakdown.
    Stats,

    /// Show the change log for one folder.
    History {
        /// Folder path exactly as recorded.
        path: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Search {
            queries,
            roots,
            mode,
            types,
            extensions,
            workers,
            db_cap,
            cache_only,
            json,
            progress,
            copy_to,
        } => {
            let opts = SearchOptions {
                queries,
                roots,
                mode,
                file_types: types,
                extensions,
                workers,
                db_cap,
                cache_only,
                json,
                progress,
                copy_to,
            };
            search::run_search(&cfg, opts).await?;
        }
        Commands::Cache { action } => match action {
            CacheAction::Refresh { roots } => {
                refresh::run_refresh(&cfg, &roots).await?;
            }
            CacheAction::Stats => {
                stats::run_stats(&cfg).await?;
            }
            CacheAction::History { path } => {
                stats::run_history(&cfg, &path).await?;
            }
        },
    }

    Ok(())
}
