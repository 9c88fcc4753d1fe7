//! # reference-finder
//!
//! Finds folders and files by reference code (`BLZ 6472`) or by name across
//! large, slow network trees.
//!
//! A search runs in two phases. The persistent path cache is asked first;
//! every candidate it returns is verified on disk and streamed immediately.
//! Then the selected roots are walked once, concurrently, with every entry
//! matched against every query. A shared dedup set guarantees that each
//! path is reported at most once per query.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ SearchEngine │──▶│  PathCache   │   │    Walker    │
//! │ state machine│   │ SQLite/memory│   │ rayon+walkdir│
//! └──────┬───────┘   └──────────────┘   └──────┬───────┘
//!        │                                     │
//!        └────────────▶ ResultSink ◀───────────┘
//!                           │
//!                           ▼
//!                    SearchObserver
//!               (CLI progress, channel)
//! ```
//!
//! Pure matching logic (normalization, reference extraction, evaluation,
//! root optimization, the cache trait) lives in `reference-finder-core`.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_cache`] | SQLite-backed path cache |
//! | [`cancel`] | Cooperative cancellation flag |
//! | [`events`] | Observer contract and event channel |
//! | [`sink`] | Result dedup and grouping |
//! | [`walker`] | Concurrent filesystem walker |
//! | [`engine`] | Search state machine and handles |
//! | [`refresh`] | Cache refresh and reconciliation |
//! | [`stats`] | Cache statistics and history |
//! | [`progress`] | CLI progress reporters |
//! | [`search`] | `rfind search` command |
//! | [`copy`] | Copying results to a destination |

pub mod cancel;
pub mod config;
pub mod copy;
pub mod db;
pub mod engine;
pub mod events;
pub mod migrate;
pub mod progress;
pub mod refresh;
pub mod search;
pub mod sink;
pub mod sqlite_cache;
pub mod stats;
pub mod walker;

pub use engine::{SearchEngine, SearchHandle};
pub use events::{SearchEvent, SearchObserver, SearchOutcome, SearchState};
