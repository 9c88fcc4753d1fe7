//! # Reference Finder Core
//!
//! Shared, I/O-free logic for Reference Finder: text normalization,
//! reference-code extraction, match evaluation, root-path optimization,
//! the request/result data model, and the [`cache::PathCache`] abstraction.
//!
//! This crate contains no tokio runtime, sqlx, or filesystem traversal.
//! Everything that touches the OS lives in the `reference-finder` crate.

pub mod cache;
pub mod error;
pub mod matcher;
pub mod models;
pub mod paths;
pub mod reference;
pub mod text;

pub use error::RequestError;
pub use matcher::Matcher;
pub use models::{FileKind, SearchMode, SearchRequest, SearchResult};
