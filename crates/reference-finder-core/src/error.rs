//! Request validation errors.
//!
//! These are the only failures a caller sees from the search engine. They
//! are raised synchronously when a [`SearchRequest`](crate::SearchRequest)
//! is built, before any phase starts. Per-directory I/O failures and stale
//! cache entries are absorbed by the engine and never surface here.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("at least one query term is required")]
    EmptyQueries,

    #[error("at least one root directory is required")]
    EmptyRoots,

    #[error("unknown file type filter: {0:?} (expected one of folder, image, video, excel, pdf, word, text, other)")]
    UnknownFileType(String),

    #[error("custom extensions require the 'other' file type filter")]
    CustomExtensionsWithoutOther,

    #[error("{name} must be >= 1")]
    InvalidLimit { name: &'static str },
}
