//! Core library for the Newscope personalized news curator.
//!
//! Contains the ingestion and classification pipeline: configuration,
//! typed errors, the SQLite storage layer, feed fetching and processing,
//! article extraction, LLM classification, preference-summary
//! maintenance, and the scheduler runtime that ties the loops together.

pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod llm;
pub mod preference;
pub mod retry;
pub mod scheduler;
pub mod storage;

pub use error::*;

/// Returns the version of the newscope-core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
