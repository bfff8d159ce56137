//! Client for the care-management platform's REST API.
//!
//! - `transport`: the HTTP seam (`HttpTransport`) and its reqwest implementation
//! - `token`: client-credentials bearer token cache
//! - `fetcher`: rate-limit-aware walker over paged bundles
//! - `records`: validated records parsed from raw bundle resources

pub mod fetcher;
pub mod records;
pub mod token;
pub mod transport;

#[cfg(test)]
pub mod mock;

pub use fetcher::*;
pub use records::*;
pub use token::*;
pub use transport::*;

use thiserror::Error;

/// Fatal errors talking to the remote platform. Any of these aborts the run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Rate limit still exceeded after {retries} retries for {path} page {page}")]
    RateLimitExceeded { path: String, page: u32, retries: u32 },

    #[error("Remote API returned status {status} for {path}: {body}")]
    Api { status: u16, path: String, body: String },

    #[error("HTTP transport error: {0}")]
    Transport(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),
}

/// A single remote record that failed validation. Never fatal: the record
/// is skipped and the phase continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataShapeError {
    #[error("{resource} record missing {field}")]
    MissingField {
        resource: &'static str,
        field: &'static str,
    },

    #[error("{resource} record has invalid {field}: {value}")]
    InvalidValue {
        resource: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("{resource} record has unknown program code {code}")]
    UnknownProgram { resource: &'static str, code: String },

    #[error("{resource} record is not an object: {reason}")]
    Malformed { resource: &'static str, reason: String },
}
