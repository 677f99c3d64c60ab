//! Error types for the showtime aggregator.
//!
//! `Error` serializes as its display string so failures can be embedded in the
//! aggregation report written alongside the showtimes.

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Error type for scraping, resolution and aggregation.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON payload could not be decoded
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error while writing artifacts
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote rendering context failed
    #[error("Browser error: {0}")]
    Browser(String),

    /// Markup or payload did not have the expected shape
    #[error("Failed to parse: {0}")]
    Parse(String),

    /// Required HTML element was not found
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// URL could not be built or resolved
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Rate limited by the metadata API (HTTP 429) past the configured cap
    #[error("Rate limited - too many requests")]
    RateLimited,

    /// The metadata search had no candidates for this query.
    ///
    /// Recoverable: the resolver answers it with the aggressive re-clean and
    /// then the secondary lookup. It never escapes `TitleResolver`.
    #[error("No metadata match for: {0}")]
    NoMetadataMatch(String),

    /// Secondary web lookup could not produce a title
    #[error("Fallback lookup failed: {0}")]
    FallbackFailed(String),

    /// No matching request was observed before the capture deadline
    #[error("Timed out capturing request on {0}")]
    CaptureTimeout(String),

    /// An adapter failed; carries the source name
    #[error("{source_name}: {message}")]
    Source {
        source_name: String,
        message: String,
    },
}

impl Error {
    /// Wraps any error raised inside an adapter with the adapter's name.
    pub fn in_source(source_name: &str, err: Error) -> Self {
        match err {
            Error::Source { .. } => err,
            other => Error::Source {
                source_name: source_name.to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<chromiumoxide::error::CdpError> for Error {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        Error::Browser(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUrl(err.to_string())
    }
}

impl Serialize for Error {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;
