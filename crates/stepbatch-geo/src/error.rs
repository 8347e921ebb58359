//! Errors raised while talking to a geolocation provider.

use stepbatch_domain::BatchError;
use thiserror::Error;

/// Errors from a geolocation provider call.
#[derive(Debug, Error)]
pub enum GeoError {
    /// The HTTP request could not be built, sent or completed.
    #[error("request to geolocation provider failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("geolocation provider returned status {status}")]
    Status { status: u16 },

    /// The provider answered a page with the wrong number of entries.
    #[error("geolocation provider returned {actual} entries for a page of {expected}")]
    PageMismatch { expected: usize, actual: usize },

    /// The provider could not locate one address.
    #[error("lookup of {query} failed: {message}")]
    Lookup { query: String, message: String },
}

impl From<GeoError> for BatchError {
    fn from(err: GeoError) -> Self {
        match err {
            GeoError::Http(_) | GeoError::Status { .. } => BatchError::transport(err.to_string()),
            GeoError::PageMismatch { .. } | GeoError::Lookup { .. } => {
                BatchError::provider(err.to_string())
            }
        }
    }
}
