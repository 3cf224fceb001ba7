//! Error types for civicdata.
//!
//! Component errors (`FetchError`, `DecodeError`, `NormalizeError`) are recovered
//! close to where they happen. Only `AllEndpointsFailed` and `Normalize` ever reach
//! the cache, and only `DatasetUnavailable` reaches presentation code.

use crate::datasets::DatasetKind;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failure category of a single fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    Connection,
    Http,
}

impl std::fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchErrorKind::Timeout => write!(f, "timeout"),
            FetchErrorKind::Connection => write!(f, "connection"),
            FetchErrorKind::Http => write!(f, "http"),
        }
    }
}

/// Failure of one HTTP call.
#[derive(Debug, Clone, Error)]
#[error("{kind} error fetching {url}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub status_code: Option<u16>,
    pub url: String,
    pub message: String,
}

impl FetchError {
    pub fn timeout(url: impl Into<String>, after: Duration) -> Self {
        Self {
            kind: FetchErrorKind::Timeout,
            status_code: None,
            url: url.into(),
            message: format!("no response after {:?}", after),
        }
    }

    pub fn connection(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Connection,
            status_code: None,
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn http(url: impl Into<String>, status: u16) -> Self {
        Self {
            kind: FetchErrorKind::Http,
            status_code: Some(status),
            url: url.into(),
            message: format!("status {}", status),
        }
    }

    /// Statuses that will not change by asking the same endpoint again.
    pub fn is_permanent(&self) -> bool {
        matches!(self.status_code, Some(400 | 401 | 403 | 404))
    }
}

/// The payload could not be parsed as any accepted format.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("payload is not valid UTF-8: {0}")]
    Encoding(String),

    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("invalid XML: {0}")]
    Xml(String),
}

/// The decoded tree does not look like any known shape of the dataset.
#[derive(Debug, Clone, Error)]
#[error("unrecognized payload shape: tried containers {tried:?}, no list carries any of {signature:?}")]
pub struct NormalizeError {
    pub tried: Vec<String>,
    pub signature: Vec<String>,
}

/// Main error type for the civicdata library.
#[derive(Debug, Error)]
pub enum CivicDataError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{dataset}: {source}")]
    Normalize {
        dataset: DatasetKind,
        #[source]
        source: NormalizeError,
    },

    #[error("all endpoints failed for {dataset} after {attempts} attempts: {last_error}")]
    AllEndpointsFailed {
        dataset: DatasetKind,
        attempts: u32,
        last_error: String,
    },

    #[error("no data available for {dataset}: {reason}")]
    DatasetUnavailable { dataset: DatasetKind, reason: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for civicdata operations.
pub type Result<T> = std::result::Result<T, CivicDataError>;

impl CivicDataError {
    /// Check if asking the same endpoint again might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            CivicDataError::Fetch(e) => !e.is_permanent(),
            CivicDataError::Decode(_) => true,
            _ => false,
        }
    }

    /// True when presentation code has nothing at all to show.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CivicDataError::DatasetUnavailable { .. })
    }
}
