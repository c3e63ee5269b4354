//! Error types for the sync engine.
//!
//! One structured error type covers every sync operation. Variants carry the
//! context (URL, path) needed to diagnose a failed course sync without a
//! debugger attached.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while synchronizing course content.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No login session is available for the course's environment.
    ///
    /// This is a hard precondition failure: sync cannot proceed for the
    /// course at all, as distinct from a transport failure on one request.
    #[error("no login session available, course sync cannot proceed")]
    NoSession,

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error fetching {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout fetching {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    ///
    /// A 403 on a folder-item listing is recovered as an empty collection by
    /// [`fetch_all_or_empty_on_forbidden`](crate::fetch::fetch_all_or_empty_on_forbidden);
    /// every other fetch surfaces it through this variant.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Response body did not decode as the expected record shape.
    #[error("malformed response from {url}: {source}")]
    Json {
        /// The URL whose response failed to decode.
        url: String,
        /// The underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// File system error (create directory, write, rename, etc.)
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl SyncError {
    /// Creates a network error from a reqwest error, classifying timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a decode error.
    pub fn json(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            url: url.into(),
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns true for a forbidden (403) response.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::HttpStatus { status: 403, .. })
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` or `From<std::io::Error>`
// because the variants require context (url, path) that the source errors
// don't provide. The helper constructors are the pattern used throughout.
