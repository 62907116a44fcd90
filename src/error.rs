//! Error types for offramp-preview
//!
//! This module provides error handling for the library:
//! - [`Error`], the crate-wide error returned by [`Previewer`](crate::Previewer) operations
//! - [`FetchError`], the classified per-variant failure produced by a
//!   [`VariantFetcher`](crate::fetcher::VariantFetcher)
//! - [`PackageError`], the failure produced by a [`Packager`](crate::packager::Packager)
//!
//! Per-variant errors are values, not control flow: a batch collects them into its
//! failed set and never aborts sibling fetches because of one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::types::{SourceKey, VariantId};

/// Result type alias for offramp-preview operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for offramp-preview
#[derive(Debug, Error)]
pub enum Error {
    /// Source input was rejected before any fetch was issued
    #[error("invalid source: {message}")]
    Validation {
        /// Human-readable reason the input was rejected
        message: String,
    },

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_fetches")
        key: Option<String>,
    },

    /// Every variant of a batch failed; the user has to resubmit
    #[error("no variant could be loaded for {key} ({} failures)", failures.len())]
    TotalBatchFailure {
        /// The source key of the failed batch
        key: SourceKey,
        /// Failure of each variant
        failures: BTreeMap<VariantId, FetchError>,
    },

    /// Operation requires a loaded active variant that does not exist
    #[error("not ready: {reason}")]
    NotReady {
        /// What was missing
        reason: String,
    },

    /// Retry was requested for a variant that is not in the failed state
    #[error("cannot retry {variant} variant in state {state}")]
    RetryNotAllowed {
        /// The variant the retry was requested for
        variant: VariantId,
        /// The current state of that variant (e.g., "loaded", "pending")
        state: String,
    },

    /// Packager refused the export because of rate limiting
    #[error("export rate limited{}", retry_hint(*retry_after_secs))]
    RateLimited {
        /// Seconds to wait before trying again, when the packager said so
        retry_after_secs: Option<u64>,
    },

    /// Packager failed for a reason other than rate limiting
    #[error("export failed: {0}")]
    Export(PackageError),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Create a validation error
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    /// Create a "not ready" error
    pub(crate) fn not_ready(reason: impl Into<String>) -> Self {
        Error::NotReady {
            reason: reason.into(),
        }
    }

    /// Get the machine-readable error code
    ///
    /// Stable across releases; UI layers can switch on it without parsing messages.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation_error",
            Error::Config { .. } => "config_error",
            Error::TotalBatchFailure { .. } => "total_batch_failure",
            Error::NotReady { .. } => "not_ready",
            Error::RetryNotAllowed { .. } => "retry_not_allowed",
            Error::RateLimited { .. } => "rate_limited",
            Error::Export(_) => "export_failed",
            Error::Http(_) => "http_client_error",
        }
    }
}

impl From<PackageError> for Error {
    fn from(error: PackageError) -> Self {
        match error {
            PackageError::RateLimited { retry_after_secs } => Error::RateLimited { retry_after_secs },
            other => Error::Export(other),
        }
    }
}

fn retry_hint(retry_after_secs: Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    }
}

/// Classified failure of one (source, variant) fetch
///
/// Cloneable so the cache can keep the failure next to the variant while the
/// same value is reported in events and batch reports.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchError {
    /// Transport-level failure (connect, timeout, truncated body)
    #[error("network error: {message}")]
    Network {
        /// Description of the transport failure
        message: String,
    },

    /// Transform service answered with a non-success status
    #[error("transform service returned HTTP {status}")]
    Http {
        /// The HTTP status code
        status: u16,
    },

    /// Transform service is rate limiting requests (HTTP 429)
    #[error("transform service rate limited the request{}", retry_hint(*retry_after_secs))]
    RateLimited {
        /// Value of the `Retry-After` header in seconds, when present
        retry_after_secs: Option<u64>,
    },

    /// Transform service answered successfully but reported a failure in its body
    #[error("transform failed upstream: {message}")]
    Upstream {
        /// The upstream error message
        message: String,
    },
}

impl FetchError {
    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        FetchError::Network {
            message: message.into(),
        }
    }

    /// Create an upstream error
    pub fn upstream(message: impl Into<String>) -> Self {
        FetchError::Upstream {
            message: message.into(),
        }
    }

    /// Get the machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            FetchError::Network { .. } => "network_error",
            FetchError::Http { .. } => "http_error",
            FetchError::RateLimited { .. } => "rate_limited",
            FetchError::Upstream { .. } => "upstream_error",
        }
    }
}

/// Failure reported by a packager
#[derive(Debug, Error)]
pub enum PackageError {
    /// Transport-level failure talking to the packager
    #[error("network error: {0}")]
    Network(String),

    /// Packager answered with a non-success status
    #[error("packager returned HTTP {status}: {message}")]
    Http {
        /// The HTTP status code
        status: u16,
        /// Error message from the response body (may be empty)
        message: String,
    },

    /// Packager is rate limiting exports (HTTP 429)
    #[error("packager rate limited the request{}", retry_hint(*retry_after_secs))]
    RateLimited {
        /// Value of the `Retry-After` header in seconds, when present
        retry_after_secs: Option<u64>,
    },

    /// Bundle could not be built
    #[error("failed to build bundle: {message}")]
    Build {
        /// The reason the build failed
        message: String,
    },
}
