//! Provider Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Messages are shown to users as-is,
//! so keep them readable.

use derive_more::{Display, Error};
use std::io::Error as IoError;

/// A provider error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The provider needs credentials that have not been configured.
    #[display("authentication credentials missing for {_0}")]
    AuthenticationMissing(#[error(not(source))] String),
    /// Network-related error (connection, HTTP status, etc.)
    #[display("network error: {_0}")]
    Network(#[error(not(source))] String),
    /// Document or resource does not exist
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
    /// Provider description is malformed or contradictory.
    #[display("invalid provider description: {_0}")]
    InvalidDescriptor(#[error(not(source))] String),
    /// Operation is not offered by this provider.
    #[display("not supported by this provider: {_0}")]
    Unsupported(#[error(not(source))] &'static str),
    /// The account cannot afford a priced download.
    #[display("insufficient balance: {balance:.2} available, {price:.2} required")]
    InsufficientBalance { balance: f64, price: f64 },
    /// A response could not be understood.
    #[display("could not parse response: {_0}")]
    Parse(#[error(not(source))] String),
    /// The remote service reported an error status.
    #[display("{_0}")]
    Remote(#[error(not(source))] String),
    /// Provider was used before it finished initializing.
    #[display("provider is not initialized")]
    NotInitialized,
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Network(_) | Self::Remote(_))
    }

    /// Missing credentials are reported separately from other failures.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::AuthenticationMissing(_))
    }
}
