//! Feed Error Types

use derive_more::{Display, Error};

/// A feed parsing error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for feed operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why a document or value was rejected.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The document is not well-formed XML.
    #[display("malformed XML document")]
    MalformedXml,
    /// The document root is not one of the recognised tags.
    #[display("unrecognised document root: <{_0}>")]
    UnrecognizedRoot(#[error(not(source))] String),
    /// A required field could not be found in the document.
    #[display("missing required field: {_0}")]
    MissingField(#[error(not(source))] &'static str),
    /// A field was found but could not be parsed.
    #[display("failed to parse field '{field}', found value: {value}")]
    ParseError {
        /// The field that failed to parse.
        field: &'static str,
        /// The offending value.
        value: String,
    },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A document is either parseable or it isn't; fetching it again is
        // the transport layer's concern.
        false
    }
}
