//! Configuration Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("configuration file not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// The file exists but could not be read or parsed.
    #[display("configuration file is invalid: {}", _0.display())]
    Invalid(#[error(not(source))] PathBuf),
    /// Neither a `KNewStuff3` nor a `KNewStuff2` section is present.
    #[display("configuration file has no KNewStuff3 section: {}", _0.display())]
    MissingSection(#[error(not(source))] PathBuf),
    #[display("no installation target configured (TargetDir, InstallPath or AbsoluteInstallPath)")]
    MissingInstallTarget,
    #[display("invalid installation target: {_0}")]
    InvalidInstallTarget(#[error(not(source))] String),
    #[display("could not determine the user's home directory")]
    NoHomeDirectory,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        false
    }
}
