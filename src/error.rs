use std::sync::Arc;

use thiserror::Error;

/// Result type for fallible operations of this crate (configuration loading).
///
/// Feature evaluation itself never returns an error.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading a [`Configuration`](crate::Configuration).
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The configuration is not valid JSON or does not have the expected top-level shape.
    ///
    /// Individual features, rules and saved groups that fail to parse do not cause this error;
    /// they are isolated and skipped at evaluation time.
    #[error("error parsing configuration")]
    ConfigurationParseError(#[source] Arc<serde_json::Error>),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::ConfigurationParseError(Arc::new(value))
    }
}
