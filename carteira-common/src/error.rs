//! Service errors and their HTTP status codes.
//!
//! Domain layers keep their own error types (provider and holding errors)
//! and convert into [`Error`] at the HTTP boundary.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Error surfaced by the Carteira services.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or inconsistent configuration file
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown ticker, holding or user data
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected request payload or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Market data source throttled us
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Market data source failed or answered garbage
    #[error("External service error: {0}")]
    External(String),

    /// SQLite failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Holdings storage turned off in the configuration
    #[error("Storage disabled")]
    StorageDisabled,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Market data request exceeded its deadline
    #[error("Operation timed out")]
    Timeout,

    /// What was being done when `source` happened
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap with a description of the failed operation. The status code of
    /// the inner error is kept.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, past any context layers.
    pub fn root(&self) -> &Error {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound(_))
    }

    /// Market data failures that may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.root(),
            Self::RateLimited(_) | Self::External(_) | Self::Timeout
        )
    }

    /// HTTP status for this error.
    pub fn status_code(&self) -> u16 {
        match self.root() {
            Self::NotFound(_) => 404,
            Self::InvalidInput(_) => 400,
            Self::RateLimited(_) => 429,
            Self::External(_) => 502,
            Self::StorageDisabled => 503,
            Self::Timeout => 504,
            _ => 500,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{:#}", err))
    }
}

/// `.context(..)` for results whose error converts into [`Error`].
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }
}
