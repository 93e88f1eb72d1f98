//! Error types for propbridge
//!
//! Construction and registration surface these errors to the caller.
//! Adapter I/O never does: connect/fetch/push turn them into outcomes
//! carrying a [`Diagnostic`](crate::traits::Diagnostic) instead.

use thiserror::Error;

/// Result type alias for propbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for propbridge
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors (missing required field, bad `type`, bad config file)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lookup errors (unknown data source name, missing file, missing data path)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Could not establish or use a connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// The remote side answered with an error status
    #[error("Request failed with status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, as sent by the server
        body: String,
    },

    /// Response or file content could not be turned into a table
    #[error("Decode error: {0}")]
    Decode(String),

    /// Unsupported format, driver, query shape or write mode
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(String),

    /// CSV encoding/decoding errors
    #[error("CSV error: {0}")]
    Csv(String),

    /// Filesystem errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an error-status error
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create an unsupported error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Whether this error describes a data shape problem rather than a failed operation
    ///
    /// These are logged at warn level by the fail-soft wrappers.
    pub fn is_soft(&self) -> bool {
        matches!(self, Error::Decode(_) | Error::Unsupported(_))
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
