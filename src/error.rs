//! Error taxonomy shared by the server and the client tracker

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed field in a request payload
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    /// Unique-key collision (route code)
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Database written by a newer build
    #[error("database schema version {found} is newer than supported version {supported}")]
    SchemaVersion { found: i32, supported: i32 },

    /// Client-side delivery failure; triggers local buffering
    #[error("network error: {0}")]
    Network(String),

    /// The server refused the request as malformed; retrying cannot succeed
    #[error("rejected by server (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation { field, message: message.into() }
    }

    /// HTTP status code the API surfaces for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation { .. } => 400,
            Error::NotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::Network(_) | Error::Rejected { .. } => 502,
            Error::Store(_) | Error::SchemaVersion { .. } | Error::Io(_) | Error::Serialization(_) => 500,
        }
    }

    /// Whether the detail may be shown to API callers
    pub fn is_client_facing(&self) -> bool {
        matches!(self, Error::Validation { .. } | Error::NotFound(_) | Error::Conflict(_))
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Network(e.to_string())
    }
}
