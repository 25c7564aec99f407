//! Remote store errors

use thiserror::Error;

/// Errors returned by a remote row store
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The store could not be reached at all
    #[error("Remote store unreachable: {0}")]
    Unreachable(String),

    /// The request was sent but the store rejected it
    #[error("Remote store returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The store answered with something we could not decode
    #[error("Unexpected response from remote store: {0}")]
    InvalidResponse(String),

    /// Underlying HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RemoteError {
    /// Whether the error means "offline" rather than "the store said no"
    pub fn is_offline(&self) -> bool {
        match self {
            RemoteError::Unreachable(_) => true,
            RemoteError::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Whether the store rejected our credentials
    pub fn is_auth(&self) -> bool {
        matches!(self, RemoteError::Status { status: 401 | 403, .. })
    }
}

/// Result type for remote operations
pub type RemoteResult<T> = Result<T, RemoteError>;
