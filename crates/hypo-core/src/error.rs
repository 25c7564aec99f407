//! Library error type
//!
//! Operations that span the local and remote stores return [`Error`]. The
//! per-layer errors ([`StorageError`], [`RemoteError`]) stay available through
//! the wrapped variants.

use thiserror::Error;

use crate::remote::RemoteError;
use crate::storage::StorageError;

/// Errors surfaced by sync, dedup, transfer and journal operations
#[derive(Error, Debug)]
pub enum Error {
    /// The initial remote read of a pass failed
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(#[source] RemoteError),

    /// A single remote write failed
    #[error("Remote write failed: {0}")]
    RemoteWriteFailed(#[source] RemoteError),

    /// An import document did not have the expected shape
    #[error("Malformed import: {0}")]
    MalformedImport(String),

    /// The on-device store failed
    #[error("Local storage error: {0}")]
    LocalStorage(#[from] StorageError),

    /// The operation needs a remote store but none is configured
    #[error("No remote store configured")]
    NotConfigured,
}

impl Error {
    /// Whether the failure was a connectivity problem
    pub fn is_offline(&self) -> bool {
        match self {
            Error::RemoteUnavailable(e) | Error::RemoteWriteFailed(e) => e.is_offline(),
            _ => false,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::LocalStorage(StorageError::Database(e))
    }
}

/// Result type for library operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offline_passthrough() {
        let err = Error::RemoteUnavailable(RemoteError::Unreachable("down".into()));
        assert!(err.is_offline());
        assert!(err.to_string().contains("down"));

        let err = Error::MalformedImport("entries missing".into());
        assert!(!err.is_offline());
    }

    #[test]
    fn test_storage_conversion() {
        let err: Error = StorageError::NotFound {
            path: "hypo.db".into(),
        }
        .into();
        assert!(matches!(err, Error::LocalStorage(_)));
    }
}
