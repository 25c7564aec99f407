//! Storage error handling
//!
//! Typed errors for the local entry store. Failures opening the database
//! file are classified so the CLI can tell a full disk from a permissions
//! problem and suggest a fix.

use std::io;
use std::path::PathBuf;

use rusqlite::ErrorCode;
use thiserror::Error;

/// Errors raised by the local entry store
#[derive(Error, Debug)]
pub enum StorageError {
    /// The data directory could not be created
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The database file or its directory is not accessible
    #[error("Permission denied: cannot open '{path}'. Check file permissions.")]
    PermissionDenied { path: PathBuf },

    /// No space left for the database or its journal
    #[error("Disk full while writing '{path}'. Free up disk space and try again.")]
    DiskFull { path: PathBuf },

    /// Another process holds the database lock
    #[error("Database '{path}' is locked by another process")]
    Busy { path: PathBuf },

    /// The file exists but is not a usable database
    #[error("'{path}' is not a valid hypo database")]
    NotADatabase { path: PathBuf },

    /// Expected file is missing
    #[error("File not found: '{path}'")]
    NotFound { path: PathBuf },

    /// Any other SQLite failure
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored row could not be turned back into a model
    #[error("Corrupt row in '{table}': {details}")]
    CorruptRow { table: &'static str, details: String },

    /// Serialization of a stored value failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Classify a failure to prepare the data directory
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied { path },
            io::ErrorKind::NotFound => StorageError::NotFound { path },
            _ if is_disk_full_message(&error.to_string()) => StorageError::DiskFull { path },
            _ => StorageError::CreateDirectory {
                path,
                source: error,
            },
        }
    }

    /// Classify a SQLite failure against the database at `path`
    pub fn from_sqlite(error: rusqlite::Error, path: PathBuf) -> Self {
        let code = match &error {
            rusqlite::Error::SqliteFailure(e, _) => e.code,
            _ => return StorageError::Database(error),
        };
        match code {
            ErrorCode::DiskFull => StorageError::DiskFull { path },
            ErrorCode::PermissionDenied | ErrorCode::ReadOnly | ErrorCode::CannotOpen => {
                StorageError::PermissionDenied { path }
            }
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StorageError::Busy { path },
            ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt => {
                StorageError::NotADatabase { path }
            }
            _ => StorageError::Database(error),
        }
    }

    /// Whether retrying after user action can succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::DiskFull { .. }
                | StorageError::PermissionDenied { .. }
                | StorageError::Busy { .. }
        )
    }

    /// What the user can do about this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::DiskFull { .. } => Some("Free up disk space and try again."),
            StorageError::PermissionDenied { .. } => {
                Some("Check that you own the data directory, or point data_dir somewhere writable.")
            }
            StorageError::CreateDirectory { .. } => {
                Some("Check that the parent directory exists and you have write permissions.")
            }
            StorageError::Busy { .. } => Some("Close other hypo instances and try again."),
            StorageError::NotADatabase { .. } => {
                Some("Move the file aside; hypo will create a fresh database and sync can restore it.")
            }
            StorageError::CorruptRow { .. } => {
                Some("Export your entries, clear local data and import them again.")
            }
            _ => None,
        }
    }
}

fn is_disk_full_message(msg: &str) -> bool {
    let msg = msg.to_lowercase();
    msg.contains("no space left") || msg.contains("quota exceeded")
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: ErrorCode, extended: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code,
                extended_code: extended,
            },
            None,
        )
    }

    #[test]
    fn test_io_classification() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let err = StorageError::from_io(denied, PathBuf::from("/data"));
        assert!(matches!(err, StorageError::PermissionDenied { .. }));
        assert!(err.is_recoverable());

        let full = io::Error::new(io::ErrorKind::Other, "No space left on device");
        let err = StorageError::from_io(full, PathBuf::from("/data"));
        assert!(matches!(err, StorageError::DiskFull { .. }));

        let other = io::Error::new(io::ErrorKind::Other, "weird");
        let err = StorageError::from_io(other, PathBuf::from("/data"));
        assert!(matches!(err, StorageError::CreateDirectory { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_sqlite_classification() {
        let path = PathBuf::from("hypo.db");

        let err = StorageError::from_sqlite(sqlite_failure(ErrorCode::DiskFull, 13), path.clone());
        assert!(matches!(err, StorageError::DiskFull { .. }));

        let err =
            StorageError::from_sqlite(sqlite_failure(ErrorCode::DatabaseBusy, 5), path.clone());
        assert!(matches!(err, StorageError::Busy { .. }));
        assert!(err.recovery_suggestion().is_some());

        let err =
            StorageError::from_sqlite(sqlite_failure(ErrorCode::NotADatabase, 26), path.clone());
        assert!(matches!(err, StorageError::NotADatabase { .. }));
        assert!(!err.is_recoverable());

        let err = StorageError::from_sqlite(rusqlite::Error::QueryReturnedNoRows, path);
        assert!(matches!(err, StorageError::Database(_)));
    }

    #[test]
    fn test_corrupt_row_display() {
        let err = StorageError::CorruptRow {
            table: "entries",
            details: "invalid UUID".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("entries"));
        assert!(msg.contains("invalid UUID"));
        assert!(err.recovery_suggestion().is_some());
    }
}
