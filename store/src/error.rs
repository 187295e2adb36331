//! Error types for the metadata store.
//!
//! Provides structured error handling with:
//! - Machine-readable status codes (`StatusCode`)
//! - Re-classification of storage driver errors (unique-constraint
//!   collisions surface as `AlreadyExists`, everything else as internal)
//! - A distinguished `DowngradeCompleted` sentinel used only at open time

use thiserror::Error;

/// Result type alias for metadata store operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Status Code ───────────────────────────────────────────────

/// Machine-readable status codes for the error taxonomy.
///
/// Each code maps to a SCREAMING_SNAKE string. Callers that bridge to an
/// RPC surface match on the string; library callers match on the enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    VersionMismatch,
    DowngradeCompleted,
    DataLoss,
    Cancelled,
    Internal,
}

impl StatusCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::NotFound => "NOT_FOUND",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::VersionMismatch => "VERSION_MISMATCH",
            Self::DowngradeCompleted => "DOWNGRADE_COMPLETED",
            Self::DataLoss => "DATA_LOSS",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL",
        }
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in metadata store operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Schema version mismatch: database at {stored}, library at {library}")]
    VersionMismatch { stored: i64, library: i64 },

    /// Success-as-error sentinel: the requested downgrade migration finished
    /// and the store was closed without returning a handle.
    #[error("Downgrade migration to schema version {version} was performed")]
    DowngradeCompleted { version: i64 },

    #[error("Data loss: {0}")]
    DataLoss(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error to its status code.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::InvalidArgument,
            Self::NotFound(_) => StatusCode::NotFound,
            Self::AlreadyExists(_) => StatusCode::AlreadyExists,
            Self::VersionMismatch { .. } => StatusCode::VersionMismatch,
            Self::DowngradeCompleted { .. } => StatusCode::DowngradeCompleted,
            Self::DataLoss(_) => StatusCode::DataLoss,
            Self::Cancelled => StatusCode::Cancelled,
            Self::Database(_) | Self::Internal(_) => StatusCode::Internal,
        }
    }
}

impl From<rusqlite::Error> for Error {
    /// Re-classify storage driver errors.
    ///
    /// Unique-constraint collisions become `AlreadyExists` (context names
    /// and type names carry UNIQUE constraints); everything unmatched stays
    /// an internal database error.
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, msg)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::AlreadyExists(
                    msg.clone()
                        .unwrap_or_else(|| "unique constraint violation".to_string()),
                )
            }
            _ => Self::Database(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(
            Error::InvalidArgument(String::new()).status_code().as_str(),
            "INVALID_ARGUMENT"
        );
        assert_eq!(
            Error::DowngradeCompleted { version: 0 }.status_code().as_str(),
            "DOWNGRADE_COMPLETED"
        );
        assert_eq!(Error::Cancelled.status_code().as_str(), "CANCELLED");
    }

    #[test]
    fn test_constraint_violation_reclassifies() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (x INTEGER NOT NULL UNIQUE);")
            .unwrap();
        conn.execute("INSERT INTO t (x) VALUES (1)", []).unwrap();
        let err: Error = conn
            .execute("INSERT INTO t (x) VALUES (1)", [])
            .unwrap_err()
            .into();
        assert_eq!(err.status_code(), StatusCode::AlreadyExists);
    }

    #[test]
    fn test_other_driver_errors_stay_internal() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let err: Error = conn.execute("SELECT * FROM missing", []).unwrap_err().into();
        assert_eq!(err.status_code(), StatusCode::Internal);
    }
}
