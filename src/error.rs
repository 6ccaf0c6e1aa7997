//! Unified error handling for the trackstore library.
//!
//! Expected per-line and per-file problems (malformed rows, oversized files,
//! missing label sources) are *not* errors — they are outcome values and
//! report counters. Only structural failures surface through [`TrackError`]:
//! store access, I/O, duplicate keys, and an unreachable store at startup.

use thiserror::Error;

/// Unified error type for trackstore operations.
#[derive(Debug, Error)]
pub enum TrackError {
    /// Underlying SQLite error.
    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Filesystem error while reading the dataset.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A user row with this id already exists.
    #[error("user '{user_id}' already exists")]
    DuplicateUser { user_id: String },

    /// An activity row with this id already exists.
    #[error("activity {activity_id} already exists")]
    DuplicateActivity { activity_id: i64 },

    /// The user id + file stem did not form a numeric activity id.
    #[error("cannot derive a numeric activity id from '{raw}'")]
    InvalidActivityId { raw: String },

    /// The store could not be opened within the retry budget. Fatal.
    #[error("store unavailable after {attempts} attempts: {message}")]
    StoreUnavailable { attempts: u32, message: String },

    /// The dataset directory does not have the expected layout.
    #[error("dataset layout error: {message}")]
    DatasetLayout { message: String },
}

/// Result type alias for trackstore operations.
pub type Result<T> = std::result::Result<T, TrackError>;
