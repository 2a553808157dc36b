//! Error types for geolocation lookups.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while opening, checking or refreshing geo databases.
#[derive(Debug, Error)]
pub enum GeoError {
    /// A filesystem operation on a database file failed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// The file being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A database file could not be opened or decoded.
    #[error("Failed to open geo database {}: {reason}", .path.display())]
    Database {
        /// The database file.
        path: PathBuf,
        /// Why the reader rejected it.
        reason: String,
    },

    /// A staged replacement is not a regular file.
    #[error("{} is not a regular file", .0.display())]
    NotRegularFile(PathBuf),
}

impl GeoError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for geo operations.
pub type GeoResult<T> = Result<T, GeoError>;
