//! Error types for raster engine operations.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while describing, paging, or importing raster data.
#[derive(Error, Debug)]
pub enum RasterError {
    /// Structural problem detected before any I/O. Always recoverable by
    /// adjusting the descriptor or request.
    #[error("validation failed: {message}")]
    Validation {
        /// Description of the structural problem
        message: String,
    },

    /// File open/read/write failure, with the responsible file.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File the operation was acting on
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A requested block range cannot be satisfied by the underlying pager.
    #[error("fetch failed: {message}")]
    Fetch {
        /// Description of the unsatisfiable range
        message: String,
    },

    /// A cursor was used past its end or against an element with no data
    /// source attached.
    #[error("invalid access: {message}")]
    InvalidAccess {
        /// Description of the access error
        message: String,
    },

    /// Operation outside a component's capability, e.g. writing through a
    /// read-only pager.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The external cancellation flag was observed. Never raised by an
    /// internal fault; partially written destinations are left in place.
    #[error("import aborted")]
    Aborted,
}

impl RasterError {
    /// Create a validation error with a message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create an I/O error for a specific file.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a fetch error with a message.
    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch {
            message: message.into(),
        }
    }

    /// Create an invalid-access error with a message.
    pub fn invalid_access(message: impl Into<String>) -> Self {
        Self::InvalidAccess {
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error with a message.
    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::Unsupported(message.into())
    }

    /// Whether this error came from the external abort flag rather than a
    /// fault.
    pub fn is_abort(&self) -> bool {
        matches!(self, Self::Aborted)
    }
}

/// Attach a filename to a bare `std::io::Error`.
pub(crate) fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> RasterError + '_ {
    move |source| RasterError::io(path, source)
}
