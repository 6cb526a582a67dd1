//! Error type returned by Ensure and teardown operations.

use thiserror::Error;

use crate::api::ClientError;
use crate::diff::DiffError;

/// Errors raised by a single Ensure or teardown operation.
#[derive(Debug, Error)]
pub enum EnsureError {
    /// Raised when a prerequisite whiteboard key is absent. This points at a
    /// missing dependency edge in the graph, not at a transient condition.
    #[error("missing prerequisite {key} on the whiteboard")]
    MissingPrerequisite {
        /// Whiteboard key that was expected.
        key: String,
    },
    /// Raised when a resource the user owns does not exist.
    #[error("user-managed {kind} {name} not found")]
    UserManaged {
        /// Resource kind.
        kind: &'static str,
        /// Configured name.
        name: String,
    },
    /// Raised when a resource is absent right after it was written.
    #[error("{kind} {name} vanished after it was written")]
    Vanished {
        /// Resource kind.
        kind: &'static str,
        /// Resource name.
        name: String,
    },
    /// Wraps remote API failures.
    #[error(transparent)]
    Client(#[from] ClientError),
    /// Wraps update computation failures.
    #[error(transparent)]
    Diff(#[from] DiffError),
}
