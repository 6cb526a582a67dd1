//! Errors surfaced by a reconciliation run.

use thiserror::Error;

use crate::config::ConfigError;
use crate::flow::{FlowError, GraphError, TaskFailure};
use crate::infraflow::EnsureError;
use crate::state::StateError;

/// Errors raised by [`super::Reconciler`].
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Raised when the desired configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Raised when a graph does not compile.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// Raised when a task failed. Displays the root cause unchanged.
    #[error("{root}")]
    Task {
        /// Flow the task belongs to.
        flow: String,
        /// First failure of the run.
        root: Box<TaskFailure<EnsureError>>,
        /// Tasks that failed while the root cause was being handled.
        also_failed: Vec<String>,
    },
    /// Raised when a flow failed without recording a cause.
    #[error("flow {flow} failed")]
    Aborted {
        /// Flow name.
        flow: String,
    },
    /// Raised when state or status could not be written.
    #[error("persisting run results failed: {source}")]
    Persist {
        /// Writer failure.
        #[from]
        source: StateError,
    },
}

impl ReconcileError {
    /// Unwraps the executor's failure aggregation, keeping the first
    /// failure as the root cause.
    #[must_use]
    pub fn from_flow(err: FlowError<EnsureError>) -> Self {
        match err {
            FlowError::Failed { flow, failures } => {
                let mut remaining = failures.into_iter();
                match remaining.next() {
                    Some(root) => Self::Task {
                        flow,
                        root: Box::new(root),
                        also_failed: remaining.map(|failure| failure.task).collect(),
                    },
                    None => Self::Aborted { flow },
                }
            }
            FlowError::Persist { source, .. } => Self::Persist { source },
        }
    }

    /// Name of the task that caused the failure, if a task did.
    #[must_use]
    pub fn failed_task(&self) -> Option<&str> {
        match self {
            Self::Task { root, .. } => Some(root.task.as_str()),
            Self::Config(_)
            | Self::Graph(_)
            | Self::Aborted { .. }
            | Self::Persist { .. } => None,
        }
    }

    /// The task's own error, when the root cause is one.
    #[must_use]
    pub fn ensure_error(&self) -> Option<&EnsureError> {
        match self {
            Self::Task { root, .. } => root.error(),
            Self::Config(_)
            | Self::Graph(_)
            | Self::Aborted { .. }
            | Self::Persist { .. } => None,
        }
    }
}
