//! Error types for graph compilation and execution.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::state::StateError;

/// Errors raised while compiling a graph.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GraphError {
    /// Raised when the dependency edges form a cycle.
    #[error("flow {flow}: dependency cycle through task {task}")]
    Cycle {
        /// Flow name.
        flow: String,
        /// A task on the cycle.
        task: String,
    },
    /// Raised when two tasks share a name.
    #[error("flow {flow}: duplicate task {task}")]
    DuplicateTask {
        /// Flow name.
        flow: String,
        /// Duplicated name.
        task: String,
    },
    /// Raised when a task depends on an id from another graph.
    #[error("flow {flow}: task {task} depends on an unknown task")]
    UnknownDependency {
        /// Flow name.
        flow: String,
        /// Task declaring the dependency.
        task: String,
    },
}

/// Why a task failed.
#[derive(Debug, Error)]
pub enum TaskFailureKind<E: std::error::Error + 'static> {
    /// The task returned an error; shown unmodified.
    #[error(transparent)]
    Error(E),
    /// The task exceeded its timeout.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    /// The run was cancelled while the task was running.
    #[error("cancelled")]
    Cancelled,
}

/// A failed task. A task error displays unmodified; timeouts and
/// cancellations name the task.
#[derive(Debug)]
pub struct TaskFailure<E: std::error::Error + 'static> {
    /// Task name.
    pub task: String,
    /// Failure cause.
    pub kind: TaskFailureKind<E>,
}

impl<E: std::error::Error + 'static> fmt::Display for TaskFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TaskFailureKind::Error(err) => fmt::Display::fmt(err, f),
            TaskFailureKind::TimedOut(_) | TaskFailureKind::Cancelled => {
                write!(f, "task {} {}", self.task, self.kind)
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for TaskFailure<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            TaskFailureKind::Error(err) => err.source(),
            TaskFailureKind::TimedOut(_) | TaskFailureKind::Cancelled => None,
        }
    }
}

impl<E: std::error::Error + 'static> TaskFailure<E> {
    /// Returns the task's own error, if it returned one.
    #[must_use]
    pub const fn error(&self) -> Option<&E> {
        match &self.kind {
            TaskFailureKind::Error(err) => Some(err),
            TaskFailureKind::TimedOut(_) | TaskFailureKind::Cancelled => None,
        }
    }
}

/// Errors raised while executing a plan.
#[derive(Debug, Error)]
pub enum FlowError<E: std::error::Error + 'static> {
    /// One or more tasks failed; the first entry is the root cause.
    #[error("flow {flow}: {} task(s) failed", failures.len())]
    Failed {
        /// Flow name.
        flow: String,
        /// Failures in completion order.
        failures: Vec<TaskFailure<E>>,
    },
    /// Raised when intermediate state could not be persisted.
    #[error("flow {flow}: {source}")]
    Persist {
        /// Flow name.
        flow: String,
        /// Writer failure.
        #[source]
        source: StateError,
    },
}
