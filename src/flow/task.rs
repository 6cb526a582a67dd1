//! Task definitions.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

/// Future produced by a task function.
pub type TaskFuture<E> = BoxFuture<'static, Result<(), E>>;

/// Shared task function.
pub type TaskFn<E> = Arc<dyn Fn(TaskContext) -> TaskFuture<E> + Send + Sync>;

/// Identifier of a task within one graph.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TaskId(pub(crate) usize);

/// Context handed to a running task.
#[derive(Clone, Debug)]
pub struct TaskContext {
    /// Name of the flow the task belongs to.
    pub flow: String,
    /// Name of the task.
    pub task: String,
    /// Cancellation signal of the run.
    pub cancel: CancellationToken,
}

/// Immutable unit of work.
pub struct Task<E> {
    pub(crate) name: String,
    pub(crate) func: TaskFn<E>,
    pub(crate) dependencies: Vec<TaskId>,
    pub(crate) skip: bool,
    pub(crate) timeout: Option<Duration>,
}

impl<E> fmt::Debug for Task<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("skip", &self.skip)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl<E: 'static> Task<E> {
    /// Creates a task running `func`.
    pub fn new<F, Fut>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(move |ctx| -> TaskFuture<E> { Box::pin(func(ctx)) }),
            dependencies: Vec::new(),
            skip: false,
            timeout: None,
        }
    }

    /// Adds dependencies that must succeed or be skipped first.
    #[must_use]
    pub fn depends_on(mut self, dependencies: &[TaskId]) -> Self {
        self.dependencies.extend_from_slice(dependencies);
        self
    }

    /// Marks the task as skipped when `skip` is `true`.
    #[must_use]
    pub const fn skip_if(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }

    /// Limits the task's run time.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl<E> Task<E> {
    /// Task name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` when the task is skipped.
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        self.skip
    }
}
