//! Plan execution.
//!
//! Tasks whose dependencies have all succeeded or been skipped run
//! concurrently. After every completed task the executor persists state
//! before scheduling anything else. The first failure stops scheduling;
//! running tasks are allowed to finish and their failures are collected
//! behind the root cause.

use std::collections::VecDeque;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::state::StateError;

use super::error::{FlowError, TaskFailure, TaskFailureKind};
use super::graph::Plan;
use super::task::TaskContext;

/// Checkpoint hook invoked after every completed task.
pub trait Persist: Send + Sync {
    /// Persists the current intermediate state.
    fn persist(&self) -> BoxFuture<'_, Result<(), StateError>>;
}

/// Names of the tasks that ran or were skipped in a successful run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunSummary {
    /// Tasks that ran and succeeded, in completion order.
    pub succeeded: Vec<String>,
    /// Tasks that were skipped.
    pub skipped: Vec<String>,
}

/// Runs compiled plans.
#[derive(Clone, Debug, Default)]
pub struct Executor {
    cancel: CancellationToken,
    default_timeout: Option<Duration>,
}

enum Outcome<E: std::error::Error + 'static> {
    Succeeded,
    Failed(TaskFailureKind<E>),
}

impl Executor {
    /// Creates an executor bound to a run's cancellation token.
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            default_timeout: None,
        }
    }

    /// Applies `timeout` to tasks that do not declare their own.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    /// Runs `plan`, calling `persist` after every completed task.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Failed`] with the root cause first when a task
    /// fails, times out or is cancelled, and [`FlowError::Persist`] when a
    /// checkpoint cannot be written before any task failed. Once a task has
    /// failed, checkpoint errors are logged and the running tasks still
    /// finish.
    pub async fn run<E, P>(&self, plan: &Plan<E>, persist: &P) -> Result<RunSummary, FlowError<E>>
    where
        E: std::error::Error + Send + 'static,
        P: Persist + ?Sized,
    {
        let count = plan.len();
        let mut pending = vec![0_usize; count];
        let mut dependents = vec![Vec::new(); count];
        for (index, task) in plan.tasks.iter().enumerate() {
            if let Some(slot) = pending.get_mut(index) {
                *slot = task.dependencies.len();
            }
            for dependency in &task.dependencies {
                if let Some(list) = dependents.get_mut(dependency.0) {
                    list.push(index);
                }
            }
        }

        let mut ready: VecDeque<usize> = plan
            .order
            .iter()
            .copied()
            .filter(|index| pending.get(*index).is_some_and(|left| *left == 0))
            .collect();
        let mut running = FuturesUnordered::new();
        let mut summary = RunSummary::default();
        let mut failures = Vec::new();

        info!(flow = %plan.name, tasks = count, "starting flow");
        loop {
            while failures.is_empty() {
                let Some(index) = ready.pop_front() else {
                    break;
                };
                let Some(task) = plan.task(index) else {
                    continue;
                };
                if task.skip {
                    debug!(flow = %plan.name, task = %task.name, "skipping task");
                    summary.skipped.push(task.name.clone());
                    release(index, &dependents, &mut pending, &mut ready);
                    continue;
                }
                running.push(self.start(plan, index));
            }

            let Some((index, outcome)) = running.next().await else {
                break;
            };
            let name = plan
                .task(index)
                .map(|task| task.name.clone())
                .unwrap_or_default();
            match outcome {
                Outcome::Succeeded => {
                    debug!(flow = %plan.name, task = %name, "task succeeded");
                    summary.succeeded.push(name);
                    release(index, &dependents, &mut pending, &mut ready);
                }
                Outcome::Failed(kind) => {
                    error!(flow = %plan.name, task = %name, error = %kind, "task failed");
                    failures.push(TaskFailure { task: name, kind });
                }
            }

            if let Err(source) = persist.persist().await {
                if failures.is_empty() {
                    error!(flow = %plan.name, error = %source, "failed to persist state");
                    return Err(FlowError::Persist {
                        flow: plan.name.clone(),
                        source,
                    });
                }
                warn!(
                    flow = %plan.name,
                    error = %source,
                    "failed to persist state after task failure"
                );
            }
        }

        if failures.is_empty() {
            info!(flow = %plan.name, "flow succeeded");
            return Ok(summary);
        }
        if let Err(err) = persist.persist().await {
            warn!(flow = %plan.name, error = %err, "final persist after failure did not succeed");
        }
        Err(FlowError::Failed {
            flow: plan.name.clone(),
            failures,
        })
    }

    fn start<E>(&self, plan: &Plan<E>, index: usize) -> BoxFuture<'static, (usize, Outcome<E>)>
    where
        E: std::error::Error + Send + 'static,
    {
        let Some(task) = plan.task(index) else {
            return Box::pin(async move { (index, Outcome::Succeeded) });
        };
        let ctx = TaskContext {
            flow: plan.name.clone(),
            task: task.name.clone(),
            cancel: self.cancel.clone(),
        };
        let span = info_span!("task", flow = %plan.name, task = %task.name);
        let work = (task.func)(ctx);
        let limit = task.timeout.or(self.default_timeout);
        let cancel = self.cancel.clone();

        Box::pin(
            async move {
                let guarded = async move {
                    match limit {
                        Some(duration) => match tokio::time::timeout(duration, work).await {
                            Ok(result) => result.map_err(TaskFailureKind::Error),
                            Err(_elapsed) => Err(TaskFailureKind::TimedOut(duration)),
                        },
                        None => work.await.map_err(TaskFailureKind::Error),
                    }
                };
                let outcome = tokio::select! {
                    () = cancel.cancelled() => Outcome::Failed(TaskFailureKind::Cancelled),
                    result = guarded => match result {
                        Ok(()) => Outcome::Succeeded,
                        Err(kind) => Outcome::Failed(kind),
                    },
                };
                (index, outcome)
            }
            .instrument(span),
        )
    }
}

fn release(
    index: usize,
    dependents: &[Vec<usize>],
    pending: &mut [usize],
    ready: &mut VecDeque<usize>,
) {
    let Some(waiting) = dependents.get(index) else {
        return;
    };
    for dependent in waiting {
        if let Some(left) = pending.get_mut(*dependent) {
            *left = left.saturating_sub(1);
            if *left == 0 {
                ready.push_back(*dependent);
            }
        }
    }
}
