//! Reconciliation entry points.
//!
//! A [`Reconciler`] owns the remote API, the control-plane writer and the
//! engine options. Each call restores the whiteboard from the previous
//! persisted state, runs the reconcile or delete graph and writes the
//! resulting state and status back.

mod checkpoint;
mod error;
mod status;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, info_span, warn};

use crate::api::{Client, CloudApi};
use crate::config::{EngineOptions, InfrastructureConfig};
use crate::flow::{Executor, Graph, RunSummary};
use crate::infraflow::{EnsureError, FlowContext, keys};
use crate::state::{InfrastructureStatus, PersistedState, RouteEntry, StateWriter};
use crate::whiteboard::Whiteboard;

use checkpoint::Checkpoint;
pub use error::ReconcileError;

/// Result of a completed run.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Tasks that ran or were skipped.
    pub summary: RunSummary,
    /// Status written to the control plane.
    pub status: InfrastructureStatus,
    /// Persisted state written to the control plane.
    pub state: PersistedState,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Mode {
    Reconcile,
    Delete,
}

/// Runs reconcile and delete flows against a remote API.
#[derive(Debug)]
pub struct Reconciler<A, W> {
    api: Arc<A>,
    writer: Arc<W>,
    options: EngineOptions,
}

impl<A, W> Reconciler<A, W>
where
    A: CloudApi + 'static,
    W: StateWriter,
{
    /// Creates a reconciler.
    #[must_use]
    pub const fn new(api: Arc<A>, writer: Arc<W>, options: EngineOptions) -> Self {
        Self {
            api,
            writer,
            options,
        }
    }

    /// Engine options the reconciler was built with.
    #[must_use]
    pub const fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Converges the remote infrastructure towards `config`.
    ///
    /// `previous` is the state written by an earlier run; tasks it records
    /// as complete find their resources and leave them untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Config`] for invalid configuration,
    /// [`ReconcileError::Task`] carrying the root cause when a task fails
    /// and [`ReconcileError::Persist`] when state cannot be written.
    pub async fn reconcile(
        &self,
        config: &InfrastructureConfig,
        previous: Option<PersistedState>,
        cancel: &CancellationToken,
    ) -> Result<RunReport, ReconcileError> {
        let span = info_span!("reconcile", cluster = %config.cluster_name);
        async {
            config.validate()?;
            let (board, routes) = restore(previous);
            self.run(Mode::Reconcile, config, board, routes, cancel)
                .await
        }
        .instrument(span)
        .await
    }

    /// Tears down everything earlier runs created.
    ///
    /// Returns `Ok(None)` without contacting the remote API when `previous`
    /// carries no record of created resources.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Reconciler::reconcile`].
    pub async fn delete(
        &self,
        config: &InfrastructureConfig,
        previous: Option<PersistedState>,
        cancel: &CancellationToken,
    ) -> Result<Option<RunReport>, ReconcileError> {
        let span = info_span!("delete", cluster = %config.cluster_name);
        async {
            config.validate()?;
            let (board, routes) = restore(previous);
            if board.get(keys::RESOURCES_EXIST).as_deref() != Some("true") {
                info!("no resources were created, skipping deletion");
                return Ok(None);
            }
            self.run(Mode::Delete, config, board, routes, cancel)
                .await
                .map(Some)
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        mode: Mode,
        config: &InfrastructureConfig,
        board: Whiteboard,
        routes: Vec<RouteEntry>,
        cancel: &CancellationToken,
    ) -> Result<RunReport, ReconcileError> {
        let token = cancel.child_token();
        let client = Client::new(
            Arc::clone(&self.api),
            self.options.wait_options(),
            token.clone(),
        );
        let flow = FlowContext::new(
            client,
            Arc::new(config.clone()),
            board.clone(),
            routes.clone(),
        );
        let graph: Graph<EnsureError> = match mode {
            Mode::Reconcile => flow.reconcile_graph(),
            Mode::Delete => flow.delete_graph(),
        };
        let plan = graph.compile()?;

        let checkpoint = Checkpoint::new(self.writer.as_ref(), board.clone(), routes);
        let executor = Executor::new(token).with_default_timeout(self.options.task_timeout());
        let outcome = executor.run(&plan, &checkpoint).await;
        let status = status::collect(&board);

        match outcome {
            Ok(summary) => {
                if mode == Mode::Delete {
                    board.delete(keys::RESOURCES_EXIST);
                }
                let state = checkpoint.snapshot();
                self.writer.write_state(&state).await?;
                self.writer.write_status(&status).await?;
                info!(
                    succeeded = summary.succeeded.len(),
                    skipped = summary.skipped.len(),
                    "run complete"
                );
                Ok(RunReport {
                    summary,
                    status,
                    state,
                })
            }
            Err(err) => {
                if let Err(write_err) = self.writer.write_status(&status).await {
                    warn!(error = %write_err, "failed to write status after failed run");
                }
                Err(ReconcileError::from_flow(err))
            }
        }
    }
}

/// Rebuilds the whiteboard from persisted state. State carrying foreign
/// markers is ignored.
fn restore(previous: Option<PersistedState>) -> (Whiteboard, Vec<RouteEntry>) {
    match previous {
        Some(state) if state.is_current() => (Whiteboard::from_flat(&state.data), state.routes),
        Some(state) => {
            warn!(
                kind = %state.kind,
                api_version = %state.api_version,
                "ignoring persisted state with unexpected markers"
            );
            (Whiteboard::new(), Vec::new())
        }
        None => (Whiteboard::new(), Vec::new()),
    }
}
