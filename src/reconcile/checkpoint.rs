//! Incremental persistence of the whiteboard's scalars.

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::debug;

use crate::flow::Persist;
use crate::state::{PersistedState, RouteEntry, StateError, StateWriter};
use crate::whiteboard::Whiteboard;

/// Writes a state envelope after every completed task. Writes are
/// serialised so concurrent completions cannot interleave.
pub(super) struct Checkpoint<'a, W> {
    writer: &'a W,
    board: Whiteboard,
    routes: Vec<RouteEntry>,
    lock: Mutex<()>,
}

impl<'a, W: StateWriter> Checkpoint<'a, W> {
    pub(super) fn new(writer: &'a W, board: Whiteboard, routes: Vec<RouteEntry>) -> Self {
        Self {
            writer,
            board,
            routes,
            lock: Mutex::new(()),
        }
    }

    pub(super) fn snapshot(&self) -> PersistedState {
        PersistedState::new(self.board.export_flat(), self.routes.clone())
    }
}

impl<W: StateWriter> Persist for Checkpoint<'_, W> {
    fn persist(&self) -> BoxFuture<'_, Result<(), StateError>> {
        Box::pin(async move {
            let _serialised = self.lock.lock().await;
            let state = self.snapshot();
            debug!(keys = state.data.len(), "persisting whiteboard");
            self.writer.write_state(&state).await
        })
    }
}
