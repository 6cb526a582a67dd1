//! Dependency-ordered task graphs.
//!
//! A [`Graph`] is assembled from [`Task`]s with explicit dependencies, a
//! build-time skip flag and an optional timeout, then compiled into an
//! immutable [`Plan`]. Compilation rejects cycles and never touches the
//! remote API. The [`Executor`] runs a plan concurrently as far as the
//! dependency edges allow.

mod error;
mod executor;
mod graph;
mod task;

pub use error::{FlowError, GraphError, TaskFailure, TaskFailureKind};
pub use executor::{Executor, Persist, RunSummary};
pub use graph::{Graph, Plan, TaskDescription};
pub use task::{Task, TaskContext, TaskFn, TaskFuture, TaskId};
