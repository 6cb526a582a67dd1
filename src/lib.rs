//! Core library for the netforge reconciliation engine.
//!
//! The crate converges a cluster's cloud network and identity resources
//! towards a declared configuration. Each run compiles a small task graph
//! of idempotent Ensure operations, executes it against a remote API and
//! persists a versioned state envelope after every task so an interrupted
//! run resumes where it stopped. A mirrored graph tears everything down.

pub mod api;
pub mod config;
pub mod diff;
pub mod flow;
pub mod infraflow;
pub mod reconcile;
pub mod resources;
pub mod state;
pub mod test_support;
pub mod whiteboard;

pub use api::{ApiError, Client, ClientError, CloudApi, ErrorCode, WaitOptions};
pub use config::{ConfigError, EngineOptions, InfrastructureConfig};
pub use flow::{Executor, FlowError, Graph, GraphError, Plan, RunSummary, Task};
pub use infraflow::{EnsureError, FlowContext};
pub use reconcile::{ReconcileError, Reconciler, RunReport};
pub use state::{FileStateStore, InfrastructureStatus, PersistedState, StateError, StateWriter};
pub use whiteboard::Whiteboard;
