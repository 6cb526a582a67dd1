//! Ensure and teardown operations for one cluster, and the graphs that
//! order them.
//!
//! Every operation reads its prerequisites from the [`Whiteboard`], talks to
//! the remote API through a [`Client`] and writes what it found or created
//! back under a well-known key from [`keys`]. Identifiers that must survive
//! a restart are also written as scalars under the `ids` child scope.

use std::any::Any;
use std::sync::Arc;

use crate::api::{Client, CloudApi};
use crate::config::InfrastructureConfig;
use crate::state::RouteEntry;
use crate::whiteboard::Whiteboard;

pub mod desired;
mod ensure;
mod error;
mod graphs;
mod teardown;

pub use error::EnsureError;
pub use graphs::{DELETE_FLOW, RECONCILE_FLOW};

/// Well-known whiteboard keys.
pub mod keys {
    /// Network descriptor.
    pub const NETWORK: &str = "network";
    /// Node subnet descriptor.
    pub const SUBNET_NODES: &str = "subnet-nodes";
    /// Internal subnet descriptor.
    pub const SUBNET_INTERNAL: &str = "subnet-internal";
    /// Router descriptor.
    pub const ROUTER: &str = "router";
    /// NAT gateway descriptor.
    pub const NAT: &str = "nat";
    /// External addresses of the NAT gateway.
    pub const NAT_ADDRESSES: &str = "nat-addresses";
    /// Firewall rule descriptors.
    pub const FIREWALL_RULES: &str = "firewall-rules";
    /// Service account descriptor.
    pub const SERVICE_ACCOUNT: &str = "service-account";
    /// Backup bucket descriptor.
    pub const BACKUP_BUCKET: &str = "backup-bucket";
    /// Scalar set to `true` once any owned resource exists.
    pub const RESOURCES_EXIST: &str = "resources-exist";
    /// Child scope holding persisted identifiers.
    pub const IDS: &str = "ids";
    /// Child scope holding identity values.
    pub const IDENTITY: &str = "identity";
    /// Service account email, within [`IDENTITY`].
    pub const EMAIL: &str = "email";
    /// Service account unique id, within [`IDENTITY`].
    pub const UNIQUE_ID: &str = "unique-id";
}

/// Shared state of one flow: remote client, configuration, whiteboard and
/// the routes recorded by earlier runs.
pub struct FlowContext<A> {
    client: Client<A>,
    config: Arc<InfrastructureConfig>,
    board: Whiteboard,
    routes: Arc<Vec<RouteEntry>>,
}

impl<A> Clone for FlowContext<A> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            config: Arc::clone(&self.config),
            board: self.board.clone(),
            routes: Arc::clone(&self.routes),
        }
    }
}

impl<A: CloudApi> FlowContext<A> {
    /// Creates a context for one run.
    #[must_use]
    pub fn new(
        client: Client<A>,
        config: Arc<InfrastructureConfig>,
        board: Whiteboard,
        routes: Vec<RouteEntry>,
    ) -> Self {
        Self {
            client,
            config,
            board,
            routes: Arc::new(routes),
        }
    }

    /// Whiteboard shared by the run's tasks.
    #[must_use]
    pub const fn board(&self) -> &Whiteboard {
        &self.board
    }

    /// Desired configuration.
    #[must_use]
    pub fn config(&self) -> &InfrastructureConfig {
        &self.config
    }

    fn ids(&self) -> Whiteboard {
        self.board.child(keys::IDS)
    }

    fn require<T: Any + Clone>(&self, key: &str) -> Result<T, EnsureError> {
        self.board
            .get_object(key)
            .ok_or_else(|| EnsureError::MissingPrerequisite {
                key: key.to_owned(),
            })
    }

    fn mark_resources_exist(&self) {
        self.board.set(keys::RESOURCES_EXIST, "true");
    }

    /// Stores `object` under `key` and its identifier under `ids/<key>`.
    fn store<T: Any + Send + Sync>(&self, key: &str, id: &str, object: T) {
        self.ids().set(key, id);
        self.board.set_object(key, object);
    }

    fn forget(&self, key: &str) {
        self.ids().delete(key);
        self.board.delete_object(key);
    }
}
