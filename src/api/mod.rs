//! Remote API boundary.
//!
//! The provider's client libraries are external collaborators. This module
//! describes the calls the engine needs as object-safe traits returning boxed
//! futures, and wraps them in a [`Client`] that hides the provider's
//! asynchronous operations and status-code conventions from the Ensure
//! operations.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use crate::diff::{BucketPatch, FirewallPatch, NetworkPatch, RouterPatch, SubnetPatch};
use crate::resources::{
    Address, Bucket, Firewall, Network, Route, Router, ServiceAccount, Subnetwork,
};

mod client;
mod error;

pub use client::{Client, WaitOptions};
pub use error::{ApiError, ClientError, ErrorCode};

/// Future returned by remote API calls.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + Send + 'a>>;

/// Progress of an asynchronous remote operation.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationStatus {
    /// Accepted but not started.
    #[default]
    Pending,
    /// In progress.
    Running,
    /// Finished, successfully or not.
    Done,
}

/// Handle of an asynchronous remote operation.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Operation {
    /// Operation name.
    pub name: String,
    /// Region for regional operations, `None` for global ones.
    pub region: Option<String>,
    /// Current progress.
    pub status: OperationStatus,
    /// Error message once a failed operation is done.
    pub error: Option<String>,
}

impl Operation {
    /// Returns `true` once the operation reached a terminal state.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status == OperationStatus::Done
    }
}

/// Compute calls: networks, subnetworks, routers, firewalls, routes,
/// addresses and operations.
pub trait ComputeApi: Send + Sync {
    /// Fetches a network.
    fn get_network<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Network>;
    /// Starts inserting a network.
    fn insert_network<'a>(
        &'a self,
        network: &'a Network,
        request_id: &'a str,
    ) -> ApiFuture<'a, Operation>;
    /// Starts patching a network.
    fn patch_network<'a>(
        &'a self,
        name: &'a str,
        patch: &'a NetworkPatch,
    ) -> ApiFuture<'a, Operation>;
    /// Starts deleting a network.
    fn delete_network<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Operation>;

    /// Fetches a subnetwork.
    fn get_subnetwork<'a>(&'a self, region: &'a str, name: &'a str)
    -> ApiFuture<'a, Subnetwork>;
    /// Starts inserting a subnetwork.
    fn insert_subnetwork<'a>(
        &'a self,
        subnet: &'a Subnetwork,
        request_id: &'a str,
    ) -> ApiFuture<'a, Operation>;
    /// Starts expanding a subnetwork's primary range.
    fn expand_subnetwork_range<'a>(
        &'a self,
        region: &'a str,
        name: &'a str,
        ip_cidr_range: &'a str,
    ) -> ApiFuture<'a, Operation>;
    /// Starts patching a subnetwork; `fingerprint` guards against lost updates.
    fn patch_subnetwork<'a>(
        &'a self,
        region: &'a str,
        name: &'a str,
        patch: &'a SubnetPatch,
        fingerprint: &'a str,
    ) -> ApiFuture<'a, Operation>;
    /// Starts deleting a subnetwork.
    fn delete_subnetwork<'a>(&'a self, region: &'a str, name: &'a str)
    -> ApiFuture<'a, Operation>;

    /// Fetches a router.
    fn get_router<'a>(&'a self, region: &'a str, name: &'a str) -> ApiFuture<'a, Router>;
    /// Starts inserting a router.
    fn insert_router<'a>(
        &'a self,
        router: &'a Router,
        request_id: &'a str,
    ) -> ApiFuture<'a, Operation>;
    /// Starts patching a router.
    fn patch_router<'a>(
        &'a self,
        region: &'a str,
        name: &'a str,
        patch: &'a RouterPatch,
    ) -> ApiFuture<'a, Operation>;
    /// Starts deleting a router.
    fn delete_router<'a>(&'a self, region: &'a str, name: &'a str) -> ApiFuture<'a, Operation>;

    /// Fetches a firewall rule.
    fn get_firewall<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Firewall>;
    /// Lists firewall rules matching a server-side filter expression.
    fn list_firewalls<'a>(&'a self, filter: &'a str) -> ApiFuture<'a, Vec<Firewall>>;
    /// Starts inserting a firewall rule.
    fn insert_firewall<'a>(
        &'a self,
        firewall: &'a Firewall,
        request_id: &'a str,
    ) -> ApiFuture<'a, Operation>;
    /// Starts patching a firewall rule.
    fn patch_firewall<'a>(
        &'a self,
        name: &'a str,
        patch: &'a FirewallPatch,
    ) -> ApiFuture<'a, Operation>;
    /// Starts deleting a firewall rule.
    fn delete_firewall<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Operation>;

    /// Lists routes matching a server-side filter expression.
    fn list_routes<'a>(&'a self, filter: &'a str) -> ApiFuture<'a, Vec<Route>>;
    /// Starts deleting a route.
    fn delete_route<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Operation>;

    /// Fetches a regional external address.
    fn get_address<'a>(&'a self, region: &'a str, name: &'a str) -> ApiFuture<'a, Address>;

    /// Refreshes an operation's progress.
    fn get_operation<'a>(&'a self, operation: &'a Operation) -> ApiFuture<'a, Operation>;
}

/// Identity calls.
pub trait IamApi: Send + Sync {
    /// Fetches a service account by email.
    fn get_service_account<'a>(
        &'a self,
        project_id: &'a str,
        email: &'a str,
    ) -> ApiFuture<'a, ServiceAccount>;
    /// Creates a service account. Identity calls complete synchronously.
    fn create_service_account<'a>(
        &'a self,
        project_id: &'a str,
        account_id: &'a str,
        display_name: &'a str,
    ) -> ApiFuture<'a, ServiceAccount>;
    /// Deletes a service account.
    fn delete_service_account<'a>(
        &'a self,
        project_id: &'a str,
        email: &'a str,
    ) -> ApiFuture<'a, ()>;
}

/// Object storage calls.
pub trait StorageApi: Send + Sync {
    /// Fetches a bucket.
    fn get_bucket<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Bucket>;
    /// Creates a bucket in a project.
    fn insert_bucket<'a>(&'a self, project_id: &'a str, bucket: &'a Bucket)
    -> ApiFuture<'a, Bucket>;
    /// Patches a bucket guarded by its metadata generation.
    fn patch_bucket<'a>(
        &'a self,
        name: &'a str,
        patch: &'a BucketPatch,
        metageneration: i64,
    ) -> ApiFuture<'a, Bucket>;
    /// Deletes an empty bucket.
    fn delete_bucket<'a>(&'a self, name: &'a str) -> ApiFuture<'a, ()>;
}

/// Everything the engine needs from the provider.
pub trait CloudApi: ComputeApi + IamApi + StorageApi {}

impl<T: ComputeApi + IamApi + StorageApi> CloudApi for T {}
