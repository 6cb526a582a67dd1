//! Client wrapper normalising provider conventions.
//!
//! Gets return `None` for absent resources, mutations wait for their
//! asynchronous operation, patches treat "not modified" as success and
//! deletes treat "not found" as success.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::diff::{BucketPatch, FirewallPatch, NetworkPatch, RouterPatch, SubnetPatch};
use crate::resources::{
    Address, Bucket, Firewall, Network, Route, Router, ServiceAccount, Subnetwork,
};

use super::{ApiError, ApiFuture, ClientError, CloudApi, Operation};

/// Default delay between operation polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Default upper bound for a single operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Polling parameters for asynchronous operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct WaitOptions {
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Maximum time to wait for one operation.
    pub operation_timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

/// Run-scoped handle on the remote API.
pub struct Client<A> {
    api: Arc<A>,
    wait: WaitOptions,
    cancel: CancellationToken,
}

impl<A> Clone for Client<A> {
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            wait: self.wait,
            cancel: self.cancel.clone(),
        }
    }
}

fn found<T>(result: Result<T, ApiError>) -> Result<Option<T>, ClientError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn request_id() -> String {
    Uuid::new_v4().to_string()
}

impl<A: CloudApi> Client<A> {
    /// Creates a client bound to a run's cancellation token.
    #[must_use]
    pub const fn new(api: Arc<A>, wait: WaitOptions, cancel: CancellationToken) -> Self {
        Self { api, wait, cancel }
    }

    /// Returns the cancellation token shared by the run.
    #[must_use]
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Polls `operation` until it is done.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::OperationFailed`] when the operation finishes
    /// with an error, [`ClientError::OperationTimeout`] once the wait
    /// exceeds the configured timeout and [`ClientError::Cancelled`] as soon
    /// as the run is cancelled.
    pub async fn wait_for(&self, operation: Operation) -> Result<(), ClientError> {
        let deadline = Instant::now() + self.wait.operation_timeout;
        let mut current = operation;
        loop {
            if current.is_done() {
                return match current.error {
                    Some(message) => Err(ClientError::OperationFailed {
                        operation: current.name,
                        message,
                    }),
                    None => Ok(()),
                };
            }
            if Instant::now() > deadline {
                return Err(ClientError::OperationTimeout {
                    operation: current.name,
                });
            }
            debug!(operation = %current.name, "waiting for operation");
            let name = current.name.clone();
            let refresh = async {
                sleep(self.wait.poll_interval).await;
                self.api.get_operation(&current).await
            };
            current = tokio::select! {
                () = self.cancel.cancelled() => {
                    return Err(ClientError::Cancelled { operation: name });
                }
                refreshed = refresh => refreshed?,
            };
        }
    }

    async fn run(&self, call: ApiFuture<'_, Operation>) -> Result<(), ClientError> {
        let operation = call.await?;
        self.wait_for(operation).await
    }

    async fn run_patch(&self, call: ApiFuture<'_, Operation>) -> Result<(), ClientError> {
        match call.await {
            Ok(operation) => self.wait_for(operation).await,
            Err(err) if err.is_not_modified() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn run_delete(&self, call: ApiFuture<'_, Operation>) -> Result<(), ClientError> {
        match call.await {
            Ok(operation) => self.wait_for(operation).await,
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Fetches a network, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Api`] for failures other than absence.
    pub async fn get_network(&self, name: &str) -> Result<Option<Network>, ClientError> {
        found(self.api.get_network(name).await)
    }

    /// Inserts a network and waits for completion.
    ///
    /// # Errors
    ///
    /// Propagates remote and operation failures.
    pub async fn insert_network(&self, network: &Network) -> Result<(), ClientError> {
        let id = request_id();
        self.run(self.api.insert_network(network, &id)).await
    }

    /// Patches a network and waits for completion.
    ///
    /// # Errors
    ///
    /// Propagates remote and operation failures.
    pub async fn patch_network(&self, name: &str, patch: &NetworkPatch) -> Result<(), ClientError> {
        self.run_patch(self.api.patch_network(name, patch)).await
    }

    /// Deletes a network; an absent network counts as deleted.
    ///
    /// # Errors
    ///
    /// Propagates remote and operation failures.
    pub async fn delete_network(&self, name: &str) -> Result<(), ClientError> {
        self.run_delete(self.api.delete_network(name)).await
    }

    /// Fetches a subnetwork, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Api`] for failures other than absence.
    pub async fn get_subnetwork(
        &self,
        region: &str,
        name: &str,
    ) -> Result<Option<Subnetwork>, ClientError> {
        found(self.api.get_subnetwork(region, name).await)
    }

    /// Inserts a subnetwork and waits for completion.
    ///
    /// # Errors
    ///
    /// Propagates remote and operation failures.
    pub async fn insert_subnetwork(&self, subnet: &Subnetwork) -> Result<(), ClientError> {
        let id = request_id();
        self.run(self.api.insert_subnetwork(subnet, &id)).await
    }

    /// Expands a subnetwork's range and waits for completion.
    ///
    /// # Errors
    ///
    /// Propagates remote and operation failures.
    pub async fn expand_subnetwork_range(
        &self,
        region: &str,
        name: &str,
        ip_cidr_range: &str,
    ) -> Result<(), ClientError> {
        self.run(self.api.expand_subnetwork_range(region, name, ip_cidr_range))
            .await
    }

    /// Patches a subnetwork and waits for completion.
    ///
    /// # Errors
    ///
    /// Propagates remote and operation failures.
    pub async fn patch_subnetwork(
        &self,
        region: &str,
        name: &str,
        patch: &SubnetPatch,
        fingerprint: &str,
    ) -> Result<(), ClientError> {
        self.run_patch(self.api.patch_subnetwork(region, name, patch, fingerprint))
            .await
    }

    /// Deletes a subnetwork; an absent subnetwork counts as deleted.
    ///
    /// # Errors
    ///
    /// Propagates remote and operation failures.
    pub async fn delete_subnetwork(&self, region: &str, name: &str) -> Result<(), ClientError> {
        self.run_delete(self.api.delete_subnetwork(region, name))
            .await
    }

    /// Fetches a router, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Api`] for failures other than absence.
    pub async fn get_router(&self, region: &str, name: &str) -> Result<Option<Router>, ClientError> {
        found(self.api.get_router(region, name).await)
    }

    /// Inserts a router and waits for completion.
    ///
    /// # Errors
    ///
    /// Propagates remote and operation failures.
    pub async fn insert_router(&self, router: &Router) -> Result<(), ClientError> {
        let id = request_id();
        self.run(self.api.insert_router(router, &id)).await
    }

    /// Patches a router and waits for completion.
    ///
    /// # Errors
    ///
    /// Propagates remote and operation failures.
    pub async fn patch_router(
        &self,
        region: &str,
        name: &str,
        patch: &RouterPatch,
    ) -> Result<(), ClientError> {
        self.run_patch(self.api.patch_router(region, name, patch))
            .await
    }

    /// Deletes a router; an absent router counts as deleted.
    ///
    /// # Errors
    ///
    /// Propagates remote and operation failures.
    pub async fn delete_router(&self, region: &str, name: &str) -> Result<(), ClientError> {
        self.run_delete(self.api.delete_router(region, name)).await
    }

    /// Fetches a firewall rule, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Api`] for failures other than absence.
    pub async fn get_firewall(&self, name: &str) -> Result<Option<Firewall>, ClientError> {
        found(self.api.get_firewall(name).await)
    }

    /// Lists firewall rules matching `filter` on the server and `keep`
    /// locally.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn list_firewalls_matching<P>(
        &self,
        filter: &str,
        keep: P,
    ) -> Result<Vec<Firewall>, ClientError>
    where
        P: Fn(&Firewall) -> bool,
    {
        let firewalls = self.api.list_firewalls(filter).await?;
        Ok(firewalls.into_iter().filter(|rule| keep(rule)).collect())
    }

    /// Inserts a firewall rule and waits for completion.
    ///
    /// # Errors
    ///
    /// Propagates remote and operation failures.
    pub async fn insert_firewall(&self, firewall: &Firewall) -> Result<(), ClientError> {
        let id = request_id();
        self.run(self.api.insert_firewall(firewall, &id)).await
    }

    /// Patches a firewall rule and waits for completion.
    ///
    /// # Errors
    ///
    /// Propagates remote and operation failures.
    pub async fn patch_firewall(
        &self,
        name: &str,
        patch: &FirewallPatch,
    ) -> Result<(), ClientError> {
        self.run_patch(self.api.patch_firewall(name, patch)).await
    }

    /// Deletes a firewall rule; an absent rule counts as deleted.
    ///
    /// # Errors
    ///
    /// Propagates remote and operation failures.
    pub async fn delete_firewall(&self, name: &str) -> Result<(), ClientError> {
        self.run_delete(self.api.delete_firewall(name)).await
    }

    /// Lists routes matching `filter` on the server and `keep` locally.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn list_routes_matching<P>(
        &self,
        filter: &str,
        keep: P,
    ) -> Result<Vec<Route>, ClientError>
    where
        P: Fn(&Route) -> bool,
    {
        let routes = self.api.list_routes(filter).await?;
        Ok(routes.into_iter().filter(|route| keep(route)).collect())
    }

    /// Deletes a route; an absent route counts as deleted.
    ///
    /// # Errors
    ///
    /// Propagates remote and operation failures.
    pub async fn delete_route(&self, name: &str) -> Result<(), ClientError> {
        self.run_delete(self.api.delete_route(name)).await
    }

    /// Fetches an external address, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Api`] for failures other than absence.
    pub async fn get_address(&self, region: &str, name: &str) -> Result<Option<Address>, ClientError> {
        found(self.api.get_address(region, name).await)
    }

    /// Fetches a service account, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Api`] for failures other than absence.
    pub async fn get_service_account(
        &self,
        project_id: &str,
        email: &str,
    ) -> Result<Option<ServiceAccount>, ClientError> {
        found(self.api.get_service_account(project_id, email).await)
    }

    /// Creates a service account.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn create_service_account(
        &self,
        project_id: &str,
        account_id: &str,
        display_name: &str,
    ) -> Result<ServiceAccount, ClientError> {
        Ok(self
            .api
            .create_service_account(project_id, account_id, display_name)
            .await?)
    }

    /// Deletes a service account; an absent account counts as deleted.
    ///
    /// # Errors
    ///
    /// Propagates remote failures other than absence.
    pub async fn delete_service_account(
        &self,
        project_id: &str,
        email: &str,
    ) -> Result<(), ClientError> {
        match self.api.delete_service_account(project_id, email).await {
            Err(err) if !err.is_not_found() => Err(err.into()),
            Ok(()) | Err(_) => Ok(()),
        }
    }

    /// Fetches a bucket, `None` when absent.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Api`] for failures other than absence.
    pub async fn get_bucket(&self, name: &str) -> Result<Option<Bucket>, ClientError> {
        found(self.api.get_bucket(name).await)
    }

    /// Creates a bucket.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn insert_bucket(&self, project_id: &str, bucket: &Bucket) -> Result<Bucket, ClientError> {
        Ok(self.api.insert_bucket(project_id, bucket).await?)
    }

    /// Patches a bucket.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn patch_bucket(
        &self,
        name: &str,
        patch: &BucketPatch,
        metageneration: i64,
    ) -> Result<Bucket, ClientError> {
        Ok(self.api.patch_bucket(name, patch, metageneration).await?)
    }

    /// Deletes a bucket; an absent bucket counts as deleted.
    ///
    /// # Errors
    ///
    /// Propagates remote failures other than absence.
    pub async fn delete_bucket(&self, name: &str) -> Result<(), ClientError> {
        match self.api.delete_bucket(name).await {
            Err(err) if !err.is_not_found() => Err(err.into()),
            Ok(()) | Err(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ErrorCode;
    use crate::test_support::FakeCloud;
    use rstest::{fixture, rstest};

    fn fast_wait() -> WaitOptions {
        WaitOptions {
            poll_interval: Duration::from_millis(1),
            operation_timeout: Duration::from_secs(5),
        }
    }

    #[fixture]
    fn cloud() -> Arc<FakeCloud> {
        Arc::new(FakeCloud::new())
    }

    fn client(cloud: &Arc<FakeCloud>) -> Client<FakeCloud> {
        Client::new(Arc::clone(cloud), fast_wait(), CancellationToken::new())
    }

    fn network() -> Network {
        Network {
            name: String::from("shoot"),
            ..Network::default()
        }
    }

    #[rstest]
    #[tokio::test]
    async fn absent_resource_is_none(cloud: Arc<FakeCloud>) {
        let found = client(&cloud).get_network("shoot").await.expect("get");
        assert_eq!(found, None);
    }

    #[rstest]
    #[tokio::test]
    async fn insert_waits_until_operation_is_done(cloud: Arc<FakeCloud>) {
        cloud.set_operation_polls(3);
        client(&cloud)
            .insert_network(&network())
            .await
            .expect("insert");

        assert_eq!(cloud.calls("get_operation"), 3);
        assert!(cloud.network("shoot").is_some());
    }

    #[rstest]
    #[tokio::test]
    async fn failed_operation_surfaces_its_message(cloud: Arc<FakeCloud>) {
        cloud.fail_operation("insert_network", "quota exceeded");
        let err = client(&cloud)
            .insert_network(&network())
            .await
            .expect_err("operation fails");
        assert!(
            matches!(&err, ClientError::OperationFailed { message, .. } if message == "quota exceeded"),
            "{err}"
        );
    }

    #[rstest]
    #[tokio::test]
    async fn operation_wait_times_out(cloud: Arc<FakeCloud>) {
        cloud.set_operation_polls(u32::MAX);
        let wait = WaitOptions {
            poll_interval: Duration::from_millis(1),
            operation_timeout: Duration::from_millis(20),
        };
        let err = Client::new(Arc::clone(&cloud), wait, CancellationToken::new())
            .insert_network(&network())
            .await
            .expect_err("operation never finishes");
        assert!(matches!(err, ClientError::OperationTimeout { .. }), "{err}");
    }

    #[rstest]
    #[tokio::test]
    async fn cancellation_aborts_polling_promptly(cloud: Arc<FakeCloud>) {
        cloud.set_operation_polls(u32::MAX);
        let cancel = CancellationToken::new();
        let wait = WaitOptions {
            poll_interval: Duration::from_secs(60),
            operation_timeout: Duration::from_secs(600),
        };
        let client = Client::new(Arc::clone(&cloud), wait, cancel.clone());

        let started = Instant::now();
        let pending = tokio::spawn(async move { client.insert_network(&network()).await });
        cancel.cancel();
        let err = pending
            .await
            .expect("task joins")
            .expect_err("wait is cancelled");

        assert!(matches!(err, ClientError::Cancelled { .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[rstest]
    #[tokio::test]
    async fn cancellation_interrupts_a_hung_refresh(cloud: Arc<FakeCloud>) {
        cloud.set_operation_polls(2);
        cloud.hang_operation_polls();
        let cancel = CancellationToken::new();
        let client = Client::new(Arc::clone(&cloud), fast_wait(), cancel.clone());

        let pending = tokio::spawn(async move { client.insert_network(&network()).await });
        while cloud.calls("get_operation") == 0 {
            sleep(Duration::from_millis(1)).await;
        }
        cancel.cancel();
        let err = tokio::time::timeout(Duration::from_secs(5), pending)
            .await
            .expect("wait ends once cancelled")
            .expect("task joins")
            .expect_err("wait is cancelled");

        assert!(matches!(err, ClientError::Cancelled { .. }), "{err}");
        assert_eq!(cloud.calls("get_operation"), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn not_modified_patch_is_success(cloud: Arc<FakeCloud>) {
        cloud.fail(
            "patch_network",
            ApiError::new(ErrorCode::NotModified, "no change"),
        );
        client(&cloud)
            .patch_network("shoot", &NetworkPatch::default())
            .await
            .expect("not modified is success");
    }

    #[rstest]
    #[tokio::test]
    async fn deleting_absent_resources_succeeds(cloud: Arc<FakeCloud>) {
        let client = client(&cloud);
        client.delete_network("shoot").await.expect("network");
        client.delete_firewall("shoot-rule").await.expect("firewall");
        client.delete_bucket("shoot-backup").await.expect("bucket");
        client
            .delete_service_account("project", "shoot@project.iam.gserviceaccount.com")
            .await
            .expect("service account");
    }

    #[rstest]
    #[tokio::test]
    async fn other_errors_are_propagated(cloud: Arc<FakeCloud>) {
        cloud.fail("get_network", ApiError::from_status(403, "denied"));
        let err = client(&cloud)
            .get_network("shoot")
            .await
            .expect_err("permission error");
        assert!(
            matches!(&err, ClientError::Api(api) if api.code == ErrorCode::PermissionDenied),
            "{err}"
        );
    }

    #[rstest]
    #[tokio::test]
    async fn list_applies_client_side_predicate(cloud: Arc<FakeCloud>) {
        for name in ["shoot-a", "shoot-b", "other"] {
            cloud.seed_firewall(Firewall {
                name: name.to_owned(),
                network: String::from("shoot"),
                ..Firewall::default()
            });
        }
        let kept = client(&cloud)
            .list_firewalls_matching("network = shoot", |rule| rule.name.starts_with("shoot-"))
            .await
            .expect("list");
        let names: Vec<_> = kept.iter().map(|rule| rule.name.as_str()).collect();
        assert_eq!(names, vec!["shoot-a", "shoot-b"]);
    }
}
