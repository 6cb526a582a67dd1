//! Reconcile and delete graphs.
//!
//! Skip flags are derived from configuration when the graph is built and
//! never re-evaluated while it runs.

use std::future::Future;

use crate::api::CloudApi;
use crate::flow::{Graph, Task};

use super::{EnsureError, FlowContext, desired, keys};

/// Name of the graph converging the infrastructure.
pub const RECONCILE_FLOW: &str = "reconcile";
/// Name of the graph tearing the infrastructure down.
pub const DELETE_FLOW: &str = "delete";

impl<A: CloudApi + 'static> FlowContext<A> {
    fn task<F, Fut>(&self, name: &str, op: F) -> Task<EnsureError>
    where
        F: Fn(Self) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), EnsureError>> + Send + 'static,
    {
        let flow = self.clone();
        Task::new(name, move |_task| op(flow.clone()))
    }

    /// Builds the graph converging every resource of the cluster.
    #[must_use]
    pub fn reconcile_graph(&self) -> Graph<EnsureError> {
        let has_router = desired::router_name(&self.config).is_some();
        let has_addresses = !desired::nat_ip_names(&self.config).is_empty();

        let mut graph = Graph::new(RECONCILE_FLOW);
        let network = graph.add(self.task("ensure-network", |flow| async move {
            flow.ensure_network().await
        }));
        let nodes = graph.add(
            self.task("ensure-nodes-subnet", |flow| async move {
                flow.ensure_nodes_subnet().await
            })
            .depends_on(&[network]),
        );
        graph.add(
            self.task("ensure-internal-subnet", |flow| async move {
                flow.ensure_internal_subnet().await
            })
            .depends_on(&[network]),
        );
        let router = graph.add(
            self.task("ensure-router", |flow| async move {
                flow.ensure_router().await
            })
            .depends_on(&[network])
            .skip_if(!has_router),
        );
        let addresses = graph.add(
            self.task("ensure-nat-addresses", |flow| async move {
                flow.ensure_nat_addresses().await
            })
            .skip_if(!has_addresses),
        );
        graph.add(
            self.task("ensure-nat", |flow| async move { flow.ensure_nat().await })
                .depends_on(&[router, nodes, addresses])
                .skip_if(!has_router),
        );
        graph.add(
            self.task("ensure-firewall-rules", |flow| async move {
                flow.ensure_firewall_rules().await
            })
            .depends_on(&[network]),
        );
        graph.add(self.task("ensure-service-account", |flow| async move {
            flow.ensure_service_account().await
        }));
        graph.add(
            self.task("ensure-backup-bucket", |flow| async move {
                flow.ensure_backup_bucket().await
            })
            .skip_if(self.config.backup.is_none()),
        );
        graph
    }

    /// Builds the graph tearing down every resource the engine owns.
    ///
    /// The backup bucket is deleted when it is configured or was recorded
    /// by an earlier run.
    #[must_use]
    pub fn delete_graph(&self) -> Graph<EnsureError> {
        let has_router = desired::router_name(&self.config).is_some();
        let user_network = self.config.uses_existing_vpc();
        let has_bucket =
            self.config.backup.is_some() || self.ids().get(keys::BACKUP_BUCKET).is_some();

        let mut graph = Graph::new(DELETE_FLOW);
        let routes = graph.add(self.task("delete-routes", |flow| async move {
            flow.delete_routes().await
        }));
        let firewalls = graph.add(self.task("delete-firewall-rules", |flow| async move {
            flow.delete_firewall_rules().await
        }));
        let nat = graph.add(
            self.task("delete-nat", |flow| async move { flow.delete_nat().await })
                .skip_if(!has_router),
        );
        let router = graph.add(
            self.task("delete-router", |flow| async move {
                flow.delete_router().await
            })
            .depends_on(&[nat])
            .skip_if(user_network),
        );
        let subnets = graph.add(
            self.task("delete-subnets", |flow| async move {
                flow.delete_subnets().await
            })
            .depends_on(&[nat, router]),
        );
        graph.add(
            self.task("delete-network", |flow| async move {
                flow.delete_network().await
            })
            .depends_on(&[routes, firewalls, router, subnets])
            .skip_if(user_network),
        );
        graph.add(self.task("delete-service-account", |flow| async move {
            flow.delete_service_account().await
        }));
        graph.add(
            self.task("delete-backup-bucket", |flow| async move {
                flow.delete_backup_bucket().await
            })
            .skip_if(!has_bucket),
        );
        graph
    }
}
