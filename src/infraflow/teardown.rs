//! Teardown operations. Absent resources count as deleted.

use std::collections::BTreeSet;

use tracing::info;

use crate::api::CloudApi;
use crate::diff::remove_nat;
use crate::resources::ServiceAccount;

use super::{EnsureError, FlowContext, desired, keys};

impl<A: CloudApi> FlowContext<A> {
    /// Deletes routes on the network that were recorded by an earlier run or
    /// are named `<cluster>-<uuid>`.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn delete_routes(&self) -> Result<(), EnsureError> {
        let network = desired::network_name(&self.config);
        let recorded: BTreeSet<&str> = self.routes.iter().map(|route| route.name.as_str()).collect();
        let routes = self
            .client
            .list_routes_matching(&desired::network_filter(&network), |route| {
                desired::on_network(&route.network, &network)
                    && (recorded.contains(route.name.as_str())
                        || desired::is_owned_route(&self.config, &route.name))
            })
            .await?;
        for route in routes {
            info!(route = %route.name, "deleting route");
            self.client.delete_route(&route.name).await?;
        }
        Ok(())
    }

    /// Deletes the cluster's firewall rules, including ones no longer
    /// desired.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn delete_firewall_rules(&self) -> Result<(), EnsureError> {
        let network = desired::network_name(&self.config);
        let listed = self
            .client
            .list_firewalls_matching(&desired::network_filter(&network), |rule| {
                desired::on_network(&rule.network, &network)
                    && desired::is_owned_firewall(&self.config, &rule.name)
            })
            .await?;
        let names: BTreeSet<String> = listed
            .into_iter()
            .map(|rule| rule.name)
            .chain([
                desired::internal_firewall_name(&self.config),
                desired::health_check_firewall_name(&self.config),
            ])
            .collect();
        for name in names {
            info!(firewall = %name, "deleting firewall rule");
            self.client.delete_firewall(&name).await?;
        }
        self.forget(keys::FIREWALL_RULES);
        Ok(())
    }

    /// Removes the NAT gateway from the router's gateway list.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn delete_nat(&self) -> Result<(), EnsureError> {
        if let Some(router_name) = desired::router_name(&self.config)
            && let Some(router) = self
                .client
                .get_router(&self.config.region, &router_name)
                .await?
            && let Some(patch) = remove_nat(&router, &desired::nat_name(&self.config))
        {
            info!(router = %router_name, "removing NAT gateway");
            self.client
                .patch_router(&self.config.region, &router_name, &patch)
                .await?;
        }
        self.forget(keys::NAT);
        self.forget(keys::NAT_ADDRESSES);
        Ok(())
    }

    /// Deletes the router the engine owns.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn delete_router(&self) -> Result<(), EnsureError> {
        if !self.config.uses_existing_vpc()
            && let Some(name) = desired::router_name(&self.config)
        {
            info!(router = %name, "deleting router");
            self.client.delete_router(&self.config.region, &name).await?;
        }
        self.forget(keys::ROUTER);
        Ok(())
    }

    /// Deletes the node and internal subnets.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn delete_subnets(&self) -> Result<(), EnsureError> {
        for (key, name) in [
            (keys::SUBNET_NODES, desired::nodes_subnet_name(&self.config)),
            (
                keys::SUBNET_INTERNAL,
                desired::internal_subnet_name(&self.config),
            ),
        ] {
            info!(subnet = %name, "deleting subnet");
            self.client
                .delete_subnetwork(&self.config.region, &name)
                .await?;
            self.forget(key);
        }
        Ok(())
    }

    /// Deletes the network the engine owns.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn delete_network(&self) -> Result<(), EnsureError> {
        if !self.config.uses_existing_vpc() {
            let name = desired::network_name(&self.config);
            info!(network = %name, "deleting network");
            self.client.delete_network(&name).await?;
        }
        self.forget(keys::NETWORK);
        Ok(())
    }

    /// Deletes the cluster's service account.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn delete_service_account(&self) -> Result<(), EnsureError> {
        let project = &self.config.project_id;
        let email = ServiceAccount::email_for(&desired::service_account_id(&self.config), project);
        info!(account = %email, "deleting service account");
        self.client.delete_service_account(project, &email).await?;
        let identity = self.board.child(keys::IDENTITY);
        identity.delete(keys::EMAIL);
        identity.delete(keys::UNIQUE_ID);
        self.board.delete_object(keys::SERVICE_ACCOUNT);
        Ok(())
    }

    /// Deletes the backup bucket.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn delete_backup_bucket(&self) -> Result<(), EnsureError> {
        let name = desired::backup_bucket_name(&self.config);
        info!(bucket = %name, "deleting backup bucket");
        self.client.delete_bucket(&name).await?;
        self.forget(keys::BACKUP_BUCKET);
        Ok(())
    }
}
