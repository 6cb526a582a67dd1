//! Ensure operations. Each one converges a single resource kind and leaves
//! the result on the whiteboard.

use tracing::{debug, info};

use crate::api::CloudApi;
use crate::diff::{
    SubnetUpdate, bucket_patch, firewall_patch, network_patch, subnet_updates, upsert_nat,
};
use crate::resources::{Address, Firewall, Network, Router, ServiceAccount, Subnetwork};

use super::{EnsureError, FlowContext, desired, keys};

fn vanished(kind: &'static str, name: &str) -> EnsureError {
    EnsureError::Vanished {
        kind,
        name: name.to_owned(),
    }
}

impl<A: CloudApi> FlowContext<A> {
    /// Creates or updates the cluster network, or looks up the user-managed
    /// one.
    ///
    /// # Errors
    ///
    /// Returns [`EnsureError::UserManaged`] when a configured network does
    /// not exist, and propagates remote failures.
    pub async fn ensure_network(&self) -> Result<(), EnsureError> {
        let network = match &self.config.networks.vpc {
            Some(vpc) => self.client.get_network(&vpc.name).await?.ok_or_else(|| {
                EnsureError::UserManaged {
                    kind: "network",
                    name: vpc.name.clone(),
                }
            })?,
            None => {
                let network = self.converge_network().await?;
                self.mark_resources_exist();
                network
            }
        };
        let link = network.self_link.clone();
        self.store(keys::NETWORK, &link, network);
        Ok(())
    }

    async fn converge_network(&self) -> Result<Network, EnsureError> {
        let wanted = desired::network(&self.config);
        let Some(current) = self.client.get_network(&wanted.name).await? else {
            info!(network = %wanted.name, "creating network");
            self.client.insert_network(&wanted).await?;
            return self.fetch_network(&wanted.name).await;
        };
        let Some(patch) = network_patch(&current, &wanted) else {
            debug!(network = %wanted.name, "network up to date");
            return Ok(current);
        };
        info!(network = %wanted.name, "updating network");
        self.client.patch_network(&wanted.name, &patch).await?;
        self.fetch_network(&wanted.name).await
    }

    async fn fetch_network(&self, name: &str) -> Result<Network, EnsureError> {
        self.client
            .get_network(name)
            .await?
            .ok_or_else(|| vanished("network", name))
    }

    /// Creates the node subnet or converges its range, flow logs and
    /// private access.
    ///
    /// # Errors
    ///
    /// Returns [`EnsureError::MissingPrerequisite`] without a network,
    /// [`EnsureError::Diff`] for a range that cannot be expanded and
    /// propagates remote failures.
    pub async fn ensure_nodes_subnet(&self) -> Result<(), EnsureError> {
        let network: Network = self.require(keys::NETWORK)?;
        let subnet = self
            .converge_subnet(desired::nodes_subnet(&self.config, &network))
            .await?;
        self.mark_resources_exist();
        let link = subnet.self_link.clone();
        self.store(keys::SUBNET_NODES, &link, subnet);
        Ok(())
    }

    /// Creates or converges the internal subnet, or removes it once it is
    /// no longer configured.
    ///
    /// # Errors
    ///
    /// As for [`Self::ensure_nodes_subnet`].
    pub async fn ensure_internal_subnet(&self) -> Result<(), EnsureError> {
        let network: Network = self.require(keys::NETWORK)?;
        let Some(wanted) = desired::internal_subnet(&self.config, &network) else {
            let name = desired::internal_subnet_name(&self.config);
            if self.client.get_subnetwork(&self.config.region, &name).await?.is_some() {
                info!(subnet = %name, "deleting internal subnet that is no longer configured");
                self.client
                    .delete_subnetwork(&self.config.region, &name)
                    .await?;
            }
            self.forget(keys::SUBNET_INTERNAL);
            return Ok(());
        };
        let subnet = self.converge_subnet(wanted).await?;
        self.mark_resources_exist();
        let link = subnet.self_link.clone();
        self.store(keys::SUBNET_INTERNAL, &link, subnet);
        Ok(())
    }

    async fn converge_subnet(&self, wanted: Subnetwork) -> Result<Subnetwork, EnsureError> {
        let region = &wanted.region;
        let name = &wanted.name;
        let Some(current) = self.client.get_subnetwork(region, name).await? else {
            info!(subnet = %name, range = %wanted.ip_cidr_range, "creating subnet");
            self.client.insert_subnetwork(&wanted).await?;
            return self.fetch_subnet(region, name).await;
        };

        let updates = subnet_updates(&current, &wanted)?;
        if updates.is_empty() {
            debug!(subnet = %name, "subnet up to date");
        }
        let mut latest = current;
        for update in updates {
            match update {
                SubnetUpdate::ExpandRange { ip_cidr_range } => {
                    info!(subnet = %name, range = %ip_cidr_range, "expanding subnet range");
                    self.client
                        .expand_subnetwork_range(region, name, &ip_cidr_range)
                        .await?;
                }
                SubnetUpdate::Patch(patch) => {
                    info!(subnet = %name, "patching subnet");
                    self.client
                        .patch_subnetwork(region, name, &patch, &latest.fingerprint)
                        .await?;
                }
            }
            latest = self.fetch_subnet(region, name).await?;
        }
        Ok(latest)
    }

    async fn fetch_subnet(&self, region: &str, name: &str) -> Result<Subnetwork, EnsureError> {
        self.client
            .get_subnetwork(region, name)
            .await?
            .ok_or_else(|| vanished("subnet", name))
    }

    /// Creates the cluster router, or looks up the user-managed one.
    ///
    /// # Errors
    ///
    /// Returns [`EnsureError::UserManaged`] when a configured router does
    /// not exist, and propagates remote failures.
    pub async fn ensure_router(&self) -> Result<(), EnsureError> {
        let network: Network = self.require(keys::NETWORK)?;
        let region = &self.config.region;
        let router = match desired::router(&self.config, &network) {
            Some(wanted) => {
                if self.client.get_router(region, &wanted.name).await?.is_none() {
                    info!(router = %wanted.name, "creating router");
                    self.client.insert_router(&wanted).await?;
                }
                self.mark_resources_exist();
                self.fetch_router(&wanted.name).await?
            }
            None => {
                let Some(name) = desired::router_name(&self.config) else {
                    debug!("user-managed network has no router");
                    return Ok(());
                };
                self.client
                    .get_router(region, &name)
                    .await?
                    .ok_or_else(|| EnsureError::UserManaged {
                        kind: "router",
                        name: name.clone(),
                    })?
            }
        };
        let link = router.self_link.clone();
        self.store(keys::ROUTER, &link, router);
        Ok(())
    }

    async fn fetch_router(&self, name: &str) -> Result<Router, EnsureError> {
        self.client
            .get_router(&self.config.region, name)
            .await?
            .ok_or_else(|| vanished("router", name))
    }

    /// Resolves the user-managed external addresses of the NAT gateway.
    ///
    /// # Errors
    ///
    /// Returns [`EnsureError::UserManaged`] for an address that does not
    /// exist, and propagates remote failures.
    pub async fn ensure_nat_addresses(&self) -> Result<(), EnsureError> {
        let names = desired::nat_ip_names(&self.config);
        let mut addresses = Vec::with_capacity(names.len());
        for name in names {
            let address = self
                .client
                .get_address(&self.config.region, name)
                .await?
                .ok_or_else(|| EnsureError::UserManaged {
                    kind: "address",
                    name: name.clone(),
                })?;
            addresses.push(address);
        }
        let ips = addresses
            .iter()
            .map(|address| address.address.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.store(keys::NAT_ADDRESSES, &ips, addresses);
        Ok(())
    }

    /// Adds or updates the NAT gateway in the router's gateway list.
    ///
    /// # Errors
    ///
    /// Returns [`EnsureError::MissingPrerequisite`] without a router, node
    /// subnet or configured addresses, and propagates remote failures.
    pub async fn ensure_nat(&self) -> Result<(), EnsureError> {
        let router: Router = self.require(keys::ROUTER)?;
        let nodes: Subnetwork = self.require(keys::SUBNET_NODES)?;
        let addresses: Vec<Address> = if desired::nat_ip_names(&self.config).is_empty() {
            Vec::new()
        } else {
            self.require(keys::NAT_ADDRESSES)?
        };
        let wanted = desired::nat(&self.config, &nodes, &addresses);

        let current = self.fetch_router(&router.name).await?;
        let updated = match upsert_nat(&current, &wanted) {
            Some(patch) => {
                info!(router = %router.name, nat = %wanted.name, "updating NAT gateway");
                self.client
                    .patch_router(&self.config.region, &router.name, &patch)
                    .await?;
                self.fetch_router(&router.name).await?
            }
            None => {
                debug!(nat = %wanted.name, "NAT gateway up to date");
                current
            }
        };
        let nat = updated
            .nat(&wanted.name)
            .cloned()
            .ok_or_else(|| vanished("NAT gateway", &wanted.name))?;
        self.mark_resources_exist();
        self.store(keys::NAT, &wanted.name, nat);
        self.board.set_object(keys::ROUTER, updated);
        Ok(())
    }

    /// Creates or updates the cluster's firewall rules and deletes rules the
    /// engine once generated that are no longer desired.
    ///
    /// # Errors
    ///
    /// Returns [`EnsureError::MissingPrerequisite`] without a network and
    /// propagates remote failures.
    pub async fn ensure_firewall_rules(&self) -> Result<(), EnsureError> {
        let network: Network = self.require(keys::NETWORK)?;
        let wanted = desired::firewalls(&self.config, &network);
        let mut rules = Vec::with_capacity(wanted.len());
        for rule in &wanted {
            rules.push(self.converge_firewall(rule).await?);
            self.mark_resources_exist();
        }
        self.delete_stale_firewalls(&network, &wanted).await?;

        let names = rules
            .iter()
            .map(|rule| rule.name.as_str())
            .collect::<Vec<_>>()
            .join(",");
        self.store(keys::FIREWALL_RULES, &names, rules);
        Ok(())
    }

    async fn converge_firewall(&self, wanted: &Firewall) -> Result<Firewall, EnsureError> {
        match self.client.get_firewall(&wanted.name).await? {
            None => {
                info!(firewall = %wanted.name, "creating firewall rule");
                self.client.insert_firewall(wanted).await?;
            }
            Some(current) => {
                let Some(patch) = firewall_patch(&current, wanted) else {
                    debug!(firewall = %wanted.name, "firewall rule up to date");
                    return Ok(current);
                };
                info!(firewall = %wanted.name, "updating firewall rule");
                self.client.patch_firewall(&wanted.name, &patch).await?;
            }
        }
        self.client
            .get_firewall(&wanted.name)
            .await?
            .ok_or_else(|| vanished("firewall rule", &wanted.name))
    }

    async fn delete_stale_firewalls(
        &self,
        network: &Network,
        wanted: &[Firewall],
    ) -> Result<(), EnsureError> {
        let stale = self
            .client
            .list_firewalls_matching(&desired::network_filter(&network.name), |rule| {
                desired::on_network(&rule.network, &network.name)
                    && desired::is_owned_firewall(&self.config, &rule.name)
                    && wanted.iter().all(|keep| keep.name != rule.name)
            })
            .await?;
        for rule in stale {
            info!(firewall = %rule.name, "deleting stale firewall rule");
            self.client.delete_firewall(&rule.name).await?;
        }
        Ok(())
    }

    /// Creates the cluster's service account if it is missing.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn ensure_service_account(&self) -> Result<(), EnsureError> {
        let project = &self.config.project_id;
        let account_id = desired::service_account_id(&self.config);
        let email = ServiceAccount::email_for(&account_id, project);
        let account = match self.client.get_service_account(project, &email).await? {
            Some(account) => account,
            None => {
                info!(account = %email, "creating service account");
                self.client
                    .create_service_account(project, &account_id, &account_id)
                    .await?
            }
        };
        self.mark_resources_exist();
        let identity = self.board.child(keys::IDENTITY);
        identity.set(keys::EMAIL, account.email.clone());
        identity.set(keys::UNIQUE_ID, account.unique_id.clone());
        self.board.set_object(keys::SERVICE_ACCOUNT, account);
        Ok(())
    }

    /// Creates or updates the backup bucket when backups are configured.
    ///
    /// # Errors
    ///
    /// Propagates remote failures.
    pub async fn ensure_backup_bucket(&self) -> Result<(), EnsureError> {
        let Some(wanted) = desired::backup_bucket(&self.config) else {
            return Ok(());
        };
        let bucket = match self.client.get_bucket(&wanted.name).await? {
            None => {
                info!(bucket = %wanted.name, "creating backup bucket");
                self.client
                    .insert_bucket(&self.config.project_id, &wanted)
                    .await?
            }
            Some(current) => match bucket_patch(&current, &wanted) {
                Some(patch) => {
                    info!(bucket = %wanted.name, "updating backup bucket");
                    self.client
                        .patch_bucket(&wanted.name, &patch, current.metageneration)
                        .await?
                }
                None => current,
            },
        };
        self.mark_resources_exist();
        let name = bucket.name.clone();
        self.store(keys::BACKUP_BUCKET, &name, bucket);
        Ok(())
    }
}
