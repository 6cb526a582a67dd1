//! Status report assembled from the whiteboard after a run.

use crate::infraflow::keys;
use crate::resources::{Address, Firewall, Network, Router, RouterNat, Subnetwork};
use crate::state::{InfrastructureStatus, SubnetStatus};
use crate::whiteboard::Whiteboard;

fn subnet_status(subnet: Subnetwork, purpose: &str) -> SubnetStatus {
    SubnetStatus {
        name: subnet.name,
        purpose: purpose.to_owned(),
        ip_cidr_range: subnet.ip_cidr_range,
        gateway_address: subnet.gateway_address,
    }
}

pub(super) fn collect(board: &Whiteboard) -> InfrastructureStatus {
    let network: Option<Network> = board.get_object(keys::NETWORK);
    let subnets = [
        (keys::SUBNET_NODES, "nodes"),
        (keys::SUBNET_INTERNAL, "internal"),
    ]
    .into_iter()
    .filter_map(|(key, purpose)| {
        board
            .get_object::<Subnetwork>(key)
            .map(|subnet| subnet_status(subnet, purpose))
    })
    .collect();

    InfrastructureStatus {
        network_name: network.as_ref().map(|found| found.name.clone()),
        network_self_link: network.as_ref().map(|found| found.self_link.clone()),
        network_id: network.and_then(|found| found.id).map(|id| id.to_string()),
        subnets,
        router_name: board
            .get_object::<Router>(keys::ROUTER)
            .map(|router| router.name),
        nat_name: board.get_object::<RouterNat>(keys::NAT).map(|nat| nat.name),
        nat_ips: board
            .get_object::<Vec<Address>>(keys::NAT_ADDRESSES)
            .unwrap_or_default()
            .into_iter()
            .map(|address| address.address)
            .collect(),
        firewall_rules: board
            .get_object::<Vec<Firewall>>(keys::FIREWALL_RULES)
            .unwrap_or_default()
            .into_iter()
            .map(|rule| rule.name)
            .collect(),
        service_account_email: board.child(keys::IDENTITY).get(keys::EMAIL),
        backup_bucket: board.child(keys::IDS).get(keys::BACKUP_BUCKET),
    }
}
