//! Resource names and desired-state descriptors derived from configuration.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::config::{FlowLogs, InfrastructureConfig};
use crate::resources::{
    Address, Bucket, Direction, Firewall, FirewallRule, LifecycleRule, NatIpAllocateOption,
    NatLogConfig, NatLogFilter, NatSubnetwork, Network, Router, RouterNat, RoutingMode,
    SourceSubnetworkIpRanges, SubnetLogConfig, Subnetwork,
};

/// Ranges the provider's load-balancer health checks originate from.
pub const HEALTH_CHECK_RANGES: [&str; 4] = [
    "35.191.0.0/16",
    "130.211.0.0/22",
    "209.85.152.0/22",
    "209.85.204.0/22",
];

const NODE_PORTS: &str = "30000-32767";
const ALL_PORTS: &str = "1-65535";
const DEFAULT_PRIORITY: u32 = 1000;

/// Prefix shared by every resource the engine names after the cluster.
#[must_use]
pub fn resource_prefix(config: &InfrastructureConfig) -> String {
    format!("{}-", config.cluster_name)
}

/// Name of the network in use, owned or user-managed.
#[must_use]
pub fn network_name(config: &InfrastructureConfig) -> String {
    config
        .networks
        .vpc
        .as_ref()
        .map_or_else(|| config.cluster_name.clone(), |vpc| vpc.name.clone())
}

/// Name of the node subnet.
#[must_use]
pub fn nodes_subnet_name(config: &InfrastructureConfig) -> String {
    format!("{}nodes", resource_prefix(config))
}

/// Name of the optional internal subnet.
#[must_use]
pub fn internal_subnet_name(config: &InfrastructureConfig) -> String {
    format!("{}internal", resource_prefix(config))
}

/// Name of the router in use. `None` when a user-managed network comes
/// without a router.
#[must_use]
pub fn router_name(config: &InfrastructureConfig) -> Option<String> {
    match &config.networks.vpc {
        Some(vpc) => vpc.cloud_router.clone(),
        None => Some(format!("{}cloud-router", resource_prefix(config))),
    }
}

/// Name of the NAT gateway.
#[must_use]
pub fn nat_name(config: &InfrastructureConfig) -> String {
    format!("{}cloud-nat", resource_prefix(config))
}

/// Names of the user-managed external addresses for the NAT gateway.
#[must_use]
pub fn nat_ip_names(config: &InfrastructureConfig) -> &[String] {
    config
        .networks
        .cloud_nat
        .as_ref()
        .map(|nat| nat.nat_ip_names.as_slice())
        .unwrap_or_default()
}

/// Name of the firewall rule allowing traffic between cluster ranges.
#[must_use]
pub fn internal_firewall_name(config: &InfrastructureConfig) -> String {
    format!("{}allow-internal-access", resource_prefix(config))
}

/// Name of the firewall rule admitting health checks.
#[must_use]
pub fn health_check_firewall_name(config: &InfrastructureConfig) -> String {
    format!("{}allow-health-checks", resource_prefix(config))
}

/// Firewall rule name suffixes the engine has ever created, including
/// retired ones that stale cleanup still removes.
const OWNED_FIREWALL_SUFFIXES: &[&str] = &[
    "allow-internal-access",
    "allow-health-checks",
    "allow-external-access",
];

/// Returns `true` when `name` is a firewall rule this cluster's engine
/// generates. Rules of clusters whose names share a prefix never match.
#[must_use]
pub fn is_owned_firewall(config: &InfrastructureConfig, name: &str) -> bool {
    name.strip_prefix(&resource_prefix(config))
        .is_some_and(|suffix| OWNED_FIREWALL_SUFFIXES.contains(&suffix))
}

/// Returns `true` when `name` follows the `<cluster>-<uuid>` pattern used
/// for routes programmed on behalf of the cluster.
#[must_use]
pub fn is_owned_route(config: &InfrastructureConfig, name: &str) -> bool {
    name.strip_prefix(&resource_prefix(config))
        .is_some_and(|suffix| suffix.len() == 36 && Uuid::try_parse(suffix).is_ok())
}

/// Account id of the cluster's service account.
#[must_use]
pub fn service_account_id(config: &InfrastructureConfig) -> String {
    config.cluster_name.clone()
}

/// Name of the backup bucket.
#[must_use]
pub fn backup_bucket_name(config: &InfrastructureConfig) -> String {
    format!("{}backup", resource_prefix(config))
}

/// Server-side filter selecting resources attached to `network`.
#[must_use]
pub fn network_filter(network: &str) -> String {
    format!("network eq \".*/{network}$\"")
}

/// Returns `true` when `link` refers to the network called `name`.
#[must_use]
pub fn on_network(link: &str, name: &str) -> bool {
    link.rsplit('/').next() == Some(name)
}

/// Network owned by the engine.
#[must_use]
pub fn network(config: &InfrastructureConfig) -> Network {
    Network {
        name: network_name(config),
        auto_create_subnetworks: false,
        routing_mode: RoutingMode::Regional,
        ..Network::default()
    }
}

fn log_config(flow_logs: Option<&FlowLogs>) -> Option<SubnetLogConfig> {
    flow_logs.map(|logs| SubnetLogConfig {
        enable: true,
        aggregation_interval: logs.aggregation_interval.clone(),
        flow_sampling: logs.flow_sampling,
        metadata: logs.metadata.clone(),
    })
}

/// Node subnet on `network`.
#[must_use]
pub fn nodes_subnet(config: &InfrastructureConfig, network: &Network) -> Subnetwork {
    Subnetwork {
        name: nodes_subnet_name(config),
        region: config.region.clone(),
        network: network.self_link.clone(),
        ip_cidr_range: config.networks.workers.clone(),
        log_config: log_config(config.networks.flow_logs.as_ref()),
        ..Subnetwork::default()
    }
}

/// Internal subnet on `network`, `None` when not configured.
#[must_use]
pub fn internal_subnet(config: &InfrastructureConfig, network: &Network) -> Option<Subnetwork> {
    config.networks.internal.as_ref().map(|range| Subnetwork {
        name: internal_subnet_name(config),
        region: config.region.clone(),
        network: network.self_link.clone(),
        ip_cidr_range: range.clone(),
        ..Subnetwork::default()
    })
}

/// Router owned by the engine, `None` when the router is user-managed or
/// absent.
#[must_use]
pub fn router(config: &InfrastructureConfig, network: &Network) -> Option<Router> {
    if config.uses_existing_vpc() {
        return None;
    }
    router_name(config).map(|name| Router {
        name,
        region: config.region.clone(),
        network: network.self_link.clone(),
        ..Router::default()
    })
}

/// NAT gateway translating the node subnet.
///
/// Configured addresses switch the gateway to manual allocation.
#[must_use]
pub fn nat(config: &InfrastructureConfig, nodes: &Subnetwork, addresses: &[Address]) -> RouterNat {
    let settings = config.networks.cloud_nat.clone().unwrap_or_default();
    let allocation = if addresses.is_empty() {
        NatIpAllocateOption::AutoOnly
    } else {
        NatIpAllocateOption::ManualOnly
    };
    RouterNat {
        name: nat_name(config),
        nat_ip_allocate_option: allocation,
        nat_ips: addresses
            .iter()
            .map(|address| address.self_link.clone())
            .collect(),
        source_subnetwork_ip_ranges_to_nat: SourceSubnetworkIpRanges::ListOfSubnetworks,
        subnetworks: vec![NatSubnetwork {
            name: nodes.self_link.clone(),
            source_ip_ranges_to_nat: vec![String::from("ALL_IP_RANGES")],
        }],
        min_ports_per_vm: settings.min_ports_per_vm,
        max_ports_per_vm: settings.max_ports_per_vm,
        enable_dynamic_port_allocation: settings.enable_dynamic_port_allocation,
        enable_endpoint_independent_mapping: settings.enable_endpoint_independent_mapping,
        icmp_idle_timeout_sec: settings.icmp_idle_timeout_sec,
        udp_idle_timeout_sec: settings.udp_idle_timeout_sec,
        tcp_established_idle_timeout_sec: settings.tcp_established_idle_timeout_sec,
        tcp_transitory_idle_timeout_sec: settings.tcp_transitory_idle_timeout_sec,
        log_config: Some(NatLogConfig {
            enable: true,
            filter: NatLogFilter::ErrorsOnly,
        }),
    }
}

/// Firewall rules the cluster needs on `network`.
#[must_use]
pub fn firewalls(config: &InfrastructureConfig, network: &Network) -> Vec<Firewall> {
    let mut internal_sources = vec![config.networks.workers.clone()];
    internal_sources.extend(config.pods_cidr.iter().cloned());
    internal_sources.extend(config.services_cidr.iter().cloned());
    internal_sources.extend(config.networks.internal.iter().cloned());

    vec![
        Firewall {
            name: internal_firewall_name(config),
            network: network.self_link.clone(),
            direction: Direction::Ingress,
            priority: DEFAULT_PRIORITY,
            allowed: vec![
                FirewallRule::new("tcp", &[ALL_PORTS]),
                FirewallRule::new("udp", &[ALL_PORTS]),
                FirewallRule::new("icmp", &[]),
                FirewallRule::new("ipip", &[]),
            ],
            source_ranges: internal_sources,
            ..Firewall::default()
        },
        Firewall {
            name: health_check_firewall_name(config),
            network: network.self_link.clone(),
            direction: Direction::Ingress,
            priority: DEFAULT_PRIORITY,
            allowed: vec![
                FirewallRule::new("tcp", &[NODE_PORTS]),
                FirewallRule::new("udp", &[NODE_PORTS]),
            ],
            source_ranges: HEALTH_CHECK_RANGES
                .iter()
                .map(|range| (*range).to_owned())
                .collect(),
            ..Firewall::default()
        },
    ]
}

/// Backup bucket, `None` when backups are not configured.
#[must_use]
pub fn backup_bucket(config: &InfrastructureConfig) -> Option<Bucket> {
    config.backup.as_ref().map(|backup| Bucket {
        name: backup_bucket_name(config),
        location: backup
            .location
            .clone()
            .unwrap_or_else(|| config.region.clone()),
        lifecycle: vec![LifecycleRule::expire_after_custom_time()],
        labels: BTreeMap::from([(String::from("cluster"), config.cluster_name.clone())]),
        uniform_bucket_level_access: true,
        ..Bucket::default()
    })
}
