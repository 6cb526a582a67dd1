//! Compute networking descriptors: networks, subnetworks, routers, NAT,
//! firewall rules, routes and external addresses.

use serde::{Deserialize, Serialize};

/// Dynamic routing scope of a network.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingMode {
    /// Routers only advertise routes of their own region.
    #[default]
    Regional,
    /// Routers advertise routes of all regions.
    Global,
}

/// A virtual network.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Network {
    /// Resource name (immutable).
    pub name: String,
    /// Fully qualified resource URL (output only).
    pub self_link: String,
    /// Numeric identifier assigned by the provider (output only).
    pub id: Option<u64>,
    /// Creation timestamp (output only).
    pub creation_timestamp: Option<String>,
    /// Whether subnetworks are created automatically (immutable).
    pub auto_create_subnetworks: bool,
    /// Dynamic routing mode (update eligible).
    pub routing_mode: RoutingMode,
}

/// Flow-log settings of a subnetwork.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubnetLogConfig {
    /// Whether flow logs are exported.
    pub enable: bool,
    /// Aggregation interval such as `INTERVAL_5_SEC`.
    pub aggregation_interval: Option<String>,
    /// Fraction of flows sampled, between 0 and 1.
    pub flow_sampling: Option<f64>,
    /// Metadata inclusion mode such as `INCLUDE_ALL_METADATA`.
    pub metadata: Option<String>,
}

impl SubnetLogConfig {
    /// Returns a configuration that switches flow logs off.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }
}

/// A regional subnetwork of a [`Network`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Subnetwork {
    /// Resource name (immutable).
    pub name: String,
    /// Fully qualified resource URL (output only).
    pub self_link: String,
    /// Numeric identifier assigned by the provider (output only).
    pub id: Option<u64>,
    /// Creation timestamp (output only).
    pub creation_timestamp: Option<String>,
    /// Region the subnetwork lives in (immutable).
    pub region: String,
    /// Self-link of the owning network (immutable).
    pub network: String,
    /// Primary address range; may only ever be expanded.
    pub ip_cidr_range: String,
    /// Whether instances without external addresses may reach provider APIs.
    pub private_ip_google_access: bool,
    /// Flow-log settings; cannot be patched together with other fields.
    pub log_config: Option<SubnetLogConfig>,
    /// Gateway address of the primary range (output only).
    pub gateway_address: Option<String>,
    /// Optimistic-locking token that must accompany every patch.
    pub fingerprint: String,
}

/// Address allocation strategy for NAT external IPs.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NatIpAllocateOption {
    /// Addresses are allocated by the provider.
    #[default]
    AutoOnly,
    /// Only the addresses listed in `nat_ips` are used.
    ManualOnly,
}

/// Which subnetwork ranges a NAT translates.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceSubnetworkIpRanges {
    /// Every range of every subnetwork in the region.
    AllSubnetworksAllIpRanges,
    /// Only the subnetworks listed in `subnetworks`.
    #[default]
    ListOfSubnetworks,
}

/// A subnetwork entry of a [`RouterNat`].
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NatSubnetwork {
    /// Self-link of the subnetwork.
    pub name: String,
    /// Range selectors such as `ALL_IP_RANGES`.
    pub source_ip_ranges_to_nat: Vec<String>,
}

/// Which NAT events are logged.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NatLogFilter {
    /// Errors and translations.
    All,
    /// Only connection errors.
    #[default]
    ErrorsOnly,
    /// Only successful translations.
    TranslationsOnly,
}

/// Logging settings of a [`RouterNat`].
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NatLogConfig {
    /// Whether NAT logging is on.
    pub enable: bool,
    /// Event filter.
    pub filter: NatLogFilter,
}

/// A NAT configuration. NATs are not standalone resources; they are entries
/// of the owning [`Router`]'s `nats` list and are identified by name.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouterNat {
    /// Entry name, unique within the router.
    pub name: String,
    /// External address allocation strategy.
    pub nat_ip_allocate_option: NatIpAllocateOption,
    /// Self-links of the external addresses used with manual allocation.
    pub nat_ips: Vec<String>,
    /// Which subnetwork ranges are translated.
    pub source_subnetwork_ip_ranges_to_nat: SourceSubnetworkIpRanges,
    /// Subnetworks translated when the source mode is a list.
    pub subnetworks: Vec<NatSubnetwork>,
    /// Minimum ports reserved per VM.
    pub min_ports_per_vm: Option<u32>,
    /// Maximum ports per VM with dynamic port allocation.
    pub max_ports_per_vm: Option<u32>,
    /// Whether ports are allocated dynamically.
    pub enable_dynamic_port_allocation: bool,
    /// Whether endpoint-independent mapping is enabled.
    pub enable_endpoint_independent_mapping: bool,
    /// ICMP idle timeout in seconds.
    pub icmp_idle_timeout_sec: Option<u32>,
    /// UDP idle timeout in seconds.
    pub udp_idle_timeout_sec: Option<u32>,
    /// Established TCP idle timeout in seconds.
    pub tcp_established_idle_timeout_sec: Option<u32>,
    /// Transitory TCP idle timeout in seconds.
    pub tcp_transitory_idle_timeout_sec: Option<u32>,
    /// Logging settings.
    pub log_config: Option<NatLogConfig>,
}

/// A regional cloud router.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Router {
    /// Resource name (immutable).
    pub name: String,
    /// Fully qualified resource URL (output only).
    pub self_link: String,
    /// Numeric identifier assigned by the provider (output only).
    pub id: Option<u64>,
    /// Creation timestamp (output only).
    pub creation_timestamp: Option<String>,
    /// Region the router lives in (immutable).
    pub region: String,
    /// Self-link of the network the router serves (immutable).
    pub network: String,
    /// NAT entries owned by this router.
    pub nats: Vec<RouterNat>,
    /// Optimistic-locking token.
    pub fingerprint: String,
}

impl Router {
    /// Returns the NAT entry with the given name.
    #[must_use]
    pub fn nat(&self, name: &str) -> Option<&RouterNat> {
        self.nats.iter().find(|nat| nat.name == name)
    }
}

/// Direction of traffic a firewall rule applies to.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Incoming traffic.
    #[default]
    Ingress,
    /// Outgoing traffic.
    Egress,
}

/// A protocol/ports tuple of a firewall allow or deny list.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FirewallRule {
    /// Protocol name or number, e.g. `tcp`.
    #[serde(rename = "IPProtocol")]
    pub ip_protocol: String,
    /// Ports or port ranges; order is significant to the provider.
    pub ports: Vec<String>,
}

impl FirewallRule {
    /// Builds a rule for a protocol and an ordered port list.
    #[must_use]
    pub fn new(protocol: impl Into<String>, ports: &[&str]) -> Self {
        Self {
            ip_protocol: protocol.into(),
            ports: ports.iter().map(|port| (*port).to_owned()).collect(),
        }
    }
}

/// A network firewall rule.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Firewall {
    /// Resource name (immutable).
    pub name: String,
    /// Fully qualified resource URL (output only).
    pub self_link: String,
    /// Numeric identifier assigned by the provider (output only).
    pub id: Option<u64>,
    /// Creation timestamp (output only).
    pub creation_timestamp: Option<String>,
    /// Self-link of the network the rule applies to (immutable).
    pub network: String,
    /// Traffic direction.
    pub direction: Direction,
    /// Priority; `0` is the highest priority and must be sent explicitly.
    pub priority: u32,
    /// Free-form description.
    pub description: String,
    /// Allowed protocol/port tuples (a set).
    pub allowed: Vec<FirewallRule>,
    /// Denied protocol/port tuples (a set).
    pub denied: Vec<FirewallRule>,
    /// Source ranges (a set).
    pub source_ranges: Vec<String>,
    /// Destination ranges (a set).
    pub destination_ranges: Vec<String>,
    /// Source instance tags (a set).
    pub source_tags: Vec<String>,
    /// Target instance tags (a set).
    pub target_tags: Vec<String>,
    /// Target service accounts (a set).
    pub target_service_accounts: Vec<String>,
    /// Whether the rule is disabled.
    pub disabled: bool,
}

/// A network route, typically created by a cloud controller for pod ranges.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Route {
    /// Resource name.
    pub name: String,
    /// Fully qualified resource URL (output only).
    pub self_link: String,
    /// Self-link of the network.
    pub network: String,
    /// Destination range.
    pub dest_range: String,
    /// Next-hop instance, for instance routes.
    pub next_hop_instance: Option<String>,
    /// Next-hop gateway, for default routes.
    pub next_hop_gateway: Option<String>,
    /// Route priority.
    pub priority: u32,
    /// Free-form description.
    pub description: String,
}

/// A reserved external address. Addresses referenced by configuration are
/// user-managed and are never created or deleted here.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    /// Resource name.
    pub name: String,
    /// Fully qualified resource URL.
    pub self_link: String,
    /// The reserved IP address.
    pub address: String,
    /// Region of the address.
    pub region: String,
    /// Reservation status such as `RESERVED` or `IN_USE`.
    pub status: String,
}
