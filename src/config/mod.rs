//! Desired infrastructure configuration and engine options.
//!
//! [`InfrastructureConfig`] is supplied by the control plane for every run.
//! [`EngineOptions`] tune the engine itself and are layered through
//! `ortho-config` from defaults, `netforge.toml` and `NETFORGE_*`
//! environment variables.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resources::{Cidr, CidrParseError};

mod engine;

pub use engine::EngineOptions;

/// Desired state of one cluster's infrastructure.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureConfig {
    /// Cluster name; prefixes every resource the engine owns.
    pub cluster_name: String,
    /// Provider project.
    pub project_id: String,
    /// Region of all regional resources.
    pub region: String,
    /// Network layout.
    pub networks: NetworkConfig,
    /// Pod range, allowed by the internal firewall rule.
    #[serde(default)]
    pub pods_cidr: Option<String>,
    /// Service range, allowed by the internal firewall rule.
    #[serde(default)]
    pub services_cidr: Option<String>,
    /// Optional backup bucket.
    #[serde(default)]
    pub backup: Option<BackupConfig>,
}

/// Network layout.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfig {
    /// Existing, user-managed network to use instead of creating one.
    #[serde(default)]
    pub vpc: Option<VpcReference>,
    /// Node subnet range.
    pub workers: String,
    /// Optional internal subnet range.
    #[serde(default)]
    pub internal: Option<String>,
    /// Flow-log settings of the node subnet.
    #[serde(default)]
    pub flow_logs: Option<FlowLogs>,
    /// NAT gateway settings.
    #[serde(default)]
    pub cloud_nat: Option<CloudNatConfig>,
}

/// Reference to a user-managed network.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcReference {
    /// Network name.
    pub name: String,
    /// User-managed router on that network, if any.
    #[serde(default)]
    pub cloud_router: Option<String>,
}

/// Flow-log tuning.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowLogs {
    /// Aggregation interval, for example `INTERVAL_5_SEC`.
    #[serde(default)]
    pub aggregation_interval: Option<String>,
    /// Sampling ratio between 0 and 1.
    #[serde(default)]
    pub flow_sampling: Option<f64>,
    /// Metadata to include, for example `INCLUDE_ALL_METADATA`.
    #[serde(default)]
    pub metadata: Option<String>,
}

/// NAT gateway tuning.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloudNatConfig {
    /// Minimum ports per VM.
    pub min_ports_per_vm: Option<u32>,
    /// Maximum ports per VM; requires dynamic port allocation.
    pub max_ports_per_vm: Option<u32>,
    /// Enables dynamic port allocation.
    pub enable_dynamic_port_allocation: bool,
    /// Enables endpoint-independent mapping.
    pub enable_endpoint_independent_mapping: bool,
    /// Names of user-managed external addresses; switches to manual
    /// allocation when non-empty.
    pub nat_ip_names: Vec<String>,
    /// ICMP idle timeout.
    pub icmp_idle_timeout_sec: Option<u32>,
    /// UDP idle timeout.
    pub udp_idle_timeout_sec: Option<u32>,
    /// Established TCP idle timeout.
    pub tcp_established_idle_timeout_sec: Option<u32>,
    /// Transitory TCP idle timeout.
    pub tcp_transitory_idle_timeout_sec: Option<u32>,
}

/// Backup bucket settings.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupConfig {
    /// Bucket location; defaults to the cluster region.
    pub location: Option<String>,
}

/// Errors raised while loading or validating configuration.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Raised when a required value is empty.
    #[error("missing configuration field: {field}")]
    MissingField {
        /// Dotted path of the field.
        field: String,
    },
    /// Raised when a range cannot be parsed.
    #[error("invalid range in {field}: {source}")]
    InvalidCidr {
        /// Dotted path of the field.
        field: String,
        /// Parse failure.
        #[source]
        source: CidrParseError,
    },
    /// Raised when two ranges that must be disjoint overlap.
    #[error("{first} overlaps {second}")]
    OverlappingRanges {
        /// First field.
        first: String,
        /// Second field.
        second: String,
    },
    /// Raised when NAT port bounds are inconsistent.
    #[error("invalid NAT ports: {reason}")]
    InvalidNatPorts {
        /// Why the bounds are rejected.
        reason: String,
    },
    /// Raised when the flow-log sampling ratio is outside `[0, 1]`.
    #[error("flow sampling {value} must be between 0 and 1")]
    InvalidFlowSampling {
        /// Configured ratio.
        value: f64,
    },
    /// Raised when engine options are out of range.
    #[error("invalid engine option {field}: {reason}")]
    InvalidOption {
        /// Option name.
        field: String,
        /// Why the value is rejected.
        reason: String,
    },
    /// Surfaces errors from decoding or the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

fn require(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingField {
            field: field.to_owned(),
        });
    }
    Ok(())
}

fn parse_cidr(value: &str, field: &str) -> Result<Cidr, ConfigError> {
    value.parse().map_err(|source| ConfigError::InvalidCidr {
        field: field.to_owned(),
        source,
    })
}

impl InfrastructureConfig {
    /// Decodes configuration from the control plane's JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the document does not decode.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns `true` when the network is owned by the user.
    #[must_use]
    pub const fn uses_existing_vpc(&self) -> bool {
        self.networks.vpc.is_some()
    }

    /// Checks names, ranges and NAT settings.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require(&self.cluster_name, "clusterName")?;
        require(&self.project_id, "projectId")?;
        require(&self.region, "region")?;
        if let Some(vpc) = &self.networks.vpc {
            require(&vpc.name, "networks.vpc.name")?;
            if let Some(router) = &vpc.cloud_router {
                require(router, "networks.vpc.cloudRouter")?;
            }
        }

        let mut ranges = vec![(
            "networks.workers",
            parse_cidr(&self.networks.workers, "networks.workers")?,
        )];
        if let Some(internal) = &self.networks.internal {
            ranges.push(("networks.internal", parse_cidr(internal, "networks.internal")?));
        }
        if let Some(pods) = &self.pods_cidr {
            ranges.push(("podsCidr", parse_cidr(pods, "podsCidr")?));
        }
        if let Some(services) = &self.services_cidr {
            ranges.push(("servicesCidr", parse_cidr(services, "servicesCidr")?));
        }
        for (position, (first, lhs)) in ranges.iter().enumerate() {
            if let Some((second, _)) = ranges
                .iter()
                .skip(position + 1)
                .find(|(_, rhs)| lhs.overlaps(rhs))
            {
                return Err(ConfigError::OverlappingRanges {
                    first: (*first).to_owned(),
                    second: (*second).to_owned(),
                });
            }
        }

        if let Some(sampling) = self
            .networks
            .flow_logs
            .as_ref()
            .and_then(|logs| logs.flow_sampling)
            && !(0.0..=1.0).contains(&sampling)
        {
            return Err(ConfigError::InvalidFlowSampling { value: sampling });
        }

        if let Some(nat) = &self.networks.cloud_nat {
            validate_nat(nat)?;
        }
        Ok(())
    }
}

fn validate_nat(nat: &CloudNatConfig) -> Result<(), ConfigError> {
    for (index, name) in nat.nat_ip_names.iter().enumerate() {
        require(name, &format!("networks.cloudNat.natIpNames[{index}]"))?;
    }
    if nat.max_ports_per_vm.is_some() && !nat.enable_dynamic_port_allocation {
        return Err(ConfigError::InvalidNatPorts {
            reason: String::from("maxPortsPerVm requires enableDynamicPortAllocation"),
        });
    }
    if let (Some(min), Some(max)) = (nat.min_ports_per_vm, nat.max_ports_per_vm)
        && min > max
    {
        return Err(ConfigError::InvalidNatPorts {
            reason: format!("minPortsPerVm {min} exceeds maxPortsPerVm {max}"),
        });
    }
    if nat.enable_dynamic_port_allocation {
        for (field, value) in [
            ("minPortsPerVm", nat.min_ports_per_vm),
            ("maxPortsPerVm", nat.max_ports_per_vm),
        ] {
            if let Some(ports) = value
                && !ports.is_power_of_two()
            {
                return Err(ConfigError::InvalidNatPorts {
                    reason: format!(
                        "{field} {ports} must be a power of two with dynamic port allocation"
                    ),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
