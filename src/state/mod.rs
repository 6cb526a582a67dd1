//! Persisted state envelope, run status and the writers receiving them.
//!
//! State is only accepted when its `kind` and `apiVersion` markers match the
//! engine's values exactly. Anything else is foreign or legacy state and is
//! ignored as a whole rather than partially interpreted.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

mod file;

pub use file::FileStateStore;

/// Kind marker of the persisted state envelope.
pub const STATE_KIND: &str = "InfrastructureState";
/// Version marker of the persisted state envelope.
pub const STATE_API_VERSION: &str = "netforge.dev/v1alpha1";

/// A route recorded by the control plane, cleaned up on delete.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteEntry {
    /// Route name.
    pub name: String,
    /// Destination range.
    pub dest_range: String,
    /// Next-hop instance, when known.
    pub instance: Option<String>,
}

/// Versioned envelope carrying the whiteboard's flat export between runs.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    /// Always [`STATE_KIND`].
    pub kind: String,
    /// Always [`STATE_API_VERSION`].
    pub api_version: String,
    /// Flat whiteboard export.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    /// Routes known to the control plane.
    #[serde(default)]
    pub routes: Vec<RouteEntry>,
}

impl PersistedState {
    /// Wraps a flat export in a current-version envelope.
    #[must_use]
    pub fn new(data: BTreeMap<String, String>, routes: Vec<RouteEntry>) -> Self {
        Self {
            kind: STATE_KIND.to_owned(),
            api_version: STATE_API_VERSION.to_owned(),
            data,
            routes,
        }
    }

    /// Returns `true` when both markers match the engine's values.
    #[must_use]
    pub fn is_current(&self) -> bool {
        self.kind == STATE_KIND && self.api_version == STATE_API_VERSION
    }

    /// Decodes a raw payload.
    ///
    /// Returns `Ok(None)` when the payload carries foreign markers, so the
    /// caller starts from empty state.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Malformed`] when the markers match but the body
    /// does not decode.
    pub fn decode(raw: &Value) -> Result<Option<Self>, StateError> {
        let marker = |field: &str| raw.get(field).and_then(Value::as_str);
        if marker("kind") != Some(STATE_KIND) || marker("apiVersion") != Some(STATE_API_VERSION) {
            return Ok(None);
        }
        serde_json::from_value(raw.clone())
            .map(Some)
            .map_err(|err| StateError::Malformed {
                message: err.to_string(),
            })
    }

    /// Decodes a JSON document; see [`Self::decode`].
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Malformed`] when the document is not JSON or
    /// carries matching markers over an invalid body.
    pub fn decode_str(raw: &str) -> Result<Option<Self>, StateError> {
        let value: Value = serde_json::from_str(raw).map_err(|err| StateError::Malformed {
            message: err.to_string(),
        })?;
        Self::decode(&value)
    }
}

/// Computed state of one subnet.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubnetStatus {
    /// Subnet name.
    pub name: String,
    /// `nodes` or `internal`.
    pub purpose: String,
    /// Primary range.
    pub ip_cidr_range: String,
    /// Gateway address assigned by the provider.
    pub gateway_address: Option<String>,
}

/// Status reported to the control plane after every run.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureStatus {
    /// Network name.
    pub network_name: Option<String>,
    /// Network self-link.
    pub network_self_link: Option<String>,
    /// Provider-assigned network id.
    pub network_id: Option<String>,
    /// Subnets in use.
    pub subnets: Vec<SubnetStatus>,
    /// Router name.
    pub router_name: Option<String>,
    /// NAT gateway name.
    pub nat_name: Option<String>,
    /// External addresses used by the NAT gateway.
    pub nat_ips: Vec<String>,
    /// Firewall rules in place.
    pub firewall_rules: Vec<String>,
    /// Email of the cluster's service account.
    pub service_account_email: Option<String>,
    /// Backup bucket name.
    pub backup_bucket: Option<String>,
}

/// Errors raised while reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StateError {
    /// Raised when a payload with matching markers cannot be decoded.
    #[error("malformed persisted state: {message}")]
    Malformed {
        /// Decoder message.
        message: String,
    },
    /// Raised when the state file cannot be accessed.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the control plane rejects a write.
    #[error("state write rejected: {message}")]
    Rejected {
        /// Reason reported by the writer.
        message: String,
    },
}

/// Future returned by state writers.
pub type WriteFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StateError>> + Send + 'a>>;

/// Control-plane boundary receiving persisted state and status.
pub trait StateWriter: Send + Sync {
    /// Stores the persisted state envelope.
    fn write_state<'a>(&'a self, state: &'a PersistedState) -> WriteFuture<'a>;

    /// Stores the run status.
    fn write_status<'a>(&'a self, status: &'a InfrastructureStatus) -> WriteFuture<'a>;
}

#[cfg(test)]
mod tests;
