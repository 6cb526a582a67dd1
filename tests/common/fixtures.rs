//! Shared fixtures for integration tests.
//!
//! Included by each test crate through `#[path = "common/fixtures.rs"]`.

use std::sync::Arc;

use netforge::config::{EngineOptions, InfrastructureConfig};
use netforge::reconcile::Reconciler;
use netforge::state::StateWriter;
use netforge::test_support::FakeCloud;

/// Cluster name used by every fixture configuration.
pub const CLUSTER: &str = "shoot";

/// Engine options with millisecond polling so tests finish quickly.
pub fn engine_options() -> EngineOptions {
    EngineOptions {
        poll_interval_ms: 1,
        operation_timeout_secs: 5,
        task_timeout_secs: 30,
        state_file: String::from("netforge-state.json"),
    }
}

/// Configuration requesting a network, one subnet, a router and the two
/// default firewall rules.
pub fn minimal_config() -> InfrastructureConfig {
    InfrastructureConfig::from_json(
        r#"{
            "clusterName": "shoot",
            "projectId": "project",
            "region": "europe-west1",
            "networks": { "workers": "10.250.0.0/16" },
            "podsCidr": "100.96.0.0/11",
            "servicesCidr": "100.64.0.0/13"
        }"#,
    )
    .expect("fixture config parses")
}

/// Configuration exercising the optional resources.
pub fn full_config() -> InfrastructureConfig {
    InfrastructureConfig::from_json(
        r#"{
            "clusterName": "shoot",
            "projectId": "project",
            "region": "europe-west1",
            "networks": {
                "workers": "10.250.0.0/16",
                "internal": "10.251.0.0/16",
                "flowLogs": { "aggregationInterval": "INTERVAL_5_SEC" },
                "cloudNat": { "minPortsPerVm": 2048 }
            },
            "podsCidr": "100.96.0.0/11",
            "servicesCidr": "100.64.0.0/13",
            "backup": { "location": "europe-west4" }
        }"#,
    )
    .expect("fixture config parses")
}

/// Builds a reconciler over `cloud` and `writer`.
pub fn reconciler<W: StateWriter>(
    cloud: &Arc<FakeCloud>,
    writer: &Arc<W>,
) -> Reconciler<FakeCloud, W> {
    Reconciler::new(Arc::clone(cloud), Arc::clone(writer), engine_options())
}
