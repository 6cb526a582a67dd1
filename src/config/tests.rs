//! Tests for configuration decoding and validation.

use std::time::Duration;

use super::*;
use rstest::{fixture, rstest};

#[fixture]
fn valid_config() -> InfrastructureConfig {
    InfrastructureConfig {
        cluster_name: String::from("shoot"),
        project_id: String::from("project"),
        region: String::from("europe-west1"),
        networks: NetworkConfig {
            workers: String::from("10.250.0.0/16"),
            internal: Some(String::from("10.251.0.0/24")),
            ..NetworkConfig::default()
        },
        pods_cidr: Some(String::from("100.96.0.0/11")),
        services_cidr: Some(String::from("100.64.0.0/13")),
        backup: None,
    }
}

fn options() -> EngineOptions {
    EngineOptions {
        poll_interval_ms: 5000,
        operation_timeout_secs: 300,
        task_timeout_secs: 600,
        state_file: String::from(super::engine::DEFAULT_STATE_FILE),
    }
}

#[rstest]
fn valid_config_passes(valid_config: InfrastructureConfig) {
    valid_config.validate().expect("config is valid");
}

#[test]
fn decodes_camel_case_document() {
    let raw = r#"{
        "clusterName": "shoot",
        "projectId": "project",
        "region": "europe-west1",
        "networks": {
            "vpc": {"name": "shared", "cloudRouter": "shared-router"},
            "workers": "10.250.0.0/16",
            "cloudNat": {"minPortsPerVm": 2048, "natIpNames": ["nat-a"]}
        },
        "backup": {}
    }"#;
    let config = InfrastructureConfig::from_json(raw).expect("decodes");

    assert!(config.uses_existing_vpc());
    assert_eq!(
        config.networks.vpc.and_then(|vpc| vpc.cloud_router).as_deref(),
        Some("shared-router")
    );
    let nat = config.networks.cloud_nat.expect("nat configured");
    assert_eq!(nat.min_ports_per_vm, Some(2048));
    assert_eq!(nat.nat_ip_names, vec!["nat-a"]);
    assert_eq!(config.backup, Some(BackupConfig::default()));
}

#[rstest]
#[case::cluster(|c: &mut InfrastructureConfig| c.cluster_name.clear(), "clusterName")]
#[case::project(|c: &mut InfrastructureConfig| c.project_id = String::from("  "), "projectId")]
#[case::region(|c: &mut InfrastructureConfig| c.region.clear(), "region")]
#[case::vpc(
    |c: &mut InfrastructureConfig| c.networks.vpc = Some(VpcReference::default()),
    "networks.vpc.name"
)]
fn missing_fields_are_named(
    valid_config: InfrastructureConfig,
    #[case] mutate: fn(&mut InfrastructureConfig),
    #[case] field: &str,
) {
    let mut config = valid_config;
    mutate(&mut config);
    let err = config.validate().expect_err("field is required");
    assert_eq!(
        err,
        ConfigError::MissingField {
            field: field.to_owned()
        }
    );
}

#[rstest]
fn malformed_range_is_rejected(valid_config: InfrastructureConfig) {
    let mut config = valid_config;
    config.networks.workers = String::from("10.250.0.1/16");
    let err = config.validate().expect_err("host bits set");
    assert!(
        matches!(&err, ConfigError::InvalidCidr { field, .. } if field == "networks.workers"),
        "{err}"
    );
}

#[rstest]
#[case::internal(|c: &mut InfrastructureConfig| c.networks.internal = Some(String::from("10.250.128.0/24")), "networks.internal")]
#[case::pods(|c: &mut InfrastructureConfig| c.pods_cidr = Some(String::from("10.0.0.0/8")), "podsCidr")]
fn overlapping_ranges_are_rejected(
    valid_config: InfrastructureConfig,
    #[case] mutate: fn(&mut InfrastructureConfig),
    #[case] second: &str,
) {
    let mut config = valid_config;
    mutate(&mut config);
    let err = config.validate().expect_err("ranges overlap");
    assert_eq!(
        err,
        ConfigError::OverlappingRanges {
            first: String::from("networks.workers"),
            second: second.to_owned(),
        }
    );
}

#[rstest]
fn flow_sampling_must_be_a_ratio(valid_config: InfrastructureConfig) {
    let mut config = valid_config;
    config.networks.flow_logs = Some(FlowLogs {
        flow_sampling: Some(1.5),
        ..FlowLogs::default()
    });
    let err = config.validate().expect_err("ratio out of range");
    assert!(matches!(err, ConfigError::InvalidFlowSampling { .. }), "{err}");
}

#[rstest]
#[case::max_without_dynamic(CloudNatConfig { max_ports_per_vm: Some(4096), ..CloudNatConfig::default() })]
#[case::min_above_max(CloudNatConfig {
    enable_dynamic_port_allocation: true,
    min_ports_per_vm: Some(8192),
    max_ports_per_vm: Some(4096),
    ..CloudNatConfig::default()
})]
#[case::not_power_of_two(CloudNatConfig {
    enable_dynamic_port_allocation: true,
    min_ports_per_vm: Some(100),
    ..CloudNatConfig::default()
})]
#[case::empty_address_name(CloudNatConfig { nat_ip_names: vec![String::new()], ..CloudNatConfig::default() })]
fn inconsistent_nat_settings_are_rejected(
    valid_config: InfrastructureConfig,
    #[case] nat: CloudNatConfig,
) {
    let mut config = valid_config;
    config.networks.cloud_nat = Some(nat);
    assert!(config.validate().is_err());
}

#[test]
fn engine_options_convert_to_durations() {
    let options = options();
    options.validate().expect("defaults are valid");
    assert_eq!(options.wait_options().poll_interval, Duration::from_secs(5));
    assert_eq!(
        options.wait_options().operation_timeout,
        Duration::from_secs(300)
    );
    assert_eq!(options.task_timeout(), Duration::from_secs(600));
    assert_eq!(options.state_path().as_str(), "netforge-state.json");
}

#[test]
fn zero_poll_interval_is_actionable() {
    let zero = EngineOptions {
        poll_interval_ms: 0,
        ..options()
    };
    let message = zero.validate().expect_err("zero interval").to_string();
    assert!(message.contains("NETFORGE_POLL_INTERVAL_MS"), "{message}");
    assert!(message.contains("netforge.toml"), "{message}");
}
