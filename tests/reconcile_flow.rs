//! End-to-end reconcile and delete runs against the in-memory provider.

#[path = "common/fixtures.rs"]
mod fixtures;

use std::sync::Arc;

use netforge::api::{ApiError, ErrorCode};
use netforge::config::VpcReference;
use netforge::infraflow::keys;
use netforge::resources::{Network, RoutingMode};
use netforge::test_support::{FakeCloud, MemoryStateWriter};
use netforge::whiteboard::Whiteboard;
use rstest::*;
use tokio_util::sync::CancellationToken;

use fixtures::{CLUSTER, full_config, minimal_config, reconciler};

#[fixture]
fn cloud() -> Arc<FakeCloud> {
    Arc::new(FakeCloud::new())
}

#[fixture]
fn writer() -> Arc<MemoryStateWriter> {
    Arc::new(MemoryStateWriter::new())
}

#[rstest]
#[tokio::test]
async fn fresh_reconcile_creates_each_resource_once(
    cloud: Arc<FakeCloud>,
    writer: Arc<MemoryStateWriter>,
) {
    cloud.set_operation_polls(2);

    let report = reconciler(&cloud, &writer)
        .reconcile(&minimal_config(), None, &CancellationToken::new())
        .await
        .expect("reconcile succeeds");

    assert_eq!(cloud.calls("insert_network"), 1);
    assert_eq!(cloud.calls("insert_subnetwork"), 1);
    assert_eq!(cloud.calls("insert_router"), 1);
    assert_eq!(cloud.calls("insert_firewall"), 2);
    assert!(cloud.calls("get_operation") > 0);

    let board = Whiteboard::from_flat(&report.state.data);
    let ids = board.child(keys::IDS);
    for key in [
        keys::NETWORK,
        keys::SUBNET_NODES,
        keys::ROUTER,
        keys::FIREWALL_RULES,
    ] {
        assert!(ids.get(key).is_some(), "missing {key}");
    }
    assert_eq!(board.get(keys::RESOURCES_EXIST).as_deref(), Some("true"));

    let subnet = cloud.subnetwork("shoot-nodes").expect("subnet created");
    let network = cloud.network(CLUSTER).expect("network created");
    assert_eq!(subnet.network, network.self_link);
}

#[rstest]
#[tokio::test]
async fn second_reconcile_changes_nothing(cloud: Arc<FakeCloud>, writer: Arc<MemoryStateWriter>) {
    let engine = reconciler(&cloud, &writer);
    let config = full_config();
    engine
        .reconcile(&config, None, &CancellationToken::new())
        .await
        .expect("first run");
    let patches_after_first = cloud.calls("patch_router");

    engine
        .reconcile(&config, writer.last_state(), &CancellationToken::new())
        .await
        .expect("second run");

    for method in [
        "insert_network",
        "insert_subnetwork",
        "insert_router",
        "insert_firewall",
        "insert_bucket",
        "create_service_account",
    ] {
        assert_eq!(cloud.calls(method), 1, "{method}");
    }
    for method in [
        "patch_network",
        "patch_subnetwork",
        "expand_subnetwork_range",
        "patch_firewall",
        "patch_bucket",
    ] {
        assert_eq!(cloud.calls(method), 0, "{method}");
    }
    assert_eq!(cloud.calls("patch_router"), patches_after_first);
}

#[rstest]
#[tokio::test]
async fn interrupted_run_resumes_without_reinserting(
    cloud: Arc<FakeCloud>,
    writer: Arc<MemoryStateWriter>,
) {
    let engine = reconciler(&cloud, &writer);
    let config = minimal_config();
    cloud.fail(
        "insert_router",
        ApiError::new(ErrorCode::Other(500), "internal error"),
    );

    let err = engine
        .reconcile(&config, None, &CancellationToken::new())
        .await
        .expect_err("router insert fails");
    assert_eq!(err.failed_task(), Some("ensure-router"));

    let persisted = writer.last_state().expect("state written on failure");
    let ids = Whiteboard::from_flat(&persisted.data).child(keys::IDS);
    assert!(ids.get(keys::NETWORK).is_some());
    assert!(ids.get(keys::SUBNET_NODES).is_some());
    assert!(ids.get(keys::ROUTER).is_none());

    cloud.clear_failure("insert_router");
    engine
        .reconcile(&config, Some(persisted), &CancellationToken::new())
        .await
        .expect("resumed run succeeds");

    assert_eq!(cloud.calls("insert_network"), 1);
    assert_eq!(cloud.calls("insert_subnetwork"), 1);
    assert!(cloud.router("shoot-cloud-router").is_some());
}

#[rstest]
#[tokio::test]
async fn optional_resources_follow_configuration(
    cloud: Arc<FakeCloud>,
    writer: Arc<MemoryStateWriter>,
) {
    let engine = reconciler(&cloud, &writer);
    let mut config = full_config();
    let report = engine
        .reconcile(&config, None, &CancellationToken::new())
        .await
        .expect("full run");
    assert_eq!(report.status.subnets.len(), 2);
    assert_eq!(report.status.backup_bucket.as_deref(), Some("shoot-backup"));
    let bucket = cloud.bucket("shoot-backup").expect("bucket created");
    assert_eq!(bucket.location, "europe-west4");

    config.networks.internal = None;
    let report = engine
        .reconcile(&config, writer.last_state(), &CancellationToken::new())
        .await
        .expect("internal subnet removed");
    assert_eq!(report.status.subnets.len(), 1);
    assert!(cloud.subnetwork("shoot-internal").is_none());
}

#[rstest]
#[tokio::test]
async fn user_managed_network_is_never_created_or_deleted(
    cloud: Arc<FakeCloud>,
    writer: Arc<MemoryStateWriter>,
) {
    cloud.seed_network(Network {
        name: String::from("user-vpc"),
        self_link: String::from("https://fake.cloud/networks/user-vpc"),
        id: Some(42),
        routing_mode: RoutingMode::Global,
        ..Network::default()
    });
    let mut config = minimal_config();
    config.networks.vpc = Some(VpcReference {
        name: String::from("user-vpc"),
        cloud_router: None,
    });
    let engine = reconciler(&cloud, &writer);

    let report = engine
        .reconcile(&config, None, &CancellationToken::new())
        .await
        .expect("reconcile on user network");
    assert_eq!(cloud.calls("insert_network"), 0);
    assert_eq!(cloud.calls("patch_network"), 0);
    assert_eq!(cloud.calls("insert_router"), 0);
    assert_eq!(report.status.network_name.as_deref(), Some("user-vpc"));
    assert!(report.summary.skipped.contains(&String::from("ensure-nat")));

    engine
        .delete(&config, writer.last_state(), &CancellationToken::new())
        .await
        .expect("delete succeeds")
        .expect("delete ran");
    assert_eq!(cloud.calls("delete_network"), 0);
    assert!(cloud.network("user-vpc").is_some());
    assert!(cloud.subnetwork("shoot-nodes").is_none());
    assert!(cloud.firewall_names().is_empty());
}

#[rstest]
#[tokio::test]
async fn missing_user_network_fails_without_side_effects(
    cloud: Arc<FakeCloud>,
    writer: Arc<MemoryStateWriter>,
) {
    let mut config = minimal_config();
    config.networks.vpc = Some(VpcReference {
        name: String::from("absent"),
        cloud_router: None,
    });

    let err = reconciler(&cloud, &writer)
        .reconcile(&config, None, &CancellationToken::new())
        .await
        .expect_err("user network missing");

    assert_eq!(err.to_string(), "user-managed network absent not found");
    assert_eq!(cloud.calls("insert_subnetwork"), 0);
    assert_eq!(cloud.calls("insert_firewall"), 0);
    let state = writer.last_state().expect("state written on failure");
    let ids = Whiteboard::from_flat(&state.data).child(keys::IDS);
    assert!(ids.get(keys::NETWORK).is_none());
}

#[rstest]
#[tokio::test]
async fn delete_after_reconcile_removes_everything(
    cloud: Arc<FakeCloud>,
    writer: Arc<MemoryStateWriter>,
) {
    let engine = reconciler(&cloud, &writer);
    let config = full_config();
    engine
        .reconcile(&config, None, &CancellationToken::new())
        .await
        .expect("reconcile succeeds");

    let report = engine
        .delete(&config, writer.last_state(), &CancellationToken::new())
        .await
        .expect("delete succeeds")
        .expect("delete ran");

    assert_eq!(cloud.resource_count(), 0);
    assert!(!report.state.data.contains_key(keys::RESOURCES_EXIST));

    let again = engine
        .delete(&config, Some(report.state), &CancellationToken::new())
        .await
        .expect("second delete");
    assert!(again.is_none());
}
