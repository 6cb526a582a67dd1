//! Tests for the persisted state envelope and the file store.

use super::*;
use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;

struct StoreFixture {
    _tmp: TempDir,
    store: FileStateStore,
}

#[fixture]
fn store_fixture() -> StoreFixture {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = Utf8PathBuf::from_path_buf(tmp.path().join("nested").join("state.json"))
        .unwrap_or_else(|err| panic!("temp path should be utf8: {}", err.display()));
    StoreFixture {
        _tmp: tmp,
        store: FileStateStore::new(path),
    }
}

fn sample_state() -> PersistedState {
    PersistedState::new(
        BTreeMap::from([
            (String::from("resources-exist"), String::from("true")),
            (String::from("ids/network"), String::from("42")),
        ]),
        vec![RouteEntry {
            name: String::from("shoot-route-1"),
            dest_range: String::from("100.96.1.0/24"),
            instance: Some(String::from("node-1")),
        }],
    )
}

#[test]
fn current_envelope_is_accepted() {
    let raw = serde_json::to_value(sample_state()).unwrap_or_else(|err| panic!("encode: {err}"));
    let decoded = PersistedState::decode(&raw).unwrap_or_else(|err| panic!("decode: {err}"));
    assert_eq!(decoded, Some(sample_state()));
}

#[rstest]
#[case(json!({"kind": "InfrastructureState", "apiVersion": "netforge.dev/v1alpha0", "data": {"a": "b"}}))]
#[case(json!({"kind": "WorkerState", "apiVersion": "netforge.dev/v1alpha1", "data": {"a": "b"}}))]
#[case(json!({"apiVersion": "netforge.dev/v1alpha1", "data": {"a": "b"}}))]
#[case(json!({"data": {"a": "b"}}))]
fn foreign_envelopes_are_ignored(#[case] raw: Value) {
    let decoded = PersistedState::decode(&raw).unwrap_or_else(|err| panic!("decode: {err}"));
    assert_eq!(decoded, None);
}

#[test]
fn matching_markers_over_invalid_body_are_rejected() {
    let raw = json!({
        "kind": STATE_KIND,
        "apiVersion": STATE_API_VERSION,
        "data": ["not", "a", "map"],
    });
    let err = PersistedState::decode(&raw).expect_err("body must not be partially read");
    assert!(matches!(err, StateError::Malformed { .. }), "{err}");
}

#[rstest]
fn load_without_file_is_empty(store_fixture: StoreFixture) {
    let loaded = store_fixture
        .store
        .load()
        .unwrap_or_else(|err| panic!("load: {err}"));
    assert_eq!(loaded, None);
}

#[rstest]
#[tokio::test]
async fn written_state_loads_back(store_fixture: StoreFixture) {
    let StoreFixture { store, .. } = &store_fixture;
    store
        .write_state(&sample_state())
        .await
        .unwrap_or_else(|err| panic!("write: {err}"));

    let loaded = store.load().unwrap_or_else(|err| panic!("load: {err}"));
    assert_eq!(loaded, Some(sample_state()));
}

#[rstest]
#[tokio::test]
async fn status_is_written_next_to_state(store_fixture: StoreFixture) {
    let StoreFixture { store, .. } = &store_fixture;
    let status = InfrastructureStatus {
        network_name: Some(String::from("shoot")),
        firewall_rules: vec![String::from("shoot-allow-internal-access")],
        ..InfrastructureStatus::default()
    };
    store
        .write_status(&status)
        .await
        .unwrap_or_else(|err| panic!("write: {err}"));

    assert!(store.status_path().as_str().ends_with("state.status.json"));
    let contents = std::fs::read_to_string(store.status_path())
        .unwrap_or_else(|err| panic!("read status: {err}"));
    let decoded: InfrastructureStatus =
        serde_json::from_str(&contents).unwrap_or_else(|err| panic!("parse status: {err}"));
    assert_eq!(decoded, status);
}
