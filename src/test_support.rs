//! Test support utilities shared across unit and integration tests.
//!
//! [`FakeCloud`] is an in-memory provider implementing every remote API
//! trait. It records call counts, can inject failures per method and keeps
//! asynchronous operations pending for a configurable number of polls.
//! [`MemoryStateWriter`] records every persisted snapshot.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::future::ready;

use crate::api::{
    ApiError, ApiFuture, ComputeApi, ErrorCode, IamApi, Operation, OperationStatus, StorageApi,
};
use crate::diff::{BucketPatch, FirewallPatch, NetworkPatch, RouterPatch, SubnetPatch};
use crate::resources::{
    Address, Bucket, Firewall, Network, Route, Router, ServiceAccount, Subnetwork,
};
use crate::state::{InfrastructureStatus, PersistedState, StateError, StateWriter, WriteFuture};

const CREATED_AT: &str = "2024-01-01T00:00:00Z";

#[derive(Debug, Default)]
struct PendingOperation {
    remaining: u32,
    error: Option<String>,
}

#[derive(Debug, Default)]
struct FakeState {
    networks: BTreeMap<String, Network>,
    subnetworks: BTreeMap<String, Subnetwork>,
    routers: BTreeMap<String, Router>,
    firewalls: BTreeMap<String, Firewall>,
    routes: BTreeMap<String, Route>,
    addresses: BTreeMap<String, Address>,
    service_accounts: BTreeMap<String, ServiceAccount>,
    buckets: BTreeMap<String, Bucket>,
    operations: HashMap<String, PendingOperation>,
    calls: BTreeMap<String, usize>,
    failures: HashMap<String, ApiError>,
    operation_failures: HashMap<String, String>,
    operation_polls: u32,
    hung_operation_polls: bool,
    filters: Vec<String>,
    next_id: u64,
}

impl FakeState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Starts an operation for `method`. The flag is `false` when the
    /// operation is scripted to fail, in which case the mutation must not
    /// apply.
    fn start(&mut self, method: &str) -> (Operation, bool) {
        let id = self.next_id();
        let name = format!("operation-{id}");
        let error = self.operation_failures.get(method).cloned();
        let applies = error.is_none();
        let operation = if self.operation_polls == 0 {
            Operation {
                name,
                status: OperationStatus::Done,
                error,
                ..Operation::default()
            }
        } else {
            self.operations.insert(
                name.clone(),
                PendingOperation {
                    remaining: self.operation_polls,
                    error,
                },
            );
            Operation {
                name,
                status: OperationStatus::Running,
                ..Operation::default()
            }
        };
        (operation, applies)
    }
}

fn not_found(kind: &str, name: &str) -> ApiError {
    ApiError::not_found(format!("{kind} {name} not found"))
}

fn conflict(kind: &str, name: &str) -> ApiError {
    ApiError::new(ErrorCode::Conflict, format!("{kind} {name} already exists"))
}

fn link(kind: &str, name: &str) -> String {
    format!("https://fake.cloud/{kind}/{name}")
}

/// In-memory provider for tests.
#[derive(Debug, Default)]
pub struct FakeCloud {
    state: Mutex<FakeState>,
}

impl FakeCloud {
    /// Creates an empty provider whose operations finish immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a call and returns the state, or the injected failure.
    fn enter(&self, method: &str) -> Result<MutexGuard<'_, FakeState>, ApiError> {
        let mut state = self.lock();
        *state.calls.entry(method.to_owned()).or_default() += 1;
        if let Some(err) = state.failures.get(method).cloned() {
            return Err(err);
        }
        Ok(state)
    }

    /// Keeps every later operation pending for `polls` refreshes.
    pub fn set_operation_polls(&self, polls: u32) {
        self.lock().operation_polls = polls;
    }

    /// Makes every later operation refresh hang without answering.
    pub fn hang_operation_polls(&self) {
        self.lock().hung_operation_polls = true;
    }

    /// Number of calls made to `method`, failed ones included.
    #[must_use]
    pub fn calls(&self, method: &str) -> usize {
        self.lock().calls.get(method).copied().unwrap_or_default()
    }

    /// Makes every call to `method` fail with `err`.
    pub fn fail(&self, method: &str, err: ApiError) {
        self.lock().failures.insert(method.to_owned(), err);
    }

    /// Removes failures injected for `method`.
    pub fn clear_failure(&self, method: &str) {
        let mut state = self.lock();
        state.failures.remove(method);
        state.operation_failures.remove(method);
    }

    /// Makes operations started by `method` finish with `message`.
    pub fn fail_operation(&self, method: &str, message: &str) {
        self.lock()
            .operation_failures
            .insert(method.to_owned(), message.to_owned());
    }

    /// Filters passed to list calls, in call order.
    #[must_use]
    pub fn filters(&self) -> Vec<String> {
        self.lock().filters.clone()
    }

    /// Stores a network as if it already existed.
    pub fn seed_network(&self, network: Network) {
        self.lock().networks.insert(network.name.clone(), network);
    }

    /// Stores a subnetwork as if it already existed.
    pub fn seed_subnetwork(&self, subnet: Subnetwork) {
        self.lock().subnetworks.insert(subnet.name.clone(), subnet);
    }

    /// Stores a router as if it already existed.
    pub fn seed_router(&self, router: Router) {
        self.lock().routers.insert(router.name.clone(), router);
    }

    /// Stores a firewall rule as if it already existed.
    pub fn seed_firewall(&self, firewall: Firewall) {
        self.lock().firewalls.insert(firewall.name.clone(), firewall);
    }

    /// Stores a route as if it already existed.
    pub fn seed_route(&self, route: Route) {
        self.lock().routes.insert(route.name.clone(), route);
    }

    /// Stores an external address.
    pub fn seed_address(&self, address: Address) {
        self.lock().addresses.insert(address.name.clone(), address);
    }

    /// Stores a bucket as if it already existed.
    pub fn seed_bucket(&self, bucket: Bucket) {
        self.lock().buckets.insert(bucket.name.clone(), bucket);
    }

    /// Current network called `name`.
    #[must_use]
    pub fn network(&self, name: &str) -> Option<Network> {
        self.lock().networks.get(name).cloned()
    }

    /// Current subnetwork called `name`.
    #[must_use]
    pub fn subnetwork(&self, name: &str) -> Option<Subnetwork> {
        self.lock().subnetworks.get(name).cloned()
    }

    /// Current router called `name`.
    #[must_use]
    pub fn router(&self, name: &str) -> Option<Router> {
        self.lock().routers.get(name).cloned()
    }

    /// Current firewall rule called `name`.
    #[must_use]
    pub fn firewall(&self, name: &str) -> Option<Firewall> {
        self.lock().firewalls.get(name).cloned()
    }

    /// Names of all firewall rules.
    #[must_use]
    pub fn firewall_names(&self) -> Vec<String> {
        self.lock().firewalls.keys().cloned().collect()
    }

    /// Names of all routes.
    #[must_use]
    pub fn route_names(&self) -> Vec<String> {
        self.lock().routes.keys().cloned().collect()
    }

    /// Current service account with `email`.
    #[must_use]
    pub fn service_account(&self, email: &str) -> Option<ServiceAccount> {
        self.lock().service_accounts.get(email).cloned()
    }

    /// Current bucket called `name`.
    #[must_use]
    pub fn bucket(&self, name: &str) -> Option<Bucket> {
        self.lock().buckets.get(name).cloned()
    }

    /// Number of stored resources of every kind.
    #[must_use]
    pub fn resource_count(&self) -> usize {
        let state = self.lock();
        state.networks.len()
            + state.subnetworks.len()
            + state.routers.len()
            + state.firewalls.len()
            + state.routes.len()
            + state.service_accounts.len()
            + state.buckets.len()
    }

    fn get<T: Clone>(
        &self,
        method: &str,
        kind: &str,
        name: &str,
        select: impl FnOnce(&FakeState) -> Option<&T>,
    ) -> Result<T, ApiError> {
        let state = self.enter(method)?;
        select(&state).cloned().ok_or_else(|| not_found(kind, name))
    }

    fn mutate(
        &self,
        method: &str,
        apply: impl FnOnce(&mut FakeState) -> Result<(), ApiError>,
    ) -> Result<Operation, ApiError> {
        let mut state = self.enter(method)?;
        let (operation, applies) = state.start(method);
        if applies {
            apply(&mut state)?;
        }
        Ok(operation)
    }
}

fn done<'a, T: Send + 'a>(result: Result<T, ApiError>) -> ApiFuture<'a, T> {
    Box::pin(ready(result))
}

impl ComputeApi for FakeCloud {
    fn get_network<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Network> {
        done(self.get("get_network", "network", name, |state| {
            state.networks.get(name)
        }))
    }

    fn insert_network<'a>(
        &'a self,
        network: &'a Network,
        _request_id: &'a str,
    ) -> ApiFuture<'a, Operation> {
        done(self.mutate("insert_network", |state| {
            if state.networks.contains_key(&network.name) {
                return Err(conflict("network", &network.name));
            }
            let id = state.next_id();
            let stored = Network {
                self_link: link("networks", &network.name),
                id: Some(id),
                creation_timestamp: Some(CREATED_AT.to_owned()),
                ..network.clone()
            };
            state.networks.insert(network.name.clone(), stored);
            Ok(())
        }))
    }

    fn patch_network<'a>(
        &'a self,
        name: &'a str,
        patch: &'a NetworkPatch,
    ) -> ApiFuture<'a, Operation> {
        done(self.mutate("patch_network", |state| {
            let network = state
                .networks
                .get_mut(name)
                .ok_or_else(|| not_found("network", name))?;
            patch.apply_to(network);
            Ok(())
        }))
    }

    fn delete_network<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Operation> {
        done(self.mutate("delete_network", |state| {
            let self_link = link("networks", name);
            if state
                .subnetworks
                .values()
                .any(|subnet| subnet.network == self_link)
            {
                return Err(ApiError::from_status(
                    400,
                    format!("network {name} is still in use by subnetworks"),
                ));
            }
            state
                .networks
                .remove(name)
                .map(drop)
                .ok_or_else(|| not_found("network", name))
        }))
    }

    fn get_subnetwork<'a>(
        &'a self,
        _region: &'a str,
        name: &'a str,
    ) -> ApiFuture<'a, Subnetwork> {
        done(self.get("get_subnetwork", "subnetwork", name, |state| {
            state.subnetworks.get(name)
        }))
    }

    fn insert_subnetwork<'a>(
        &'a self,
        subnet: &'a Subnetwork,
        _request_id: &'a str,
    ) -> ApiFuture<'a, Operation> {
        done(self.mutate("insert_subnetwork", |state| {
            if state.subnetworks.contains_key(&subnet.name) {
                return Err(conflict("subnetwork", &subnet.name));
            }
            let id = state.next_id();
            let gateway = subnet
                .ip_cidr_range
                .parse::<crate::resources::Cidr>()
                .ok()
                .map(|range| gateway_of(&range));
            let stored = Subnetwork {
                self_link: link("subnetworks", &subnet.name),
                id: Some(id),
                creation_timestamp: Some(CREATED_AT.to_owned()),
                gateway_address: gateway,
                fingerprint: format!("fp-{id}"),
                ..subnet.clone()
            };
            state.subnetworks.insert(subnet.name.clone(), stored);
            Ok(())
        }))
    }

    fn expand_subnetwork_range<'a>(
        &'a self,
        _region: &'a str,
        name: &'a str,
        ip_cidr_range: &'a str,
    ) -> ApiFuture<'a, Operation> {
        done(self.mutate("expand_subnetwork_range", |state| {
            let id = state.next_id();
            let subnet = state
                .subnetworks
                .get_mut(name)
                .ok_or_else(|| not_found("subnetwork", name))?;
            ip_cidr_range.clone_into(&mut subnet.ip_cidr_range);
            subnet.fingerprint = format!("fp-{id}");
            Ok(())
        }))
    }

    fn patch_subnetwork<'a>(
        &'a self,
        _region: &'a str,
        name: &'a str,
        patch: &'a SubnetPatch,
        fingerprint: &'a str,
    ) -> ApiFuture<'a, Operation> {
        done(self.mutate("patch_subnetwork", |state| {
            let id = state.next_id();
            let subnet = state
                .subnetworks
                .get_mut(name)
                .ok_or_else(|| not_found("subnetwork", name))?;
            if subnet.fingerprint != fingerprint {
                return Err(ApiError::from_status(
                    412,
                    format!("fingerprint {fingerprint} of subnetwork {name} is stale"),
                ));
            }
            patch.apply_to(subnet);
            subnet.fingerprint = format!("fp-{id}");
            Ok(())
        }))
    }

    fn delete_subnetwork<'a>(
        &'a self,
        _region: &'a str,
        name: &'a str,
    ) -> ApiFuture<'a, Operation> {
        done(self.mutate("delete_subnetwork", |state| {
            state
                .subnetworks
                .remove(name)
                .map(drop)
                .ok_or_else(|| not_found("subnetwork", name))
        }))
    }

    fn get_router<'a>(&'a self, _region: &'a str, name: &'a str) -> ApiFuture<'a, Router> {
        done(self.get("get_router", "router", name, |state| {
            state.routers.get(name)
        }))
    }

    fn insert_router<'a>(
        &'a self,
        router: &'a Router,
        _request_id: &'a str,
    ) -> ApiFuture<'a, Operation> {
        done(self.mutate("insert_router", |state| {
            if state.routers.contains_key(&router.name) {
                return Err(conflict("router", &router.name));
            }
            let id = state.next_id();
            let stored = Router {
                self_link: link("routers", &router.name),
                id: Some(id),
                creation_timestamp: Some(CREATED_AT.to_owned()),
                fingerprint: format!("fp-{id}"),
                ..router.clone()
            };
            state.routers.insert(router.name.clone(), stored);
            Ok(())
        }))
    }

    fn patch_router<'a>(
        &'a self,
        _region: &'a str,
        name: &'a str,
        patch: &'a RouterPatch,
    ) -> ApiFuture<'a, Operation> {
        done(self.mutate("patch_router", |state| {
            let router = state
                .routers
                .get_mut(name)
                .ok_or_else(|| not_found("router", name))?;
            patch.apply_to(router);
            Ok(())
        }))
    }

    fn delete_router<'a>(&'a self, _region: &'a str, name: &'a str) -> ApiFuture<'a, Operation> {
        done(self.mutate("delete_router", |state| {
            state
                .routers
                .remove(name)
                .map(drop)
                .ok_or_else(|| not_found("router", name))
        }))
    }

    fn get_firewall<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Firewall> {
        done(self.get("get_firewall", "firewall", name, |state| {
            state.firewalls.get(name)
        }))
    }

    fn list_firewalls<'a>(&'a self, filter: &'a str) -> ApiFuture<'a, Vec<Firewall>> {
        done(self.enter("list_firewalls").map(|mut state| {
            state.filters.push(filter.to_owned());
            state.firewalls.values().cloned().collect()
        }))
    }

    fn insert_firewall<'a>(
        &'a self,
        firewall: &'a Firewall,
        _request_id: &'a str,
    ) -> ApiFuture<'a, Operation> {
        done(self.mutate("insert_firewall", |state| {
            if state.firewalls.contains_key(&firewall.name) {
                return Err(conflict("firewall", &firewall.name));
            }
            let id = state.next_id();
            let stored = Firewall {
                self_link: link("firewalls", &firewall.name),
                id: Some(id),
                creation_timestamp: Some(CREATED_AT.to_owned()),
                ..firewall.clone()
            };
            state.firewalls.insert(firewall.name.clone(), stored);
            Ok(())
        }))
    }

    fn patch_firewall<'a>(
        &'a self,
        name: &'a str,
        patch: &'a FirewallPatch,
    ) -> ApiFuture<'a, Operation> {
        done(self.mutate("patch_firewall", |state| {
            let firewall = state
                .firewalls
                .get_mut(name)
                .ok_or_else(|| not_found("firewall", name))?;
            patch.apply_to(firewall);
            Ok(())
        }))
    }

    fn delete_firewall<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Operation> {
        done(self.mutate("delete_firewall", |state| {
            state
                .firewalls
                .remove(name)
                .map(drop)
                .ok_or_else(|| not_found("firewall", name))
        }))
    }

    fn list_routes<'a>(&'a self, filter: &'a str) -> ApiFuture<'a, Vec<Route>> {
        done(self.enter("list_routes").map(|mut state| {
            state.filters.push(filter.to_owned());
            state.routes.values().cloned().collect()
        }))
    }

    fn delete_route<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Operation> {
        done(self.mutate("delete_route", |state| {
            state
                .routes
                .remove(name)
                .map(drop)
                .ok_or_else(|| not_found("route", name))
        }))
    }

    fn get_address<'a>(&'a self, _region: &'a str, name: &'a str) -> ApiFuture<'a, Address> {
        done(self.get("get_address", "address", name, |state| {
            state.addresses.get(name)
        }))
    }

    fn get_operation<'a>(&'a self, operation: &'a Operation) -> ApiFuture<'a, Operation> {
        let result = self.enter("get_operation").and_then(|mut state| {
            if state.hung_operation_polls {
                return Ok(None);
            }
            let pending = state
                .operations
                .get_mut(&operation.name)
                .ok_or_else(|| not_found("operation", &operation.name))?;
            pending.remaining = pending.remaining.saturating_sub(1);
            if pending.remaining > 0 {
                return Ok(Some(Operation {
                    status: OperationStatus::Running,
                    ..operation.clone()
                }));
            }
            let finished = state.operations.remove(&operation.name).unwrap_or_default();
            Ok(Some(Operation {
                status: OperationStatus::Done,
                error: finished.error,
                ..operation.clone()
            }))
        });
        match result {
            Ok(Some(refreshed)) => done(Ok(refreshed)),
            Ok(None) => Box::pin(futures::future::pending()),
            Err(err) => done(Err(err)),
        }
    }
}

fn gateway_of(range: &crate::resources::Cidr) -> String {
    match range.address() {
        std::net::IpAddr::V4(address) => {
            std::net::Ipv4Addr::from(u32::from(address).saturating_add(1)).to_string()
        }
        std::net::IpAddr::V6(address) => {
            std::net::Ipv6Addr::from(u128::from(address).saturating_add(1)).to_string()
        }
    }
}

impl IamApi for FakeCloud {
    fn get_service_account<'a>(
        &'a self,
        _project_id: &'a str,
        email: &'a str,
    ) -> ApiFuture<'a, ServiceAccount> {
        done(
            self.get("get_service_account", "service account", email, |state| {
                state.service_accounts.get(email)
            }),
        )
    }

    fn create_service_account<'a>(
        &'a self,
        project_id: &'a str,
        account_id: &'a str,
        display_name: &'a str,
    ) -> ApiFuture<'a, ServiceAccount> {
        let result = self.enter("create_service_account").and_then(|mut state| {
            let email = ServiceAccount::email_for(account_id, project_id);
            if state.service_accounts.contains_key(&email) {
                return Err(conflict("service account", &email));
            }
            let id = state.next_id();
            let account = ServiceAccount {
                account_id: account_id.to_owned(),
                name: format!("projects/{project_id}/serviceAccounts/{email}"),
                email: email.clone(),
                unique_id: format!("1000{id}"),
                display_name: display_name.to_owned(),
            };
            state.service_accounts.insert(email, account.clone());
            Ok(account)
        });
        done(result)
    }

    fn delete_service_account<'a>(
        &'a self,
        _project_id: &'a str,
        email: &'a str,
    ) -> ApiFuture<'a, ()> {
        let result = self.enter("delete_service_account").and_then(|mut state| {
            state
                .service_accounts
                .remove(email)
                .map(drop)
                .ok_or_else(|| not_found("service account", email))
        });
        done(result)
    }
}

impl StorageApi for FakeCloud {
    fn get_bucket<'a>(&'a self, name: &'a str) -> ApiFuture<'a, Bucket> {
        done(self.get("get_bucket", "bucket", name, |state| {
            state.buckets.get(name)
        }))
    }

    fn insert_bucket<'a>(
        &'a self,
        _project_id: &'a str,
        bucket: &'a Bucket,
    ) -> ApiFuture<'a, Bucket> {
        let result = self.enter("insert_bucket").and_then(|mut state| {
            if state.buckets.contains_key(&bucket.name) {
                return Err(conflict("bucket", &bucket.name));
            }
            let stored = Bucket {
                time_created: Some(CREATED_AT.to_owned()),
                metageneration: 1,
                ..bucket.clone()
            };
            state.buckets.insert(bucket.name.clone(), stored.clone());
            Ok(stored)
        });
        done(result)
    }

    fn patch_bucket<'a>(
        &'a self,
        name: &'a str,
        patch: &'a BucketPatch,
        metageneration: i64,
    ) -> ApiFuture<'a, Bucket> {
        let result = self.enter("patch_bucket").and_then(|mut state| {
            let bucket = state
                .buckets
                .get_mut(name)
                .ok_or_else(|| not_found("bucket", name))?;
            if bucket.metageneration != metageneration {
                return Err(ApiError::from_status(
                    412,
                    format!("metageneration {metageneration} of bucket {name} is stale"),
                ));
            }
            patch.apply_to(bucket);
            bucket.metageneration += 1;
            Ok(bucket.clone())
        });
        done(result)
    }

    fn delete_bucket<'a>(&'a self, name: &'a str) -> ApiFuture<'a, ()> {
        let result = self.enter("delete_bucket").and_then(|mut state| {
            state
                .buckets
                .remove(name)
                .map(drop)
                .ok_or_else(|| not_found("bucket", name))
        });
        done(result)
    }
}

#[derive(Debug, Default)]
struct Recorded {
    states: Vec<PersistedState>,
    statuses: Vec<InfrastructureStatus>,
    failure: Option<String>,
}

/// State writer keeping every snapshot in memory.
#[derive(Debug, Default)]
pub struct MemoryStateWriter {
    recorded: Mutex<Recorded>,
}

impl MemoryStateWriter {
    /// Creates a writer with no recorded snapshots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes every later write fail with `message`.
    pub fn fail_with(&self, message: &str) {
        self.lock().failure = Some(message.to_owned());
    }

    /// Every state snapshot written so far.
    #[must_use]
    pub fn states(&self) -> Vec<PersistedState> {
        self.lock().states.clone()
    }

    /// The most recent state snapshot.
    #[must_use]
    pub fn last_state(&self) -> Option<PersistedState> {
        self.lock().states.last().cloned()
    }

    /// The most recent status report.
    #[must_use]
    pub fn last_status(&self) -> Option<InfrastructureStatus> {
        self.lock().statuses.last().cloned()
    }

    fn record(&self, apply: impl FnOnce(&mut Recorded)) -> Result<(), StateError> {
        let mut recorded = self.lock();
        if let Some(message) = &recorded.failure {
            return Err(StateError::Rejected {
                message: message.clone(),
            });
        }
        apply(&mut recorded);
        Ok(())
    }
}

impl StateWriter for MemoryStateWriter {
    fn write_state<'a>(&'a self, state: &'a PersistedState) -> WriteFuture<'a> {
        let result = self.record(|recorded| recorded.states.push(state.clone()));
        Box::pin(ready(result))
    }

    fn write_status<'a>(&'a self, status: &'a InfrastructureStatus) -> WriteFuture<'a> {
        let result = self.record(|recorded| recorded.statuses.push(status.clone()));
        Box::pin(ready(result))
    }
}
