//! Router NAT updates.
//!
//! NAT gateways are nested inside a router, so every change is a patch of the
//! router's full NAT list. Removing the last gateway still has to send the
//! (now empty) list explicitly.

use crate::resources::{NatSubnetwork, Router, RouterNat};

use super::field::{Field, Patch, SendMode};
use super::{matches_optional, set_equivalent, set_equivalent_by};

/// Update for a [`Router`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouterPatch {
    /// Complete replacement NAT list.
    pub nats: Field<Vec<RouterNat>>,
}

impl RouterPatch {
    /// Applies the patch to a descriptor.
    pub fn apply_to(&self, router: &mut Router) {
        self.nats.apply_to(&mut router.nats);
    }
}

impl Patch for RouterPatch {
    fn field_modes(&self) -> Vec<(&'static str, SendMode)> {
        vec![("nats", self.nats.send_mode())]
    }
}

/// Returns `true` when `current` already satisfies `desired`.
///
/// NAT IPs and subnetwork entries are sets; optional tuning values only take
/// part in the comparison when the desired gateway sets them.
#[must_use]
pub fn nat_equivalent(current: &RouterNat, desired: &RouterNat) -> bool {
    current.name == desired.name
        && current.nat_ip_allocate_option == desired.nat_ip_allocate_option
        && set_equivalent(&current.nat_ips, &desired.nat_ips)
        && current.source_subnetwork_ip_ranges_to_nat == desired.source_subnetwork_ip_ranges_to_nat
        && subnetworks_equivalent(&current.subnetworks, &desired.subnetworks)
        && current.enable_dynamic_port_allocation == desired.enable_dynamic_port_allocation
        && current.enable_endpoint_independent_mapping
            == desired.enable_endpoint_independent_mapping
        && matches_optional(
            current.min_ports_per_vm.as_ref(),
            desired.min_ports_per_vm.as_ref(),
        )
        && matches_optional(
            current.max_ports_per_vm.as_ref(),
            desired.max_ports_per_vm.as_ref(),
        )
        && matches_optional(
            current.icmp_idle_timeout_sec.as_ref(),
            desired.icmp_idle_timeout_sec.as_ref(),
        )
        && matches_optional(
            current.udp_idle_timeout_sec.as_ref(),
            desired.udp_idle_timeout_sec.as_ref(),
        )
        && matches_optional(
            current.tcp_established_idle_timeout_sec.as_ref(),
            desired.tcp_established_idle_timeout_sec.as_ref(),
        )
        && matches_optional(
            current.tcp_transitory_idle_timeout_sec.as_ref(),
            desired.tcp_transitory_idle_timeout_sec.as_ref(),
        )
        && matches_optional(current.log_config.as_ref(), desired.log_config.as_ref())
}

/// Subnetwork entries match as a set; each entry's range list does too.
fn subnetworks_equivalent(current: &[NatSubnetwork], desired: &[NatSubnetwork]) -> bool {
    set_equivalent_by(current, desired, |have, wanted| {
        have.name == wanted.name
            && set_equivalent(&have.source_ip_ranges_to_nat, &wanted.source_ip_ranges_to_nat)
    })
}

/// Inserts or replaces the gateway named `desired.name`.
///
/// Returns `None` when the router already carries an equivalent gateway. An
/// existing gateway with the same name is replaced in place, otherwise the
/// gateway is appended.
#[must_use]
pub fn upsert_nat(router: &Router, desired: &RouterNat) -> Option<RouterPatch> {
    let mut nats = router.nats.clone();
    match nats.iter().position(|nat| nat.name == desired.name) {
        Some(index) => {
            let slot = nats.get_mut(index)?;
            if nat_equivalent(slot, desired) {
                return None;
            }
            slot.clone_from(desired);
        }
        None => nats.push(desired.clone()),
    }
    Some(RouterPatch {
        nats: Field::Set(nats),
    })
}

/// Removes the gateway called `name`.
///
/// Returns `None` when the router has no such gateway. The resulting list is
/// force-sent even when empty.
#[must_use]
pub fn remove_nat(router: &Router, name: &str) -> Option<RouterPatch> {
    let index = router.nats.iter().position(|nat| nat.name == name)?;
    let mut nats = router.nats.clone();
    nats.remove(index);
    Some(RouterPatch {
        nats: Field::Set(nats),
    })
}
