//! Diff/upsert functions computing minimal updates per resource kind.
//!
//! Every function compares a current descriptor with a desired one and
//! returns `None` (or an empty list) when nothing needs to change. Immutable
//! and output-only fields never take part in the comparison. Multi-value
//! fields that represent sets are compared with [`set_equivalent`], which
//! ignores the order of the top-level elements but compares each element
//! (including nested lists such as firewall ports) order-sensitively.

use thiserror::Error;

use crate::resources::CidrParseError;

mod bucket;
mod field;
mod firewall;
mod nat;
mod network;
mod subnet;

pub use bucket::{BucketPatch, bucket_patch};
pub use field::{Field, Patch, SendMode, ZeroValue};
pub use firewall::{FirewallPatch, firewall_patch};
pub use nat::{RouterPatch, nat_equivalent, remove_nat, upsert_nat};
pub use network::{NetworkPatch, network_patch};
pub use subnet::{SubnetPatch, SubnetUpdate, subnet_updates};

/// Errors raised while computing an update.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum DiffError {
    /// Raised when a desired range is neither equal to nor a superset of the
    /// current one. Subnet ranges can only ever be expanded.
    #[error(
        "subnet {subnet}: range {desired} does not contain current range {current}; ranges can only be expanded"
    )]
    RangeNotExpandable {
        /// Subnet name.
        subnet: String,
        /// Range currently assigned.
        current: String,
        /// Range requested by configuration.
        desired: String,
    },
    /// Raised when a range cannot be parsed.
    #[error("subnet {subnet}: {source}")]
    InvalidRange {
        /// Subnet name.
        subnet: String,
        /// Parse failure.
        #[source]
        source: CidrParseError,
    },
}

/// Order-independent equality of two sequences.
///
/// The sequences are equivalent when they have the same length and every
/// element of `lhs` can be paired with a distinct, structurally equal element
/// of `rhs`. Elements themselves are compared with `PartialEq`, so nested
/// sequences remain order-sensitive.
#[must_use]
pub fn set_equivalent<T: PartialEq>(lhs: &[T], rhs: &[T]) -> bool {
    set_equivalent_by(lhs, rhs, |left, right| left == right)
}

/// Like [`set_equivalent`], with element equality decided by `same`. Every
/// element is paired with exactly one counterpart.
#[must_use]
pub fn set_equivalent_by<T, F>(lhs: &[T], rhs: &[T], same: F) -> bool
where
    F: Fn(&T, &T) -> bool,
{
    if lhs.len() != rhs.len() {
        return false;
    }
    let mut matched = vec![false; rhs.len()];
    for item in lhs {
        let Some(index) = rhs
            .iter()
            .zip(&matched)
            .position(|(other, used)| !*used && same(item, other))
        else {
            return false;
        };
        if let Some(slot) = matched.get_mut(index) {
            *slot = true;
        }
    }
    true
}

/// Returns `Set(desired)` when the two sets differ, `Unset` otherwise.
fn diff_set<T: Clone + PartialEq>(current: &[T], desired: &[T]) -> Field<Vec<T>> {
    if set_equivalent(current, desired) {
        Field::Unset
    } else {
        Field::Set(desired.to_vec())
    }
}

/// Returns `Set(desired)` when the two values differ, `Unset` otherwise.
fn diff_value<T: Clone + PartialEq>(current: &T, desired: &T) -> Field<T> {
    if current == desired {
        Field::Unset
    } else {
        Field::Set(desired.clone())
    }
}

/// Compares an optional setting, treating an unset desired value as "keep
/// whatever the provider chose".
fn matches_optional<T: PartialEq>(current: Option<&T>, desired: Option<&T>) -> bool {
    desired.is_none() || current == desired
}
