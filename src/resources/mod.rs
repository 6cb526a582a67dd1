//! Plain descriptors mirroring the remote API's resource representations.
//!
//! Every descriptor mixes three kinds of fields: immutable ones (name,
//! self-link, creation timestamp), update-eligible ones, and output-only
//! ones assigned by the provider. Only update-eligible fields take part in
//! diffing; see [`crate::diff`].

mod cidr;
mod compute;
mod iam;
mod storage;

pub use cidr::{Cidr, CidrParseError};
pub use compute::{
    Address, Direction, Firewall, FirewallRule, NatIpAllocateOption, NatLogConfig, NatLogFilter,
    NatSubnetwork, Network, Route, Router, RouterNat, RoutingMode, SourceSubnetworkIpRanges,
    SubnetLogConfig, Subnetwork,
};
pub use iam::ServiceAccount;
pub use storage::{
    Bucket, DAYS_SINCE_CUSTOM_TIME, LifecycleAction, LifecycleCondition, LifecycleRule,
};
