//! IPv4/IPv6 address prefixes used for subnet range comparisons.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use thiserror::Error;

/// Errors raised when parsing a CIDR string.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CidrParseError {
    /// Raised when the value has no `/<prefix>` suffix.
    #[error("'{value}' is missing a prefix length")]
    MissingPrefix {
        /// Raw value supplied by the caller.
        value: String,
    },
    /// Raised when the address part is not an IP address.
    #[error("'{value}' does not start with a valid IP address")]
    InvalidAddress {
        /// Raw value supplied by the caller.
        value: String,
    },
    /// Raised when the prefix length is not a number or exceeds the address width.
    #[error("'{value}' has an invalid prefix length")]
    InvalidPrefix {
        /// Raw value supplied by the caller.
        value: String,
    },
    /// Raised when bits beyond the prefix are set in the address.
    #[error("'{value}' has host bits set; expected {canonical}")]
    HostBitsSet {
        /// Raw value supplied by the caller.
        value: String,
        /// Canonical form with host bits cleared.
        canonical: String,
    },
}

/// A canonical address prefix such as `10.250.0.0/16`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Cidr {
    address: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Returns the network address.
    #[must_use]
    pub const fn address(&self) -> IpAddr {
        self.address
    }

    /// Returns the prefix length.
    #[must_use]
    pub const fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Returns `true` when every address of `other` lies within `self`.
    #[must_use]
    pub fn contains(&self, other: &Self) -> bool {
        if !self.same_family(other) || self.prefix > other.prefix {
            return false;
        }
        let width = address_width(self.address);
        masked(bits(other.address), self.prefix, width) == bits(self.address)
    }

    /// Returns `true` when `self` contains `other` and is strictly larger.
    #[must_use]
    pub fn properly_contains(&self, other: &Self) -> bool {
        self.prefix < other.prefix && self.contains(other)
    }

    /// Returns `true` when the two prefixes share at least one address.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.contains(other) || other.contains(self)
    }

    const fn same_family(&self, other: &Self) -> bool {
        matches!(
            (self.address, other.address),
            (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_))
        )
    }
}

const fn address_width(address: IpAddr) -> u8 {
    match address {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn bits(address: IpAddr) -> u128 {
    match address {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

fn masked(value: u128, prefix: u8, width: u8) -> u128 {
    if prefix == 0 {
        return 0;
    }
    let host_bits = u32::from(width - prefix);
    value.checked_shr(host_bits).unwrap_or(0) << host_bits
}

fn from_bits(bits: u128, template: IpAddr) -> IpAddr {
    match template {
        IpAddr::V4(_) => IpAddr::from(u32::try_from(bits).unwrap_or(u32::MAX).to_be_bytes()),
        IpAddr::V6(_) => IpAddr::from(bits.to_be_bytes()),
    }
}

impl FromStr for Cidr {
    type Err = CidrParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let Some((address_part, prefix_part)) = trimmed.split_once('/') else {
            return Err(CidrParseError::MissingPrefix {
                value: value.to_owned(),
            });
        };
        let address =
            IpAddr::from_str(address_part).map_err(|_| CidrParseError::InvalidAddress {
                value: value.to_owned(),
            })?;
        let prefix = prefix_part
            .parse::<u8>()
            .ok()
            .filter(|prefix| *prefix <= address_width(address))
            .ok_or_else(|| CidrParseError::InvalidPrefix {
                value: value.to_owned(),
            })?;

        let network_bits = masked(bits(address), prefix, address_width(address));
        if network_bits != bits(address) {
            return Err(CidrParseError::HostBitsSet {
                value: value.to_owned(),
                canonical: format!("{}/{prefix}", from_bits(network_bits, address)),
            });
        }

        Ok(Self { address, prefix })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn cidr(value: &str) -> Cidr {
        value
            .parse()
            .unwrap_or_else(|err| panic!("valid cidr {value}: {err}"))
    }

    #[rstest]
    #[case("10.250.0.0/16", "10.250.0.0/17", true)]
    #[case("10.250.0.0/16", "10.250.0.0/16", true)]
    #[case("10.250.0.0/17", "10.250.0.0/16", false)]
    #[case("10.250.0.0/16", "10.251.0.0/16", false)]
    #[case("0.0.0.0/0", "192.168.1.0/24", true)]
    #[case("fd00::/8", "fd00:1::/64", true)]
    #[case("10.0.0.0/8", "fd00::/8", false)]
    fn contains_matches_prefix_arithmetic(
        #[case] outer: &str,
        #[case] inner: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(cidr(outer).contains(&cidr(inner)), expected);
    }

    #[test]
    fn properly_contains_rejects_equal_ranges() {
        let range = cidr("10.250.0.0/16");
        assert!(!range.properly_contains(&range));
        assert!(cidr("10.250.0.0/15").properly_contains(&range));
    }

    #[test]
    fn overlaps_is_symmetric() {
        let wide = cidr("10.0.0.0/8");
        let narrow = cidr("10.1.2.0/24");
        assert!(wide.overlaps(&narrow));
        assert!(narrow.overlaps(&wide));
        assert!(!narrow.overlaps(&cidr("10.1.3.0/24")));
    }

    #[rstest]
    #[case("10.0.0.0")]
    #[case("nonsense/8")]
    #[case("10.0.0.0/33")]
    #[case("10.0.0.0/abc")]
    fn rejects_malformed_values(#[case] value: &str) {
        assert!(value.parse::<Cidr>().is_err());
    }

    #[test]
    fn rejects_host_bits_with_canonical_hint() {
        let err = "10.250.1.0/16"
            .parse::<Cidr>()
            .expect_err("host bits are set");
        assert_eq!(
            err,
            CidrParseError::HostBitsSet {
                value: String::from("10.250.1.0/16"),
                canonical: String::from("10.250.0.0/16"),
            }
        );
    }

    #[test]
    fn displays_canonical_form() {
        assert_eq!(cidr(" 10.250.0.0/16 ").to_string(), "10.250.0.0/16");
    }
}
