//! Subnetwork updates.
//!
//! A subnetwork can need up to three separate calls: a range expansion, a
//! flow-log patch, and a patch of the remaining fields. Flow-log settings
//! cannot be changed in the same request as other fields, and each patch
//! must carry the fingerprint of the state it applies to, so the caller
//! re-reads the subnetwork between calls.

use crate::resources::{Cidr, SubnetLogConfig, Subnetwork};

use super::field::{Field, Patch, SendMode};
use super::{DiffError, diff_value, matches_optional};

/// Update for the mutable fields of a [`Subnetwork`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SubnetPatch {
    /// Private access to provider APIs.
    pub private_ip_google_access: Field<bool>,
    /// Flow-log settings.
    pub log_config: Field<SubnetLogConfig>,
}

impl SubnetPatch {
    /// Applies the patch to a descriptor.
    pub fn apply_to(&self, subnet: &mut Subnetwork) {
        self.private_ip_google_access
            .apply_to(&mut subnet.private_ip_google_access);
        self.log_config.apply_to_option(&mut subnet.log_config);
    }
}

impl Patch for SubnetPatch {
    fn field_modes(&self) -> Vec<(&'static str, SendMode)> {
        let log_mode = match &self.log_config {
            Field::Unset => SendMode::Omit,
            Field::Cleared => SendMode::Null,
            Field::Set(_) => SendMode::Send,
        };
        let mut modes = vec![
            (
                "privateIpGoogleAccess",
                self.private_ip_google_access.send_mode(),
            ),
            ("logConfig", log_mode),
        ];
        if self.log_config.value().is_some_and(|config| !config.enable) {
            modes.push(("logConfig.enable", SendMode::ForceSend));
        }
        modes
    }
}

/// One remote call needed to converge a subnetwork.
#[derive(Clone, Debug, PartialEq)]
pub enum SubnetUpdate {
    /// Expand the primary range to the contained CIDR.
    ExpandRange {
        /// New, strictly larger range.
        ip_cidr_range: String,
    },
    /// Patch mutable fields; the caller supplies a fresh fingerprint.
    Patch(SubnetPatch),
}

/// Computes the ordered calls turning `current` into `desired`.
///
/// # Errors
///
/// Returns [`DiffError::RangeNotExpandable`] when the desired range is
/// smaller than or disjoint from the current one, and
/// [`DiffError::InvalidRange`] when either range cannot be parsed.
pub fn subnet_updates(
    current: &Subnetwork,
    desired: &Subnetwork,
) -> Result<Vec<SubnetUpdate>, DiffError> {
    let mut updates = Vec::new();

    if let Some(range) = expanded_range(current, desired)? {
        updates.push(SubnetUpdate::ExpandRange {
            ip_cidr_range: range,
        });
    }

    let current_log = effective_log_config(current);
    let desired_log = effective_log_config(desired);
    if !log_configs_equivalent(&current_log, &desired_log) {
        updates.push(SubnetUpdate::Patch(SubnetPatch {
            log_config: Field::Set(desired_log),
            ..SubnetPatch::default()
        }));
    }

    let remaining = SubnetPatch {
        private_ip_google_access: diff_value(
            &current.private_ip_google_access,
            &desired.private_ip_google_access,
        ),
        ..SubnetPatch::default()
    };
    if !remaining.is_empty() {
        updates.push(SubnetUpdate::Patch(remaining));
    }

    Ok(updates)
}

fn expanded_range(current: &Subnetwork, desired: &Subnetwork) -> Result<Option<String>, DiffError> {
    if current.ip_cidr_range == desired.ip_cidr_range {
        return Ok(None);
    }
    let parse = |value: &str| {
        value
            .parse::<Cidr>()
            .map_err(|source| DiffError::InvalidRange {
                subnet: desired.name.clone(),
                source,
            })
    };
    let current_range = parse(&current.ip_cidr_range)?;
    let desired_range = parse(&desired.ip_cidr_range)?;

    if desired_range == current_range {
        return Ok(None);
    }
    if desired_range.properly_contains(&current_range) {
        return Ok(Some(desired_range.to_string()));
    }
    Err(DiffError::RangeNotExpandable {
        subnet: desired.name.clone(),
        current: current_range.to_string(),
        desired: desired_range.to_string(),
    })
}

fn effective_log_config(subnet: &Subnetwork) -> SubnetLogConfig {
    subnet
        .log_config
        .clone()
        .unwrap_or_else(SubnetLogConfig::disabled)
}

fn log_configs_equivalent(current: &SubnetLogConfig, desired: &SubnetLogConfig) -> bool {
    if current.enable != desired.enable {
        return false;
    }
    if !desired.enable {
        return true;
    }
    matches_optional(
        current.aggregation_interval.as_ref(),
        desired.aggregation_interval.as_ref(),
    ) && matches_optional(current.flow_sampling.as_ref(), desired.flow_sampling.as_ref())
        && matches_optional(current.metadata.as_ref(), desired.metadata.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn subnet(range: &str) -> Subnetwork {
        Subnetwork {
            name: String::from("shoot-nodes"),
            region: String::from("europe-west1"),
            network: String::from("networks/shoot"),
            ip_cidr_range: range.to_owned(),
            ..Subnetwork::default()
        }
    }

    fn flow_logs() -> SubnetLogConfig {
        SubnetLogConfig {
            enable: true,
            aggregation_interval: Some(String::from("INTERVAL_5_SEC")),
            flow_sampling: Some(0.5),
            metadata: Some(String::from("INCLUDE_ALL_METADATA")),
        }
    }

    #[test]
    fn identical_subnets_need_no_calls() {
        let current = Subnetwork {
            self_link: String::from("subnetworks/shoot-nodes"),
            fingerprint: String::from("abc"),
            gateway_address: Some(String::from("10.250.0.1")),
            ..subnet("10.250.0.0/16")
        };
        let updates = subnet_updates(&current, &subnet("10.250.0.0/16")).expect("diff");
        assert!(updates.is_empty());
    }

    #[test]
    fn superset_range_yields_expand_call() {
        let updates =
            subnet_updates(&subnet("10.250.0.0/16"), &subnet("10.250.0.0/15")).expect("diff");
        assert_eq!(
            updates,
            vec![SubnetUpdate::ExpandRange {
                ip_cidr_range: String::from("10.250.0.0/15")
            }]
        );
    }

    #[rstest]
    #[case("10.250.0.0/17")]
    #[case("10.251.0.0/16")]
    #[case("192.168.0.0/24")]
    fn smaller_or_disjoint_ranges_are_rejected(#[case] desired: &str) {
        let err = subnet_updates(&subnet("10.250.0.0/16"), &subnet(desired))
            .expect_err("range must not shrink");
        assert!(matches!(err, DiffError::RangeNotExpandable { .. }), "{err}");
    }

    #[test]
    fn flow_logs_are_patched_separately_from_other_fields() {
        let current = subnet("10.250.0.0/16");
        let desired = Subnetwork {
            private_ip_google_access: true,
            log_config: Some(flow_logs()),
            ..subnet("10.250.0.0/16")
        };

        let updates = subnet_updates(&current, &desired).expect("diff");
        assert_eq!(updates.len(), 2);
        let [SubnetUpdate::Patch(logs), SubnetUpdate::Patch(rest)] = updates.as_slice() else {
            panic!("expected two patches, got {updates:?}");
        };
        assert_eq!(logs.log_config, Field::Set(flow_logs()));
        assert!(logs.private_ip_google_access.is_unset());
        assert_eq!(rest.private_ip_google_access, Field::Set(true));
        assert!(rest.log_config.is_unset());
    }

    #[test]
    fn disabling_flow_logs_force_sends_enable_flag() {
        let current = Subnetwork {
            log_config: Some(flow_logs()),
            ..subnet("10.250.0.0/16")
        };
        let updates = subnet_updates(&current, &subnet("10.250.0.0/16")).expect("diff");
        let [SubnetUpdate::Patch(patch)] = updates.as_slice() else {
            panic!("expected a single patch, got {updates:?}");
        };
        assert_eq!(patch.force_send_fields(), vec!["logConfig.enable"]);
    }

    #[test]
    fn disabling_private_access_force_sends_false() {
        let current = Subnetwork {
            private_ip_google_access: true,
            ..subnet("10.250.0.0/16")
        };
        let updates = subnet_updates(&current, &subnet("10.250.0.0/16")).expect("diff");
        let [SubnetUpdate::Patch(patch)] = updates.as_slice() else {
            panic!("expected a single patch, got {updates:?}");
        };
        assert_eq!(patch.force_send_fields(), vec!["privateIpGoogleAccess"]);
    }

    #[test]
    fn applying_updates_converges() {
        let mut current = subnet("10.250.0.0/16");
        let desired = Subnetwork {
            private_ip_google_access: true,
            log_config: Some(flow_logs()),
            ..subnet("10.250.0.0/15")
        };

        for update in subnet_updates(&current, &desired).expect("diff") {
            match update {
                SubnetUpdate::ExpandRange { ip_cidr_range } => current.ip_cidr_range = ip_cidr_range,
                SubnetUpdate::Patch(patch) => patch.apply_to(&mut current),
            }
        }

        assert!(subnet_updates(&current, &desired).expect("diff").is_empty());
    }

    #[test]
    fn disabled_configs_ignore_tuning_fields() {
        let current = Subnetwork {
            log_config: Some(SubnetLogConfig {
                enable: false,
                ..flow_logs()
            }),
            ..subnet("10.250.0.0/16")
        };
        assert!(
            subnet_updates(&current, &subnet("10.250.0.0/16"))
                .expect("diff")
                .is_empty()
        );
    }
}
