//! Firewall rule updates.

use crate::resources::{Direction, Firewall, FirewallRule};

use super::field::{Field, Patch, SendMode};
use super::{diff_set, diff_value};

/// Update for a [`Firewall`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FirewallPatch {
    /// Traffic direction.
    pub direction: Field<Direction>,
    /// Rule priority.
    pub priority: Field<u32>,
    /// Description.
    pub description: Field<String>,
    /// Allowed protocol/port tuples.
    pub allowed: Field<Vec<FirewallRule>>,
    /// Denied protocol/port tuples.
    pub denied: Field<Vec<FirewallRule>>,
    /// Source ranges.
    pub source_ranges: Field<Vec<String>>,
    /// Destination ranges.
    pub destination_ranges: Field<Vec<String>>,
    /// Source tags.
    pub source_tags: Field<Vec<String>>,
    /// Target tags.
    pub target_tags: Field<Vec<String>>,
    /// Target service accounts.
    pub target_service_accounts: Field<Vec<String>>,
    /// Disabled flag.
    pub disabled: Field<bool>,
}

impl FirewallPatch {
    /// Applies the patch to a descriptor.
    pub fn apply_to(&self, firewall: &mut Firewall) {
        self.direction.apply_to(&mut firewall.direction);
        self.priority.apply_to(&mut firewall.priority);
        self.description.apply_to(&mut firewall.description);
        self.allowed.apply_to(&mut firewall.allowed);
        self.denied.apply_to(&mut firewall.denied);
        self.source_ranges.apply_to(&mut firewall.source_ranges);
        self.destination_ranges
            .apply_to(&mut firewall.destination_ranges);
        self.source_tags.apply_to(&mut firewall.source_tags);
        self.target_tags.apply_to(&mut firewall.target_tags);
        self.target_service_accounts
            .apply_to(&mut firewall.target_service_accounts);
        self.disabled.apply_to(&mut firewall.disabled);
    }
}

impl Patch for FirewallPatch {
    fn field_modes(&self) -> Vec<(&'static str, SendMode)> {
        let direction = if self.direction.is_unset() {
            SendMode::Omit
        } else {
            SendMode::Send
        };
        vec![
            ("direction", direction),
            ("priority", self.priority.send_mode()),
            ("description", self.description.send_mode()),
            ("allowed", self.allowed.send_mode()),
            ("denied", self.denied.send_mode()),
            ("sourceRanges", self.source_ranges.send_mode()),
            ("destinationRanges", self.destination_ranges.send_mode()),
            ("sourceTags", self.source_tags.send_mode()),
            ("targetTags", self.target_tags.send_mode()),
            (
                "targetServiceAccounts",
                self.target_service_accounts.send_mode(),
            ),
            ("disabled", self.disabled.send_mode()),
        ]
    }
}

/// Computes the update turning `current` into `desired`.
///
/// Allow/deny lists, ranges, tags and service accounts are sets; the port
/// list inside each allow/deny entry is compared in order.
#[must_use]
pub fn firewall_patch(current: &Firewall, desired: &Firewall) -> Option<FirewallPatch> {
    let patch = FirewallPatch {
        direction: diff_value(&current.direction, &desired.direction),
        priority: diff_value(&current.priority, &desired.priority),
        description: diff_value(&current.description, &desired.description),
        allowed: diff_set(&current.allowed, &desired.allowed),
        denied: diff_set(&current.denied, &desired.denied),
        source_ranges: diff_set(&current.source_ranges, &desired.source_ranges),
        destination_ranges: diff_set(&current.destination_ranges, &desired.destination_ranges),
        source_tags: diff_set(&current.source_tags, &desired.source_tags),
        target_tags: diff_set(&current.target_tags, &desired.target_tags),
        target_service_accounts: diff_set(
            &current.target_service_accounts,
            &desired.target_service_accounts,
        ),
        disabled: diff_value(&current.disabled, &desired.disabled),
    };
    (!patch.is_empty()).then_some(patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn internal_rule() -> Firewall {
        Firewall {
            name: String::from("shoot-allow-internal-access"),
            network: String::from("networks/shoot"),
            priority: 1000,
            allowed: vec![
                FirewallRule::new("tcp", &[]),
                FirewallRule::new("udp", &["53", "8000-9000"]),
                FirewallRule::new("icmp", &[]),
            ],
            source_ranges: vec![String::from("10.250.0.0/16"), String::from("100.96.0.0/11")],
            ..Firewall::default()
        }
    }

    #[test]
    fn reordered_sets_need_no_patch() {
        let current = Firewall {
            self_link: String::from("firewalls/shoot-allow-internal-access"),
            creation_timestamp: Some(String::from("2024-01-01T00:00:00Z")),
            allowed: vec![
                FirewallRule::new("icmp", &[]),
                FirewallRule::new("udp", &["53", "8000-9000"]),
                FirewallRule::new("tcp", &[]),
            ],
            source_ranges: vec![String::from("100.96.0.0/11"), String::from("10.250.0.0/16")],
            ..internal_rule()
        };
        assert_eq!(firewall_patch(&current, &internal_rule()), None);
    }

    #[test]
    fn reordered_ports_inside_an_entry_are_a_change() {
        let current = Firewall {
            allowed: vec![
                FirewallRule::new("tcp", &[]),
                FirewallRule::new("udp", &["8000-9000", "53"]),
                FirewallRule::new("icmp", &[]),
            ],
            ..internal_rule()
        };
        let patch = firewall_patch(&current, &internal_rule()).expect("ports differ");
        assert_eq!(patch.allowed, Field::Set(internal_rule().allowed));
        assert!(patch.source_ranges.is_unset());
    }

    #[test]
    fn removed_tags_and_zero_priority_are_force_sent() {
        let current = Firewall {
            target_tags: vec![String::from("shoot")],
            ..internal_rule()
        };
        let desired = Firewall {
            priority: 0,
            ..internal_rule()
        };
        let patch = firewall_patch(&current, &desired).expect("tags and priority differ");
        assert_eq!(patch.force_send_fields(), vec!["priority", "targetTags"]);
    }

    #[test]
    fn applying_patch_converges() {
        let mut current = Firewall {
            disabled: true,
            description: String::from("old"),
            denied: vec![FirewallRule::new("all", &[])],
            ..internal_rule()
        };
        let desired = internal_rule();

        let patch = firewall_patch(&current, &desired).expect("fields differ");
        patch.apply_to(&mut current);

        assert_eq!(firewall_patch(&current, &desired), None);
    }
}
