//! Network updates. Only the routing mode can change after creation.

use crate::resources::{Network, RoutingMode};

use super::field::{Field, Patch, SendMode};
use super::diff_value;

/// Update for a [`Network`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NetworkPatch {
    /// New routing mode.
    pub routing_mode: Field<RoutingMode>,
}

impl NetworkPatch {
    /// Applies the patch to a descriptor.
    pub fn apply_to(&self, network: &mut Network) {
        self.routing_mode.apply_to(&mut network.routing_mode);
    }
}

impl Patch for NetworkPatch {
    fn field_modes(&self) -> Vec<(&'static str, SendMode)> {
        let mode = if self.routing_mode.is_unset() {
            SendMode::Omit
        } else {
            SendMode::Send
        };
        vec![("routingConfig.routingMode", mode)]
    }
}

/// Computes the update turning `current` into `desired`.
#[must_use]
pub fn network_patch(current: &Network, desired: &Network) -> Option<NetworkPatch> {
    let patch = NetworkPatch {
        routing_mode: diff_value(&current.routing_mode, &desired.routing_mode),
    };
    (!patch.is_empty()).then_some(patch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network(mode: RoutingMode) -> Network {
        Network {
            name: String::from("shoot"),
            routing_mode: mode,
            ..Network::default()
        }
    }

    #[test]
    fn ignores_output_only_fields() {
        let current = Network {
            self_link: String::from("https://compute/networks/shoot"),
            id: Some(42),
            creation_timestamp: Some(String::from("2024-01-01T00:00:00Z")),
            ..network(RoutingMode::Regional)
        };
        assert_eq!(network_patch(&current, &network(RoutingMode::Regional)), None);
    }

    #[test]
    fn patches_routing_mode_and_converges() {
        let mut current = network(RoutingMode::Regional);
        let desired = network(RoutingMode::Global);

        let patch = network_patch(&current, &desired).expect("routing mode differs");
        assert_eq!(patch.routing_mode, Field::Set(RoutingMode::Global));

        patch.apply_to(&mut current);
        assert_eq!(network_patch(&current, &desired), None);
    }
}
