//! Tri-state patch fields.
//!
//! A patch must tell three situations apart: the field is not part of the
//! update, the field is explicitly cleared (sent as `null`), or the field
//! carries a value. A value equal to its type's zero value (`false`, `0`,
//! `""`, `[]`) is still a value and has to be force-sent, otherwise the
//! remote API would read the omitted field as "unchanged".

/// How a patch field is transmitted.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SendMode {
    /// Omitted from the request.
    Omit,
    /// Sent as an explicit `null`.
    Null,
    /// Sent normally.
    Send,
    /// Sent although it equals the zero value.
    ForceSend,
}

/// A patchable field: unset, explicitly cleared, or present.
#[derive(Clone, Debug, PartialEq)]
pub enum Field<T> {
    /// Not part of the update.
    Unset,
    /// Explicitly cleared.
    Cleared,
    /// Set to the contained value, which may be a zero value.
    Set(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T> Field<T> {
    /// Returns `true` when the field is not part of the update.
    #[must_use]
    pub const fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }

    /// Returns the contained value when the field is set.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        match self {
            Self::Set(value) => Some(value),
            Self::Unset | Self::Cleared => None,
        }
    }
}

impl<T: Clone + Default> Field<T> {
    /// Writes the field into `target`; a cleared field resets it to default.
    pub fn apply_to(&self, target: &mut T) {
        match self {
            Self::Unset => {}
            Self::Cleared => *target = T::default(),
            Self::Set(value) => target.clone_from(value),
        }
    }
}

impl<T: Clone> Field<T> {
    /// Writes the field into an optional `target`; a cleared field becomes `None`.
    pub fn apply_to_option(&self, target: &mut Option<T>) {
        match self {
            Self::Unset => {}
            Self::Cleared => *target = None,
            Self::Set(value) => *target = Some(value.clone()),
        }
    }
}

impl<T: ZeroValue> Field<T> {
    /// Returns how the field must be transmitted.
    #[must_use]
    pub fn send_mode(&self) -> SendMode {
        match self {
            Self::Unset => SendMode::Omit,
            Self::Cleared => SendMode::Null,
            Self::Set(value) if value.is_zero() => SendMode::ForceSend,
            Self::Set(_) => SendMode::Send,
        }
    }
}

/// Values that have a wire-level zero representation.
pub trait ZeroValue {
    /// Returns `true` when the value would be dropped by an omit-empty encoder.
    fn is_zero(&self) -> bool;
}

impl ZeroValue for bool {
    fn is_zero(&self) -> bool {
        !*self
    }
}

impl ZeroValue for u32 {
    fn is_zero(&self) -> bool {
        *self == 0
    }
}

impl ZeroValue for i64 {
    fn is_zero(&self) -> bool {
        *self == 0
    }
}

impl ZeroValue for String {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<T> ZeroValue for Vec<T> {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> ZeroValue for std::collections::BTreeMap<K, V> {
    fn is_zero(&self) -> bool {
        self.is_empty()
    }
}

/// A computed update for one resource.
pub trait Patch {
    /// Lists every patchable field with its wire name and send mode.
    fn field_modes(&self) -> Vec<(&'static str, SendMode)>;

    /// Returns `true` when no field is part of the update.
    fn is_empty(&self) -> bool {
        self.field_modes()
            .iter()
            .all(|(_, mode)| *mode == SendMode::Omit)
    }

    /// Wire names of fields that must be sent despite holding a zero value.
    fn force_send_fields(&self) -> Vec<&'static str> {
        self.fields_with(SendMode::ForceSend)
    }

    /// Wire names of fields that must be sent as `null`.
    fn null_fields(&self) -> Vec<&'static str> {
        self.fields_with(SendMode::Null)
    }

    /// Wire names of fields with the given send mode.
    fn fields_with(&self, wanted: SendMode) -> Vec<&'static str> {
        self.field_modes()
            .into_iter()
            .filter(|(_, mode)| *mode == wanted)
            .map(|(name, _)| name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Field::Unset, SendMode::Omit)]
    #[case(Field::Cleared, SendMode::Null)]
    #[case(Field::Set(false), SendMode::ForceSend)]
    #[case(Field::Set(true), SendMode::Send)]
    fn bool_fields_keep_three_states_apart(#[case] field: Field<bool>, #[case] mode: SendMode) {
        assert_eq!(field.send_mode(), mode);
    }

    #[test]
    fn zero_numbers_and_empty_lists_are_force_sent() {
        assert_eq!(Field::Set(0_u32).send_mode(), SendMode::ForceSend);
        assert_eq!(
            Field::Set(Vec::<String>::new()).send_mode(),
            SendMode::ForceSend
        );
        assert_eq!(Field::Set(vec![1_u32]).send_mode(), SendMode::Send);
    }

    #[test]
    fn cleared_option_becomes_none() {
        let mut target = Some(5_u32);
        Field::<u32>::Cleared.apply_to_option(&mut target);
        assert_eq!(target, None);

        Field::Set(7_u32).apply_to_option(&mut target);
        assert_eq!(target, Some(7));

        Field::<u32>::Unset.apply_to_option(&mut target);
        assert_eq!(target, Some(7));
    }

    #[test]
    fn cleared_value_resets_to_default() {
        let mut target = String::from("description");
        Field::<String>::Cleared.apply_to(&mut target);
        assert!(target.is_empty());
    }
}
