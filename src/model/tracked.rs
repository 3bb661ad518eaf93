//! Default-field tracking for sparsely decoded models.
//!
//! Container labels are sparse: a decoded instance cannot distinguish "field
//! never supplied" from "field supplied with its zero value" by looking at
//! the value alone, because zero values are legal here. [`Tracked`] pairs a
//! value with the explicit set of fields still at their default; callers
//! test that set, never the raw value, before using a field.

use std::collections::BTreeSet;
use std::ops::Deref;

/// A decoded model value plus the wire names of its still-default fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<T> {
    value: T,
    defaults: BTreeSet<&'static str>,
}

impl<T> Tracked<T> {
    /// Wrap a value with an explicit default-field set.
    pub fn new(value: T, defaults: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            value,
            defaults: defaults.into_iter().collect(),
        }
    }

    /// Wrap a value with every field considered supplied.
    pub fn all_set(value: T) -> Self {
        Self {
            value,
            defaults: BTreeSet::new(),
        }
    }

    /// Whether `field` (wire name) is still at its default.
    pub fn is_default(&self, field: &str) -> bool {
        self.defaults.contains(field)
    }

    /// Wire names of every field still at its default.
    pub fn default_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.defaults.iter().copied()
    }

    /// Mark `field` as supplied after setting its value.
    pub fn mark_set(&mut self, field: &str) {
        self.defaults.remove(field);
    }

    /// The wrapped value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Mutable access to the wrapped value. Does not change tracking;
    /// call [`mark_set`](Self::mark_set) for fields that are filled in.
    pub fn value_mut(&mut self) -> &mut T {
        &mut self.value
    }

    /// Consume the wrapper, discarding tracking.
    pub fn into_value(self) -> T {
        self.value
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_default_fields_explicitly() {
        let mut tracked = Tracked::new(String::from("value"), ["id", "passphrase"]);

        assert!(tracked.is_default("id"));
        assert!(tracked.is_default("passphrase"));
        assert!(!tracked.is_default("identity"));

        tracked.mark_set("id");
        assert!(!tracked.is_default("id"));
        assert_eq!(tracked.default_fields().collect::<Vec<_>>(), ["passphrase"]);
    }

    #[test]
    fn all_set_has_no_defaults() {
        let tracked = Tracked::all_set(42u16);
        assert_eq!(tracked.default_fields().count(), 0);
        assert_eq!(*tracked.value(), 42);
    }
}
