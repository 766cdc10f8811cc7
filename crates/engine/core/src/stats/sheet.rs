//! Materialized flat stat view.

use std::collections::BTreeMap;

use super::Hand;

/// Flat numeric view consumed by the resolver.
///
/// Never persisted; rebuilt by [`super::materialize`] whenever the owning
/// snapshot is dirty. Missing keys read as zero so the resolver can probe
/// optional stats (thorns, vampirism) without presence checks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatSheet {
    values: BTreeMap<String, f64>,
}

impl StatSheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> f64 {
        self.values.get(key).copied().unwrap_or(0.0)
    }

    /// Hand-prefixed read: `handed(Hand::Main, keys::DAMAGE_MIN)` reads
    /// `main_hand_damage_min`.
    pub fn handed(&self, hand: Hand, key: &str) -> f64 {
        self.get(&format!("{}{}", hand.prefix(), key))
    }

    pub fn set(&mut self, key: impl Into<String>, value: f64) {
        self.values.insert(key.into(), value);
    }

    pub fn set_handed(&mut self, hand: Hand, key: &str, value: f64) {
        self.values.insert(format!("{}{}", hand.prefix(), key), value);
    }

    /// Add onto a key, creating it at zero first if absent.
    pub fn add(&mut self, key: &str, delta: f64) {
        *self.values.entry(key.to_string()).or_insert(0.0) += delta;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::keys;

    #[test]
    fn handed_lookup_uses_prefix() {
        let mut sheet = StatSheet::new();
        sheet.set_handed(Hand::Main, keys::DAMAGE_MIN, 12.0);
        sheet.set_handed(Hand::Off, keys::DAMAGE_MIN, 4.0);
        assert_eq!(sheet.handed(Hand::Main, keys::DAMAGE_MIN), 12.0);
        assert_eq!(sheet.handed(Hand::Off, keys::DAMAGE_MIN), 4.0);
        assert_eq!(sheet.get("damage_min"), 0.0);
    }
}
