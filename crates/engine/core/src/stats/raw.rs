//! Persisted math-model source.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One stat's sources: a base value, named additive and multiplicative
/// contributions (equipment entries keyed `item:{id}`), and battle-scoped
/// temp overlays.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatEntry {
    #[serde(default)]
    pub base: f64,
    #[serde(default)]
    pub add: BTreeMap<String, f64>,
    /// Fractions: `0.15` means +15%.
    #[serde(default)]
    pub mult: BTreeMap<String, f64>,
    #[serde(default)]
    pub temp: BTreeMap<String, f64>,
}

impl StatEntry {
    pub fn with_base(base: f64) -> Self {
        Self {
            base,
            ..Self::default()
        }
    }

    /// Collapse sources: `(base + Σadd) × Π(1 + mult) + Σtemp`.
    pub fn total(&self) -> f64 {
        let additive: f64 = self.base + self.add.values().sum::<f64>();
        let multiplier: f64 = self.mult.values().map(|m| 1.0 + m).product();
        additive * multiplier + self.temp.values().sum::<f64>()
    }

    /// Install or replace a named source.
    pub fn set_add(&mut self, source: impl Into<String>, value: f64) {
        self.add.insert(source.into(), value);
    }

    pub fn set_mult(&mut self, source: impl Into<String>, value: f64) {
        self.mult.insert(source.into(), value);
    }

    pub fn set_temp(&mut self, source: impl Into<String>, value: f64) {
        self.temp.insert(source.into(), value);
    }
}

/// Full math model for one actor: primary attributes plus derived-stat
/// modifiers, both shaped as named [`StatEntry`] maps.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawModel {
    #[serde(default)]
    pub attributes: BTreeMap<String, StatEntry>,
    #[serde(default)]
    pub modifiers: BTreeMap<String, StatEntry>,
}

impl RawModel {
    /// Collapsed attribute value; missing attributes read as zero.
    pub fn attribute(&self, name: &str) -> f64 {
        self.attributes.get(name).map(StatEntry::total).unwrap_or(0.0)
    }

    /// Collapsed modifier value; missing modifiers read as zero.
    pub fn modifier(&self, name: &str) -> f64 {
        self.modifiers.get(name).map(StatEntry::total).unwrap_or(0.0)
    }

    /// Entry for a modifier, created on demand (used by temp overlays).
    pub fn modifier_entry(&mut self, name: &str) -> &mut StatEntry {
        self.modifiers.entry(name.to_string()).or_default()
    }
}
