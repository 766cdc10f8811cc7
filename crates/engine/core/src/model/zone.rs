//! Body zones and weapon layouts.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// The five body zones an attack can target.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord,
    Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Zone {
    Head,
    Chest,
    Stomach,
    Groin,
    Legs,
}

impl Zone {
    /// All zones in canonical order.
    pub const ALL: [Zone; 5] = [Zone::Head, Zone::Chest, Zone::Stomach, Zone::Groin, Zone::Legs];
}

/// The five valid adjacent block pairs for one-hand and dual layouts.
pub const BLOCK_PAIRS: [[Zone; 2]; 5] = [
    [Zone::Head, Zone::Chest],
    [Zone::Chest, Zone::Stomach],
    [Zone::Stomach, Zone::Groin],
    [Zone::Groin, Zone::Legs],
    [Zone::Legs, Zone::Head],
];

/// Weapon configuration of an actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum WeaponLayout {
    #[serde(rename = "1h")]
    #[strum(serialize = "1h")]
    OneHand,
    #[serde(rename = "2h")]
    #[strum(serialize = "2h")]
    TwoHand,
    #[serde(rename = "dual")]
    #[strum(serialize = "dual")]
    Dual,
}

impl WeaponLayout {
    /// Number of attack zones a valid exchange intent carries.
    pub fn attack_zone_count(self) -> usize {
        match self {
            WeaponLayout::OneHand | WeaponLayout::TwoHand => 1,
            WeaponLayout::Dual => 2,
        }
    }

    /// Number of block zones a valid exchange intent carries.
    pub fn block_zone_count(self) -> usize {
        match self {
            WeaponLayout::OneHand | WeaponLayout::Dual => 2,
            WeaponLayout::TwoHand => 1,
        }
    }
}

/// Valid block selections for a layout, as zone vectors: the five
/// adjacent pairs, or the five single zones for two-handers.
pub fn zone_block_list(layout: WeaponLayout) -> Vec<Vec<Zone>> {
    match layout {
        WeaponLayout::TwoHand => Zone::ALL.iter().map(|zone| vec![*zone]).collect(),
        WeaponLayout::OneHand | WeaponLayout::Dual => {
            BLOCK_PAIRS.iter().map(|pair| pair.to_vec()).collect()
        }
    }
}

/// Validated block selection for an exchange intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockPattern {
    /// Adjacent pair, used by `1h` and `dual` layouts.
    Pair([Zone; 2]),
    /// Single zone, used by the `2h` layout.
    Single(Zone),
}

impl BlockPattern {
    /// Zones covered by this pattern.
    pub fn zones(&self) -> Vec<Zone> {
        match self {
            BlockPattern::Pair(pair) => pair.to_vec(),
            BlockPattern::Single(zone) => vec![*zone],
        }
    }

    /// Parse raw zones against a layout's expected block shape.
    pub fn from_zones(layout: WeaponLayout, zones: &[Zone]) -> Option<Self> {
        match (layout, zones) {
            (WeaponLayout::TwoHand, [zone]) => Some(BlockPattern::Single(*zone)),
            (WeaponLayout::OneHand | WeaponLayout::Dual, [a, b]) => {
                let pair = [*a, *b];
                let valid = BLOCK_PAIRS
                    .iter()
                    .any(|p| *p == pair || [p[1], p[0]] == pair);
                valid.then_some(BlockPattern::Pair(pair))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_pattern_accepts_adjacent_pairs_both_orders() {
        let pat = BlockPattern::from_zones(WeaponLayout::OneHand, &[Zone::Chest, Zone::Head]);
        assert!(matches!(pat, Some(BlockPattern::Pair(_))));
    }

    #[test]
    fn block_pattern_rejects_non_adjacent_pair() {
        let pat = BlockPattern::from_zones(WeaponLayout::Dual, &[Zone::Head, Zone::Groin]);
        assert!(pat.is_none());
    }

    #[test]
    fn two_hand_blocks_a_single_zone() {
        let pat = BlockPattern::from_zones(WeaponLayout::TwoHand, &[Zone::Legs]);
        assert!(matches!(pat, Some(BlockPattern::Single(Zone::Legs))));
        assert!(BlockPattern::from_zones(WeaponLayout::TwoHand, &[Zone::Legs, Zone::Head]).is_none());
    }
}
