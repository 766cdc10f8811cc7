//! The cleaner: a hostile entity injected into stalled sessions.

use std::collections::BTreeMap;

use serde_json::Map;

use rbc_core::model::{ActorMeta, ActorSnapshot, ActorState, Loadout, WeaponLayout};
use rbc_core::stats::StatEntry;
use rbc_core::stat_keys;

/// Deterministic id for the cleaner; never collides with player ids
/// (positive) or shadow/AI ids (small negatives).
pub const CLEANER_ID_BASE: i64 = -900_000;

/// Deterministic cleaner snapshot.
///
/// Stats are fixed so a respawn attempt produces a byte-identical actor;
/// the supervisor relies on that for idempotence.
pub fn cleaner_snapshot(team: &str) -> ActorSnapshot {
    let mut attributes = BTreeMap::new();
    attributes.insert(stat_keys::STRENGTH.to_string(), StatEntry::with_base(40.0));
    attributes.insert(stat_keys::ENDURANCE.to_string(), StatEntry::with_base(30.0));
    attributes.insert(stat_keys::DEXTERITY.to_string(), StatEntry::with_base(25.0));
    attributes.insert(stat_keys::INTUITION.to_string(), StatEntry::with_base(25.0));
    attributes.insert(stat_keys::WISDOM.to_string(), StatEntry::with_base(10.0));

    let mut snapshot = ActorSnapshot {
        meta: ActorMeta {
            id: CLEANER_ID_BASE,
            name: "The Cleaner".to_string(),
            team: team.to_string(),
            kind: "cleaner".to_string(),
            template_id: None,
            is_ai: true,
            extra: Map::new(),
        },
        state: ActorState {
            hp: 1000,
            max_hp: 1000,
            en: 200,
            max_en: 200,
            tactics: 0.0,
            shield: 0,
            is_dead: false,
            afk_penalty_level: 0,
            exchange_count: 0,
            tokens: BTreeMap::new(),
            counters: Default::default(),
        },
        raw: Default::default(),
        loadout: Loadout {
            layout: WeaponLayout::TwoHand,
            slots: BTreeMap::from([("main_hand".to_string(), "skill_cleaver".to_string())]),
            belt: vec![],
            known_abilities: vec![],
            tags: vec![],
            weapon_triggers: vec![],
            armor_type: Some("heavy".to_string()),
            has_shield: false,
            extra: Map::new(),
        },
        active_abilities: vec![],
        xp_buffer: BTreeMap::new(),
        stats: None,
        dirty_stats: Default::default(),
    };
    snapshot.raw.attributes = attributes;
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaner_is_deterministic() {
        let a = serde_json::to_value(cleaner_snapshot("chaos")).unwrap();
        let b = serde_json::to_value(cleaner_snapshot("chaos")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a["meta"]["id"], CLEANER_ID_BASE);
        assert_eq!(a["meta"]["is_ai"], true);
    }
}
