//! Actor snapshots: identity, hot state, math model, loadout, overlays.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::stats::{RawModel, StatSheet};

use super::{ActorId, TeamId, TokenKind, WeaponLayout};

/// Identity document, written once at session creation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActorMeta {
    pub id: ActorId,
    pub name: String,
    pub team: TeamId,
    /// Entity kind: "player", "monster", "pet", "cleaner".
    pub kind: String,
    #[serde(default)]
    pub template_id: Option<i64>,
    pub is_ai: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Hot state, mutated on every committed batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActorState {
    pub hp: i64,
    pub max_hp: i64,
    pub en: i64,
    pub max_en: i64,
    #[serde(default)]
    pub tactics: f64,
    /// Temporary absorb pool granted by abilities; depleted before HP.
    #[serde(default)]
    pub shield: i64,
    #[serde(default)]
    pub is_dead: bool,
    #[serde(default)]
    pub afk_penalty_level: u8,
    #[serde(default)]
    pub exchange_count: u64,
    #[serde(default)]
    pub tokens: BTreeMap<TokenKind, i64>,
    #[serde(default)]
    pub counters: BattleCounters,
}

/// Per-battle statistics counters, rendered by the dashboard.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BattleCounters {
    #[serde(default)]
    pub damage_dealt: i64,
    #[serde(default)]
    pub damage_taken: i64,
    #[serde(default)]
    pub crits: u32,
    #[serde(default)]
    pub blocks: u32,
    #[serde(default)]
    pub dodges: u32,
    #[serde(default)]
    pub parries: u32,
    #[serde(default)]
    pub healing: i64,
}

impl ActorState {
    /// Alive means positive HP and not flagged dead.
    pub fn is_alive(&self) -> bool {
        !self.is_dead && self.hp > 0
    }

    /// Add tokens of a kind, clamping at an optional cap.
    pub fn add_tokens(&mut self, kind: TokenKind, count: i64, cap: Option<i64>) {
        let entry = self.tokens.entry(kind).or_insert(0);
        *entry += count;
        if let Some(cap) = cap {
            *entry = (*entry).min(cap);
        }
    }

    /// Spend tokens; returns false (leaving counts untouched) if short.
    pub fn spend_tokens(&mut self, kind: TokenKind, count: i64) -> bool {
        match self.tokens.get_mut(&kind) {
            Some(held) if *held >= count => {
                *held -= count;
                true
            }
            _ => false,
        }
    }

    /// Apply damage: the absorb pool drains first, the remainder hits HP.
    /// Flips `is_dead` when HP bottoms out.
    pub fn take_damage(&mut self, damage: i64) {
        let absorbed = self.shield.min(damage.max(0));
        self.shield -= absorbed;
        self.hp = (self.hp - (damage - absorbed)).max(0);
        if self.hp == 0 {
            self.is_dead = true;
        }
    }

    /// Heal, clamped at max HP. Dead actors stay dead.
    pub fn heal(&mut self, amount: i64) {
        if !self.is_dead {
            self.hp = (self.hp + amount).min(self.max_hp);
        }
    }
}

/// Equipment-derived configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Loadout {
    pub layout: WeaponLayout,
    /// Equipment slot to weapon-skill key ("main_hand" -> "skill_swords").
    #[serde(default)]
    pub slots: BTreeMap<String, String>,
    /// Quick-slot items, in belt order.
    #[serde(default)]
    pub belt: Vec<String>,
    #[serde(default)]
    pub known_abilities: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Trigger ids granted by equipped weapons.
    #[serde(default)]
    pub weapon_triggers: Vec<String>,
    /// Armor class worn on the torso: "light", "medium", "heavy".
    #[serde(default)]
    pub armor_type: Option<String>,
    #[serde(default)]
    pub has_shield: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Loadout {
    /// Skill key equipped in a slot, if any.
    pub fn skill_in(&self, slot: &str) -> Option<&str> {
        self.slots.get(slot).map(String::as_str)
    }

    /// Whether the off hand carries a weapon (as opposed to a shield or
    /// nothing). Drives the dual-wield chain event.
    pub fn off_hand_is_weapon(&self) -> bool {
        self.layout == WeaponLayout::Dual && !self.has_shield
    }
}

/// Time-boxed ability overlay attached to an actor.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActiveAbility {
    pub uid: String,
    pub ability_id: String,
    pub source_id: ActorId,
    /// Exchange index after which the overlay expires.
    pub expires_at_exchange: u64,
    /// Flat stat overlays applied while active.
    #[serde(default)]
    pub impact: BTreeMap<String, f64>,
    /// Free-form flags consumed by the pipeline ("is_stun", "is_sleep", ...).
    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl ActiveAbility {
    /// Whether a payload flag is set truthy.
    pub fn flag(&self, name: &str) -> bool {
        self.payload.get(name).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Full in-battle representation of one participant.
///
/// The materialized stat sheet never persists; it is rebuilt whenever
/// `dirty_stats` is non-empty or no sheet has been computed yet.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActorSnapshot {
    pub meta: ActorMeta,
    pub state: ActorState,
    pub raw: RawModel,
    pub loadout: Loadout,
    #[serde(default)]
    pub active_abilities: Vec<ActiveAbility>,
    #[serde(default)]
    pub xp_buffer: BTreeMap<String, i64>,
    #[serde(skip)]
    pub stats: Option<StatSheet>,
    #[serde(skip)]
    pub dirty_stats: BTreeSet<String>,
}

impl ActorSnapshot {
    pub fn id(&self) -> ActorId {
        self.meta.id
    }

    pub fn is_alive(&self) -> bool {
        self.state.is_alive()
    }

    /// Mark a stat key as needing rematerialization.
    pub fn mark_dirty(&mut self, key: impl Into<String>) {
        self.dirty_stats.insert(key.into());
    }

    /// Whether the stat sheet must be recomputed before resolution.
    pub fn needs_materialization(&self) -> bool {
        self.stats.is_none() || !self.dirty_stats.is_empty()
    }

    /// Overlays still live at the given exchange step.
    pub fn live_abilities(&self, step: u64) -> impl Iterator<Item = &ActiveAbility> {
        self.active_abilities
            .iter()
            .filter(move |overlay| overlay.expires_at_exchange >= step)
    }

    /// Drop overlays that expired before the given exchange step.
    pub fn prune_expired_abilities(&mut self, step: u64) {
        self.active_abilities
            .retain(|overlay| overlay.expires_at_exchange >= step);
    }

    /// Accumulate battle xp for a skill key.
    pub fn buffer_xp(&mut self, skill_key: &str, amount: i64) {
        *self.xp_buffer.entry(skill_key.to_string()).or_insert(0) += amount;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> ActorState {
        ActorState {
            hp: 100,
            max_hp: 100,
            en: 50,
            max_en: 50,
            tactics: 0.0,
            shield: 0,
            is_dead: false,
            afk_penalty_level: 0,
            exchange_count: 0,
            tokens: BTreeMap::new(),
            counters: BattleCounters::default(),
        }
    }

    #[test]
    fn damage_flips_dead_flag_at_zero() {
        let mut st = state();
        st.take_damage(150);
        assert_eq!(st.hp, 0);
        assert!(st.is_dead);
        assert!(!st.is_alive());
    }

    #[test]
    fn absorb_pool_drains_before_hp() {
        let mut st = state();
        st.shield = 20;
        st.take_damage(30);
        assert_eq!(st.shield, 0);
        assert_eq!(st.hp, 90);
    }

    #[test]
    fn heal_clamps_at_max_and_skips_dead() {
        let mut st = state();
        st.take_damage(30);
        st.heal(500);
        assert_eq!(st.hp, 100);

        st.take_damage(200);
        st.heal(10);
        assert_eq!(st.hp, 0, "dead actors are not revived by heal");
    }

    #[test]
    fn token_spend_fails_without_balance() {
        let mut st = state();
        st.add_tokens(TokenKind::Counter, 2, Some(3));
        assert!(!st.spend_tokens(TokenKind::Counter, 3));
        assert!(st.spend_tokens(TokenKind::Counter, 2));
        assert_eq!(st.tokens[&TokenKind::Counter], 0);
    }

    #[test]
    fn counter_tokens_clamp_at_cap() {
        let mut st = state();
        st.add_tokens(TokenKind::Counter, 10, Some(3));
        assert_eq!(st.tokens[&TokenKind::Counter], 3);
    }
}
