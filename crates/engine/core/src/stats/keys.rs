//! Stat key names shared by the raw model, the calculator, and the resolver.
//!
//! Hand-dependent keys are addressed through [`super::Hand::prefix`]:
//! `main_hand_damage_min`, `off_hand_skill_mult`, and so on.

pub const MAX_HP: &str = "max_hp";
pub const MAX_EN: &str = "max_en";
pub const EN_REGEN: &str = "en_regen";

// Hand-prefixed offense.
pub const DAMAGE_MIN: &str = "damage_min";
pub const DAMAGE_MAX: &str = "damage_max";
pub const SKILL_MULT: &str = "skill_mult";

// Magic offense.
pub const MAGIC_DAMAGE_MIN: &str = "magic_damage_min";
pub const MAGIC_DAMAGE_MAX: &str = "magic_damage_max";

pub const CRIT_CHANCE: &str = "crit_chance";
pub const CRIT_POWER: &str = "crit_power";
pub const ANTI_CRIT: &str = "anti_crit";

pub const DODGE_CHANCE: &str = "dodge_chance";
pub const ANTI_DODGE: &str = "anti_dodge";
pub const COUNTER_CHANCE: &str = "counter_chance";
pub const PARRY_CHANCE: &str = "parry_chance";

pub const BLOCK_CHANCE: &str = "block_chance";
pub const SHIELD_BLOCK_POWER: &str = "shield_block_power";

pub const RESIST_PHYSICAL: &str = "resist_physical";
pub const PENETRATION: &str = "penetration";
pub const PIERCE_CHANCE: &str = "pierce_chance";
pub const DAMAGE_REDUCTION_FLAT: &str = "damage_reduction_flat";
pub const THORNS_DAMAGE: &str = "thorns_damage";

pub const VAMP_POWER: &str = "vamp_power";
pub const VAMP_TRIGGER_CHANCE: &str = "vamp_trigger_chance";

pub const DAMAGE_BONUS_GENERIC: &str = "damage_bonus_generic";
/// Prefix for armor-specific bonuses: `damage_bonus_vs_heavy`.
pub const DAMAGE_BONUS_VS: &str = "damage_bonus_vs_";

pub const SKILL_DUAL_WIELD: &str = "skill_dual_wield";

// Attribute names in the raw model.
pub const STRENGTH: &str = "strength";
pub const DEXTERITY: &str = "dexterity";
pub const ENDURANCE: &str = "endurance";
pub const INTUITION: &str = "intuition";
pub const WISDOM: &str = "wisdom";
