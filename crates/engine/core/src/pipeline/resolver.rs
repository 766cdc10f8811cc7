//! Phase 5: the resolver.
//!
//! Strict stage order: damage roll → parry → dodge → block → mitigation →
//! vampirism. Parry and dodge zero the damage and exit; a non-crit block
//! zeroes and exits; a crit through a block is scaled and continues.
//! Tokens awarded per stage are additive.

use rand::Rng;
use rand::RngCore;

use crate::config::CombatTuning;
use crate::model::TokenKind;
use crate::stats::{StatSheet, keys};

use super::context::{InteractionCtx, SourceKind};
use super::result::AttackOutcome;

/// Raw product of one resolver run; the owning pipeline folds this into
/// an [`super::InteractionResult`].
#[derive(Clone, Debug)]
pub struct ResolverRoll {
    pub outcome: AttackOutcome,
    pub damage: i64,
    pub crit: bool,
    pub thorns: i64,
    pub lifesteal: i64,
    pub source_tokens: Vec<TokenKind>,
    pub target_tokens: Vec<TokenKind>,
}

/// Resolve one direction against a living target.
///
/// Both sheets must already be materialized; the pipeline guarantees
/// this before calling in.
pub fn resolve(
    src: &StatSheet,
    tgt: &StatSheet,
    ctx: &InteractionCtx,
    tuning: &CombatTuning,
    rng: &mut dyn RngCore,
) -> ResolverRoll {
    let physical = matches!(ctx.source_kind, SourceKind::MainHand | SourceKind::OffHand);

    let mut source_tokens = Vec::new();
    let mut target_tokens = Vec::new();

    // (a) Damage roll.
    let (mut damage, crit) = roll_damage(src, tgt, ctx, tuning, rng);

    // (b) Parry: physical only, capped; ends the direction.
    if physical {
        let parry = tgt.get(keys::PARRY_CHANCE).clamp(0.0, tuning.parry_cap);
        if roll(rng, parry) {
            target_tokens.push(TokenKind::Parry);
            return ResolverRoll {
                outcome: AttackOutcome::Parried,
                damage: 0,
                crit: false,
                thorns: 0,
                lifesteal: 0,
                source_tokens,
                target_tokens,
            };
        }
    }

    // (c) Dodge: attacker's anti-dodge shaves the chance.
    let dodge = (tgt.get(keys::DODGE_CHANCE) - src.get(keys::ANTI_DODGE))
        .clamp(0.0, tuning.dodge_cap);
    if roll(rng, dodge) {
        target_tokens.push(TokenKind::Dodge);
        if roll(rng, tuning.counter_on_dodge_chance) {
            target_tokens.push(TokenKind::Counter);
        }
        return ResolverRoll {
            outcome: AttackOutcome::Dodged,
            damage: 0,
            crit: false,
            thorns: 0,
            lifesteal: 0,
            source_tokens,
            target_tokens,
        };
    }

    // (d) Block: passive shield first, then geo-block on zone overlap.
    let shield_block = ctx.defender_has_shield
        && roll(rng, tgt.get(keys::BLOCK_CHANCE).clamp(0.0, tuning.block_cap));
    let geo_block = !shield_block
        && ctx
            .attack_zones
            .iter()
            .any(|zone| ctx.block_zones.contains(zone));
    let mut outcome = if crit { AttackOutcome::Crit } else { AttackOutcome::Hit };
    let mut thorns = 0i64;
    if shield_block || geo_block {
        target_tokens.push(TokenKind::Block);
        thorns = tgt.get(keys::THORNS_DAMAGE).max(0.0) as i64;
        if crit {
            // A crit punches through at reduced power and keeps going.
            let block_power = tgt.get(keys::SHIELD_BLOCK_POWER).clamp(0.0, 1.0);
            damage = (damage as f64 * (1.0 - block_power)) as i64;
            outcome = AttackOutcome::CritBlocked;
        } else {
            return ResolverRoll {
                outcome: AttackOutcome::Blocked,
                damage: 0,
                crit: false,
                thorns,
                lifesteal: 0,
                source_tokens,
                target_tokens,
            };
        }
    }

    // (e) Mitigation: physical only.
    if physical {
        let pierced = roll(rng, src.get(keys::PIERCE_CHANCE).clamp(0.0, 1.0));
        if !pierced {
            let resist = (tgt.get(keys::RESIST_PHYSICAL) - src.get(keys::PENETRATION))
                .clamp(0.0, tuning.resist_cap);
            damage = (damage as f64 * (1.0 - resist)) as i64;
        }
        damage -= tgt.get(keys::DAMAGE_REDUCTION_FLAT).max(0.0) as i64;
        damage = damage.max(tuning.damage_floor);
    }

    source_tokens.push(TokenKind::Hit);
    if crit {
        source_tokens.push(TokenKind::Crit);
    }

    // (f) Vampirism.
    let lifesteal = if roll(rng, src.get(keys::VAMP_TRIGGER_CHANCE).clamp(0.0, 1.0)) {
        (damage as f64 * src.get(keys::VAMP_POWER).max(0.0)) as i64
    } else {
        0
    };

    ResolverRoll {
        outcome,
        damage,
        crit,
        thorns,
        lifesteal,
        source_tokens,
        target_tokens,
    }
}

/// Stage (a): base roll, bonuses, skill multiplier, crit check.
fn roll_damage(
    src: &StatSheet,
    tgt: &StatSheet,
    ctx: &InteractionCtx,
    tuning: &CombatTuning,
    rng: &mut dyn RngCore,
) -> (i64, bool) {
    let (min, max, skill_mult) = match ctx.source_kind.hand() {
        Some(hand) => (
            src.handed(hand, keys::DAMAGE_MIN),
            src.handed(hand, keys::DAMAGE_MAX),
            src.handed(hand, keys::SKILL_MULT).max(0.0),
        ),
        None => (
            src.get(keys::MAGIC_DAMAGE_MIN),
            src.get(keys::MAGIC_DAMAGE_MAX),
            1.0,
        ),
    };

    let base = match ctx.override_damage {
        Some(fixed) => fixed as f64,
        None => {
            let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
            if hi <= lo { lo } else { rng.gen_range(lo..=hi) }
        }
    };

    let specific = ctx
        .defender_armor
        .as_deref()
        .map(|armor| src.get(&format!("{}{}", keys::DAMAGE_BONUS_VS, armor)))
        .unwrap_or(0.0);
    let generic = src.get(keys::DAMAGE_BONUS_GENERIC);
    let mut damage = base * (1.0 + specific + generic) * skill_mult;

    let crit_chance = (src.get(keys::CRIT_CHANCE) - tgt.get(keys::ANTI_CRIT))
        .clamp(0.0, tuning.crit_cap);
    let crit = roll(rng, crit_chance);
    if crit {
        damage *= src.get(keys::CRIT_POWER).max(1.0);
    }

    (damage.max(0.0) as i64, crit)
}

fn roll(rng: &mut dyn RngCore, chance: f64) -> bool {
    if chance <= 0.0 {
        return false;
    }
    if chance >= 1.0 {
        return true;
    }
    rng.gen_bool(chance)
}
