//! Phase 7: apply.
//!
//! Mutates snapshots in place: damage, tokens, counters, staged post-calc
//! effects, and xp buffering through the outcome classifier.

use crate::config::CombatTuning;
use crate::model::{ActorSnapshot, TokenKind};
use crate::stats::keys;

use super::result::{AttackOutcome, InteractionResult, PostEffect};

/// Outcome class used to scale xp awards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum XpClass {
    Miss,
    Partial,
    Success,
    Crit,
}

/// Classify a resolved direction for xp purposes.
pub fn classify(outcome: AttackOutcome) -> XpClass {
    match outcome {
        AttackOutcome::Dodged | AttackOutcome::Parried | AttackOutcome::Skipped => XpClass::Miss,
        AttackOutcome::Blocked => XpClass::Partial,
        AttackOutcome::CritBlocked => XpClass::Partial,
        AttackOutcome::Hit => XpClass::Success,
        AttackOutcome::Crit => XpClass::Crit,
    }
}

fn attacker_xp(class: XpClass) -> i64 {
    match class {
        XpClass::Miss => 1,
        XpClass::Partial => 2,
        XpClass::Success => 4,
        XpClass::Crit => 6,
    }
}

/// Commit one direction's mutations.
///
/// With `self_cast` set and no separate target, target-directed effects
/// route back to the source. Without it, status effects lacking a target
/// are dropped silently (the runtime logs the resolution miss).
pub fn apply_direction(
    source: &mut ActorSnapshot,
    mut target: Option<&mut ActorSnapshot>,
    result: &mut InteractionResult,
    tuning: &CombatTuning,
    self_cast: bool,
) {
    // Direct damage, absorb pool first.
    if result.damage > 0 {
        if let Some(target) = target.as_deref_mut() {
            target.state.take_damage(result.damage);
            target.state.counters.damage_taken += result.damage;
            source.state.counters.damage_dealt += result.damage;
        }
    }

    // Thorns reflect onto the attacker.
    if result.thorns > 0 {
        source.state.take_damage(result.thorns);
        source.state.counters.damage_taken += result.thorns;
    }

    if result.lifesteal > 0 {
        source.state.heal(result.lifesteal);
        source.state.counters.healing += result.lifesteal;
    }

    // Outcome counters.
    match result.outcome {
        AttackOutcome::Crit | AttackOutcome::CritBlocked => source.state.counters.crits += 1,
        _ => {}
    }
    if let Some(target) = target.as_deref_mut() {
        match result.outcome {
            AttackOutcome::Blocked | AttackOutcome::CritBlocked => {
                target.state.counters.blocks += 1
            }
            AttackOutcome::Dodged => target.state.counters.dodges += 1,
            AttackOutcome::Parried => target.state.counters.parries += 1,
            _ => {}
        }
    }

    // Tokens; only counter tokens carry a cap.
    for kind in &result.source_tokens {
        let cap = (*kind == TokenKind::Counter).then_some(tuning.counter_token_cap);
        source.state.add_tokens(*kind, 1, cap);
    }
    if let Some(target) = target.as_deref_mut() {
        for kind in &result.target_tokens {
            let cap = (*kind == TokenKind::Counter).then_some(tuning.counter_token_cap);
            target.state.add_tokens(*kind, 1, cap);
        }
    }

    // Staged post-calc effects.
    for effect in std::mem::take(&mut result.effects) {
        match effect {
            PostEffect::DealDamage { amount } => {
                if let Some(target) = target.as_deref_mut() {
                    target.state.take_damage(amount);
                    target.state.counters.damage_taken += amount;
                    source.state.counters.damage_dealt += amount;
                } else if self_cast {
                    source.state.take_damage(amount);
                    source.state.counters.damage_taken += amount;
                }
            }
            PostEffect::HealSource { amount } => {
                let before = source.state.hp;
                source.state.heal(amount);
                source.state.counters.healing += source.state.hp - before;
            }
            PostEffect::ApplyStatus { overlay } => {
                if let Some(target) = target.as_deref_mut() {
                    target.active_abilities.push(overlay);
                } else if self_cast {
                    source.active_abilities.push(overlay);
                }
            }
        }
    }

    // Xp buffering over weapon, armor, and shield skills.
    let class = classify(result.outcome);
    buffer_xp(source, target.as_deref_mut(), result, class);

    if let Some(target) = target.as_deref() {
        result.target_died = !target.is_alive();
    }
}

fn buffer_xp(
    source: &mut ActorSnapshot,
    mut target: Option<&mut ActorSnapshot>,
    result: &InteractionResult,
    class: XpClass,
) {
    // Attacker trains the skill of the hand that swung.
    let slot = match result.outcome {
        _ if result.target_id.is_none() => None,
        _ => Some("main_hand"),
    };
    if let Some(slot) = slot {
        if let Some(skill) = source.loadout.skill_in(slot).map(str::to_string) {
            source.buffer_xp(&skill, attacker_xp(class));
        }
    }

    if let Some(target) = target.as_deref_mut() {
        // Defender trains armor when the hit landed, shield when blocked.
        if result.outcome.connected() && result.damage > 0 {
            if let Some(armor) = target.loadout.armor_type.clone() {
                target.buffer_xp(&format!("skill_armor_{armor}"), 2);
            }
        }
        if matches!(
            result.outcome,
            AttackOutcome::Blocked | AttackOutcome::CritBlocked
        ) && target.loadout.has_shield
        {
            target.buffer_xp("skill_shield", 3);
        }
    }
}

/// Per-exchange upkeep applied once per actor after a committed exchange:
/// energy regeneration and overlay pruning.
pub fn exchange_upkeep(actor: &mut ActorSnapshot, step: u64) {
    if let Some(sheet) = &actor.stats {
        let regen = sheet.get(keys::EN_REGEN).max(0.0) as i64;
        actor.state.en = (actor.state.en + regen).min(actor.state.max_en);
    }
    actor.state.exchange_count += 1;
    actor.prune_expired_abilities(step);
}
