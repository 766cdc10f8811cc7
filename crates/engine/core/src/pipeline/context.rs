//! Phase 1: interaction context build.
//!
//! Inspects the intent and both loadouts, infers the defender's armor and
//! shield, activates weapon-trigger flags, applies external modifiers, and
//! decides whether a dual-wield chain event fires.

use std::collections::BTreeSet;

use rand::RngCore;

use crate::config::CombatTuning;
use crate::model::{ActorId, ActorSnapshot, Move, MovePayload, Zone};
use crate::stats::{Hand, keys};

use super::result::ExternalMods;

/// Where the damage of this direction originates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    MainHand,
    OffHand,
    Magic,
    Item,
}

impl SourceKind {
    /// The hand whose prefixed stats feed the damage roll; `None` for
    /// magic and item sources.
    pub fn hand(self) -> Option<Hand> {
        match self {
            SourceKind::MainHand => Some(Hand::Main),
            SourceKind::OffHand => Some(Hand::Off),
            SourceKind::Magic | SourceKind::Item => None,
        }
    }
}

/// Mutable per-direction context threaded through the phases.
#[derive(Clone, Debug)]
pub struct InteractionCtx {
    pub source_id: ActorId,
    pub target_id: Option<ActorId>,
    pub source_kind: SourceKind,
    pub attack_zones: Vec<Zone>,
    pub block_zones: Vec<Zone>,
    /// Defender's torso armor class, if any.
    pub defender_armor: Option<String>,
    pub defender_has_shield: bool,
    /// Named flags from weapon triggers and ability triggers
    /// ("on_crit:bleed").
    pub trigger_flags: BTreeSet<String>,
    /// Set by external mods or control pre-calc; skips the resolver.
    pub disable_attack: bool,
    /// Cleared by the control gate when a stun/sleep overlay is live.
    pub run_calculator: bool,
    /// Fixed damage bypassing the roll.
    pub override_damage: Option<i64>,
    /// Whether an off-hand follow-up fires after the primary pair.
    pub dual_chain: bool,
    /// Ability key resolved from the intent payload, if any.
    pub ability_key: Option<String>,
    pub feint_key: Option<String>,
    /// Item id for item-strategy directions.
    pub item_id: Option<String>,
}

/// Build the context for one direction.
///
/// `off_hand` marks a chain follow-up: the damage source shifts to the
/// off hand and no further chain can fire.
pub fn build_context(
    source: &ActorSnapshot,
    target: Option<&ActorSnapshot>,
    intent: &Move,
    external: &ExternalMods,
    tuning: &CombatTuning,
    off_hand: bool,
    rng: &mut dyn RngCore,
) -> InteractionCtx {
    use rand::Rng;

    let (source_kind, attack_zones, block_zones, ability_key, feint_key, item_id) =
        match &intent.payload {
            MovePayload::Exchange(payload) => {
                let kind = if off_hand { SourceKind::OffHand } else { SourceKind::MainHand };
                (
                    kind,
                    payload.attack_zones.clone(),
                    payload.block_zones.clone(),
                    payload.ability_key.clone(),
                    payload.feint_key.clone(),
                    None,
                )
            }
            MovePayload::Instant(payload) => (
                SourceKind::Magic,
                vec![],
                vec![],
                Some(payload.ability_key.clone()),
                None,
                None,
            ),
            MovePayload::Item(payload) => (
                SourceKind::Item,
                vec![],
                vec![],
                None,
                None,
                Some(payload.item_id.clone()),
            ),
        };

    let mut trigger_flags: BTreeSet<String> = source
        .loadout
        .weapon_triggers
        .iter()
        .cloned()
        .collect();
    // Ability triggers join in pre-calc; feint flags too.
    trigger_flags.extend(source.loadout.tags.iter().cloned());

    // Dual-wield chain: off hand must carry a weapon, and the roll is
    // scaled by the dual-wield skill. A follow-up never chains again.
    let dual_chain = !off_hand
        && source_kind == SourceKind::MainHand
        && source.loadout.off_hand_is_weapon()
        && {
            let skill = source
                .stats
                .as_ref()
                .map(|sheet| sheet.get(keys::SKILL_DUAL_WIELD))
                .unwrap_or_else(|| source.raw.modifier(keys::SKILL_DUAL_WIELD));
            let chance = (skill * tuning.dual_chain_scale).clamp(0.0, 1.0);
            rng.gen_bool(chance)
        };

    InteractionCtx {
        source_id: source.id(),
        target_id: target.map(ActorSnapshot::id),
        source_kind,
        attack_zones,
        block_zones,
        defender_armor: target.and_then(|t| t.loadout.armor_type.clone()),
        defender_has_shield: target.map(|t| t.loadout.has_shield).unwrap_or(false),
        trigger_flags,
        disable_attack: external.disable_attack,
        run_calculator: true,
        override_damage: None,
        dual_chain,
        ability_key,
        feint_key,
        item_id,
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::model::WeaponLayout;
    use crate::pipeline::test_fixtures::{actor, exchange_move};

    use super::*;

    #[test]
    fn context_infers_defender_armor_and_shield() {
        let source = actor(1, "blue", WeaponLayout::OneHand);
        let mut target = actor(2, "red", WeaponLayout::OneHand);
        target.loadout.armor_type = Some("heavy".into());
        target.loadout.has_shield = true;

        let mv = exchange_move("m1", 1, 2);
        let mut rng = StdRng::seed_from_u64(7);
        let ctx = build_context(
            &source,
            Some(&target),
            &mv,
            &ExternalMods::default(),
            &CombatTuning::default(),
            false,
            &mut rng,
        );
        assert_eq!(ctx.defender_armor.as_deref(), Some("heavy"));
        assert!(ctx.defender_has_shield);
        assert_eq!(ctx.source_kind, SourceKind::MainHand);
        assert!(!ctx.disable_attack);
    }

    #[test]
    fn external_interference_disables_attack() {
        let source = actor(1, "blue", WeaponLayout::OneHand);
        let target = actor(2, "red", WeaponLayout::OneHand);
        let mv = exchange_move("m1", 1, 2);
        let mut rng = StdRng::seed_from_u64(7);
        let ctx = build_context(
            &source,
            Some(&target),
            &mv,
            &ExternalMods { disable_attack: true },
            &CombatTuning::default(),
            false,
            &mut rng,
        );
        assert!(ctx.disable_attack);
    }

    #[test]
    fn one_hand_layout_never_chains() {
        let source = actor(1, "blue", WeaponLayout::OneHand);
        let target = actor(2, "red", WeaponLayout::OneHand);
        let mv = exchange_move("m1", 1, 2);
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let ctx = build_context(
                &source,
                Some(&target),
                &mv,
                &ExternalMods::default(),
                &CombatTuning::default(),
                false,
                &mut rng,
            );
            assert!(!ctx.dual_chain);
        }
    }
}
