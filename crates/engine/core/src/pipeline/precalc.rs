//! Phase 2: pre-calc (ability service).
//!
//! Gates on control effects, resolves ability/feint/item configuration
//! from the intent payload, pays costs, and applies the config's raw and
//! pipeline mutations.

use crate::catalog::{AbilityConfig, CatalogIndex, FeintConfig, ItemBase};
use crate::model::ActorSnapshot;

use super::context::InteractionCtx;
use super::result::AbortReason;

/// Configuration resolved for one direction, carried into post-calc.
#[derive(Clone, Debug, Default)]
pub struct Precalc {
    pub ability: Option<AbilityConfig>,
    pub feint: Option<FeintConfig>,
    pub item: Option<ItemBase>,
}

/// Run pre-calc for one direction.
///
/// An unpayable cost drops the ability rather than aborting the attack;
/// a control overlay aborts the whole direction.
pub fn precalc(
    source: &mut ActorSnapshot,
    ctx: &mut InteractionCtx,
    catalog: &CatalogIndex,
    step: u64,
) -> Result<Precalc, AbortReason> {
    // Control gate: a live stun or sleep overlay wins over everything.
    let controlled = source
        .live_abilities(step)
        .any(|overlay| overlay.flag("is_stun") || overlay.flag("is_sleep"));
    if controlled {
        ctx.run_calculator = false;
        return Err(AbortReason::Controlled);
    }

    let mut resolved = Precalc::default();

    if let Some(key) = ctx.ability_key.clone() {
        if let Some(config) = catalog.ability(&key) {
            if pay_ability_cost(source, config) {
                apply_ability(source, ctx, config);
                resolved.ability = Some(config.clone());
            }
        }
    }

    if let Some(key) = ctx.feint_key.clone() {
        if let Some(config) = catalog.feint(&key) {
            if pay_feint_cost(source, config) {
                apply_feint(source, ctx, config);
                resolved.feint = Some(config.clone());
            }
        }
    }

    if let Some(item_id) = ctx.item_id.clone() {
        resolved.item = catalog.item(&item_id).cloned();
    }

    if ctx.disable_attack {
        ctx.run_calculator = false;
        return Err(AbortReason::Disabled);
    }

    Ok(resolved)
}

fn pay_ability_cost(source: &mut ActorSnapshot, config: &AbilityConfig) -> bool {
    let cost = &config.cost;
    if source.state.en < cost.en || source.state.hp <= cost.hp {
        return false;
    }
    for (kind, count) in &cost.tokens {
        if source.state.tokens.get(kind).copied().unwrap_or(0) < *count {
            return false;
        }
    }
    source.state.en -= cost.en;
    source.state.hp -= cost.hp;
    for (kind, count) in &cost.tokens {
        source.state.spend_tokens(*kind, *count);
    }
    true
}

/// Feints spend tactical tokens only.
fn pay_feint_cost(source: &mut ActorSnapshot, config: &FeintConfig) -> bool {
    for (kind, count) in &config.token_cost {
        if source.state.tokens.get(kind).copied().unwrap_or(0) < *count {
            return false;
        }
    }
    for (kind, count) in &config.token_cost {
        source.state.spend_tokens(*kind, *count);
    }
    true
}

fn apply_ability(source: &mut ActorSnapshot, ctx: &mut InteractionCtx, config: &AbilityConfig) {
    for (stat, value) in &config.raw_mutations {
        source
            .raw
            .modifier_entry(stat)
            .set_temp(format!("ability:{}", config.id), *value);
        source.mark_dirty(stat.clone());
    }
    for (flag, value) in &config.pipeline_mutations {
        match flag.as_str() {
            "disable_attack" => ctx.disable_attack = *value,
            "run_calculator" => ctx.run_calculator = *value,
            _ => {}
        }
    }
    ctx.trigger_flags.extend(config.triggers.iter().cloned());
    if config.override_damage.is_some() {
        ctx.override_damage = config.override_damage;
    }
}

fn apply_feint(source: &mut ActorSnapshot, ctx: &mut InteractionCtx, config: &FeintConfig) {
    for (stat, value) in &config.raw_mutations {
        source
            .raw
            .modifier_entry(stat)
            .set_temp(format!("feint:{}", config.id), *value);
        source.mark_dirty(stat.clone());
    }
    ctx.trigger_flags.extend(config.triggers.iter().cloned());
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::catalog::{AbilityCost, CatalogIndex};
    use crate::config::CombatTuning;
    use crate::model::WeaponLayout;
    use crate::pipeline::context::build_context;
    use crate::pipeline::result::ExternalMods;
    use crate::pipeline::test_fixtures::{actor, exchange_move_with_ability, stun_overlay};

    use super::*;

    fn catalog_with_ability(cost: AbilityCost) -> CatalogIndex {
        let mut raw_mutations = BTreeMap::new();
        raw_mutations.insert("crit_chance".to_string(), 0.2);
        CatalogIndex::new(
            [AbilityConfig {
                id: "power_strike".into(),
                cost,
                raw_mutations,
                ..AbilityConfig::default()
            }],
            [],
            [],
            [],
        )
    }

    fn ctx_for(source: &ActorSnapshot, mv: &crate::model::Move) -> InteractionCtx {
        let mut rng = StdRng::seed_from_u64(1);
        build_context(
            source,
            None,
            mv,
            &ExternalMods::default(),
            &CombatTuning::default(),
            false,
            &mut rng,
        )
    }

    #[test]
    fn stun_overlay_aborts_the_direction() {
        let mut source = actor(1, "blue", WeaponLayout::OneHand);
        source.active_abilities.push(stun_overlay(5));
        let mv = exchange_move_with_ability("m1", 1, 2, None);
        let mut ctx = ctx_for(&source, &mv);

        let result = precalc(&mut source, &mut ctx, &CatalogIndex::default(), 1);
        assert!(matches!(result, Err(AbortReason::Controlled)));
        assert!(!ctx.run_calculator);
    }

    #[test]
    fn ability_cost_paid_and_mutations_marked_dirty() {
        let mut source = actor(1, "blue", WeaponLayout::OneHand);
        source.state.en = 50;
        let catalog = catalog_with_ability(AbilityCost {
            en: 10,
            ..AbilityCost::default()
        });
        let mv = exchange_move_with_ability("m1", 1, 2, Some("power_strike"));
        let mut ctx = ctx_for(&source, &mv);

        let resolved = precalc(&mut source, &mut ctx, &catalog, 1).unwrap();
        assert!(resolved.ability.is_some());
        assert_eq!(source.state.en, 40);
        assert!(source.dirty_stats.contains("crit_chance"));
    }

    #[test]
    fn unpayable_cost_drops_the_ability_but_not_the_attack() {
        let mut source = actor(1, "blue", WeaponLayout::OneHand);
        source.state.en = 3;
        let catalog = catalog_with_ability(AbilityCost {
            en: 10,
            ..AbilityCost::default()
        });
        let mv = exchange_move_with_ability("m1", 1, 2, Some("power_strike"));
        let mut ctx = ctx_for(&source, &mv);

        let resolved = precalc(&mut source, &mut ctx, &catalog, 1).unwrap();
        assert!(resolved.ability.is_none());
        assert_eq!(source.state.en, 3, "nothing was spent");
        assert!(ctx.run_calculator);
    }

    #[test]
    fn expired_stun_does_not_gate() {
        let mut source = actor(1, "blue", WeaponLayout::OneHand);
        let mut overlay = stun_overlay(2);
        overlay.expires_at_exchange = 2;
        source.active_abilities.push(overlay);
        let mv = exchange_move_with_ability("m1", 1, 2, None);
        let mut ctx = ctx_for(&source, &mv);

        // Step 3: the stun expired one exchange ago.
        assert!(precalc(&mut source, &mut ctx, &CatalogIndex::default(), 3).is_ok());
    }
}
