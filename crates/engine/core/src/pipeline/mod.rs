//! The per-interaction combat pipeline.
//!
//! Phase order is fixed: context build → pre-calc → stats materialization
//! → liveness gates → resolver → post-calc → apply. For a matched exchange
//! both directions resolve before either applies, so the mutation order
//! matches intent creation.
//!
//! Everything here is pure in-memory work; the executor loads the context,
//! runs the pipeline per action, and commits the mutations in one batch.

mod apply;
mod context;
mod postcalc;
mod precalc;
mod resolver;
mod result;

pub use apply::{XpClass, classify, exchange_upkeep};
pub use context::{InteractionCtx, SourceKind};
pub use result::{
    AbortReason, AttackOutcome, ChainEvent, ExchangeReport, ExternalMods, InteractionResult,
    PostEffect,
};

use rand::RngCore;

use crate::catalog::CatalogIndex;
use crate::config::CombatTuning;
use crate::model::{ActorSnapshot, LogEntry, Move};
use crate::stats::ensure_stats;

use context::build_context;
use precalc::{Precalc, precalc};
use result::zone_bar;

/// Stateless resolver over immutable catalogs and tuning.
#[derive(Clone, Copy, Debug)]
pub struct Pipeline<'a> {
    catalog: &'a CatalogIndex,
    tuning: &'a CombatTuning,
}

impl<'a> Pipeline<'a> {
    pub fn new(catalog: &'a CatalogIndex, tuning: &'a CombatTuning) -> Self {
        Self { catalog, tuning }
    }

    /// Resolve a full exchange action.
    ///
    /// `move_b` is the reciprocal intent for matched pairs; forced
    /// actions pass `None` and only the primary direction runs.
    pub fn run_exchange(
        &self,
        a: &mut ActorSnapshot,
        b: &mut ActorSnapshot,
        move_a: &Move,
        move_b: Option<&Move>,
        external: &ExternalMods,
        step: u64,
        now: f64,
        rng: &mut dyn RngCore,
    ) -> ExchangeReport {
        // Phase 1+2 for both directions before any stats are read: the
        // pre-calc raw mutations must land in both sheets.
        let mut ctx_a = build_context(a, Some(b), move_a, external, self.tuning, false, rng);
        let pre_a = precalc(a, &mut ctx_a, self.catalog, step);

        let mut dir_b = move_b.map(|mb| {
            let mut ctx_b = build_context(b, Some(a), mb, external, self.tuning, false, rng);
            let pre_b = precalc(b, &mut ctx_b, self.catalog, step);
            (ctx_b, pre_b)
        });

        // Phase 3.
        ensure_stats(a, step);
        ensure_stats(b, step);

        // Phases 4-6, primary then reciprocal. Each direction's dual-wield
        // chain decision rides on its own context.
        let mut primary = self.resolve_direction(a, Some(b), &ctx_a, pre_a, step, rng);
        if ctx_a.dual_chain {
            if let Some(target_id) = primary.target_id {
                primary.chain.push(ChainEvent {
                    source_id: primary.source_id,
                    target_id,
                });
            }
        }
        let mut reciprocal = None;
        if let Some((ctx_b, pre_b)) = dir_b.take() {
            let mut resolved = self.resolve_direction(b, Some(a), &ctx_b, pre_b, step, rng);
            if ctx_b.dual_chain {
                if let Some(target_id) = resolved.target_id {
                    resolved.chain.push(ChainEvent {
                        source_id: resolved.source_id,
                        target_id,
                    });
                }
            }
            reciprocal = Some(resolved);
        }

        // Phase 7: apply in intent order.
        apply::apply_direction(a, Some(b), &mut primary, self.tuning, false);
        if let Some(reciprocal) = reciprocal.as_mut() {
            apply::apply_direction(b, Some(a), reciprocal, self.tuning, false);
        }
        apply::exchange_upkeep(a, step);
        apply::exchange_upkeep(b, step);

        let mut logs = vec![primary.log.clone()];
        if let Some(reciprocal) = &reciprocal {
            logs.push(reciprocal.log.clone());
        }
        let mut chain = primary.chain.clone();
        if let Some(reciprocal) = &reciprocal {
            chain.extend(reciprocal.chain.iter().cloned());
        }
        let log = LogEntry::new(now, step, &a.meta.name, &b.meta.name, logs);

        ExchangeReport {
            primary,
            reciprocal,
            log,
            chain,
        }
    }

    /// Resolve a one-sided interaction: item use, instant cast, or a
    /// dual-wield follow-up (`off_hand`).
    ///
    /// A `target` of `None` routes the interaction back onto the source
    /// (self-cast).
    pub fn run_single(
        &self,
        source: &mut ActorSnapshot,
        mut target: Option<&mut ActorSnapshot>,
        intent: &Move,
        external: &ExternalMods,
        off_hand: bool,
        step: u64,
        rng: &mut dyn RngCore,
    ) -> InteractionResult {
        let mut ctx = build_context(
            source,
            target.as_deref(),
            intent,
            external,
            self.tuning,
            off_hand,
            rng,
        );
        let pre = precalc(source, &mut ctx, self.catalog, step);

        ensure_stats(source, step);
        if let Some(target) = target.as_deref_mut() {
            ensure_stats(target, step);
        }

        let self_cast = target.is_none();
        let mut result = self.resolve_direction(source, target.as_deref(), &ctx, pre, step, rng);
        apply::apply_direction(source, target, &mut result, self.tuning, self_cast);
        result
    }

    /// Phases 4-6 for one direction; returns a result ready for apply.
    fn resolve_direction(
        &self,
        source: &ActorSnapshot,
        target: Option<&ActorSnapshot>,
        ctx: &InteractionCtx,
        pre: Result<Precalc, AbortReason>,
        step: u64,
        rng: &mut dyn RngCore,
    ) -> InteractionResult {
        let source_name = &source.meta.name;

        // Pre-calc verdict first: control and disable win over liveness.
        let pre = match pre {
            Ok(pre) => pre,
            Err(reason) => {
                let log = match reason {
                    AbortReason::Controlled => format!("{source_name} is unable to act"),
                    AbortReason::Disabled => format!("{source_name}'s attack was interrupted"),
                    _ => format!("{source_name} stays still"),
                };
                return InteractionResult::skipped(ctx.source_id, ctx.target_id, reason, log);
            }
        };

        // Liveness gates.
        if !source.is_alive() {
            return InteractionResult::skipped(
                ctx.source_id,
                ctx.target_id,
                AbortReason::AttackerDead,
                format!("{source_name} is dead"),
            );
        }
        if let Some(target) = target {
            if !target.is_alive() {
                return InteractionResult::skipped(
                    ctx.source_id,
                    ctx.target_id,
                    AbortReason::TargetDead,
                    format!("{} is already dead", target.meta.name),
                );
            }
        }

        // Resolver runs only with a living target and an armed calculator.
        let roll = match target {
            Some(target) if ctx.run_calculator => {
                let src_sheet = source.stats.as_ref();
                let tgt_sheet = target.stats.as_ref();
                match (src_sheet, tgt_sheet) {
                    (Some(src), Some(tgt)) => {
                        Some(resolver::resolve(src, tgt, ctx, self.tuning, rng))
                    }
                    _ => None,
                }
            }
            _ => None,
        };

        let (outcome, damage, crit, thorns, lifesteal, source_tokens, target_tokens) = match &roll {
            Some(roll) => (
                roll.outcome,
                roll.damage,
                roll.crit,
                roll.thorns,
                roll.lifesteal,
                roll.source_tokens.clone(),
                roll.target_tokens.clone(),
            ),
            None => (AttackOutcome::Skipped, 0, false, 0, 0, vec![], vec![]),
        };

        let effects = postcalc::postcalc(
            source,
            &pre,
            &ctx.trigger_flags,
            outcome,
            damage,
            self.catalog,
            step,
        );

        let bar = zone_bar(&ctx.attack_zones, &ctx.block_zones, outcome);
        let log = render_log(source_name, target.map(|t| t.meta.name.as_str()), outcome, damage, &bar);

        InteractionResult {
            source_id: ctx.source_id,
            target_id: ctx.target_id,
            outcome,
            aborted: None,
            damage,
            crit,
            thorns,
            lifesteal,
            source_tokens,
            target_tokens,
            effects,
            chain: vec![],
            zone_bar: bar,
            log,
            target_died: false,
        }
    }
}

fn render_log(
    source: &str,
    target: Option<&str>,
    outcome: AttackOutcome,
    damage: i64,
    bar: &str,
) -> String {
    let target = target.unwrap_or(source);
    match outcome {
        AttackOutcome::Hit => format!("{source} hits {target} for {damage} {bar}"),
        AttackOutcome::Crit => format!("{source} critically hits {target} for {damage} {bar}"),
        AttackOutcome::CritBlocked => {
            format!("{source} crits through {target}'s block for {damage} {bar}")
        }
        AttackOutcome::Blocked => format!("{target} blocks {source}'s attack {bar}"),
        AttackOutcome::Dodged => format!("{target} dodges {source}'s attack {bar}"),
        AttackOutcome::Parried => format!("{target} parries {source}'s attack {bar}"),
        AttackOutcome::Skipped => format!("{source} acts on {target} {bar}"),
    }
}


#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use crate::catalog::CatalogIndex;
    use crate::model::{InstantPayload, MovePayload, TargetSpec, WeaponLayout};

    use super::test_fixtures::{actor, exchange_move, stun_overlay};
    use super::*;

    fn plain_duel() -> (ActorSnapshot, ActorSnapshot) {
        (
            actor(1, "blue", WeaponLayout::OneHand),
            actor(2, "red", WeaponLayout::OneHand),
        )
    }

    #[test]
    fn matched_exchange_damages_both_sides() {
        let (mut a, mut b) = plain_duel();
        let catalog = CatalogIndex::default();
        let tuning = CombatTuning::default();
        let pipeline = Pipeline::new(&catalog, &tuning);
        let mut rng = StdRng::seed_from_u64(42);

        // Attack zones avoid the opposing block pair so damage lands
        // whenever avoidance stats are zero.
        let report = pipeline.run_exchange(
            &mut a,
            &mut b,
            &exchange_move("m1", 1, 2),
            Some(&exchange_move("m2", 2, 1)),
            &ExternalMods::default(),
            1,
            100.0,
            &mut rng,
        );

        assert!(a.state.hp < 100);
        assert!(b.state.hp < 100);
        assert_eq!(report.log.round_index, 1);
        assert_eq!(report.log.logs.len(), 2);
        assert_eq!(a.state.exchange_count, 1);
        assert_eq!(b.state.exchange_count, 1);
        assert!(report.reciprocal.is_some());
    }

    #[test]
    fn forced_exchange_leaves_attacker_untouched() {
        let (mut a, mut b) = plain_duel();
        let catalog = CatalogIndex::default();
        let tuning = CombatTuning::default();
        let pipeline = Pipeline::new(&catalog, &tuning);
        let mut rng = StdRng::seed_from_u64(7);

        let report = pipeline.run_exchange(
            &mut a,
            &mut b,
            &exchange_move("m1", 1, 2),
            None,
            &ExternalMods::default(),
            1,
            100.0,
            &mut rng,
        );

        assert_eq!(a.state.hp, 100, "no reciprocal direction ran");
        assert!(b.state.hp < 100);
        assert!(report.reciprocal.is_none());
        assert_eq!(report.log.logs.len(), 1);
    }

    #[test]
    fn stunned_attacker_skips_but_still_defends() {
        let (mut a, mut b) = plain_duel();
        a.active_abilities.push(stun_overlay(5));
        let catalog = CatalogIndex::default();
        let tuning = CombatTuning::default();
        let pipeline = Pipeline::new(&catalog, &tuning);
        let mut rng = StdRng::seed_from_u64(3);

        let report = pipeline.run_exchange(
            &mut a,
            &mut b,
            &exchange_move("m1", 1, 2),
            Some(&exchange_move("m2", 2, 1)),
            &ExternalMods::default(),
            1,
            100.0,
            &mut rng,
        );

        assert_eq!(report.primary.outcome, AttackOutcome::Skipped);
        assert_eq!(b.state.hp, 100, "stunned attacker dealt nothing");
        assert!(a.state.hp < 100, "reciprocal direction still landed");
    }

    #[test]
    fn dead_target_gates_the_direction() {
        let (mut a, mut b) = plain_duel();
        b.state.hp = 0;
        b.state.is_dead = true;
        let catalog = CatalogIndex::default();
        let tuning = CombatTuning::default();
        let pipeline = Pipeline::new(&catalog, &tuning);
        let mut rng = StdRng::seed_from_u64(3);

        let report = pipeline.run_exchange(
            &mut a,
            &mut b,
            &exchange_move("m1", 1, 2),
            None,
            &ExternalMods::default(),
            1,
            100.0,
            &mut rng,
        );
        assert_eq!(report.primary.outcome, AttackOutcome::Skipped);
        assert_eq!(report.primary.aborted, Some(AbortReason::TargetDead));
    }

    #[test]
    fn self_cast_instant_routes_to_source() {
        use crate::catalog::{AbilityConfig, PipelineStep, StepAction, StepTrigger};

        let mut caster = actor(1, "blue", WeaponLayout::OneHand);
        caster.state.hp = 40;
        let catalog = CatalogIndex::new(
            [AbilityConfig {
                id: "second_wind".into(),
                pipeline: vec![PipelineStep {
                    trigger: StepTrigger::Always,
                    action: StepAction::Heal { amount: 25 },
                }],
                ..AbilityConfig::default()
            }],
            [],
            [],
            [],
        );
        let tuning = CombatTuning::default();
        let pipeline = Pipeline::new(&catalog, &tuning);
        let mut rng = StdRng::seed_from_u64(3);

        let intent = Move {
            move_id: "m1".into(),
            char_id: 1,
            created_at: 1.0,
            deadline: 61.0,
            payload: MovePayload::Instant(InstantPayload {
                ability_key: "second_wind".into(),
                target: TargetSpec::Named("self".into()),
                targets: vec![1],
                extra: Default::default(),
            }),
        };

        let result = pipeline.run_single(
            &mut caster,
            None,
            &intent,
            &ExternalMods::default(),
            false,
            1,
            &mut rng,
        );
        assert_eq!(caster.state.hp, 65);
        assert!(result.aborted.is_none());
    }
}
