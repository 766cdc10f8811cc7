//! Phase 6: post-calc (ability service).
//!
//! Evaluates declared pipeline steps whose trigger predicate matched the
//! resolver outcome, and translates resolver-raised trigger flags into
//! status overlays. Effects are staged, not applied; the apply phase
//! commits them together with the direct damage.

use serde_json::{Map, Value, json};

use crate::catalog::{CatalogIndex, PipelineStep, StepAction, StepTrigger};
use crate::model::{ActiveAbility, ActorId, ActorSnapshot};

use super::precalc::Precalc;
use super::result::{AttackOutcome, PostEffect};

/// Collect staged effects for one resolved direction.
pub fn postcalc(
    source: &ActorSnapshot,
    precalc: &Precalc,
    trigger_flags: &std::collections::BTreeSet<String>,
    outcome: AttackOutcome,
    damage: i64,
    catalog: &CatalogIndex,
    step: u64,
) -> Vec<PostEffect> {
    let mut effects = Vec::new();

    let mut steps: Vec<PipelineStep> = Vec::new();
    if let Some(ability) = &precalc.ability {
        steps.extend(ability.pipeline.iter().cloned());
    }
    if let Some(item) = &precalc.item {
        steps.extend(item.pipeline.iter().cloned());
    }
    // Steps declared on the source's live overlays join in.
    for overlay in source.live_abilities(step) {
        if let Some(declared) = overlay.payload.get("pipeline") {
            if let Ok(parsed) = serde_json::from_value::<Vec<PipelineStep>>(declared.clone()) {
                steps.extend(parsed);
            }
        }
    }

    for declared in &steps {
        if !trigger_matches(declared.trigger, outcome, damage) {
            continue;
        }
        match &declared.action {
            StepAction::DealDamage { amount } => {
                effects.push(PostEffect::DealDamage { amount: *amount });
            }
            StepAction::Heal { amount } => {
                effects.push(PostEffect::HealSource { amount: *amount });
            }
            StepAction::ApplyStatus {
                status_id,
                duration,
                power,
            } => {
                effects.push(PostEffect::ApplyStatus {
                    overlay: build_overlay(source.id(), status_id, *duration, *power, catalog, step),
                });
            }
        }
    }

    // Resolver-raised markers: weapon/ability trigger flags of the form
    // "{predicate}:{status_id}" ("on_crit:bleed").
    for flag in trigger_flags {
        let Some((predicate, status_id)) = flag.split_once(':') else {
            continue;
        };
        let Ok(trigger) = predicate.parse::<StepTrigger>() else {
            continue;
        };
        if trigger_matches(trigger, outcome, damage) {
            effects.push(PostEffect::ApplyStatus {
                overlay: build_overlay(source.id(), status_id, 0, 0.0, catalog, step),
            });
        }
    }

    effects
}

fn trigger_matches(trigger: StepTrigger, outcome: AttackOutcome, damage: i64) -> bool {
    match trigger {
        StepTrigger::Always => true,
        StepTrigger::OnHit => damage > 0,
        StepTrigger::OnCrit => matches!(outcome, AttackOutcome::Crit | AttackOutcome::CritBlocked),
        StepTrigger::OnBlock => {
            matches!(outcome, AttackOutcome::Blocked | AttackOutcome::CritBlocked)
        }
        StepTrigger::OnDodge => outcome == AttackOutcome::Dodged,
        StepTrigger::OnParry => outcome == AttackOutcome::Parried,
    }
}

/// Build the overlay for a status, merging the catalog definition with
/// the applier's duration and power.
fn build_overlay(
    source_id: ActorId,
    status_id: &str,
    duration: u64,
    power: f64,
    catalog: &CatalogIndex,
    step: u64,
) -> ActiveAbility {
    let def = catalog.status(status_id);
    let duration = if duration > 0 {
        duration
    } else {
        def.map(|d| d.duration).unwrap_or(1)
    };
    let mut payload = Map::new();
    if power != 0.0 {
        payload.insert("power".to_string(), json!(power));
    }
    if let Some(def) = def {
        for flag in &def.flags {
            payload.insert(flag.clone(), Value::Bool(true));
        }
    }
    ActiveAbility {
        uid: format!("{status_id}:{source_id}:{step}"),
        ability_id: status_id.to_string(),
        source_id,
        expires_at_exchange: step + duration,
        impact: def.map(|d| d.impact.clone()).unwrap_or_default(),
        payload,
    }
}

#[cfg(test)]
mod tests {
    use crate::catalog::{AbilityConfig, StatusDef};
    use crate::model::WeaponLayout;
    use crate::pipeline::test_fixtures::actor;

    use super::*;

    fn catalog() -> CatalogIndex {
        CatalogIndex::new(
            [AbilityConfig {
                id: "rend".into(),
                pipeline: vec![
                    PipelineStep {
                        trigger: StepTrigger::OnHit,
                        action: StepAction::ApplyStatus {
                            status_id: "bleed".into(),
                            duration: 2,
                            power: 4.0,
                        },
                    },
                    PipelineStep {
                        trigger: StepTrigger::OnParry,
                        action: StepAction::Heal { amount: 10 },
                    },
                ],
                ..AbilityConfig::default()
            }],
            [],
            [],
            [StatusDef {
                id: "bleed".into(),
                duration: 3,
                flags: vec!["is_bleed".into()],
                ..StatusDef::default()
            }],
        )
    }

    #[test]
    fn on_hit_steps_fire_only_with_damage() {
        let source = actor(1, "blue", WeaponLayout::OneHand);
        let catalog = catalog();
        let pre = Precalc {
            ability: catalog.ability("rend").cloned(),
            ..Precalc::default()
        };
        let flags = Default::default();

        let fired = postcalc(&source, &pre, &flags, AttackOutcome::Hit, 12, &catalog, 1);
        assert_eq!(fired.len(), 1);
        match &fired[0] {
            PostEffect::ApplyStatus { overlay } => {
                assert_eq!(overlay.ability_id, "bleed");
                assert_eq!(overlay.expires_at_exchange, 3);
                assert_eq!(overlay.payload["is_bleed"], Value::Bool(true));
            }
            other => panic!("unexpected effect {other:?}"),
        }

        let none = postcalc(&source, &pre, &flags, AttackOutcome::Dodged, 0, &catalog, 1);
        assert!(none.is_empty());
    }

    #[test]
    fn weapon_trigger_flag_raises_status_on_crit() {
        let source = actor(1, "blue", WeaponLayout::OneHand);
        let catalog = catalog();
        let pre = Precalc::default();
        let mut flags = std::collections::BTreeSet::new();
        flags.insert("on_crit:bleed".to_string());

        let fired = postcalc(&source, &pre, &flags, AttackOutcome::Crit, 30, &catalog, 2);
        assert_eq!(fired.len(), 1);

        let none = postcalc(&source, &pre, &flags, AttackOutcome::Hit, 30, &catalog, 2);
        assert!(none.is_empty());
    }

    #[test]
    fn status_duration_defaults_from_catalog() {
        let source = actor(1, "blue", WeaponLayout::OneHand);
        let catalog = catalog();
        let mut flags = std::collections::BTreeSet::new();
        flags.insert("on_hit:bleed".to_string());

        let fired = postcalc(&source, &Precalc::default(), &flags, AttackOutcome::Hit, 5, &catalog, 10);
        match &fired[0] {
            PostEffect::ApplyStatus { overlay } => {
                assert_eq!(overlay.expires_at_exchange, 13, "catalog duration 3 applies");
            }
            other => panic!("unexpected effect {other:?}"),
        }
    }
}
