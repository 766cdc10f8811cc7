//! The built-in catalog set.
//!
//! A compact but representative roster: enough abilities, feints, items,
//! and statuses to exercise every pipeline surface (costs, raw mutations,
//! damage overrides, trigger flags, post-calc steps).

use std::collections::BTreeMap;

use rbc_core::catalog::{
    AbilityConfig, AbilityCost, CatalogIndex, FeintConfig, ItemBase, PipelineStep, StatusDef,
    StepAction, StepTrigger,
};
use rbc_core::model::TokenKind;
use rbc_core::stat_keys;

/// Assemble the default catalog index.
pub fn builtin_catalog() -> CatalogIndex {
    CatalogIndex::new(abilities(), feints(), items(), statuses())
}

fn abilities() -> Vec<AbilityConfig> {
    vec![
        AbilityConfig {
            id: "power_strike".into(),
            cost: AbilityCost {
                en: 12,
                ..AbilityCost::default()
            },
            raw_mutations: map([
                ("main_hand_damage_min", 6.0),
                ("main_hand_damage_max", 10.0),
            ]),
            ..AbilityConfig::default()
        },
        AbilityConfig {
            id: "focused_eye".into(),
            cost: AbilityCost {
                en: 8,
                ..AbilityCost::default()
            },
            raw_mutations: map([(stat_keys::CRIT_CHANCE, 0.15)]),
            triggers: vec!["on_crit:bleed".into()],
            ..AbilityConfig::default()
        },
        AbilityConfig {
            id: "stunning_blow".into(),
            cost: AbilityCost {
                en: 20,
                hp: 0,
                tokens: BTreeMap::from([(TokenKind::Hit, 2)]),
            },
            pipeline: vec![PipelineStep {
                trigger: StepTrigger::OnCrit,
                action: StepAction::ApplyStatus {
                    status_id: "stun".into(),
                    duration: 1,
                    power: 0.0,
                },
            }],
            ..AbilityConfig::default()
        },
        AbilityConfig {
            id: "second_wind".into(),
            cost: AbilityCost {
                en: 15,
                ..AbilityCost::default()
            },
            pipeline: vec![PipelineStep {
                trigger: StepTrigger::Always,
                action: StepAction::Heal { amount: 30 },
            }],
            ..AbilityConfig::default()
        },
        AbilityConfig {
            id: "fireball".into(),
            cost: AbilityCost {
                en: 25,
                ..AbilityCost::default()
            },
            override_damage: Some(40),
            target_count: Some(3),
            pipeline: vec![PipelineStep {
                trigger: StepTrigger::OnHit,
                action: StepAction::ApplyStatus {
                    status_id: "burn".into(),
                    duration: 2,
                    power: 5.0,
                },
            }],
            ..AbilityConfig::default()
        },
        AbilityConfig {
            id: "stone_skin".into(),
            cost: AbilityCost {
                en: 18,
                ..AbilityCost::default()
            },
            pipeline: vec![PipelineStep {
                trigger: StepTrigger::Always,
                action: StepAction::ApplyStatus {
                    status_id: "stone_skin".into(),
                    duration: 3,
                    power: 0.0,
                },
            }],
            ..AbilityConfig::default()
        },
    ]
}

fn feints() -> Vec<FeintConfig> {
    vec![
        FeintConfig {
            id: "riposte".into(),
            token_cost: BTreeMap::from([(TokenKind::Counter, 1)]),
            raw_mutations: map([
                ("main_hand_damage_min", 8.0),
                ("main_hand_damage_max", 8.0),
            ]),
            ..FeintConfig::default()
        },
        FeintConfig {
            id: "opportunist".into(),
            token_cost: BTreeMap::from([(TokenKind::Dodge, 2)]),
            raw_mutations: map([(stat_keys::ANTI_DODGE, 0.2)]),
            ..FeintConfig::default()
        },
    ]
}

fn items() -> Vec<ItemBase> {
    vec![
        ItemBase {
            id: "healing_draught".into(),
            pipeline: vec![PipelineStep {
                trigger: StepTrigger::Always,
                action: StepAction::Heal { amount: 40 },
            }],
            ..ItemBase::default()
        },
        ItemBase {
            id: "throwing_knife".into(),
            pipeline: vec![PipelineStep {
                trigger: StepTrigger::Always,
                action: StepAction::DealDamage { amount: 15 },
            }],
            ..ItemBase::default()
        },
        ItemBase {
            id: "smoke_bomb".into(),
            target_count: Some(2),
            pipeline: vec![PipelineStep {
                trigger: StepTrigger::Always,
                action: StepAction::ApplyStatus {
                    status_id: "blind".into(),
                    duration: 1,
                    power: 0.0,
                },
            }],
        },
    ]
}

fn statuses() -> Vec<StatusDef> {
    vec![
        StatusDef {
            id: "stun".into(),
            duration: 1,
            flags: vec!["is_stun".into()],
            ..StatusDef::default()
        },
        StatusDef {
            id: "sleep".into(),
            duration: 2,
            flags: vec!["is_sleep".into()],
            ..StatusDef::default()
        },
        StatusDef {
            id: "bleed".into(),
            duration: 3,
            flags: vec!["is_bleed".into()],
            ..StatusDef::default()
        },
        StatusDef {
            id: "burn".into(),
            duration: 2,
            ..StatusDef::default()
        },
        StatusDef {
            id: "blind".into(),
            duration: 1,
            impact: map([(stat_keys::ANTI_DODGE, -0.3)]),
            ..StatusDef::default()
        },
        StatusDef {
            id: "stone_skin".into(),
            duration: 3,
            impact: map([
                (stat_keys::RESIST_PHYSICAL, 0.2),
                (stat_keys::DODGE_CHANCE, -0.1),
            ]),
            ..StatusDef::default()
        },
    ]
}

fn map<const N: usize>(entries: [(&str, f64); N]) -> BTreeMap<String, f64> {
    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}
