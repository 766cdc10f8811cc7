//! Catalog types for abilities, feints, statuses, and belt items.
//!
//! The structs here define the shape of content; the populated registries
//! live in `rbc-content` and are immutable after construction. The pipeline
//! receives a [`CatalogIndex`] by reference and never mutates it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::model::TokenKind;

/// Resource expenditure checked and paid during pre-calc.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AbilityCost {
    #[serde(default)]
    pub en: i64,
    #[serde(default)]
    pub hp: i64,
    #[serde(default)]
    pub tokens: BTreeMap<TokenKind, i64>,
}

impl AbilityCost {
    pub fn is_free(&self) -> bool {
        self.en == 0 && self.hp == 0 && self.tokens.is_empty()
    }
}

/// Predicate gating a post-calc pipeline step.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepTrigger {
    Always,
    /// Final damage was positive.
    OnHit,
    OnCrit,
    OnBlock,
    OnDodge,
    OnParry,
}

/// What a post-calc step does once its trigger holds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StepAction {
    /// True damage to the target, bypassing the resolver.
    DealDamage { amount: i64 },
    /// Heal the source, clamped at max HP.
    Heal { amount: i64 },
    /// Attach a status overlay to the target.
    ApplyStatus {
        status_id: String,
        /// Exchanges the overlay stays live.
        duration: u64,
        #[serde(default)]
        power: f64,
    },
}

/// One declared post-calc step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PipelineStep {
    pub trigger: StepTrigger,
    #[serde(flatten)]
    pub action: StepAction,
}

/// Status definition referenced by `apply_status` steps and weapon triggers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StatusDef {
    pub id: String,
    /// Default duration in exchanges when the applier gives none.
    #[serde(default)]
    pub duration: u64,
    /// Flat stat overlays while active.
    #[serde(default)]
    pub impact: BTreeMap<String, f64>,
    /// Payload flags ("is_stun", "is_sleep", "is_bleed").
    #[serde(default)]
    pub flags: Vec<String>,
}

/// Full ability configuration resolved during pre-calc.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AbilityConfig {
    pub id: String,
    #[serde(default)]
    pub cost: AbilityCost,
    /// Temp overlays written into the caster's raw model for this battle.
    #[serde(default)]
    pub raw_mutations: BTreeMap<String, f64>,
    /// Flag paths toggled on the interaction context
    /// ("disable_attack", "run_calculator").
    #[serde(default)]
    pub pipeline_mutations: BTreeMap<String, bool>,
    /// Named flags activated for the resolver and post-calc.
    #[serde(default)]
    pub triggers: Vec<String>,
    /// Fixed damage replacing the damage roll entirely.
    #[serde(default)]
    pub override_damage: Option<i64>,
    /// Post-calc steps evaluated after resolution.
    #[serde(default)]
    pub pipeline: Vec<PipelineStep>,
    /// Cap on resolved targets for multi-target instants.
    #[serde(default)]
    pub target_count: Option<usize>,
}

/// Feint configuration: a tactical-token expenditure that tilts one
/// exchange. Modeled as a cost plus the same mutation surfaces abilities
/// have.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FeintConfig {
    pub id: String,
    /// Tactical tokens spent, by kind.
    #[serde(default)]
    pub token_cost: BTreeMap<TokenKind, i64>,
    #[serde(default)]
    pub raw_mutations: BTreeMap<String, f64>,
    #[serde(default)]
    pub triggers: Vec<String>,
}

/// Belt item base: consumable behavior expressed as post-calc steps.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ItemBase {
    pub id: String,
    #[serde(default)]
    pub pipeline: Vec<PipelineStep>,
    #[serde(default)]
    pub target_count: Option<usize>,
}

/// Immutable lookup over every catalog, shared by reference.
#[derive(Clone, Debug, Default)]
pub struct CatalogIndex {
    abilities: BTreeMap<String, AbilityConfig>,
    feints: BTreeMap<String, FeintConfig>,
    items: BTreeMap<String, ItemBase>,
    statuses: BTreeMap<String, StatusDef>,
}

impl CatalogIndex {
    pub fn new(
        abilities: impl IntoIterator<Item = AbilityConfig>,
        feints: impl IntoIterator<Item = FeintConfig>,
        items: impl IntoIterator<Item = ItemBase>,
        statuses: impl IntoIterator<Item = StatusDef>,
    ) -> Self {
        Self {
            abilities: abilities.into_iter().map(|a| (a.id.clone(), a)).collect(),
            feints: feints.into_iter().map(|f| (f.id.clone(), f)).collect(),
            items: items.into_iter().map(|i| (i.id.clone(), i)).collect(),
            statuses: statuses.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }

    pub fn ability(&self, id: &str) -> Option<&AbilityConfig> {
        self.abilities.get(id)
    }

    pub fn feint(&self, id: &str) -> Option<&FeintConfig> {
        self.feints.get(id)
    }

    pub fn item(&self, id: &str) -> Option<&ItemBase> {
        self.items.get(id)
    }

    pub fn status(&self, id: &str) -> Option<&StatusDef> {
        self.statuses.get(id)
    }
}
