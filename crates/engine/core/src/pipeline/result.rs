//! Pipeline output types.

use serde::{Deserialize, Serialize};

use crate::model::{ActiveAbility, ActorId, LogEntry, TokenKind, Zone};

/// Highest-precedence event observed while resolving one direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackOutcome {
    Hit,
    Crit,
    Parried,
    Dodged,
    Blocked,
    /// Crit landed through a block at reduced power.
    CritBlocked,
    /// Attack never rolled (control effect, disabled, no target).
    Skipped,
}

impl AttackOutcome {
    /// Whether any damage could have landed.
    pub fn connected(self) -> bool {
        matches!(self, AttackOutcome::Hit | AttackOutcome::Crit | AttackOutcome::CritBlocked)
    }
}

/// Why a direction aborted before the resolver ran.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Source under a stun/sleep overlay.
    Controlled,
    AttackerDead,
    TargetDead,
    /// External interference disabled the attack.
    Disabled,
    CostUnpayable,
}

/// Post-calc effect staged for the apply phase.
#[derive(Clone, Debug)]
pub enum PostEffect {
    /// True damage to the target.
    DealDamage { amount: i64 },
    /// Heal the source, clamped at max HP.
    HealSource { amount: i64 },
    /// Attach an overlay to the target.
    ApplyStatus { overlay: ActiveAbility },
}

/// A dual-wield follow-up queued for immediate execution after the
/// primary pair resolves.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainEvent {
    pub source_id: ActorId,
    pub target_id: ActorId,
}

/// Everything one resolved direction produced.
#[derive(Clone, Debug)]
pub struct InteractionResult {
    pub source_id: ActorId,
    pub target_id: Option<ActorId>,
    pub outcome: AttackOutcome,
    pub aborted: Option<AbortReason>,
    /// Final damage after mitigation; zero on avoidance.
    pub damage: i64,
    pub crit: bool,
    /// Reflected damage attached by a blocked hit.
    pub thorns: i64,
    pub lifesteal: i64,
    /// Tokens awarded to the source during resolution.
    pub source_tokens: Vec<TokenKind>,
    /// Tokens awarded to the target during resolution.
    pub target_tokens: Vec<TokenKind>,
    /// Staged post-calc effects, applied with the rest of the mutation.
    pub effects: Vec<PostEffect>,
    /// Dual-wield follow-ups to enqueue.
    pub chain: Vec<ChainEvent>,
    /// Visual bar built from attack/block zones and the observed event.
    pub zone_bar: String,
    /// Rendered log line for this direction.
    pub log: String,
    pub target_died: bool,
}

impl InteractionResult {
    /// A direction that never ran (dead attacker, control, disable).
    pub fn skipped(source_id: ActorId, target_id: Option<ActorId>, reason: AbortReason, log: String) -> Self {
        Self {
            source_id,
            target_id,
            outcome: AttackOutcome::Skipped,
            aborted: Some(reason),
            damage: 0,
            crit: false,
            thorns: 0,
            lifesteal: 0,
            source_tokens: vec![],
            target_tokens: vec![],
            effects: vec![],
            chain: vec![],
            zone_bar: String::new(),
            log,
            target_died: false,
        }
    }
}

/// Result of a full exchange action: the primary direction, the optional
/// reciprocal direction, and the rendered log entry.
#[derive(Debug)]
pub struct ExchangeReport {
    pub primary: InteractionResult,
    pub reciprocal: Option<InteractionResult>,
    pub log: LogEntry,
    pub chain: Vec<ChainEvent>,
}

/// Modifiers injected from outside the pair (interference from a
/// concurrent effect).
#[derive(Clone, Debug, Default)]
pub struct ExternalMods {
    pub disable_attack: bool,
}

/// Render the visual bar: attack zones, block zones, and the outcome.
pub(crate) fn zone_bar(attack: &[Zone], block: &[Zone], outcome: AttackOutcome) -> String {
    let attack: Vec<String> = attack.iter().map(Zone::to_string).collect();
    let block: Vec<String> = block.iter().map(Zone::to_string).collect();
    let mark = match outcome {
        AttackOutcome::Hit => "hit",
        AttackOutcome::Crit => "crit",
        AttackOutcome::Parried => "parry",
        AttackOutcome::Dodged => "dodge",
        AttackOutcome::Blocked => "block",
        AttackOutcome::CritBlocked => "crit-block",
        AttackOutcome::Skipped => "skip",
    };
    format!("[{}|{}|{}]", attack.join(","), block.join(","), mark)
}
