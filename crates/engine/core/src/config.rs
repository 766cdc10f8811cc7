//! Combat balance parameters.
//!
//! Every cap and threshold the resolver consults lives here so the runtime
//! can tune battles without touching resolver code. Values mirror the live
//! balance sheet; tests construct custom tunings for edge cases.

use serde::{Deserialize, Serialize};

/// Tunable balance parameters consumed by the combat pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CombatTuning {
    /// Hard cap on effective crit chance after skill bonuses.
    pub crit_cap: f64,
    /// Hard cap on effective dodge chance.
    pub dodge_cap: f64,
    /// Hard cap on parry chance.
    pub parry_cap: f64,
    /// Hard cap on passive shield block chance.
    pub block_cap: f64,
    /// Hard cap on physical resistance.
    pub resist_cap: f64,
    /// Maximum counter tokens an actor can hold.
    pub counter_token_cap: i64,
    /// Minimum damage after flat reduction.
    pub damage_floor: i64,
    /// Chance that a dodge also grants a counter token.
    pub counter_on_dodge_chance: f64,
    /// Base probability scale for the dual-wield chain event.
    pub dual_chain_scale: f64,
}

impl Default for CombatTuning {
    fn default() -> Self {
        Self {
            crit_cap: 0.5,
            dodge_cap: 0.5,
            parry_cap: 0.3,
            block_cap: 0.4,
            resist_cap: 0.75,
            counter_token_cap: 3,
            damage_floor: 1,
            counter_on_dodge_chance: 0.5,
            dual_chain_scale: 0.01,
        }
    }
}

/// Deadline extension granted per afk penalty level, in seconds.
///
/// Level 0 is a fresh participant; repeat offenders get shorter windows.
pub const AFK_TIMEOUT_TABLE: [u64; 4] = [60, 50, 40, 30];

/// Floor applied when the penalty level runs past the table.
pub const AFK_TIMEOUT_FLOOR: u64 = 20;

/// Deadline for an intent targeting an actor at the given penalty level.
pub fn afk_timeout(penalty_level: u8) -> u64 {
    AFK_TIMEOUT_TABLE
        .get(penalty_level as usize)
        .copied()
        .unwrap_or(AFK_TIMEOUT_FLOOR)
        .max(AFK_TIMEOUT_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn afk_timeout_follows_table_then_floors() {
        assert_eq!(afk_timeout(0), 60);
        assert_eq!(afk_timeout(1), 50);
        assert_eq!(afk_timeout(3), 30);
        assert_eq!(afk_timeout(4), 20);
        assert_eq!(afk_timeout(200), 20);
    }
}
