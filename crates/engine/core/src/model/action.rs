//! Resolved actions pending execution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use super::{Move, Strategy};

/// Discriminator mirroring the primary move's strategy.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionType {
    Exchange,
    Item,
    Instant,
}

impl From<Strategy> for ActionType {
    fn from(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Exchange => ActionType::Exchange,
            Strategy::Item => ActionType::Item,
            Strategy::Instant => ActionType::Instant,
        }
    }
}

/// One entry in the per-session `q:actions` queue.
///
/// `partner_move` is set only for matched exchanges; `is_forced` marks
/// one-sided resolutions born from a timeout.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Action {
    pub action_type: ActionType,
    pub r#move: Move,
    #[serde(default)]
    pub partner_move: Option<Move>,
    #[serde(default)]
    pub is_forced: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Action {
    /// Matched reciprocal exchange.
    pub fn paired(a: Move, b: Move) -> Self {
        Self {
            action_type: ActionType::Exchange,
            r#move: a,
            partner_move: Some(b),
            is_forced: false,
            extra: Map::new(),
        }
    }

    /// One-sided resolution after a deadline elapsed.
    pub fn forced(mv: Move) -> Self {
        Self {
            action_type: ActionType::Exchange,
            r#move: mv,
            partner_move: None,
            is_forced: true,
            extra: Map::new(),
        }
    }

    /// Item or instant harvest.
    pub fn one_sided(mv: Move) -> Self {
        let action_type = ActionType::from(mv.strategy());
        Self {
            action_type,
            r#move: mv,
            partner_move: None,
            is_forced: false,
            extra: Map::new(),
        }
    }
}
