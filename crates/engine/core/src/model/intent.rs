//! Intents ("moves"): an actor's declared action awaiting resolution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{Display, EnumString};

use super::{ActorId, Zone};

/// Intent strategy; doubles as the bucket name under `moves:{aid}`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Strategy {
    Exchange,
    Item,
    Instant,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Exchange, Strategy::Item, Strategy::Instant];
}

/// Target selector for one-sided strategies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpec {
    /// Literal actor id.
    Actor(ActorId),
    /// The string "self" or a named multi-target group ("all_enemies").
    Named(String),
}

impl TargetSpec {
    pub fn is_self(&self) -> bool {
        matches!(self, TargetSpec::Named(name) if name == "self")
    }
}

/// Reciprocal attack declaration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExchangePayload {
    pub target_id: ActorId,
    pub attack_zones: Vec<Zone>,
    pub block_zones: Vec<Zone>,
    #[serde(default)]
    pub ability_key: Option<String>,
    #[serde(default)]
    pub feint_key: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Belt item usage.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemPayload {
    pub item_id: String,
    pub target: TargetSpec,
    /// Resolved by the collector before the action is enqueued.
    #[serde(default)]
    pub targets: Vec<ActorId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Instant ability cast (no reciprocal partner).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstantPayload {
    pub ability_key: String,
    pub target: TargetSpec,
    #[serde(default)]
    pub targets: Vec<ActorId>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Strategy-discriminated payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum MovePayload {
    Exchange(ExchangePayload),
    Item(ItemPayload),
    Instant(InstantPayload),
}

impl MovePayload {
    pub fn strategy(&self) -> Strategy {
        match self {
            MovePayload::Exchange(_) => Strategy::Exchange,
            MovePayload::Item(_) => Strategy::Item,
            MovePayload::Instant(_) => Strategy::Instant,
        }
    }
}

/// A stored intent. Lives under `moves:{char_id}.{strategy}.{move_id}`
/// until matched, force-attacked, or cleared at session end.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Move {
    pub move_id: String,
    pub char_id: ActorId,
    pub created_at: f64,
    pub deadline: f64,
    #[serde(flatten)]
    pub payload: MovePayload,
}

impl Move {
    pub fn strategy(&self) -> Strategy {
        self.payload.strategy()
    }

    /// Exchange payload accessor; `None` for item/instant moves.
    pub fn as_exchange(&self) -> Option<&ExchangePayload> {
        match &self.payload {
            MovePayload::Exchange(payload) => Some(payload),
            _ => None,
        }
    }

    /// Whether the deadline elapsed at the given wall-clock time.
    pub fn is_expired(&self, now: f64) -> bool {
        self.deadline <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_move_round_trips_with_unknown_fields() {
        let json = r#"{
            "move_id": "m1",
            "char_id": 1,
            "created_at": 10.0,
            "deadline": 70.0,
            "strategy": "exchange",
            "target_id": 2,
            "attack_zones": ["head"],
            "block_zones": ["head", "chest"],
            "client_hint": "from-a-newer-frontend"
        }"#;
        let mv: Move = serde_json::from_str(json).unwrap();
        assert_eq!(mv.strategy(), Strategy::Exchange);
        let exchange = mv.as_exchange().unwrap();
        assert_eq!(exchange.target_id, 2);
        assert_eq!(exchange.extra["client_hint"], "from-a-newer-frontend");

        let back = serde_json::to_value(&mv).unwrap();
        assert_eq!(back["client_hint"], "from-a-newer-frontend");
    }

    #[test]
    fn target_spec_parses_literal_and_named() {
        let spec: TargetSpec = serde_json::from_str("\"self\"").unwrap();
        assert!(spec.is_self());
        let spec: TargetSpec = serde_json::from_str("-7").unwrap();
        assert_eq!(spec, TargetSpec::Actor(-7));
    }
}
