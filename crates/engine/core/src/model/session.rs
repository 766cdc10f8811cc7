//! Session-level metadata and assembly payloads.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::{ActorId, ActorSnapshot, TargetsMap, TeamId};

/// Battle flavor; drives assembly rules and reward scaling.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BattleType {
    #[default]
    Standard,
    Shadow,
    PveTutorial,
}

/// Whether an actor is driven by a human or by the AI decision module.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActorRole {
    Player,
    Ai,
}

/// Per-actor reward written into session meta at finalize.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Reward {
    pub xp: i64,
    pub gold: i64,
    #[serde(default)]
    pub items: Vec<String>,
}

/// One battle's meta document.
///
/// Invariants:
/// - `active == true` implies `winner.is_none()`
/// - the union of `teams` values equals `actors_info` keys
/// - every id in `dead_actors` appears in exactly one team
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionMeta {
    pub active: bool,
    pub step_counter: u64,
    pub start_time: f64,
    pub last_activity_at: f64,
    #[serde(default)]
    pub battle_type: BattleType,
    pub teams: BTreeMap<TeamId, Vec<ActorId>>,
    /// Keys are stringified actor ids to match the store's hash encoding.
    pub actors_info: BTreeMap<String, ActorRole>,
    #[serde(default)]
    pub dead_actors: BTreeSet<ActorId>,
    pub alive_counts: BTreeMap<TeamId, u32>,
    #[serde(default)]
    pub winner: Option<TeamId>,
    #[serde(default)]
    pub rewards: BTreeMap<String, Reward>,
}

impl SessionMeta {
    /// All actor ids across every team, in team order.
    pub fn all_actor_ids(&self) -> Vec<ActorId> {
        self.teams.values().flatten().copied().collect()
    }

    /// Team an actor belongs to, if any.
    pub fn team_of(&self, actor_id: ActorId) -> Option<&TeamId> {
        self.teams
            .iter()
            .find(|(_, members)| members.contains(&actor_id))
            .map(|(team, _)| team)
    }

    /// Role recorded for an actor.
    pub fn role_of(&self, actor_id: ActorId) -> Option<ActorRole> {
        self.actors_info.get(&actor_id.to_string()).copied()
    }

    /// Teams that still have at least one living member.
    pub fn teams_alive(&self) -> Vec<&TeamId> {
        self.alive_counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(team, _)| team)
            .collect()
    }
}

/// Everything the combat manager writes when a session is created.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionData {
    pub meta: SessionMeta,
    pub actors: BTreeMap<ActorId, ActorSnapshot>,
    pub targets: TargetsMap,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta_with_teams() -> SessionMeta {
        let mut teams = BTreeMap::new();
        teams.insert("blue".to_string(), vec![1]);
        teams.insert("red".to_string(), vec![-10, -11]);
        let mut actors_info = BTreeMap::new();
        actors_info.insert("1".to_string(), ActorRole::Player);
        actors_info.insert("-10".to_string(), ActorRole::Ai);
        actors_info.insert("-11".to_string(), ActorRole::Ai);
        let mut alive_counts = BTreeMap::new();
        alive_counts.insert("blue".to_string(), 1);
        alive_counts.insert("red".to_string(), 2);
        SessionMeta {
            active: true,
            step_counter: 0,
            start_time: 0.0,
            last_activity_at: 0.0,
            battle_type: BattleType::Standard,
            teams,
            actors_info,
            dead_actors: BTreeSet::new(),
            alive_counts,
            winner: None,
            rewards: BTreeMap::new(),
        }
    }

    #[test]
    fn team_lookup_covers_negative_ids() {
        let meta = meta_with_teams();
        assert_eq!(meta.team_of(-11).map(String::as_str), Some("red"));
        assert_eq!(meta.team_of(1).map(String::as_str), Some("blue"));
        assert_eq!(meta.team_of(99), None);
    }

    #[test]
    fn meta_round_trips_through_json() {
        let meta = meta_with_teams();
        let json = serde_json::to_string(&meta).unwrap();
        let back: SessionMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back.all_actor_ids(), meta.all_actor_ids());
        assert_eq!(back.role_of(-10), Some(ActorRole::Ai));
    }
}
