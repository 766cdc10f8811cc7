//! View service: stateless projection into client-facing DTOs.
//!
//! No store reads happen here; the caller supplies a loaded context and
//! log slice and gets back a dashboard.

use serde::{Deserialize, Serialize};

use rbc_core::model::{ActorId, ActorSnapshot, LogEntry, TokenKind, WeaponLayout};

use super::data::BattleContext;

/// Page size for the log panel, newest-last.
pub const LOG_PAGE_SIZE: usize = 20;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleStatus {
    Active,
    Waiting,
    Finished,
}

/// Full card for the hero and the current target.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FighterCard {
    pub id: ActorId,
    pub name: String,
    pub hp: i64,
    pub max_hp: i64,
    pub en: i64,
    pub max_en: i64,
    pub layout: WeaponLayout,
    pub tokens: Vec<(TokenKind, i64)>,
    pub active_ability_ids: Vec<String>,
}

/// Short card for allies and enemies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShortCard {
    pub id: ActorId,
    pub name: String,
    pub hp_percent: u32,
    pub is_dead: bool,
    pub is_target: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DashboardView {
    pub status: BattleStatus,
    pub hero: Option<FighterCard>,
    pub target: Option<FighterCard>,
    pub allies: Vec<ShortCard>,
    pub enemies: Vec<ShortCard>,
    pub logs: Vec<LogEntry>,
    pub log_page: usize,
    pub log_pages_total: usize,
}

pub struct ViewService;

impl ViewService {
    /// Project one participant's dashboard from a loaded context.
    pub fn build(
        char_id: ActorId,
        ctx: &BattleContext,
        logs: &[LogEntry],
        log_page: usize,
    ) -> DashboardView {
        let me = ctx.actors.get(&char_id);
        let my_team = me.map(|a| a.meta.team.clone());
        let target_id = ctx.targets.targets_of(char_id).first().copied();

        let status = if !ctx.meta.active || ctx.meta.winner.is_some() {
            BattleStatus::Finished
        } else if me.map(|a| !a.is_alive()).unwrap_or(true) {
            BattleStatus::Finished
        } else if target_id.is_none() {
            BattleStatus::Waiting
        } else {
            BattleStatus::Active
        };

        let hero = me.map(fighter_card);
        let target = target_id
            .and_then(|id| ctx.actors.get(&id))
            .map(fighter_card);

        let mut allies = Vec::new();
        let mut enemies = Vec::new();
        for (id, actor) in &ctx.actors {
            if *id == char_id {
                continue;
            }
            let card = short_card(actor, Some(*id) == target_id);
            if Some(&actor.meta.team) == my_team.as_ref() {
                allies.push(card);
            } else {
                enemies.push(card);
            }
        }
        sort_cards(&mut allies);
        sort_cards(&mut enemies);

        let (page_logs, log_pages_total) = paginate(logs, log_page);

        DashboardView {
            status,
            hero,
            target,
            allies,
            enemies,
            logs: page_logs,
            log_page,
            log_pages_total,
        }
    }
}

fn fighter_card(actor: &ActorSnapshot) -> FighterCard {
    FighterCard {
        id: actor.id(),
        name: actor.meta.name.clone(),
        hp: actor.state.hp,
        max_hp: actor.state.max_hp,
        en: actor.state.en,
        max_en: actor.state.max_en,
        layout: actor.loadout.layout,
        tokens: actor
            .state
            .tokens
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(kind, count)| (*kind, *count))
            .collect(),
        active_ability_ids: actor
            .active_abilities
            .iter()
            .map(|overlay| overlay.ability_id.clone())
            .collect(),
    }
}

fn short_card(actor: &ActorSnapshot, is_target: bool) -> ShortCard {
    let hp_percent = if actor.state.max_hp > 0 {
        ((actor.state.hp * 100) / actor.state.max_hp).clamp(0, 100) as u32
    } else {
        0
    };
    ShortCard {
        id: actor.id(),
        name: actor.meta.name.clone(),
        hp_percent,
        is_dead: actor.state.is_dead,
        is_target,
    }
}

/// Alive first, then hp descending.
fn sort_cards(cards: &mut [ShortCard]) {
    cards.sort_by(|a, b| {
        a.is_dead
            .cmp(&b.is_dead)
            .then(b.hp_percent.cmp(&a.hp_percent))
    });
}

/// Slice a page out of the full log, newest-last. Page 0 is the most
/// recent page.
fn paginate(logs: &[LogEntry], page: usize) -> (Vec<LogEntry>, usize) {
    let total = logs.len().div_ceil(LOG_PAGE_SIZE).max(1);
    let page = page.min(total - 1);
    // Page 0 holds the newest entries; walk back from the end.
    let end = logs.len().saturating_sub(page * LOG_PAGE_SIZE);
    let start = end.saturating_sub(LOG_PAGE_SIZE);
    (logs[start..end].to_vec(), total)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use rbc_core::model::{SessionMeta, TargetsMap};

    use super::*;

    fn actor(id: i64, team: &str, hp: i64) -> ActorSnapshot {
        let mut snapshot: ActorSnapshot = serde_json::from_value(serde_json::json!({
            "meta": {"id": id, "name": format!("actor-{id}"), "team": team, "kind": "player", "is_ai": false},
            "state": {"hp": hp, "max_hp": 100, "en": 50, "max_en": 50},
            "raw": {},
            "loadout": {"layout": "1h"},
        }))
        .unwrap();
        if hp <= 0 {
            snapshot.state.is_dead = true;
        }
        snapshot
    }

    fn context(actors: Vec<ActorSnapshot>, active: bool) -> BattleContext {
        let mut teams: BTreeMap<String, Vec<i64>> = BTreeMap::new();
        let mut map = BTreeMap::new();
        let mut targets = TargetsMap::new();
        for actor in actors {
            teams
                .entry(actor.meta.team.clone())
                .or_default()
                .push(actor.id());
            map.insert(actor.id(), actor);
        }
        for (team, roster) in &teams {
            for id in roster {
                let enemies: Vec<i64> = teams
                    .iter()
                    .filter(|(other, _)| *other != team)
                    .flat_map(|(_, ids)| ids.iter().copied())
                    .collect();
                targets.insert(*id, enemies);
            }
        }
        let alive_counts = teams
            .iter()
            .map(|(team, roster)| (team.clone(), roster.len() as u32))
            .collect();
        BattleContext {
            session_id: "s1".into(),
            meta: SessionMeta {
                active,
                step_counter: 0,
                start_time: 0.0,
                last_activity_at: 0.0,
                battle_type: Default::default(),
                teams,
                actors_info: Default::default(),
                dead_actors: Default::default(),
                alive_counts,
                winner: None,
                rewards: Default::default(),
            },
            actors: map,
            targets,
        }
    }

    #[test]
    fn status_reflects_battle_and_liveness() {
        let ctx = context(vec![actor(1, "blue", 100), actor(2, "red", 100)], true);
        let view = ViewService::build(1, &ctx, &[], 0);
        assert_eq!(view.status, BattleStatus::Active);
        assert_eq!(view.target.as_ref().map(|t| t.id), Some(2));

        let ctx = context(vec![actor(1, "blue", 0), actor(2, "red", 100)], true);
        let view = ViewService::build(1, &ctx, &[], 0);
        assert_eq!(view.status, BattleStatus::Finished);

        let ctx = context(vec![actor(1, "blue", 100), actor(2, "red", 100)], false);
        let view = ViewService::build(1, &ctx, &[], 0);
        assert_eq!(view.status, BattleStatus::Finished);
    }

    #[test]
    fn cards_sort_alive_first_then_hp_desc() {
        let ctx = context(
            vec![
                actor(1, "blue", 100),
                actor(2, "red", 10),
                actor(3, "red", 0),
                actor(4, "red", 90),
            ],
            true,
        );
        let view = ViewService::build(1, &ctx, &[], 0);
        let order: Vec<i64> = view.enemies.iter().map(|c| c.id).collect();
        assert_eq!(order, vec![4, 2, 3], "dead enemies sink to the bottom");
    }

    #[test]
    fn log_pagination_is_newest_last() {
        let logs: Vec<LogEntry> = (0..45)
            .map(|i| LogEntry::new(i as f64, i, "a", "b", vec![format!("line {i}")]))
            .collect();
        let (page0, total) = paginate(&logs, 0);
        assert_eq!(total, 3);
        assert_eq!(page0.len(), 20);
        assert_eq!(page0.last().unwrap().round_index, 44, "newest entry last");

        let (page2, _) = paginate(&logs, 2);
        assert_eq!(page2.len(), 5);
        assert_eq!(page2[0].round_index, 0);
    }
}
