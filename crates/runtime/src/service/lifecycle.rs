//! Session lifecycle: creation, hot-join, finalize.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use rbc_content::{CLEANER_ID_BASE, cleaner_snapshot};
use rbc_core::model::{
    ActorId, ActorMeta, ActorRole, ActorSnapshot, ActorState, BattleType, Loadout, Reward,
    SessionData, SessionMeta, TargetsMap, TeamId, WeaponLayout,
};
use rbc_core::stats::ensure_stats;
use rbc_core::stat_keys;

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::manager::CombatManager;
use crate::service::assembler::SetupTemplate;
use crate::service::data::{BattleContext, DataService, encode_fields};
use crate::store::KvStore;

/// Default retention of a running session's keys.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 7_200;

/// Team name the injected cleaner fights for.
pub const CLEANER_TEAM: &str = "chaos";

/// One roster slot: the assembled template key plus the durable id.
#[derive(Clone, Debug)]
pub struct MemberSpec {
    pub template_key: String,
    pub id: ActorId,
}

/// Roster for one team.
pub type TeamSpec = Vec<MemberSpec>;

#[derive(Clone, Debug)]
pub struct CreateBattleConfig {
    pub battle_type: BattleType,
    pub teams: BTreeMap<TeamId, TeamSpec>,
    pub session_ttl_secs: Option<u64>,
}

/// Outcome summary passed to finalize.
#[derive(Clone, Debug)]
pub struct SessionResults {
    pub winner: TeamId,
}

/// Durable-profile collaborator. The engine never talks to character
/// storage directly; everything goes through here.
#[async_trait]
pub trait AccountManager: Send + Sync {
    /// Point the character's `combat_session_id` at this session.
    async fn link_session(&self, char_id: ActorId, session_id: &str) -> Result<()>;

    async fn unlink_session(&self, char_id: ActorId) -> Result<()>;

    /// Write back battle-mutated durable fields (vitals, skill xp).
    async fn update_account_fields(
        &self,
        char_id: ActorId,
        fields: HashMap<String, Value>,
    ) -> Result<()>;
}

/// In-memory account collaborator for tests and local runs.
#[derive(Default)]
pub struct InMemoryAccounts {
    state: Mutex<HashMap<ActorId, HashMap<String, Value>>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&self, char_id: ActorId, field: &str) -> Option<Value> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.get(&char_id)?.get(field).cloned())
    }
}

#[async_trait]
impl AccountManager for InMemoryAccounts {
    async fn link_session(&self, char_id: ActorId, session_id: &str) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| EngineError::External("accounts lock poisoned".into()))?;
        state
            .entry(char_id)
            .or_default()
            .insert("combat_session_id".into(), json!(session_id));
        Ok(())
    }

    async fn unlink_session(&self, char_id: ActorId) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| EngineError::External("accounts lock poisoned".into()))?;
        if let Some(fields) = state.get_mut(&char_id) {
            fields.remove("combat_session_id");
        }
        Ok(())
    }

    async fn update_account_fields(
        &self,
        char_id: ActorId,
        fields: HashMap<String, Value>,
    ) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| EngineError::External("accounts lock poisoned".into()))?;
        state.entry(char_id).or_default().extend(fields);
        Ok(())
    }
}

pub struct LifecycleService {
    data: Arc<DataService>,
    manager: Arc<CombatManager>,
    store: Arc<dyn KvStore>,
    account: Arc<dyn AccountManager>,
    clock: Arc<dyn Clock>,
    session_ttl_secs: u64,
    history_ttl_secs: u64,
}

impl LifecycleService {
    pub fn new(
        data: Arc<DataService>,
        manager: Arc<CombatManager>,
        store: Arc<dyn KvStore>,
        account: Arc<dyn AccountManager>,
        clock: Arc<dyn Clock>,
        session_ttl_secs: u64,
        history_ttl_secs: u64,
    ) -> Self {
        Self {
            data,
            manager,
            store,
            account,
            clock,
            session_ttl_secs,
            history_ttl_secs,
        }
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a battle from assembled templates.
    ///
    /// The whole operation fails if any referenced template is missing;
    /// nothing is written in that case.
    pub async fn create_battle(
        &self,
        session_id: &str,
        config: &CreateBattleConfig,
    ) -> Result<SessionMeta> {
        let templates = self.load_templates(config).await?;
        let data = self.assemble_session_data(config, templates)?;
        let ttl = config.session_ttl_secs.unwrap_or(self.session_ttl_secs);
        self.data.create_session(session_id, &data, ttl).await?;

        // Link every human participant's durable profile.
        for (id, snapshot) in &data.actors {
            if !snapshot.meta.is_ai {
                self.account.link_session(*id, session_id).await?;
            }
        }

        info!(
            session_id,
            battle_type = %data.meta.battle_type,
            actors = data.actors.len(),
            "battle created"
        );
        Ok(data.meta)
    }

    /// Single batch get of every referenced temp key.
    async fn load_templates(
        &self,
        config: &CreateBattleConfig,
    ) -> Result<HashMap<String, SetupTemplate>> {
        let keys: Vec<String> = config
            .teams
            .values()
            .flatten()
            .map(|member| member.template_key.clone())
            .collect();
        let ops = keys
            .iter()
            .map(|key| crate::store::Op::JsonGet(key.clone(), "$".into()))
            .collect();
        let replies = self.store.exec(ops).await?;

        let mut templates = HashMap::new();
        for (key, reply) in keys.iter().zip(replies) {
            let value = reply.into_value()?;
            let member_id = config
                .teams
                .values()
                .flatten()
                .find(|m| m.template_key == *key)
                .map(|m| m.id)
                .unwrap_or_default();
            let Some(value) = value else {
                return Err(EngineError::TemplateMissing(member_id));
            };
            let template: SetupTemplate =
                serde_json::from_value(value).map_err(|source| EngineError::Corrupt {
                    key: key.clone(),
                    source,
                })?;
            templates.insert(key.clone(), template);
        }
        Ok(templates)
    }

    /// Pure in-memory composition of the session payload.
    fn assemble_session_data(
        &self,
        config: &CreateBattleConfig,
        templates: HashMap<String, SetupTemplate>,
    ) -> Result<SessionData> {
        let now = self.clock.now();
        let shadow = config.battle_type == BattleType::Shadow;

        let mut actors: BTreeMap<ActorId, ActorSnapshot> = BTreeMap::new();
        let mut teams: BTreeMap<TeamId, Vec<ActorId>> = BTreeMap::new();
        let mut actors_info = BTreeMap::new();
        let mut name_counts: HashMap<String, usize> = HashMap::new();

        for (team, members) in &config.teams {
            let roster = teams.entry(team.clone()).or_default();
            for member in members {
                let template = templates
                    .get(&member.template_key)
                    .ok_or(EngineError::TemplateMissing(member.id))?;

                // Shadow mode: red-side copies get negated ids, prefixed
                // names, and AI control; stats stay identical.
                let shadow_copy = shadow && team == "red";
                let final_id = if shadow_copy {
                    -member.id.abs()
                } else {
                    member.id
                };
                let mut name = if shadow_copy {
                    format!("Shadow {}", template.name)
                } else {
                    template.name.clone()
                };
                let seen = name_counts.entry(name.clone()).or_insert(0);
                *seen += 1;
                if *seen > 1 {
                    name = format!("{name} {seen}");
                }

                let is_ai = shadow_copy || template.kind != "player";
                let snapshot = snapshot_from_template(
                    final_id,
                    name,
                    team.clone(),
                    template,
                    is_ai,
                );
                actors_info.insert(
                    final_id.to_string(),
                    if is_ai { ActorRole::Ai } else { ActorRole::Player },
                );
                roster.push(final_id);
                actors.insert(final_id, snapshot);
            }
        }

        // Pairwise targets across opposing teams, shuffled.
        let mut targets = TargetsMap::new();
        {
            use rand::seq::SliceRandom;
            let mut rng = rand::thread_rng();
            for (team, roster) in &teams {
                for actor_id in roster {
                    let mut enemies: Vec<ActorId> = teams
                        .iter()
                        .filter(|(other, _)| *other != team)
                        .flat_map(|(_, ids)| ids.iter().copied())
                        .collect();
                    enemies.shuffle(&mut rng);
                    targets.insert(*actor_id, enemies);
                }
            }
        }

        let alive_counts = teams
            .iter()
            .map(|(team, roster)| (team.clone(), roster.len() as u32))
            .collect();

        let meta = SessionMeta {
            active: true,
            step_counter: 0,
            start_time: now,
            last_activity_at: now,
            battle_type: config.battle_type,
            teams,
            actors_info,
            dead_actors: Default::default(),
            alive_counts,
            winner: None,
            rewards: Default::default(),
        };

        Ok(SessionData {
            meta,
            actors,
            targets,
        })
    }

    // ------------------------------------------------------------------
    // Hot-join
    // ------------------------------------------------------------------

    /// Late-join a participant into a running session.
    pub async fn add_participant(
        &self,
        session_id: &str,
        char_id: ActorId,
        team: &str,
        template: &SetupTemplate,
        is_ai: bool,
    ) -> Result<ActorId> {
        let meta = self.data.get_battle_meta(session_id).await?;
        if !meta.active {
            return Err(EngineError::SessionInactive(session_id.to_string()));
        }

        let snapshot =
            snapshot_from_template(char_id, template.name.clone(), team.to_string(), template, is_ai);
        let enemies: Vec<ActorId> = meta
            .teams
            .iter()
            .filter(|(other, _)| other.as_str() != team)
            .flat_map(|(_, ids)| ids.iter().copied())
            .collect();

        let docs = crate::service::data::encode_actor_for_join(&snapshot)?;
        let role = if is_ai { "ai" } else { "player" };
        self.manager
            .add_actor(session_id, docs, team, role, &enemies, self.session_ttl_secs)
            .await?;

        if !is_ai {
            self.account.link_session(char_id, session_id).await?;
        }
        Ok(char_id)
    }

    /// Inject the cleaner into a stalled session. Idempotent: a second
    /// attempt on an already-cleaned session is a no-op.
    pub async fn spawn_cleaner(&self, session_id: &str) -> Result<bool> {
        let meta = self.data.get_battle_meta(session_id).await?;
        if !meta.active {
            return Ok(false);
        }
        if meta.actors_info.contains_key(&CLEANER_ID_BASE.to_string()) {
            debug!(session_id, "cleaner already present; skipping spawn");
            return Ok(false);
        }

        let snapshot = cleaner_snapshot(CLEANER_TEAM);
        let enemies: Vec<ActorId> = meta.all_actor_ids();
        let docs = crate::service::data::encode_actor_for_join(&snapshot)?;
        self.manager
            .add_actor(
                session_id,
                docs,
                CLEANER_TEAM,
                "ai",
                &enemies,
                self.session_ttl_secs,
            )
            .await?;
        info!(session_id, "cleaner injected into stalled session");
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Finalize
    // ------------------------------------------------------------------

    /// Write rewards and the winner, tear down working keys, extend
    /// history, and release every participant's durable link.
    pub async fn complete_session(
        &self,
        ctx: &BattleContext,
        results: &SessionResults,
    ) -> Result<()> {
        let mut meta = ctx.meta.clone();
        meta.active = false;
        meta.winner = Some(results.winner.clone());
        meta.rewards = compute_rewards(ctx, &results.winner);
        meta.last_activity_at = self.clock.now();

        self.manager
            .store()
            .set_hash_fields(
                &crate::manager::keys::meta(&ctx.session_id),
                encode_fields(&meta)?,
            )
            .await?;
        self.manager
            .cleanup_rbc_session(&ctx.session_id, self.history_ttl_secs)
            .await?;

        for (id, snapshot) in &ctx.actors {
            if snapshot.meta.is_ai {
                continue;
            }
            self.account.unlink_session(*id).await?;
            let mut fields: HashMap<String, Value> = HashMap::from([
                ("hp_current".to_string(), json!(snapshot.state.hp)),
                ("energy_current".to_string(), json!(snapshot.state.en)),
            ]);
            if !snapshot.xp_buffer.is_empty() {
                fields.insert("skill_xp".to_string(), json!(snapshot.xp_buffer));
            }
            self.account.update_account_fields(*id, fields).await?;
        }

        info!(
            session_id = %ctx.session_id,
            winner = %results.winner,
            "session finalized"
        );
        Ok(())
    }

    pub fn history_ttl_secs(&self) -> u64 {
        self.history_ttl_secs
    }
}

/// Build an in-battle snapshot from an assembled template. Vitals of `-1`
/// materialize at the computed maximum.
fn snapshot_from_template(
    id: ActorId,
    name: String,
    team: TeamId,
    template: &SetupTemplate,
    is_ai: bool,
) -> ActorSnapshot {
    let loadout = template.loadout.clone().unwrap_or_else(|| Loadout {
        layout: WeaponLayout::OneHand,
        slots: Default::default(),
        belt: vec![],
        known_abilities: vec![],
        tags: vec![],
        weapon_triggers: vec![],
        armor_type: None,
        has_shield: false,
        extra: Default::default(),
    });

    let kind = template.kind.clone();
    let mut snapshot = ActorSnapshot {
        meta: ActorMeta {
            id,
            name,
            team,
            kind,
            template_id: Some(id),
            is_ai,
            extra: Default::default(),
        },
        state: ActorState {
            hp: 0,
            max_hp: 0,
            en: 0,
            max_en: 0,
            tactics: 0.0,
            shield: 0,
            is_dead: false,
            afk_penalty_level: 0,
            exchange_count: 0,
            tokens: Default::default(),
            counters: Default::default(),
        },
        raw: template.math_model.clone(),
        loadout,
        active_abilities: vec![],
        xp_buffer: Default::default(),
        stats: None,
        dirty_stats: Default::default(),
    };

    ensure_stats(&mut snapshot, 0);
    let (max_hp, max_en) = match &snapshot.stats {
        Some(sheet) => (
            sheet.get(stat_keys::MAX_HP).max(1.0) as i64,
            sheet.get(stat_keys::MAX_EN).max(0.0) as i64,
        ),
        None => (1, 0),
    };
    snapshot.state.max_hp = max_hp;
    snapshot.state.max_en = max_en;
    snapshot.state.hp = materialize_vital(template.vitals.hp_current, max_hp);
    snapshot.state.en = materialize_vital(template.vitals.energy_current, max_en);
    snapshot
}

fn materialize_vital(current: i64, max: i64) -> i64 {
    if current < 0 { max } else { current.min(max) }
}

/// Rewards: winners flush their xp buffer and earn gold by battle type;
/// everyone else keeps the xp they earned.
fn compute_rewards(ctx: &BattleContext, winner: &TeamId) -> BTreeMap<String, Reward> {
    let gold_for = |battle_type: BattleType| match battle_type {
        BattleType::Standard => 100,
        BattleType::Shadow => 0,
        BattleType::PveTutorial => 50,
    };

    let mut rewards = BTreeMap::new();
    for (id, snapshot) in &ctx.actors {
        if snapshot.meta.kind == "cleaner" {
            continue;
        }
        let xp: i64 = snapshot.xp_buffer.values().sum();
        let won = &snapshot.meta.team == winner;
        rewards.insert(
            id.to_string(),
            Reward {
                xp: if won { xp.max(1) } else { xp },
                gold: if won { gold_for(ctx.meta.battle_type) } else { 0 },
                items: vec![],
            },
        );
    }
    rewards
}
