//! Data service: typed shapes over the combat manager's raw documents.
//!
//! The single place that knows the on-wire layout. The collector uses the
//! lightweight loads; the executor uses the heavyweight context load and
//! the commit path.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use rbc_core::model::{
    Action, ActorId, ActorMeta, ActorSnapshot, ActorState, Loadout, LogEntry, Move, SessionData,
    SessionMeta, TargetsMap,
};

use crate::error::{EngineError, Result};
use crate::manager::{ActorDocs, ActorUpdate, CombatManager, DeleteSpec, SessionDocs, keys};

/// The per-actor intent buckets document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MovesDoc {
    #[serde(default)]
    pub exchange: BTreeMap<String, Move>,
    #[serde(default)]
    pub item: BTreeMap<String, Move>,
    #[serde(default)]
    pub instant: BTreeMap<String, Move>,
}

/// Fully loaded battle context consumed by the executor.
#[derive(Clone, Debug)]
pub struct BattleContext {
    pub session_id: String,
    pub meta: SessionMeta,
    pub actors: BTreeMap<ActorId, ActorSnapshot>,
    pub targets: TargetsMap,
}

impl BattleContext {
    pub fn actor(&self, id: ActorId) -> Result<&ActorSnapshot> {
        self.actors.get(&id).ok_or(EngineError::UnknownActor(id))
    }
}

pub struct DataService {
    manager: Arc<CombatManager>,
}

impl DataService {
    pub fn new(manager: Arc<CombatManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<CombatManager> {
        &self.manager
    }

    // ------------------------------------------------------------------
    // Lightweight loads (collector)
    // ------------------------------------------------------------------

    pub async fn get_battle_meta(&self, session_id: &str) -> Result<SessionMeta> {
        let fields = self.manager.get_meta_fields(session_id).await?;
        if fields.is_empty() {
            return Err(EngineError::SessionNotFound(session_id.to_string()));
        }
        decode_fields(&fields, &keys::meta(session_id))
    }

    pub async fn get_intent_moves(
        &self,
        session_id: &str,
        actor_ids: &[ActorId],
    ) -> Result<Vec<(ActorId, MovesDoc)>> {
        let docs = self.manager.get_moves_docs(session_id, actor_ids).await?;
        let mut out = Vec::with_capacity(docs.len());
        for (actor_id, doc) in docs {
            let parsed = match doc {
                Some(value) => serde_json::from_value(value).unwrap_or_else(|err| {
                    warn!(session_id, actor_id, %err, "corrupt moves document; skipping actor");
                    MovesDoc::default()
                }),
                None => MovesDoc::default(),
            };
            out.push((actor_id, parsed));
        }
        Ok(out)
    }

    pub async fn get_targets(&self, session_id: &str) -> Result<TargetsMap> {
        let doc = self.manager.get_targets_doc(session_id).await?;
        match doc {
            Some(value) => {
                serde_json::from_value(value).map_err(|source| EngineError::Corrupt {
                    key: keys::targets(session_id),
                    source,
                })
            }
            None => Ok(TargetsMap::new()),
        }
    }

    pub async fn check_intent_exists(
        &self,
        session_id: &str,
        actor_id: ActorId,
        strategy: &str,
        move_id: &str,
    ) -> Result<bool> {
        let value = self
            .manager
            .store()
            .json_get(
                &keys::moves(session_id, actor_id),
                &format!("$.{strategy}.{move_id}"),
            )
            .await?;
        Ok(value.is_some())
    }

    // ------------------------------------------------------------------
    // Heavyweight load (executor)
    // ------------------------------------------------------------------

    /// Two pipelined reads: meta first (for the roster), then every
    /// actor's six documents plus the targets map in one batch.
    pub async fn load_battle_context(&self, session_id: &str) -> Result<BattleContext> {
        let meta = self.get_battle_meta(session_id).await?;
        let actor_ids = meta.all_actor_ids();
        let docs = self
            .manager
            .load_context_docs(session_id, &actor_ids)
            .await?;

        let mut actors = BTreeMap::new();
        for actor_docs in docs.actors {
            let actor_id = actor_docs.actor_id;
            match decode_actor(session_id, actor_docs) {
                Ok(snapshot) => {
                    actors.insert(actor_id, snapshot);
                }
                Err(err) => {
                    // Shape drift on one actor must not take the session
                    // down; the actor sits out this tick.
                    warn!(session_id, actor_id, %err, "skipping corrupt actor snapshot");
                }
            }
        }
        let targets = match docs.targets {
            Some(value) => serde_json::from_value(value).unwrap_or_default(),
            None => TargetsMap::new(),
        };

        Ok(BattleContext {
            session_id: session_id.to_string(),
            meta,
            actors,
            targets,
        })
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub async fn create_session(
        &self,
        session_id: &str,
        data: &SessionData,
        ttl_secs: u64,
    ) -> Result<()> {
        let docs = SessionDocs {
            meta_fields: encode_fields(&data.meta)?,
            actors: data
                .actors
                .values()
                .map(encode_actor_docs)
                .collect::<Result<Vec<_>>>()?,
            targets: serde_json::to_value(&data.targets)
                .map_err(|e| EngineError::External(e.to_string()))?,
        };
        self.manager
            .create_session_batch(session_id, docs, ttl_secs)
            .await?;
        Ok(())
    }

    pub async fn push_actions_to_queue(&self, session_id: &str, actions: &[Action]) -> Result<()> {
        let values = actions
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| EngineError::External(e.to_string()))?;
        self.manager
            .store()
            .list_push_right(&keys::actions_queue(session_id), values)
            .await?;
        Ok(())
    }

    /// Atomic transfer of collected actions; consumed intents vanish in
    /// the same step.
    pub async fn transfer_actions(
        &self,
        session_id: &str,
        actions: &[Action],
        deletes: Vec<DeleteSpec>,
    ) -> Result<i64> {
        self.transfer_actions_with_restores(session_id, actions, deletes, vec![])
            .await
    }

    /// Transfer plus target restoration for consumed exchange intents.
    pub async fn transfer_actions_with_restores(
        &self,
        session_id: &str,
        actions: &[Action],
        deletes: Vec<DeleteSpec>,
        restores: Vec<(ActorId, ActorId)>,
    ) -> Result<i64> {
        let values = actions
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| EngineError::External(e.to_string()))?;
        Ok(self
            .manager
            .transfer_intents_to_actions(session_id, values, deletes, restores)
            .await?)
    }

    /// The executor's single commit: mutated state per actor, appended
    /// logs, queue trim.
    pub async fn commit_session(
        &self,
        ctx: &BattleContext,
        logs: &[LogEntry],
        processed_count: usize,
    ) -> Result<()> {
        let meta_fields = encode_fields(&ctx.meta)?;
        let updates = ctx
            .actors
            .values()
            .map(encode_actor_update)
            .collect::<Result<Vec<_>>>()?;
        let log_values = logs
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| EngineError::External(e.to_string()))?;
        self.manager
            .commit_battle_results(&ctx.session_id, meta_fields, updates, log_values, processed_count)
            .await?;
        Ok(())
    }

    /// Parse raw queue entries; corrupt entries are logged and dropped
    /// (they still count as processed so the queue drains).
    pub fn parse_actions(&self, session_id: &str, raw: Vec<Value>) -> Vec<Action> {
        raw.into_iter()
            .filter_map(|value| match serde_json::from_value::<Action>(value) {
                Ok(action) => Some(action),
                Err(err) => {
                    warn!(session_id, %err, "dropping corrupt action queue entry");
                    None
                }
            })
            .collect()
    }
}

// ----------------------------------------------------------------------
// Wire-shape helpers
// ----------------------------------------------------------------------

/// Encode a struct as a field map: one hash field per top-level key, each
/// value its JSON encoding.
pub fn encode_fields<T: Serialize>(data: &T) -> Result<HashMap<String, String>> {
    let value = serde_json::to_value(data).map_err(|e| EngineError::External(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(EngineError::External("expected object for hash encoding".into()));
    };
    Ok(map
        .into_iter()
        .map(|(field, value)| (field, value.to_string()))
        .collect())
}

/// Decode a field map written by [`encode_fields`].
pub fn decode_fields<T: for<'de> Deserialize<'de>>(
    fields: &HashMap<String, String>,
    key: &str,
) -> Result<T> {
    let mut map = serde_json::Map::new();
    for (field, raw) in fields {
        let value =
            serde_json::from_str(raw).map_err(|source| EngineError::Corrupt {
                key: key.to_string(),
                source,
            })?;
        map.insert(field.clone(), value);
    }
    serde_json::from_value(Value::Object(map)).map_err(|source| EngineError::Corrupt {
        key: key.to_string(),
        source,
    })
}

/// Raw document bundle for a hot-join write.
pub(crate) fn encode_actor_for_join(snapshot: &ActorSnapshot) -> Result<ActorDocs> {
    encode_actor_docs(snapshot)
}

fn encode_actor_docs(snapshot: &ActorSnapshot) -> Result<ActorDocs> {
    let to_value = |v: std::result::Result<Value, serde_json::Error>| {
        v.map_err(|e| EngineError::External(e.to_string()))
    };
    Ok(ActorDocs {
        actor_id: snapshot.id(),
        state_fields: encode_fields(&snapshot.state)?,
        raw: to_value(serde_json::to_value(&snapshot.raw))?,
        loadout: to_value(serde_json::to_value(&snapshot.loadout))?,
        meta: to_value(serde_json::to_value(&snapshot.meta))?,
        active_abilities: to_value(serde_json::to_value(&snapshot.active_abilities))?,
        xp: to_value(serde_json::to_value(&snapshot.xp_buffer))?,
    })
}

fn encode_actor_update(snapshot: &ActorSnapshot) -> Result<ActorUpdate> {
    Ok(ActorUpdate {
        actor_id: snapshot.id(),
        state_fields: encode_fields(&snapshot.state)?,
        active_abilities: serde_json::to_value(&snapshot.active_abilities)
            .map_err(|e| EngineError::External(e.to_string()))?,
        xp: serde_json::to_value(&snapshot.xp_buffer)
            .map_err(|e| EngineError::External(e.to_string()))?,
    })
}

fn decode_actor(
    session_id: &str,
    docs: crate::manager::ActorContextDocs,
) -> Result<ActorSnapshot> {
    let corrupt = |key: String, source: serde_json::Error| EngineError::Corrupt { key, source };
    let aid = docs.actor_id;

    let meta: ActorMeta = serde_json::from_value(
        docs.meta
            .ok_or_else(|| EngineError::UnknownActor(aid))?,
    )
    .map_err(|e| corrupt(keys::actor_meta(session_id, aid), e))?;
    let state: ActorState = decode_fields(&docs.state_fields, &keys::actor_state(session_id, aid))?;
    let raw = match docs.raw {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| corrupt(keys::actor_raw(session_id, aid), e))?,
        None => Default::default(),
    };
    let loadout: Loadout = serde_json::from_value(
        docs.loadout
            .ok_or_else(|| EngineError::UnknownActor(aid))?,
    )
    .map_err(|e| corrupt(keys::actor_loadout(session_id, aid), e))?;
    let active_abilities = match docs.active_abilities {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| corrupt(keys::actor_abilities(session_id, aid), e))?,
        None => vec![],
    };
    let xp_buffer = match docs.xp {
        Some(value) => serde_json::from_value(value)
            .map_err(|e| corrupt(keys::actor_xp(session_id, aid), e))?,
        None => Default::default(),
    };

    Ok(ActorSnapshot {
        meta,
        state,
        raw,
        loadout,
        active_abilities,
        xp_buffer,
        stats: None,
        dirty_stats: Default::default(),
    })
}

#[cfg(test)]
mod tests {
    use rbc_core::model::{ActorRole, BattleType};

    use super::*;

    fn sample_meta() -> SessionMeta {
        let mut teams = BTreeMap::new();
        teams.insert("blue".to_string(), vec![1i64]);
        teams.insert("red".to_string(), vec![2i64]);
        SessionMeta {
            active: true,
            step_counter: 3,
            start_time: 1000.0,
            last_activity_at: 1050.0,
            battle_type: BattleType::Standard,
            teams,
            actors_info: BTreeMap::from([
                ("1".to_string(), ActorRole::Player),
                ("2".to_string(), ActorRole::Ai),
            ]),
            dead_actors: Default::default(),
            alive_counts: BTreeMap::from([("blue".to_string(), 1), ("red".to_string(), 1)]),
            winner: None,
            rewards: Default::default(),
        }
    }

    #[test]
    fn meta_round_trips_through_hash_fields() {
        let meta = sample_meta();
        let fields = encode_fields(&meta).unwrap();
        assert_eq!(fields["active"], "true");
        assert_eq!(fields["step_counter"], "3");

        let back: SessionMeta = decode_fields(&fields, "combat:rbc:test:meta").unwrap();
        assert_eq!(back.step_counter, 3);
        assert_eq!(back.teams["red"], vec![2]);
        assert_eq!(back.role_of(2), Some(ActorRole::Ai));
    }

    #[test]
    fn corrupt_field_reports_key() {
        let mut fields = encode_fields(&sample_meta()).unwrap();
        fields.insert("teams".to_string(), "{not json".to_string());
        let err = decode_fields::<SessionMeta>(&fields, "combat:rbc:test:meta").unwrap_err();
        assert!(matches!(err, EngineError::Corrupt { key, .. } if key.contains("meta")));
    }
}
