//! Combat manager: sole owner of the session key schema.
//!
//! Every read and write of session state funnels through here — pipelined
//! batches for bulk loads and commits, atomic scripts for the operations
//! that must not interleave (exchange registration, intent transfer, the
//! lock family). Documents stay raw [`Value`]s at this layer; the data
//! service owns the typed shapes.

pub mod keys;
mod scripts;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Value, json};

use rbc_core::ActorId;

use crate::store::{KvStore, Op, Reply, StoreResult};

pub use scripts::{BUSY_PENDING_TTL_SECS, WORKER_LOCK_TTL_SECS};

/// Default retention for finished-session history keys.
pub const DEFAULT_HISTORY_TTL_SECS: u64 = 86_400;

/// Raw per-actor documents written at session creation.
#[derive(Clone, Debug)]
pub struct ActorDocs {
    pub actor_id: ActorId,
    pub state_fields: HashMap<String, String>,
    pub raw: Value,
    pub loadout: Value,
    pub meta: Value,
    pub active_abilities: Value,
    pub xp: Value,
}

/// Raw session bundle for `create_session_batch`.
#[derive(Clone, Debug)]
pub struct SessionDocs {
    pub meta_fields: HashMap<String, String>,
    pub actors: Vec<ActorDocs>,
    pub targets: Value,
}

/// Per-actor documents mutated by a commit.
#[derive(Clone, Debug)]
pub struct ActorUpdate {
    pub actor_id: ActorId,
    pub state_fields: HashMap<String, String>,
    pub active_abilities: Value,
    pub xp: Value,
}

/// One intent to remove during the atomic transfer.
#[derive(Clone, Debug)]
pub struct DeleteSpec {
    pub char_id: ActorId,
    pub strategy: String,
    pub move_id: String,
}

/// Raw replies from the heavyweight context load, in actor order.
#[derive(Clone, Debug)]
pub struct ContextDocs {
    pub meta_fields: HashMap<String, String>,
    pub actors: Vec<ActorContextDocs>,
    pub targets: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct ActorContextDocs {
    pub actor_id: ActorId,
    pub state_fields: HashMap<String, String>,
    pub raw: Option<Value>,
    pub loadout: Option<Value>,
    pub meta: Option<Value>,
    pub active_abilities: Option<Value>,
    pub xp: Option<Value>,
}

pub struct CombatManager {
    store: Arc<dyn KvStore>,
}

impl CombatManager {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Session creation & teardown
    // ------------------------------------------------------------------

    /// Single pipelined write of meta, every per-actor family, empty
    /// moves buckets, and the targets map; every key gets the TTL.
    pub async fn create_session_batch(
        &self,
        session_id: &str,
        docs: SessionDocs,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        let mut ops = Vec::new();
        let mut expire_keys = Vec::new();

        ops.push(Op::SetHashFields(keys::meta(session_id), docs.meta_fields));
        expire_keys.push(keys::meta(session_id));

        for actor in docs.actors {
            let aid = actor.actor_id;
            ops.push(Op::SetHashFields(
                keys::actor_state(session_id, aid),
                actor.state_fields,
            ));
            ops.push(Op::JsonSet(keys::actor_raw(session_id, aid), "$".into(), actor.raw));
            ops.push(Op::JsonSet(
                keys::actor_loadout(session_id, aid),
                "$".into(),
                actor.loadout,
            ));
            ops.push(Op::JsonSet(keys::actor_meta(session_id, aid), "$".into(), actor.meta));
            ops.push(Op::JsonSet(
                keys::actor_abilities(session_id, aid),
                "$".into(),
                actor.active_abilities,
            ));
            ops.push(Op::JsonSet(keys::actor_xp(session_id, aid), "$".into(), actor.xp));
            ops.push(Op::JsonSet(
                keys::moves(session_id, aid),
                "$".into(),
                json!({"exchange": {}, "item": {}, "instant": {}}),
            ));
            for key in [
                keys::actor_state(session_id, aid),
                keys::actor_raw(session_id, aid),
                keys::actor_loadout(session_id, aid),
                keys::actor_meta(session_id, aid),
                keys::actor_abilities(session_id, aid),
                keys::actor_xp(session_id, aid),
                keys::moves(session_id, aid),
            ] {
                expire_keys.push(key);
            }
        }

        ops.push(Op::JsonSet(keys::targets(session_id), "$".into(), docs.targets));
        expire_keys.push(keys::targets(session_id));

        for key in expire_keys {
            ops.push(Op::Expire(key, ttl_secs));
        }
        self.store.exec(ops).await?;
        Ok(())
    }

    /// Hot-join: write the joiner's documents, then atomically patch meta
    /// and the targets map for mutual visibility.
    pub async fn add_actor(
        &self,
        session_id: &str,
        actor: ActorDocs,
        team: &str,
        role: &str,
        enemies: &[ActorId],
        ttl_secs: u64,
    ) -> StoreResult<()> {
        let aid = actor.actor_id;
        let mut ops = vec![
            Op::SetHashFields(keys::actor_state(session_id, aid), actor.state_fields),
            Op::JsonSet(keys::actor_raw(session_id, aid), "$".into(), actor.raw),
            Op::JsonSet(keys::actor_loadout(session_id, aid), "$".into(), actor.loadout),
            Op::JsonSet(keys::actor_meta(session_id, aid), "$".into(), actor.meta),
            Op::JsonSet(
                keys::actor_abilities(session_id, aid),
                "$".into(),
                actor.active_abilities,
            ),
            Op::JsonSet(keys::actor_xp(session_id, aid), "$".into(), actor.xp),
            Op::JsonSet(
                keys::moves(session_id, aid),
                "$".into(),
                json!({"exchange": {}, "item": {}, "instant": {}}),
            ),
        ];
        for key in [
            keys::actor_state(session_id, aid),
            keys::actor_raw(session_id, aid),
            keys::actor_loadout(session_id, aid),
            keys::actor_meta(session_id, aid),
            keys::actor_abilities(session_id, aid),
            keys::actor_xp(session_id, aid),
            keys::moves(session_id, aid),
        ] {
            ops.push(Op::Expire(key, ttl_secs));
        }
        self.store.exec(ops).await?;

        self.store
            .eval_script(
                scripts::HOT_JOIN_PATCH,
                &[keys::meta(session_id), keys::targets(session_id)],
                &[
                    json!(aid),
                    json!(team),
                    json!(role),
                    json!(enemies),
                ],
            )
            .await?;
        Ok(())
    }

    /// Drop working keys, keep history around for a while.
    pub async fn cleanup_rbc_session(
        &self,
        session_id: &str,
        history_ttl_secs: u64,
    ) -> StoreResult<()> {
        self.store
            .exec(vec![
                Op::Delete(vec![
                    keys::targets(session_id),
                    keys::actions_queue(session_id),
                    keys::busy(session_id),
                ]),
                Op::Expire(keys::meta(session_id), history_ttl_secs),
                Op::Expire(keys::logs(session_id), history_ttl_secs),
            ])
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_meta_fields(&self, session_id: &str) -> StoreResult<HashMap<String, String>> {
        self.store.get_hash(&keys::meta(session_id)).await
    }

    /// Batch-load the moves documents for a set of actors, one round trip.
    pub async fn get_moves_docs(
        &self,
        session_id: &str,
        actor_ids: &[ActorId],
    ) -> StoreResult<Vec<(ActorId, Option<Value>)>> {
        let ops = actor_ids
            .iter()
            .map(|aid| Op::JsonGet(keys::moves(session_id, *aid), "$".into()))
            .collect();
        let replies = self.store.exec(ops).await?;
        actor_ids
            .iter()
            .zip(replies)
            .map(|(aid, reply)| Ok((*aid, reply.into_value()?)))
            .collect()
    }

    pub async fn get_targets_doc(&self, session_id: &str) -> StoreResult<Option<Value>> {
        self.store.json_get(&keys::targets(session_id), "$").await
    }

    pub async fn queue_len(&self, session_id: &str) -> StoreResult<i64> {
        let replies = self
            .store
            .exec(vec![Op::ListLen(keys::actions_queue(session_id))])
            .await?;
        replies
            .into_iter()
            .next()
            .map(Reply::into_int)
            .unwrap_or(Ok(0))
    }

    pub async fn read_action_queue(
        &self,
        session_id: &str,
        batch_size: usize,
    ) -> StoreResult<Vec<Value>> {
        self.store
            .list_range(&keys::actions_queue(session_id), 0, batch_size as i64 - 1)
            .await
    }

    pub async fn read_logs(&self, session_id: &str, start: i64, stop: i64) -> StoreResult<Vec<Value>> {
        self.store.list_range(&keys::logs(session_id), start, stop).await
    }

    /// Full context load: meta, six documents per actor, targets map —
    /// one pipelined round trip.
    pub async fn load_context_docs(
        &self,
        session_id: &str,
        actor_ids: &[ActorId],
    ) -> StoreResult<ContextDocs> {
        let mut ops = vec![Op::GetHash(keys::meta(session_id))];
        for aid in actor_ids {
            ops.push(Op::GetHash(keys::actor_state(session_id, *aid)));
            ops.push(Op::JsonGet(keys::actor_raw(session_id, *aid), "$".into()));
            ops.push(Op::JsonGet(keys::actor_loadout(session_id, *aid), "$".into()));
            ops.push(Op::JsonGet(keys::actor_meta(session_id, *aid), "$".into()));
            ops.push(Op::JsonGet(keys::actor_abilities(session_id, *aid), "$".into()));
            ops.push(Op::JsonGet(keys::actor_xp(session_id, *aid), "$".into()));
        }
        ops.push(Op::JsonGet(keys::targets(session_id), "$".into()));

        let mut replies = self.store.exec(ops).await?.into_iter();
        let meta_fields = replies
            .next()
            .map(Reply::into_hash)
            .unwrap_or(Ok(HashMap::new()))?;

        let mut actors = Vec::with_capacity(actor_ids.len());
        for aid in actor_ids {
            let state_fields = replies
                .next()
                .map(Reply::into_hash)
                .unwrap_or(Ok(HashMap::new()))?;
            let raw = replies.next().map(Reply::into_value).unwrap_or(Ok(None))?;
            let loadout = replies.next().map(Reply::into_value).unwrap_or(Ok(None))?;
            let meta = replies.next().map(Reply::into_value).unwrap_or(Ok(None))?;
            let active_abilities = replies.next().map(Reply::into_value).unwrap_or(Ok(None))?;
            let xp = replies.next().map(Reply::into_value).unwrap_or(Ok(None))?;
            actors.push(ActorContextDocs {
                actor_id: *aid,
                state_fields,
                raw,
                loadout,
                meta,
                active_abilities,
                xp,
            });
        }
        let targets = replies.next().map(Reply::into_value).unwrap_or(Ok(None))?;

        Ok(ContextDocs {
            meta_fields,
            actors,
            targets,
        })
    }

    // ------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------

    /// Plain (non-exchange) intent write at `$.{strategy}.{move_id}`.
    pub async fn append_move(
        &self,
        session_id: &str,
        actor_id: ActorId,
        strategy: &str,
        move_id: &str,
        move_doc: Value,
    ) -> StoreResult<()> {
        self.store
            .json_set(
                &keys::moves(session_id, actor_id),
                &format!("$.{strategy}.{move_id}"),
                move_doc,
            )
            .await
    }

    /// Atomic: pop the target from the actor's list, insert the move.
    /// `false` means the target was already consumed (stale).
    pub async fn register_exchange_move_atomic(
        &self,
        session_id: &str,
        actor_id: ActorId,
        target_id: ActorId,
        move_id: &str,
        move_doc: Value,
    ) -> StoreResult<bool> {
        let result = self
            .store
            .eval_script(
                scripts::REGISTER_EXCHANGE_MOVE,
                &[
                    keys::targets(session_id),
                    keys::moves(session_id, actor_id),
                ],
                &[json!(actor_id), json!(target_id), json!(move_id), move_doc],
            )
            .await?;
        Ok(result.as_i64().unwrap_or(0) == 1)
    }

    /// Batched variant used by AI submissions; returns the count of
    /// registrations that found their target.
    pub async fn register_moves_batch_atomic(
        &self,
        session_id: &str,
        actor_id: ActorId,
        entries: Vec<Value>,
    ) -> StoreResult<i64> {
        let result = self
            .store
            .eval_script(
                scripts::REGISTER_MOVES_BATCH,
                &[
                    keys::targets(session_id),
                    keys::moves(session_id, actor_id),
                ],
                &[json!(actor_id), Value::Array(entries)],
            )
            .await?;
        Ok(result.as_i64().unwrap_or(0))
    }

    /// Atomic transfer: push actions to the queue, delete consumed
    /// intents, and return consumed exchange targets to their owners'
    /// lists. All three land together.
    pub async fn transfer_intents_to_actions(
        &self,
        session_id: &str,
        actions: Vec<Value>,
        deletes: Vec<DeleteSpec>,
        restores: Vec<(ActorId, ActorId)>,
    ) -> StoreResult<i64> {
        let deletes: Vec<Value> = deletes
            .into_iter()
            .map(|spec| {
                json!({
                    "key": keys::moves(session_id, spec.char_id),
                    "path": format!("$.{}.{}", spec.strategy, spec.move_id),
                })
            })
            .collect();
        let restores: Vec<Value> = restores
            .into_iter()
            .map(|(actor, target)| json!({"actor": actor, "target": target}))
            .collect();
        let result = self
            .store
            .eval_script(
                scripts::TRANSFER_INTENTS,
                &[
                    keys::actions_queue(session_id),
                    keys::targets(session_id),
                ],
                &[
                    Value::Array(actions),
                    Value::Array(deletes),
                    Value::Array(restores),
                ],
            )
            .await?;
        Ok(result.as_i64().unwrap_or(0))
    }

    /// Reset the submitter's afk penalty; the one state write outside the
    /// executor commit path.
    pub async fn reset_afk_penalty(&self, session_id: &str, actor_id: ActorId) -> StoreResult<()> {
        self.store
            .set_hash_fields(
                &keys::actor_state(session_id, actor_id),
                HashMap::from([("afk_penalty_level".to_string(), "0".to_string())]),
            )
            .await
    }

    // ------------------------------------------------------------------
    // Commit
    // ------------------------------------------------------------------

    /// The only write path from the executor: state, abilities, and xp
    /// per actor, appended logs, and the queue trim — one pipeline.
    pub async fn commit_battle_results(
        &self,
        session_id: &str,
        meta_fields: HashMap<String, String>,
        updates: Vec<ActorUpdate>,
        logs: Vec<Value>,
        processed_count: usize,
    ) -> StoreResult<()> {
        let mut ops = vec![Op::SetHashFields(keys::meta(session_id), meta_fields)];
        for update in updates {
            let aid = update.actor_id;
            ops.push(Op::SetHashFields(
                keys::actor_state(session_id, aid),
                update.state_fields,
            ));
            ops.push(Op::JsonSet(
                keys::actor_abilities(session_id, aid),
                "$".into(),
                update.active_abilities,
            ));
            ops.push(Op::JsonSet(keys::actor_xp(session_id, aid), "$".into(), update.xp));
        }
        if !logs.is_empty() {
            ops.push(Op::ListPushRight(keys::logs(session_id), logs));
        }
        ops.push(Op::ListTrim(
            keys::actions_queue(session_id),
            processed_count as i64,
            -1,
        ));
        self.store.exec(ops).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Locks
    // ------------------------------------------------------------------

    /// Soft reservation taken by whoever schedules collector work.
    pub async fn check_and_lock_busy_for_collector(&self, session_id: &str) -> StoreResult<bool> {
        let result = self
            .store
            .eval_script(scripts::CHECK_AND_LOCK_BUSY, &[keys::busy(session_id)], &[])
            .await?;
        Ok(result.as_i64().unwrap_or(0) == 1)
    }

    pub async fn acquire_worker_lock(
        &self,
        session_id: &str,
        worker_id: &str,
    ) -> StoreResult<bool> {
        let result = self
            .store
            .eval_script(
                scripts::ACQUIRE_WORKER_LOCK,
                &[keys::busy(session_id)],
                &[json!(worker_id)],
            )
            .await?;
        Ok(result.as_i64().unwrap_or(0) == 1)
    }

    pub async fn check_worker_lock(&self, session_id: &str, worker_id: &str) -> StoreResult<bool> {
        let result = self
            .store
            .eval_script(
                scripts::CHECK_WORKER_LOCK,
                &[keys::busy(session_id)],
                &[json!(worker_id)],
            )
            .await?;
        Ok(result.as_i64().unwrap_or(0) == 1)
    }

    pub async fn release_worker_lock_safe(
        &self,
        session_id: &str,
        worker_id: &str,
    ) -> StoreResult<()> {
        self.store
            .eval_script(
                scripts::RELEASE_WORKER_LOCK,
                &[keys::busy(session_id)],
                &[json!(worker_id)],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    use super::*;

    fn manager() -> (CombatManager, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::at(1000.0));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        (CombatManager::new(store), clock)
    }

    async fn seeded_targets(manager: &CombatManager) {
        manager
            .store()
            .json_set("combat:rbc:s1:targets", "$", json!({"1": [2], "2": [1]}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn exchange_registration_pops_target_once() {
        let (manager, _clock) = manager();
        seeded_targets(&manager).await;

        let first = manager
            .register_exchange_move_atomic("s1", 1, 2, "m1", json!({"move_id": "m1"}))
            .await
            .unwrap();
        assert!(first);

        // Same pair again: the target was consumed, so registration is
        // rejected without writing.
        let second = manager
            .register_exchange_move_atomic("s1", 1, 2, "m2", json!({"move_id": "m2"}))
            .await
            .unwrap();
        assert!(!second);

        let moves = manager
            .store()
            .json_get("combat:rbc:s1:moves:1", "$.exchange")
            .await
            .unwrap()
            .unwrap();
        assert!(moves.get("m1").is_some());
        assert!(moves.get("m2").is_none());
    }

    #[tokio::test]
    async fn transfer_pushes_and_deletes_together() {
        let (manager, _clock) = manager();
        seeded_targets(&manager).await;
        manager
            .register_exchange_move_atomic("s1", 1, 2, "m1", json!({"move_id": "m1"}))
            .await
            .unwrap();

        manager
            .transfer_intents_to_actions(
                "s1",
                vec![json!({"action_type": "exchange"})],
                vec![DeleteSpec {
                    char_id: 1,
                    strategy: "exchange".into(),
                    move_id: "m1".into(),
                }],
                vec![(1, 2)],
            )
            .await
            .unwrap();

        assert_eq!(manager.queue_len("s1").await.unwrap(), 1);
        let moves = manager
            .store()
            .json_get("combat:rbc:s1:moves:1", "$.exchange.m1")
            .await
            .unwrap();
        assert!(moves.is_none(), "consumed intent was deleted");

        // The consumed target came back, so the next round can be
        // declared against the same opponent.
        let targets = manager
            .store()
            .json_get("combat:rbc:s1:targets", "$.1")
            .await
            .unwrap();
        assert_eq!(targets, Some(json!([2])));
    }

    #[tokio::test]
    async fn worker_lock_mutual_exclusion() {
        let (manager, _clock) = manager();

        assert!(manager.acquire_worker_lock("s1", "w1").await.unwrap());
        assert!(!manager.acquire_worker_lock("s1", "w2").await.unwrap());
        assert!(manager.check_worker_lock("s1", "w1").await.unwrap());
        assert!(!manager.check_worker_lock("s1", "w2").await.unwrap());

        // Release by the wrong worker is a no-op.
        manager.release_worker_lock_safe("s1", "w2").await.unwrap();
        assert!(manager.check_worker_lock("s1", "w1").await.unwrap());

        manager.release_worker_lock_safe("s1", "w1").await.unwrap();
        assert!(manager.acquire_worker_lock("s1", "w2").await.unwrap());
    }

    #[tokio::test]
    async fn crashed_worker_lock_expires() {
        let (manager, clock) = manager();
        assert!(manager.acquire_worker_lock("s1", "w1").await.unwrap());
        clock.advance(WORKER_LOCK_TTL_SECS as f64 + 1.0);
        assert!(manager.acquire_worker_lock("s1", "w2").await.unwrap());
    }

    #[tokio::test]
    async fn pending_reservation_upgrades_to_worker_lock() {
        let (manager, _clock) = manager();
        assert!(manager.check_and_lock_busy_for_collector("s1").await.unwrap());
        assert!(!manager.check_and_lock_busy_for_collector("s1").await.unwrap());
        // "pending" may be claimed by a worker.
        assert!(manager.acquire_worker_lock("s1", "w1").await.unwrap());
    }
}
