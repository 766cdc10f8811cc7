//! Collector: intent buckets → matched/harvested/forced actions.
//!
//! One tick scans every actor's buckets, pairs reciprocal exchanges
//! (FIFO by creation time), harvests one-sided item/instant intents,
//! force-attacks expired one-sided exchanges when a timeout signal says
//! so, and transfers everything to the action queue in one atomic step.
//! The collector never mutates actor snapshots or session meta.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use rbc_core::catalog::CatalogIndex;
use rbc_core::model::{Action, ActorId, ActorRole, Move, MovePayload, TargetSpec, TargetsMap};

use crate::clock::Clock;
use crate::error::Result;
use crate::manager::DeleteSpec;
use crate::service::data::DataService;

/// Scheduling signal attached to a collect task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectorSignal {
    pub kind: SignalKind,
    pub char_id: Option<ActorId>,
    /// A concrete move id, or `"batch"` to force everything unmatched
    /// from `char_id`.
    pub move_id: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalKind {
    Heartbeat,
    CheckTimeout,
}

impl CollectorSignal {
    pub fn heartbeat() -> Self {
        Self {
            kind: SignalKind::Heartbeat,
            char_id: None,
            move_id: None,
        }
    }

    pub fn check_timeout(char_id: Option<ActorId>, move_id: Option<String>) -> Self {
        Self {
            kind: SignalKind::CheckTimeout,
            char_id,
            move_id,
        }
    }
}

/// Request for the AI module to file intents for targets it has not
/// covered yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AiTurnRequest {
    pub session_id: String,
    pub bot_id: ActorId,
    pub missing_targets: Vec<ActorId>,
}

/// Result of one tick.
#[derive(Clone, Debug, Default)]
pub struct CollectOutcome {
    /// Recommended size for the next executor batch.
    pub batch_size: usize,
    /// Actions pushed to the queue this tick.
    pub enqueued: usize,
    pub ai_tasks: Vec<AiTurnRequest>,
}

pub struct Collector {
    data: Arc<DataService>,
    catalog: Arc<CatalogIndex>,
    clock: Arc<dyn Clock>,
}

impl Collector {
    pub fn new(data: Arc<DataService>, catalog: Arc<CatalogIndex>, clock: Arc<dyn Clock>) -> Self {
        Self {
            data,
            catalog,
            clock,
        }
    }

    pub async fn collect_actions(
        &self,
        session_id: &str,
        signal: Option<&CollectorSignal>,
    ) -> Result<CollectOutcome> {
        let meta = match self.data.get_battle_meta(session_id).await {
            Ok(meta) => meta,
            Err(crate::error::EngineError::SessionNotFound(_)) => {
                return Ok(CollectOutcome::default());
            }
            Err(err) => return Err(err),
        };
        if !meta.active {
            return Ok(CollectOutcome::default());
        }

        let actor_ids = meta.all_actor_ids();
        let moves = self.data.get_intent_moves(session_id, &actor_ids).await?;
        let targets = self.data.get_targets(session_id).await?;
        let now = self.clock.now();

        // AI check: a bot with uncovered targets gets a turn request and
        // sits out matchmaking this tick.
        let mut ai_tasks = Vec::new();
        let mut ai_blocked: BTreeSet<ActorId> = BTreeSet::new();
        for (actor_id, doc) in &moves {
            if meta.role_of(*actor_id) != Some(ActorRole::Ai) {
                continue;
            }
            let filed: BTreeSet<ActorId> = doc
                .exchange
                .values()
                .filter_map(Move::as_exchange)
                .map(|payload| payload.target_id)
                .collect();
            let missing: Vec<ActorId> = targets
                .targets_of(*actor_id)
                .iter()
                .filter(|target| !filed.contains(target))
                .copied()
                .collect();
            if !missing.is_empty() {
                ai_tasks.push(AiTurnRequest {
                    session_id: session_id.to_string(),
                    bot_id: *actor_id,
                    missing_targets: missing,
                });
                ai_blocked.insert(*actor_id);
            }
        }

        let mut actions: Vec<Action> = Vec::new();
        let mut deletes: Vec<DeleteSpec> = Vec::new();
        let mut restores: Vec<(ActorId, ActorId)> = Vec::new();

        // Instant/item harvest: every one-sided intent becomes an action
        // with its target list resolved.
        for (actor_id, doc) in &moves {
            for bucket in [&doc.item, &doc.instant] {
                for mv in bucket.values() {
                    let mut mv = mv.clone();
                    self.resolve_one_sided_targets(&mut mv, *actor_id, &targets);
                    deletes.push(DeleteSpec {
                        char_id: *actor_id,
                        strategy: mv.strategy().to_string(),
                        move_id: mv.move_id.clone(),
                    });
                    actions.push(Action::one_sided(mv));
                }
            }
        }

        // Exchange matchmaking: flatten, FIFO, pair reciprocal intents.
        let mut exchanges: Vec<Move> = moves
            .iter()
            .filter(|(actor_id, _)| !ai_blocked.contains(actor_id))
            .flat_map(|(_, doc)| doc.exchange.values().cloned())
            .collect();
        exchanges.sort_by(|a, b| {
            a.created_at
                .partial_cmp(&b.created_at)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut consumed = vec![false; exchanges.len()];
        for i in 0..exchanges.len() {
            if consumed[i] {
                continue;
            }
            let Some(a_target) = exchanges[i].as_exchange().map(|p| p.target_id) else {
                continue;
            };
            let a_char = exchanges[i].char_id;
            let partner = (i + 1..exchanges.len()).find(|&j| {
                !consumed[j]
                    && exchanges[j].char_id == a_target
                    && exchanges[j]
                        .as_exchange()
                        .map(|p| p.target_id == a_char)
                        .unwrap_or(false)
            });
            if let Some(j) = partner {
                consumed[i] = true;
                consumed[j] = true;
                let a = exchanges[i].clone();
                let b = exchanges[j].clone();
                for mv in [&a, &b] {
                    deletes.push(DeleteSpec {
                        char_id: mv.char_id,
                        strategy: "exchange".into(),
                        move_id: mv.move_id.clone(),
                    });
                    if let Some(payload) = mv.as_exchange() {
                        restores.push((mv.char_id, payload.target_id));
                    }
                }
                actions.push(Action::paired(a, b));
            }
        }

        // Force-attack pass, timeout signals only. Eligibility: deadline
        // elapsed, not matched above, and within the signal's focus.
        if let Some(signal) = signal {
            if signal.kind == SignalKind::CheckTimeout {
                for (i, mv) in exchanges.iter().enumerate() {
                    if consumed[i] || !mv.is_expired(now) {
                        continue;
                    }
                    let in_focus = match (&signal.move_id, signal.char_id) {
                        (Some(id), Some(char_id)) if id == "batch" => mv.char_id == char_id,
                        (Some(id), _) => mv.move_id == *id,
                        (None, Some(char_id)) => mv.char_id == char_id,
                        (None, None) => true,
                    };
                    if !in_focus {
                        continue;
                    }
                    consumed[i] = true;
                    deletes.push(DeleteSpec {
                        char_id: mv.char_id,
                        strategy: "exchange".into(),
                        move_id: mv.move_id.clone(),
                    });
                    if let Some(payload) = mv.as_exchange() {
                        restores.push((mv.char_id, payload.target_id));
                    }
                    actions.push(Action::forced(mv.clone()));
                }
            }
        }

        let enqueued = actions.len();
        if enqueued > 0 {
            self.data
                .transfer_actions_with_restores(session_id, &actions, deletes, restores)
                .await?;
            debug!(session_id, enqueued, "collector transferred actions");
        }

        // Smaller sessions get larger batches.
        let batch_size = (200 / actor_ids.len().max(1)).clamp(5, 100);

        Ok(CollectOutcome {
            batch_size,
            enqueued,
            ai_tasks,
        })
    }

    /// Resolve a one-sided intent's target selector into a literal list.
    fn resolve_one_sided_targets(&self, mv: &mut Move, actor_id: ActorId, targets: &TargetsMap) {
        let cap = match &mv.payload {
            MovePayload::Instant(payload) => self
                .catalog
                .ability(&payload.ability_key)
                .and_then(|config| config.target_count),
            MovePayload::Item(payload) => self
                .catalog
                .item(&payload.item_id)
                .and_then(|base| base.target_count),
            MovePayload::Exchange(_) => None,
        };

        let resolve = |spec: &TargetSpec| -> Vec<ActorId> {
            match spec {
                TargetSpec::Actor(id) => vec![*id],
                TargetSpec::Named(name) if name == "self" => vec![actor_id],
                TargetSpec::Named(_) => {
                    let mut list = targets.targets_of(actor_id).to_vec();
                    if let Some(cap) = cap {
                        list.truncate(cap);
                    }
                    list
                }
            }
        };

        match &mut mv.payload {
            MovePayload::Item(payload) => payload.targets = resolve(&payload.target.clone()),
            MovePayload::Instant(payload) => payload.targets = resolve(&payload.target.clone()),
            MovePayload::Exchange(_) => {}
        }
    }
}
