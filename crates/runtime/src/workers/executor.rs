//! Executor: drains the action queue under the session worker lock.
//!
//! One batch run loads the full context, routes each action through the
//! combat pipeline, verifies lock ownership (the zombie check), and
//! commits everything in a single pipelined write. Per-action failures
//! are logged and still counted as processed — losing one action beats
//! blocking the session.

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, warn};

use rbc_core::catalog::CatalogIndex;
use rbc_core::config::CombatTuning;
use rbc_core::model::{Action, ActionType, ActorId, LogEntry, Move, MovePayload, TeamId};
use rbc_core::pipeline::{ChainEvent, ExternalMods, Pipeline};

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::service::data::{BattleContext, DataService};
use crate::service::lifecycle::{LifecycleService, SessionResults};

/// Result of one batch run.
#[derive(Clone, Debug, Default)]
pub struct ExecuteOutcome {
    pub processed: usize,
    pub committed: bool,
    /// Set when the batch ended the battle.
    pub winner: Option<TeamId>,
    /// Whether the collector should be re-armed immediately.
    pub heartbeat: bool,
}

pub struct Executor {
    data: Arc<DataService>,
    lifecycle: Arc<LifecycleService>,
    catalog: Arc<CatalogIndex>,
    tuning: CombatTuning,
    clock: Arc<dyn Clock>,
    worker_id: String,
}

impl Executor {
    pub fn new(
        data: Arc<DataService>,
        lifecycle: Arc<LifecycleService>,
        catalog: Arc<CatalogIndex>,
        tuning: CombatTuning,
        clock: Arc<dyn Clock>,
        worker_id: String,
    ) -> Self {
        Self {
            data,
            lifecycle,
            catalog,
            tuning,
            clock,
            worker_id,
        }
    }

    pub async fn execute_batch(&self, session_id: &str, batch_size: usize) -> Result<ExecuteOutcome> {
        let manager = self.data.manager().clone();

        let mut ctx = match self.data.load_battle_context(session_id).await {
            Ok(ctx) => ctx,
            Err(EngineError::SessionNotFound(_)) => return Ok(ExecuteOutcome::default()),
            Err(err) => return Err(err),
        };
        if !ctx.meta.active {
            manager
                .release_worker_lock_safe(session_id, &self.worker_id)
                .await?;
            return Ok(ExecuteOutcome::default());
        }

        if !manager
            .acquire_worker_lock(session_id, &self.worker_id)
            .await?
        {
            debug!(session_id, "another worker holds the session lock");
            return Ok(ExecuteOutcome::default());
        }

        let raw = manager.read_action_queue(session_id, batch_size).await?;
        if raw.is_empty() {
            manager
                .release_worker_lock_safe(session_id, &self.worker_id)
                .await?;
            return Ok(ExecuteOutcome::default());
        }
        let processed = raw.len();
        let actions = self.data.parse_actions(session_id, raw);

        let mut rng = StdRng::from_entropy();
        let mut logs: Vec<LogEntry> = Vec::new();
        let mut exchange_pairs = 0u64;
        let now = self.clock.now();

        for action in actions {
            let step = ctx.meta.step_counter + exchange_pairs + 1;
            match self.route_action(&mut ctx, &action, step, now, &mut rng, &mut logs) {
                Ok(was_exchange) => {
                    if was_exchange {
                        exchange_pairs += 1;
                    }
                }
                Err(err) if err.is_recoverable_per_action() => {
                    // Count it as processed anyway so the queue drains.
                    warn!(session_id, %err, "action failed; dropping it");
                }
                Err(err) => return Err(err),
            }
        }

        // Zombie check: if the lock was reassigned, another worker is
        // authoritative — abort without writing anything.
        if !manager
            .check_worker_lock(session_id, &self.worker_id)
            .await?
        {
            warn!(session_id, "lock stolen mid-batch; aborting commit");
            return Err(EngineError::LockStolen(session_id.to_string()));
        }

        ctx.meta.step_counter += exchange_pairs;
        ctx.meta.last_activity_at = now;
        refresh_liveness(&mut ctx);

        self.data.commit_session(&ctx, &logs, processed).await?;

        // Termination: one team left standing ends the battle.
        let winner = sole_survivor(&ctx);
        if let Some(winner) = &winner {
            self.lifecycle
                .complete_session(
                    &ctx,
                    &SessionResults {
                        winner: winner.clone(),
                    },
                )
                .await?;
        }

        manager
            .release_worker_lock_safe(session_id, &self.worker_id)
            .await?;

        Ok(ExecuteOutcome {
            processed,
            committed: true,
            heartbeat: winner.is_none(),
            winner,
        })
    }

    /// Route one action through the pipeline. Returns whether it counted
    /// as an exchange pair.
    fn route_action(
        &self,
        ctx: &mut BattleContext,
        action: &Action,
        step: u64,
        now: f64,
        rng: &mut StdRng,
        logs: &mut Vec<LogEntry>,
    ) -> Result<bool> {
        let pipeline = Pipeline::new(&self.catalog, &self.tuning);
        match action.action_type {
            ActionType::Exchange => {
                let source_id = action.r#move.char_id;
                let target_id = action
                    .r#move
                    .as_exchange()
                    .map(|payload| payload.target_id)
                    .ok_or_else(|| {
                        EngineError::Validation("exchange action without target".into())
                    })?;
                let chain = self.run_exchange_pair(
                    ctx, &pipeline, action, source_id, target_id, step, now, rng, logs,
                )?;
                // Dual-wield follow-ups run right after the primary pair.
                for event in chain {
                    self.run_chain_event(ctx, &pipeline, action, &event, step, now, rng, logs)?;
                }
                Ok(true)
            }
            ActionType::Item | ActionType::Instant => {
                self.run_one_sided(ctx, &pipeline, action, step, now, rng, logs)?;
                Ok(false)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_exchange_pair(
        &self,
        ctx: &mut BattleContext,
        pipeline: &Pipeline<'_>,
        action: &Action,
        source_id: ActorId,
        target_id: ActorId,
        step: u64,
        now: f64,
        rng: &mut StdRng,
        logs: &mut Vec<LogEntry>,
    ) -> Result<Vec<ChainEvent>> {
        if source_id == target_id {
            return Err(EngineError::Validation("self-directed exchange".into()));
        }
        let Some(mut source) = ctx.actors.remove(&source_id) else {
            return Err(EngineError::UnknownActor(source_id));
        };
        let Some(mut target) = ctx.actors.remove(&target_id) else {
            ctx.actors.insert(source_id, source);
            return Err(EngineError::UnknownActor(target_id));
        };

        let report = pipeline.run_exchange(
            &mut source,
            &mut target,
            &action.r#move,
            action.partner_move.as_ref(),
            &ExternalMods::default(),
            step,
            now,
            rng,
        );
        if action.is_forced {
            // The defender sat out the round; shorten their next window.
            target.state.afk_penalty_level = target.state.afk_penalty_level.saturating_add(1);
        }
        ctx.actors.insert(source_id, source);
        ctx.actors.insert(target_id, target);
        logs.push(report.log);
        Ok(report.chain)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_chain_event(
        &self,
        ctx: &mut BattleContext,
        pipeline: &Pipeline<'_>,
        action: &Action,
        event: &ChainEvent,
        step: u64,
        now: f64,
        rng: &mut StdRng,
        logs: &mut Vec<LogEntry>,
    ) -> Result<()> {
        // The follow-up reuses the triggering move, resolved off-hand.
        let intent = if action.r#move.char_id == event.source_id {
            &action.r#move
        } else {
            match &action.partner_move {
                Some(partner) => partner,
                None => return Ok(()),
            }
        };
        let Some(mut source) = ctx.actors.remove(&event.source_id) else {
            return Ok(());
        };
        let Some(mut target) = ctx.actors.remove(&event.target_id) else {
            ctx.actors.insert(event.source_id, source);
            return Ok(());
        };
        let result = pipeline.run_single(
            &mut source,
            Some(&mut target),
            intent,
            &ExternalMods::default(),
            true,
            step,
            rng,
        );
        let names = (source.meta.name.clone(), target.meta.name.clone());
        ctx.actors.insert(event.source_id, source);
        ctx.actors.insert(event.target_id, target);
        logs.push(LogEntry::new(now, step, &names.0, &names.1, vec![result.log]));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn run_one_sided(
        &self,
        ctx: &mut BattleContext,
        pipeline: &Pipeline<'_>,
        action: &Action,
        step: u64,
        now: f64,
        rng: &mut StdRng,
        logs: &mut Vec<LogEntry>,
    ) -> Result<()> {
        let source_id = action.r#move.char_id;
        let target_ids = resolved_targets(&action.r#move);
        if target_ids.is_empty() {
            debug!(source_id, "one-sided action resolved no targets");
        }
        for target_id in target_ids {
            if target_id == source_id {
                // Self-cast: source→source.
                let Some(mut source) = ctx.actors.remove(&source_id) else {
                    return Err(EngineError::UnknownActor(source_id));
                };
                let result = pipeline.run_single(
                    &mut source,
                    None,
                    &action.r#move,
                    &ExternalMods::default(),
                    false,
                    step,
                    rng,
                );
                let name = source.meta.name.clone();
                ctx.actors.insert(source_id, source);
                logs.push(LogEntry::new(now, step, &name, &name, vec![result.log]));
                continue;
            }
            let Some(mut source) = ctx.actors.remove(&source_id) else {
                return Err(EngineError::UnknownActor(source_id));
            };
            let Some(mut target) = ctx.actors.remove(&target_id) else {
                ctx.actors.insert(source_id, source);
                warn!(target_id, "one-sided target missing from context; skipping");
                continue;
            };
            let result = pipeline.run_single(
                &mut source,
                Some(&mut target),
                &action.r#move,
                &ExternalMods::default(),
                false,
                step,
                rng,
            );
            let names = (source.meta.name.clone(), target.meta.name.clone());
            ctx.actors.insert(source_id, source);
            ctx.actors.insert(target_id, target);
            logs.push(LogEntry::new(now, step, &names.0, &names.1, vec![result.log]));
        }
        Ok(())
    }
}

fn resolved_targets(mv: &Move) -> Vec<ActorId> {
    match &mv.payload {
        MovePayload::Item(payload) => payload.targets.clone(),
        MovePayload::Instant(payload) => payload.targets.clone(),
        MovePayload::Exchange(_) => vec![],
    }
}

/// Recompute dead set and per-team alive counts from the mutated actors.
fn refresh_liveness(ctx: &mut BattleContext) {
    ctx.meta.dead_actors = ctx
        .actors
        .values()
        .filter(|actor| !actor.is_alive())
        .map(|actor| actor.id())
        .collect();
    let alive_counts = ctx
        .meta
        .teams
        .iter()
        .map(|(team, roster)| {
            let alive = roster
                .iter()
                .filter(|id| {
                    ctx.actors
                        .get(id)
                        .map(|actor| actor.is_alive())
                        .unwrap_or(false)
                })
                .count() as u32;
            (team.clone(), alive)
        })
        .collect();
    ctx.meta.alive_counts = alive_counts;
}

/// The winning team when exactly one still has living members.
fn sole_survivor(ctx: &BattleContext) -> Option<TeamId> {
    let alive: Vec<&TeamId> = ctx.meta.teams_alive();
    match alive.as_slice() {
        [only] if ctx.meta.teams.len() > 1 => Some((*only).clone()),
        _ => None,
    }
}
