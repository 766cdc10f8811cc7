//! High-level engine orchestrator.
//!
//! The engine owns the store, services, catalogs, and a bounded worker
//! pool consuming a task queue (collect/execute/supervise, with
//! deferral). [`EngineHandle`] is the cloneable façade clients use to
//! create battles, submit intents, and read dashboards. Ticks can also
//! be driven inline through the handle, which is what tests and simple
//! embeddings do.

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use rbc_content::builtin_catalog;
use rbc_core::catalog::CatalogIndex;
use rbc_core::config::{CombatTuning, afk_timeout};
use rbc_core::model::{ActorId, LogEntry, Move, MovePayload, SessionMeta, WeaponLayout};

use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, Result};
use crate::manager::{CombatManager, DEFAULT_HISTORY_TTL_SECS, keys};
use crate::service::assembler::{AssembleRequest, CharacterSource, ContextAssembler, StaticCharacterSource};
use crate::service::data::DataService;
use crate::service::lifecycle::{
    AccountManager, CreateBattleConfig, DEFAULT_SESSION_TTL_SECS, InMemoryAccounts,
    LifecycleService,
};
use crate::service::turn::{MoveRequest, TurnService};
use crate::service::view::{DashboardView, ViewService};
use crate::store::{KvStore, MemoryStore};
use crate::utils::short_id;
use crate::workers::{
    AiTurnRequest, CollectOutcome, Collector, CollectorSignal, ExecuteOutcome, Executor,
    STALL_THRESHOLD_SECS, SUPERVISOR_DEFER_SECS, ScheduledTask, Supervisor, Task,
};

/// Engine configuration shared across the orchestrator and workers.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Cap on concurrently running worker tasks.
    pub worker_concurrency: usize,
    pub task_buffer_size: usize,
    pub session_ttl_secs: u64,
    pub history_ttl_secs: u64,
    pub supervisor_defer_secs: u64,
    pub stall_threshold_secs: f64,
    pub tuning: CombatTuning,
    /// Connection URL for a networked store backend; unused by the
    /// in-process store.
    pub store_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 8,
            task_buffer_size: 256,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            history_ttl_secs: DEFAULT_HISTORY_TTL_SECS,
            supervisor_defer_secs: SUPERVISOR_DEFER_SECS,
            stall_threshold_secs: STALL_THRESHOLD_SECS,
            tuning: CombatTuning::default(),
            store_url: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with the externally configured knobs.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("RBC_STORE_URL") {
            config.store_url = Some(url);
        }
        if let Some(ttl) = env_u64("RBC_HISTORY_TTL_SECS") {
            config.history_ttl_secs = ttl;
        }
        if let Some(cap) = env_u64("RBC_WORKER_CONCURRENCY") {
            config.worker_concurrency = cap.max(1) as usize;
        }
        config
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.parse().ok()
}

struct Services {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    manager: Arc<CombatManager>,
    data: Arc<DataService>,
    lifecycle: Arc<LifecycleService>,
    turn: Arc<TurnService>,
    assembler: Arc<ContextAssembler>,
    collector: Collector,
    executor: Executor,
    supervisor: Supervisor,
}

/// Cloneable façade over the running engine.
#[derive(Clone)]
pub struct EngineHandle {
    services: Arc<Services>,
    tasks: mpsc::Sender<ScheduledTask>,
}

impl EngineHandle {
    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create a battle and arm its supervisor relay.
    pub async fn create_battle(
        &self,
        session_id: &str,
        config: &CreateBattleConfig,
    ) -> Result<SessionMeta> {
        let meta = self
            .services
            .lifecycle
            .create_battle(session_id, config)
            .await?;
        self.schedule(ScheduledTask::after(
            Task::Supervise {
                session_id: session_id.to_string(),
            },
            Duration::from_secs(self.services.config.supervisor_defer_secs),
        ))
        .await?;
        Ok(meta)
    }

    /// Assemble setup templates for the given entities.
    pub fn assembler(&self) -> &Arc<ContextAssembler> {
        &self.services.assembler
    }

    pub async fn assemble(
        &self,
        request: AssembleRequest,
    ) -> Result<(std::collections::BTreeMap<i64, String>, Vec<(i64, EngineError)>)> {
        self.services.assembler.assemble(request).await
    }

    // ------------------------------------------------------------------
    // Intents
    // ------------------------------------------------------------------

    /// Validate and register an intent, then arm the collector: a
    /// heartbeat right away and a timeout check at the move's deadline.
    pub async fn submit_move(
        &self,
        session_id: &str,
        char_id: ActorId,
        request: MoveRequest,
    ) -> Result<Move> {
        let mv = self
            .services
            .turn
            .register_move_request(session_id, char_id, request)
            .await?;

        self.schedule(ScheduledTask::now(Task::Collect {
            session_id: session_id.to_string(),
            signal: Some(CollectorSignal::heartbeat()),
        }))
        .await?;

        let now = self.services.clock.now();
        let until_deadline = (mv.deadline - now).max(0.0);
        self.schedule(ScheduledTask::after(
            Task::Collect {
                session_id: session_id.to_string(),
                signal: Some(CollectorSignal::check_timeout(
                    Some(char_id),
                    Some(mv.move_id.clone()),
                )),
            },
            Duration::from_secs_f64(until_deadline + 1.0),
        ))
        .await?;

        Ok(mv)
    }

    // ------------------------------------------------------------------
    // Inline ticks (tests, simple embeddings)
    // ------------------------------------------------------------------

    pub async fn collect(
        &self,
        session_id: &str,
        signal: Option<&CollectorSignal>,
    ) -> Result<CollectOutcome> {
        self.services.collector.collect_actions(session_id, signal).await
    }

    pub async fn execute(&self, session_id: &str, batch_size: usize) -> Result<ExecuteOutcome> {
        self.services.executor.execute_batch(session_id, batch_size).await
    }

    pub async fn supervise(&self, session_id: &str) -> Result<bool> {
        self.services.supervisor.tick(session_id).await
    }

    /// Decide and register intents for a bot's missing targets; returns
    /// the number of successful registrations.
    pub async fn run_ai_turn(&self, request: &AiTurnRequest) -> Result<i64> {
        run_ai_turn(&self.services, request).await
    }

    // ------------------------------------------------------------------
    // Views
    // ------------------------------------------------------------------

    pub async fn dashboard(
        &self,
        session_id: &str,
        char_id: ActorId,
        log_page: usize,
    ) -> Result<DashboardView> {
        let ctx = self.services.data.load_battle_context(session_id).await?;
        let raw_logs = self.services.manager.read_logs(session_id, 0, -1).await?;
        let logs: Vec<LogEntry> = raw_logs
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();
        Ok(ViewService::build(char_id, &ctx, &logs, log_page))
    }

    pub fn data(&self) -> &Arc<DataService> {
        &self.services.data
    }

    /// Direct access to the turn service: registration without the
    /// collector scheduling `submit_move` performs.
    pub fn turn(&self) -> &Arc<TurnService> {
        &self.services.turn
    }

    /// Lifecycle operations (hot-join, manual finalize).
    pub fn lifecycle(&self) -> &Arc<LifecycleService> {
        &self.services.lifecycle
    }

    pub fn manager(&self) -> &Arc<CombatManager> {
        &self.services.manager
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.services.clock
    }

    async fn schedule(&self, task: ScheduledTask) -> Result<()> {
        self.tasks
            .send(task)
            .await
            .map_err(|_| EngineError::TaskQueueClosed)
    }
}

/// The running engine: owns the dispatcher and the worker pool.
pub struct Engine {
    handle: EngineHandle,
    dispatcher: JoinHandle<()>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Cloneable handle for clients and async tasks.
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Graceful shutdown: stop accepting tasks, wait for the dispatcher.
    pub async fn shutdown(self) -> Result<()> {
        let Engine { handle, dispatcher } = self;
        drop(handle);
        dispatcher
            .await
            .map_err(|err| EngineError::External(format!("dispatcher join failed: {err}")))
    }
}

/// Builder for [`Engine`] with flexible collaborator injection.
pub struct EngineBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn KvStore>>,
    account: Option<Arc<dyn AccountManager>>,
    catalog: Option<Arc<CatalogIndex>>,
    clock: Option<Arc<dyn Clock>>,
    players: Option<Arc<dyn CharacterSource>>,
    monsters: Option<Arc<dyn CharacterSource>>,
    pets: Option<Arc<dyn CharacterSource>>,
}

impl EngineBuilder {
    fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            store: None,
            account: None,
            catalog: None,
            clock: None,
            players: None,
            monsters: None,
            pets: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(mut self, store: Arc<dyn KvStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn account_manager(mut self, account: Arc<dyn AccountManager>) -> Self {
        self.account = Some(account);
        self
    }

    pub fn catalog(mut self, catalog: Arc<CatalogIndex>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn player_source(mut self, source: Arc<dyn CharacterSource>) -> Self {
        self.players = Some(source);
        self
    }

    pub fn monster_source(mut self, source: Arc<dyn CharacterSource>) -> Self {
        self.monsters = Some(source);
        self
    }

    pub fn pet_source(mut self, source: Arc<dyn CharacterSource>) -> Self {
        self.pets = Some(source);
        self
    }

    pub fn build(self) -> Engine {
        let config = self.config;
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store: Arc<dyn KvStore> = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new(clock.clone())));
        let account: Arc<dyn AccountManager> =
            self.account.unwrap_or_else(|| Arc::new(InMemoryAccounts::new()));
        let catalog = self
            .catalog
            .unwrap_or_else(|| Arc::new(builtin_catalog()));
        let empty_source: Arc<dyn CharacterSource> =
            Arc::new(StaticCharacterSource::default());
        let players = self.players.unwrap_or_else(|| empty_source.clone());
        let monsters = self.monsters.unwrap_or_else(|| empty_source.clone());
        let pets = self.pets.unwrap_or(empty_source);

        let manager = Arc::new(CombatManager::new(store.clone()));
        let data = Arc::new(DataService::new(manager.clone()));
        let lifecycle = Arc::new(LifecycleService::new(
            data.clone(),
            manager.clone(),
            store.clone(),
            account,
            clock.clone(),
            config.session_ttl_secs,
            config.history_ttl_secs,
        ));
        let turn = Arc::new(TurnService::new(data.clone(), manager.clone(), clock.clone()));
        let assembler = Arc::new(ContextAssembler::new(store, players, monsters, pets));
        let worker_id = format!("worker-{}", short_id(6));

        let collector = Collector::new(data.clone(), catalog.clone(), clock.clone());
        let executor = Executor::new(
            data.clone(),
            lifecycle.clone(),
            catalog.clone(),
            config.tuning.clone(),
            clock.clone(),
            worker_id,
        );
        let supervisor = Supervisor::new(
            data.clone(),
            lifecycle.clone(),
            clock.clone(),
            config.stall_threshold_secs,
        );

        let services = Arc::new(Services {
            config: config.clone(),
            clock,
            manager,
            data,
            lifecycle,
            turn,
            assembler,
            collector,
            executor,
            supervisor,
        });

        let (task_tx, task_rx) = mpsc::channel::<ScheduledTask>(config.task_buffer_size);
        // The dispatcher re-arms follow-up work through a weak sender so
        // dropping the last handle closes the queue and stops the loop.
        let dispatcher = spawn_dispatcher(services.clone(), task_rx, task_tx.downgrade(), &config);

        info!(
            worker_concurrency = config.worker_concurrency,
            "combat engine started"
        );
        Engine {
            handle: EngineHandle {
                services,
                tasks: task_tx,
            },
            dispatcher,
        }
    }
}

/// Dispatcher: pulls scheduled tasks, applies deferral, and fans work
/// out to the bounded pool.
fn spawn_dispatcher(
    services: Arc<Services>,
    mut task_rx: mpsc::Receiver<ScheduledTask>,
    task_tx: mpsc::WeakSender<ScheduledTask>,
    config: &EngineConfig,
) -> JoinHandle<()> {
    let pool = Arc::new(Semaphore::new(config.worker_concurrency));
    tokio::spawn(async move {
        while let Some(scheduled) = task_rx.recv().await {
            if let Some(defer) = scheduled.defer {
                let tx = task_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(defer).await;
                    let Some(tx) = tx.upgrade() else { return };
                    if tx.send(ScheduledTask::now(scheduled.task)).await.is_err() {
                        debug!("task queue closed; dropping deferred task");
                    }
                });
                continue;
            }

            let Ok(permit) = pool.clone().acquire_owned().await else {
                break;
            };
            let services = services.clone();
            let tx = task_tx.clone();
            tokio::spawn(async move {
                run_task(services, scheduled.task, tx).await;
                drop(permit);
            });
        }
        debug!("engine dispatcher stopped");
    })
}

async fn run_task(services: Arc<Services>, task: Task, tx: mpsc::WeakSender<ScheduledTask>) {
    let send = |scheduled: ScheduledTask| {
        let tx = tx.clone();
        async move {
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(scheduled).await;
            }
        }
    };
    match task {
        Task::Collect { session_id, signal } => {
            let outcome = match services
                .collector
                .collect_actions(&session_id, signal.as_ref())
                .await
            {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(%session_id, %err, "collector tick failed");
                    return;
                }
            };

            // AI turn requests resolve in the same cycle; fresh intents
            // trigger another collect.
            for request in &outcome.ai_tasks {
                match run_ai_turn(&services, request).await {
                    Ok(registered) if registered > 0 => {
                        send(ScheduledTask::now(Task::Collect {
                            session_id: session_id.clone(),
                            signal: Some(CollectorSignal::heartbeat()),
                        }))
                        .await;
                    }
                    Ok(_) => {}
                    Err(err) => error!(%session_id, bot_id = request.bot_id, %err, "ai turn failed"),
                }
            }

            // Schedule an executor batch when work is pending and nobody
            // holds the session yet.
            let pending = outcome.enqueued > 0
                || services
                    .manager
                    .queue_len(&session_id)
                    .await
                    .unwrap_or(0)
                    > 0;
            if pending {
                match services
                    .manager
                    .check_and_lock_busy_for_collector(&session_id)
                    .await
                {
                    Ok(true) => {
                        send(ScheduledTask::now(Task::Execute {
                            session_id,
                            batch_size: outcome.batch_size,
                        }))
                        .await;
                    }
                    Ok(false) => {
                        debug!(%session_id, "session busy; executor already scheduled");
                    }
                    Err(err) => error!(%session_id, %err, "busy reservation failed"),
                }
            }
        }
        Task::Execute {
            session_id,
            batch_size,
        } => match services.executor.execute_batch(&session_id, batch_size).await {
            Ok(outcome) => {
                if outcome.committed && outcome.heartbeat {
                    // Re-arm the collector: intents may have accumulated
                    // during the batch.
                    send(ScheduledTask::now(Task::Collect {
                        session_id,
                        signal: Some(CollectorSignal::heartbeat()),
                    }))
                    .await;
                }
            }
            Err(EngineError::LockStolen(_)) => {
                warn!(%session_id, "batch aborted: lock reassigned");
            }
            Err(err) => error!(%session_id, %err, "executor batch failed"),
        },
        Task::Supervise { session_id } => match services.supervisor.tick(&session_id).await {
            Ok(true) => {
                send(ScheduledTask::after(
                    Task::Supervise { session_id },
                    Duration::from_secs(services.config.supervisor_defer_secs),
                ))
                .await;
            }
            Ok(false) => {}
            Err(err) => error!(%session_id, %err, "supervisor tick failed"),
        },
    }
}

/// Decide and register exchange intents for every missing target of one
/// bot, in a single atomic batch.
async fn run_ai_turn(services: &Arc<Services>, request: &AiTurnRequest) -> Result<i64> {
    let layout = services
        .manager
        .store()
        .json_get(
            &keys::actor_loadout(&request.session_id, request.bot_id),
            "$.layout",
        )
        .await?
        .and_then(|value| serde_json::from_value::<WeaponLayout>(value).ok())
        .unwrap_or(WeaponLayout::OneHand);

    let mut rng = StdRng::from_entropy();
    let decisions = rbc_core::ai::decide_batch(&request.missing_targets, layout, &mut rng);
    let now = services.clock.now();

    let mut entries = Vec::with_capacity(decisions.len());
    for payload in decisions {
        let target_id = payload.target_id;
        let mv = Move {
            move_id: short_id(8),
            char_id: request.bot_id,
            created_at: now,
            deadline: now + afk_timeout(0) as f64,
            payload: MovePayload::Exchange(payload),
        };
        let doc = serde_json::to_value(&mv).map_err(|e| EngineError::External(e.to_string()))?;
        entries.push(json!({
            "target_id": target_id,
            "move_id": mv.move_id,
            "doc": doc,
        }));
    }

    let registered = services
        .manager
        .register_moves_batch_atomic(&request.session_id, request.bot_id, entries)
        .await?;
    debug!(
        session_id = %request.session_id,
        bot_id = request.bot_id,
        registered,
        "ai intents registered"
    );
    Ok(registered)
}
