//! Runtime orchestration for the reactive burst combat engine.
//!
//! This crate wires the store adapter, combat manager, data service, and
//! lifecycle/turn services into a cohesive engine API. Consumers embed
//! [`Engine`] to host battles and interact through [`EngineHandle`]:
//! submitting intents, reading dashboards, creating and finishing
//! sessions. Collector, executor, and supervisor ticks run on a bounded
//! worker pool owned by the engine.
//!
//! Modules are organized by responsibility:
//! - [`store`] is the narrow typed surface over the shared KV/document store
//! - [`manager`] owns the session key schema and every atomic script
//! - [`service`] holds data shaping, assembly, lifecycle, turns, and views
//! - [`workers`] keeps the collector/executor/supervisor tasks internal
//! - [`engine`] hosts the orchestrator, builder, and handle
pub mod clock;
pub mod engine;
pub mod error;
pub mod manager;
pub mod service;
pub mod store;

mod utils;
mod workers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Engine, EngineBuilder, EngineConfig, EngineHandle};
pub use error::{EngineError, Result};
pub use manager::CombatManager;
pub use service::{
    AccountManager, AssembleRequest, AssembleScope, BattleContext, BattleStatus, CharacterSource,
    ContextAssembler, CreateBattleConfig, DashboardView, DataService, EquipmentPiece,
    InMemoryAccounts, LifecycleService, MemberSpec, MoveRequest, MovesDoc, SessionResults,
    SetupTemplate, StaticCharacter, StaticCharacterSource, TeamSpec, TurnService, ViewService,
    Vitals,
};
pub use store::{KvStore, MemoryStore, Op, Reply, StoreError};
pub use workers::{
    AiTurnRequest, CollectOutcome, CollectorSignal, ExecuteOutcome, SignalKind,
};
