//! Deterministic combat logic and data types shared across the engine.
//!
//! `rbc-core` defines the canonical battle model (sessions, actors, moves,
//! actions) and exposes pure APIs reused by the runtime and offline tools:
//! the stats waterfall, the per-interaction combat pipeline, and the AI
//! decision module. Nothing in this crate performs I/O or reads the clock;
//! randomness flows through an injected [`rand::RngCore`].
pub mod ai;
pub mod catalog;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod stats;

pub use catalog::{AbilityConfig, AbilityCost, CatalogIndex, FeintConfig, ItemBase, PipelineStep};
pub use config::CombatTuning;
pub use error::{CoreError, PipelineError};
pub use model::{
    Action, ActionType, ActiveAbility, ActorId, ActorMeta, ActorRole, ActorSnapshot, ActorState,
    BattleType, BlockPattern, ExchangePayload, InstantPayload, ItemPayload, Loadout, LogEntry,
    Move, MovePayload, Reward, SessionData, SessionMeta, Strategy, TargetSpec, TargetsMap, TeamId,
    TokenKind, WeaponLayout, Zone, zone_block_list,
};
pub use pipeline::{
    AbortReason, AttackOutcome, ChainEvent, ExchangeReport, ExternalMods, InteractionResult,
    Pipeline, PostEffect,
};
pub use stats::{RawModel, StatEntry, StatSheet, ensure_stats, keys as stat_keys};
