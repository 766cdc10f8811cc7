//! Canonical battle data model.
//!
//! Every struct here has a stable on-wire JSON shape: documents written to
//! the shared store round-trip through these types, and readers tolerate
//! unknown fields so older engines can coexist with newer front-ends.
mod action;
mod actor;
mod intent;
mod log;
mod session;
mod targets;
mod token;
mod zone;

pub use action::{Action, ActionType};
pub use actor::{ActiveAbility, ActorMeta, ActorSnapshot, ActorState, BattleCounters, Loadout};
pub use intent::{
    ExchangePayload, InstantPayload, ItemPayload, Move, MovePayload, Strategy, TargetSpec,
};
pub use log::LogEntry;
pub use session::{ActorRole, BattleType, Reward, SessionData, SessionMeta};
pub use targets::TargetsMap;
pub use token::TokenKind;
pub use zone::{BLOCK_PAIRS, BlockPattern, WeaponLayout, Zone, zone_block_list};

/// Signed actor identifier, unique within a session.
///
/// Players keep their durable character id; AI and shadow copies use
/// negative ids so the two ranges never collide.
pub type ActorId = i64;

/// Team identifier within a session ("blue", "red", ...).
pub type TeamId = String;
