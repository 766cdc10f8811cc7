//! The session key schema.
//!
//! These names are a compatibility contract with front-ends and older
//! engines; do not reshape them.

use rbc_core::ActorId;

/// Prefix shared by every key of one session.
pub fn prefix(session_id: &str) -> String {
    format!("combat:rbc:{session_id}")
}

pub fn meta(session_id: &str) -> String {
    format!("{}:meta", prefix(session_id))
}

pub fn actor_state(session_id: &str, actor_id: ActorId) -> String {
    format!("{}:actor:{actor_id}:state", prefix(session_id))
}

pub fn actor_raw(session_id: &str, actor_id: ActorId) -> String {
    format!("{}:actor:{actor_id}:raw", prefix(session_id))
}

pub fn actor_loadout(session_id: &str, actor_id: ActorId) -> String {
    format!("{}:actor:{actor_id}:loadout", prefix(session_id))
}

pub fn actor_meta(session_id: &str, actor_id: ActorId) -> String {
    format!("{}:actor:{actor_id}:meta", prefix(session_id))
}

pub fn actor_abilities(session_id: &str, actor_id: ActorId) -> String {
    format!("{}:actor:{actor_id}:active_abilities", prefix(session_id))
}

pub fn actor_xp(session_id: &str, actor_id: ActorId) -> String {
    format!("{}:actor:{actor_id}:data_xp", prefix(session_id))
}

pub fn moves(session_id: &str, actor_id: ActorId) -> String {
    format!("{}:moves:{actor_id}", prefix(session_id))
}

pub fn targets(session_id: &str) -> String {
    format!("{}:targets", prefix(session_id))
}

pub fn actions_queue(session_id: &str) -> String {
    format!("{}:q:actions", prefix(session_id))
}

pub fn logs(session_id: &str) -> String {
    format!("{}:logs", prefix(session_id))
}

pub fn busy(session_id: &str) -> String {
    format!("{}:sys:busy", prefix(session_id))
}

/// Durable character's session pointer, owned externally.
pub fn player_status(char_id: ActorId) -> String {
    format!("player:status:{char_id}")
}

/// Short-lived assembled-context document.
pub fn temp_setup(token: &str) -> String {
    format!("temp:setup:{token}")
}
