//! Unified error types surfaced by the engine API.
//!
//! Wraps failures from the store adapter, session coordination, and
//! external collaborators so clients can bubble them up with consistent
//! context.

use thiserror::Error;

pub use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed intent: unknown strategy, invalid zones, stale deadline.
    /// Reported back to the submitter; nothing is written.
    #[error("invalid intent: {0}")]
    Validation(String),

    /// Atomic exchange registration found the target already consumed.
    /// The submitter should refresh state and retry.
    #[error("target {target_id} no longer available for actor {actor_id}")]
    StaleTarget { actor_id: i64, target_id: i64 },

    /// Another worker holds the session lock; not fatal, the next
    /// heartbeat retries.
    #[error("session {0} is locked by another worker")]
    LockContention(String),

    /// Post-batch ownership check failed; the batch is aborted without
    /// writing.
    #[error("worker lock for session {0} was reassigned mid-batch")]
    LockStolen(String),

    /// A referenced temp context key is absent or expired. Fatal for
    /// session creation only.
    #[error("setup template missing for entity {0}")]
    TemplateMissing(i64),

    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("session {0} is not active")]
    SessionInactive(String),

    #[error("actor {0} not present in battle context")]
    UnknownActor(i64),

    /// A stored document failed to parse. The affected actor is skipped
    /// for the current tick; the session keeps running.
    #[error("corrupt document at {key}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    /// External collaborator failure (account manager, character source).
    #[error("external collaborator failure: {0}")]
    External(String),

    #[error("engine task queue closed")]
    TaskQueueClosed,
}

impl EngineError {
    /// Whether the executor may swallow this error for one action and
    /// keep the batch going.
    pub fn is_recoverable_per_action(&self) -> bool {
        matches!(
            self,
            EngineError::Corrupt { .. }
                | EngineError::UnknownActor(_)
                | EngineError::Validation(_)
        )
    }
}
