//! Error types surfaced by the pure combat layer.

use thiserror::Error;

/// Errors produced while validating or resolving battle data.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown strategy {0:?}")]
    UnknownStrategy(String),

    #[error("invalid zones for layout {layout}: {reason}")]
    InvalidZones { layout: String, reason: String },

    #[error("move deadline already elapsed")]
    StaleDeadline,

    #[error("actor {0} not present in battle context")]
    UnknownActor(i64),

    #[error("document failed to parse: {0}")]
    Corrupt(#[source] serde_json::Error),
}

/// Failures inside a single pipeline invocation.
///
/// These never abort a batch; the executor logs them and counts the action
/// as processed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("ability {0:?} not present in catalog")]
    UnknownAbility(String),

    #[error("feint {0:?} not present in catalog")]
    UnknownFeint(String),

    #[error("item {0:?} not present in catalog")]
    UnknownItem(String),

    #[error("insufficient resources to pay ability cost")]
    CostUnpayable,
}
