//! Background tasks: collector, executor, supervisor.
//!
//! The engine owns the task queue and worker pool; these modules hold
//! the per-tick logic.
mod collector;
mod executor;
mod supervisor;

pub use collector::{AiTurnRequest, CollectOutcome, Collector, CollectorSignal, SignalKind};
pub use executor::{ExecuteOutcome, Executor};
pub use supervisor::{STALL_THRESHOLD_SECS, SUPERVISOR_DEFER_SECS, Supervisor};

use std::time::Duration;

/// One unit of scheduled work.
#[derive(Clone, Debug)]
pub enum Task {
    Collect {
        session_id: String,
        signal: Option<CollectorSignal>,
    },
    Execute {
        session_id: String,
        batch_size: usize,
    },
    Supervise {
        session_id: String,
    },
}

/// Task plus an optional dispatch delay.
#[derive(Clone, Debug)]
pub struct ScheduledTask {
    pub task: Task,
    pub defer: Option<Duration>,
}

impl ScheduledTask {
    pub fn now(task: Task) -> Self {
        Self { task, defer: None }
    }

    pub fn after(task: Task, defer: Duration) -> Self {
        Self {
            task,
            defer: Some(defer),
        }
    }
}
