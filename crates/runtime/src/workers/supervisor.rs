//! Supervisor relay: stalled-session detection and cleaner injection.
//!
//! A tick inspects `last_activity_at`; past the stall threshold it
//! injects the cleaner (idempotently) and asks to be re-enqueued. Errors
//! inside a tick are logged, never rethrown — the relay only dies when
//! the session does.

use std::sync::Arc;

use tracing::{debug, error};

use crate::clock::Clock;
use crate::error::{EngineError, Result};
use crate::service::data::DataService;
use crate::service::lifecycle::LifecycleService;

/// Seconds between relay ticks.
pub const SUPERVISOR_DEFER_SECS: u64 = 300;

/// Silence threshold before the cleaner is injected.
pub const STALL_THRESHOLD_SECS: f64 = 600.0;

pub struct Supervisor {
    data: Arc<DataService>,
    lifecycle: Arc<LifecycleService>,
    clock: Arc<dyn Clock>,
    stall_secs: f64,
}

impl Supervisor {
    pub fn new(
        data: Arc<DataService>,
        lifecycle: Arc<LifecycleService>,
        clock: Arc<dyn Clock>,
        stall_secs: f64,
    ) -> Self {
        Self {
            data,
            lifecycle,
            clock,
            stall_secs,
        }
    }

    /// One relay tick. Returns whether to re-enqueue.
    pub async fn tick(&self, session_id: &str) -> Result<bool> {
        let meta = match self.data.get_battle_meta(session_id).await {
            Ok(meta) => meta,
            Err(EngineError::SessionNotFound(_)) => {
                debug!(session_id, "session gone; supervisor relay stops");
                return Ok(false);
            }
            Err(err) => {
                // Keep relaying through transient store trouble.
                error!(session_id, %err, "supervisor meta load failed");
                return Ok(true);
            }
        };
        if !meta.active {
            debug!(session_id, "session inactive; supervisor relay stops");
            return Ok(false);
        }

        let delta = self.clock.now() - meta.last_activity_at;
        if delta > self.stall_secs {
            match self.lifecycle.spawn_cleaner(session_id).await {
                Ok(true) => debug!(session_id, delta, "stall detected; cleaner spawned"),
                Ok(false) => {}
                Err(err) => error!(session_id, %err, "cleaner spawn failed"),
            }
        }
        Ok(true)
    }
}
