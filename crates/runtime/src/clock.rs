//! Wall-clock seam.
//!
//! Deadline and stall logic reads time through [`Clock`] so tests can
//! drive it manually, the same way nondeterminism is injected elsewhere
//! through `RngCore`.

use std::sync::Mutex;

/// Unix-seconds clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// System clock backed by chrono.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        chrono::Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

/// Manually driven clock for tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    pub fn at(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, seconds: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now += seconds;
        }
    }

    pub fn set(&self, to: f64) {
        if let Ok(mut now) = self.now.lock() {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.now.lock().map(|now| *now).unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::at(100.0);
        assert_eq!(clock.now(), 100.0);
        clock.advance(60.0);
        assert_eq!(clock.now(), 160.0);
        clock.set(0.0);
        assert_eq!(clock.now(), 0.0);
    }
}
