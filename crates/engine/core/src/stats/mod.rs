//! Stat materialization: raw math model in, flat numeric view out.
//!
//! The raw model is the persisted source of truth (base values plus
//! additive/multiplicative sources and temp overlays). The resolver never
//! reads it directly; it consumes a [`StatSheet`] materialized by the
//! waterfall in [`calculator`]. A snapshot's `dirty_stats` set forces
//! rematerialization before the next interaction.
mod calculator;
pub mod keys;
mod raw;
mod sheet;

pub use calculator::materialize;
pub use raw::{RawModel, StatEntry};
pub use sheet::StatSheet;

use crate::model::ActorSnapshot;

/// Rematerialize an actor's stat sheet when it is missing or dirty.
pub fn ensure_stats(actor: &mut ActorSnapshot, step: u64) {
    if actor.needs_materialization() {
        actor.stats = Some(materialize(
            &actor.raw,
            &actor.loadout,
            &actor.active_abilities,
            step,
        ));
        actor.dirty_stats.clear();
    }
}

/// Weapon hand, used to prefix hand-dependent stat keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hand {
    Main,
    Off,
}

impl Hand {
    /// Key prefix for hand-dependent stats.
    pub fn prefix(self) -> &'static str {
        match self {
            Hand::Main => "main_hand_",
            Hand::Off => "off_hand_",
        }
    }
}
