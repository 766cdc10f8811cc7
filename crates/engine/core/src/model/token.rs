//! Transient per-actor token counts.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Token kinds awarded by resolver stages and spent by abilities and feints.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TokenKind {
    Hit,
    Crit,
    Dodge,
    Parry,
    Block,
    Counter,
    Gift,
}
