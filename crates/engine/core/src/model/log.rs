//! Rendered battle log entries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One append-only log record per resolved pair.
///
/// Render-only: the engine writes these and never reads them back.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: f64,
    pub round_index: u64,
    /// Names of the two participants ("A", "B"); B may equal A for
    /// self-casts.
    pub pair_names: [String; 2],
    /// Rendered lines, one per direction.
    pub logs: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LogEntry {
    pub fn new(time: f64, round_index: u64, a: &str, b: &str, logs: Vec<String>) -> Self {
        Self {
            time,
            round_index,
            pair_names: [a.to_string(), b.to_string()],
            logs,
            extra: Map::new(),
        }
    }
}
