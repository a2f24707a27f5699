//! Clustering thresholds for the edit aggregation engine.
//!
//! All fields have serde defaults, so host configs can override a subset and
//! leave the rest at their documented values:
//!
//! ```
//! let config: editstream::EngineConfig =
//!     serde_json::from_str(r#"{ "delta_t": 2.0, "max_edits": 50 }"#).unwrap();
//! assert_eq!(config.delta_t, 2.0);
//! assert_eq!(config.delta_l, 5); // default
//! ```

use serde::{Deserialize, Serialize};

const DEFAULT_DELTA_T_SECS: f64 = 1.0;
const DEFAULT_DELTA_L_LINES: usize = 5;
const DEFAULT_MAX_EDITS: usize = 200;
const DEFAULT_MAX_DURATION_SECS: f64 = 20.0;
const DEFAULT_CONTEXT_SIZE: usize = 5;
const DEFAULT_MAX_EDIT_SIZE: usize = 1000;
const DEFAULT_CONTEXT_LINES: usize = 3;

/// Tuning knobs for edit clustering (`[edit_aggregation]` in the host config).
///
/// The engine treats these as static for the lifetime of an
/// [`EditAggregator`](crate::EditAggregator) instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Idle gap in seconds between edits on *different* lines before the
    /// receiving cluster is closed (default: 1.0). Edits that stay on the
    /// cluster's last line bypass this check.
    pub delta_t: f64,
    /// Spatial tolerance in lines around a cluster's current range. An edit
    /// landing further away than this starts (or closes into) a new cluster
    /// (default: 5).
    pub delta_l: usize,
    /// Maximum number of edits a single cluster may absorb (default: 200).
    pub max_edits: usize,
    /// Maximum lifetime of a cluster in seconds, measured from its first
    /// edit (default: 20.0). Caps run-on episodes even on a single line.
    pub max_duration: f64,
    /// How many rendered comparisons are retained per file (default: 5).
    /// Oldest entries are evicted first.
    pub context_size: usize,
    /// Edits whose text is longer than this many characters are dropped
    /// before clustering (default: 1000). Large paste/refactor events are
    /// captured elsewhere and would swamp the episode model.
    pub max_edit_size: usize,
    /// Lines of context added around an edit when seeding or widening a
    /// cluster's range (default: 3).
    pub context_lines: usize,
    /// Emit per-edit debug logs (default: false).
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delta_t: DEFAULT_DELTA_T_SECS,
            delta_l: DEFAULT_DELTA_L_LINES,
            max_edits: DEFAULT_MAX_EDITS,
            max_duration: DEFAULT_MAX_DURATION_SECS,
            context_size: DEFAULT_CONTEXT_SIZE,
            max_edit_size: DEFAULT_MAX_EDIT_SIZE,
            context_lines: DEFAULT_CONTEXT_LINES,
            verbose: false,
        }
    }
}
