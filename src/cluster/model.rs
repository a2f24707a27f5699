//! Data model for edit events and edit clusters.
//!
//! An [`EditEvent`] is the wire-facing record the editor capture layer emits
//! for every keystroke-level change. A [`Cluster`] is the engine's internal
//! grouping of events into one logical editing episode.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Positions & ranges ──────────────────────────────────────────────────────

/// A zero-based (line, character) position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

/// The document span replaced by an edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditRange {
    pub start: Position,
    pub end: Position,
}

/// An inclusive span of lines covered by a cluster.
///
/// While a cluster is active its range only ever widens — `min_line` never
/// increases and `max_line` never decreases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRange {
    pub min_line: usize,
    pub max_line: usize,
}

impl LineRange {
    /// Seed a range around `line`: `context_lines` either side, clamped to
    /// `[0, last_line_idx]`.
    pub fn around(line: usize, context_lines: usize, last_line_idx: usize) -> Self {
        Self {
            min_line: line.saturating_sub(context_lines),
            max_line: last_line_idx.min(line + context_lines),
        }
    }

    /// Whether `line` falls inside this range widened by `tolerance` lines.
    pub fn contains_within(&self, line: usize, tolerance: usize) -> bool {
        line + tolerance >= self.min_line && line <= self.max_line + tolerance
    }

    /// Whether two ranges come within `tolerance` lines of each other.
    pub fn overlaps_within(&self, other: &LineRange, tolerance: usize) -> bool {
        self.min_line <= other.max_line + tolerance && self.max_line + tolerance >= other.min_line
    }
}

// ─── Edit events ─────────────────────────────────────────────────────────────

/// One fine-grained edit as captured by the editor.
///
/// `file_contents` is the full text of the file *after* this edit was
/// applied; the engine keeps the pre-edit text itself, so capture layers do
/// not need to ship both versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditEvent {
    pub filepath: String,
    /// Full post-edit file text.
    pub file_contents: String,
    /// Span replaced by this edit, against the pre-edit text.
    pub range: EditRange,
    /// Replacement text inserted at `range`.
    pub edit_text: String,
    /// Capture-time timestamp. When absent, the engine stamps the event at
    /// ingestion time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl EditEvent {
    /// A structural edit alters line boundaries: it inserts a newline or
    /// replaces a multi-line span. Structural edits shift the line-offset
    /// assumptions of every nearby cluster.
    pub fn is_structural(&self) -> bool {
        self.edit_text.contains('\n') || self.range.start.line != self.range.end.line
    }
}

// ─── Clusters ────────────────────────────────────────────────────────────────

/// Why a cluster was finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeReason {
    /// Idle gap on a different line exceeded `delta_t`.
    IdleTimeout,
    /// The cluster reached `max_edits`.
    EditLimit,
    /// The cluster outlived `max_duration`.
    DurationLimit,
    /// A structural edit landed on a different line.
    StructuralDisplacement,
    /// A rapid jump to a line outside the spatial window.
    SpatialJump,
    /// A structural edit in an overlapping cluster invalidated this one.
    OverlapInvalidated,
    /// Explicit flush via `finalize_all_clusters`.
    Flush,
}

impl FinalizeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IdleTimeout => "idle_timeout",
            Self::EditLimit => "edit_limit",
            Self::DurationLimit => "duration_limit",
            Self::StructuralDisplacement => "structural_displacement",
            Self::SpatialJump => "spatial_jump",
            Self::OverlapInvalidated => "overlap_invalidated",
            Self::Flush => "flush",
        }
    }
}

impl std::fmt::Display for FinalizeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One active editing episode: a time- and line-contiguous run of edits.
///
/// Lifecycle is `active → finalized`, nothing else. Finalization removes the
/// cluster from its file's active set exactly once; the `id` makes that
/// removal idempotent.
#[derive(Debug, Clone)]
pub struct Cluster {
    pub id: Uuid,
    /// Full file text snapshotted when the cluster was created.
    pub before_state: String,
    /// Line range seeded at creation; kept for diagnostics.
    pub start_range: LineRange,
    /// Line range covered so far; widens monotonically.
    pub current_range: LineRange,
    /// Absorbed edits, in arrival order.
    pub edits: Vec<EditEvent>,
    pub first_timestamp: DateTime<Utc>,
    pub last_timestamp: DateTime<Utc>,
    /// Start line of the most recently absorbed edit.
    pub last_line: usize,
}

impl Cluster {
    pub fn new(
        before_state: String,
        range: LineRange,
        timestamp: DateTime<Utc>,
        edit_line: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            before_state,
            start_range: range,
            current_range: range,
            edits: Vec::new(),
            first_timestamp: timestamp,
            last_timestamp: timestamp,
            last_line: edit_line,
        }
    }

    /// Seconds elapsed since the most recent absorbed edit.
    pub fn idle_secs(&self, now: DateTime<Utc>) -> f64 {
        millis_between(self.last_timestamp, now) as f64 / 1000.0
    }

    /// Seconds elapsed since the cluster was created.
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        millis_between(self.first_timestamp, now) as f64 / 1000.0
    }
}

fn millis_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    later.signed_duration_since(earlier).num_milliseconds()
}
