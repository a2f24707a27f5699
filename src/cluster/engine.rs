//! Cluster membership, finalization triggers, and episode retirement.
//!
//! One [`ClusterEngine`] is shared by every file lane. It owns no per-file
//! state itself — each lane hands it exclusive access to that file's
//! [`FileState`] for the duration of one queued task, which is what makes
//! the per-file ordering guarantees hold without a global lock.

use std::collections::VecDeque;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cluster::model::{Cluster, EditEvent, FinalizeReason, LineRange};
use crate::comparison::render_comparison;
use crate::config::EngineConfig;
use crate::error::EngineFault;
use crate::sink::{ComparisonSink, FinalizedComparison};

// ─── Per-file state ──────────────────────────────────────────────────────────

/// Everything the engine tracks for one file. Mutated exclusively inside the
/// file's lane; the aggregator takes short read locks for metrics.
#[derive(Debug)]
pub(crate) struct FileState {
    /// Latest full file text, i.e. the resulting text of the most recently
    /// processed edit.
    pub current_content: String,
    pub active_clusters: Vec<Cluster>,
    /// Rendered comparisons, oldest first, capped at `context_size`.
    pub prior_comparisons: VecDeque<String>,
}

impl FileState {
    pub fn new(initial_content: String) -> Self {
        Self {
            current_content: initial_content,
            active_clusters: Vec::new(),
            prior_comparisons: VecDeque::new(),
        }
    }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

/// The clustering decision procedure plus the finalization path.
pub(crate) struct ClusterEngine {
    config: EngineConfig,
    sink: Arc<dyn ComparisonSink>,
}

impl ClusterEngine {
    pub fn new(config: EngineConfig, sink: Arc<dyn ComparisonSink>) -> Self {
        Self { config, sink }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Apply one edit to the file's clustering state.
    ///
    /// Runs the full decision procedure: oversize validation, finalization
    /// trigger scan, spatial-jump pass, cluster selection or creation,
    /// absorption, and structural displacement of overlapping clusters. Any
    /// finalization this triggers completes — sink call included — before
    /// the method returns, so the lane never starts the next edit against a
    /// half-retired active set.
    pub async fn process_edit(
        &self,
        path: &str,
        edit: EditEvent,
        timestamp: DateTime<Utc>,
        state: &mut FileState,
    ) -> Result<()> {
        // Oversized edits are dropped before they can touch any cluster.
        if edit.edit_text.chars().count() > self.config.max_edit_size {
            let fault = EngineFault::ValidationDrop {
                size: edit.edit_text.chars().count(),
                limit: self.config.max_edit_size,
            };
            debug!(file = %path, %fault, "edit discarded");
            return Ok(());
        }

        let edit_line = edit.range.start.line;
        let structural = edit.is_structural();
        // Range computations are bounded by the pre-edit line count; the
        // post-edit text is not installed until the edit has been absorbed.
        let last_line_idx = state.current_content.split('\n').count().saturating_sub(1);

        // Trigger scan: retire clusters that can no longer absorb this edit.
        for (id, reason) in self.trigger_candidates(state, edit_line, structural, timestamp) {
            self.finalize_cluster(path, id, state, reason).await;
        }

        // Spatial-jump pass: a fast move to a distant line closes the old
        // cluster instead of silently extending it. This must finish before
        // selection reads the active set.
        for id in self.spatial_jump_candidates(state, edit_line, timestamp) {
            self.finalize_cluster(path, id, state, FinalizeReason::SpatialJump)
                .await;
        }

        let idx = match self.select_cluster(state, edit_line, timestamp) {
            Some(idx) => idx,
            None => {
                let range = LineRange::around(edit_line, self.config.context_lines, last_line_idx);
                state.active_clusters.push(Cluster::new(
                    state.current_content.clone(),
                    range,
                    timestamp,
                    edit_line,
                ));
                state.active_clusters.len() - 1
            }
        };

        // Whitespace-only edits still refresh recency and count toward the
        // edit limit, but must not widen the range.
        let whitespace_only = is_whitespace_only(&edit, &state.current_content);

        let cluster = &mut state.active_clusters[idx];
        cluster.edits.push(edit.clone());
        cluster.last_timestamp = timestamp;
        cluster.last_line = edit_line;
        if !whitespace_only {
            cluster.current_range.min_line = cluster
                .current_range
                .min_line
                .min(edit_line.saturating_sub(self.config.context_lines));
            cluster.current_range.max_line = cluster
                .current_range
                .max_line
                .max(last_line_idx.min(edit_line + self.config.context_lines));
        }
        let receiver_id = cluster.id;
        let receiver_range = cluster.current_range;

        state.current_content = edit.file_contents;

        // A structural edit shifts every line after it, so nearby clusters'
        // recorded ranges no longer mean what they did when captured.
        if structural {
            let displaced: Vec<Uuid> = state
                .active_clusters
                .iter()
                .filter(|c| {
                    c.id != receiver_id
                        && c.current_range
                            .overlaps_within(&receiver_range, self.config.delta_l)
                })
                .map(|c| c.id)
                .collect();
            for id in displaced {
                self.finalize_cluster(path, id, state, FinalizeReason::OverlapInvalidated)
                    .await;
            }
        }

        if self.config.verbose {
            let preview: String = edit.edit_text.chars().take(30).collect();
            debug!(file = %path, line = edit_line, preview = %preview, "processed edit");
        }
        Ok(())
    }

    /// Finalize every active cluster of one file (explicit flush).
    pub async fn flush_file(&self, path: &str, state: &mut FileState) {
        let ids: Vec<Uuid> = state.active_clusters.iter().map(|c| c.id).collect();
        for id in ids {
            self.finalize_cluster(path, id, state, FinalizeReason::Flush)
                .await;
        }
    }

    /// Render the earliest active cluster's snapshot against the current
    /// content, without finalizing anything. `None` when there is nothing
    /// in progress or the change is whitespace-only.
    pub async fn in_progress_comparison(&self, path: &str, state: &FileState) -> Option<String> {
        let earliest = state
            .active_clusters
            .iter()
            .min_by_key(|c| c.first_timestamp)?;
        let before = &earliest.before_state;
        let after = &state.current_content;
        if before == after || strip_whitespace(before) == strip_whitespace(after) {
            return None;
        }
        Some(render_comparison(before, after, path).await)
    }

    /// Retire one cluster: render its comparison, record it in the file's
    /// bounded history, and emit it to the sink. A second call with the same
    /// id is a no-op — the id is gone from the active set after the first.
    pub async fn finalize_cluster(
        &self,
        path: &str,
        id: Uuid,
        state: &mut FileState,
        reason: FinalizeReason,
    ) {
        let Some(pos) = state.active_clusters.iter().position(|c| c.id == id) else {
            return;
        };
        let cluster = state.active_clusters.remove(pos);

        let comparison =
            render_comparison(&cluster.before_state, &state.current_content, path).await;

        state.prior_comparisons.push_back(comparison.clone());
        while state.prior_comparisons.len() > self.config.context_size {
            state.prior_comparisons.pop_front();
        }

        info!(
            file = %path,
            cluster = %cluster.id,
            edits = cluster.edits.len(),
            reason = %reason,
            "finalizing edit cluster"
        );

        let event = FinalizedComparison {
            file_path: path.to_string(),
            before_lines: cluster.before_state.split('\n').map(str::to_owned).collect(),
            comparison,
            recent_comparisons: state.prior_comparisons.iter().cloned().collect(),
            reason,
            finalized_at: Utc::now(),
        };

        // The sink runs in its own task that we await: delivery order is
        // preserved, but a panicking consumer unwinds there instead of
        // killing this file's lane.
        let sink = Arc::clone(&self.sink);
        let outcome = tokio::spawn(async move { sink.on_comparison_finalized(event).await }).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let fault = EngineFault::Callback { detail: err.to_string() };
                warn!(file = %path, %fault, "comparison sink error");
            }
            Err(join_err) => {
                let fault = EngineFault::Callback { detail: join_err.to_string() };
                warn!(file = %path, %fault, "comparison sink panicked");
            }
        }
    }

    // ─── Decision helpers ────────────────────────────────────────────────

    /// Clusters that must retire before this edit is placed, with why.
    fn trigger_candidates(
        &self,
        state: &FileState,
        edit_line: usize,
        structural: bool,
        timestamp: DateTime<Utc>,
    ) -> Vec<(Uuid, FinalizeReason)> {
        state
            .active_clusters
            .iter()
            .filter_map(|cluster| {
                let different_line = cluster.last_line != edit_line;
                if different_line && cluster.idle_secs(timestamp) > self.config.delta_t {
                    Some((cluster.id, FinalizeReason::IdleTimeout))
                } else if cluster.edits.len() >= self.config.max_edits {
                    Some((cluster.id, FinalizeReason::EditLimit))
                } else if cluster.age_secs(timestamp) > self.config.max_duration {
                    Some((cluster.id, FinalizeReason::DurationLimit))
                } else if structural && different_line {
                    Some((cluster.id, FinalizeReason::StructuralDisplacement))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Clusters the edit jumped away from: outside the spatial window but
    /// still inside the temporal one.
    fn spatial_jump_candidates(
        &self,
        state: &FileState,
        edit_line: usize,
        timestamp: DateTime<Utc>,
    ) -> Vec<Uuid> {
        state
            .active_clusters
            .iter()
            .filter(|cluster| {
                !cluster
                    .current_range
                    .contains_within(edit_line, self.config.delta_l)
                    && cluster.idle_secs(timestamp) <= self.config.delta_t
            })
            .map(|c| c.id)
            .collect()
    }

    /// First active cluster that can absorb the edit: same line, or close in
    /// both time and space — and under both the edit and duration caps.
    fn select_cluster(
        &self,
        state: &FileState,
        edit_line: usize,
        timestamp: DateTime<Utc>,
    ) -> Option<usize> {
        state.active_clusters.iter().position(|cluster| {
            let same_line = edit_line == cluster.last_line;
            let within_time = cluster.idle_secs(timestamp) <= self.config.delta_t;
            let within_lines = cluster
                .current_range
                .contains_within(edit_line, self.config.delta_l);
            (same_line || (within_time && within_lines))
                && cluster.edits.len() < self.config.max_edits
                && cluster.age_secs(timestamp) <= self.config.max_duration
        })
    }
}

/// A whitespace-only edit rewrites a single line without changing its
/// trimmed content (indentation, trailing spaces, alignment). Multi-line
/// edits never qualify.
pub(crate) fn is_whitespace_only(edit: &EditEvent, current_content: &str) -> bool {
    if edit.range.start.line != edit.range.end.line {
        return false;
    }
    let line_idx = edit.range.start.line;
    let Some(line) = current_content.split('\n').nth(line_idx) else {
        return false;
    };

    let chars: Vec<char> = line.chars().collect();
    let start = edit.range.start.character.min(chars.len());
    let end = edit.range.end.character.clamp(start, chars.len());

    let mut after: String = chars[..start].iter().collect();
    after.push_str(&edit.edit_text);
    after.extend(&chars[end..]);

    line.trim() == after.trim()
}

fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}
