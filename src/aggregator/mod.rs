//! The edit aggregator façade.
//!
//! One [`EditAggregator`] owns all per-file state for one workspace or
//! session. It is an ordinary value — construct as many as you need; two
//! instances never share anything. Ingestion is fire-and-forget: faults are
//! absorbed and logged inside the file lanes, and the only output is the
//! stream of finalized comparisons delivered to the configured sink.
//!
//! ```no_run
//! use std::sync::Arc;
//! use editstream::{ChannelSink, EditAggregator, EngineConfig};
//!
//! # async fn demo(edit: editstream::EditEvent) {
//! let (sink, mut comparisons) = ChannelSink::new();
//! let aggregator = EditAggregator::with_sink(EngineConfig::default(), Arc::new(sink));
//!
//! aggregator.process_edit(edit).await;
//! aggregator.finalize_all_clusters().await;
//! if let Some(finalized) = comparisons.recv().await {
//!     println!("{}", finalized.comparison);
//! }
//! # }
//! ```

pub(crate) mod lane;

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::RwLock;
use tracing::debug;

use crate::cluster::engine::ClusterEngine;
use crate::cluster::model::EditEvent;
use crate::config::EngineConfig;
use crate::sink::{ComparisonSink, NullSink};
use self::lane::FileLane;

/// Groups a live stream of fine-grained edits into edit episodes.
pub struct EditAggregator {
    engine: Arc<ClusterEngine>,
    lanes: RwLock<HashMap<String, FileLane>>,
}

impl EditAggregator {
    /// An aggregator that discards finalized comparisons. Useful when only
    /// the in-progress view or the metrics are of interest.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_sink(config, Arc::new(NullSink))
    }

    /// An aggregator delivering every finalized comparison to `sink`.
    pub fn with_sink(config: EngineConfig, sink: Arc<dyn ComparisonSink>) -> Self {
        Self {
            engine: Arc::new(ClusterEngine::new(config, sink)),
            lanes: RwLock::new(HashMap::new()),
        }
    }

    /// Enqueue one edit on its file's lane, creating the lane on first
    /// sight. The edit is stamped with its own capture timestamp, or with
    /// the ingestion time when it carries none.
    pub async fn process_edit(&self, edit: EditEvent) {
        let timestamp = edit.timestamp.unwrap_or_else(Utc::now);
        self.process_edit_at(edit, timestamp).await;
    }

    /// Enqueue one edit with an explicit timestamp.
    pub async fn process_edit_at(&self, edit: EditEvent, timestamp: DateTime<Utc>) {
        // Fast path: lane already exists.
        {
            let lanes = self.lanes.read().await;
            if let Some(lane) = lanes.get(&edit.filepath) {
                lane.submit(edit, timestamp);
                return;
            }
        }

        let mut lanes = self.lanes.write().await;
        // Re-check under the write lock; another caller may have raced us.
        let lane = lanes.entry(edit.filepath.clone()).or_insert_with(|| {
            FileLane::spawn(
                edit.filepath.clone(),
                edit.file_contents.clone(),
                Arc::clone(&self.engine),
            )
        });
        lane.submit(edit, timestamp);
    }

    /// Enqueue a batch in array order, all sharing one timestamp.
    pub async fn process_edits(&self, edits: Vec<EditEvent>) {
        let timestamp = Utc::now();
        if self.engine.config().verbose {
            debug!(count = edits.len(), "queueing edit batch");
        }
        for edit in edits {
            self.process_edit_at(edit, timestamp).await;
        }
    }

    /// Finalize every active cluster of every file. Files are flushed
    /// concurrently; within one file the flush runs after everything
    /// already queued on that lane. Resolves once all sinks have been
    /// invoked.
    pub async fn finalize_all_clusters(&self) {
        let acks: Vec<_> = {
            let lanes = self.lanes.read().await;
            lanes.values().filter_map(|lane| lane.flush()).collect()
        };
        join_all(acks).await;
    }

    /// Total active clusters across all files.
    pub async fn active_cluster_count(&self) -> usize {
        let lanes = self.lanes.read().await;
        let mut count = 0;
        for lane in lanes.values() {
            count += lane.state.lock().await.active_clusters.len();
        }
        count
    }

    /// Edits submitted but not yet processed, across all files.
    pub async fn processing_queue_size(&self) -> usize {
        let lanes = self.lanes.read().await;
        lanes
            .values()
            .map(|lane| lane.queued.load(Ordering::SeqCst))
            .sum()
    }

    /// Comparison of the earliest active cluster's snapshot against the
    /// file's current content, without finalizing. `None` for unknown
    /// files, files with no active cluster, or whitespace-only drift.
    pub async fn in_progress_comparison(&self, file_path: &str) -> Option<String> {
        let lanes = self.lanes.read().await;
        let lane = lanes.get(file_path)?;
        let state = lane.state.lock().await;
        self.engine.in_progress_comparison(file_path, &state).await
    }

    /// Drop all per-file state. Lanes with queued work finish it against
    /// state that is no longer reachable from this aggregator, then exit.
    pub async fn reset_state(&self) {
        self.lanes.write().await.clear();
    }
}

impl std::fmt::Debug for EditAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditAggregator").finish_non_exhaustive()
    }
}
