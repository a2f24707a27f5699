//! Per-file ingestion lanes.
//!
//! Each file path gets one worker task fed by an unbounded mpsc channel.
//! That single consumer is the whole ordering story: edits for a file are
//! applied strictly in submission order, lanes for different files share
//! nothing, and no drain loop can ever race another on the same file. The
//! worker yields once between tasks so a burst on one file cannot starve
//! its siblings on the same runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::warn;

use crate::cluster::engine::{ClusterEngine, FileState};
use crate::cluster::model::EditEvent;
use crate::error::EngineFault;

pub(crate) enum LaneCommand {
    Edit {
        edit: EditEvent,
        timestamp: DateTime<Utc>,
    },
    /// Finalize every active cluster, then ack.
    Flush { ack: oneshot::Sender<()> },
}

/// Handle to one file's lane: the submission side plus shared views the
/// aggregator reads for metrics. Dropping the handle closes the channel;
/// the worker drains what was already queued and exits.
pub(crate) struct FileLane {
    tx: mpsc::UnboundedSender<LaneCommand>,
    /// Mutated only by the worker; metrics and the in-progress accessor
    /// take short locks between tasks.
    pub state: Arc<Mutex<FileState>>,
    /// Edits submitted but not yet fully processed.
    pub queued: Arc<AtomicUsize>,
}

impl FileLane {
    /// Spawn the worker for `path`. `initial_content` seeds the file state
    /// from the first-seen edit's resulting text.
    pub fn spawn(path: String, initial_content: String, engine: Arc<ClusterEngine>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(FileState::new(initial_content)));
        let queued = Arc::new(AtomicUsize::new(0));

        tokio::spawn(drain(path, rx, Arc::clone(&state), Arc::clone(&queued), engine));

        Self { tx, state, queued }
    }

    /// Enqueue an edit. Returns immediately; never fails from the caller's
    /// point of view (a closed lane only happens after `reset_state`, when
    /// the edit has nowhere meaningful to go anyway).
    pub fn submit(&self, edit: EditEvent, timestamp: DateTime<Utc>) {
        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(LaneCommand::Edit { edit, timestamp }).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Ask the lane to finalize all active clusters after everything already
    /// queued. The returned receiver resolves when the flush has completed.
    pub fn flush(&self) -> Option<oneshot::Receiver<()>> {
        let (ack, rx) = oneshot::channel();
        self.tx.send(LaneCommand::Flush { ack }).ok()?;
        Some(rx)
    }
}

/// Worker loop: pop one task, process it fully, yield, repeat.
///
/// A failed task is logged with file context and abandoned; the lane
/// continues with the next item. This is the drain boundary of the error
/// design — nothing thrown here ever reaches a caller.
async fn drain(
    path: String,
    mut rx: mpsc::UnboundedReceiver<LaneCommand>,
    state: Arc<Mutex<FileState>>,
    queued: Arc<AtomicUsize>,
    engine: Arc<ClusterEngine>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            LaneCommand::Edit { edit, timestamp } => {
                {
                    let mut state = state.lock().await;
                    if let Err(source) = engine.process_edit(&path, edit, timestamp, &mut state).await
                    {
                        let fault = EngineFault::Processing { source };
                        warn!(file = %path, %fault, "abandoning queued edit");
                    }
                }
                queued.fetch_sub(1, Ordering::SeqCst);
            }
            LaneCommand::Flush { ack } => {
                {
                    let mut state = state.lock().await;
                    engine.flush_file(&path, &mut state).await;
                }
                let _ = ack.send(());
            }
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::model::{EditRange, Position};
    use crate::config::EngineConfig;
    use crate::sink::NullSink;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(ms).unwrap()
    }

    fn edit_at_line(line: usize, contents: &str) -> EditEvent {
        EditEvent {
            filepath: "lane.rs".into(),
            file_contents: contents.to_string(),
            range: EditRange {
                start: Position { line, character: 0 },
                end: Position { line, character: 0 },
            },
            edit_text: "x".into(),
            timestamp: None,
        }
    }

    async fn drained(lane: &FileLane) {
        while lane.queued.load(Ordering::SeqCst) > 0 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn lane_processes_edits_in_submission_order() {
        let engine = Arc::new(ClusterEngine::new(EngineConfig::default(), Arc::new(NullSink)));
        let lane = FileLane::spawn("lane.rs".into(), "v0".into(), engine);

        for i in 1..=20 {
            lane.submit(edit_at_line(0, &format!("v{i}")), at(i * 10));
        }
        drained(&lane).await;

        let state = lane.state.lock().await;
        assert_eq!(state.current_content, "v20");
        assert_eq!(state.active_clusters.len(), 1);
        assert_eq!(state.active_clusters[0].edits.len(), 20);
    }

    #[tokio::test]
    async fn flush_acks_after_queued_edits() {
        let engine = Arc::new(ClusterEngine::new(EngineConfig::default(), Arc::new(NullSink)));
        let lane = FileLane::spawn("lane.rs".into(), "v0".into(), engine);

        lane.submit(edit_at_line(0, "v1"), at(0));
        lane.submit(edit_at_line(0, "v2"), at(10));
        let ack = lane.flush().unwrap();
        ack.await.unwrap();

        let state = lane.state.lock().await;
        assert!(state.active_clusters.is_empty());
        assert_eq!(state.current_content, "v2", "flush ran after both edits");
        assert_eq!(state.prior_comparisons.len(), 1);
    }

    #[tokio::test]
    async fn queue_depth_tracks_submissions() {
        let engine = Arc::new(ClusterEngine::new(EngineConfig::default(), Arc::new(NullSink)));
        let lane = FileLane::spawn("lane.rs".into(), "v0".into(), engine);

        lane.submit(edit_at_line(0, "v1"), at(0));
        lane.submit(edit_at_line(0, "v2"), at(10));
        drained(&lane).await;
        assert_eq!(lane.queued.load(Ordering::SeqCst), 0);
    }
}
