//! Output channel for finalized comparisons.
//!
//! The engine is a push-only pipeline: the only thing it ever emits is a
//! [`FinalizedComparison`] per retired cluster, delivered to whatever
//! [`ComparisonSink`] the host wired in. Sink failures are the host's
//! problem — they are logged and contained so a misbehaving consumer can
//! never corrupt clustering state or stall a lane.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::cluster::model::FinalizeReason;

// ─── Event ───────────────────────────────────────────────────────────────────

/// One finalized editing episode, ready for the context builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizedComparison {
    pub file_path: String,
    /// The file's full text at cluster creation, split into lines.
    pub before_lines: Vec<String>,
    /// Rendered two-column before/after table.
    pub comparison: String,
    /// Snapshot of the file's bounded comparison history, oldest first,
    /// including this comparison. Never longer than `context_size`.
    pub recent_comparisons: Vec<String>,
    /// Why the cluster retired.
    pub reason: FinalizeReason,
    /// When the cluster retired.
    pub finalized_at: DateTime<Utc>,
}

// ─── Sink trait ──────────────────────────────────────────────────────────────

/// Consumer interface for finalized comparisons.
///
/// Called from inside the owning file's lane, so per-file delivery order
/// matches finalization order. Implementations should return quickly; a slow
/// sink delays that file's lane (other files are unaffected).
#[async_trait]
pub trait ComparisonSink: Send + Sync {
    async fn on_comparison_finalized(&self, event: FinalizedComparison) -> Result<()>;
}

/// Discards every comparison. The default when the host wires nothing in.
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl ComparisonSink for NullSink {
    async fn on_comparison_finalized(&self, _event: FinalizedComparison) -> Result<()> {
        Ok(())
    }
}

/// Forwards comparisons into an mpsc channel, turning the observer callback
/// into an event stream the host can consume at its own pace.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<FinalizedComparison>,
}

impl ChannelSink {
    /// Returns the sink and the receiving end of the stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FinalizedComparison>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ComparisonSink for ChannelSink {
    async fn on_comparison_finalized(&self, event: FinalizedComparison) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| anyhow::anyhow!("comparison receiver dropped"))
    }
}

/// Adapts a plain closure into a sink. Mostly useful in tests.
pub struct FnSink<F>(pub F);

#[async_trait]
impl<F> ComparisonSink for FnSink<F>
where
    F: Fn(FinalizedComparison) + Send + Sync,
{
    async fn on_comparison_finalized(&self, event: FinalizedComparison) -> Result<()> {
        (self.0)(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> FinalizedComparison {
        FinalizedComparison {
            file_path: "src/main.rs".into(),
            before_lines: vec!["fn main() {}".into()],
            comparison: "table".into(),
            recent_comparisons: vec!["table".into()],
            reason: FinalizeReason::Flush,
            finalized_at: DateTime::<Utc>::from_timestamp_millis(0).unwrap(),
        }
    }

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        for i in 0..3 {
            let mut event = sample_event();
            event.file_path = format!("f{i}.rs");
            sink.on_comparison_finalized(event).await.unwrap();
        }
        assert_eq!(rx.recv().await.unwrap().file_path, "f0.rs");
        assert_eq!(rx.recv().await.unwrap().file_path, "f1.rs");
        assert_eq!(rx.recv().await.unwrap().file_path, "f2.rs");
    }

    #[tokio::test]
    async fn channel_sink_errors_when_receiver_dropped() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        assert!(sink.on_comparison_finalized(sample_event()).await.is_err());
    }

    #[test]
    fn event_serde_uses_camel_case_and_reason_string() {
        let json = serde_json::to_string(&sample_event()).unwrap();
        assert!(json.contains("\"filePath\""));
        assert!(json.contains("\"recentComparisons\""));
        assert!(json.contains("\"reason\":\"flush\""));
    }
}
