//! Fault taxonomy for the ingestion pipeline.
//!
//! The public API is fire-and-forget: none of these ever cross it. They
//! exist to classify the log lines emitted where faults are absorbed — the
//! lane drain boundary and the sink call site. The only externally visible
//! symptom of any fault is a missing finalized comparison.

use thiserror::Error;

/// A fault absorbed inside the engine.
#[derive(Debug, Error)]
pub enum EngineFault {
    /// Edit text exceeded `max_edit_size`; the edit was dropped before
    /// clustering.
    #[error("edit of {size} chars exceeds max_edit_size {limit}")]
    ValidationDrop { size: usize, limit: usize },

    /// A queued edit failed mid-processing. Its partial effect on cluster
    /// state is abandoned and the lane moves to the next item.
    #[error("edit processing failed: {source}")]
    Processing {
        #[source]
        source: anyhow::Error,
    },

    /// The external comparison sink returned an error or panicked.
    #[error("comparison sink failed: {detail}")]
    Callback { detail: String },
}
