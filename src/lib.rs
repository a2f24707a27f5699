//! editstream — edit-stream aggregation engine.
//!
//! Consumes the live stream of fine-grained file edits an editor emits
//! while the user types, and groups them into coherent *edit episodes*
//! (clusters) using spatial and temporal windows. Each retiring episode is
//! rendered into a before/after comparison and handed to the host's
//! [`ComparisonSink`] — the raw material for next-edit suggestion context.
//!
//! Design in one paragraph: every file path gets its own strictly-ordered
//! ingestion lane (a worker task over an mpsc channel), so same-file edits
//! are applied one at a time in submission order while different files
//! proceed independently. Per edit, the cluster engine retires clusters
//! that hit a finalization trigger (idle gap on another line, edit count,
//! lifetime, structural displacement, spatial jump), then attaches the edit
//! to the first cluster still close enough in time and line distance — or
//! starts a new one. Finalization renders the episode's comparison, records
//! it in a bounded per-file history, and emits it; sink failures are
//! contained and can never corrupt clustering state.
//!
//! The capture layer producing [`EditEvent`]s, the consumer of finalized
//! comparisons, and any persistence are external to this crate.

pub mod aggregator;
pub mod cluster;
pub mod comparison;
pub mod config;
pub mod error;
pub mod sink;

pub use aggregator::EditAggregator;
pub use cluster::model::{EditEvent, EditRange, FinalizeReason, LineRange, Position};
pub use config::EngineConfig;
pub use error::EngineFault;
pub use sink::{ChannelSink, ComparisonSink, FinalizedComparison, FnSink, NullSink};
