//! Aggregator façade tests: lifecycle, metrics, flushing, and fault
//! isolation across the ingestion pipeline.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use editstream::{
    ChannelSink, ComparisonSink, EditAggregator, EditEvent, EditRange, EngineConfig,
    FinalizeReason, FinalizedComparison, FnSink, Position,
};

type Events = Arc<Mutex<Vec<FinalizedComparison>>>;

fn recording_sink() -> (Arc<dyn ComparisonSink>, Events) {
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let tap = Arc::clone(&events);
    let sink: Arc<dyn ComparisonSink> =
        Arc::new(FnSink(move |event| tap.lock().unwrap().push(event)));
    (sink, events)
}

fn at(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap()
}

fn edit(path: &str, line: usize, text: &str, contents: &str, ts_ms: i64) -> EditEvent {
    EditEvent {
        filepath: path.to_string(),
        file_contents: contents.to_string(),
        range: EditRange {
            start: Position { line, character: 0 },
            end: Position { line, character: 0 },
        },
        edit_text: text.to_string(),
        timestamp: Some(at(ts_ms)),
    }
}

async fn drained(aggregator: &EditAggregator) {
    while aggregator.processing_queue_size().await > 0 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn files_get_independent_clusters() {
    let aggregator = EditAggregator::new(EngineConfig::default());

    aggregator.process_edit(edit("a.rs", 3, "x", "alpha\nbeta\ngamma\ndelta", 0)).await;
    aggregator.process_edit(edit("b.rs", 7, "y", "one\ntwo\nthree\nfour\nfive\nsix\nseven\neight", 0)).await;
    drained(&aggregator).await;

    assert_eq!(aggregator.active_cluster_count().await, 2);
}

#[tokio::test]
async fn finalize_all_flushes_every_file_concurrently() {
    let (sink, events) = recording_sink();
    let aggregator = EditAggregator::with_sink(EngineConfig::default(), sink);

    for path in ["a.rs", "b.rs", "c.rs"] {
        aggregator.process_edit(edit(path, 0, "x", "content", 0)).await;
    }
    aggregator.finalize_all_clusters().await;

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 3);
    assert!(events.iter().all(|e| e.reason == FinalizeReason::Flush));
    let mut paths: Vec<_> = events.iter().map(|e| e.file_path.clone()).collect();
    paths.sort();
    assert_eq!(paths, ["a.rs", "b.rs", "c.rs"]);
}

#[tokio::test]
async fn finalize_all_is_safe_on_empty_aggregator() {
    let aggregator = EditAggregator::new(EngineConfig::default());
    aggregator.finalize_all_clusters().await;
    assert_eq!(aggregator.active_cluster_count().await, 0);
}

#[tokio::test]
async fn reset_state_clears_everything_immediately() {
    let aggregator = EditAggregator::new(EngineConfig::default());

    aggregator.process_edit(edit("a.rs", 0, "x", "v1", 0)).await;
    aggregator.process_edit(edit("b.rs", 0, "y", "v1", 0)).await;
    drained(&aggregator).await;
    assert_eq!(aggregator.active_cluster_count().await, 2);

    aggregator.reset_state().await;
    assert_eq!(aggregator.active_cluster_count().await, 0);
    assert_eq!(aggregator.processing_queue_size().await, 0);

    // The aggregator is still usable after a reset.
    aggregator.process_edit(edit("a.rs", 0, "z", "v2", 1000)).await;
    drained(&aggregator).await;
    assert_eq!(aggregator.active_cluster_count().await, 1);
}

#[tokio::test]
async fn process_edits_keeps_array_order() {
    let aggregator = EditAggregator::new(EngineConfig::default());

    let batch: Vec<EditEvent> = (1..=10)
        .map(|i| {
            let mut e = edit("batch.rs", 0, "k", &format!("v{i}"), 0);
            e.timestamp = None; // the batch gets one shared timestamp
            e
        })
        .collect();
    aggregator.process_edits(batch).await;
    drained(&aggregator).await;

    // All ten edits share a timestamp and a line: one cluster, and the
    // final content is the last element's.
    assert_eq!(aggregator.active_cluster_count().await, 1);
    let rendered = aggregator.in_progress_comparison("batch.rs").await;
    // v1 seeded the state and v10 is current; the drift shows v10.
    assert!(rendered.unwrap().contains("v10"));
}

#[tokio::test]
async fn oversized_edits_are_dropped_silently() {
    let (sink, events) = recording_sink();
    let aggregator = EditAggregator::with_sink(EngineConfig::default(), sink);

    let mut big = edit("big.rs", 0, "", "content", 0);
    big.edit_text = "x".repeat(2000);
    aggregator.process_edit(big).await;
    drained(&aggregator).await;

    assert_eq!(aggregator.active_cluster_count().await, 0);
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn panicking_sink_does_not_poison_the_lane() {
    let exploded = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&exploded);
    let events: Events = Arc::new(Mutex::new(Vec::new()));
    let tap = Arc::clone(&events);
    let sink: Arc<dyn ComparisonSink> = Arc::new(FnSink(move |event: FinalizedComparison| {
        if !flag.swap(true, Ordering::SeqCst) {
            panic!("sink exploded on first delivery");
        }
        tap.lock().unwrap().push(event);
    }));
    let aggregator = EditAggregator::with_sink(EngineConfig::default(), sink);

    // First finalize panics inside the sink; the lane must keep going.
    aggregator.process_edit(edit("p.rs", 10, "a", "one\n".repeat(40).trim_end(), 0)).await;
    aggregator.process_edit(edit("p.rs", 30, "b", "two\n".repeat(40).trim_end(), 1500)).await;
    drained(&aggregator).await;
    assert!(exploded.load(Ordering::SeqCst));
    assert_eq!(aggregator.active_cluster_count().await, 1);

    // Second finalize is delivered normally.
    aggregator.finalize_all_clusters().await;
    assert_eq!(events.lock().unwrap().len(), 1);
    assert_eq!(aggregator.active_cluster_count().await, 0);
}

#[tokio::test]
async fn closed_channel_sink_does_not_stall_the_engine() {
    let (sink, rx) = ChannelSink::new();
    drop(rx);
    let aggregator = EditAggregator::with_sink(EngineConfig::default(), Arc::new(sink));

    aggregator.process_edit(edit("c.rs", 0, "x", "v1", 0)).await;
    aggregator.finalize_all_clusters().await;
    assert_eq!(aggregator.active_cluster_count().await, 0);

    // Still ingesting fine afterwards.
    aggregator.process_edit(edit("c.rs", 0, "y", "v2", 5000)).await;
    drained(&aggregator).await;
    assert_eq!(aggregator.active_cluster_count().await, 1);
}

#[tokio::test]
async fn channel_sink_streams_finalizations_in_file_order() {
    let (sink, mut rx) = ChannelSink::new();
    let aggregator = EditAggregator::with_sink(EngineConfig::default(), Arc::new(sink));

    // Two distant slow edits on one file: the first cluster finalizes when
    // the second edit arrives, the second on flush.
    aggregator.process_edit(edit("s.rs", 0, "a", "v1\n".repeat(40).trim_end(), 0)).await;
    aggregator.process_edit(edit("s.rs", 30, "b", "v2\n".repeat(40).trim_end(), 5000)).await;
    aggregator.finalize_all_clusters().await;

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    assert_eq!(first.reason, FinalizeReason::IdleTimeout);
    assert_eq!(second.reason, FinalizeReason::Flush);
}

#[tokio::test]
async fn queue_size_reflects_pending_work_then_drains() {
    let aggregator = EditAggregator::new(EngineConfig::default());

    for i in 0..50i64 {
        aggregator.process_edit(edit("q.rs", 0, "x", &format!("v{i}"), i)).await;
    }
    drained(&aggregator).await;
    assert_eq!(aggregator.processing_queue_size().await, 0);
    assert_eq!(aggregator.active_cluster_count().await, 1);
}
