//! Ordering tests: entries leave the buffer in the order they arrived.

use super::harness::{text, BufferHarness, ScriptedConsumer, STEP};
use crate::BufferConfig;

#[tokio::test]
async fn delivers_in_arrival_order() {
    let mut harness = BufferHarness::start(BufferConfig::default());
    let consumer = ScriptedConsumer::new([]);
    let task = consumer.spawn(harness.take_output());

    let labels = ["p1", "p2", "p3", "p4", "p5"];
    for label in labels {
        assert_eq!(harness.produce_acked(text(label)).await, Ok(()));
    }

    consumer.wait_for_received(labels.len()).await;
    assert_eq!(consumer.received(), labels);

    harness.buffer.close_async();
    harness.buffer.wait_for_close(STEP).await.unwrap();
    task.await.unwrap();
}

#[tokio::test]
async fn acks_producer_before_consumer_reads() {
    let mut harness = BufferHarness::start(BufferConfig::default());
    let _output = harness.take_output();

    // Nobody reads the output, yet every store is acknowledged.
    for label in ["a", "b", "c"] {
        assert_eq!(harness.produce_acked(text(label)).await, Ok(()));
    }
    assert_eq!(harness.buffer.status().pending, 3);
}

#[tokio::test]
async fn drains_remaining_entries_after_input_closes() {
    let mut harness = BufferHarness::start(BufferConfig::default());
    let output = harness.take_output();

    for label in ["x", "y", "z"] {
        assert_eq!(harness.produce_acked(text(label)).await, Ok(()));
    }
    drop(harness.producer);

    let consumer = ScriptedConsumer::new([]);
    let task = consumer.spawn(output);

    // The consumer loop ends once the buffer drops its output.
    tokio::time::timeout(STEP, task).await.unwrap().unwrap();
    assert_eq!(consumer.received(), ["x", "y", "z"]);

    harness.buffer.wait_for_close(STEP).await.unwrap();
    assert!(harness.buffer.is_closed());
    assert_eq!(harness.buffer.status().used_bytes, 0);
}
