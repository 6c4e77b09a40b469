//! Shutdown tests: closing waits for the in-flight entry only.

use super::harness::{text, BufferHarness, Reply, ScriptedConsumer, STEP};
use crate::{BufferConfig, BufferError};
use std::time::Duration;
use transaction_protocol::DeliveryError;

#[tokio::test]
async fn close_times_out_while_delivery_in_flight() {
    let mut harness = BufferHarness::start(BufferConfig::default());
    let consumer = ScriptedConsumer::new([Reply::Hold]);
    let task = consumer.spawn(harness.take_output());

    assert_eq!(harness.produce_acked(text("slow")).await, Ok(()));
    consumer.wait_for_received(1).await;

    harness.buffer.close_async();
    let short = Duration::from_millis(50);
    assert_eq!(
        harness.buffer.wait_for_close(short).await,
        Err(BufferError::Timeout(short))
    );
    assert!(!harness.buffer.is_closed());

    consumer.release_held();
    harness.buffer.wait_for_close(STEP).await.unwrap();
    assert_eq!(consumer.held_count(), 0);

    tokio::time::timeout(STEP, task).await.unwrap().unwrap();
}

#[tokio::test]
async fn close_discards_undelivered_entries() {
    let mut harness = BufferHarness::start(BufferConfig::default());
    let consumer = ScriptedConsumer::new([Reply::Hold]);
    let task = consumer.spawn(harness.take_output());

    for label in ["one", "two", "three"] {
        assert_eq!(harness.produce_acked(text(label)).await, Ok(()));
    }
    consumer.wait_for_received(1).await;

    harness.buffer.close_async();
    consumer.release_held();
    harness.buffer.wait_for_close(STEP).await.unwrap();

    // Only the in-flight entry made it out.
    assert_eq!(consumer.received(), ["one"]);
    assert_eq!(harness.buffer.status().pending, 2);
    task.await.unwrap();
}

#[tokio::test]
async fn input_after_close_is_refused() {
    let harness = BufferHarness::start(BufferConfig::default());

    harness.buffer.close_async();
    harness.buffer.wait_for_close(STEP).await.unwrap();

    let response = harness.produce_acked(text("late")).await;
    assert_eq!(response, Err(DeliveryError::Closed));
}

#[tokio::test]
async fn close_is_idempotent() {
    let harness = BufferHarness::start(BufferConfig::default());

    harness.buffer.close_async();
    harness.buffer.close_async();
    harness.buffer.wait_for_close(STEP).await.unwrap();
    harness.buffer.wait_for_close(STEP).await.unwrap();
}
