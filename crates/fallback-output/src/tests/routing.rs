//! Routing tests: order, exhaustion, filtering and counters.

use super::harness::{text, AttemptLog, DropAll, Explode, Outcome, Prepend, ScriptedSink};
use crate::{FallbackError, FallbackOutput, FallbackTarget, ProcessorChain, TargetMetrics};
use std::sync::Arc;
use transaction_protocol::DeliveryError;

#[test]
fn zero_targets_is_a_configuration_error() {
    let err = FallbackOutput::new(Vec::new()).err();
    assert_eq!(err, Some(FallbackError::NoTargets));
}

#[tokio::test]
async fn first_success_stops_the_walk() {
    let a = Arc::new(ScriptedSink::accepting("a"));
    let b = Arc::new(ScriptedSink::accepting("b"));
    let output =
        FallbackOutput::new(vec![FallbackTarget::new(a.clone()), FallbackTarget::new(b.clone())])
            .unwrap();

    assert_eq!(output.route(&text("hello")).await, Ok(()));
    assert_eq!(a.attempts(), 1);
    assert_eq!(b.attempts(), 0);
}

#[tokio::test]
async fn targets_are_tried_in_configured_order() {
    let log = AttemptLog::default();
    let a = Arc::new(ScriptedSink::failing("a").with_log(&log));
    let b = Arc::new(ScriptedSink::failing("b").with_log(&log));
    let c = Arc::new(ScriptedSink::accepting("c").with_log(&log));
    let output = FallbackOutput::new(vec![
        FallbackTarget::new(a),
        FallbackTarget::new(b),
        FallbackTarget::new(c),
    ])
    .unwrap();

    assert_eq!(output.route(&text("m")).await, Ok(()));
    assert_eq!(*log.lock().unwrap(), ["a", "b", "c"]);
}

#[tokio::test]
async fn exhaustion_reports_last_target_error() {
    let a = Arc::new(ScriptedSink::failing("a"));
    let b = Arc::new(ScriptedSink::failing("b"));
    let output =
        FallbackOutput::new(vec![FallbackTarget::new(a.clone()), FallbackTarget::new(b.clone())])
            .unwrap();

    let response = output.route(&text("m")).await;
    assert_eq!(
        response,
        Err(DeliveryError::rejected("b", "Rejected: b down"))
    );
    assert_eq!(a.attempts(), 1);
    assert_eq!(b.attempts(), 1);
}

#[tokio::test]
async fn a_target_may_recover_on_a_later_message() {
    let a = Arc::new(ScriptedSink::accepting("a").with_script([Outcome::Fail]));
    let b = Arc::new(ScriptedSink::accepting("b"));
    let output =
        FallbackOutput::new(vec![FallbackTarget::new(a.clone()), FallbackTarget::new(b.clone())])
            .unwrap();

    assert_eq!(output.route(&text("first")).await, Ok(()));
    assert_eq!(output.route(&text("second")).await, Ok(()));
    assert_eq!(a.attempts(), 2);
    assert_eq!(b.attempts(), 1);
}

#[tokio::test]
async fn processor_failure_counts_as_target_failure() {
    let a = Arc::new(ScriptedSink::accepting("a"));
    let b = Arc::new(ScriptedSink::accepting("b"));
    let output = FallbackOutput::new(vec![
        FallbackTarget::new(a.clone())
            .with_processors(ProcessorChain::new(vec![Arc::new(Explode)])),
        FallbackTarget::new(b.clone()),
    ])
    .unwrap();

    assert_eq!(output.route(&text("m")).await, Ok(()));
    assert_eq!(a.attempts(), 0, "sink must not see a failed chain's output");
    assert_eq!(b.attempts(), 1);
}

#[tokio::test]
async fn processor_failure_on_last_target_rejects() {
    let a = Arc::new(ScriptedSink::accepting("a"));
    let output = FallbackOutput::new(vec![FallbackTarget::new(a)
        .with_label("only")
        .with_processors(ProcessorChain::new(vec![Arc::new(Explode)]))])
    .unwrap();

    assert_eq!(
        output.route(&text("m")).await,
        Err(DeliveryError::rejected(
            "only",
            "Processor 'explode' failed: boom"
        ))
    );
}

#[tokio::test]
async fn filtered_to_zero_parts_is_success_without_a_send() {
    let a = Arc::new(ScriptedSink::failing("a"));
    let b = Arc::new(ScriptedSink::accepting("b"));
    let output = FallbackOutput::new(vec![
        FallbackTarget::new(a.clone()).with_processors(ProcessorChain::new(vec![Arc::new(DropAll)])),
        FallbackTarget::new(b.clone()),
    ])
    .unwrap();

    assert_eq!(output.route(&text("m")).await, Ok(()));
    assert_eq!(a.attempts(), 0);
    assert_eq!(b.attempts(), 0);
}

#[tokio::test]
async fn processors_run_before_the_sink() {
    let a = Arc::new(ScriptedSink::accepting("a"));
    let output = FallbackOutput::new(vec![FallbackTarget::new(a.clone())
        .with_processors(ProcessorChain::new(vec![Arc::new(Prepend("x-"))]))])
    .unwrap();

    output.route(&text("m")).await.unwrap();
    let received = a.received();
    assert_eq!(received[0].get(0).unwrap().data(), b"x-m");
}

#[tokio::test]
async fn metrics_track_each_target() {
    let a = Arc::new(ScriptedSink::failing("a"));
    let b = Arc::new(ScriptedSink::accepting("b").with_script([Outcome::Fail]));
    let output =
        FallbackOutput::new(vec![FallbackTarget::new(a), FallbackTarget::new(b)]).unwrap();

    let _ = output.route(&text("1")).await;
    let _ = output.route(&text("2")).await;

    let metrics = output.metrics();
    assert_eq!(metrics.routed, 1);
    assert_eq!(metrics.rejected, 1);
    assert_eq!(
        metrics.targets,
        vec![
            TargetMetrics {
                label: "a".into(),
                attempts: 2,
                successes: 0,
                failures: 2,
                filtered: 0,
            },
            TargetMetrics {
                label: "b".into(),
                attempts: 2,
                successes: 1,
                failures: 1,
                filtered: 0,
            },
        ]
    );
}

#[test]
fn connected_requires_every_sink() {
    let up = Arc::new(ScriptedSink::accepting("up"));
    let down = Arc::new(ScriptedSink::accepting("down").disconnected());

    let healthy = FallbackOutput::new(vec![FallbackTarget::new(up.clone())]).unwrap();
    assert!(healthy.connected());

    let degraded =
        FallbackOutput::new(vec![FallbackTarget::new(up), FallbackTarget::new(down)]).unwrap();
    assert!(!degraded.connected());
}
