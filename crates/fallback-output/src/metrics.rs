//! Delivery counters for the router and each of its targets.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct TargetCounters {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    filtered: AtomicU64,
}

impl TargetCounters {
    pub(crate) fn attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self, label: &str) -> TargetMetrics {
        TargetMetrics {
            label: label.to_string(),
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug)]
pub(crate) struct RouterCounters {
    routed: AtomicU64,
    rejected: AtomicU64,
    targets: Vec<TargetCounters>,
}

impl RouterCounters {
    pub(crate) fn new(targets: usize) -> Self {
        Self {
            routed: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            targets: (0..targets).map(|_| TargetCounters::default()).collect(),
        }
    }

    pub(crate) fn target(&self, index: usize) -> &TargetCounters {
        &self.targets[index]
    }

    pub(crate) fn routed(&self) {
        self.routed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot<'a>(&self, labels: impl Iterator<Item = &'a str>) -> RouterMetrics {
        RouterMetrics {
            routed: self.routed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            targets: self
                .targets
                .iter()
                .zip(labels)
                .map(|(counters, label)| counters.snapshot(label))
                .collect(),
        }
    }
}

/// Counters for one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetMetrics {
    pub label: String,
    /// Times this target was tried
    pub attempts: u64,
    /// Sink accepted the message
    pub successes: u64,
    /// Processor or sink failure
    pub failures: u64,
    /// Processors removed every part, so the sink was skipped
    pub filtered: u64,
}

/// Point-in-time router counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouterMetrics {
    /// Messages some target took care of
    pub routed: u64,
    /// Messages every target failed
    pub rejected: u64,
    pub targets: Vec<TargetMetrics>,
}
