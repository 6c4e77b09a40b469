//! The fallback router.

use crate::error::{FallbackError, FallbackResult};
use crate::metrics::{RouterCounters, RouterMetrics};
use crate::target::FallbackTarget;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use transaction_protocol::{DeliveryError, Message, Response, Transaction, TransactionReceiver};

/// Default number of transactions routed concurrently.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1;

/// Routes each message to the first target that takes it.
///
/// Targets are tried in their configured order, each on a fresh copy of
/// the inbound message, so a processor in one target never affects what
/// the next target sees. A message is acknowledged as soon as one target
/// succeeds and rejected with the last failure once all have failed.
pub struct FallbackOutput {
    inner: Arc<Router>,
    max_in_flight: usize,
    started: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    closed_tx: Arc<watch::Sender<bool>>,
}

struct Router {
    targets: Vec<FallbackTarget>,
    counters: RouterCounters,
}

impl FallbackOutput {
    pub fn new(targets: Vec<FallbackTarget>) -> FallbackResult<Self> {
        if targets.is_empty() {
            return Err(FallbackError::NoTargets);
        }

        let counters = RouterCounters::new(targets.len());
        let (shutdown_tx, _) = watch::channel(false);
        let (closed_tx, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Router { targets, counters }),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            started: AtomicBool::new(false),
            shutdown_tx,
            closed_tx: Arc::new(closed_tx),
        })
    }

    /// Allow up to `max_in_flight` transactions to be routed at once.
    ///
    /// Transactions routed concurrently may complete out of order.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    pub fn targets(&self) -> &[FallbackTarget] {
        &self.inner.targets
    }

    /// Run one routing decision for `message`.
    pub async fn route(&self, message: &Message) -> Response {
        self.inner.route(message).await
    }

    /// Start routing transactions from `input`.
    ///
    /// Each transaction is acknowledged with the outcome of its routing.
    pub fn consume(&self, input: TransactionReceiver) -> FallbackResult<()> {
        if *self.shutdown_tx.borrow() {
            return Err(FallbackError::Closed);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(FallbackError::AlreadyStarted);
        }

        info!(
            targets = self.inner.targets.len(),
            max_in_flight = self.max_in_flight,
            "Starting fallback output"
        );

        tokio::spawn(consume_loop(
            self.inner.clone(),
            input,
            self.max_in_flight,
            self.shutdown_tx.subscribe(),
            self.closed_tx.clone(),
        ));
        Ok(())
    }

    /// Whether every target's sink reports itself reachable.
    pub fn connected(&self) -> bool {
        self.inner.targets.iter().all(|t| t.sink().connected())
    }

    /// Stop taking new transactions. Routings already underway finish.
    pub fn close_async(&self) {
        self.shutdown_tx.send_replace(true);
        if !self.started.load(Ordering::SeqCst) {
            self.closed_tx.send_replace(true);
        }
    }

    pub async fn wait_for_close(&self, timeout: Duration) -> FallbackResult<()> {
        let mut closed_rx = self.closed_tx.subscribe();
        tokio::time::timeout(timeout, signalled(&mut closed_rx))
            .await
            .map_err(|_| FallbackError::Timeout(timeout))
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    /// Whether `close_async` has been called.
    pub fn is_closing(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    pub fn metrics(&self) -> RouterMetrics {
        self.inner
            .counters
            .snapshot(self.inner.targets.iter().map(|t| t.label()))
    }
}

impl Router {
    async fn route(&self, message: &Message) -> Response {
        let mut last_error = None;

        for (index, target) in self.targets.iter().enumerate() {
            let counters = self.counters.target(index);
            counters.attempt();

            let mut copy = message.clone();
            if let Err(e) = target.processors().apply(&mut copy) {
                counters.failure();
                warn!(target_label = target.label(), error = %e, "Processor failed, trying next target");
                last_error = Some(DeliveryError::rejected(target.label(), e));
                continue;
            }

            if copy.is_empty() {
                counters.filtered();
                self.counters.routed();
                debug!(target_label = target.label(), "All parts filtered out, nothing to send");
                return Ok(());
            }

            match target.sink().attempt(&copy).await {
                Ok(()) => {
                    counters.success();
                    self.counters.routed();
                    debug!(target_label = target.label(), attempt = index + 1, "Delivered");
                    return Ok(());
                }
                Err(e) => {
                    counters.failure();
                    warn!(target_label = target.label(), error = %e, "Delivery failed, trying next target");
                    last_error = Some(DeliveryError::rejected(target.label(), e));
                }
            }
        }

        self.counters.rejected();
        let err = last_error.unwrap_or(DeliveryError::Closed);
        warn!(error = %err, "Every fallback target failed");
        Err(err)
    }
}

async fn consume_loop(
    router: Arc<Router>,
    mut input: TransactionReceiver,
    max_in_flight: usize,
    mut shutdown_rx: watch::Receiver<bool>,
    closed_tx: Arc<watch::Sender<bool>>,
) {
    let slots = Arc::new(Semaphore::new(max_in_flight));
    let mut routings = JoinSet::new();

    loop {
        // Take a slot before a transaction so nothing is received that
        // cannot be routed straight away.
        let slot = tokio::select! {
            biased;
            _ = signalled(&mut shutdown_rx) => break,
            slot = slots.clone().acquire_owned() => match slot {
                Ok(slot) => slot,
                Err(_) => break,
            },
        };

        let transaction = tokio::select! {
            biased;
            _ = signalled(&mut shutdown_rx) => break,
            received = input.recv() => match received {
                Some(transaction) => transaction,
                None => {
                    debug!("Fallback input closed");
                    break;
                }
            },
        };

        let router = router.clone();
        routings.spawn(async move {
            let _slot = slot;
            route_transaction(&router, transaction).await;
        });

        while let Some(joined) = routings.try_join_next() {
            log_join_error(joined);
        }
    }

    input.close();
    while let Some(transaction) = input.try_recv() {
        transaction.resolve(Err(DeliveryError::ShuttingDown));
    }

    if !routings.is_empty() {
        info!(in_flight = routings.len(), "Waiting for in-flight routings");
    }
    while let Some(joined) = routings.join_next().await {
        log_join_error(joined);
    }

    closed_tx.send_replace(true);
    info!("Fallback output closed");
}

async fn route_transaction(router: &Router, transaction: Transaction) {
    let (message, ack) = transaction.into_parts();
    let response = router.route(&message).await;
    if !ack.resolve(response) {
        debug!("Originator stopped waiting for the routing outcome");
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Routing task failed");
    }
}

/// Resolves once the flag is set or its sender is gone.
async fn signalled(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|set| *set).await;
}
