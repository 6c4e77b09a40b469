//! The memory buffer agent: a single-task reactor between two handoffs.

use crate::config::BufferConfig;
use crate::error::{BufferError, BufferResult};
use crate::queue::{BufferQueue, BufferStatus};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use transaction_protocol::{
    transaction_channel, AckHandle, AckReceiver, DeliveryError, Response, Transaction,
    TransactionReceiver, TransactionSender,
};

/// Capacity of the out-of-band error channel, in batches.
pub const ERRORS_CHANNEL_CAPACITY: usize = 1;

/// Channels a started buffer hands to its downstream consumer.
#[derive(Debug)]
pub struct BufferOutputs {
    /// Buffered messages, oldest first, one in flight at a time.
    pub transactions: TransactionReceiver,
    /// Deduplicated delivery failures, published without blocking the flow.
    pub errors: mpsc::Receiver<Vec<DeliveryError>>,
}

/// Bounded FIFO buffer decoupling a producer from a consumer.
///
/// Upstream transactions are acknowledged once stored. While the stored
/// bytes exceed the limit the latest acknowledgement is held back and no
/// further input is read, which blocks the producer without failing it.
/// Downstream, the head entry is redelivered until the consumer accepts it.
pub struct MemoryBuffer {
    config: BufferConfig,
    queue: Arc<Mutex<BufferQueue>>,
    started: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    closed_tx: Arc<watch::Sender<bool>>,
}

impl MemoryBuffer {
    pub fn new(config: BufferConfig) -> Self {
        let queue = Arc::new(Mutex::new(BufferQueue::new(config.limit)));
        let (shutdown_tx, _) = watch::channel(false);
        let (closed_tx, _) = watch::channel(false);

        Self {
            config,
            queue,
            started: AtomicBool::new(false),
            shutdown_tx,
            closed_tx: Arc::new(closed_tx),
        }
    }

    /// Start brokering `input` to the returned outputs.
    ///
    /// Spawns the reactor task, so this must run inside a tokio runtime.
    pub fn start(&self, input: TransactionReceiver) -> BufferResult<BufferOutputs> {
        if *self.shutdown_tx.borrow() {
            return Err(BufferError::Closed);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(BufferError::AlreadyStarted);
        }

        let (output_tx, output_rx) = transaction_channel();
        let (errors_tx, errors_rx) = mpsc::channel(ERRORS_CHANNEL_CAPACITY);

        let reactor = Reactor {
            queue: self.queue.clone(),
            retry_delay: self.config.retry_delay,
            input: Some(input),
            output: output_tx,
            errors_tx,
            shutdown_rx: self.shutdown_tx.subscribe(),
            closed_tx: self.closed_tx.clone(),
        };

        info!(limit = self.config.limit, "Starting memory buffer");
        tokio::spawn(reactor.run());

        Ok(BufferOutputs {
            transactions: output_rx,
            errors: errors_rx,
        })
    }

    /// Ask the buffer to stop. Never blocks; not reversible.
    pub fn close_async(&self) {
        self.shutdown_tx.send_replace(true);
        if !self.started.load(Ordering::SeqCst) {
            self.closed_tx.send_replace(true);
        }
    }

    /// Wait until the reactor has released its channels.
    pub async fn wait_for_close(&self, timeout: Duration) -> BufferResult<()> {
        let mut closed_rx = self.closed_tx.subscribe();
        tokio::time::timeout(timeout, closed(&mut closed_rx))
            .await
            .map_err(|_| BufferError::Timeout(timeout))
    }

    /// Whether the reactor has exited.
    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    pub fn status(&self) -> BufferStatus {
        self.queue.lock().status()
    }
}

/// Failures waiting to be published, deduplicated by value.
#[derive(Debug, Default)]
struct PendingErrors {
    seen: HashSet<DeliveryError>,
    ordered: Vec<DeliveryError>,
}

impl PendingErrors {
    fn record(&mut self, err: DeliveryError) -> bool {
        if self.seen.insert(err.clone()) {
            self.ordered.push(err);
            true
        } else {
            false
        }
    }

    fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    fn take(&mut self) -> Vec<DeliveryError> {
        self.seen.clear();
        std::mem::take(&mut self.ordered)
    }
}

/// Reactor state. Each loop iteration derives the set of enabled events
/// from these fields, waits for the first one and applies its transition.
struct Reactor {
    queue: Arc<Mutex<BufferQueue>>,
    retry_delay: Duration,
    input: Option<TransactionReceiver>,
    output: TransactionSender,
    errors_tx: mpsc::Sender<Vec<DeliveryError>>,
    shutdown_rx: watch::Receiver<bool>,
    closed_tx: Arc<watch::Sender<bool>>,
}

impl Reactor {
    async fn run(self) {
        let Reactor {
            queue,
            retry_delay,
            mut input,
            output,
            errors_tx,
            mut shutdown_rx,
            closed_tx,
        } = self;

        let mut deferred_ack: Option<AckHandle> = None;
        let mut in_flight: Option<AckReceiver> = None;
        let mut retry_at: Option<Instant> = None;
        let mut errors = PendingErrors::default();
        let mut closing = false;

        loop {
            if !closing && *shutdown_rx.borrow_and_update() {
                info!("Memory buffer closing");
                closing = true;
            }

            let (has_entries, limit_reached) = {
                let q = queue.lock();
                (!q.is_empty(), q.limit_reached())
            };

            if !limit_reached {
                if let Some(ack) = deferred_ack.take() {
                    debug!("Usage back under limit, releasing upstream ack");
                    ack.accept();
                }
            }

            if closing && in_flight.is_none() {
                break;
            }
            if input.is_none() && !has_entries && in_flight.is_none() {
                debug!("Input closed and buffer drained");
                break;
            }

            let accepting = !closing && input.is_some() && deferred_ack.is_none() && !limit_reached;
            let delivering = !closing && has_entries && in_flight.is_none() && retry_at.is_none();
            let awaiting_ack = in_flight.is_some();
            let retry_pending = !closing && retry_at.is_some();
            let publishing = !errors.is_empty();

            tokio::select! {
                // Only wakes the loop; the flag is read at the top.
                changed = shutdown_rx.changed(), if !closing => {
                    if changed.is_err() {
                        closing = true;
                    }
                }

                maybe = recv_input(&mut input), if accepting => match maybe {
                    Some(transaction) => {
                        let (message, ack) = transaction.into_parts();
                        let exceeded = queue.lock().push(message);
                        if exceeded {
                            debug!("Buffer limit exceeded, deferring upstream ack");
                            deferred_ack = Some(ack);
                        } else {
                            ack.accept();
                        }
                    }
                    None => {
                        debug!("Buffer input closed");
                        input = None;
                    }
                },

                response = await_ack(&mut in_flight), if awaiting_ack => {
                    in_flight = None;
                    on_delivery_response(&queue, response, &mut errors, &mut retry_at, retry_delay);
                }

                _ = sleep_until(retry_at), if retry_pending => {
                    retry_at = None;
                }

                permit = output.reserve(), if delivering => match permit {
                    Ok(permit) => {
                        let head = queue.lock().pop();
                        if let Some(message) = head {
                            match Transaction::new(message) {
                                Ok((transaction, ack)) => {
                                    permit.send(transaction);
                                    in_flight = Some(ack);
                                }
                                Err(e) => {
                                    warn!(error = %e, "Discarding undeliverable buffer entry");
                                    queue.lock().shift();
                                }
                            }
                        }
                    }
                    Err(_) => {
                        warn!("Buffer consumer went away, stopping");
                        break;
                    }
                },

                permit = errors_tx.reserve(), if publishing => match permit {
                    Ok(permit) => permit.send(errors.take()),
                    Err(_) => {
                        errors.take();
                    }
                },
            }
        }

        if let Some(ack) = deferred_ack.take() {
            ack.reject(DeliveryError::ShuttingDown);
        }
        if let Some(mut rx) = input.take() {
            rx.close();
            while let Some(transaction) = rx.try_recv() {
                transaction.resolve(Err(DeliveryError::ShuttingDown));
            }
        }

        let status = queue.lock().status();
        if status.pending > 0 {
            warn!(
                pending = status.pending,
                used_bytes = status.used_bytes,
                "Memory buffer closed with undelivered entries"
            );
        }

        drop(output);
        drop(errors_tx);
        closed_tx.send_replace(true);
        info!("Memory buffer closed");
    }
}

fn on_delivery_response(
    queue: &Mutex<BufferQueue>,
    response: Response,
    errors: &mut PendingErrors,
    retry_at: &mut Option<Instant>,
    retry_delay: Duration,
) {
    match response {
        Ok(()) => {
            let released = queue.lock().shift();
            debug!(released_bytes = ?released, "Buffer entry forwarded");
        }
        Err(e) => {
            if errors.record(e.clone()) {
                warn!(error = %e, "Buffer delivery failed, entry stays at head");
            }
            if !retry_delay.is_zero() {
                *retry_at = Some(Instant::now() + retry_delay);
            }
        }
    }
}

async fn closed(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}

async fn recv_input(input: &mut Option<TransactionReceiver>) -> Option<Transaction> {
    match input {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn await_ack(in_flight: &mut Option<AckReceiver>) -> Response {
    match in_flight {
        Some(ack) => ack.await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
