//! Transactions, acknowledgement handles and the handoff channel.

use crate::error::{DeliveryError, Response};
use crate::message::Message;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::error;
use uuid::Uuid;

/// Capacity of the handoff channel between two stages.
///
/// One slot keeps the handoff synchronous: a second send suspends until the
/// receiver has taken the first transaction.
pub const HANDOFF_CAPACITY: usize = 1;

/// A message plus its single-use acknowledgement handle.
#[derive(Debug)]
pub struct Transaction {
    message: Message,
    ack: AckHandle,
}

impl Transaction {
    /// Create a transaction and the receiver its originator waits on.
    pub fn new(message: Message) -> Result<(Self, AckReceiver), DeliveryError> {
        if message.is_empty() {
            return Err(DeliveryError::EmptyMessage);
        }

        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();

        Ok((
            Self {
                message,
                ack: AckHandle { id, tx: Some(tx) },
            },
            AckReceiver { id, rx },
        ))
    }

    /// Correlation ID shared by the handle and its receiver.
    pub fn id(&self) -> Uuid {
        self.ack.id
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Take ownership of the payload and the duty to acknowledge it.
    pub fn into_parts(self) -> (Message, AckHandle) {
        (self.message, self.ack)
    }

    /// Resolve the transaction without looking at its payload.
    pub fn resolve(self, response: Response) -> bool {
        self.ack.resolve(response)
    }
}

/// Exclusive, single-use handle for answering a transaction.
#[derive(Debug)]
pub struct AckHandle {
    id: Uuid,
    tx: Option<oneshot::Sender<Response>>,
}

impl AckHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Send the one and only outcome.
    ///
    /// Returns `false` if the originator stopped listening.
    pub fn resolve(mut self, response: Response) -> bool {
        match self.tx.take() {
            Some(tx) => tx.send(response).is_ok(),
            None => false,
        }
    }

    /// Shorthand for `resolve(Ok(()))`.
    pub fn accept(self) -> bool {
        self.resolve(Ok(()))
    }

    /// Shorthand for `resolve(Err(err))`.
    pub fn reject(self, err: DeliveryError) -> bool {
        self.resolve(Err(err))
    }
}

/// Dropping an unresolved handle is a protocol violation: it panics in
/// debug builds. Release builds log it and answer `Abandoned`.
impl Drop for AckHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            error!(
                transaction_id = %self.id,
                "Acknowledgement handle dropped without a response"
            );
            let _ = tx.send(Err(DeliveryError::Abandoned));
            debug_assert!(
                std::thread::panicking(),
                "acknowledgement handle {} dropped without a response",
                self.id
            );
        }
    }
}

/// Originator side of a transaction: resolves to exactly one response.
#[derive(Debug)]
pub struct AckReceiver {
    id: Uuid,
    rx: oneshot::Receiver<Response>,
}

impl AckReceiver {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Future for AckReceiver {
    type Output = Response;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(DeliveryError::Abandoned)))
    }
}

/// Sending half of a handoff between two stages.
#[derive(Debug, Clone)]
pub struct TransactionSender {
    inner: mpsc::Sender<Transaction>,
}

impl TransactionSender {
    /// Hand a transaction downstream, suspending until it is taken.
    ///
    /// If the path is closed the transaction is handed back unresolved.
    pub async fn send(&self, transaction: Transaction) -> Result<(), Transaction> {
        self.inner.send(transaction).await.map_err(|e| e.0)
    }

    /// Send a message and wait for its single acknowledgement.
    ///
    /// The transaction is only created once a slot is reserved, so
    /// cancelling a pending delivery leaves no handle behind.
    pub async fn deliver(&self, message: Message) -> Response {
        if message.is_empty() {
            return Err(DeliveryError::EmptyMessage);
        }
        let permit = self.reserve().await?;
        let (transaction, ack) = Transaction::new(message)?;
        permit.send(transaction);
        ack.await
    }

    /// Wait for a free slot without committing a transaction yet.
    ///
    /// Cancel safe, which makes it usable as a `select!` branch.
    pub async fn reserve(&self) -> Result<SendPermit<'_>, DeliveryError> {
        self.inner
            .reserve()
            .await
            .map(|inner| SendPermit { inner })
            .map_err(|_| DeliveryError::Closed)
    }

    /// Whether the receiving stage has gone away.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

/// A reserved slot on a handoff channel.
#[derive(Debug)]
pub struct SendPermit<'a> {
    inner: mpsc::Permit<'a, Transaction>,
}

impl SendPermit<'_> {
    /// Hand the transaction over; never suspends.
    pub fn send(self, transaction: Transaction) {
        self.inner.send(transaction);
    }
}

/// Receiving half of a handoff between two stages.
#[derive(Debug)]
pub struct TransactionReceiver {
    inner: mpsc::Receiver<Transaction>,
}

impl TransactionReceiver {
    /// Take the next transaction; `None` once every sender is dropped.
    ///
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<Transaction> {
        self.inner.recv().await
    }

    /// Take a transaction only if one is already waiting.
    pub fn try_recv(&mut self) -> Option<Transaction> {
        self.inner.try_recv().ok()
    }

    /// Refuse further sends while still allowing queued ones to be taken.
    pub fn close(&mut self) {
        self.inner.close();
    }
}

/// Transactions still queued when the receiver goes away are answered
/// with `Closed`.
impl Drop for TransactionReceiver {
    fn drop(&mut self) {
        self.inner.close();
        while let Ok(transaction) = self.inner.try_recv() {
            transaction.resolve(Err(DeliveryError::Closed));
        }
    }
}

/// Create a synchronous handoff channel.
pub fn transaction_channel() -> (TransactionSender, TransactionReceiver) {
    let (tx, rx) = mpsc::channel(HANDOFF_CAPACITY);
    (TransactionSender { inner: tx }, TransactionReceiver { inner: rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_empty_message_rejected() {
        let err = Transaction::new(Message::new()).unwrap_err();
        assert_eq!(err, DeliveryError::EmptyMessage);
    }

    #[tokio::test]
    async fn test_single_resolution_reaches_receiver() {
        let (transaction, ack) = Transaction::new(Message::from_bytes(["a"])).unwrap();
        assert_eq!(transaction.id(), ack.id());

        let (message, handle) = transaction.into_parts();
        assert_eq!(message.get(0).unwrap().data(), b"a");
        assert!(handle.accept());

        assert_eq!(ack.await, Ok(()));
    }

    #[tokio::test]
    async fn test_rejection_carries_error() {
        let (transaction, ack) = Transaction::new(Message::from_bytes(["a"])).unwrap();
        transaction.resolve(Err(DeliveryError::rejected("file", "disk full")));

        assert_eq!(ack.await, Err(DeliveryError::rejected("file", "disk full")));
    }

    #[tokio::test]
    #[cfg_attr(debug_assertions, should_panic(expected = "dropped without a response"))]
    async fn test_dropped_handle_resolves_abandoned() {
        let (transaction, ack) = Transaction::new(Message::from_bytes(["a"])).unwrap();
        drop(transaction);

        assert_eq!(ack.await, Err(DeliveryError::Abandoned));
    }

    #[tokio::test]
    async fn test_dropped_receiver_answers_queued_transactions() {
        let (tx, rx) = transaction_channel();
        let (transaction, ack) = Transaction::new(Message::from_bytes(["queued"])).unwrap();
        tx.send(transaction).await.unwrap();

        drop(rx);
        assert_eq!(ack.await, Err(DeliveryError::Closed));
    }

    #[tokio::test]
    async fn test_cancelled_delivery_leaves_no_handle() {
        let (tx, mut rx) = transaction_channel();
        let (first, _first_ack) = Transaction::new(Message::from_bytes(["1"])).unwrap();
        tx.send(first).await.unwrap();

        // The slot is taken, so the delivery is still waiting to reserve.
        let pending = tokio::time::timeout(
            Duration::from_millis(50),
            tx.deliver(Message::from_bytes(["2"])),
        )
        .await;
        assert!(pending.is_err());

        rx.recv().await.unwrap().resolve(Ok(()));
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_resolve_after_receiver_gone_reports_false() {
        let (transaction, ack) = Transaction::new(Message::from_bytes(["a"])).unwrap();
        drop(ack);
        assert!(!transaction.resolve(Ok(())));
    }

    #[tokio::test]
    async fn test_deliver_waits_for_ack() {
        let (tx, mut rx) = transaction_channel();

        let consumer = tokio::spawn(async move {
            let transaction = rx.recv().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            transaction.resolve(Ok(()));
        });

        let start = std::time::Instant::now();
        assert_eq!(tx.deliver(Message::from_bytes(["hello"])).await, Ok(()));
        assert!(start.elapsed() >= Duration::from_millis(50));
        consumer.await.unwrap();
    }

    #[tokio::test]
    async fn test_deliver_on_closed_path() {
        let (tx, rx) = transaction_channel();
        drop(rx);

        assert!(tx.is_closed());
        assert_eq!(
            tx.deliver(Message::from_bytes(["hello"])).await,
            Err(DeliveryError::Closed)
        );
    }

    #[tokio::test]
    async fn test_reserved_slot_delivers() {
        let (tx, mut rx) = transaction_channel();

        let permit = tx.reserve().await.unwrap();
        let (transaction, ack) = Transaction::new(Message::from_bytes(["reserved"])).unwrap();
        permit.send(transaction);

        let received = rx.try_recv().unwrap();
        assert_eq!(received.message().get(0).unwrap().data(), b"reserved");
        received.resolve(Ok(()));
        assert_eq!(ack.await, Ok(()));
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_closed_path_yields_none() {
        let (tx, mut rx) = transaction_channel();
        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_handoff_is_synchronous() {
        let (tx, mut rx) = transaction_channel();

        let (first, _ack1) = Transaction::new(Message::from_bytes(["1"])).unwrap();
        let (second, _ack2) = Transaction::new(Message::from_bytes(["2"])).unwrap();

        tx.send(first).await.unwrap();

        // The single slot is taken; a second send must wait for a receive.
        let blocked = tokio::time::timeout(Duration::from_millis(50), tx.reserve()).await;
        assert!(blocked.is_err(), "second send should suspend");

        let received = rx.recv().await.unwrap();
        assert_eq!(received.message().get(0).unwrap().data(), b"1");
        received.resolve(Ok(()));

        tx.send(second).await.unwrap();
        rx.recv().await.unwrap().resolve(Ok(()));
    }
}
