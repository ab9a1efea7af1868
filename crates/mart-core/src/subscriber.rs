//! Parked subscribers and their one-shot delivery slots.
//!
//! A subscriber that finds no backlog parks on its channel with a single-value
//! mailbox. The next publish fills every mailbox and clears the parked set, so
//! a slow or vanished consumer never holds the publisher up.

use crate::channel::{Backlog, Channel, Replay};
use crate::message::Message;
use async_trait::async_trait;
use futures_util::future::select_all;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};
use tracing::trace;

/// A unique subscriber identifier.
pub type SubscriberId = u64;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique subscriber ID.
#[must_use]
pub fn generate_subscriber_id() -> SubscriberId {
    NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed)
}

/// What lands in a parked subscriber's mailbox.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// A freshly published message.
    Message(Arc<Message>),
    /// A newer subscription with the same identity took this one's place.
    Superseded,
}

/// Why a waiting subscriber woke up.
#[derive(Debug, Clone)]
pub enum Wakeup {
    /// A message was published on `channel`.
    Message {
        /// Channel name.
        channel: String,
        /// The delivered message.
        message: Arc<Message>,
    },
    /// The subscription on `channel` was displaced or discarded.
    Superseded {
        /// Channel name.
        channel: String,
    },
    /// The caller went away before anything arrived.
    Disconnected,
}

/// Something the transport can await to learn that its caller is gone.
#[async_trait]
pub trait Disconnect: Send + Sync {
    /// Resolves once the caller has disconnected or the wait should end.
    async fn closed(&self);
}

#[async_trait]
impl Disconnect for Notify {
    async fn closed(&self) {
        self.notified().await;
    }
}

/// A caller that never disconnects on its own.
///
/// Dropping the waiting future still cancels the wait.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverDisconnect;

#[async_trait]
impl Disconnect for NeverDisconnect {
    async fn closed(&self) {
        std::future::pending::<()>().await;
    }
}

#[derive(Debug)]
struct Slot {
    identity: Option<String>,
    tx: oneshot::Sender<Delivery>,
}

/// The set of subscribers parked on one channel.
#[derive(Debug, Default)]
pub(crate) struct ParkedSet {
    slots: HashMap<SubscriberId, Slot>,
    by_identity: HashMap<String, SubscriberId>,
}

impl ParkedSet {
    /// Park `id`. With `exclusive`, an earlier subscriber under the same
    /// identity is signalled [`Delivery::Superseded`] and removed first.
    ///
    /// Returns the displaced subscriber, if any.
    pub(crate) fn park(
        &mut self,
        id: SubscriberId,
        identity: Option<&str>,
        exclusive: bool,
        tx: oneshot::Sender<Delivery>,
    ) -> Option<SubscriberId> {
        let mut displaced = None;
        if let (Some(identity), true) = (identity, exclusive) {
            if let Some(previous) = self.by_identity.insert(identity.to_string(), id) {
                if let Some(slot) = self.slots.remove(&previous) {
                    let _ = slot.tx.send(Delivery::Superseded);
                    displaced = Some(previous);
                }
            }
        }
        self.slots.insert(
            id,
            Slot {
                identity: identity.map(str::to_string),
                tx,
            },
        );
        displaced
    }

    /// Remove `id` if still parked.
    pub(crate) fn remove(&mut self, id: SubscriberId) -> bool {
        let Some(slot) = self.slots.remove(&id) else {
            return false;
        };
        if let Some(identity) = slot.identity {
            if self.by_identity.get(&identity) == Some(&id) {
                self.by_identity.remove(&identity);
            }
        }
        true
    }

    /// Hand `message` to every parked subscriber and empty the set.
    ///
    /// Returns the number of mailboxes that accepted it.
    pub(crate) fn deliver(&mut self, message: &Arc<Message>) -> usize {
        self.by_identity.clear();
        let mut delivered = 0;
        for (id, slot) in self.slots.drain() {
            if slot.tx.send(Delivery::Message(Arc::clone(message))).is_ok() {
                delivered += 1;
            } else {
                trace!(subscriber = id, "Mailbox abandoned before delivery");
            }
        }
        delivered
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn contains(&self, id: SubscriberId) -> bool {
        self.slots.contains_key(&id)
    }
}

/// A parked subscription on one channel.
///
/// Dropping it deregisters it from the channel; that is how a transport-level
/// disconnect reaches the core when the waiting future is cancelled.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    channel: Arc<Channel>,
    rx: oneshot::Receiver<Delivery>,
    /// The mailbox has been read.
    done: bool,
}

impl Subscription {
    pub(crate) fn new(id: SubscriberId, channel: Arc<Channel>, rx: oneshot::Receiver<Delivery>) -> Self {
        Self {
            id,
            channel,
            rx,
            done: false,
        }
    }

    /// The subscriber ID.
    #[must_use]
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// The channel this subscription is parked on.
    #[must_use]
    pub fn channel(&self) -> &Arc<Channel> {
        &self.channel
    }

    /// Wait for the mailbox to be filled.
    ///
    /// Once the mailbox has been read this waits forever.
    pub async fn recv(&mut self) -> Wakeup {
        if self.done {
            std::future::pending::<()>().await;
        }
        let delivery = (&mut self.rx).await;
        self.done = true;
        self.wakeup(delivery.ok())
    }

    /// Take the mailbox content if it has already been filled.
    ///
    /// Returns `None` once the mailbox has been read.
    pub fn try_recv(&mut self) -> Option<Wakeup> {
        if self.done {
            return None;
        }
        let wakeup = match self.rx.try_recv() {
            Ok(delivery) => self.wakeup(Some(delivery)),
            Err(oneshot::error::TryRecvError::Empty) => return None,
            Err(oneshot::error::TryRecvError::Closed) => self.wakeup(None),
        };
        self.done = true;
        Some(wakeup)
    }

    /// Deregister, then take a message that was delivered before that.
    ///
    /// Nothing can reach the mailbox once the subscription is off the
    /// channel, so the result is final.
    pub fn release(mut self) -> Option<Arc<Message>> {
        self.channel.unsubscribe(self.id);
        match self.try_recv() {
            Some(Wakeup::Message { message, .. }) => Some(message),
            _ => None,
        }
    }

    /// Wait for a delivery or for `disconnect` to fire, whichever is first.
    pub async fn wait<D: Disconnect + ?Sized>(mut self, disconnect: &D) -> Wakeup {
        tokio::select! {
            wakeup = self.recv() => wakeup,
            () = disconnect.closed() => Wakeup::Disconnected,
        }
    }

    fn wakeup(&self, delivery: Option<Delivery>) -> Wakeup {
        let channel = self.channel.name().to_string();
        match delivery {
            Some(Delivery::Message(message)) => Wakeup::Message { channel, message },
            // A mailbox dropped without a value was discarded by its channel.
            Some(Delivery::Superseded) | None => Wakeup::Superseded { channel },
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.channel.unsubscribe(self.id);
    }
}

/// Wait on several subscriptions at once; the first wakeup wins.
///
/// Other mailboxes may have been filled by the time this returns; pass the
/// subscriptions to [`release_all`] rather than dropping them to keep those
/// messages. With no subscriptions this only waits for `disconnect`.
pub async fn wait_any<D: Disconnect + ?Sized>(subscriptions: &mut [Subscription], disconnect: &D) -> Wakeup {
    if subscriptions.is_empty() {
        disconnect.closed().await;
        return Wakeup::Disconnected;
    }

    let pending = subscriptions.iter_mut().map(|sub| Box::pin(sub.recv()));
    tokio::select! {
        (wakeup, _, _) = select_all(pending) => wakeup,
        () = disconnect.closed() => Wakeup::Disconnected,
    }
}

/// Release every subscription and record the messages already delivered to
/// them in `replay`, one backlog per channel.
///
/// Returns the number of messages recorded.
pub fn release_all(subscriptions: Vec<Subscription>, replay: &mut Replay) -> usize {
    let mut recorded = 0;
    for sub in subscriptions {
        let channel = sub.channel.name().to_string();
        if let Some(message) = sub.release() {
            trace!(channel = %channel, marker = message.created, "Collected delivered message");
            replay.insert(channel, Backlog::delivered(message));
            recorded += 1;
        }
    }
    recorded
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(marker: u64) -> Arc<Message> {
        Arc::new(Message::new(format!("m{marker}"), marker))
    }

    #[test]
    fn test_subscriber_ids_are_unique() {
        let a = generate_subscriber_id();
        let b = generate_subscriber_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_deliver_fills_every_mailbox_and_clears() {
        let mut parked = ParkedSet::default();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();
        parked.park(1, None, false, tx1);
        parked.park(2, Some("x"), false, tx2);

        assert_eq!(parked.deliver(&msg(10)), 2);
        assert_eq!(parked.len(), 0);
        assert!(matches!(rx1.try_recv(), Ok(Delivery::Message(m)) if m.created == 10));
        assert!(matches!(rx2.try_recv(), Ok(Delivery::Message(m)) if m.created == 10));
    }

    #[test]
    fn test_deliver_skips_abandoned_mailboxes() {
        let mut parked = ParkedSet::default();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        parked.park(1, None, false, tx1);
        parked.park(2, None, false, tx2);
        drop(rx1);

        assert_eq!(parked.deliver(&msg(1)), 1);
        assert_eq!(parked.len(), 0);
    }

    #[test]
    fn test_exclusive_identity_displaces_previous() {
        let mut parked = ParkedSet::default();
        let (tx1, mut rx1) = oneshot::channel();
        let (tx2, mut rx2) = oneshot::channel();

        assert_eq!(parked.park(1, Some("cid"), true, tx1), None);
        assert_eq!(parked.park(2, Some("cid"), true, tx2), Some(1));

        assert!(matches!(rx1.try_recv(), Ok(Delivery::Superseded)));
        assert!(rx2.try_recv().is_err());
        assert!(!parked.contains(1));
        assert!(parked.contains(2));
    }

    #[test]
    fn test_non_exclusive_identity_keeps_both() {
        let mut parked = ParkedSet::default();
        let (tx1, _rx1) = oneshot::channel();
        let (tx2, _rx2) = oneshot::channel();
        parked.park(1, Some("cid"), false, tx1);
        parked.park(2, Some("cid"), false, tx2);
        assert_eq!(parked.len(), 2);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut parked = ParkedSet::default();
        let (tx, _rx) = oneshot::channel();
        parked.park(7, Some("cid"), true, tx);

        assert!(parked.remove(7));
        assert!(!parked.remove(7));
        assert!(!parked.remove(99));

        // The identity slot is free again.
        let (tx, _rx) = oneshot::channel();
        assert_eq!(parked.park(8, Some("cid"), true, tx), None);
    }

    #[tokio::test]
    async fn test_notify_disconnect() {
        let notify = Notify::new();
        notify.notify_one();
        notify.closed().await;
    }
}
