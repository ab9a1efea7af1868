//! Channel abstraction for mart.
//!
//! A channel is a named, bounded history of messages plus the subscribers
//! currently parked on it. One lock per channel serializes every mutation, so
//! a subscriber's "no backlog" check and its registration are atomic with
//! respect to publish.

use crate::catchup::{self, CatchUp};
use crate::message::{Marker, MarkerClock, Message};
use crate::queue::Durability;
use crate::ring::RingBuffer;
use crate::sink::SinkEvent;
use crate::subscriber::{generate_subscriber_id, ParkedSet, SubscriberId, Subscription};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Maximum channel name length.
pub const MAX_CHANNEL_NAME_LENGTH: usize = 256;

/// Query key that carries the subscriber identity and so cannot name a channel.
pub const RESERVED_IDENTITY_KEY: &str = "cid";

/// Default number of retained messages.
pub const DEFAULT_CAPACITY: usize = 10;

/// Default advisory retention.
pub const DEFAULT_LIFE: Duration = Duration::from_secs(60 * 60);

/// A channel identifier.
pub type ChannelId = String;

/// Validate a channel name.
///
/// # Errors
///
/// Returns an error message if the channel name is invalid.
pub fn validate_channel_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Channel name cannot be empty");
    }
    if name.len() > MAX_CHANNEL_NAME_LENGTH {
        return Err("Channel name too long");
    }
    if name == RESERVED_IDENTITY_KEY {
        return Err("Channel name 'cid' is reserved");
    }
    if !name.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Channel name contains invalid characters");
    }
    Ok(())
}

/// Channel errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The channel exists only as a placeholder; no publisher configured it.
    #[error("Channel not configured: {0}")]
    Unconfigured(ChannelId),
}

/// Configuration fixed by whoever establishes a channel first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Maximum retained messages.
    pub capacity: usize,
    /// Advisory retention per message.
    pub life: Duration,
    /// Allow only one parked subscription per identity.
    pub one2one: bool,
    /// Opaque access key, carried but never checked.
    pub key: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ChannelConfig {
    /// Configuration with the given capacity and default everything else.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            life: DEFAULT_LIFE,
            one2one: false,
            key: None,
        }
    }

    /// Set the retention.
    #[must_use]
    pub fn with_life(mut self, life: Duration) -> Self {
        self.life = life;
        self
    }

    /// Set the one-subscription-per-identity policy.
    #[must_use]
    pub fn with_one2one(mut self, one2one: bool) -> Self {
        self.one2one = one2one;
        self
    }

    /// Set the access key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Retention in nanoseconds, saturating.
    #[must_use]
    pub fn life_nanos(&self) -> u64 {
        u64::try_from(self.life.as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Messages a subscriber has not seen yet on one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backlog {
    /// Marker of the last message; the subscriber's next reference point.
    pub marker: Marker,
    /// Messages oldest first.
    pub messages: Vec<Arc<Message>>,
}

impl Backlog {
    /// A backlog of the single message delivered to a parked subscriber.
    #[must_use]
    pub fn delivered(message: Arc<Message>) -> Self {
        Self {
            marker: message.created,
            messages: vec![message],
        }
    }
}

/// Backlogs gathered across channels for one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Replay {
    channels: BTreeMap<ChannelId, Backlog>,
}

impl Replay {
    /// Create an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `backlog` for `channel`, replacing anything recorded before.
    pub fn insert(&mut self, channel: impl Into<ChannelId>, backlog: Backlog) {
        self.channels.insert(channel.into(), backlog);
    }

    /// The backlog recorded for `channel`.
    #[must_use]
    pub fn get(&self, channel: &str) -> Option<&Backlog> {
        self.channels.get(channel)
    }

    /// Number of channels with backlog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Check if no channel has backlog.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Iterate channel backlogs in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, ChannelId, Backlog> {
        self.channels.iter()
    }
}

impl IntoIterator for Replay {
    type Item = (ChannelId, Backlog);
    type IntoIter = btree_map::IntoIter<ChannelId, Backlog>;

    fn into_iter(self) -> Self::IntoIter {
        self.channels.into_iter()
    }
}

/// Result of a combined catch-up check and park.
#[derive(Debug)]
pub enum Poll {
    /// Backlog exists and is returned immediately.
    Backlog(Backlog),
    /// Nothing new; the caller is parked.
    Parked(Subscription),
}

#[derive(Debug)]
struct ChannelState {
    config: Option<ChannelConfig>,
    ring: RingBuffer<Arc<Message>>,
    clock: MarkerClock,
    parked: ParkedSet,
}

impl ChannelState {
    fn collect(&self, from: usize) -> Option<Backlog> {
        let messages: Vec<Arc<Message>> = self.ring.iter_from(from).cloned().collect();
        let marker = messages.last()?.created;
        Some(Backlog { marker, messages })
    }
}

/// A channel for pub/sub messaging.
#[derive(Debug)]
pub struct Channel {
    name: ChannelId,
    state: Mutex<ChannelState>,
    durability: Durability,
}

impl Channel {
    /// Create a configured channel.
    #[must_use]
    pub fn new(name: impl Into<ChannelId>, config: ChannelConfig, durability: Durability) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(ChannelState {
                ring: RingBuffer::new(config.capacity),
                config: Some(config),
                clock: MarkerClock::new(),
                parked: ParkedSet::default(),
            }),
            durability,
        }
    }

    /// Create an unconfigured placeholder with zero capacity.
    ///
    /// Subscribers may park on it; the first publisher fixes its configuration.
    #[must_use]
    pub fn placeholder(name: impl Into<ChannelId>, durability: Durability) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(ChannelState {
                ring: RingBuffer::new(0),
                config: None,
                clock: MarkerClock::new(),
                parked: ParkedSet::default(),
            }),
            durability,
        }
    }

    /// Get the channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The channel configuration, `None` for a placeholder.
    #[must_use]
    pub fn config(&self) -> Option<ChannelConfig> {
        self.state.lock().config.clone()
    }

    /// Check if a publisher has configured this channel.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.state.lock().config.is_some()
    }

    /// Apply `config` if the channel is still a placeholder.
    ///
    /// Returns `true` if it was applied; an existing configuration always wins.
    pub fn configure(&self, config: ChannelConfig) -> bool {
        let mut state = self.state.lock();
        match &state.config {
            Some(existing) => {
                if *existing != config {
                    debug!(
                        channel = %self.name,
                        existing = ?existing,
                        requested = ?config,
                        "Ignoring reconfiguration of existing channel"
                    );
                }
                false
            }
            None => {
                debug!(channel = %self.name, capacity = config.capacity, "Configuring placeholder channel");
                state.ring = RingBuffer::new(config.capacity);
                state.config = Some(config);
                true
            }
        }
    }

    /// Publish `payload`, returning the new message's marker.
    ///
    /// The message is buffered, handed to the durability queue and delivered to
    /// every parked subscriber. A durability failure never fails the publish.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Unconfigured`] on a placeholder channel.
    pub async fn publish(&self, payload: impl Into<Bytes>) -> Result<Marker, ChannelError> {
        let handoff = self.durability.reserve().await;

        let mut state = self.state.lock();
        let Some(config) = state.config.clone() else {
            return Err(ChannelError::Unconfigured(self.name.clone()));
        };

        let marker = state.clock.next();
        let message = Arc::new(Message::new(payload, marker));
        let evicted = state.ring.push(Arc::clone(&message));

        // A channel retaining nothing has nothing to persist.
        if config.capacity > 0 {
            self.durability.submit(handoff, || SinkEvent::Persist {
                channel: self.name.clone(),
                config,
                message: Arc::clone(&message),
                evicted: evicted.clone(),
            });
        }

        let delivered = state.parked.deliver(&message);
        trace!(
            channel = %self.name,
            marker,
            delivered,
            evicted = evicted.is_some(),
            "Published message"
        );

        Ok(marker)
    }

    /// Push a message restored from storage, keeping its original marker.
    ///
    /// Emits no durability event and wakes no one. Returns `false` if the
    /// channel is unconfigured or the marker does not follow the newest one.
    pub fn restore(&self, message: Message) -> bool {
        let mut state = self.state.lock();
        if state.config.is_none() {
            warn!(channel = %self.name, "Cannot restore into an unconfigured channel");
            return false;
        }
        if message.created <= state.clock.last() {
            warn!(
                channel = %self.name,
                marker = message.created,
                last = state.clock.last(),
                "Skipping out-of-order restored message"
            );
            return false;
        }
        state.clock.observe(message.created);
        state.ring.push(Arc::new(message));
        true
    }

    /// Resolve `marker` against the buffered messages.
    #[must_use]
    pub fn has_new(&self, marker: Marker) -> CatchUp {
        catchup::resolve(&self.state.lock().ring, marker)
    }

    /// Messages past `marker`, resolved and copied under one lock acquisition.
    ///
    /// Prefer this over [`has_new`](Self::has_new) followed by
    /// [`append`](Self::append): an eviction between those two calls shifts
    /// the logical indices.
    #[must_use]
    pub fn backlog(&self, marker: Marker) -> Option<Backlog> {
        let state = self.state.lock();
        match catchup::resolve(&state.ring, marker) {
            CatchUp::Replay { from } => state.collect(from),
            CatchUp::Wait => None,
        }
    }

    /// Copy buffered messages from logical index `from` into `replay`.
    ///
    /// Returns the number of messages appended; nothing is recorded if there
    /// are none.
    pub fn append(&self, replay: &mut Replay, from: usize) -> usize {
        match self.state.lock().collect(from) {
            Some(backlog) => {
                let count = backlog.messages.len();
                replay.insert(self.name.clone(), backlog);
                count
            }
            None => 0,
        }
    }

    /// Park a subscriber until the next publish.
    ///
    /// Under `one2one`, an earlier subscriber parked with the same identity is
    /// woken with a superseded signal before this one registers.
    pub fn subscribe(self: &Arc<Self>, identity: Option<&str>) -> Subscription {
        let mut state = self.state.lock();
        self.register(&mut state, identity)
    }

    /// Check for backlog past `marker` and, if there is none, park, all under
    /// one lock acquisition.
    pub fn poll(self: &Arc<Self>, marker: Marker, identity: Option<&str>) -> Poll {
        let mut state = self.state.lock();
        if let CatchUp::Replay { from } = catchup::resolve(&state.ring, marker) {
            if let Some(backlog) = state.collect(from) {
                trace!(channel = %self.name, marker, from, "Returning backlog");
                return Poll::Backlog(backlog);
            }
        }
        Poll::Parked(self.register(&mut state, identity))
    }

    /// Remove a parked subscriber. Removing one already gone is a no-op.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.state.lock().parked.remove(id);
        if removed {
            trace!(channel = %self.name, subscriber = id, "Subscriber removed");
        }
        removed
    }

    /// Drop every buffered message and tell the durability sink to do the same.
    ///
    /// Parked subscribers stay parked. Returns the number of messages dropped.
    pub async fn clear(&self) -> usize {
        let handoff = self.durability.reserve().await;
        let mut state = self.state.lock();
        let dropped = state.ring.len();
        state.ring.clear();
        self.durability.submit(handoff, || SinkEvent::Clear {
            channel: self.name.clone(),
        });
        debug!(channel = %self.name, dropped, "Channel cleared");
        dropped
    }

    /// Evict messages whose retention has elapsed at `now`, oldest first.
    pub fn sweep_expired(&self, now: Marker) -> usize {
        let mut state = self.state.lock();
        let Some(life) = state.config.as_ref().map(ChannelConfig::life_nanos) else {
            return 0;
        };
        let mut swept = 0;
        while state
            .ring
            .peek_oldest()
            .is_ok_and(|oldest| oldest.created.saturating_add(life) < now)
        {
            if state.ring.pop_oldest().is_err() {
                break;
            }
            swept += 1;
        }
        if swept > 0 {
            debug!(channel = %self.name, swept, "Expired messages evicted");
        }
        swept
    }

    /// Marker of the newest buffered message, `0` if none.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Unconfigured`] on a placeholder channel.
    pub fn latest_marker(&self) -> Result<Marker, ChannelError> {
        let state = self.state.lock();
        if state.config.is_none() {
            return Err(ChannelError::Unconfigured(self.name.clone()));
        }
        Ok(state.ring.peek_newest().map(|m| m.created).unwrap_or(0))
    }

    /// Number of buffered messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().ring.len()
    }

    /// Check if no messages are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of parked subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().parked.len()
    }

    /// Check if subscriber `id` is still parked.
    #[must_use]
    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.state.lock().parked.contains(id)
    }

    /// Buffered messages, oldest first.
    #[must_use]
    pub fn messages(&self) -> Vec<Arc<Message>> {
        self.state.lock().ring.iter().cloned().collect()
    }

    fn register(self: &Arc<Self>, state: &mut ChannelState, identity: Option<&str>) -> Subscription {
        let id = generate_subscriber_id();
        let exclusive = state.config.as_ref().is_some_and(|c| c.one2one);
        let (tx, rx) = tokio::sync::oneshot::channel();
        if let Some(displaced) = state.parked.park(id, identity, exclusive, tx) {
            debug!(channel = %self.name, displaced, subscriber = id, "Superseded earlier subscriber");
        }
        trace!(channel = %self.name, subscriber = id, parked = state.parked.len(), "Subscriber parked");
        Subscription::new(id, Arc::clone(self), rx)
    }
}
