//! Durability sink contract.
//!
//! The core hands every publish, clear and dump to a sink through the ordered
//! [`SinkQueue`](crate::queue::SinkQueue). At boot the sink feeds retained rows
//! back through [`Registry::restore`](crate::registry::Registry::restore).

use crate::channel::ChannelConfig;
use crate::message::{Marker, Message};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors raised by a durability sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink cannot accept events right now.
    #[error("Durability sink unavailable: {0}")]
    Unavailable(String),

    /// The storage backend failed.
    #[error("Durability backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// An event handed to the durability sink.
#[derive(Debug, Clone)]
pub enum SinkEvent {
    /// A message was pushed; `evicted` fell out of the ring to make room.
    Persist {
        /// Channel name.
        channel: String,
        /// Channel configuration at publish time.
        config: ChannelConfig,
        /// The new message.
        message: Arc<Message>,
        /// The message evicted by this push, if any.
        evicted: Option<Arc<Message>>,
    },

    /// Every stored row for a channel must go.
    Clear {
        /// Channel name.
        channel: String,
    },

    /// Diagnostic listing of everything stored.
    Dump,
}

impl SinkEvent {
    /// Short event name for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SinkEvent::Persist { .. } => "persist",
            SinkEvent::Clear { .. } => "clear",
            SinkEvent::Dump => "dump",
        }
    }

    /// The channel this event concerns, if any.
    #[must_use]
    pub fn channel(&self) -> Option<&str> {
        match self {
            SinkEvent::Persist { channel, .. } | SinkEvent::Clear { channel } => Some(channel),
            SinkEvent::Dump => None,
        }
    }
}

/// A message row as kept by a sink, used for boot-time replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// Channel name.
    pub channel: String,
    /// Configuration the channel had when the row was written.
    pub config: ChannelConfig,
    /// Original marker.
    pub marker: Marker,
    /// Payload bytes.
    pub payload: Bytes,
}

impl StoredMessage {
    /// Build the row a `Persist` event writes.
    #[must_use]
    pub fn from_message(channel: impl Into<String>, config: ChannelConfig, message: &Message) -> Self {
        Self {
            channel: channel.into(),
            config,
            marker: message.created,
            payload: message.payload.clone(),
        }
    }

    /// Nanosecond timestamp after which the row is expired.
    #[must_use]
    pub fn expiry(&self) -> Marker {
        self.marker.saturating_add(self.config.life_nanos())
    }

    /// Convert back into a message carrying its original marker.
    #[must_use]
    pub fn to_message(&self) -> Message {
        Message::new(self.payload.clone(), self.marker)
    }
}

/// A backing store for published messages.
///
/// Events arrive one at a time in submission order.
#[async_trait]
pub trait DurabilitySink: Send + Sync {
    /// Apply one event.
    async fn apply(&self, event: &SinkEvent) -> Result<(), SinkError>;

    /// Purge rows expired at `now`, then return the rest ordered by channel
    /// and ascending marker.
    async fn load(&self, now: Marker) -> Result<Vec<StoredMessage>, SinkError>;

    /// Return the sink name for logging.
    fn name(&self) -> &str;
}

/// In-process sink keeping rows in a map.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<BTreeMap<(String, Marker), StoredMessage>>,
    events: Mutex<Vec<SinkEvent>>,
    fail_next: AtomicUsize,
}

impl MemorySink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `apply` fail with `Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Insert a row directly, as if written by an earlier process.
    pub fn insert(&self, row: StoredMessage) {
        self.rows
            .lock()
            .insert((row.channel.clone(), row.marker), row);
    }

    /// Every successfully applied event, in order.
    #[must_use]
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    /// Current rows ordered by channel and marker.
    #[must_use]
    pub fn rows(&self) -> Vec<StoredMessage> {
        self.rows.lock().values().cloned().collect()
    }

    fn injected_failure(&self) -> bool {
        self.fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl DurabilitySink for MemorySink {
    async fn apply(&self, event: &SinkEvent) -> Result<(), SinkError> {
        if self.injected_failure() {
            return Err(SinkError::Unavailable("injected failure".into()));
        }

        {
            let mut rows = self.rows.lock();
            match event {
                SinkEvent::Persist {
                    channel,
                    config,
                    message,
                    evicted,
                } => {
                    let row = StoredMessage::from_message(channel.clone(), config.clone(), message);
                    rows.insert((channel.clone(), message.created), row);
                    if let Some(old) = evicted {
                        rows.remove(&(channel.clone(), old.created));
                    }
                }
                SinkEvent::Clear { channel } => {
                    rows.retain(|(name, _), _| name != channel);
                }
                SinkEvent::Dump => {
                    for row in rows.values() {
                        info!(
                            channel = %row.channel,
                            marker = row.marker,
                            expiry = row.expiry(),
                            size = row.config.capacity,
                            "Stored row"
                        );
                    }
                }
            }
        }

        self.events.lock().push(event.clone());
        Ok(())
    }

    async fn load(&self, now: Marker) -> Result<Vec<StoredMessage>, SinkError> {
        let mut rows = self.rows.lock();
        rows.retain(|_, row| row.expiry() >= now);
        Ok(rows.values().cloned().collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn persist(channel: &str, marker: Marker, evicted: Option<Marker>) -> SinkEvent {
        SinkEvent::Persist {
            channel: channel.to_string(),
            config: ChannelConfig::new(2),
            message: Arc::new(Message::new(format!("p{marker}"), marker)),
            evicted: evicted.map(|m| Arc::new(Message::new("old", m))),
        }
    }

    #[tokio::test]
    async fn test_memory_sink_persist_and_evict() {
        let sink = MemorySink::new();
        sink.apply(&persist("a", 1, None)).await.unwrap();
        sink.apply(&persist("a", 2, None)).await.unwrap();
        sink.apply(&persist("a", 3, Some(1))).await.unwrap();

        let markers: Vec<Marker> = sink.rows().iter().map(|r| r.marker).collect();
        assert_eq!(markers, vec![2, 3]);
        assert_eq!(sink.events().len(), 3);
    }

    #[tokio::test]
    async fn test_memory_sink_clear_is_per_channel() {
        let sink = MemorySink::new();
        sink.apply(&persist("a", 1, None)).await.unwrap();
        sink.apply(&persist("b", 1, None)).await.unwrap();
        sink.apply(&SinkEvent::Clear { channel: "a".into() }).await.unwrap();

        let rows = sink.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].channel, "b");
    }

    #[tokio::test]
    async fn test_memory_sink_injected_failures() {
        let sink = MemorySink::new();
        sink.fail_next(2);
        assert!(sink.apply(&SinkEvent::Dump).await.is_err());
        assert!(sink.apply(&SinkEvent::Dump).await.is_err());
        assert!(sink.apply(&SinkEvent::Dump).await.is_ok());
        assert_eq!(sink.events().len(), 1);
    }

    #[tokio::test]
    async fn test_memory_sink_load_purges_expired() {
        let sink = MemorySink::new();
        let config = ChannelConfig::new(4).with_life(Duration::from_nanos(100));
        for marker in [1_000, 1_050, 2_000] {
            sink.insert(StoredMessage {
                channel: "c".into(),
                config: config.clone(),
                marker,
                payload: Bytes::from_static(b"x"),
            });
        }

        let rows = sink.load(1_120).await.unwrap();
        let markers: Vec<Marker> = rows.iter().map(|r| r.marker).collect();
        assert_eq!(markers, vec![1_050, 2_000]);
        assert_eq!(sink.rows().len(), 2);
    }

    #[test]
    fn test_event_kind() {
        assert_eq!(SinkEvent::Dump.kind(), "dump");
        assert_eq!(SinkEvent::Clear { channel: "x".into() }.channel(), Some("x"));
        assert_eq!(persist("y", 1, None).kind(), "persist");
    }
}
