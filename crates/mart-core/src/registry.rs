//! Channel registry for mart.
//!
//! The registry maps channel names to channels. Lookups and first-time
//! inserts are atomic per name; once resolved, every publish and subscribe
//! touches only the channel's own lock.

use crate::channel::{Channel, ChannelConfig, ChannelId};
use crate::message::Marker;
use crate::queue::Durability;
use crate::sink::{SinkEvent, StoredMessage};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The process-wide set of channels.
///
/// Owned by the entry point and shared by reference with request handlers.
#[derive(Debug, Default)]
pub struct Registry {
    /// Channels indexed by name.
    channels: DashMap<ChannelId, Arc<Channel>>,
    /// Durability handle given to every channel.
    durability: Durability,
}

impl Registry {
    /// Create a registry without persistence.
    #[must_use]
    pub fn new() -> Self {
        Self::with_durability(Durability::disabled())
    }

    /// Create a registry whose channels hand events to `durability`.
    #[must_use]
    pub fn with_durability(durability: Durability) -> Self {
        info!(persistent = durability.is_enabled(), "Creating channel registry");
        Self {
            channels: DashMap::new(),
            durability,
        }
    }

    /// The durability handle shared by all channels.
    #[must_use]
    pub fn durability(&self) -> &Durability {
        &self.durability
    }

    /// Get a channel, creating it with `config` if absent.
    ///
    /// An existing channel keeps its configuration and `config` is ignored. A
    /// placeholder created by [`Registry::get`] is configured by the first call.
    pub fn get_or_create(&self, name: &str, config: ChannelConfig) -> Arc<Channel> {
        let mut created = false;
        let channel = {
            let entry = self.channels.entry(name.to_string()).or_insert_with(|| {
                created = true;
                Arc::new(Channel::new(name, config.clone(), self.durability.clone()))
            });
            Arc::clone(entry.value())
        };

        if created {
            debug!(channel = %name, capacity = config.capacity, "Created channel");
        } else {
            channel.configure(config);
        }
        channel
    }

    /// Get a channel, creating an unconfigured placeholder if absent.
    ///
    /// Lets subscribers park on a channel before its first publisher arrives.
    /// Use [`Registry::lookup`] when a typo should not create anything.
    pub fn get(&self, name: &str) -> Arc<Channel> {
        let entry = self.channels.entry(name.to_string()).or_insert_with(|| {
            debug!(channel = %name, "Created placeholder channel");
            Arc::new(Channel::placeholder(name, self.durability.clone()))
        });
        Arc::clone(entry.value())
    }

    /// Get a channel only if it exists.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels.get(name).map(|e| Arc::clone(e.value()))
    }

    /// Check if a channel exists.
    #[must_use]
    pub fn channel_exists(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// Get all channel names.
    #[must_use]
    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    /// Administrative reset: drop every buffered message of `name`.
    ///
    /// Returns the number of messages dropped, or `None` if no such channel.
    pub async fn clear(&self, name: &str) -> Option<usize> {
        let channel = self.lookup(name)?;
        Some(channel.clear().await)
    }

    /// Ask the durability sink for a diagnostic listing.
    ///
    /// Returns `false` if persistence is off or unavailable.
    pub async fn dump(&self) -> bool {
        let handoff = self.durability.reserve().await;
        self.durability.submit(handoff, || SinkEvent::Dump)
    }

    /// Feed rows loaded from storage back into their channels.
    ///
    /// Rows must be ordered by channel, then ascending marker. Each channel is
    /// configured from its first row; markers are kept and nothing is
    /// persisted again. Returns the number of messages restored.
    pub fn restore(&self, rows: impl IntoIterator<Item = StoredMessage>) -> usize {
        let mut restored = 0;
        for row in rows {
            let channel = self.get_or_create(&row.channel, row.config.clone());
            if channel.restore(row.to_message()) {
                restored += 1;
            } else {
                warn!(channel = %row.channel, marker = row.marker, "Row not restored");
            }
        }
        info!(restored, channels = self.channels.len(), "Restored channels from storage");
        restored
    }

    /// Evict expired messages from every channel. Returns the total evicted.
    pub fn sweep_expired(&self, now: Marker) -> usize {
        let channels: Vec<Arc<Channel>> = self.channels.iter().map(|e| Arc::clone(e.value())).collect();
        channels.iter().map(|ch| ch.sweep_expired(now)).sum()
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let channels: Vec<Arc<Channel>> = self.channels.iter().map(|e| Arc::clone(e.value())).collect();
        RegistryStats {
            channel_count: channels.len(),
            parked_subscribers: channels.iter().map(|c| c.subscriber_count()).sum(),
            buffered_messages: channels.iter().map(|c| c.len()).sum(),
            queued_sink_events: self.durability.queue().map_or(0, |q| q.len()),
            dropped_sink_events: self.durability.queue().map_or(0, |q| q.dropped()),
        }
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Number of known channels, placeholders included.
    pub channel_count: usize,
    /// Number of subscribers currently parked.
    pub parked_subscribers: usize,
    /// Messages buffered across all channels.
    pub buffered_messages: usize,
    /// Events waiting for the durability worker.
    pub queued_sink_events: usize,
    /// Events discarded by a full drop-oldest queue.
    pub dropped_sink_events: u64,
}
