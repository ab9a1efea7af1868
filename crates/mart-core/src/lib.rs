//! # mart-core
//!
//! Channels, catch-up resolution and durability hand-off for the mart
//! long-poll broker.
//!
//! This crate provides the fundamental building blocks:
//!
//! - **RingBuffer** - Fixed-capacity history that evicts its oldest entry
//! - **Channel** - Named history plus the subscribers parked on it
//! - **Registry** - Process-wide map from channel name to channel
//! - **CatchUp** - Decides whether a subscriber marker has backlog
//! - **SinkQueue** - Ordered hand-off of channel events to a durability sink
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Transport  │────▶│  Registry   │────▶│   Channel   │
//! └─────────────┘     └─────────────┘     └─────────────┘
//!                                                │
//!                                                ▼
//!                     ┌─────────────┐     ┌─────────────┐
//!                     │ SinkWorker  │◀────│  SinkQueue  │
//!                     └─────────────┘     └─────────────┘
//!                            │
//!                            ▼
//!                     ┌─────────────────┐
//!                     │ DurabilitySink  │
//!                     └─────────────────┘
//! ```

pub mod catchup;
pub mod channel;
pub mod message;
pub mod queue;
pub mod registry;
pub mod ring;
pub mod sink;
pub mod subscriber;

pub use catchup::CatchUp;
pub use channel::{
    validate_channel_name, Backlog, Channel, ChannelConfig, ChannelError, ChannelId, Poll, Replay,
};
pub use message::{now_nanos, Marker, MarkerClock, Message};
pub use queue::{Durability, OverflowPolicy, RetryPolicy, SinkQueue, SinkStats, SinkWorker};
pub use registry::{Registry, RegistryStats};
pub use ring::{RingBuffer, RingError};
pub use sink::{DurabilitySink, MemorySink, SinkError, SinkEvent, StoredMessage};
pub use subscriber::{
    release_all, wait_any, Disconnect, NeverDisconnect, Subscription, SubscriberId, Wakeup,
};
