//! Message types and marker generation.
//!
//! Every message carries a `created` timestamp in nanoseconds that doubles as
//! its externally visible marker (the "etag" clients echo back to catch up).

use bytes::Bytes;
use std::time::{SystemTime, UNIX_EPOCH};

/// A message marker: nanoseconds since the Unix epoch, unique within a channel.
///
/// `0` is reserved for "no history".
pub type Marker = u64;

/// Current wall clock in nanoseconds.
#[must_use]
pub fn now_nanos() -> Marker {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// An immutable published message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Opaque payload.
    pub payload: Bytes,
    /// Creation timestamp, also the message's marker.
    pub created: Marker,
}

impl Message {
    /// Create a message with an already assigned marker.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>, created: Marker) -> Self {
        Self {
            payload: payload.into(),
            created,
        }
    }

    /// The message marker.
    #[must_use]
    pub fn marker(&self) -> Marker {
        self.created
    }

    /// Get the payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }
}

/// Per-channel marker source.
///
/// Hands out wall-clock nanoseconds, but never a value less than or equal to
/// one already issued or observed, so markers stay strictly increasing even if
/// the clock stalls or steps backwards.
#[derive(Debug, Default, Clone)]
pub struct MarkerClock {
    last: Marker,
}

impl MarkerClock {
    /// Create a fresh clock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the next marker.
    pub fn next(&mut self) -> Marker {
        self.next_at(now_nanos())
    }

    /// Issue the next marker given the current time.
    pub fn next_at(&mut self, now: Marker) -> Marker {
        let marker = now.max(self.last.saturating_add(1));
        self.last = marker;
        marker
    }

    /// Record a marker issued elsewhere (e.g. restored from storage).
    pub fn observe(&mut self, marker: Marker) {
        self.last = self.last.max(marker);
    }

    /// The most recent marker issued or observed.
    #[must_use]
    pub fn last(&self) -> Marker {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::new(b"hello".to_vec(), 42);
        assert_eq!(&msg.payload[..], b"hello");
        assert_eq!(msg.marker(), 42);
        assert_eq!(msg.payload_size(), 5);
    }

    #[test]
    fn test_clock_advances_when_time_stalls() {
        let mut clock = MarkerClock::new();
        let a = clock.next_at(1_000);
        let b = clock.next_at(1_000);
        let c = clock.next_at(999);
        assert_eq!(a, 1_000);
        assert_eq!(b, 1_001);
        assert_eq!(c, 1_002);
    }

    #[test]
    fn test_clock_follows_wall_time() {
        let mut clock = MarkerClock::new();
        assert_eq!(clock.next_at(10), 10);
        assert_eq!(clock.next_at(500), 500);
    }

    #[test]
    fn test_clock_observe() {
        let mut clock = MarkerClock::new();
        clock.observe(5_000);
        assert_eq!(clock.next_at(10), 5_001);

        // Observing an older marker never moves the clock back.
        clock.observe(1);
        assert_eq!(clock.last(), 5_001);
    }

    #[test]
    fn test_unique_markers() {
        let mut clock = MarkerClock::new();
        let m1 = clock.next();
        let m2 = clock.next();
        assert!(m2 > m1);
    }
}
