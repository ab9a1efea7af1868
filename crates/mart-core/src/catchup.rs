//! Marker-based catch-up resolution.
//!
//! Given the marker a subscriber last saw, decide whether buffered messages
//! exist past it and where replay starts. Only messages already evicted from
//! the ring may be lost; nothing still buffered is skipped or repeated.

use crate::message::{Marker, Message};
use crate::ring::RingBuffer;
use std::sync::Arc;

/// Outcome of resolving a subscriber marker against a channel's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatchUp {
    /// Nothing to replay; park until the next publish.
    Wait,
    /// Replay buffered messages from logical index `from` to the newest.
    Replay {
        /// First logical index to replay.
        from: usize,
    },
}

impl CatchUp {
    /// Whether there is backlog to replay.
    #[must_use]
    pub fn has_backlog(&self) -> bool {
        matches!(self, CatchUp::Replay { .. })
    }

    /// `(has_backlog, start_index)`; the index is `0` when there is no backlog.
    #[must_use]
    pub fn as_pair(&self) -> (bool, usize) {
        match *self {
            CatchUp::Wait => (false, 0),
            CatchUp::Replay { from } => (true, from),
        }
    }
}

/// Resolve `marker` against `ring`.
///
/// - `0` never replays: a subscriber with no history waits for new data.
/// - A marker older than the oldest retained message replays everything.
/// - A marker matching a retained message replays what follows it.
/// - The newest marker, or a marker that matches nothing, waits.
#[must_use]
pub fn resolve(ring: &RingBuffer<Arc<Message>>, marker: Marker) -> CatchUp {
    if marker == 0 {
        return CatchUp::Wait;
    }
    let Ok(oldest) = ring.peek_oldest() else {
        return CatchUp::Wait;
    };
    if oldest.created > marker {
        return CatchUp::Replay { from: 0 };
    }

    // Markers are strictly increasing by logical index.
    let (mut lo, mut hi) = (0, ring.len());
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let Ok(candidate) = ring.ith(mid) else {
            return CatchUp::Wait;
        };
        if candidate.created < marker {
            lo = mid + 1;
        } else {
            hi = mid;
        }
    }

    match ring.ith(lo) {
        Ok(found) if found.created == marker && lo + 1 < ring.len() => {
            CatchUp::Replay { from: lo + 1 }
        }
        _ => CatchUp::Wait,
    }
}
