//! Fixed-capacity ring buffer with oldest-eviction.
//!
//! Logical index `0` is the oldest element and `len() - 1` the newest. The
//! buffer is not synchronized; its owner serializes access.

use thiserror::Error;

/// Ring buffer query errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingError {
    /// The buffer holds no elements.
    #[error("Ring buffer is empty")]
    Empty,

    /// Index past the newest element.
    #[error("Index {index} out of range for length {len}")]
    OutOfRange {
        /// Requested logical index.
        index: usize,
        /// Current length.
        len: usize,
    },
}

/// A circular buffer that overwrites its oldest slot once full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    slots: Vec<T>,
    /// Physical slot of the oldest element once the buffer has wrapped.
    head: usize,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty buffer retaining at most `capacity` elements.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            head: 0,
            capacity,
        }
    }

    /// Maximum number of retained elements.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append `value`, returning the evicted oldest element if the buffer was full.
    ///
    /// A zero-capacity buffer retains nothing: `value` is dropped and nothing
    /// counts as evicted.
    pub fn push(&mut self, value: T) -> Option<T> {
        if self.capacity == 0 {
            return None;
        }
        if self.slots.len() < self.capacity {
            self.slots.push(value);
            return None;
        }
        let evicted = std::mem::replace(&mut self.slots[self.head], value);
        self.head = (self.head + 1) % self.capacity;
        Some(evicted)
    }

    /// Element at logical index `index`.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::OutOfRange`] if `index >= len()`.
    pub fn ith(&self, index: usize) -> Result<&T, RingError> {
        let len = self.slots.len();
        if index >= len {
            return Err(RingError::OutOfRange { index, len });
        }
        Ok(&self.slots[(self.head + index) % len])
    }

    /// The oldest element.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::Empty`] if there are no elements.
    pub fn peek_oldest(&self) -> Result<&T, RingError> {
        if self.is_empty() {
            return Err(RingError::Empty);
        }
        self.ith(0)
    }

    /// The newest element.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::Empty`] if there are no elements.
    pub fn peek_newest(&self) -> Result<&T, RingError> {
        match self.slots.len() {
            0 => Err(RingError::Empty),
            len => self.ith(len - 1),
        }
    }

    /// Remove and return the oldest element.
    ///
    /// # Errors
    ///
    /// Returns [`RingError::Empty`] if there are no elements.
    pub fn pop_oldest(&mut self) -> Result<T, RingError> {
        if self.slots.is_empty() {
            return Err(RingError::Empty);
        }
        // Rotate to logical order so the remaining elements stay contiguous.
        self.slots.rotate_left(self.head);
        self.head = 0;
        Ok(self.slots.remove(0))
    }

    /// Iterate from logical index `from` to the newest element.
    pub fn iter_from(&self, from: usize) -> impl Iterator<Item = &T> + '_ {
        let len = self.slots.len();
        (from.min(len)..len).map(move |i| &self.slots[(self.head + i) % len])
    }

    /// Iterate oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.iter_from(0)
    }

    /// Drop every element.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.head = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(ring: &RingBuffer<u32>) -> Vec<u32> {
        ring.iter().copied().collect()
    }

    #[test]
    fn test_push_below_capacity() {
        let mut ring = RingBuffer::new(3);
        assert!(ring.push(1).is_none());
        assert!(ring.push(2).is_none());
        assert_eq!(ring.len(), 2);
        assert_eq!(contents(&ring), vec![1, 2]);
    }

    #[test]
    fn test_push_evicts_oldest() {
        let mut ring = RingBuffer::new(3);
        for v in 1..=3 {
            assert!(ring.push(v).is_none());
        }
        assert_eq!(ring.push(4), Some(1));
        assert_eq!(ring.push(5), Some(2));
        assert_eq!(ring.len(), 3);
        assert_eq!(contents(&ring), vec![3, 4, 5]);
        assert_eq!(*ring.peek_oldest().unwrap(), 3);
        assert_eq!(*ring.peek_newest().unwrap(), 5);
    }

    #[test]
    fn test_wraps_many_times() {
        let mut ring = RingBuffer::new(4);
        for v in 0..103 {
            ring.push(v);
        }
        assert_eq!(contents(&ring), vec![99, 100, 101, 102]);
        assert_eq!(*ring.ith(0).unwrap(), 99);
        assert_eq!(*ring.ith(3).unwrap(), 102);
    }

    #[test]
    fn test_empty_errors() {
        let ring: RingBuffer<u32> = RingBuffer::new(2);
        assert_eq!(ring.peek_oldest(), Err(RingError::Empty));
        assert_eq!(ring.peek_newest(), Err(RingError::Empty));
        assert_eq!(ring.ith(0), Err(RingError::OutOfRange { index: 0, len: 0 }));
    }

    #[test]
    fn test_ith_out_of_range() {
        let mut ring = RingBuffer::new(2);
        ring.push(7);
        assert_eq!(*ring.ith(0).unwrap(), 7);
        assert_eq!(ring.ith(1), Err(RingError::OutOfRange { index: 1, len: 1 }));
    }

    #[test]
    fn test_zero_capacity_retains_nothing() {
        let mut ring = RingBuffer::new(0);
        assert_eq!(ring.push(1), None);
        assert_eq!(ring.push(2), None);
        assert!(ring.is_empty());
        assert_eq!(ring.peek_newest(), Err(RingError::Empty));
    }

    #[test]
    fn test_pop_oldest_after_wrap() {
        let mut ring = RingBuffer::new(3);
        for v in 1..=5 {
            ring.push(v);
        }
        assert_eq!(ring.pop_oldest(), Ok(3));
        assert_eq!(contents(&ring), vec![4, 5]);

        // Pushing after a pop fills the free slot before evicting again.
        assert!(ring.push(6).is_none());
        assert_eq!(ring.push(7), Some(4));
        assert_eq!(contents(&ring), vec![5, 6, 7]);
    }

    #[test]
    fn test_iter_from() {
        let mut ring = RingBuffer::new(3);
        for v in 1..=4 {
            ring.push(v);
        }
        let tail: Vec<u32> = ring.iter_from(1).copied().collect();
        assert_eq!(tail, vec![3, 4]);
        assert_eq!(ring.iter_from(10).count(), 0);
    }

    #[test]
    fn test_clear() {
        let mut ring = RingBuffer::new(2);
        ring.push(1);
        ring.push(2);
        ring.push(3);
        ring.clear();
        assert!(ring.is_empty());
        assert!(ring.push(4).is_none());
        assert_eq!(contents(&ring), vec![4]);
    }
}
