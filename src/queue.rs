//! Named FIFO queues between tasks and interrupt handlers.

use core::any::type_name;
use core::fmt::{self, Display, Formatter};

use crate::buffer::RingBuffer;

/// A FIFO of up to `N` items.
///
/// `get` never blocks: an empty queue yields `None`, and consumers poll with
/// [`any`](Queue::any) on their next step. `put` overwrites the oldest item
/// when the queue is full, so overflow is silent. Callers that must not lose
/// data check [`full`](Queue::full) first, use [`try_put`](Queue::try_put),
/// or compare [`max_full`](Queue::max_full) against the capacity.
pub struct Queue<T, const N: usize> {
    name: Option<&'static str>,
    buffer: RingBuffer<T, N>,
}

impl<T, const N: usize> Queue<T, N> {
    pub const fn new() -> Self {
        Self {
            name: None,
            buffer: RingBuffer::new(),
        }
    }

    pub const fn named(name: &'static str) -> Self {
        Self {
            name: Some(name),
            buffer: RingBuffer::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name.unwrap_or("Queue")
    }

    /// Append `value`; on a full queue the oldest item is discarded and
    /// returned.
    pub fn put(&self, value: T) -> Option<T> {
        self.buffer.put(value)
    }

    /// Append `value` only if there is room.
    pub fn try_put(&self, value: T) -> Result<(), T> {
        self.buffer.try_put(value)
    }

    pub fn get(&self) -> Option<T> {
        self.buffer.get()
    }

    pub fn any(&self) -> bool {
        self.buffer.any()
    }

    pub fn empty(&self) -> bool {
        self.buffer.empty()
    }

    pub fn full(&self) -> bool {
        self.buffer.full()
    }

    pub fn available(&self) -> usize {
        self.buffer.available()
    }

    pub fn max_full(&self) -> usize {
        self.buffer.max_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn clear(&self) {
        self.buffer.clear()
    }
}

impl<T, const N: usize> Default for Queue<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Display for Queue<T, N> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<12} Queue<{}> Max Full {}/{}",
            self.name(),
            type_name::<T>(),
            self.max_full(),
            N
        )
    }
}
