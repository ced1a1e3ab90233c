//! Fixed-capacity ring buffer shared between interrupt handlers and tasks.

use core::cell::UnsafeCell;

use heapless::Deque;

use crate::platform;

struct Ring<T, const N: usize> {
    items: Deque<T, N>,
    max_full: usize,
}

/// A circular buffer of `N` items that overwrites its oldest item when full.
///
/// Storage is inline, so a `RingBuffer` can sit in a `static` and be fed
/// from an interrupt handler while a task drains it. Every operation runs
/// inside a short critical section; none of them allocate or block.
///
/// A capacity of zero is rejected when the type is used:
///
/// ```compile_fail
/// use drogue_cotask::RingBuffer;
///
/// let ring: RingBuffer<u8, 0> = RingBuffer::new();
/// ```
pub struct RingBuffer<T, const N: usize> {
    ring: UnsafeCell<Ring<T, N>>,
}

// SAFETY: all access to `ring` goes through `platform::critical_section`.
unsafe impl<T: Send, const N: usize> Sync for RingBuffer<T, N> {}

impl<T, const N: usize> RingBuffer<T, N> {
    const NON_EMPTY: () = assert!(N > 0, "ring buffer capacity must be non-zero");

    pub const fn new() -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::NON_EMPTY;
        Self {
            ring: UnsafeCell::new(Ring {
                items: Deque::new(),
                max_full: 0,
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Ring<T, N>) -> R) -> R {
        platform::critical_section(|| {
            // SAFETY: we're inside a global critical section and `f` is
            // never handed out beyond this call.
            f(unsafe { &mut *self.ring.get() })
        })
    }

    /// Append `value`, discarding the oldest item if the buffer is full.
    ///
    /// Returns the discarded item, if any.
    pub fn put(&self, value: T) -> Option<T> {
        self.with(|ring| {
            let dropped = if ring.items.is_full() {
                ring.items.pop_front()
            } else {
                None
            };
            if ring.items.push_back(value).is_err() {
                unreachable!("ring still full after dropping its oldest item");
            }
            ring.max_full = ring.max_full.max(ring.items.len());
            dropped
        })
    }

    /// Append `value` only if there is room; otherwise hand it back.
    pub fn try_put(&self, value: T) -> Result<(), T> {
        self.with(|ring| {
            ring.items.push_back(value)?;
            ring.max_full = ring.max_full.max(ring.items.len());
            Ok(())
        })
    }

    /// Remove and return the oldest item, or `None` if there is no data.
    pub fn get(&self) -> Option<T> {
        self.with(|ring| ring.items.pop_front())
    }

    pub fn any(&self) -> bool {
        self.with(|ring| !ring.items.is_empty())
    }

    pub fn empty(&self) -> bool {
        !self.any()
    }

    pub fn full(&self) -> bool {
        self.with(|ring| ring.items.is_full())
    }

    /// Number of items currently held.
    pub fn available(&self) -> usize {
        self.with(|ring| ring.items.len())
    }

    /// Largest number of items held at once since creation or the last
    /// [`clear`](Self::clear).
    pub fn max_full(&self) -> usize {
        self.with(|ring| ring.max_full)
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Forget all held items and reset the high-water mark.
    pub fn clear(&self) {
        self.with(|ring| {
            ring.items.clear();
            ring.max_full = 0;
        })
    }
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::RingBuffer;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn fifo_within_capacity() {
        let ring = RingBuffer::<u32, 8>::new();
        for i in 0..5 {
            assert_eq!(ring.put(i), None);
        }
        assert_eq!(ring.available(), 5);
        for i in 0..5 {
            assert_eq!(ring.get(), Some(i));
        }
        assert_eq!(ring.get(), None);
        assert!(ring.empty());
    }

    #[test]
    fn overflow_discards_oldest() {
        let ring = RingBuffer::<u32, 3>::new();
        ring.put(1);
        ring.put(2);
        ring.put(3);
        assert!(ring.full());
        assert_eq!(ring.put(4), Some(1));
        assert_eq!(ring.available(), 3);
        assert_eq!(ring.max_full(), 3);

        assert_eq!(ring.get(), Some(2));
        assert_eq!(ring.max_full(), 3);
        assert_eq!(ring.get(), Some(3));
        assert_eq!(ring.get(), Some(4));
        assert_eq!(ring.get(), None);
        assert_eq!(ring.max_full(), 3);
    }

    #[test]
    fn high_water_mark_tracks_peak() {
        let ring = RingBuffer::<u8, 4>::new();
        ring.put(1);
        ring.put(2);
        ring.get();
        ring.get();
        ring.put(3);
        assert_eq!(ring.available(), 1);
        assert_eq!(ring.max_full(), 2);
    }

    #[test]
    fn try_put_rejects_when_full() {
        let ring = RingBuffer::<u8, 2>::new();
        assert_eq!(ring.try_put(1), Ok(()));
        assert_eq!(ring.try_put(2), Ok(()));
        assert_eq!(ring.try_put(3), Err(3));
        assert_eq!(ring.get(), Some(1));
        assert_eq!(ring.get(), Some(2));
    }

    #[test]
    fn clear_behaves_like_new() {
        let ring = RingBuffer::<u8, 2>::new();
        ring.put(1);
        ring.put(2);
        ring.put(3);
        ring.clear();
        assert_eq!(ring.available(), 0);
        assert_eq!(ring.max_full(), 0);
        assert!(!ring.any());

        ring.put(9);
        assert_eq!(ring.max_full(), 1);
        assert_eq!(ring.get(), Some(9));
        assert_eq!(ring.get(), None);
    }

    #[test]
    fn wraps_around_repeatedly() {
        let ring = RingBuffer::<u32, 4>::new();
        for round in 0..5 {
            for i in 0..3 {
                ring.put(round * 10 + i);
            }
            for i in 0..3 {
                assert_eq!(ring.get(), Some(round * 10 + i));
            }
        }
        assert_eq!(ring.max_full(), 3);
    }

    #[test]
    fn interrupt_producer_never_corrupts_order() {
        static RING: RingBuffer<u32, 16> = RingBuffer::new();
        static DONE: AtomicBool = AtomicBool::new(false);

        let producer = thread::spawn(|| {
            for i in 0..10_000u32 {
                RING.put(i);
            }
            DONE.store(true, Ordering::Release);
        });

        let mut last = None;
        loop {
            let finished = DONE.load(Ordering::Acquire);
            while let Some(value) = RING.get() {
                if let Some(prev) = last {
                    assert!(value > prev, "{} arrived after {}", value, prev);
                }
                last = Some(value);
            }
            if finished && RING.empty() {
                break;
            }
        }
        producer.join().unwrap();

        assert_eq!(last, Some(9_999));
        assert!(RING.available() <= RING.capacity());
    }
}
