//! Single-slot shared values.

use core::any::type_name;
use core::cell::UnsafeCell;
use core::fmt::{self, Display, Formatter};

use crate::platform;

/// The latest value of something, handed between tasks or from an
/// interrupt handler to a task.
///
/// A `Share` always holds a value: it is created with one and every
/// [`put`](Share::put) replaces it. Reads and writes copy the value inside a
/// critical section, so a reader never observes half of a write.
pub struct Share<T: Copy> {
    name: Option<&'static str>,
    value: UnsafeCell<T>,
}

// SAFETY: `value` is only touched inside `platform::critical_section`.
unsafe impl<T: Copy + Send> Sync for Share<T> {}

impl<T: Copy> Share<T> {
    pub const fn new(initial: T) -> Self {
        Self {
            name: None,
            value: UnsafeCell::new(initial),
        }
    }

    pub const fn named(name: &'static str, initial: T) -> Self {
        Self {
            name: Some(name),
            value: UnsafeCell::new(initial),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name.unwrap_or("Share")
    }

    /// A copy of the most recently written value.
    pub fn get(&self) -> T {
        // SAFETY: inside a global critical section.
        platform::critical_section(|| unsafe { *self.value.get() })
    }

    pub fn put(&self, value: T) {
        // SAFETY: inside a global critical section.
        platform::critical_section(|| unsafe { *self.value.get() = value })
    }

    /// Read-modify-write in one critical section; returns the new value.
    ///
    /// Keep `f` short: interrupts stay masked while it runs.
    pub fn update<F>(&self, f: F) -> T
    where
        F: FnOnce(T) -> T,
    {
        platform::critical_section(|| {
            // SAFETY: inside a global critical section.
            let slot = unsafe { &mut *self.value.get() };
            *slot = f(*slot);
            *slot
        })
    }
}

impl<T: Copy> Display for Share<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:<12} Share<{}>", self.name(), type_name::<T>())
    }
}

#[cfg(test)]
mod tests {
    use super::Share;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn get_returns_latest_put() {
        let share = Share::new(0i32);
        assert_eq!(share.get(), 0);
        share.put(42);
        assert_eq!(share.get(), 42);
        share.put(-7);
        assert_eq!(share.get(), -7);
    }

    #[test]
    fn update_is_read_modify_write() {
        let share = Share::new(10u16);
        assert_eq!(share.update(|v| v + 5), 15);
        assert_eq!(share.get(), 15);
    }

    #[test]
    fn display_shows_name_and_type() {
        let share = Share::named("effort", 0i16);
        assert_eq!(share.to_string(), "effort       Share<i16>");
        assert_eq!(Share::new(0u8).name(), "Share");
    }

    #[test]
    fn concurrent_writer_never_tears() {
        static PAIR: Share<(u64, u64)> = Share::new((0, !0));
        static DONE: AtomicBool = AtomicBool::new(false);

        let writer = thread::spawn(|| {
            for i in 1..20_000u64 {
                PAIR.put((i, !i));
            }
            DONE.store(true, Ordering::Release);
        });

        while !DONE.load(Ordering::Acquire) {
            let (a, b) = PAIR.get();
            assert_eq!(a, !b);
        }
        writer.join().unwrap();
        assert_eq!(PAIR.get(), (19_999, !19_999));
    }
}
