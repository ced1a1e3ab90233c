//! Time sources for the scheduler.

use core::cell::Cell;

/// A monotonic microsecond clock.
pub trait Clock {
    fn now_us(&self) -> u64;
}

/// Any `Fn() -> u64` returning microseconds is a clock.
impl<F> Clock for F
where
    F: Fn() -> u64,
{
    fn now_us(&self) -> u64 {
        self()
    }
}

/// Wall-clock microseconds since the clock was created.
#[cfg(feature = "std")]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for StdClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Extends a free-running 32-bit microsecond counter to 64 bits.
///
/// Hardware timers wrap every ~71.6 minutes at 1 MHz. Each wrap is detected
/// by comparing against the previous reading, so the clock must be read at
/// least once per wrap period. The scheduler reads it on every dispatch.
pub struct WrappingClock<F>
where
    F: Fn() -> u32,
{
    counter: F,
    last: Cell<u32>,
    overflows: Cell<u32>,
}

impl<F> WrappingClock<F>
where
    F: Fn() -> u32,
{
    pub fn new(counter: F) -> Self {
        let last = counter();
        Self {
            counter,
            last: Cell::new(last),
            overflows: Cell::new(0),
        }
    }

    /// Number of times the underlying counter has wrapped.
    pub fn overflows(&self) -> u32 {
        self.overflows.get()
    }
}

impl<F> Clock for WrappingClock<F>
where
    F: Fn() -> u32,
{
    fn now_us(&self) -> u64 {
        let raw = (self.counter)();
        if raw < self.last.get() {
            self.overflows.set(self.overflows.get() + 1);
        }
        self.last.set(raw);
        (u64::from(self.overflows.get()) << 32) | u64::from(raw)
    }
}
