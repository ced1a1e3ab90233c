//! Target glue: critical sections, thread-mode detection and idling.
//!
//! Bare-metal ARM builds mask interrupts; hosted builds (feature `std`)
//! serialize on a process-wide lock so host threads can play the part of
//! interrupt handlers in tests.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub use self::arm::{critical_section, in_thread_mode, wait_for_interrupt};

#[cfg(all(not(all(target_arch = "arm", target_os = "none")), feature = "std"))]
pub use self::hosted::{critical_section, in_thread_mode, wait_for_interrupt};

#[cfg(all(not(all(target_arch = "arm", target_os = "none")), not(feature = "std")))]
compile_error!("drogue-cotask needs either a bare-metal ARM target or the `std` feature");

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod arm {
    use cortex_m::peripheral::{scb::VectActive, SCB};

    /// Run `f` with interrupts masked. Nests safely.
    #[inline]
    pub fn critical_section<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        cortex_m::interrupt::free(|_cs| f())
    }

    /// `true` unless called from an exception or interrupt handler.
    #[inline]
    pub fn in_thread_mode() -> bool {
        SCB::vect_active() == VectActive::ThreadMode
    }

    /// Sleep until the next interrupt. The tick source must be an interrupt
    /// for periodic tasks to wake the core.
    #[inline]
    pub fn wait_for_interrupt() {
        cortex_m::asm::wfi();
    }
}

#[cfg(all(not(all(target_arch = "arm", target_os = "none")), feature = "std"))]
mod hosted {
    use std::cell::Cell;
    use std::sync::{Mutex, PoisonError};

    static LOCK: Mutex<()> = Mutex::new(());

    std::thread_local! {
        static HELD: Cell<bool> = Cell::new(false);
    }

    struct Release;

    impl Drop for Release {
        fn drop(&mut self) {
            HELD.with(|held| held.set(false));
        }
    }

    /// Run `f` while holding the global lock. Re-entrant on the owning
    /// thread, like nested interrupt masking.
    pub fn critical_section<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        if HELD.with(Cell::get) {
            return f();
        }
        let _guard = LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        HELD.with(|held| held.set(true));
        let _release = Release;
        f()
    }

    pub fn in_thread_mode() -> bool {
        true
    }

    pub fn wait_for_interrupt() {
        std::thread::yield_now();
    }
}
