//! Cooperative, priority-ordered tasks for single-core microcontrollers.
//!
//! Tasks are explicit state machines ([`Body`]) stepped one at a time by a
//! [`Scheduler`] the application owns. They exchange data through
//! [`Share`] and [`Queue`], which interrupt handlers may also write into.
//! Nothing allocates: every capacity is a const generic.

#![cfg_attr(not(test), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub extern crate heapless;

pub mod buffer;
pub mod error;
pub mod queue;
pub mod scheduler;
pub mod share;
pub mod task;
pub mod time;

mod platform;

pub use buffer::RingBuffer;
pub use error::{DispatchError, Fault, SpawnError};
pub use queue::Queue;
pub use scheduler::Scheduler;
pub use share::Share;
pub use task::{Body, Priority, Profile, StateId, Task, TaskId, TaskState};
pub use time::{Clock, WrappingClock};

#[cfg(feature = "std")]
pub use time::StdClock;
