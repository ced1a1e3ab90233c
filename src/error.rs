//! Errors surfaced by task registration and dispatch.

use core::fmt::{self, Display, Formatter};

use crate::task::TaskId;

/// Errors caused during `register`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SpawnError {
    /// The scheduler's fixed task table is saturated.
    TaskListFull,
}

impl Display for SpawnError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::TaskListFull => f.write_str("task list is full"),
        }
    }
}

/// Raised by a task body that cannot continue.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Fault {
    reason: &'static str,
}

impl Fault {
    pub const fn new(reason: &'static str) -> Self {
        Self { reason }
    }

    pub fn reason(&self) -> &'static str {
        self.reason
    }
}

impl Display for Fault {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason)
    }
}

/// Errors returned from a dispatch step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DispatchError {
    /// A task body faulted; the task has been taken out of dispatch.
    TaskFault { task: TaskId, fault: Fault },

    /// Dispatch was attempted from an interrupt handler.
    InterruptContext,
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::TaskFault { task, fault } => {
                write!(f, "task {} faulted: {}", task.index(), fault)
            }
            DispatchError::InterruptContext => {
                f.write_str("scheduler dispatch called from interrupt context")
            }
        }
    }
}
