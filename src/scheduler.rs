//! The cooperative priority scheduler.

use core::cmp::Reverse;
use core::fmt::{self, Display, Formatter};

use heapless::Vec;

use crate::error::{DispatchError, SpawnError};
use crate::platform;
use crate::task::{Task, TaskId};
use crate::time::Clock;

/// Default size of the task table.
pub const DEFAULT_MAX_TASKS: usize = 8;

/// An ordered set of tasks and the loop that steps them.
///
/// Each call to [`run_once`](Scheduler::run_once) steps exactly one ready
/// task: the one with the highest [`Priority`](crate::Priority), and among
/// equals the one that ran least recently. A running step is never cut
/// short, so a task that becomes ready mid-step runs at the next call.
///
/// There is no aging. An always-ready task starves every lower-priority one.
pub struct Scheduler<'a, C, const N: usize = DEFAULT_MAX_TASKS>
where
    C: Clock,
{
    clock: C,
    tasks: Vec<Task<'a>, N>,
    dispatches: u64,
}

impl<'a, C, const N: usize> Scheduler<'a, C, N>
where
    C: Clock,
{
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            tasks: Vec::new(),
            dispatches: 0,
        }
    }

    /// Add a task. Periodic tasks fall due `phase` after this call.
    pub fn register(&mut self, mut task: Task<'a>) -> Result<TaskId, SpawnError> {
        task.arm(self.clock.now_us());
        let id = TaskId::new(self.tasks.len());
        log::debug!(
            "registering {} at priority {} period {:?}",
            task.name(),
            task.priority(),
            task.period_us()
        );
        self.tasks.push(task).map_err(|_| SpawnError::TaskListFull)?;
        Ok(id)
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, id: TaskId) -> Option<&Task<'a>> {
        self.tasks.get(id.index())
    }

    pub fn tasks(&self) -> impl Iterator<Item = (TaskId, &Task<'a>)> {
        self.tasks
            .iter()
            .enumerate()
            .map(|(index, task)| (TaskId::new(index), task))
    }

    /// Have `id` run at the next opportunity even if it is not due.
    pub fn go(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(id.index()) {
            task.go();
        }
    }

    pub fn set_period(&mut self, id: TaskId, period_us: Option<u64>) {
        let now = self.clock.now_us();
        if let Some(task) = self.tasks.get_mut(id.index()) {
            log::debug!("{} period now {:?}", task.name(), period_us);
            task.set_period(period_us, now);
        }
    }

    pub fn reset_profile(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.get_mut(id.index()) {
            task.reset_profile();
        }
    }

    /// Number of steps dispatched so far.
    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    /// Step the most urgent ready task once.
    ///
    /// Returns the task that ran, or `None` if nothing was ready.
    pub fn run_once(&mut self) -> Result<Option<TaskId>, DispatchError> {
        if !platform::in_thread_mode() {
            return Err(DispatchError::InterruptContext);
        }
        let now = self.clock.now_us();
        match self.select(now) {
            Some(index) => self.dispatch(index, now).map(Some),
            None => Ok(None),
        }
    }

    /// Step every task that is ready now, most urgent first.
    ///
    /// Returns how many ran. A fault stops the sweep and is returned; the
    /// tasks after it run on the next sweep.
    pub fn run_sweep(&mut self) -> Result<usize, DispatchError> {
        if !platform::in_thread_mode() {
            return Err(DispatchError::InterruptContext);
        }
        let now = self.clock.now_us();
        let mut ready: Vec<usize, N> = Vec::new();
        for (index, task) in self.tasks.iter_mut().enumerate() {
            task.refresh(now);
            if task.is_ready(now) && ready.push(index).is_err() {
                unreachable!("more ready tasks than task slots");
            }
        }
        ready.sort_unstable_by_key(|&index| self.urgency(index));
        for (ran, &index) in ready.iter().rev().enumerate() {
            let now = self.clock.now_us();
            if let Err(error) = self.dispatch(index, now) {
                log::trace!("sweep stopped after {} tasks", ran);
                return Err(error);
            }
        }
        Ok(ready.len())
    }

    /// Dispatch forever, idling the core whenever nothing is ready.
    ///
    /// Faults have already taken the offending task out of dispatch when
    /// `on_error` sees them.
    pub fn run_forever<F>(&mut self, mut on_error: F) -> !
    where
        F: FnMut(DispatchError),
    {
        loop {
            match self.run_once() {
                Ok(Some(_)) => {}
                Ok(None) => platform::wait_for_interrupt(),
                Err(error) => on_error(error),
            }
        }
    }

    fn urgency(&self, index: usize) -> impl Ord {
        let task = &self.tasks[index];
        (task.priority(), Reverse(task.last_dispatch()), Reverse(index))
    }

    fn select(&mut self, now: u64) -> Option<usize> {
        for task in self.tasks.iter_mut() {
            task.refresh(now);
        }
        (0..self.tasks.len())
            .filter(|&index| self.tasks[index].is_ready(now))
            .max_by_key(|&index| self.urgency(index))
    }

    fn dispatch(&mut self, index: usize, now: u64) -> Result<TaskId, DispatchError> {
        self.dispatches += 1;
        let id = TaskId::new(index);
        let task = &mut self.tasks[index];
        log::trace!("dispatch #{} -> {}", self.dispatches, task.name());
        match task.run(self.dispatches, now, &self.clock) {
            Ok(_) => Ok(id),
            Err(fault) => {
                log::error!("task {} faulted: {}; removed from dispatch", task.name(), fault);
                Err(DispatchError::TaskFault { task: id, fault })
            }
        }
    }
}

impl<C, const N: usize> Display for Scheduler<'_, C, N>
where
    C: Clock,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "TASK             PRI    PERIOD    RUNS   AVG DUR   MAX DUR  AVG LATE  MAX LATE"
        )?;
        let mut order: Vec<usize, N> = (0..self.tasks.len()).collect();
        order.sort_unstable_by_key(|&index| (Reverse(self.tasks[index].priority()), index));
        for &index in order.iter() {
            writeln!(f, "{}", self.tasks[index])?;
        }
        Ok(())
    }
}
