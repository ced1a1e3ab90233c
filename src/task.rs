//! Tasks: a body to step, plus the bookkeeping the scheduler needs to
//! decide when to step it.

use core::fmt::{self, Display, Formatter};

use heapless::{String, Vec};

use crate::error::Fault;

/// Longest task name kept; longer names are truncated.
pub const NAME_LEN: usize = 16;

/// State transitions kept per traced task.
pub const TRACE_DEPTH: usize = 32;

/// Tag for the state a body reached when it yielded.
pub type StateId = u8;

/// Dispatch priority. **Larger values are more urgent**: when several tasks
/// are ready, the one with the numerically highest priority runs.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub u8);

impl Priority {
    pub const LOWEST: Priority = Priority(0);
    pub const HIGHEST: Priority = Priority(u8::MAX);
}

impl Display for Priority {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// Handle to a registered task, in registration order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TaskId(usize);

impl TaskId {
    pub(crate) const fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Periodic task whose next run is not due yet.
    Waiting,
    /// Eligible for the next dispatch.
    Ready,
    /// Currently stepping its body.
    Running,
    /// The body returned a fault; never dispatched again.
    Faulted,
}

/// The work a task does, written as an explicit state machine.
///
/// Everything the body must remember between steps lives in the
/// implementing type, usually with an enum recording where it left off.
/// Each call to `step` does one bounded slice of work and returns the state
/// tag it reached, which feeds the task's trace.
///
/// ```
/// use drogue_cotask::{Body, Fault, StateId};
///
/// enum Blink { Off, On }
///
/// impl Body for Blink {
///     fn step(&mut self) -> Result<StateId, Fault> {
///         *self = match self {
///             Blink::Off => Blink::On,
///             Blink::On => Blink::Off,
///         };
///         Ok(matches!(self, Blink::On) as StateId)
///     }
/// }
/// ```
pub trait Body {
    fn step(&mut self) -> Result<StateId, Fault>;
}

impl<F> Body for F
where
    F: FnMut() -> Result<StateId, Fault>,
{
    fn step(&mut self) -> Result<StateId, Fault> {
        self()
    }
}

/// Leading runs left out of the duration statistics; they carry start-up cost.
const WARMUP_RUNS: u32 = 2;

/// Run-time statistics for one task.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Profile {
    runs: u32,
    last_us: u64,
    total_us: u64,
    slowest_us: u64,
    late_runs: u32,
    late_total_us: u64,
    latest_us: u64,
}

impl Profile {
    fn record_run(&mut self, duration_us: u64) {
        self.runs = self.runs.wrapping_add(1);
        self.last_us = duration_us;
        if self.runs > WARMUP_RUNS {
            self.total_us = self.total_us.saturating_add(duration_us);
            self.slowest_us = self.slowest_us.max(duration_us);
        }
    }

    fn record_lateness(&mut self, late_us: u64) {
        self.late_runs = self.late_runs.wrapping_add(1);
        self.late_total_us = self.late_total_us.saturating_add(late_us);
        self.latest_us = self.latest_us.max(late_us);
    }

    pub fn runs(&self) -> u32 {
        self.runs
    }

    /// Duration of the most recent step.
    pub fn last_duration_us(&self) -> u64 {
        self.last_us
    }

    /// Mean step duration, not counting the warm-up runs.
    pub fn average_duration_us(&self) -> u64 {
        match self.runs.saturating_sub(WARMUP_RUNS) {
            0 => 0,
            runs => self.total_us / u64::from(runs),
        }
    }

    pub fn slowest_us(&self) -> u64 {
        self.slowest_us
    }

    /// Mean delay between a periodic run falling due and starting.
    pub fn average_lateness_us(&self) -> u64 {
        match self.late_runs {
            0 => 0,
            runs => self.late_total_us / u64::from(runs),
        }
    }

    pub fn latest_us(&self) -> u64 {
        self.latest_us
    }
}

/// One recorded change of a body's state tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TraceEntry {
    pub at_us: u64,
    pub from: StateId,
    pub to: StateId,
}

/// A registered unit of work.
///
/// Built with [`Task::new`] and the `with_*` methods, then handed to
/// [`Scheduler::register`](crate::Scheduler::register).
pub struct Task<'a> {
    name: String<NAME_LEN>,
    priority: Priority,
    period_us: Option<u64>,
    phase_us: u64,
    next_due_us: u64,
    go: bool,
    state: TaskState,
    last_dispatch: u64,
    state_id: StateId,
    profile: Profile,
    tracing: bool,
    trace: Vec<TraceEntry, TRACE_DEPTH>,
    body: &'a mut dyn Body,
}

impl<'a> Task<'a> {
    /// An aperiodic task: ready whenever it is the most urgent one.
    pub fn new(name: &str, priority: Priority, body: &'a mut dyn Body) -> Self {
        Self {
            name: truncated(name),
            priority,
            period_us: None,
            phase_us: 0,
            next_due_us: 0,
            go: false,
            state: TaskState::Ready,
            last_dispatch: 0,
            state_id: 0,
            profile: Profile::default(),
            tracing: false,
            trace: Vec::new(),
            body,
        }
    }

    /// Run every `period_us` microseconds.
    pub fn with_period_us(mut self, period_us: u64) -> Self {
        self.period_us = Some(period_us);
        self
    }

    /// Delay the first run by `phase_us` after registration.
    pub fn with_phase_us(mut self, phase_us: u64) -> Self {
        self.phase_us = phase_us;
        self
    }

    /// Record state-tag transitions, up to [`TRACE_DEPTH`] of them.
    pub fn with_trace(mut self) -> Self {
        self.tracing = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn period_us(&self) -> Option<u64> {
        self.period_us
    }

    pub fn next_due_us(&self) -> Option<u64> {
        self.period_us.map(|_| self.next_due_us)
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    pub fn trace_report(&self) -> TraceReport<'_, 'a> {
        TraceReport { task: self }
    }

    pub(crate) fn arm(&mut self, now_us: u64) {
        self.next_due_us = now_us.saturating_add(self.phase_us);
        self.refresh(now_us);
    }

    pub(crate) fn go(&mut self) {
        self.go = true;
    }

    /// A task turning periodic is due at once; otherwise the pending due
    /// time is kept.
    pub(crate) fn set_period(&mut self, period_us: Option<u64>, now_us: u64) {
        if self.period_us.is_none() {
            self.next_due_us = now_us;
        }
        self.period_us = period_us;
        self.refresh(now_us);
    }

    pub(crate) fn reset_profile(&mut self) {
        self.profile = Profile::default();
    }

    pub(crate) fn last_dispatch(&self) -> u64 {
        self.last_dispatch
    }

    fn is_due(&self, now_us: u64) -> bool {
        self.period_us.is_some() && now_us >= self.next_due_us
    }

    pub(crate) fn is_ready(&self, now_us: u64) -> bool {
        self.state != TaskState::Faulted
            && (self.go || self.period_us.is_none() || self.is_due(now_us))
    }

    pub(crate) fn refresh(&mut self, now_us: u64) {
        if self.state == TaskState::Faulted {
            return;
        }
        self.state = if self.is_ready(now_us) {
            TaskState::Ready
        } else {
            TaskState::Waiting
        };
    }

    /// Step the body once. `now_us` is the dispatch time, `started_us` and
    /// `finished_us` bracket the step.
    pub(crate) fn run<C>(&mut self, dispatch: u64, now_us: u64, clock: &C) -> Result<StateId, Fault>
    where
        C: crate::time::Clock + ?Sized,
    {
        let due = self.is_due(now_us);
        self.state = TaskState::Running;

        let started_us = clock.now_us();
        let result = self.body.step();
        let finished_us = clock.now_us();

        self.go = false;
        self.last_dispatch = dispatch;

        let reached = match result {
            Ok(reached) => reached,
            Err(fault) => {
                self.state = TaskState::Faulted;
                return Err(fault);
            }
        };

        if let (true, Some(period)) = (due, self.period_us) {
            self.profile.record_lateness(now_us - self.next_due_us);
            self.next_due_us = self.next_due_us.saturating_add(period);
        }
        self.profile.record_run(finished_us.saturating_sub(started_us));
        self.record_transition(reached, finished_us);
        self.refresh(finished_us);
        Ok(reached)
    }

    fn record_transition(&mut self, reached: StateId, at_us: u64) {
        if self.tracing && reached != self.state_id {
            let entry = TraceEntry {
                at_us,
                from: self.state_id,
                to: reached,
            };
            if self.trace.push(entry).is_err() {
                self.tracing = false;
            }
        }
        self.state_id = reached;
    }
}

impl Display for Task<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:<16}{:>4}", self.name(), self.priority)?;
        match self.period_us {
            Some(period) => write!(f, "{:>10}", period)?,
            None => write!(f, "{:>10}", "-")?,
        }
        let p = &self.profile;
        write!(
            f,
            "{:>8}{:>10}{:>10}",
            p.runs,
            p.average_duration_us(),
            p.slowest_us
        )?;
        if self.period_us.is_some() {
            write!(f, "{:>10}{:>10}", p.average_lateness_us(), p.latest_us)?;
        }
        Ok(())
    }
}

/// Renders a task's trace as `seconds: from -> to` lines.
pub struct TraceReport<'t, 'a> {
    task: &'t Task<'a>,
}

impl Display for TraceReport<'_, '_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Task {}:", self.task.name())?;
        if !self.task.tracing && self.task.trace.is_empty() {
            return f.write_str(" not traced");
        }
        for entry in self.task.trace.iter() {
            write!(
                f,
                "\n{:>5}.{:06}: {:>2} -> {}",
                entry.at_us / 1_000_000,
                entry.at_us % 1_000_000,
                entry.from,
                entry.to
            )?;
        }
        Ok(())
    }
}

fn truncated(name: &str) -> String<NAME_LEN> {
    let mut out = String::new();
    for c in name.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    fn idle() -> Result<StateId, Fault> {
        Ok(0)
    }

    #[test]
    fn names_are_truncated() {
        let mut body = idle;
        let task = Task::new("a-very-long-task-name", Priority(1), &mut body);
        assert_eq!(task.name(), "a-very-long-task");
    }

    #[test]
    fn priority_ordering() {
        assert!(Priority::HIGHEST > Priority(5));
        assert!(Priority(5) > Priority(1));
        assert!(Priority(1) > Priority::LOWEST);
    }

    #[test]
    fn periodic_readiness() {
        let mut body = idle;
        let mut task = Task::new("p", Priority(1), &mut body)
            .with_period_us(100)
            .with_phase_us(50);
        task.arm(1_000);
        assert_eq!(task.next_due_us(), Some(1_050));
        assert!(!task.is_ready(1_049));
        assert!(task.is_ready(1_050));
        assert_eq!(task.state(), TaskState::Waiting);
    }

    #[test]
    fn run_advances_from_scheduled_time() {
        let now = Cell::new(130u64);
        let clock = || now.get();
        let mut body = idle;
        let mut task = Task::new("p", Priority(1), &mut body).with_period_us(100);
        task.arm(0);

        // Late by 130: two periods are owed and the schedule does not slip.
        task.run(1, 130, &clock).unwrap();
        assert_eq!(task.next_due_us(), Some(100));
        assert!(task.is_ready(130));
        task.run(2, 130, &clock).unwrap();
        assert_eq!(task.next_due_us(), Some(200));
        assert!(!task.is_ready(130));

        assert_eq!(task.profile().runs(), 2);
        assert_eq!(task.profile().latest_us(), 130);
        assert_eq!(task.profile().average_lateness_us(), 80);
    }

    #[test]
    fn go_runs_without_shifting_schedule() {
        let clock = || 10u64;
        let mut body = idle;
        let mut task = Task::new("p", Priority(1), &mut body)
            .with_period_us(100)
            .with_phase_us(100);
        task.arm(0);
        assert!(!task.is_ready(10));
        task.go();
        assert!(task.is_ready(10));
        task.run(1, 10, &clock).unwrap();
        assert_eq!(task.next_due_us(), Some(100));
        assert!(!task.is_ready(10));
    }

    #[test]
    fn fault_is_terminal() {
        let clock = || 0u64;
        let mut body = || -> Result<StateId, Fault> { Err(Fault::new("stalled")) };
        let mut task = Task::new("f", Priority(1), &mut body);
        assert_eq!(task.run(1, 0, &clock), Err(Fault::new("stalled")));
        assert_eq!(task.state(), TaskState::Faulted);
        assert!(!task.is_ready(1_000));
        task.refresh(1_000);
        assert_eq!(task.state(), TaskState::Faulted);
    }

    #[test]
    fn durations_are_profiled() {
        let now = Cell::new(0u64);
        let clock = || now.get();
        let mut body = || -> Result<StateId, Fault> {
            now.set(now.get() + 25);
            Ok(0)
        };
        let mut task = Task::new("slow", Priority(1), &mut body);
        for dispatch in 1..=4 {
            task.run(dispatch, now.get(), &clock).unwrap();
        }
        assert_eq!(task.profile().runs(), 4);
        assert_eq!(task.profile().last_duration_us(), 25);
        assert_eq!(task.profile().average_duration_us(), 25);
        assert_eq!(task.profile().slowest_us(), 25);

        task.reset_profile();
        assert_eq!(task.profile().runs(), 0);
    }

    #[test]
    fn warmup_runs_stay_out_of_duration_stats() {
        let now = Cell::new(0u64);
        let clock = || now.get();
        let costs = [500u64, 300, 20, 30];
        let step = Cell::new(0usize);
        let mut body = || -> Result<StateId, Fault> {
            now.set(now.get() + costs[step.get()]);
            step.set(step.get() + 1);
            Ok(0)
        };
        let mut task = Task::new("boot", Priority(1), &mut body);
        task.run(1, now.get(), &clock).unwrap();
        task.run(2, now.get(), &clock).unwrap();
        assert_eq!(task.profile().last_duration_us(), 300);
        assert_eq!(task.profile().average_duration_us(), 0);
        assert_eq!(task.profile().slowest_us(), 0);

        task.run(3, now.get(), &clock).unwrap();
        task.run(4, now.get(), &clock).unwrap();
        assert_eq!(task.profile().runs(), 4);
        assert_eq!(task.profile().average_duration_us(), 25);
        assert_eq!(task.profile().slowest_us(), 30);
    }

    #[test]
    fn trace_records_transitions_until_full() {
        let clock = || 1_500_000u64;
        let step = Cell::new(0u8);
        let mut body = || -> Result<StateId, Fault> {
            step.set(step.get().wrapping_add(1));
            Ok(step.get() / 2)
        };
        let mut task = Task::new("t", Priority(1), &mut body).with_trace();
        for i in 0..200 {
            task.run(i, 0, &clock).unwrap();
        }
        assert_eq!(task.trace().len(), TRACE_DEPTH);
        assert_eq!(
            task.trace()[0],
            TraceEntry {
                at_us: 1_500_000,
                from: 0,
                to: 1
            }
        );
        assert_eq!(task.trace()[1].from, 1);
        assert_eq!(task.trace()[1].to, 2);

        let report = task.trace_report().to_string();
        assert!(report.starts_with("Task t:\n    1.500000:  0 -> 1\n"));
    }

    #[test]
    fn untraced_report() {
        let mut body = idle;
        let task = Task::new("quiet", Priority(1), &mut body);
        assert_eq!(task.trace_report().to_string(), "Task quiet: not traced");
    }
}
