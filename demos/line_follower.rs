//! A line-following robot's task layout, with simulated hardware.
//!
//! Background threads play the encoder and button interrupts. Tasks read
//! the encoder queue, run a small course state machine and publish motor
//! efforts through shares.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use drogue_cotask::{Body, Clock, Fault, Priority, Queue, Scheduler, Share, StateId, StdClock, Task};
use log::LevelFilter;
use simple_logger::SimpleLogger;

static ENCODER_TICKS: Queue<i32, 16> = Queue::named("encoder");
static BUTTON_PRESSED: Share<bool> = Share::named("button", false);
static POSITION: Share<i64> = Share::named("position", 0);
static EFFORT_LEFT: Share<i16> = Share::named("effort_l", 0);
static EFFORT_RIGHT: Share<i16> = Share::named("effort_r", 0);
static MOTORS_ENABLED: Share<bool> = Share::named("enabled", true);
static STOP: AtomicBool = AtomicBool::new(false);

struct EncoderUpdate;

impl Body for EncoderUpdate {
    fn step(&mut self) -> Result<StateId, Fault> {
        while let Some(delta) = ENCODER_TICKS.get() {
            POSITION.update(|p| p + i64::from(delta));
        }
        Ok(0)
    }
}

struct Button;

impl Body for Button {
    fn step(&mut self) -> Result<StateId, Fault> {
        if BUTTON_PRESSED.get() {
            BUTTON_PRESSED.put(false);
            let enabled = MOTORS_ENABLED.update(|on| !on);
            log::info!("motors {}", if enabled { "enabled" } else { "disabled" });
        }
        Ok(0)
    }
}

#[derive(Copy, Clone)]
enum Leg {
    FollowLine,
    Turn { until: i64 },
    Straight { until: i64 },
    Finished,
}

impl Leg {
    fn id(self) -> StateId {
        match self {
            Leg::FollowLine => 1,
            Leg::Turn { .. } => 2,
            Leg::Straight { .. } => 3,
            Leg::Finished => 4,
        }
    }
}

struct Course {
    leg: Leg,
    default_effort: i16,
}

impl Body for Course {
    fn step(&mut self) -> Result<StateId, Fault> {
        let position = POSITION.get();
        let (left, right, next) = match self.leg {
            Leg::FollowLine if position >= 400 => (0, 0, Leg::Turn { until: position + 100 }),
            Leg::FollowLine => (self.default_effort, self.default_effort, Leg::FollowLine),
            Leg::Turn { until } if position >= until => (0, 0, Leg::Straight { until: position + 200 }),
            Leg::Turn { until } => (-15, 15, Leg::Turn { until }),
            Leg::Straight { until } if position >= until => (0, 0, Leg::Finished),
            Leg::Straight { until } => (self.default_effort, self.default_effort, Leg::Straight { until }),
            Leg::Finished => (0, 0, Leg::Finished),
        };
        if position > 10_000 {
            return Err(Fault::new("ran off the course"));
        }
        let enabled = MOTORS_ENABLED.get();
        EFFORT_LEFT.put(if enabled { left } else { 0 });
        EFFORT_RIGHT.put(if enabled { right } else { 0 });
        self.leg = next;
        Ok(next.id())
    }
}

fn main() {
    SimpleLogger::new().with_level(LevelFilter::Info).init().unwrap();

    let encoder_isr = thread::spawn(|| {
        while !STOP.load(Ordering::Relaxed) {
            let effort = i32::from(EFFORT_LEFT.get().abs().max(EFFORT_RIGHT.get().abs()));
            ENCODER_TICKS.put(effort / 5 + 1);
            thread::sleep(Duration::from_micros(500));
        }
    });
    let button_isr = thread::spawn(|| {
        thread::sleep(Duration::from_millis(60));
        BUTTON_PRESSED.put(true);
        thread::sleep(Duration::from_millis(40));
        BUTTON_PRESSED.put(true);
    });

    let mut encoder = EncoderUpdate;
    let mut button = Button;
    let mut course = Course {
        leg: Leg::FollowLine,
        default_effort: 30,
    };

    let mut sched: Scheduler<_> = Scheduler::new(StdClock::new());
    sched
        .register(Task::new("Course", Priority(1), &mut course).with_period_us(10_000).with_trace())
        .unwrap();
    sched
        .register(Task::new("Encoder", Priority(2), &mut encoder).with_period_us(2_000))
        .unwrap();
    sched
        .register(Task::new("Button", Priority(4), &mut button).with_period_us(10_000))
        .unwrap();

    while sched.clock().now_us() < 400_000 {
        match sched.run_once() {
            Ok(Some(_)) => {}
            Ok(None) => thread::yield_now(),
            Err(error) => log::error!("{}", error),
        }
    }
    STOP.store(true, Ordering::Relaxed);
    encoder_isr.join().unwrap();
    button_isr.join().unwrap();

    println!("{}", sched);
    for (_, task) in sched.tasks() {
        println!("{}", task.trace_report());
    }
    println!("{}", ENCODER_TICKS);
    println!("{}", POSITION);
}
