//! Time source used by every timed path in the controller.
//!
//! Bring-up waits several seconds and an interval effort blocks for a full
//! minute, so all sleeping goes through [`Clock`]. Production code uses
//! [`SystemClock`]; tests use [`ManualClock`], which advances virtual time
//! instead of blocking and records every requested sleep.

use std::thread;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;

/// Monotonic and wall-clock time plus blocking sleep.
pub trait Clock: Send + Sync {
    /// Monotonic timestamp used for deadlines and elapsed time.
    fn now(&self) -> Instant;

    /// Wall-clock timestamp attached to persisted samples.
    fn wall_time(&self) -> SystemTime;

    /// Blocks the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Real time backed by the operating system.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_time(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Virtual clock that advances only when slept on or explicitly advanced.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    base_wall: SystemTime,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    /// Creates a clock anchored at the current instant.
    #[must_use]
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            base_wall: SystemTime::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Moves virtual time forward without recording a sleep.
    pub fn advance(&self, duration: Duration) {
        *self.offset.lock() += duration;
    }

    /// Virtual time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }

    /// Every sleep requested so far, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().clone()
    }

    /// Sum of every sleep requested so far.
    pub fn total_slept(&self) -> Duration {
        self.sleeps.lock().iter().sum()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }

    fn wall_time(&self) -> SystemTime {
        self.base_wall + *self.offset.lock()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().push(duration);
        self.advance(duration);
        // Looping callers (the monitor) would otherwise starve other threads.
        thread::yield_now();
    }
}
