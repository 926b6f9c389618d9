//! Status monitor: polls the device, reconciles control state and fans
//! updates out to observers and the persistence sink.
//!
//! A cycle holds the transport guard only for the status exchange and the
//! state update. Observer callbacks, persistence and sleeping all happen
//! after the guard is released. A failing cycle (link error or panic) is
//! logged and followed by the error backoff; the loop only ends when its
//! shutdown flag is raised.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use crate::clock::Clock;
use crate::config::ControllerConfig;
use crate::error::LinkError;
use crate::link::{DeviceLink, TransportGuard};
use crate::state::{ControlState, Transition};
use crate::telemetry::{
    Observer, PersistenceSink, Sample, TelemetryEvent, TelemetryRecorder, record_with_retry,
};

/// Timing knobs for the monitor loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    /// Persistence is considered every this many successful cycles.
    pub persist_every: u32,
}

impl MonitorSettings {
    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            error_backoff: config.error_backoff(),
            persist_every: config.persist_every_cycles,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&ControllerConfig::default())
    }
}

/// Result of a single successful poll.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CycleOutcome {
    /// The device answered and state was updated.
    Updated,
    /// The device returned an empty answer; nothing changed.
    Empty,
}

/// Everything a poll produced, computed under the guard and emitted after.
struct PollUpdate {
    status_text: String,
    speed: f64,
    grade: f64,
    transition: Option<Transition>,
    elapsed: Option<Duration>,
    interval_remaining: Option<Duration>,
    persist: Option<(f64, f64)>,
}

/// Cloneable flag that stops a running monitor after its current cycle.
#[derive(Clone, Debug, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn request(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Handle to a monitor running on its own thread.
pub struct MonitorHandle {
    shutdown: ShutdownHandle,
    thread: JoinHandle<()>,
}

impl MonitorHandle {
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Raises the shutdown flag and waits for the loop to exit.
    pub fn shutdown_and_join(self) {
        self.shutdown.request();
        if self.thread.join().is_err() {
            log::error!("monitor thread panicked");
        }
    }
}

/// The polling loop.
pub struct Monitor<L> {
    link: TransportGuard<L>,
    state: Arc<Mutex<ControlState>>,
    observer: Arc<dyn Observer>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<Mutex<TelemetryRecorder>>,
    persistence: Box<dyn PersistenceSink>,
    settings: MonitorSettings,
    iteration: u64,
    shutdown: ShutdownHandle,
}

impl<L> Monitor<L>
where
    L: DeviceLink,
{
    pub fn new(
        link: TransportGuard<L>,
        state: Arc<Mutex<ControlState>>,
        observer: Arc<dyn Observer>,
        clock: Arc<dyn Clock>,
        telemetry: Arc<Mutex<TelemetryRecorder>>,
        persistence: Box<dyn PersistenceSink>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            link,
            state,
            observer,
            clock,
            telemetry,
            persistence,
            settings,
            iteration: 0,
            shutdown: ShutdownHandle::default(),
        }
    }

    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Number of completed cycles so far.
    #[must_use]
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Polls the device once and publishes the result.
    ///
    /// # Errors
    ///
    /// Returns the link error; state is left untouched in that case.
    pub fn poll_once(&mut self) -> Result<CycleOutcome, LinkError> {
        let iteration = self.iteration;
        let every = self.settings.persist_every;

        let update = self.link.with_guard(|link| -> Result<_, LinkError> {
            let Some(report) = link.get_status()? else {
                return Ok(None);
            };
            log::debug!("status {report}");

            let now = self.clock.now();
            let speed = report.speed_kmh();
            let grade = report.grade_percent();
            let mut state = self.state.lock();
            let transition = state.apply_report(&report);
            Ok(Some(PollUpdate {
                status_text: report.status,
                speed,
                grade,
                transition,
                elapsed: state
                    .session_start_time
                    .map(|started| now.saturating_duration_since(started)),
                interval_remaining: state
                    .interval_deadline
                    .map(|deadline| deadline.saturating_duration_since(now)),
                persist: state.persist_due(iteration, every),
            }))
        })?;
        self.iteration += 1;

        let Some(update) = update else {
            log::warn!("empty status answer; skipping cycle");
            return Ok(CycleOutcome::Empty);
        };

        self.publish(&update);
        if let Some((speed, grade)) = update.persist {
            self.persist(speed, grade);
        }
        Ok(CycleOutcome::Updated)
    }

    /// Runs one cycle including its trailing sleep; returns the delay used.
    ///
    /// Never fails: errors and panics inside the poll are logged and turned
    /// into the error backoff.
    pub fn cycle(&mut self) -> Duration {
        let delay = match panic::catch_unwind(AssertUnwindSafe(|| self.poll_once())) {
            Ok(Ok(_)) => self.settings.poll_interval,
            Ok(Err(err)) => {
                log::error!("status poll failed: {err}");
                self.record(TelemetryEvent::PollFailed);
                self.settings.error_backoff
            }
            Err(_) => {
                log::error!("status poll panicked");
                self.record(TelemetryEvent::PollFailed);
                self.settings.error_backoff
            }
        };
        self.clock.sleep(delay);
        delay
    }

    /// Cycles until shutdown is requested.
    pub fn run(&mut self) {
        log::info!(
            "monitor running every {:?} (backoff {:?})",
            self.settings.poll_interval,
            self.settings.error_backoff
        );
        while !self.shutdown.is_requested() {
            self.cycle();
        }
        log::info!("monitor stopped after {} cycles", self.iteration);
    }

    fn publish(&self, update: &PollUpdate) {
        self.observer.on_speed(update.speed);
        self.observer.on_grade(update.grade);
        if let Some(elapsed) = update.elapsed {
            self.observer.on_elapsed(elapsed);
        }
        self.observer
            .on_interval_visible(update.interval_remaining.is_some());
        if let Some(remaining) = update.interval_remaining {
            self.observer.on_interval_remaining(remaining);
        }
        self.observer.on_status_text(&update.status_text);

        if let Some(Transition { from, to }) = update.transition {
            log::info!("status {from} -> {to} (device: {})", update.status_text);
            self.record(TelemetryEvent::StatusChanged { from, to });
            self.observer.on_app_status(to);
        }
    }

    fn persist(&mut self, speed: f64, grade: f64) {
        let sample = Sample {
            speed,
            grade,
            timestamp: self.clock.wall_time(),
        };
        match record_with_retry(self.persistence.as_mut(), &sample) {
            Ok(()) => {
                self.state.lock().mark_persisted(speed, grade);
                self.record(TelemetryEvent::SamplePersisted { speed, grade });
            }
            Err(err) => {
                log::error!("dropping sample {speed:.1} km/h {grade:.1} %: {err}");
                self.record(TelemetryEvent::PersistenceFailed);
            }
        }
    }

    fn record(&self, event: TelemetryEvent) {
        self.telemetry.lock().record(event, self.clock.now());
    }
}

impl<L> Monitor<L>
where
    L: DeviceLink + 'static,
{
    /// Moves the monitor onto a named worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the thread could not be spawned.
    pub fn spawn(mut self) -> io::Result<MonitorHandle> {
        let shutdown = self.shutdown.clone();
        let thread = thread::Builder::new()
            .name("treadmill-monitor".into())
            .spawn(move || self.run())?;
        Ok(MonitorHandle { shutdown, thread })
    }
}
