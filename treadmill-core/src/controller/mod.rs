//! Operator command surface.
//!
//! Every method blocks its calling thread until the device has answered;
//! front ends call them through [`Dispatcher`](crate::dispatch::Dispatcher)
//! so the input thread never waits on the link. All link traffic goes
//! through the transport guard, and control state is only locked for short
//! arithmetic, never across a link exchange or a sleep.
//!
//! Lock order: transport guard, then control state. The button panel and
//! the telemetry history are leaves.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::buttons::ButtonDriver;
use crate::clock::{Clock, SystemClock};
use crate::config::{ControllerConfig, Preset};
use crate::error::{ControlError, LinkError, Result};
use crate::link::{DeviceLink, TransportGuard, grade_to_device, speed_to_device};
use crate::monitor::{Monitor, MonitorSettings};
use crate::orchestrator::{SequenceReport, SequenceRunner};
use crate::sequences::{BRINGUP_TEMPLATE, HARD_RESET_TEMPLATE, STOP_TEMPLATE, SequenceTemplate};
use crate::state::{AppStatus, ControlState, SPEED_FLOOR, Transition};
use crate::telemetry::{
    NullObserver, Observer, Operation, PersistenceSink, TelemetryEvent, TelemetryRecord,
    TelemetryRecorder,
};

/// The treadmill controller.
pub struct Controller<L, B> {
    link: TransportGuard<L>,
    buttons: Arc<Mutex<B>>,
    state: Arc<Mutex<ControlState>>,
    observer: Arc<dyn Observer>,
    clock: Arc<dyn Clock>,
    telemetry: Arc<Mutex<TelemetryRecorder>>,
    config: ControllerConfig,
}

impl<L, B> Controller<L, B>
where
    L: DeviceLink,
    B: ButtonDriver,
{
    pub fn new(link: TransportGuard<L>, buttons: B, config: ControllerConfig) -> Self {
        Self {
            link,
            buttons: Arc::new(Mutex::new(buttons)),
            state: Arc::new(Mutex::new(ControlState::new())),
            observer: Arc::new(NullObserver),
            clock: Arc::new(SystemClock),
            telemetry: Arc::new(Mutex::new(TelemetryRecorder::new())),
            config,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn observer(&self) -> Arc<dyn Observer> {
        Arc::clone(&self.observer)
    }

    /// Copy of the current control state.
    pub fn snapshot(&self) -> ControlState {
        self.state.lock().clone()
    }

    pub fn status(&self) -> AppStatus {
        self.state.lock().status
    }

    /// History records, oldest first.
    pub fn recent_events(&self) -> Vec<TelemetryRecord> {
        self.telemetry.lock().oldest_first().copied().collect()
    }

    /// Runs bring-up and starts the session clock.
    ///
    /// Status stays Starting; the monitor promotes it once the device
    /// reports `inuse`. On failure status is left at Starting and the
    /// session clock is not started.
    ///
    /// # Errors
    ///
    /// Returns the first failing bring-up step.
    pub fn start(&self) -> Result<SequenceReport> {
        self.command(Operation::Start, || {
            self.link.with_guard(|link| -> Result<SequenceReport> {
                let transition = self.state.lock().begin_session();
                self.announce(transition);

                let report = SequenceRunner::new(
                    &*self.buttons,
                    self.clock.as_ref(),
                    self.observer.as_ref(),
                    &*self.telemetry,
                )
                .with_link(link)
                .run(BRINGUP_TEMPLATE)?;

                self.state.lock().session_start_time = Some(self.clock.now());
                Ok(report)
            })
        })
    }

    /// Single reset pulse. Status is left to the monitor.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset line could not be pulsed.
    pub fn stop(&self) -> Result<()> {
        self.command(Operation::Stop, || {
            self.link
                .with_guard(|_link| self.run_buttons_only(STOP_TEMPLATE))
                .map(drop)
        })
    }

    /// Double reset pulse.
    ///
    /// Does not wait for the transport guard, so it can recover a session
    /// while another worker is stuck on the link.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset line could not be pulsed.
    pub fn do_reset(&self) -> Result<()> {
        self.command(Operation::Reset, || {
            self.run_buttons_only(HARD_RESET_TEMPLATE).map(drop)
        })
    }

    /// Drops to walking pace, remembering the running speed.
    ///
    /// # Errors
    ///
    /// Returns the link error; status stays Walking.
    pub fn walk(&self) -> Result<()> {
        self.command(Operation::Walk, || {
            let (speed, transition) = self.link.with_guard(|link| {
                let (speed, transition) = self.state.lock().enter_walk();
                send_speed(link, speed).map(|()| (speed, transition))
            })?;
            log::info!("walking at {speed:.1} km/h");
            self.announce(transition);
            Ok(())
        })
    }

    /// Returns to the speed held before walking.
    ///
    /// # Errors
    ///
    /// Returns the link error; status stays Running.
    pub fn run(&self) -> Result<()> {
        self.command(Operation::Run, || {
            let (speed, transition) = self.link.with_guard(|link| {
                let (speed, transition) = self.state.lock().enter_run();
                send_speed(link, speed).map(|()| (speed, transition))
            })?;
            log::info!("running at {speed:.1} km/h");
            self.announce(transition);
            Ok(())
        })
    }

    /// Idle starts a session, Running walks, Walking runs.
    ///
    /// # Errors
    ///
    /// Returns the error of the chosen operation.
    pub fn toggle(&self) -> Result<()> {
        match self.status() {
            AppStatus::Idle => self.start().map(drop),
            AppStatus::Running => self.walk(),
            AppStatus::Walking => self.run(),
            status => {
                log::debug!("toggle ignored while {status}");
                Ok(())
            }
        }
    }

    /// Adds `delta` km/h to the target speed and commands the result.
    ///
    /// # Errors
    ///
    /// Returns the link error; the new target is kept.
    pub fn nudge_speed(&self, delta: f64) -> Result<f64> {
        self.command(Operation::NudgeSpeed, || {
            let speed = self.link.with_guard(|link| {
                let speed = self.state.lock().nudge_speed(delta);
                send_speed(link, speed).map(|()| speed)
            })?;
            log::info!("target speed {speed:.1} km/h");
            Ok(speed)
        })
    }

    /// Adds `delta` percent to the target grade and commands the result.
    ///
    /// # Errors
    ///
    /// Returns the link error; the new target is kept.
    pub fn nudge_grade(&self, delta: f64) -> Result<f64> {
        self.command(Operation::NudgeGrade, || {
            let grade = self.link.with_guard(|link| {
                let grade = self.state.lock().nudge_grade(delta);
                send_grade(link, grade).map(|()| grade)
            })?;
            log::info!("target grade {grade:.1} %");
            Ok(grade)
        })
    }

    /// Commands `kmh` unless the device already reports it.
    ///
    /// Returns whether a command was sent.
    ///
    /// # Errors
    ///
    /// Returns the link error.
    pub fn set_speed_absolute(&self, kmh: f64) -> Result<bool> {
        self.command(Operation::SetSpeed, || {
            self.link.with_guard(|link| -> Result<bool> {
                let current = self.state.lock().current_speed;
                if current.is_some_and(|current| speed_to_device(current) == speed_to_device(kmh)) {
                    return Ok(false);
                }
                send_speed(link, kmh)?;
                Ok(true)
            })
        })
    }

    /// Commands `percent` unless the device already reports it.
    ///
    /// Returns whether a command was sent.
    ///
    /// # Errors
    ///
    /// Returns the link error.
    pub fn set_grade_absolute(&self, percent: f64) -> Result<bool> {
        self.command(Operation::SetGrade, || {
            self.link.with_guard(|link| -> Result<bool> {
                let current = self.state.lock().current_grade;
                if current
                    .is_some_and(|current| grade_to_device(current) == grade_to_device(percent))
                {
                    return Ok(false);
                }
                send_grade(link, percent)?;
                Ok(true)
            })
        })
    }

    /// Runs at `speed` for `duration`, then drops to `end_speed`.
    ///
    /// Blocks the calling thread for the whole interval and cannot be
    /// cancelled; run it on a dedicated worker. The end speed defaults to,
    /// and is floored at, walking pace. Targets are left untouched.
    ///
    /// # Errors
    ///
    /// Returns the link error of either speed command. The interval
    /// deadline is cleared even when the closing command fails. A duration
    /// too long to schedule is rejected before anything is sent.
    pub fn interval_effort(
        &self,
        speed: f64,
        duration: Duration,
        end_speed: Option<f64>,
    ) -> Result<()> {
        self.command(Operation::Interval, || {
            let end_speed = end_speed.map_or(SPEED_FLOOR, |end| end.max(SPEED_FLOOR));
            log::info!("interval: {speed:.1} km/h for {duration:?}, then {end_speed:.1} km/h");

            let deadline = self
                .clock
                .now()
                .checked_add(duration)
                .ok_or(ControlError::IntervalOutOfRange(duration))?;
            self.link.with_guard(|link| send_speed(link, speed))?;
            self.state.lock().interval_deadline = Some(deadline);
            self.observer.on_interval_visible(true);
            self.observer.on_interval_remaining(duration);

            self.clock.sleep(duration);

            let closing = self.link.with_guard(|link| send_speed(link, end_speed));
            self.state.lock().interval_deadline = None;
            self.observer.on_interval_visible(false);
            closing.map_err(Into::into)
        })
    }

    /// Applies the grade, then the speed, of a configured preset.
    ///
    /// # Errors
    ///
    /// Returns the first link error.
    pub fn apply_preset(&self, preset: Preset) -> Result<()> {
        let values = self.config.presets.get(preset);
        log::info!(
            "preset {}: {:.1} km/h at {:.1} %",
            preset.name(),
            values.speed,
            values.grade
        );
        self.set_grade_absolute(values.grade)?;
        self.set_speed_absolute(values.speed)?;
        Ok(())
    }

    /// Builds the status monitor sharing this controller's link and state.
    pub fn monitor(&self, persistence: Box<dyn PersistenceSink>) -> Monitor<L> {
        Monitor::new(
            self.link.clone(),
            Arc::clone(&self.state),
            Arc::clone(&self.observer),
            Arc::clone(&self.clock),
            Arc::clone(&self.telemetry),
            persistence,
            MonitorSettings::from_config(&self.config),
        )
    }

    fn run_buttons_only(&self, template: SequenceTemplate) -> Result<SequenceReport> {
        SequenceRunner::<L, B>::new(
            &*self.buttons,
            self.clock.as_ref(),
            self.observer.as_ref(),
            &*self.telemetry,
        )
        .run(template)
    }

    fn command<T>(&self, operation: Operation, f: impl FnOnce() -> Result<T>) -> Result<T> {
        log::info!("command: {operation}");
        self.record(TelemetryEvent::CommandIssued(operation));
        let result = f();
        if result.is_err() {
            self.record(TelemetryEvent::CommandFailed(operation));
        }
        result
    }

    fn announce(&self, transition: Option<Transition>) {
        if let Some(Transition { from, to }) = transition {
            log::info!("status {from} -> {to}");
            self.record(TelemetryEvent::StatusChanged { from, to });
            self.observer.on_app_status(to);
        }
    }

    fn record(&self, event: TelemetryEvent) {
        self.telemetry.lock().record(event, self.clock.now());
    }
}

fn send_speed<L: DeviceLink + ?Sized>(link: &mut L, kmh: f64) -> Result<(), LinkError> {
    let target = speed_to_device(kmh);
    log::debug!("set_speed {} {}", target.value, target.unit);
    link.set_speed(target.value, target.unit)
}

fn send_grade<L: DeviceLink + ?Sized>(link: &mut L, percent: f64) -> Result<(), LinkError> {
    let target = grade_to_device(percent);
    log::debug!("set_grade {} {}", target.value, target.unit);
    link.set_grade(target.value, target.unit)
}
