//! Shared fakes for the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use treadmill_core::Controller;
use treadmill_core::buttons::{ButtonAction, ButtonDriver, ButtonId};
use treadmill_core::clock::ManualClock;
use treadmill_core::config::ControllerConfig;
use treadmill_core::error::{ButtonError, ControlError, LinkError, PersistenceError};
use treadmill_core::link::{DeviceLink, Measurement, StatusReport, TransportGuard, Unit};
use treadmill_core::state::AppStatus;
use treadmill_core::telemetry::{Observer, Operation, PersistenceSink, Sample, UiEvent};

/// One call made on [`FakeLink`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkCall {
    GetStatus,
    SetSpeed(i32, Unit),
    SetGrade(i32, Unit),
    Reset,
    GoIdle,
    GoInUse,
    GetId,
}

impl LinkCall {
    fn kind(&self) -> &'static str {
        match self {
            LinkCall::GetStatus => "get_status",
            LinkCall::SetSpeed(..) => "set_speed",
            LinkCall::SetGrade(..) => "set_grade",
            LinkCall::Reset => "reset",
            LinkCall::GoIdle => "go_idle",
            LinkCall::GoInUse => "go_inuse",
            LinkCall::GetId => "get_id",
        }
    }
}

#[derive(Default)]
struct LinkInner {
    calls: Mutex<Vec<LinkCall>>,
    polls: Mutex<VecDeque<Result<Option<StatusReport>, LinkError>>>,
    steady: Mutex<Option<StatusReport>>,
    failures: Mutex<Vec<(&'static str, usize, LinkError)>>,
    exchange_delay: Mutex<Duration>,
    in_exchange: AtomicBool,
    overlaps: AtomicUsize,
}

/// Scripted link that records every call and detects overlapping exchanges.
///
/// Clones share the same script and call log.
#[derive(Clone, Default)]
pub struct FakeLink {
    inner: Arc<LinkInner>,
}

impl FakeLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues answers for upcoming polls.
    pub fn script_polls(
        &self,
        polls: impl IntoIterator<Item = Result<Option<StatusReport>, LinkError>>,
    ) {
        self.inner.polls.lock().extend(polls);
    }

    /// Answer returned once the script runs out.
    pub fn set_steady(&self, report: StatusReport) {
        *self.inner.steady.lock() = Some(report);
    }

    /// Makes the next call named `kind` fail with `error`.
    pub fn fail_next(&self, kind: &'static str, error: LinkError) {
        self.fail_after(kind, 0, error);
    }

    /// Lets `skip` calls named `kind` through, then fails the next one.
    pub fn fail_after(&self, kind: &'static str, skip: usize, error: LinkError) {
        self.inner.failures.lock().push((kind, skip, error));
    }

    /// Real time each exchange takes; widens the window for overlap checks.
    pub fn set_exchange_delay(&self, delay: Duration) {
        *self.inner.exchange_delay.lock() = delay;
    }

    pub fn calls(&self) -> Vec<LinkCall> {
        self.inner.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.inner.calls.lock().clear();
    }

    pub fn speeds(&self) -> Vec<i32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                LinkCall::SetSpeed(value, _) => Some(value),
                _ => None,
            })
            .collect()
    }

    pub fn grades(&self) -> Vec<i32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                LinkCall::SetGrade(value, _) => Some(value),
                _ => None,
            })
            .collect()
    }

    /// Number of times an exchange started while another was in flight.
    pub fn overlaps(&self) -> usize {
        self.inner.overlaps.load(Ordering::SeqCst)
    }

    fn exchange(&self, call: LinkCall) -> Result<(), LinkError> {
        if self.inner.in_exchange.swap(true, Ordering::SeqCst) {
            self.inner.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        let delay = *self.inner.exchange_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let kind = call.kind();
        self.inner.calls.lock().push(call);
        let failure = {
            let mut failures = self.inner.failures.lock();
            match failures.iter().position(|(name, _, _)| *name == kind) {
                Some(index) if failures[index].1 > 0 => {
                    failures[index].1 -= 1;
                    None
                }
                Some(index) => Some(failures.remove(index).2),
                None => None,
            }
        };
        self.inner.in_exchange.store(false, Ordering::SeqCst);
        failure.map_or(Ok(()), Err)
    }
}

impl DeviceLink for FakeLink {
    fn get_status(&mut self) -> Result<Option<StatusReport>, LinkError> {
        self.exchange(LinkCall::GetStatus)?;
        let scripted = self.inner.polls.lock().pop_front();
        match scripted {
            Some(answer) => answer,
            None => Ok(self.inner.steady.lock().clone()),
        }
    }

    fn set_speed(&mut self, value: i32, unit: Unit) -> Result<(), LinkError> {
        self.exchange(LinkCall::SetSpeed(value, unit))
    }

    fn set_grade(&mut self, value: i32, unit: Unit) -> Result<(), LinkError> {
        self.exchange(LinkCall::SetGrade(value, unit))
    }

    fn reset(&mut self) -> Result<(), LinkError> {
        self.exchange(LinkCall::Reset)
    }

    fn go_idle(&mut self) -> Result<(), LinkError> {
        self.exchange(LinkCall::GoIdle)
    }

    fn go_inuse(&mut self) -> Result<(), LinkError> {
        self.exchange(LinkCall::GoInUse)
    }

    fn get_id(&mut self) -> Result<Option<String>, LinkError> {
        self.exchange(LinkCall::GetId)?;
        Ok(Some("1".to_string()))
    }
}

/// Status report in the device's native units.
pub fn report(status: &str, speed_tenths: i32, grade_hundredths: i32) -> StatusReport {
    StatusReport::new(
        status,
        Measurement::new(speed_tenths, Unit::TenthKmPerHour),
        Measurement::new(grade_hundredths, Unit::HundredthPercentGrade),
    )
}

/// Button panel that records every line change.
#[derive(Clone, Default)]
pub struct RecordingButtons {
    actions: Arc<Mutex<Vec<(ButtonId, ButtonAction)>>>,
    fail_on: Arc<Mutex<Option<ButtonId>>>,
}

impl RecordingButtons {
    pub fn actions(&self) -> Vec<(ButtonId, ButtonAction)> {
        self.actions.lock().clone()
    }

    /// Button ids asserted, in order.
    pub fn presses(&self) -> Vec<ButtonId> {
        self.actions()
            .into_iter()
            .filter(|(_, action)| *action == ButtonAction::Assert)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn fail_on(&self, id: ButtonId) {
        *self.fail_on.lock() = Some(id);
    }
}

impl ButtonDriver for RecordingButtons {
    fn apply(&mut self, id: ButtonId, action: ButtonAction) -> Result<(), ButtonError> {
        if action == ButtonAction::Assert && *self.fail_on.lock() == Some(id) {
            return Err(ButtonError::Line {
                pin: 0,
                message: "line busy".to_string(),
            });
        }
        self.actions.lock().push((id, action));
        Ok(())
    }
}

/// Observer that keeps every callback as a [`UiEvent`].
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn status_texts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UiEvent::StatusText(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn app_statuses(&self) -> Vec<AppStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UiEvent::AppStatus(status) => Some(status),
                _ => None,
            })
            .collect()
    }

    pub fn elapsed(&self) -> Vec<Duration> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                UiEvent::Elapsed(elapsed) => Some(elapsed),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: UiEvent) {
        self.events.lock().push(event);
    }
}

impl Observer for RecordingObserver {
    fn on_status_text(&self, text: &str) {
        self.push(UiEvent::StatusText(text.to_string()));
    }

    fn on_speed(&self, kmh: f64) {
        self.push(UiEvent::Speed(kmh));
    }

    fn on_grade(&self, percent: f64) {
        self.push(UiEvent::Grade(percent));
    }

    fn on_elapsed(&self, elapsed: Duration) {
        self.push(UiEvent::Elapsed(elapsed));
    }

    fn on_interval_visible(&self, visible: bool) {
        self.push(UiEvent::IntervalVisible(visible));
    }

    fn on_interval_remaining(&self, remaining: Duration) {
        self.push(UiEvent::IntervalRemaining(remaining));
    }

    fn on_app_status(&self, status: AppStatus) {
        self.push(UiEvent::AppStatus(status));
    }

    fn on_command_failed(&self, operation: Operation, error: &ControlError) {
        self.push(UiEvent::CommandFailed {
            operation,
            message: error.to_string(),
        });
    }
}

/// Persistence sink that keeps samples and can be told to fail.
#[derive(Clone, Default)]
pub struct FakeSink {
    samples: Arc<Mutex<Vec<Sample>>>,
    failures_left: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl FakeSink {
    pub fn samples(&self) -> Vec<(f64, f64)> {
        self.samples
            .lock()
            .iter()
            .map(|sample| (sample.speed, sample.grade))
            .collect()
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl PersistenceSink for FakeSink {
    fn record_sample(&mut self, sample: &Sample) -> Result<(), PersistenceError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(PersistenceError::Rejected("database unavailable".to_string()));
        }
        self.samples.lock().push(*sample);
        Ok(())
    }
}

/// A controller wired to fakes, with handles to inspect them.
pub struct Harness {
    pub controller: Arc<Controller<FakeLink, RecordingButtons>>,
    pub link: FakeLink,
    pub buttons: RecordingButtons,
    pub observer: Arc<RecordingObserver>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ControllerConfig::default())
    }

    pub fn with_config(config: ControllerConfig) -> Self {
        let link = FakeLink::new();
        let buttons = RecordingButtons::default();
        let observer = Arc::new(RecordingObserver::default());
        let clock = Arc::new(ManualClock::new());
        let controller = Controller::new(TransportGuard::new(link.clone()), buttons.clone(), config)
            .with_observer(observer.clone())
            .with_clock(clock.clone());

        Self {
            controller: Arc::new(controller),
            link,
            buttons,
            observer,
            clock,
        }
    }
}
