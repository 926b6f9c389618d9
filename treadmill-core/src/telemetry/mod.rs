//! Outbound side of the controller: UI observers, sample persistence and a
//! bounded in-memory event history.
//!
//! Observers are called from the monitor worker and from command workers, so
//! implementations must be thread-safe or marshal to their own thread;
//! [`ChannelObserver`] does the latter over a crossbeam channel.

use core::fmt;
use std::time::{Duration, Instant, SystemTime};

use crossbeam::channel::Sender;
use heapless::{HistoryBuf, OldestOrdered};

use crate::error::{ControlError, PersistenceError};
use crate::sequences::{Phase, SequenceKind};
use crate::state::AppStatus;

/// Operator-facing operations, used to label workers and failures.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Operation {
    Start,
    Stop,
    Reset,
    Walk,
    Run,
    Toggle,
    NudgeSpeed,
    NudgeGrade,
    SetSpeed,
    SetGrade,
    Interval,
    Preset,
}

impl Operation {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Operation::Start => "start",
            Operation::Stop => "stop",
            Operation::Reset => "reset",
            Operation::Walk => "walk",
            Operation::Run => "run",
            Operation::Toggle => "toggle",
            Operation::NudgeSpeed => "nudge-speed",
            Operation::NudgeGrade => "nudge-grade",
            Operation::SetSpeed => "set-speed",
            Operation::SetGrade => "set-grade",
            Operation::Interval => "interval",
            Operation::Preset => "preset",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// UI sink for controller updates. Every method defaults to a no-op.
pub trait Observer: Send + Sync {
    /// Device status string (verbatim) or a bring-up phase label.
    fn on_status_text(&self, _text: &str) {}
    /// Current speed in km/h.
    fn on_speed(&self, _kmh: f64) {}
    /// Current grade in percent.
    fn on_grade(&self, _percent: f64) {}
    /// Time since the session started.
    fn on_elapsed(&self, _elapsed: Duration) {}
    /// Whether the interval countdown should be shown.
    fn on_interval_visible(&self, _visible: bool) {}
    /// Time left in the running interval effort.
    fn on_interval_remaining(&self, _remaining: Duration) {}
    /// Application status changed.
    fn on_app_status(&self, _status: AppStatus) {}
    /// A dispatched command failed.
    fn on_command_failed(&self, _operation: Operation, _error: &ControlError) {}
}

/// Observer that drops every update.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullObserver;

impl Observer for NullObserver {}

/// Owned form of an observer callback.
#[derive(Clone, Debug, PartialEq)]
pub enum UiEvent {
    StatusText(String),
    Speed(f64),
    Grade(f64),
    Elapsed(Duration),
    IntervalVisible(bool),
    IntervalRemaining(Duration),
    AppStatus(AppStatus),
    CommandFailed { operation: Operation, message: String },
}

/// Forwards observer callbacks to a rendering thread.
///
/// Sends never block; events are dropped once the receiver is gone.
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    tx: Sender<UiEvent>,
}

impl ChannelObserver {
    #[must_use]
    pub fn new(tx: Sender<UiEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            log::trace!("ui channel closed; dropping event");
        }
    }
}

impl Observer for ChannelObserver {
    fn on_status_text(&self, text: &str) {
        self.send(UiEvent::StatusText(text.to_string()));
    }

    fn on_speed(&self, kmh: f64) {
        self.send(UiEvent::Speed(kmh));
    }

    fn on_grade(&self, percent: f64) {
        self.send(UiEvent::Grade(percent));
    }

    fn on_elapsed(&self, elapsed: Duration) {
        self.send(UiEvent::Elapsed(elapsed));
    }

    fn on_interval_visible(&self, visible: bool) {
        self.send(UiEvent::IntervalVisible(visible));
    }

    fn on_interval_remaining(&self, remaining: Duration) {
        self.send(UiEvent::IntervalRemaining(remaining));
    }

    fn on_app_status(&self, status: AppStatus) {
        self.send(UiEvent::AppStatus(status));
    }

    fn on_command_failed(&self, operation: Operation, error: &ControlError) {
        self.send(UiEvent::CommandFailed {
            operation,
            message: error.to_string(),
        });
    }
}

/// Speed/grade pair handed to the persistence sink.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Sample {
    pub speed: f64,
    pub grade: f64,
    pub timestamp: SystemTime,
}

/// Destination for speed/grade samples.
pub trait PersistenceSink: Send {
    /// Stores one sample.
    ///
    /// # Errors
    ///
    /// Returns an error if the sample could not be stored.
    fn record_sample(&mut self, sample: &Sample) -> Result<(), PersistenceError>;
}

/// Sink that discards samples.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullSink;

impl PersistenceSink for NullSink {
    fn record_sample(&mut self, _: &Sample) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Writes `sample`, retrying exactly once after a failure.
///
/// Sinks are expected to discard broken connections or handles before the
/// second attempt.
///
/// # Errors
///
/// Returns the error of the second attempt.
pub fn record_with_retry(
    sink: &mut dyn PersistenceSink,
    sample: &Sample,
) -> Result<(), PersistenceError> {
    match sink.record_sample(sample) {
        Ok(()) => Ok(()),
        Err(first) => {
            log::warn!("sample write failed, retrying once: {first}");
            sink.record_sample(sample)
        }
    }
}

/// Device status caption shown on the display.
#[must_use]
pub fn status_caption(raw: &str) -> &str {
    match raw {
        "inuse" => "Treadmill Running",
        "paused" => "Paused",
        "walk" => "Walk",
        "idle" => "Treadmill Controller",
        "finished" => "Finished",
        other => other,
    }
}

/// Formats a duration as `MM:SS.ss`.
#[must_use]
pub fn format_clock(duration: Duration) -> String {
    let centis = duration.as_millis() / 10;
    let minutes = centis / 6_000;
    let seconds = (centis % 6_000) / 100;
    let hundredths = centis % 100;
    format!("{minutes:02}:{seconds:02}.{hundredths:02}")
}

/// Identifier assigned to each history record.
pub type EventId = u32;

/// Events kept in the history ring.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TelemetryEvent {
    PhaseEntered(Phase),
    StatusChanged { from: AppStatus, to: AppStatus },
    CommandIssued(Operation),
    CommandFailed(Operation),
    SequenceCompleted(SequenceKind),
    PollFailed,
    SamplePersisted { speed: f64, grade: f64 },
    PersistenceFailed,
}

impl fmt::Display for TelemetryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEvent::PhaseEntered(phase) => write!(f, "phase {phase}"),
            TelemetryEvent::StatusChanged { from, to } => write!(f, "status {from} -> {to}"),
            TelemetryEvent::CommandIssued(op) => write!(f, "command {op}"),
            TelemetryEvent::CommandFailed(op) => write!(f, "command {op} failed"),
            TelemetryEvent::SequenceCompleted(kind) => write!(f, "sequence {kind} complete"),
            TelemetryEvent::PollFailed => f.write_str("poll failed"),
            TelemetryEvent::SamplePersisted { speed, grade } => {
                write!(f, "sample {speed:.1} km/h {grade:.1} %")
            }
            TelemetryEvent::PersistenceFailed => f.write_str("sample write failed"),
        }
    }
}

/// Number of history records retained.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp: Instant,
    pub event: TelemetryEvent,
}

/// Records controller events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: HistoryBuf<TelemetryRecord, CAPACITY>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Appends an event, evicting the oldest when full.
    pub fn record(&mut self, event: TelemetryEvent, timestamp: Instant) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
        });
        id
    }

    /// Recorded events in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}
