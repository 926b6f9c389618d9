//! Application-level view of the treadmill.
//!
//! [`ControlState`] pairs device truth (`current_*`, written only from polls)
//! with operator intent (`target_*`, written only by commands). The
//! application status is derived from polled device status, except for the
//! optimistic Walking/Running values set by walk/run commands, which stand
//! until a poll lands in a different bucket.

use core::fmt;
use std::time::Instant;

use crate::link::StatusReport;

/// Lowest speed the belt accepts, in km/h.
pub const SPEED_FLOOR: f64 = 1.0;
/// Lowest grade the deck accepts, in percent.
pub const GRADE_FLOOR: f64 = 0.0;
/// Target speed while walking.
pub const WALK_SPEED: f64 = 1.0;

/// Application status shown to the operator.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum AppStatus {
    #[default]
    Idle,
    Starting,
    Running,
    Walking,
    Manual,
}

impl AppStatus {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            AppStatus::Idle => "idle",
            AppStatus::Starting => "starting",
            AppStatus::Running => "running",
            AppStatus::Walking => "walking",
            AppStatus::Manual => "manual",
        }
    }

    /// Status after a poll reports `device`.
    ///
    /// `inuse` promotes anything except Running/Walking to Running; unmapped
    /// device strings leave the status alone.
    #[must_use]
    pub const fn after_device(self, device: DeviceState) -> Self {
        match device {
            DeviceState::Idle | DeviceState::Ready => AppStatus::Idle,
            DeviceState::Finished | DeviceState::Manual => AppStatus::Manual,
            DeviceState::InUse => match self {
                AppStatus::Running | AppStatus::Walking => self,
                _ => AppStatus::Running,
            },
            DeviceState::Other => self,
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Buckets the device status strings fall into.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceState {
    Idle,
    Ready,
    InUse,
    Finished,
    Manual,
    Other,
}

impl DeviceState {
    /// Classifies a raw device status string.
    #[must_use]
    pub fn classify(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("idle") {
            DeviceState::Idle
        } else if raw.eq_ignore_ascii_case("ready") {
            DeviceState::Ready
        } else if raw.eq_ignore_ascii_case("inuse") {
            DeviceState::InUse
        } else if raw.eq_ignore_ascii_case("finished") {
            DeviceState::Finished
        } else if raw.eq_ignore_ascii_case("manual") {
            DeviceState::Manual
        } else {
            DeviceState::Other
        }
    }
}

/// Status change caused by a single update.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Transition {
    pub from: AppStatus,
    pub to: AppStatus,
}

/// Adds `delta` to `base`, never dropping below `floor`.
#[must_use]
pub fn nudge(base: f64, delta: f64, floor: f64) -> f64 {
    (base + delta).max(floor)
}

/// Authoritative in-memory model of the session.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ControlState {
    pub status: AppStatus,
    /// Raw status string from the most recent non-empty poll.
    pub device_status: Option<String>,
    pub current_speed: Option<f64>,
    pub current_grade: Option<f64>,
    pub target_speed: Option<f64>,
    pub target_grade: Option<f64>,
    /// Speed to return to when leaving walk.
    pub resume_speed: Option<f64>,
    pub session_start_time: Option<Instant>,
    pub interval_deadline: Option<Instant>,
    pub last_emitted_speed: Option<f64>,
    pub last_emitted_grade: Option<f64>,
}

impl ControlState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds a polled report into the state.
    ///
    /// Returns the status transition, if the report caused one. Leaving an
    /// active or manual session for Idle ends the session clock.
    pub fn apply_report(&mut self, report: &StatusReport) -> Option<Transition> {
        self.current_speed = Some(report.speed_kmh());
        self.current_grade = Some(report.grade_percent());
        self.device_status = Some(report.status.clone());

        let from = self.status;
        let to = from.after_device(DeviceState::classify(&report.status));
        if from == to {
            return None;
        }

        self.status = to;
        if to == AppStatus::Idle && from != AppStatus::Starting {
            self.session_start_time = None;
        }
        Some(Transition { from, to })
    }

    /// Enters Starting and clears the previous session's intent.
    pub fn begin_session(&mut self) -> Option<Transition> {
        self.target_speed = None;
        self.target_grade = None;
        self.resume_speed = None;
        self.session_start_time = None;
        self.set_status(AppStatus::Starting)
    }

    /// Remembers the running speed, drops the target to walking pace.
    pub fn enter_walk(&mut self) -> (f64, Option<Transition>) {
        if let Some(speed) = self.target_speed.or(self.current_speed)
            && self.status != AppStatus::Walking
        {
            self.resume_speed = Some(speed);
        }
        self.target_speed = Some(WALK_SPEED);
        (WALK_SPEED, self.set_status(AppStatus::Walking))
    }

    /// Restores the speed held before walking.
    pub fn enter_run(&mut self) -> (f64, Option<Transition>) {
        let speed = self
            .resume_speed
            .take()
            .or(self.target_speed)
            .or(self.current_speed)
            .map_or(SPEED_FLOOR, |speed| speed.max(SPEED_FLOOR));
        self.target_speed = Some(speed);
        (speed, self.set_status(AppStatus::Running))
    }

    /// Applies a speed nudge and stores the result as the new target.
    pub fn nudge_speed(&mut self, delta: f64) -> f64 {
        let base = self
            .target_speed
            .or(self.current_speed)
            .unwrap_or(SPEED_FLOOR);
        let speed = nudge(base, delta, SPEED_FLOOR);
        self.target_speed = Some(speed);
        speed
    }

    /// Applies a grade nudge and stores the result as the new target.
    pub fn nudge_grade(&mut self, delta: f64) -> f64 {
        let base = self
            .target_grade
            .or(self.current_grade)
            .unwrap_or(GRADE_FLOOR);
        let grade = nudge(base, delta, GRADE_FLOOR);
        self.target_grade = Some(grade);
        grade
    }

    /// Pair to persist on cycle `iteration`, if one is due.
    ///
    /// Due on every `every`-th cycle when the current pair differs from the
    /// last one persisted.
    #[must_use]
    pub fn persist_due(&self, iteration: u64, every: u32) -> Option<(f64, f64)> {
        if every == 0 || iteration % u64::from(every) != 0 {
            return None;
        }
        let speed = self.current_speed?;
        let grade = self.current_grade?;
        let changed =
            self.last_emitted_speed != Some(speed) || self.last_emitted_grade != Some(grade);
        changed.then_some((speed, grade))
    }

    /// Moves the dedupe markers after a successful persist.
    pub fn mark_persisted(&mut self, speed: f64, grade: f64) {
        self.last_emitted_speed = Some(speed);
        self.last_emitted_grade = Some(grade);
    }

    fn set_status(&mut self, to: AppStatus) -> Option<Transition> {
        let from = self.status;
        self.status = to;
        (from != to).then_some(Transition { from, to })
    }
}
