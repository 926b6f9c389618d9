//! Step templates for the timed device sequences.
//!
//! A template is an immutable, ordered list of steps: button presses, fixed
//! waits, link commands and phase announcements for the UI. The orchestrator
//! walks a template one step at a time; nothing here touches hardware.

use core::fmt;
use core::time::Duration;

use crate::buttons::ButtonId;

pub mod bringup;
pub mod reset;

pub use bringup::BRINGUP_TEMPLATE;
pub use reset::{HARD_RESET_TEMPLATE, STOP_TEMPLATE};

/// Human-readable phase announced to observers while a sequence runs.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Phase {
    Resetting,
    CsafeReset,
    Idle,
    UserEnter,
    Starting,
}

impl Phase {
    /// Label shown on the status display.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Phase::Resetting => "Resetting",
            Phase::CsafeReset => "CSAFE Reset",
            Phase::Idle => "Idle",
            Phase::UserEnter => "User Enter",
            Phase::Starting => "Starting",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Bounds on how long a button may be held.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HoldWindow {
    pub min_hold: Option<Duration>,
    pub max_hold: Option<Duration>,
}

impl HoldWindow {
    /// Window with no limits.
    #[must_use]
    pub const fn unrestricted() -> Self {
        Self {
            min_hold: None,
            max_hold: None,
        }
    }

    /// Window bounded on both sides.
    #[must_use]
    pub const fn between(min_hold: Duration, max_hold: Duration) -> Self {
        Self {
            min_hold: Some(min_hold),
            max_hold: Some(max_hold),
        }
    }

    /// Validate that a hold duration sits within the window.
    #[must_use]
    pub fn allows(&self, hold: Duration) -> bool {
        if let Some(min) = self.min_hold
            && hold < min
        {
            return false;
        }
        if let Some(max) = self.max_hold
            && hold > max
        {
            return false;
        }
        true
    }
}

/// Single operation in a sequence template.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SequenceStep {
    /// Report a phase name to observers.
    Announce(Phase),
    /// Press and release a console button.
    Press {
        button: ButtonId,
        hold: Duration,
        window: HoldWindow,
    },
    /// Block for a fixed duration.
    Wait(Duration),
    /// Protocol-level reset.
    LinkReset,
    /// Move the device to idle and wait for the answer.
    LinkGoIdle,
    /// Read back the assigned user id.
    ReadId,
    /// Move the device to its in-use state.
    LinkGoInUse,
}

impl SequenceStep {
    /// Press step with a bounded hold window.
    #[must_use]
    pub const fn press(button: ButtonId, hold: Duration, window: HoldWindow) -> Self {
        SequenceStep::Press {
            button,
            hold,
            window,
        }
    }

    /// Returns `true` when the step exchanges data with the device link.
    #[must_use]
    pub const fn needs_link(&self) -> bool {
        matches!(
            self,
            SequenceStep::LinkReset
                | SequenceStep::LinkGoIdle
                | SequenceStep::ReadId
                | SequenceStep::LinkGoInUse
        )
    }

    /// Time the step spends blocked, excluding link round trips.
    #[must_use]
    pub const fn blocking_time(&self) -> Duration {
        match self {
            SequenceStep::Press { hold, .. } => *hold,
            SequenceStep::Wait(duration) => *duration,
            _ => Duration::ZERO,
        }
    }
}

/// The sequences the controller knows how to run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SequenceKind {
    Bringup,
    HardReset,
    Stop,
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceKind::Bringup => f.write_str("bring-up"),
            SequenceKind::HardReset => f.write_str("hard-reset"),
            SequenceKind::Stop => f.write_str("stop"),
        }
    }
}

/// Immutable sequence template.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SequenceTemplate {
    pub kind: SequenceKind,
    pub steps: &'static [SequenceStep],
}

impl SequenceTemplate {
    pub const fn new(kind: SequenceKind, steps: &'static [SequenceStep]) -> Self {
        Self { kind, steps }
    }

    /// Returns the ordered steps that make up the sequence.
    #[must_use]
    pub const fn steps(&self) -> &'static [SequenceStep] {
        self.steps
    }

    /// Returns the number of steps contained in the template.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Returns `true` when any step talks to the device link.
    #[must_use]
    pub fn needs_link(&self) -> bool {
        self.steps.iter().any(SequenceStep::needs_link)
    }

    /// Minimum wall time the sequence blocks its worker for.
    #[must_use]
    pub fn blocking_time(&self) -> Duration {
        self.steps.iter().map(SequenceStep::blocking_time).sum()
    }
}
