//! Bring-up sequence: powered/unknown device to operator-ready.
//!
//! Double-tap reset (the console sometimes needs two presses to leave a
//! locked state), let the controller board re-initialise for five seconds,
//! reset the protocol state machine, pick user profile 1 on the keypad, then
//! switch the belt into its in-use state. The firmware rejects remote speed
//! commands until a profile is selected.

use core::time::Duration;

use super::{HoldWindow, Phase, SequenceKind, SequenceStep, SequenceTemplate};
use crate::buttons::ButtonId;

/// Hold time for every simulated button press.
pub const BUTTON_PRESS: Duration = Duration::from_millis(100);
/// Shortest press the console registers.
pub const BUTTON_PRESS_MIN: Duration = Duration::from_millis(80);
/// Longest press before the console treats it as a long-press.
pub const BUTTON_PRESS_MAX: Duration = Duration::from_millis(150);
/// Gap between the two reset pulses.
pub const RESET_DOUBLE_TAP_GAP: Duration = Duration::from_millis(250);
/// Time the controller board needs to re-initialise after a reset.
pub const CONTROLLER_SETTLE: Duration = Duration::from_secs(5);
/// Pause before the first keypad press.
pub const KEYPAD_LEAD_IN: Duration = Duration::from_millis(200);
/// Minimum spacing between keypad presses.
pub const KEYPAD_GAP: Duration = Duration::from_millis(500);
/// Pause between selecting the user and entering the in-use state.
pub const START_LEAD_IN: Duration = Duration::from_millis(500);

const PRESS_WINDOW: HoldWindow = HoldWindow::between(BUTTON_PRESS_MIN, BUTTON_PRESS_MAX);

const fn tap(button: ButtonId) -> SequenceStep {
    SequenceStep::press(button, BUTTON_PRESS, PRESS_WINDOW)
}

/// Ordered steps that implement the bring-up sequence.
pub const BRINGUP_STEPS: [SequenceStep; 21] = [
    SequenceStep::Announce(Phase::Resetting),
    tap(ButtonId::Reset),
    SequenceStep::Wait(RESET_DOUBLE_TAP_GAP),
    tap(ButtonId::Reset),
    SequenceStep::Wait(CONTROLLER_SETTLE),
    SequenceStep::Announce(Phase::CsafeReset),
    SequenceStep::LinkReset,
    SequenceStep::Announce(Phase::Idle),
    SequenceStep::LinkGoIdle,
    // Select user profile 1: ENTER, 1, OK.
    SequenceStep::Announce(Phase::UserEnter),
    SequenceStep::Wait(KEYPAD_LEAD_IN),
    tap(ButtonId::Enter),
    SequenceStep::Wait(KEYPAD_GAP),
    tap(ButtonId::One),
    SequenceStep::Wait(KEYPAD_GAP),
    tap(ButtonId::Ok),
    SequenceStep::Wait(KEYPAD_GAP),
    SequenceStep::ReadId,
    SequenceStep::Announce(Phase::Starting),
    SequenceStep::Wait(START_LEAD_IN),
    SequenceStep::LinkGoInUse,
];

/// Sequence template describing bring-up.
pub const BRINGUP_TEMPLATE: SequenceTemplate =
    SequenceTemplate::new(SequenceKind::Bringup, &BRINGUP_STEPS);
