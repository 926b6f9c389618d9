//! Reset-button templates: the single stop pulse and the hard double tap.
//!
//! Neither template talks to the link, so both can run without holding the
//! transport guard.

use super::bringup::{BUTTON_PRESS, BUTTON_PRESS_MAX, BUTTON_PRESS_MIN, RESET_DOUBLE_TAP_GAP};
use super::{HoldWindow, SequenceKind, SequenceStep, SequenceTemplate};
use crate::buttons::ButtonId;

const RESET_TAP: SequenceStep = SequenceStep::press(
    ButtonId::Reset,
    BUTTON_PRESS,
    HoldWindow::between(BUTTON_PRESS_MIN, BUTTON_PRESS_MAX),
);

/// One reset pulse; the console stops the belt.
pub const STOP_STEPS: [SequenceStep; 1] = [RESET_TAP];

/// Two reset pulses spaced by the double-tap gap.
pub const HARD_RESET_STEPS: [SequenceStep; 3] = [
    RESET_TAP,
    SequenceStep::Wait(RESET_DOUBLE_TAP_GAP),
    RESET_TAP,
];

pub const STOP_TEMPLATE: SequenceTemplate = SequenceTemplate::new(SequenceKind::Stop, &STOP_STEPS);

pub const HARD_RESET_TEMPLATE: SequenceTemplate =
    SequenceTemplate::new(SequenceKind::HardReset, &HARD_RESET_STEPS);
