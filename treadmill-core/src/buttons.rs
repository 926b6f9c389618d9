//! Physical control lines wired across the treadmill console buttons.
//!
//! The firmware only accepts remote commands after a user profile has been
//! picked on its own keypad, and the big red reset button is the only way out
//! of some locked states. Both are reached by pulsing GPIO lines soldered
//! across the console switches.

use std::time::Duration;

use crate::clock::Clock;
use crate::error::ButtonError;

/// Logical console buttons the controller can actuate.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ButtonId {
    Reset,
    Enter,
    One,
    Ok,
}

impl ButtonId {
    /// Deterministic index for lookups into [`ALL_BUTTONS`].
    #[must_use]
    pub const fn as_index(self) -> usize {
        match self {
            ButtonId::Reset => 0,
            ButtonId::Enter => 1,
            ButtonId::One => 2,
            ButtonId::Ok => 3,
        }
    }
}

/// Electrical polarity of a button line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Polarity {
    /// Line idles high and is pulled low to press.
    ActiveLow,
    /// Line idles low and is driven high to press.
    ActiveHigh,
}

/// Metadata describing how a button line is routed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ButtonLine {
    pub id: ButtonId,
    pub name: &'static str,
    pub bcm_pin: u8,
    pub polarity: Polarity,
}

impl ButtonLine {
    pub const fn new(id: ButtonId, name: &'static str, bcm_pin: u8, polarity: Polarity) -> Self {
        Self {
            id,
            name,
            bcm_pin,
            polarity,
        }
    }

    /// Output level that corresponds to `action` on this line.
    #[must_use]
    pub const fn level_for(&self, action: ButtonAction) -> bool {
        match (self.polarity, action) {
            (Polarity::ActiveLow, ButtonAction::Assert)
            | (Polarity::ActiveHigh, ButtonAction::Release) => false,
            (Polarity::ActiveLow, ButtonAction::Release)
            | (Polarity::ActiveHigh, ButtonAction::Assert) => true,
        }
    }
}

/// Compile-time catalog of every button line.
pub const ALL_BUTTONS: [ButtonLine; 4] = [
    ButtonLine::new(ButtonId::Reset, "RESET", 4, Polarity::ActiveLow),
    ButtonLine::new(ButtonId::Enter, "ENTER", 5, Polarity::ActiveHigh),
    ButtonLine::new(ButtonId::One, "ONE", 6, Polarity::ActiveHigh),
    ButtonLine::new(ButtonId::Ok, "OK", 26, Polarity::ActiveHigh),
];

/// Retrieve line metadata by identifier.
#[must_use]
pub const fn button_by_id(id: ButtonId) -> ButtonLine {
    ALL_BUTTONS[id.as_index()]
}

/// Transition applied to a button line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ButtonAction {
    Assert,
    Release,
}

/// Abstraction over the GPIO lines.
pub trait ButtonDriver: Send {
    /// Drives `id` to the level matching `action`.
    fn apply(&mut self, id: ButtonId, action: ButtonAction) -> Result<(), ButtonError>;

    /// Returns every line to its released level.
    fn release_all(&mut self) -> Result<(), ButtonError> {
        for line in &ALL_BUTTONS {
            self.apply(line.id, ButtonAction::Release)?;
        }
        Ok(())
    }

    /// Asserts `id`, holds it for `hold`, then releases it.
    ///
    /// If the assert succeeds but the release fails the line may be left
    /// pressed; callers should follow up with [`release_all`](Self::release_all).
    fn press(
        &mut self,
        id: ButtonId,
        hold: Duration,
        clock: &dyn Clock,
    ) -> Result<(), ButtonError> {
        log::debug!("press {}", button_by_id(id).name);
        self.apply(id, ButtonAction::Assert)?;
        clock.sleep(hold);
        self.apply(id, ButtonAction::Release)
    }
}

/// Driver that performs no hardware interaction.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopButtonDriver;

impl ButtonDriver for NoopButtonDriver {
    fn apply(&mut self, _: ButtonId, _: ButtonAction) -> Result<(), ButtonError> {
        Ok(())
    }
}
