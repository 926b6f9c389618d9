// Shared logic for the treadmill controller.
//
// The crate owns the coordination core: the guarded device link, the bring-up
// sequencer, the application state machine, the command surface and the
// status monitor. Front ends (terminal console, touch UI) plug in through the
// observer and persistence traits in `telemetry`.

pub mod buttons;
pub mod clock;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod error;
pub mod link;
pub mod monitor;
pub mod orchestrator;
pub mod repl;
pub mod sequences;
pub mod state;
pub mod telemetry;

pub use controller::Controller;
pub use error::{ControlError, Result};
