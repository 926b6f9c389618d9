//! Console command executor.
//!
//! Parses a line with [`grammar`](super::grammar), then either answers it
//! directly (status, history, help) or hands the matching controller
//! operation to a [`Dispatcher`] worker and returns at once.

use std::sync::Arc;

use thiserror::Error;

use crate::buttons::ButtonDriver;
use crate::controller::Controller;
use crate::dispatch::Dispatcher;
use crate::error::ControlError;
use crate::link::DeviceLink;
use crate::state::ControlState;
use crate::telemetry::{Operation, TelemetryRecord};

use super::grammar::{self, Adjust, Command};

/// What an executed line produced.
#[derive(Clone, Debug, PartialEq)]
pub enum CommandOutcome {
    /// The operation is running on a worker; failures arrive through the
    /// observer.
    Dispatched(Operation),
    Status(ControlState),
    Events(Vec<TelemetryRecord>),
    Help(String),
}

/// Errors surfaced before anything was dispatched.
#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error(transparent)]
    Parse(#[from] grammar::ParseError),

    #[error("no help for `{0}`")]
    UnknownTopic(String),

    #[error(transparent)]
    Control(#[from] ControlError),
}

/// Help text per topic; the first entry doubles as the overview.
const HELP: &[(&str, &str)] = &[
    (
        "commands",
        "start | stop | reset | walk | run | toggle | speed <v> | grade <v> | \
         interval [speed [duration [end]]] | preset normal|fast | status | events | help [topic]",
    ),
    ("start", "start: run the bring-up sequence and begin a session"),
    ("stop", "stop: single reset press; the belt stops"),
    ("reset", "reset: double reset press, even while a link command is stuck"),
    ("walk", "walk: drop to walking pace, remembering the running speed"),
    ("run", "run: return to the speed held before walking"),
    ("toggle", "toggle: start when idle, walk when running, run when walking"),
    (
        "speed",
        "speed +0.5 | speed -1 | speed 6.5: nudge or set the belt speed in km/h",
    ),
    (
        "grade",
        "grade +0.5 | grade -1 | grade 4: nudge or set the incline in percent",
    ),
    (
        "interval",
        "interval [speed [duration [end]]]: run at speed for duration (60, 90s, 2m, 500ms), \
         then drop to end speed; omitted values come from configuration",
    ),
    ("preset", "preset normal|fast: apply a configured grade and speed"),
    ("status", "status: show the current control state"),
    ("events", "events: show recent controller events, oldest first"),
];

/// Looks up help for `topic`, or the overview when `None`.
#[must_use]
pub fn help_text(topic: Option<&str>) -> Option<&'static str> {
    let topic = match topic {
        None => return HELP.first().map(|(_, text)| *text),
        Some("hiit") => "interval",
        Some(topic) => topic,
    };
    HELP.iter()
        .find(|(name, _)| *name == topic)
        .map(|(_, text)| *text)
}

/// Turns console lines into controller work.
pub struct CommandExecutor<L, B> {
    controller: Arc<Controller<L, B>>,
    dispatcher: Dispatcher,
}

impl<L, B> CommandExecutor<L, B>
where
    L: DeviceLink + 'static,
    B: ButtonDriver + 'static,
{
    pub fn new(controller: Arc<Controller<L, B>>) -> Self {
        let dispatcher = Dispatcher::new(controller.observer());
        Self {
            controller,
            dispatcher,
        }
    }

    pub fn controller(&self) -> &Arc<Controller<L, B>> {
        &self.controller
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Parses and executes one console line.
    ///
    /// # Errors
    ///
    /// Returns a parse error, an unknown help topic, or a worker spawn
    /// failure. Errors of the dispatched operation itself are not returned.
    pub fn execute(&self, line: &str) -> Result<CommandOutcome, ExecuteError> {
        let command = grammar::parse(line)?;
        log::debug!("console: {command}");
        self.dispatch(command)
    }

    /// Executes an already parsed command.
    ///
    /// # Errors
    ///
    /// See [`execute`](Self::execute).
    pub fn dispatch(&self, command: Command) -> Result<CommandOutcome, ExecuteError> {
        let controller = Arc::clone(&self.controller);
        let operation = match command {
            Command::Start => self.spawn(Operation::Start, move || controller.start())?,
            Command::Stop => self.spawn(Operation::Stop, move || controller.stop())?,
            Command::Reset => self.spawn(Operation::Reset, move || controller.do_reset())?,
            Command::Walk => self.spawn(Operation::Walk, move || controller.walk())?,
            Command::Run => self.spawn(Operation::Run, move || controller.run())?,
            Command::Toggle => self.spawn(Operation::Toggle, move || controller.toggle())?,
            Command::Speed(Adjust::By(delta)) => {
                self.spawn(Operation::NudgeSpeed, move || controller.nudge_speed(delta))?
            }
            Command::Speed(Adjust::To(kmh)) => {
                self.spawn(Operation::SetSpeed, move || controller.set_speed_absolute(kmh))?
            }
            Command::Grade(Adjust::By(delta)) => {
                self.spawn(Operation::NudgeGrade, move || controller.nudge_grade(delta))?
            }
            Command::Grade(Adjust::To(percent)) => self.spawn(Operation::SetGrade, move || {
                controller.set_grade_absolute(percent)
            })?,
            Command::Interval {
                speed,
                duration,
                end_speed,
            } => {
                let config = self.controller.config();
                let speed = speed.unwrap_or(config.interval.speed);
                let duration = duration.unwrap_or_else(|| config.interval_duration());
                let end_speed = end_speed.unwrap_or(config.interval.end_speed);
                self.spawn(Operation::Interval, move || {
                    controller.interval_effort(speed, duration, Some(end_speed))
                })?
            }
            Command::Preset(preset) => {
                self.spawn(Operation::Preset, move || controller.apply_preset(preset))?
            }
            Command::Status => return Ok(CommandOutcome::Status(self.controller.snapshot())),
            Command::Events => {
                return Ok(CommandOutcome::Events(self.controller.recent_events()));
            }
            Command::Help(topic) => {
                return help_text(topic.as_deref())
                    .map(|text| CommandOutcome::Help(text.to_string()))
                    .ok_or_else(|| ExecuteError::UnknownTopic(topic.unwrap_or_default()));
            }
        };
        Ok(CommandOutcome::Dispatched(operation))
    }

    fn spawn<T>(
        &self,
        operation: Operation,
        job: impl FnOnce() -> crate::Result<T> + Send + 'static,
    ) -> Result<Operation, ExecuteError> {
        self.dispatcher.spawn(operation, job)?;
        Ok(operation)
    }
}
