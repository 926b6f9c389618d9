//! Executes sequence templates against the buttons and the device link.
//!
//! [`SequenceRunner`] walks a [`SequenceTemplate`] strictly in order. It does
//! not retry: the first failing step aborts the run and its error goes back
//! to the caller. A failed button press releases every line before
//! returning so no button is left held down.
//!
//! The runner borrows the link rather than owning it. Bring-up is run from
//! inside the transport guard with `with_link`; the reset templates run
//! without a link and only need the button panel.

use std::time::Duration;

use parking_lot::Mutex;

use crate::buttons::{ButtonDriver, button_by_id};
use crate::clock::Clock;
use crate::error::{ControlError, SequenceError};
use crate::link::DeviceLink;
use crate::sequences::{SequenceKind, SequenceStep, SequenceTemplate};
use crate::telemetry::{Observer, TelemetryEvent, TelemetryRecorder};

/// Summary of a completed run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceReport {
    pub kind: SequenceKind,
    pub steps_executed: usize,
    /// User id read back during the run, if the template reads one.
    pub user_id: Option<String>,
    pub elapsed: Duration,
}

impl SequenceReport {
    const fn new(kind: SequenceKind) -> Self {
        Self {
            kind,
            steps_executed: 0,
            user_id: None,
            elapsed: Duration::ZERO,
        }
    }
}

/// Step-by-step executor for sequence templates.
pub struct SequenceRunner<'a, L: ?Sized, B: ?Sized> {
    link: Option<&'a mut L>,
    buttons: &'a Mutex<B>,
    clock: &'a dyn Clock,
    observer: &'a dyn Observer,
    telemetry: &'a Mutex<TelemetryRecorder>,
}

impl<'a, L, B> SequenceRunner<'a, L, B>
where
    L: DeviceLink + ?Sized,
    B: ButtonDriver + ?Sized,
{
    /// Runner without link access; link steps fail with
    /// [`SequenceError::LinkRequired`].
    pub fn new(
        buttons: &'a Mutex<B>,
        clock: &'a dyn Clock,
        observer: &'a dyn Observer,
        telemetry: &'a Mutex<TelemetryRecorder>,
    ) -> Self {
        Self {
            link: None,
            buttons,
            clock,
            observer,
            telemetry,
        }
    }

    /// Grants the runner the link for the duration of its borrow.
    #[must_use]
    pub fn with_link(mut self, link: &'a mut L) -> Self {
        self.link = Some(link);
        self
    }

    /// Executes every step of `template` in order.
    ///
    /// # Errors
    ///
    /// Returns the first link, button or sequencing error; later steps are
    /// not attempted.
    pub fn run(&mut self, template: SequenceTemplate) -> Result<SequenceReport, ControlError> {
        let started = self.clock.now();
        let mut report = SequenceReport::new(template.kind);
        log::info!(
            "running {} sequence ({} steps)",
            template.kind,
            template.step_count()
        );

        for (index, step) in template.steps().iter().enumerate() {
            if let Err(err) = self.execute(*step, &mut report) {
                log::error!(
                    "{} sequence failed at step {index} ({step:?}): {err}",
                    template.kind
                );
                return Err(err);
            }
            report.steps_executed = index + 1;
        }

        let finished = self.clock.now();
        report.elapsed = finished.saturating_duration_since(started);
        self.telemetry
            .lock()
            .record(TelemetryEvent::SequenceCompleted(template.kind), finished);
        log::info!(
            "{} sequence complete in {:?}",
            template.kind,
            report.elapsed
        );
        Ok(report)
    }

    fn execute(
        &mut self,
        step: SequenceStep,
        report: &mut SequenceReport,
    ) -> Result<(), ControlError> {
        match step {
            SequenceStep::Announce(phase) => {
                log::info!("{phase}");
                self.telemetry
                    .lock()
                    .record(TelemetryEvent::PhaseEntered(phase), self.clock.now());
                self.observer.on_status_text(phase.label());
            }
            SequenceStep::Press {
                button,
                hold,
                window,
            } => {
                debug_assert!(window.allows(hold), "hold {hold:?} outside {window:?}");
                let mut buttons = self.buttons.lock();
                if let Err(err) = buttons.press(button, hold, self.clock) {
                    log::error!("press {} failed: {err}", button_by_id(button).name);
                    if let Err(release) = buttons.release_all() {
                        log::warn!("releasing buttons after failed press: {release}");
                    }
                    return Err(err.into());
                }
            }
            SequenceStep::Wait(duration) => self.clock.sleep(duration),
            SequenceStep::LinkReset => self.link(step)?.reset()?,
            SequenceStep::LinkGoIdle => self.link(step)?.go_idle()?,
            SequenceStep::ReadId => {
                let id = self.link(step)?.get_id()?;
                log::info!("device user id: {}", id.as_deref().unwrap_or("<none>"));
                report.user_id = id;
            }
            SequenceStep::LinkGoInUse => self.link(step)?.go_inuse()?,
        }
        Ok(())
    }

    fn link(&mut self, step: SequenceStep) -> Result<&mut L, SequenceError> {
        self.link
            .as_deref_mut()
            .ok_or(SequenceError::LinkRequired { step })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buttons::{ButtonAction, ButtonId};
    use crate::clock::ManualClock;
    use crate::error::{ButtonError, LinkError};
    use crate::link::{StatusReport, Unit};
    use crate::sequences::{BRINGUP_TEMPLATE, HARD_RESET_TEMPLATE, STOP_TEMPLATE};
    use crate::telemetry::NullObserver;

    #[derive(Default)]
    struct ScriptedLink {
        calls: Vec<&'static str>,
        fail_on: Option<&'static str>,
    }

    impl ScriptedLink {
        fn call(&mut self, name: &'static str) -> Result<(), LinkError> {
            self.calls.push(name);
            if self.fail_on == Some(name) {
                return Err(LinkError::Timeout(Duration::from_secs(1)));
            }
            Ok(())
        }
    }

    impl DeviceLink for ScriptedLink {
        fn get_status(&mut self) -> Result<Option<StatusReport>, LinkError> {
            self.call("get_status")?;
            Ok(None)
        }

        fn set_speed(&mut self, _: i32, _: Unit) -> Result<(), LinkError> {
            self.call("set_speed")
        }

        fn set_grade(&mut self, _: i32, _: Unit) -> Result<(), LinkError> {
            self.call("set_grade")
        }

        fn reset(&mut self) -> Result<(), LinkError> {
            self.call("reset")
        }

        fn go_idle(&mut self) -> Result<(), LinkError> {
            self.call("go_idle")
        }

        fn go_inuse(&mut self) -> Result<(), LinkError> {
            self.call("go_inuse")
        }

        fn get_id(&mut self) -> Result<Option<String>, LinkError> {
            self.call("get_id")?;
            Ok(Some("1".into()))
        }
    }

    #[derive(Default)]
    struct Panel {
        actions: Vec<(ButtonId, ButtonAction)>,
        fail_on: Option<ButtonId>,
    }

    impl ButtonDriver for Panel {
        fn apply(&mut self, id: ButtonId, action: ButtonAction) -> Result<(), ButtonError> {
            if self.fail_on == Some(id) && action == ButtonAction::Assert {
                return Err(ButtonError::Line {
                    pin: button_by_id(id).bcm_pin,
                    message: "busy".into(),
                });
            }
            self.actions.push((id, action));
            Ok(())
        }
    }

    fn presses(panel: &Panel) -> Vec<ButtonId> {
        panel
            .actions
            .iter()
            .filter(|(_, action)| *action == ButtonAction::Assert)
            .map(|(id, _)| *id)
            .collect()
    }

    #[test]
    fn bringup_drives_buttons_and_link_in_order() {
        let clock = ManualClock::new();
        let panel = Mutex::new(Panel::default());
        let telemetry = Mutex::new(TelemetryRecorder::new());
        let mut link = ScriptedLink::default();

        let report = SequenceRunner::new(&panel, &clock, &NullObserver, &telemetry)
            .with_link(&mut link)
            .run(BRINGUP_TEMPLATE)
            .unwrap();

        assert_eq!(report.kind, SequenceKind::Bringup);
        assert_eq!(report.steps_executed, BRINGUP_TEMPLATE.step_count());
        assert_eq!(report.user_id.as_deref(), Some("1"));
        assert_eq!(report.elapsed, BRINGUP_TEMPLATE.blocking_time());
        assert_eq!(link.calls, vec!["reset", "go_idle", "get_id", "go_inuse"]);
        assert_eq!(
            presses(&panel.lock()),
            vec![
                ButtonId::Reset,
                ButtonId::Reset,
                ButtonId::Enter,
                ButtonId::One,
                ButtonId::Ok
            ]
        );
        assert_eq!(clock.total_slept(), BRINGUP_TEMPLATE.blocking_time());
    }

    #[test]
    fn link_failure_stops_the_run() {
        let clock = ManualClock::new();
        let panel = Mutex::new(Panel::default());
        let telemetry = Mutex::new(TelemetryRecorder::new());
        let mut link = ScriptedLink {
            fail_on: Some("go_idle"),
            ..ScriptedLink::default()
        };

        let err = SequenceRunner::new(&panel, &clock, &NullObserver, &telemetry)
            .with_link(&mut link)
            .run(BRINGUP_TEMPLATE)
            .unwrap_err();

        assert!(matches!(err, ControlError::Link(LinkError::Timeout(_))));
        assert_eq!(link.calls, vec!["reset", "go_idle"]);
        // Keypad presses come after go_idle and must not have happened.
        assert_eq!(presses(&panel.lock()), vec![ButtonId::Reset, ButtonId::Reset]);
        assert!(telemetry.lock().latest().is_some_and(|record| !matches!(
            record.event,
            TelemetryEvent::SequenceCompleted(_)
        )));
    }

    #[test]
    fn failed_press_releases_every_line() {
        let clock = ManualClock::new();
        let panel = Mutex::new(Panel {
            fail_on: Some(ButtonId::One),
            ..Panel::default()
        });
        let telemetry = Mutex::new(TelemetryRecorder::new());
        let mut link = ScriptedLink::default();

        let err = SequenceRunner::new(&panel, &clock, &NullObserver, &telemetry)
            .with_link(&mut link)
            .run(BRINGUP_TEMPLATE)
            .unwrap_err();

        assert!(matches!(err, ControlError::Button(_)));
        let panel = panel.lock();
        let tail: Vec<_> = panel.actions.iter().rev().take(4).collect();
        assert!(
            tail.iter()
                .all(|(_, action)| *action == ButtonAction::Release)
        );
    }

    #[test]
    fn link_steps_without_link_are_rejected() {
        let clock = ManualClock::new();
        let panel = Mutex::new(Panel::default());
        let telemetry = Mutex::new(TelemetryRecorder::new());

        let err = SequenceRunner::<ScriptedLink, _>::new(&panel, &clock, &NullObserver, &telemetry)
            .run(BRINGUP_TEMPLATE)
            .unwrap_err();

        assert!(matches!(
            err,
            ControlError::Sequence(SequenceError::LinkRequired {
                step: SequenceStep::LinkReset
            })
        ));
    }

    #[test]
    fn reset_templates_run_without_link() {
        let clock = ManualClock::new();
        let panel = Mutex::new(Panel::default());
        let telemetry = Mutex::new(TelemetryRecorder::new());

        let mut runner =
            SequenceRunner::<ScriptedLink, _>::new(&panel, &clock, &NullObserver, &telemetry);
        runner.run(HARD_RESET_TEMPLATE).unwrap();
        runner.run(STOP_TEMPLATE).unwrap();

        assert_eq!(presses(&panel.lock()), vec![ButtonId::Reset; 3]);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(250),
                Duration::from_millis(100),
                Duration::from_millis(100),
            ]
        );
    }
}
