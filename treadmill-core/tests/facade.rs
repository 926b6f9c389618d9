mod support;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use support::{Harness, LinkCall, report};
use treadmill_core::buttons::ButtonId;
use treadmill_core::config::Preset;
use treadmill_core::error::{ControlError, LinkError};
use treadmill_core::link::Unit;
use treadmill_core::state::AppStatus;
use treadmill_core::telemetry::{NullSink, UiEvent};

fn running_at(harness: &Harness, speed_tenths: i32, grade_hundredths: i32) {
    harness
        .link
        .script_polls([Ok(Some(report("inuse", speed_tenths, grade_hundredths)))]);
    harness
        .controller
        .monitor(Box::new(NullSink))
        .poll_once()
        .unwrap();
    harness.link.clear_calls();
    harness.observer.clear();
}

#[test]
fn speed_nudge_is_floored_at_walking_pace() {
    let harness = Harness::new();

    let speed = harness.controller.nudge_speed(-5.0).unwrap();

    assert!((speed - 1.0).abs() < f64::EPSILON);
    assert_eq!(
        harness.link.calls(),
        vec![LinkCall::SetSpeed(10, Unit::TenthKmPerHour)]
    );
}

#[test]
fn grade_nudge_is_floored_at_level() {
    let harness = Harness::new();

    harness.controller.nudge_grade(1.5).unwrap();
    let grade = harness.controller.nudge_grade(-4.0).unwrap();

    assert!(grade.abs() < f64::EPSILON);
    assert_eq!(
        harness.link.calls(),
        vec![
            LinkCall::SetGrade(150, Unit::HundredthPercentGrade),
            LinkCall::SetGrade(0, Unit::HundredthPercentGrade)
        ]
    );
}

#[test]
fn nudges_start_from_the_reported_value() {
    let harness = Harness::new();
    running_at(&harness, 30, 250);

    harness.controller.nudge_speed(0.2).unwrap();
    harness.controller.nudge_speed(0.2).unwrap();
    harness.controller.nudge_grade(0.5).unwrap();

    assert_eq!(harness.link.speeds(), vec![32, 34]);
    assert_eq!(harness.link.grades(), vec![300]);
}

#[test]
fn failed_nudge_keeps_the_new_target() {
    let harness = Harness::new();
    harness.link.fail_next("set_speed", LinkError::Closed);

    let err = harness.controller.nudge_speed(2.0).unwrap_err();

    assert!(matches!(err, ControlError::Link(LinkError::Closed)));
    assert_eq!(harness.controller.snapshot().target_speed, Some(3.0));
}

#[test]
fn walk_then_run_restores_the_running_speed() {
    let harness = Harness::new();
    running_at(&harness, 50, 0);

    harness.controller.walk().unwrap();
    assert_eq!(harness.controller.status(), AppStatus::Walking);
    assert_eq!(harness.controller.snapshot().resume_speed, Some(5.0));

    harness.controller.run().unwrap();
    assert_eq!(harness.controller.status(), AppStatus::Running);

    assert_eq!(harness.link.speeds(), vec![10, 50]);
    assert_eq!(
        harness.observer.app_statuses(),
        vec![AppStatus::Walking, AppStatus::Running]
    );
}

#[test]
fn toggle_follows_the_status() {
    let harness = Harness::new();
    running_at(&harness, 40, 0);

    harness.controller.toggle().unwrap();
    assert_eq!(harness.controller.status(), AppStatus::Walking);
    harness.controller.toggle().unwrap();
    assert_eq!(harness.controller.status(), AppStatus::Running);
    assert_eq!(harness.link.speeds(), vec![10, 40]);
}

#[test]
fn toggle_from_idle_starts_a_session() {
    let harness = Harness::new();

    harness.controller.toggle().unwrap();

    assert_eq!(harness.controller.status(), AppStatus::Starting);
    assert!(harness.link.calls().contains(&LinkCall::GoInUse));
}

#[test]
fn interval_runs_then_drops_to_end_speed() {
    let harness = Harness::new();
    running_at(&harness, 30, 0);

    harness
        .controller
        .interval_effort(8.0, Duration::from_secs(60), Some(1.0))
        .unwrap();

    assert_eq!(harness.link.speeds(), vec![80, 10]);
    assert_eq!(harness.clock.sleeps(), vec![Duration::from_secs(60)]);
    assert_eq!(
        harness.observer.events(),
        vec![
            UiEvent::IntervalVisible(true),
            UiEvent::IntervalRemaining(Duration::from_secs(60)),
            UiEvent::IntervalVisible(false)
        ]
    );

    let state = harness.controller.snapshot();
    assert!(state.interval_deadline.is_none());
    assert_eq!(state.target_speed, None);
}

#[test]
fn interval_end_speed_never_drops_below_walking_pace() {
    let harness = Harness::new();

    harness
        .controller
        .interval_effort(9.0, Duration::from_secs(1), Some(0.4))
        .unwrap();
    harness
        .controller
        .interval_effort(9.0, Duration::from_secs(1), None)
        .unwrap();

    assert_eq!(harness.link.speeds(), vec![90, 10, 90, 10]);
}

#[test]
fn interval_clears_its_deadline_when_the_end_command_fails() {
    let harness = Harness::new();
    harness.link.fail_after("set_speed", 1, LinkError::Closed);

    let err = harness
        .controller
        .interval_effort(8.0, Duration::from_secs(30), Some(2.0))
        .unwrap_err();

    assert!(matches!(err, ControlError::Link(LinkError::Closed)));
    assert!(harness.controller.snapshot().interval_deadline.is_none());
    assert_eq!(
        harness.observer.events().last(),
        Some(&UiEvent::IntervalVisible(false))
    );
}

#[test]
fn interval_too_long_to_schedule_sends_nothing() {
    let harness = Harness::new();

    let err = harness
        .controller
        .interval_effort(8.0, Duration::from_secs(u64::MAX / 2), None)
        .unwrap_err();

    assert!(matches!(err, ControlError::IntervalOutOfRange(_)));
    assert!(harness.link.calls().is_empty());
    assert!(harness.clock.sleeps().is_empty());
    assert!(harness.controller.snapshot().interval_deadline.is_none());
}

#[test]
fn absolute_set_skips_values_the_device_already_reports() {
    let harness = Harness::new();
    running_at(&harness, 35, 1_500);

    assert!(!harness.controller.set_speed_absolute(3.5).unwrap());
    assert!(!harness.controller.set_grade_absolute(15.0).unwrap());
    assert!(harness.link.calls().is_empty());

    assert!(harness.controller.set_speed_absolute(3.6).unwrap());
    assert_eq!(harness.link.speeds(), vec![36]);
}

#[test]
fn preset_sets_grade_before_speed() {
    let harness = Harness::new();
    running_at(&harness, 20, 0);

    harness.controller.apply_preset(Preset::Normal).unwrap();

    assert_eq!(
        harness.link.calls(),
        vec![
            LinkCall::SetGrade(1_500, Unit::HundredthPercentGrade),
            LinkCall::SetSpeed(35, Unit::TenthKmPerHour)
        ]
    );
}

#[test]
fn stop_presses_reset_once_without_the_link() {
    let harness = Harness::new();

    harness.controller.stop().unwrap();

    assert_eq!(harness.buttons.presses(), vec![ButtonId::Reset]);
    assert!(harness.link.calls().is_empty());
}

#[test]
fn hard_reset_does_not_wait_for_a_busy_link() {
    let harness = Harness::new();
    harness.link.set_exchange_delay(Duration::from_millis(300));

    let controller = Arc::clone(&harness.controller);
    let slow = thread::spawn(move || controller.nudge_speed(1.0));
    thread::sleep(Duration::from_millis(50));

    harness.controller.do_reset().unwrap();

    assert_eq!(harness.buttons.presses(), vec![ButtonId::Reset, ButtonId::Reset]);
    assert!(harness.link.calls().is_empty(), "nudge should still be in flight");
    slow.join().unwrap().unwrap();
}
