//! Simulated treadmill so the console runs without hardware.
//!
//! One shared model sits behind both the simulated link and the simulated
//! button panel, the same way the real console and serial port both drive
//! one embedded controller.

use std::sync::Arc;

use parking_lot::Mutex;
use treadmill_core::buttons::{ButtonAction, ButtonDriver, ButtonId};
use treadmill_core::error::{ButtonError, LinkError};
use treadmill_core::link::{DeviceLink, Measurement, StatusReport, Unit};

/// Belt speed change per status poll, in 0.1 km/h.
const RAMP_PER_POLL: i32 = 5;
/// Speed the belt starts at when entering `inuse`, in 0.1 km/h.
const START_SPEED: i32 = 10;

#[derive(Debug, Default)]
struct Model {
    status: &'static str,
    speed: i32,
    target_speed: i32,
    grade: i32,
    entering: bool,
    digits: String,
    user: Option<String>,
}

impl Model {
    fn new() -> Self {
        Self {
            status: "idle",
            ..Self::default()
        }
    }

    fn power_cycle(&mut self) {
        self.status = "idle";
        self.speed = 0;
        self.target_speed = 0;
        self.grade = 0;
        self.entering = false;
        self.digits.clear();
        self.user = None;
    }

    fn in_use(&self) -> bool {
        self.status == "inuse"
    }

    fn step_belt(&mut self) {
        let delta = (self.target_speed - self.speed).clamp(-RAMP_PER_POLL, RAMP_PER_POLL);
        self.speed += delta;
    }

    fn key(&mut self, id: ButtonId) {
        match id {
            ButtonId::Reset => self.power_cycle(),
            ButtonId::Enter => {
                self.entering = true;
                self.digits.clear();
            }
            ButtonId::One if self.entering => self.digits.push('1'),
            ButtonId::Ok if self.entering && !self.digits.is_empty() => {
                self.user = Some(std::mem::take(&mut self.digits));
                self.entering = false;
            }
            ButtonId::One | ButtonId::Ok => {}
        }
    }
}

/// Creates a link and a button panel driving the same simulated device.
pub fn simulated() -> (SimulatedLink, SimulatedButtons) {
    let model = Arc::new(Mutex::new(Model::new()));
    (
        SimulatedLink {
            model: Arc::clone(&model),
        },
        SimulatedButtons { model },
    )
}

/// [`DeviceLink`] over the simulated device.
pub struct SimulatedLink {
    model: Arc<Mutex<Model>>,
}

fn to_tenths(value: i32, unit: &Unit) -> i32 {
    match unit {
        Unit::KmPerHour => value.saturating_mul(10),
        _ => value,
    }
}

fn to_hundredths(value: i32, unit: &Unit) -> i32 {
    match unit {
        Unit::PercentGrade => value.saturating_mul(100),
        _ => value,
    }
}

impl DeviceLink for SimulatedLink {
    fn get_status(&mut self) -> Result<Option<StatusReport>, LinkError> {
        let mut model = self.model.lock();
        if model.in_use() {
            model.step_belt();
        }
        Ok(Some(StatusReport::new(
            model.status,
            Measurement::new(model.speed, Unit::TenthKmPerHour),
            Measurement::new(model.grade, Unit::HundredthPercentGrade),
        )))
    }

    fn set_speed(&mut self, value: i32, unit: Unit) -> Result<(), LinkError> {
        let mut model = self.model.lock();
        if model.in_use() {
            model.target_speed = to_tenths(value, &unit).max(0);
        } else {
            log::debug!("sim: ignoring speed {value} while {}", model.status);
        }
        Ok(())
    }

    fn set_grade(&mut self, value: i32, unit: Unit) -> Result<(), LinkError> {
        let mut model = self.model.lock();
        if model.in_use() {
            model.grade = to_hundredths(value, &unit).max(0);
        } else {
            log::debug!("sim: ignoring grade {value} while {}", model.status);
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<(), LinkError> {
        let mut model = self.model.lock();
        model.status = "ready";
        model.speed = 0;
        model.target_speed = 0;
        Ok(())
    }

    fn go_idle(&mut self) -> Result<(), LinkError> {
        self.model.lock().status = "idle";
        Ok(())
    }

    fn go_inuse(&mut self) -> Result<(), LinkError> {
        let mut model = self.model.lock();
        if model.user.is_none() {
            log::warn!("sim: go-in-use without a selected user");
            return Ok(());
        }
        model.status = "inuse";
        model.speed = START_SPEED;
        model.target_speed = START_SPEED;
        Ok(())
    }

    fn get_id(&mut self) -> Result<Option<String>, LinkError> {
        Ok(self.model.lock().user.clone())
    }
}

/// [`ButtonDriver`] over the simulated device. Keys act on assert.
pub struct SimulatedButtons {
    model: Arc<Mutex<Model>>,
}

impl ButtonDriver for SimulatedButtons {
    fn apply(&mut self, id: ButtonId, action: ButtonAction) -> Result<(), ButtonError> {
        if action == ButtonAction::Assert {
            self.model.lock().key(id);
        }
        Ok(())
    }
}
