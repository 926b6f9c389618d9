//! Request/response channel to the treadmill's embedded controller.
//!
//! The wire protocol lives behind [`DeviceLink`]; this crate only sees decoded
//! status reports and issues absolute speed/grade commands in device units.
//! Every call may fail with a [`LinkError`]. Callers never hold a raw link:
//! they go through [`TransportGuard`], which serializes exchanges.

use core::fmt;

use crate::error::LinkError;

pub mod guard;
pub mod registry;

pub use guard::TransportGuard;
pub use registry::{PortRegistry, SharedLink};

/// Unit attached to a speed or grade measurement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Unit {
    /// `0.1 km/hour`, the unit speeds are commanded in.
    TenthKmPerHour,
    /// `km/hour`.
    KmPerHour,
    /// `0.01 % grade`, the unit grades are commanded in.
    HundredthPercentGrade,
    /// `% grade`.
    PercentGrade,
    /// Anything the device reports that we do not recognise.
    Other(String),
}

impl Unit {
    /// Parses the unit label used by the device.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim() {
            "0.1 km/hour" => Unit::TenthKmPerHour,
            "km/hour" => Unit::KmPerHour,
            "0.01 % grade" => Unit::HundredthPercentGrade,
            "% grade" => Unit::PercentGrade,
            other => Unit::Other(other.to_string()),
        }
    }

    /// Device units per displayed unit (km/h or % grade).
    #[must_use]
    pub fn divisor(&self) -> f64 {
        match self {
            Unit::TenthKmPerHour => 10.0,
            Unit::HundredthPercentGrade => 100.0,
            Unit::KmPerHour | Unit::PercentGrade | Unit::Other(_) => 1.0,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::TenthKmPerHour => f.write_str("0.1 km/hour"),
            Unit::KmPerHour => f.write_str("km/hour"),
            Unit::HundredthPercentGrade => f.write_str("0.01 % grade"),
            Unit::PercentGrade => f.write_str("% grade"),
            Unit::Other(label) => f.write_str(label),
        }
    }
}

/// Raw device value plus its unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Measurement {
    pub value: i32,
    pub unit: Unit,
}

impl Measurement {
    #[must_use]
    pub const fn new(value: i32, unit: Unit) -> Self {
        Self { value, unit }
    }

    /// Value scaled to km/h or % grade.
    #[must_use]
    pub fn scaled(&self) -> f64 {
        f64::from(self.value) / self.unit.divisor()
    }
}

/// Decoded answer to a status request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusReport {
    /// Device status string, verbatim (`idle`, `inuse`, `finished`, ...).
    pub status: String,
    pub speed: Measurement,
    pub grade: Measurement,
}

impl StatusReport {
    #[must_use]
    pub fn new(status: impl Into<String>, speed: Measurement, grade: Measurement) -> Self {
        Self {
            status: status.into(),
            speed,
            grade,
        }
    }

    /// Reported speed in km/h.
    #[must_use]
    pub fn speed_kmh(&self) -> f64 {
        self.speed.scaled()
    }

    /// Reported grade in percent.
    #[must_use]
    pub fn grade_percent(&self) -> f64 {
        self.grade.scaled()
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} {} {} {}",
            self.status, self.speed.value, self.speed.unit, self.grade.value, self.grade.unit
        )
    }
}

/// Converts km/h into the commanded speed unit.
#[must_use]
pub fn speed_to_device(kmh: f64) -> Measurement {
    Measurement::new(to_device_units(kmh, 10.0), Unit::TenthKmPerHour)
}

/// Converts percent grade into the commanded grade unit.
#[must_use]
pub fn grade_to_device(percent: f64) -> Measurement {
    Measurement::new(to_device_units(percent, 100.0), Unit::HundredthPercentGrade)
}

#[allow(clippy::cast_possible_truncation)]
fn to_device_units(value: f64, scale: f64) -> i32 {
    let scaled = (value * scale).round();
    scaled.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32
}

/// Request/response channel to the treadmill.
///
/// Implementations block until the exchange completes or fails. An empty
/// status answer is reported as `Ok(None)`, not as an error.
pub trait DeviceLink: Send {
    /// Polls the device status, current speed and grade.
    fn get_status(&mut self) -> Result<Option<StatusReport>, LinkError>;

    /// Commands an absolute belt speed.
    fn set_speed(&mut self, value: i32, unit: Unit) -> Result<(), LinkError>;

    /// Commands an absolute incline.
    fn set_grade(&mut self, value: i32, unit: Unit) -> Result<(), LinkError>;

    /// Protocol-level reset of the device state machine.
    fn reset(&mut self) -> Result<(), LinkError>;

    /// Moves the device to its idle state and waits for confirmation.
    fn go_idle(&mut self) -> Result<(), LinkError>;

    /// Moves the device to its in-use (belt active) state.
    fn go_inuse(&mut self) -> Result<(), LinkError>;

    /// Reads the user id the device assigned, if any.
    fn get_id(&mut self) -> Result<Option<String>, LinkError>;
}

impl<L> DeviceLink for Box<L>
where
    L: DeviceLink + ?Sized,
{
    fn get_status(&mut self) -> Result<Option<StatusReport>, LinkError> {
        (**self).get_status()
    }

    fn set_speed(&mut self, value: i32, unit: Unit) -> Result<(), LinkError> {
        (**self).set_speed(value, unit)
    }

    fn set_grade(&mut self, value: i32, unit: Unit) -> Result<(), LinkError> {
        (**self).set_grade(value, unit)
    }

    fn reset(&mut self) -> Result<(), LinkError> {
        (**self).reset()
    }

    fn go_idle(&mut self) -> Result<(), LinkError> {
        (**self).go_idle()
    }

    fn go_inuse(&mut self) -> Result<(), LinkError> {
        (**self).go_inuse()
    }

    fn get_id(&mut self) -> Result<Option<String>, LinkError> {
        (**self).get_id()
    }
}
