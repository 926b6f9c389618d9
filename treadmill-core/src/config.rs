//! Controller configuration.
//!
//! Loaded from YAML; every field has a default so an empty document is a
//! valid configuration. Front ends apply their own command-line overrides on
//! top of the parsed value.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Keyboard nudge increments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyboardConfig {
    /// km/h added or removed per Left/Right key press.
    #[serde(default = "default_speed_step")]
    pub speed_step: f64,

    /// Percent grade added or removed per Up/Down key press.
    #[serde(default = "default_grade_step")]
    pub grade_step: f64,
}

fn default_speed_step() -> f64 {
    0.2
}
fn default_grade_step() -> f64 {
    0.5
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            speed_step: default_speed_step(),
            grade_step: default_grade_step(),
        }
    }
}

/// Defaults for an interval effort when the caller leaves values out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalConfig {
    #[serde(default = "default_interval_speed")]
    pub speed: f64,

    #[serde(default = "default_interval_secs")]
    pub duration_secs: f64,

    #[serde(default = "default_interval_end_speed")]
    pub end_speed: f64,
}

fn default_interval_speed() -> f64 {
    8.0
}
fn default_interval_secs() -> f64 {
    60.0
}
fn default_interval_end_speed() -> f64 {
    1.0
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            speed: default_interval_speed(),
            duration_secs: default_interval_secs(),
            end_speed: default_interval_end_speed(),
        }
    }
}

/// Speed and grade applied together by a preset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PresetValues {
    pub speed: f64,
    pub grade: f64,
}

/// Named presets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetsConfig {
    #[serde(default = "default_normal_preset")]
    pub normal: PresetValues,

    #[serde(default = "default_fast_preset")]
    pub fast: PresetValues,
}

fn default_normal_preset() -> PresetValues {
    PresetValues {
        speed: 3.5,
        grade: 15.0,
    }
}
fn default_fast_preset() -> PresetValues {
    PresetValues {
        speed: 5.0,
        grade: 15.0,
    }
}

impl Default for PresetsConfig {
    fn default() -> Self {
        Self {
            normal: default_normal_preset(),
            fast: default_fast_preset(),
        }
    }
}

/// Preset selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    Normal,
    Fast,
}

impl Preset {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Preset::Normal => "normal",
            Preset::Fast => "fast",
        }
    }
}

impl PresetsConfig {
    /// Values configured for `preset`.
    #[must_use]
    pub const fn get(&self, preset: Preset) -> PresetValues {
        match preset {
            Preset::Normal => self.normal,
            Preset::Fast => self.fast,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Device path of the serial link; also the port registry key.
    #[serde(default = "default_port")]
    pub port: String,

    /// Delay between monitor cycles, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Delay after a failed monitor cycle, in milliseconds.
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Persistence is considered every this many successful cycles.
    #[serde(default = "default_persist_every_cycles")]
    pub persist_every_cycles: u32,

    #[serde(default)]
    pub keyboard: KeyboardConfig,

    #[serde(default)]
    pub interval: IntervalConfig,

    #[serde(default)]
    pub presets: PresetsConfig,

    /// CSV file receiving speed/grade samples; disabled when absent.
    #[serde(default)]
    pub sample_log: Option<String>,

    /// Default log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_poll_interval_ms() -> u64 {
    200
}
fn default_error_backoff_ms() -> u64 {
    1000
}
fn default_persist_every_cycles() -> u32 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            poll_interval_ms: default_poll_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            persist_every_cycles: default_persist_every_cycles(),
            keyboard: KeyboardConfig::default(),
            interval: IntervalConfig::default(),
            presets: PresetsConfig::default(),
            sample_log: None,
            log_level: default_log_level(),
        }
    }
}

impl ControllerConfig {
    /// Loads and validates configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::NotFound(path.display().to_string()))?;

        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error with the line number if parsing fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml_ng::from_str(yaml).map_err(|e| {
            let line = e.location().map_or(0, |l| l.line());
            ConfigError::Parse {
                line,
                message: e.to_string(),
            }
        })
    }

    /// Rejects values the controller cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port.trim().is_empty() {
            return Err(invalid("port", "must not be empty"));
        }
        if self.poll_interval_ms == 0 {
            return Err(invalid("poll_interval_ms", "must be positive"));
        }
        if self.persist_every_cycles == 0 {
            return Err(invalid("persist_every_cycles", "must be positive"));
        }
        if !(self.keyboard.speed_step.is_finite() && self.keyboard.speed_step >= 0.0) {
            return Err(invalid("keyboard.speed_step", "must be a non-negative number"));
        }
        if !(self.keyboard.grade_step.is_finite() && self.keyboard.grade_step >= 0.0) {
            return Err(invalid("keyboard.grade_step", "must be a non-negative number"));
        }
        if !(self.interval.duration_secs.is_finite() && self.interval.duration_secs >= 0.0) {
            return Err(invalid("interval.duration_secs", "must be a non-negative number"));
        }
        Ok(())
    }

    /// Delay between monitor cycles.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Delay after a failed monitor cycle.
    #[must_use]
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// Default interval effort duration.
    #[must_use]
    pub fn interval_duration(&self) -> Duration {
        Duration::try_from_secs_f64(self.interval.duration_secs).unwrap_or_default()
    }
}

fn invalid(key: &'static str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = ControllerConfig::parse("").unwrap();

        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(200));
        assert_eq!(config.error_backoff(), Duration::from_secs(1));
        assert_eq!(config.persist_every_cycles, 5);
        assert_eq!(config.interval_duration(), Duration::from_secs(60));
        assert!(config.sample_log.is_none());
    }

    #[test]
    fn nested_sections_override_individual_fields() {
        let yaml = r"
port: /dev/ttyACM0
poll_interval_ms: 100
keyboard:
  speed_step: 0.1
presets:
  fast:
    speed: 6.0
    grade: 10.0
sample_log: /tmp/samples.csv
";

        let config = ControllerConfig::parse(yaml).unwrap();

        assert_eq!(config.port, "/dev/ttyACM0");
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert!((config.keyboard.speed_step - 0.1).abs() < f64::EPSILON);
        assert!((config.keyboard.grade_step - 0.5).abs() < f64::EPSILON);
        assert!((config.presets.fast.speed - 6.0).abs() < f64::EPSILON);
        assert!((config.presets.normal.speed - 3.5).abs() < f64::EPSILON);
        assert_eq!(config.sample_log.as_deref(), Some("/tmp/samples.csv"));
    }

    #[test]
    fn parse_error_includes_line() {
        let yaml = r"
port: /dev/ttyUSB0
keyboard:
  speed_step: fast
";

        let err = ControllerConfig::parse(yaml).unwrap_err();
        match err {
            ConfigError::Parse { line, .. } => assert_eq!(line, 4),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_zero_cadence() {
        let config = ControllerConfig {
            persist_every_cycles: 0,
            ..ControllerConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid {
                key: "persist_every_cycles",
                ..
            })
        ));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = ControllerConfig::load("/nonexistent/treadmill.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn load_reads_and_validates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("treadmill.yaml");
        std::fs::write(&path, "poll_interval_ms: 0\n").unwrap();

        let err = ControllerConfig::load(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "poll_interval_ms",
                ..
            }
        ));
    }
}
