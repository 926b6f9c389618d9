//! Error types shared by the controller crates.
//!
//! Link failures are the only errors the monitor expects to see on a regular
//! basis; it absorbs them with a backoff. Command workers surface every
//! variant to their caller unchanged.

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::sequences::SequenceStep;

/// Transport-level failure reported by a [`DeviceLink`](crate::link::DeviceLink).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LinkError {
    /// The underlying port reported an I/O failure.
    #[error("link i/o failure: {0}")]
    Io(String),

    /// No response arrived within the exchange deadline.
    #[error("link timed out after {0:?}")]
    Timeout(Duration),

    /// The link has been closed and can no longer carry requests.
    #[error("link closed")]
    Closed,
}

/// Failure actuating one of the physical control lines.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ButtonError {
    #[error("gpio line {pin} unavailable: {message}")]
    Line {
        /// BCM pin number of the failing line.
        pin: u8,
        /// Driver-supplied detail.
        message: String,
    },
}

/// Failure executing a step template.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SequenceError {
    /// A step that talks to the device ran without access to the link.
    #[error("step {step:?} requires the device link")]
    LinkRequired { step: SequenceStep },
}

/// Failure writing a speed/grade sample to the persistence sink.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sample write failed: {0}")]
    Io(#[from] io::Error),

    #[error("sample rejected: {0}")]
    Rejected(String),
}

/// Failure loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(String),

    #[error("configuration error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("invalid configuration value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },
}

/// Errors surfaced by controller operations and command workers.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Button(#[from] ButtonError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    /// Interval deadline does not fit the clock.
    #[error("interval of {0:?} is out of range")]
    IntervalOutOfRange(Duration),

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker: {0}")]
    Worker(#[from] io::Error),
}

/// Result alias for controller operations.
pub type Result<T, E = ControlError> = std::result::Result<T, E>;
