//! Vibration actuator backends
//!
//! The actuator is fire-and-forget: it takes a continuous duration, an on/off
//! pattern, or a stop, and owns the on/off cadence once a command is issued.
//! It has no queryable "am I vibrating" state, which is why the actuation
//! controller tracks its own.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use thiserror::Error;

/// A command sent to the vibration actuator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActuationCommand {
    /// Vibrate continuously for the given number of milliseconds.
    Continuous { duration_ms: u32 },
    /// Play an alternating on/off sequence, starting with "on".
    Pattern { steps: Vec<u32> },
    /// Stop all vibration immediately (`actuate(0)`).
    Stop,
}

impl ActuationCommand {
    /// Whether this command stops the actuator.
    pub fn is_stop(&self) -> bool {
        matches!(self, ActuationCommand::Stop)
    }

    /// Whether this command starts vibration.
    pub fn is_start(&self) -> bool {
        !self.is_stop()
    }
}

impl fmt::Display for ActuationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuationCommand::Continuous { duration_ms } => write!(f, "continuous({duration_ms}ms)"),
            ActuationCommand::Pattern { steps } => write!(f, "pattern{steps:?}"),
            ActuationCommand::Stop => write!(f, "stop"),
        }
    }
}

/// Errors reported by an actuator backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuatorError {
    /// The platform refused the command
    #[error("command rejected: {0}")]
    Rejected(String),

    /// The device went away after startup
    #[error("actuator unavailable")]
    Unavailable,
}

/// Vibration actuator trait
pub trait Actuator: Send {
    /// Issue a command. Returns immediately; the device owns the timing.
    fn actuate(&mut self, command: &ActuationCommand) -> Result<(), ActuatorError>;

    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Whether the vibration capability exists on this device.
    fn is_available(&self) -> bool {
        true
    }
}

/// Capability check done once at startup.
///
/// Returns `None` (desktop mode: visual cues only, no actuation attempted) when
/// no backend is given or the backend reports the capability as missing.
pub fn detect(actuator: Option<Box<dyn Actuator>>) -> Option<Box<dyn Actuator>> {
    match actuator {
        Some(actuator) if actuator.is_available() => {
            log::info!("[ACTUATION] Using vibration actuator '{}'", actuator.name());
            Some(actuator)
        }
        Some(actuator) => {
            log::info!(
                "[ACTUATION] Actuator '{}' reports no vibration support; running in desktop mode",
                actuator.name()
            );
            None
        }
        None => {
            log::info!("[ACTUATION] No vibration actuator; running in desktop mode");
            None
        }
    }
}

/// Actuator that writes every command to the log.
#[derive(Debug, Clone)]
pub struct LogActuator {
    name: String,
}

impl LogActuator {
    /// Create a logging actuator.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LogActuator {
    fn default() -> Self {
        Self::new("log")
    }
}

impl Actuator for LogActuator {
    fn actuate(&mut self, command: &ActuationCommand) -> Result<(), ActuatorError> {
        log::info!("[{}] vibrate {}", self.name, command);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Default)]
struct Recording {
    commands: Vec<ActuationCommand>,
    reject_remaining: usize,
    available: bool,
}

/// Actuator that records commands instead of vibrating.
///
/// Clones share the same recording, so a test can hand one clone to the
/// engine and inspect the other. It can also be told to reject commands or
/// to report the capability as missing.
#[derive(Debug, Clone)]
pub struct RecordingActuator {
    inner: Arc<Mutex<Recording>>,
}

impl Default for RecordingActuator {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingActuator {
    /// Create an available recording actuator.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Recording {
                available: true,
                ..Recording::default()
            })),
        }
    }

    /// Create a recording actuator that reports the capability as missing.
    pub fn unavailable() -> Self {
        let actuator = Self::new();
        actuator.with_recording(|r| r.available = false);
        actuator
    }

    fn with_recording<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Recording) -> R,
    {
        let mut recording = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut recording)
    }

    /// Reject the next `count` commands.
    pub fn reject_next(&self, count: usize) {
        self.with_recording(|r| r.reject_remaining = count);
    }

    /// All commands accepted so far, in order.
    pub fn commands(&self) -> Vec<ActuationCommand> {
        self.with_recording(|r| r.commands.clone())
    }

    /// Accepted start commands (continuous or pattern).
    pub fn starts(&self) -> Vec<ActuationCommand> {
        self.with_recording(|r| r.commands.iter().filter(|c| c.is_start()).cloned().collect())
    }

    /// Number of accepted stop commands.
    pub fn stop_count(&self) -> usize {
        self.with_recording(|r| r.commands.iter().filter(|c| c.is_stop()).count())
    }
}

impl Actuator for RecordingActuator {
    fn actuate(&mut self, command: &ActuationCommand) -> Result<(), ActuatorError> {
        self.with_recording(|r| {
            if r.reject_remaining > 0 {
                r.reject_remaining -= 1;
                return Err(ActuatorError::Rejected(format!("{command} refused by test double")));
            }
            r.commands.push(command.clone());
            Ok(())
        })
    }

    fn name(&self) -> &str {
        "recording"
    }

    fn is_available(&self) -> bool {
        self.with_recording(|r| r.available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_display() {
        assert_eq!(ActuationCommand::Continuous { duration_ms: 2000 }.to_string(), "continuous(2000ms)");
        assert_eq!(ActuationCommand::Pattern { steps: vec![200, 100] }.to_string(), "pattern[200, 100]");
        assert_eq!(ActuationCommand::Stop.to_string(), "stop");
    }

    #[test]
    fn test_recording_clones_share_log() {
        let recorder = RecordingActuator::new();
        let mut handle = recorder.clone();
        handle.actuate(&ActuationCommand::Continuous { duration_ms: 10 }).unwrap();
        handle.actuate(&ActuationCommand::Stop).unwrap();
        assert_eq!(recorder.commands().len(), 2);
        assert_eq!(recorder.starts().len(), 1);
        assert_eq!(recorder.stop_count(), 1);
    }

    #[test]
    fn test_recording_rejects() {
        let recorder = RecordingActuator::new();
        let mut handle = recorder.clone();
        recorder.reject_next(1);
        assert!(handle.actuate(&ActuationCommand::Stop).is_err());
        assert!(handle.actuate(&ActuationCommand::Stop).is_ok());
        assert_eq!(recorder.stop_count(), 1);
    }

    #[test]
    fn test_detect() {
        assert!(detect(None).is_none());
        assert!(detect(Some(Box::new(RecordingActuator::unavailable()))).is_none());
        assert!(detect(Some(Box::new(LogActuator::default()))).is_some());
    }

    #[test]
    fn test_command_serializes_tagged() {
        let json = serde_json::to_string(&ActuationCommand::Continuous { duration_ms: 5 }).unwrap();
        assert_eq!(json, r#"{"kind":"continuous","duration_ms":5}"#);
    }
}
