//! HapticSync Core - playback-to-haptic synchronization engine.
//!
//! Plays time-windowed vibration cues in step with a playing video:
//!
//! - **Cues** - Cue windows, vibration patterns, cue file loading and validation
//! - **Matcher** - Pure position-to-cue lookup over half-open windows
//! - **Actuation** - The single-writer state machine in front of the vibration device
//! - **Playback** - Position sources: wall clock and simulated media
//! - **Sync loop** - Self-rescheduling per-frame sampling with cancellable frame tokens
//! - **Player** - The facade a UI calls into (transport, host callbacks, active cue)
//! - **Drivers** - Realtime and simulated frame delivery
//!
//! # Architecture
//!
//! The [`HapticPlayer`] owns a [`SyncLoop`], which owns the [`PositionSource`]
//! and the [`ActuationController`]. Each frame the loop samples the position
//! once, asks [`match_cue`] for the cue whose window contains it, and lets the
//! controller issue a stop and/or a start on the [`Actuator`]. Pause, seek,
//! reset, end of content and teardown all force a stop and clear the
//! controller's memory, so landing in a window afterwards is a fresh entry.
//! Observers receive [`SyncEvent`]s over a crossbeam channel.
//!
//! Without a vibration capability the engine runs in desktop mode: cues are
//! still tracked and published, nothing is actuated.

pub mod actuation;
pub mod actuator;
pub mod config;
pub mod cue;
pub mod driver;
pub mod error;
pub mod events;
pub mod matcher;
pub mod playback;
pub mod player;
pub mod sync_loop;

pub use actuation::{ActuationController, ActuationState, Transition};
pub use actuator::{detect, ActuationCommand, Actuator, ActuatorError, LogActuator, RecordingActuator};
pub use config::Config;
pub use cue::{Cue, CueTable, VibrationPattern};
pub use driver::{RealtimeDriver, ScheduledAction, ScriptAction, SimulatedDriver, SimulationReport};
pub use error::{Error, Result};
pub use events::{ExitReason, SyncEvent};
pub use matcher::match_cue;
pub use playback::{
    format_timestamp, MediaProgress, PlaybackControl, PlaybackController, PositionSource, SimulatedMedia,
};
pub use player::HapticPlayer;
pub use sync_loop::{FrameToken, HaltReason, SyncLoop, TickOutcome};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_demo_session_end_to_end() {
        let _ = env_logger::builder().is_test(true).try_init();
        let recorder = RecordingActuator::new();
        let mut player = HapticPlayer::new(
            SimulatedMedia::new(35.0),
            Arc::new(CueTable::demo()),
            Some(Box::new(recorder.clone())),
        );
        let events = player.subscribe();

        let report = SimulatedDriver::new(60.0).run(&mut player).unwrap();
        assert!(report.reached_end);

        // Three continuous cues, each started once and stopped once.
        assert_eq!(recorder.starts().len(), 3);
        assert_eq!(recorder.stop_count(), 3);
        let entered: Vec<_> = events
            .try_iter()
            .filter_map(|event| match event {
                SyncEvent::CueEntered { label, .. } => Some(label),
                _ => None,
            })
            .collect();
        assert_eq!(entered, vec!["Intense Clean", "Pulse Mode", "Deep Scrub"]);
    }
}
