//! Observer events.
//!
//! The engine publishes [`SyncEvent`]s on every cue transition so a UI can
//! render the active cue, its label and description. The engine makes no
//! assumption about whether anyone is listening.

use crossbeam_channel::Sender;
use serde::Serialize;

use crate::actuator::ActuationCommand;

/// Why an active cue stopped being active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Playback left the cue window.
    WindowExit,
    /// Playback moved straight into another cue's window.
    Switched,
    /// Playback was paused.
    Pause,
    /// An explicit seek.
    Seek,
    /// Jump back to the start.
    Reset,
    /// The sampled position went backwards (host seek or loop wrap).
    Discontinuity,
    /// Playback reached the end of content.
    EndOfContent,
    /// The player was torn down.
    Teardown,
}

/// Events published to observers.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    /// A cue became active.
    CueEntered {
        cue_id: String,
        label: String,
        description: String,
        position: f64,
        /// Command sent to the actuator, `None` in desktop mode or on failure.
        command: Option<ActuationCommand>,
    },
    /// The active cue was released.
    CueExited {
        cue_id: String,
        reason: ExitReason,
    },
    /// The actuator rejected a command; playback continues.
    ActuatorFailed {
        cue_id: Option<String>,
        message: String,
    },
    /// Playback reached the end of content and the loop stopped.
    PlaybackEnded { position: f64 },
}

/// Optional channel to an observer; sends never block and never fail the caller.
#[derive(Clone, Debug, Default)]
pub(crate) struct EventSink {
    tx: Option<Sender<SyncEvent>>,
}

impl EventSink {
    pub(crate) fn new(tx: Sender<SyncEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        if let Some(tx) = &self.tx {
            // Observer went away: nothing to render.
            let _ = tx.send(event);
        }
    }
}
