//! Haptic player facade.
//!
//! [`HapticPlayer`] is the small interface a UI calls into: transport controls,
//! host callbacks (metadata loaded, frame, ended) and the active-cue signal.
//! It keeps the playback source and the sync loop in step so that every
//! transport change cancels actuation the way the sync rules require.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver};

use crate::actuation::{ActuationController, ActuationState};
use crate::actuator::Actuator;
use crate::cue::{Cue, CueTable};
use crate::error::{Error, Result};
use crate::events::{ExitReason, SyncEvent};
use crate::playback::PlaybackControl;
use crate::sync_loop::{FrameToken, SyncLoop, TickOutcome};

/// Video player with haptic cue synchronization.
pub struct HapticPlayer<P: PlaybackControl> {
    sync: SyncLoop<P>,
}

impl<P: PlaybackControl> HapticPlayer<P> {
    /// Create a player. `actuator` is capability-checked once here; `None`
    /// (or an unavailable backend) puts the player in desktop mode.
    pub fn new(source: P, table: Arc<CueTable>, actuator: Option<Box<dyn Actuator>>) -> Self {
        let controller = ActuationController::new(actuator);
        Self {
            sync: SyncLoop::new(source, table, controller),
        }
    }

    /// Receive [`SyncEvent`]s for every transition from now on.
    ///
    /// Replaces any earlier subscription.
    pub fn subscribe(&mut self) -> Receiver<SyncEvent> {
        let (tx, rx) = unbounded();
        self.sync.controller_mut().set_event_sender(tx);
        rx
    }

    /// Start or resume playback and the sync loop.
    ///
    /// Before metadata has loaded the loop start is deferred to
    /// [`on_metadata_loaded`](Self::on_metadata_loaded) and `Ok(None)` is returned.
    pub fn play(&mut self) -> Result<Option<FrameToken>> {
        self.sync.source_mut().play();
        self.start_loop()
    }

    /// Pause playback. Any active vibration is stopped immediately.
    pub fn pause(&mut self) {
        self.sync.source_mut().pause();
        self.sync.suspend(ExitReason::Pause);
    }

    /// Play if paused, pause if playing.
    pub fn toggle_play(&mut self) -> Result<Option<FrameToken>> {
        if self.sync.source().is_playing() {
            self.pause();
            Ok(None)
        } else {
            self.play()
        }
    }

    /// Jump to `position`. Landing inside a cue window, even the one that was
    /// active, starts that cue afresh on the next tick.
    pub fn seek(&mut self, position: f64) -> Result<Option<FrameToken>> {
        self.sync.invalidate(ExitReason::Seek);
        self.sync.source_mut().seek(position);
        log::debug!("[SYNC] Seek to {:.3}s", position);
        self.start_loop()
    }

    /// Jump back to the start.
    pub fn reset(&mut self) -> Result<Option<FrameToken>> {
        self.sync.invalidate(ExitReason::Reset);
        self.sync.source_mut().seek(0.0);
        log::debug!("[SYNC] Reset");
        self.start_loop()
    }

    /// Host callback: media metadata is now available.
    pub fn on_metadata_loaded(&mut self) -> Result<Option<FrameToken>> {
        if self.sync.source().duration().is_none() {
            return Err(Error::MetadataNotLoaded);
        }
        self.start_loop()
    }

    /// Host callback: the requested frame fired.
    pub fn on_frame(&mut self, token: FrameToken) -> TickOutcome {
        self.sync.on_frame(token)
    }

    /// Host callback: the media element reports end of playback.
    pub fn on_ended(&mut self) {
        self.sync.suspend(ExitReason::EndOfContent);
    }

    /// Stop the loop and the actuator for good. Safe to call more than once.
    pub fn teardown(&mut self) {
        self.sync.stop();
    }

    fn start_loop(&mut self) -> Result<Option<FrameToken>> {
        match self.sync.start() {
            Err(Error::MetadataNotLoaded) => {
                log::debug!("[SYNC] Metadata not loaded; loop start deferred");
                Ok(None)
            }
            other => other,
        }
    }

    /// The cue whose window is active, with its label and description.
    pub fn active_cue(&self) -> Option<&Cue> {
        let id = self.sync.controller().active_cue_id()?;
        self.sync.table().get(id)
    }

    /// Id of the active cue.
    pub fn active_cue_id(&self) -> Option<&str> {
        self.sync.controller().active_cue_id()
    }

    /// Believed actuator state.
    pub fn actuation_state(&self) -> &ActuationState {
        self.sync.controller().state()
    }

    /// Whether vibration is unavailable and cues are visual only.
    pub fn is_desktop_mode(&self) -> bool {
        self.sync.controller().is_desktop_mode()
    }

    /// Frame the loop is waiting for.
    pub fn pending_frame(&self) -> Option<FrameToken> {
        self.sync.pending_frame()
    }

    /// Whether the playback source is playing.
    pub fn is_playing(&self) -> bool {
        self.sync.source().is_playing()
    }

    /// The cue table.
    pub fn table(&self) -> &CueTable {
        self.sync.table()
    }

    /// The playback source.
    pub fn source(&self) -> &P {
        self.sync.source()
    }

    /// Mutable access to the playback source, for host-side changes such as
    /// loading metadata or advancing simulated time.
    pub fn source_mut(&mut self) -> &mut P {
        self.sync.source_mut()
    }
}

impl<P: PlaybackControl> Drop for HapticPlayer<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<P: PlaybackControl> std::fmt::Debug for HapticPlayer<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HapticPlayer").field("sync", &self.sync).finish()
    }
}
