//! Playback-to-haptic sync loop.
//!
//! The loop is a self-rescheduling task, not a timer: each tick samples the
//! playback position once, runs the matcher, reconciles the actuation
//! controller, and requests the next frame only while playback is active and
//! content remains. The host delivers the frame back by token when its
//! display refreshes. Pausing, stopping or tearing down drops the pending
//! token, so a late frame from before the cancellation is ignored.

use std::sync::Arc;

use crate::actuation::{ActuationController, Transition};
use crate::cue::CueTable;
use crate::error::{Error, Result};
use crate::events::{ExitReason, SyncEvent};
use crate::matcher::match_cue;
use crate::playback::PositionSource;

/// Tolerance for treating a backwards step in position as a discontinuity.
const DISCONTINUITY_EPSILON: f64 = 1e-3;

/// Handle for one requested frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameToken(u64);

impl FrameToken {
    /// Raw sequence number, increasing with every request.
    pub fn sequence(self) -> u64 {
        self.0
    }
}

/// Why the loop stopped rescheduling itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HaltReason {
    /// Playback is paused or stopped.
    NotPlaying,
    /// The position reached the end of content.
    EndOfContent,
}

/// Result of delivering a frame.
#[derive(Clone, Debug, PartialEq)]
pub enum TickOutcome {
    /// The tick ran and the next frame was requested.
    Rescheduled {
        next: FrameToken,
        transition: Transition,
    },
    /// The tick ran and the loop is now idle.
    Halted {
        reason: HaltReason,
        transition: Transition,
    },
    /// The frame was stale (cancelled or never issued) and did nothing.
    Ignored,
}

/// The sync loop: position source, cue table and actuation controller.
pub struct SyncLoop<P> {
    source: P,
    table: Arc<CueTable>,
    controller: ActuationController,
    pending: Option<FrameToken>,
    next_sequence: u64,
    last_position: Option<f64>,
    ticks: u64,
}

impl<P: PositionSource> SyncLoop<P> {
    /// Create an idle loop.
    pub fn new(source: P, table: Arc<CueTable>, controller: ActuationController) -> Self {
        Self {
            source,
            table,
            controller,
            pending: None,
            next_sequence: 0,
            last_position: None,
            ticks: 0,
        }
    }

    /// The position source.
    pub fn source(&self) -> &P {
        &self.source
    }

    /// Mutable access to the position source.
    pub fn source_mut(&mut self) -> &mut P {
        &mut self.source
    }

    /// The cue table.
    pub fn table(&self) -> &CueTable {
        &self.table
    }

    /// The actuation controller.
    pub fn controller(&self) -> &ActuationController {
        &self.controller
    }

    /// Mutable access to the actuation controller.
    pub fn controller_mut(&mut self) -> &mut ActuationController {
        &mut self.controller
    }

    /// Frame the loop is waiting for, if any.
    pub fn pending_frame(&self) -> Option<FrameToken> {
        self.pending
    }

    /// Whether a frame is pending.
    pub fn is_running(&self) -> bool {
        self.pending.is_some()
    }

    /// Ticks run since creation.
    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Start ticking if playback is active.
    ///
    /// Fails with [`Error::MetadataNotLoaded`] until the source knows its
    /// duration. Returns the pending frame, or `None` when paused. Calling it
    /// while already running keeps the existing frame.
    pub fn start(&mut self) -> Result<Option<FrameToken>> {
        if self.source.duration().is_none() {
            return Err(Error::MetadataNotLoaded);
        }
        if !self.source.is_playing() {
            return Ok(None);
        }
        if let Some(token) = self.pending {
            return Ok(Some(token));
        }
        log::debug!("[SYNC] Loop started");
        Ok(Some(self.schedule()))
    }

    /// Run the tick for `token` if it is the pending frame.
    pub fn on_frame(&mut self, token: FrameToken) -> TickOutcome {
        if self.pending != Some(token) {
            log::trace!("[SYNC] Ignoring stale frame {}", token.sequence());
            return TickOutcome::Ignored;
        }
        self.pending = None;
        self.tick()
    }

    fn tick(&mut self) -> TickOutcome {
        self.ticks += 1;

        // Sampled once; the matcher and the remaining-duration math share it.
        let position = match self.source.current_position() {
            Some(position) if position.is_finite() => position,
            _ => {
                log::trace!("[SYNC] No position yet");
                return self.continue_or_halt(None, Transition::Unchanged);
            }
        };

        if self
            .last_position
            .is_some_and(|last| position + DISCONTINUITY_EPSILON < last)
        {
            log::debug!("[SYNC] Position jumped back to {:.3}s", position);
            self.controller.cancel(ExitReason::Discontinuity);
        }
        self.last_position = Some(position);

        let cue = match_cue(position, &self.table);
        log::trace!(
            "[SYNC] Tick {} at {:.3}s -> {:?}",
            self.ticks,
            position,
            cue.map(|c| c.id.as_str())
        );
        let transition = self.controller.reconcile(position, cue);

        self.continue_or_halt(Some(position), transition)
    }

    fn continue_or_halt(&mut self, position: Option<f64>, transition: Transition) -> TickOutcome {
        let ended = match (position, self.source.duration()) {
            (Some(position), Some(duration)) => position >= duration,
            _ => false,
        };

        if self.source.is_playing() && !ended {
            let next = self.schedule();
            return TickOutcome::Rescheduled { next, transition };
        }

        // The loop is going idle: nothing may keep vibrating behind it.
        self.last_position = None;
        if ended {
            self.controller.cancel(ExitReason::EndOfContent);
            let position = position.unwrap_or_default();
            log::debug!("[SYNC] End of content at {:.3}s", position);
            self.controller.emit(SyncEvent::PlaybackEnded { position });
            TickOutcome::Halted {
                reason: HaltReason::EndOfContent,
                transition,
            }
        } else {
            log::debug!("[SYNC] Playback stopped by host");
            self.controller.cancel(ExitReason::Pause);
            TickOutcome::Halted {
                reason: HaltReason::NotPlaying,
                transition,
            }
        }
    }

    fn schedule(&mut self) -> FrameToken {
        let token = FrameToken(self.next_sequence);
        self.next_sequence += 1;
        self.pending = Some(token);
        token
    }

    /// Stop rescheduling and silence the actuator unconditionally.
    pub fn suspend(&mut self, reason: ExitReason) {
        if self.pending.take().is_some() {
            log::debug!("[SYNC] Loop suspended ({:?})", reason);
        }
        self.controller.cancel(reason);
    }

    /// Cancel the active cue and forget the last position, keeping the loop
    /// running. The next tick treats whatever window it lands in as a fresh
    /// entry.
    pub fn invalidate(&mut self, reason: ExitReason) {
        self.controller.cancel(reason);
        self.last_position = None;
    }

    /// Tear down: drop the pending frame, stop the actuator, clear all state.
    pub fn stop(&mut self) {
        self.pending = None;
        self.last_position = None;
        self.controller.cancel(ExitReason::Teardown);
    }
}

impl<P> std::fmt::Debug for SyncLoop<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncLoop")
            .field("cues", &self.table.len())
            .field("controller", &self.controller)
            .field("pending", &self.pending)
            .field("last_position", &self.last_position)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}
