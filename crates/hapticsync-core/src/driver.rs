//! Frame drivers.
//!
//! A driver plays the host's role for the sync loop: it delivers each pending
//! frame back to the player at the display cadence.
//!
//! - [`RealtimeDriver`] sleeps between frames against the wall clock until
//!   the loop goes idle or a shutdown flag is raised.
//! - [`SimulatedDriver`] steps [`SimulatedMedia`] in virtual time and applies
//!   a script of transport actions, so a whole session runs instantly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::Config;
use crate::error::Result;
use crate::playback::{MediaProgress, PlaybackControl, PositionSource, SimulatedMedia};
use crate::player::HapticPlayer;

/// Upper bound on frames delivered by one simulation run.
const MAX_FRAMES: u64 = 10_000_000;

/// Slack when comparing virtual times.
const TIME_EPSILON: f64 = 1e-9;

fn frame_interval(refresh_rate_hz: f64) -> Duration {
    let hz = if refresh_rate_hz.is_finite() && refresh_rate_hz > 0.0 {
        refresh_rate_hz
    } else {
        log::warn!("[DRIVER] Invalid refresh rate {refresh_rate_hz}, using 60 Hz");
        60.0
    };
    Duration::from_secs_f64(1.0 / hz)
}

/// Delivers frames against the wall clock.
#[derive(Debug, Clone)]
pub struct RealtimeDriver {
    interval: Duration,
    shutdown: Arc<AtomicBool>,
}

impl RealtimeDriver {
    /// Driver ticking at `refresh_rate_hz` until `shutdown` is set.
    pub fn new(refresh_rate_hz: f64, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            interval: frame_interval(refresh_rate_hz),
            shutdown,
        }
    }

    /// Driver ticking at the configured `sync.refresh_rate_hz`.
    pub fn from_config(config: &Config, shutdown: Arc<AtomicBool>) -> Self {
        Self::new(config.sync.refresh_rate_hz, shutdown)
    }

    /// Time between frames.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Deliver frames until the loop halts or shutdown is requested.
    ///
    /// On shutdown the player is torn down before returning. Returns the number
    /// of frames delivered.
    pub fn run<P: PlaybackControl>(&self, player: &mut HapticPlayer<P>) -> u64 {
        let mut frames = 0u64;
        log::debug!("[DRIVER] Realtime driver started ({:?} per frame)", self.interval);

        while let Some(token) = player.pending_frame() {
            if self.shutdown.load(Ordering::SeqCst) {
                log::info!("[DRIVER] Shutdown requested");
                player.teardown();
                break;
            }

            let frame_start = Instant::now();
            player.on_frame(token);
            frames += 1;

            let elapsed = frame_start.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }

        log::debug!("[DRIVER] Realtime driver stopped after {} frames", frames);
        frames
    }
}

/// A transport action applied by the simulated host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "action", content = "to", rename_all = "snake_case")]
pub enum ScriptAction {
    /// Seek to a media position in seconds.
    Seek(f64),
    Pause,
    Resume,
    Reset,
}

/// An action due at a virtual wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScheduledAction {
    /// Seconds of virtual time since the simulation started.
    pub at: f64,
    pub action: ScriptAction,
}

/// Summary of a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationReport {
    /// Frames delivered to the player.
    pub frames: u64,
    /// Virtual wall-clock time elapsed.
    pub virtual_secs: f64,
    /// Media position when the run finished.
    pub final_position: f64,
    /// Whether playback reached the end of content.
    pub reached_end: bool,
}

/// Steps [`SimulatedMedia`] through virtual time.
///
/// Each frame applies the actions that are due, delivers the pending frame,
/// then advances the media by one frame interval. While the loop is idle
/// (paused) virtual time jumps straight to the next scripted action.
#[derive(Debug, Clone)]
pub struct SimulatedDriver {
    interval: Duration,
    actions: Vec<ScheduledAction>,
    time_limit: Option<f64>,
}

impl SimulatedDriver {
    /// Driver stepping one frame of `refresh_rate_hz` at a time, with no script.
    pub fn new(refresh_rate_hz: f64) -> Self {
        Self {
            interval: frame_interval(refresh_rate_hz),
            actions: Vec::new(),
            time_limit: None,
        }
    }

    /// Schedule `action` at `at` seconds of virtual time.
    pub fn with_action(mut self, at: f64, action: ScriptAction) -> Self {
        self.push_action(at, action);
        self
    }

    /// In-place form of [`with_action`](Self::with_action).
    pub fn push_action(&mut self, at: f64, action: ScriptAction) {
        let at = if at.is_finite() { at.max(0.0) } else { 0.0 };
        // Stable insert keeps same-time actions in the order they were given.
        let index = self.actions.partition_point(|a| a.at <= at);
        self.actions.insert(index, ScheduledAction { at, action });
    }

    /// Stop after `secs` of virtual time even if playback continues (needed
    /// for looping media).
    pub fn with_time_limit(mut self, secs: f64) -> Self {
        self.time_limit = Some(secs);
        self
    }

    /// The script, ordered by time.
    pub fn actions(&self) -> &[ScheduledAction] {
        &self.actions
    }

    /// Start playback and run the script to completion.
    pub fn run(&self, player: &mut HapticPlayer<SimulatedMedia>) -> Result<SimulationReport> {
        let dt = self.interval.as_secs_f64();
        let mut clock = 0.0;
        let mut frames = 0u64;
        let mut next_action = 0usize;

        player.play()?;

        loop {
            while let Some(scheduled) = self.actions.get(next_action) {
                if scheduled.at > clock + TIME_EPSILON {
                    break;
                }
                log::debug!("[DRIVER] {:.3}s: {:?}", clock, scheduled.action);
                apply(player, scheduled.action)?;
                next_action += 1;
            }

            if self.time_limit.is_some_and(|limit| clock >= limit - TIME_EPSILON) {
                log::debug!("[DRIVER] Time limit reached at {:.3}s", clock);
                break;
            }

            match player.pending_frame() {
                Some(token) => {
                    player.on_frame(token);
                    frames += 1;
                    if frames >= MAX_FRAMES {
                        log::warn!("[DRIVER] Frame limit reached, stopping simulation");
                        break;
                    }
                    if player.source_mut().advance(self.interval) == MediaProgress::Wrapped {
                        log::trace!("[DRIVER] Media wrapped at {:.3}s", clock);
                    }
                    clock += dt;
                }
                None => match self.actions.get(next_action) {
                    Some(scheduled) => clock = f64::max(clock, scheduled.at),
                    None => break,
                },
            }
        }

        let media = player.source();
        let reached_end = media.duration().is_some_and(|d| media.position() >= d);
        Ok(SimulationReport {
            frames,
            virtual_secs: clock,
            final_position: media.position(),
            reached_end,
        })
    }
}

fn apply(player: &mut HapticPlayer<SimulatedMedia>, action: ScriptAction) -> Result<()> {
    match action {
        ScriptAction::Seek(position) => {
            player.seek(position)?;
        }
        ScriptAction::Pause => player.pause(),
        ScriptAction::Resume => {
            player.play()?;
        }
        ScriptAction::Reset => {
            player.reset()?;
        }
    }
    Ok(())
}
