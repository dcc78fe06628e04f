//! Playback position sources.
//!
//! The sync loop only reads playback; it never moves it. This module defines
//! the contract it reads through and two implementations:
//!
//! - [`PlaybackController`] - Wall-clock playback (anchor instant + anchor position)
//! - [`SimulatedMedia`] - Virtual-time playback stepped explicitly, for simulation and tests
//!
//! Positions are seconds from the start of the content.

use std::time::{Duration, Instant};

/// Read-only view of a playing video.
pub trait PositionSource {
    /// Current position in seconds, `None` until media metadata is loaded.
    fn current_position(&self) -> Option<f64>;

    /// Whether playback is advancing.
    fn is_playing(&self) -> bool;

    /// Content length in seconds, `None` until media metadata is loaded.
    fn duration(&self) -> Option<f64>;
}

/// Transport controls on top of a position source.
pub trait PlaybackControl: PositionSource {
    /// Start or resume playback.
    fn play(&mut self);

    /// Pause, keeping the position.
    fn pause(&mut self);

    /// Jump to `position` seconds (clamped to the content).
    fn seek(&mut self, position: f64);
}

fn clamp_position(position: f64, duration: Option<f64>) -> f64 {
    let position = position.max(0.0);
    match duration {
        Some(duration) => position.min(duration),
        None => position,
    }
}

/// Wall-clock playback controller.
///
/// Keeps an anchor point (position at a specific instant) and derives the
/// position at any later instant from elapsed time. Without looping the
/// position stops at the end of content and playback ends there.
#[derive(Clone, Debug)]
pub struct PlaybackController {
    duration: Option<f64>,
    looping: bool,
    running: bool,
    anchor_instant: Instant,
    anchor_position: f64,
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackController {
    /// Create a paused controller at position 0 with no metadata.
    pub fn new() -> Self {
        Self {
            duration: None,
            looping: false,
            running: false,
            anchor_instant: Instant::now(),
            anchor_position: 0.0,
        }
    }

    /// Create a controller whose metadata is already known.
    pub fn with_duration(duration: f64) -> Self {
        let mut controller = Self::new();
        controller.load_metadata(duration);
        controller
    }

    /// Enable or disable wrap-around at the end of content.
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Record the content duration once it is known.
    pub fn load_metadata(&mut self, duration: f64) {
        if duration.is_finite() && duration > 0.0 {
            self.duration = Some(duration);
        } else {
            log::warn!("[PLAYBACK] Ignoring invalid duration {duration}");
        }
    }

    /// Start playing at `now`. Playing from the end restarts from the top.
    pub fn play_at(&mut self, now: Instant) {
        if self.running && !self.ended_at(now) {
            return;
        }
        let position = self.position_at(now);
        self.anchor_position = if self.duration.is_some_and(|d| position >= d) {
            0.0
        } else {
            position
        };
        self.anchor_instant = now;
        self.running = true;
    }

    /// Pause at `now`, preserving the position.
    pub fn pause_at(&mut self, now: Instant) {
        self.anchor_position = self.position_at(now);
        self.anchor_instant = now;
        self.running = false;
    }

    /// Seek to `position` at `now`. Non-finite positions are ignored.
    pub fn seek_at(&mut self, position: f64, now: Instant) {
        if !position.is_finite() {
            log::warn!("[PLAYBACK] Ignoring seek to {position}");
            return;
        }
        self.anchor_position = clamp_position(position, self.duration);
        self.anchor_instant = now;
    }

    /// Position at `time`.
    pub fn position_at(&self, time: Instant) -> f64 {
        if !self.running || time <= self.anchor_instant {
            return self.anchor_position;
        }
        let elapsed = time.duration_since(self.anchor_instant).as_secs_f64();
        let position = self.anchor_position + elapsed;
        match self.duration {
            Some(duration) if self.looping => position % duration,
            Some(duration) => position.min(duration),
            None => position,
        }
    }

    /// Whether playback has run off the end at `time`.
    pub fn ended_at(&self, time: Instant) -> bool {
        !self.looping && self.duration.is_some_and(|d| self.position_at(time) >= d)
    }

    /// Whether the transport is running (it may still have reached the end).
    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl PositionSource for PlaybackController {
    fn current_position(&self) -> Option<f64> {
        self.duration?;
        Some(self.position_at(Instant::now()))
    }

    /// Reads the transport flag only; reaching the end is judged by the
    /// caller from the position it sampled.
    fn is_playing(&self) -> bool {
        self.running
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }
}

impl PlaybackControl for PlaybackController {
    fn play(&mut self) {
        self.play_at(Instant::now());
    }

    fn pause(&mut self) {
        self.pause_at(Instant::now());
    }

    fn seek(&mut self, position: f64) {
        self.seek_at(position, Instant::now());
    }
}

/// What happened during a [`SimulatedMedia::advance`] step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaProgress {
    /// Not playing, or no metadata yet.
    Idle,
    /// Position moved forward.
    Advanced,
    /// Position wrapped back to the start.
    Wrapped,
    /// Position reached the end and playback stopped.
    Ended,
}

/// Media element stand-in driven by virtual time.
#[derive(Clone, Debug)]
pub struct SimulatedMedia {
    position: f64,
    duration: Option<f64>,
    playing: bool,
    looping: bool,
}

impl SimulatedMedia {
    /// Media with known duration, paused at 0.
    pub fn new(duration: f64) -> Self {
        let mut media = Self::unloaded();
        media.load_metadata(duration);
        media
    }

    /// Media whose metadata has not loaded yet.
    pub fn unloaded() -> Self {
        Self {
            position: 0.0,
            duration: None,
            playing: false,
            looping: false,
        }
    }

    /// Record the content duration.
    pub fn load_metadata(&mut self, duration: f64) {
        if duration.is_finite() && duration > 0.0 {
            self.duration = Some(duration);
            self.position = clamp_position(self.position, self.duration);
        } else {
            log::warn!("[PLAYBACK] Ignoring invalid duration {duration}");
        }
    }

    /// Enable or disable wrap-around at the end of content.
    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Move the position without going through seek semantics (a host-side jump).
    pub fn set_position(&mut self, position: f64) {
        if position.is_finite() {
            self.position = clamp_position(position, self.duration);
        }
    }

    /// Position regardless of metadata state.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Step virtual time forward by `elapsed`.
    pub fn advance(&mut self, elapsed: Duration) -> MediaProgress {
        let Some(duration) = self.duration else {
            return MediaProgress::Idle;
        };
        if !self.playing {
            return MediaProgress::Idle;
        }
        let next = self.position + elapsed.as_secs_f64();
        if next < duration {
            self.position = next;
            MediaProgress::Advanced
        } else if self.looping {
            self.position = next % duration;
            MediaProgress::Wrapped
        } else {
            self.position = duration;
            self.playing = false;
            MediaProgress::Ended
        }
    }
}

impl PositionSource for SimulatedMedia {
    fn current_position(&self) -> Option<f64> {
        self.duration.map(|_| self.position)
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }
}

impl PlaybackControl for SimulatedMedia {
    fn play(&mut self) {
        if self.duration.is_some_and(|d| self.position >= d) {
            self.position = 0.0;
        }
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn seek(&mut self, position: f64) {
        self.set_position(position);
    }
}

/// Format seconds as `m:ss.cc` (minutes, seconds, hundredths).
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let minutes = (seconds / 60.0).floor() as u64;
    let secs = (seconds % 60.0).floor() as u64;
    let hundredths = ((seconds % 1.0) * 100.0).floor() as u64;
    format!("{minutes}:{secs:02}.{hundredths:02}")
}
