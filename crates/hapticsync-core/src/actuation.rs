//! Actuation controller.
//!
//! The controller is the single writer to the vibration actuator. It owns the
//! authoritative [`ActuationState`] and turns matcher results into start/stop
//! commands:
//!
//! ```text
//! Idle         -- cue c matched -------------> Actuating(c)   start(c)
//! Actuating(c) -- c matched again -----------> Actuating(c)   (nothing)
//! Actuating(c) -- none matched / cancel -----> Idle           stop
//! Actuating(c) -- c' matched ----------------> Actuating(c')  stop, start(c')
//! ```
//!
//! Every start is preceded by a stop if the actuator is believed to be
//! engaged, so two start commands never overlap.

use crossbeam_channel::Sender;

use crate::actuator::{self, ActuationCommand, Actuator};
use crate::cue::Cue;
use crate::events::{EventSink, ExitReason, SyncEvent};

/// What the controller believes the actuator is doing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActuationState {
    /// Cue whose window is currently active.
    pub active_cue_id: Option<String>,
    /// Whether a start command was accepted and not yet followed by a stop.
    pub actuator_engaged: bool,
}

impl ActuationState {
    /// Whether a cue is active.
    pub fn is_active(&self) -> bool {
        self.active_cue_id.is_some()
    }
}

/// Result of a reconciliation step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Same cue (or still no cue); no command issued.
    Unchanged,
    /// Idle to a cue.
    Entered(String),
    /// A cue to idle.
    Exited(String),
    /// Directly from one cue to another.
    Switched { from: String, to: String },
}

/// Owns the actuator and the actuation state machine.
pub struct ActuationController {
    /// `None` in desktop mode.
    actuator: Option<Box<dyn Actuator>>,
    state: ActuationState,
    events: EventSink,
}

impl ActuationController {
    /// Create a controller, running the startup capability check on `actuator`.
    pub fn new(actuator: Option<Box<dyn Actuator>>) -> Self {
        Self {
            actuator: actuator::detect(actuator),
            state: ActuationState::default(),
            events: EventSink::default(),
        }
    }

    /// A controller in desktop mode: tracks cues, never actuates.
    pub fn desktop() -> Self {
        Self::new(None)
    }

    /// Publish transitions on `tx`.
    pub fn set_event_sender(&mut self, tx: Sender<SyncEvent>) {
        self.events = EventSink::new(tx);
    }

    /// Whether actuation is disabled for this session.
    pub fn is_desktop_mode(&self) -> bool {
        self.actuator.is_none()
    }

    /// Current believed state.
    pub fn state(&self) -> &ActuationState {
        &self.state
    }

    /// Id of the active cue, if any.
    pub fn active_cue_id(&self) -> Option<&str> {
        self.state.active_cue_id.as_deref()
    }

    /// Bring the actuator in line with the cue matched at `position`.
    ///
    /// `position` must be the same sample the match was made with; it is used
    /// to size continuous vibrations to the rest of the window.
    pub fn reconcile(&mut self, position: f64, cue: Option<&Cue>) -> Transition {
        let previous = self.state.active_cue_id.clone();
        match (previous, cue) {
            (None, None) => Transition::Unchanged,
            (Some(active), Some(cue)) if active == cue.id => Transition::Unchanged,
            (Some(active), None) => {
                self.release(ExitReason::WindowExit);
                Transition::Exited(active)
            }
            (None, Some(cue)) => {
                self.engage(cue, position);
                Transition::Entered(cue.id.clone())
            }
            (Some(active), Some(cue)) => {
                self.release(ExitReason::Switched);
                self.engage(cue, position);
                Transition::Switched {
                    from: active,
                    to: cue.id.clone(),
                }
            }
        }
    }

    /// Force the controller to idle regardless of what the matcher says.
    ///
    /// Also clears the "last matched cue" memory, so landing in the same window
    /// afterwards counts as a fresh entry. Returns whether a cue was active.
    pub fn cancel(&mut self, reason: ExitReason) -> bool {
        if self.state.is_active() || self.state.actuator_engaged {
            log::debug!("[ACTUATION] Cancel ({:?})", reason);
            self.release(reason);
            true
        } else {
            false
        }
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        self.events.emit(event);
    }

    fn engage(&mut self, cue: &Cue, position: f64) {
        let command = match &cue.vibration_pattern {
            Some(pattern) => ActuationCommand::Pattern {
                steps: pattern.steps().to_vec(),
            },
            None => ActuationCommand::Continuous {
                duration_ms: cue.remaining_ms(position),
            },
        };

        debug_assert!(!self.state.actuator_engaged, "start issued while engaged");
        self.state.active_cue_id = Some(cue.id.clone());
        let issued = if self.actuator.is_some() {
            log::debug!("[ACTUATION] Enter '{}' at {:.3}s: {}", cue.id, position, command);
            self.issue(&command, Some(&cue.id))
        } else {
            log::debug!("[ACTUATION] Enter '{}' at {:.3}s (desktop mode)", cue.id, position);
            false
        };
        self.state.actuator_engaged = issued;

        self.events.emit(SyncEvent::CueEntered {
            cue_id: cue.id.clone(),
            label: cue.label.clone(),
            description: cue.description.clone(),
            position,
            command: issued.then_some(command),
        });
    }

    fn release(&mut self, reason: ExitReason) {
        let cue_id = self.state.active_cue_id.take();
        if self.state.actuator_engaged {
            self.issue(&ActuationCommand::Stop, cue_id.as_deref());
            // Believed silent even if the stop was refused: nothing else to try.
            self.state.actuator_engaged = false;
        }
        if let Some(cue_id) = cue_id {
            log::debug!("[ACTUATION] Exit '{}' ({:?})", cue_id, reason);
            self.events.emit(SyncEvent::CueExited { cue_id, reason });
        }
    }

    fn issue(&mut self, command: &ActuationCommand, cue_id: Option<&str>) -> bool {
        let Some(actuator) = self.actuator.as_mut() else {
            return false;
        };
        match actuator.actuate(command) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("[ACTUATION] Actuator '{}' failed on {}: {}", actuator.name(), command, err);
                self.events.emit(SyncEvent::ActuatorFailed {
                    cue_id: cue_id.map(str::to_string),
                    message: err.to_string(),
                });
                false
            }
        }
    }
}

impl std::fmt::Debug for ActuationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActuationController")
            .field("actuator", &self.actuator.as_ref().map(|a| a.name().to_string()))
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::RecordingActuator;
    use crossbeam_channel::unbounded;

    fn controller() -> (ActuationController, RecordingActuator) {
        let recorder = RecordingActuator::new();
        let controller = ActuationController::new(Some(Box::new(recorder.clone())));
        (controller, recorder)
    }

    fn continuous() -> Cue {
        Cue::new("hum", 10.0, 12.0, "Hum")
    }

    fn patterned() -> Cue {
        Cue::new("burst", 21.0, 22.2, "Burst").with_pattern(vec![200, 200, 200, 200, 200, 200])
    }

    #[test]
    fn test_idle_to_idle_is_noop() {
        let (mut controller, recorder) = controller();
        assert_eq!(controller.reconcile(1.0, None), Transition::Unchanged);
        assert!(recorder.commands().is_empty());
    }

    #[test]
    fn test_entry_issues_remaining_duration() {
        let (mut controller, recorder) = controller();
        let cue = continuous();
        assert_eq!(controller.reconcile(10.5, Some(&cue)), Transition::Entered("hum".into()));
        assert_eq!(recorder.commands(), vec![ActuationCommand::Continuous { duration_ms: 1500 }]);
        assert!(controller.state().actuator_engaged);
    }

    #[test]
    fn test_entry_issues_exact_pattern() {
        let (mut controller, recorder) = controller();
        controller.reconcile(21.0, Some(&patterned()));
        assert_eq!(
            recorder.commands(),
            vec![ActuationCommand::Pattern { steps: vec![200; 6] }]
        );
    }

    #[test]
    fn test_same_cue_does_not_retrigger() {
        let (mut controller, recorder) = controller();
        let cue = patterned();
        controller.reconcile(21.0, Some(&cue));
        for step in 1..10 {
            let position = 21.0 + step as f64 * 0.1;
            assert_eq!(controller.reconcile(position, Some(&cue)), Transition::Unchanged);
        }
        assert_eq!(recorder.commands().len(), 1);
    }

    #[test]
    fn test_exit_issues_stop() {
        let (mut controller, recorder) = controller();
        let cue = continuous();
        controller.reconcile(10.0, Some(&cue));
        assert_eq!(controller.reconcile(12.0, None), Transition::Exited("hum".into()));
        assert_eq!(recorder.stop_count(), 1);
        assert_eq!(controller.state(), &ActuationState::default());
    }

    #[test]
    fn test_switch_stops_before_starting() {
        let (mut controller, recorder) = controller();
        let first = Cue::new("a", 1.0, 2.0, "A");
        let second = Cue::new("b", 2.0, 3.0, "B").with_pattern(vec![50]);
        controller.reconcile(1.0, Some(&first));
        let transition = controller.reconcile(2.0, Some(&second));
        assert_eq!(
            transition,
            Transition::Switched {
                from: "a".into(),
                to: "b".into()
            }
        );
        assert_eq!(
            recorder.commands(),
            vec![
                ActuationCommand::Continuous { duration_ms: 1000 },
                ActuationCommand::Stop,
                ActuationCommand::Pattern { steps: vec![50] },
            ]
        );
    }

    #[test]
    fn test_cancel_forces_stop_and_clears_memory() {
        let (mut controller, recorder) = controller();
        let cue = patterned();
        controller.reconcile(21.0, Some(&cue));
        assert!(controller.cancel(ExitReason::Seek));
        assert_eq!(recorder.stop_count(), 1);
        assert!(controller.active_cue_id().is_none());

        // Same cue again is a fresh entry.
        assert_eq!(controller.reconcile(21.1, Some(&cue)), Transition::Entered("burst".into()));
        assert_eq!(recorder.starts().len(), 2);
    }

    #[test]
    fn test_cancel_when_idle_is_silent() {
        let (mut controller, recorder) = controller();
        assert!(!controller.cancel(ExitReason::Pause));
        assert!(recorder.commands().is_empty());
    }

    #[test]
    fn test_desktop_mode_tracks_cue_without_actuating() {
        let mut controller = ActuationController::desktop();
        assert!(controller.is_desktop_mode());
        controller.reconcile(10.0, Some(&continuous()));
        assert_eq!(controller.active_cue_id(), Some("hum"));
        assert!(!controller.state().actuator_engaged);
        assert!(controller.cancel(ExitReason::Pause));
    }

    #[test]
    fn test_unavailable_actuator_means_desktop_mode() {
        let controller = ActuationController::new(Some(Box::new(RecordingActuator::unavailable())));
        assert!(controller.is_desktop_mode());
    }

    #[test]
    fn test_rejected_start_is_not_fatal() {
        let (mut controller, recorder) = controller();
        let (tx, rx) = unbounded();
        controller.set_event_sender(tx);
        recorder.reject_next(1);

        controller.reconcile(10.0, Some(&continuous()));
        assert_eq!(controller.active_cue_id(), Some("hum"));
        assert!(!controller.state().actuator_engaged);

        // Not engaged, so leaving the window has nothing to stop.
        controller.reconcile(12.0, None);
        assert!(recorder.commands().is_empty());

        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(events[0], SyncEvent::ActuatorFailed { .. }));
        assert!(matches!(events[1], SyncEvent::CueEntered { command: None, .. }));
        assert!(matches!(
            events[2],
            SyncEvent::CueExited {
                reason: ExitReason::WindowExit,
                ..
            }
        ));
    }

    #[test]
    fn test_events_carry_label_and_description() {
        let (mut controller, _recorder) = controller();
        let (tx, rx) = unbounded();
        controller.set_event_sender(tx);
        let cue = continuous().with_description("Sonic vibration activation");
        controller.reconcile(10.0, Some(&cue));
        match rx.try_recv().unwrap() {
            SyncEvent::CueEntered {
                label,
                description,
                command,
                ..
            } => {
                assert_eq!(label, "Hum");
                assert_eq!(description, "Sonic vibration activation");
                assert_eq!(command, Some(ActuationCommand::Continuous { duration_ms: 2000 }));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
