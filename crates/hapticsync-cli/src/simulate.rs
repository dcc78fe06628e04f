//! `haptic-sync simulate`: run a session in virtual time and print what the
//! actuator was asked to do.

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Receiver;
use hapticsync_core::{
    format_timestamp, ActuationCommand, Actuator, HapticPlayer, ScheduledAction, ScriptAction,
    SimulatedDriver, SimulatedMedia, SimulationReport, SyncEvent,
};
use serde::Serialize;

/// Parse `AT=VALUE` where both sides are seconds.
pub fn parse_pair(arg: &str) -> Result<(f64, f64)> {
    let (at, value) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("expected AT=SECONDS, got '{}'", arg))?;
    let at = parse_seconds(at).with_context(|| format!("invalid time in '{}'", arg))?;
    let value = parse_seconds(value).with_context(|| format!("invalid value in '{}'", arg))?;
    Ok((at, value))
}

/// Parse a non-negative finite number of seconds.
pub fn parse_seconds(arg: &str) -> Result<f64> {
    let seconds: f64 = arg.trim().parse().with_context(|| format!("'{}' is not a number", arg))?;
    if !seconds.is_finite() || seconds < 0.0 {
        anyhow::bail!("'{}' must be a non-negative number of seconds", arg);
    }
    Ok(seconds)
}

/// Transport script given on the command line.
#[derive(Debug, Default)]
pub struct Script {
    pub seeks: Vec<(f64, f64)>,
    pub pauses: Vec<(f64, f64)>,
    pub resets: Vec<f64>,
}

impl Script {
    /// Add the script's actions to `driver`. A pause of `FOR` seconds becomes a
    /// pause followed by a resume.
    pub fn apply_to(&self, mut driver: SimulatedDriver) -> SimulatedDriver {
        for &(at, to) in &self.seeks {
            driver.push_action(at, ScriptAction::Seek(to));
        }
        for &(at, length) in &self.pauses {
            driver.push_action(at, ScriptAction::Pause);
            driver.push_action(at + length, ScriptAction::Resume);
        }
        for &at in &self.resets {
            driver.push_action(at, ScriptAction::Reset);
        }
        driver
    }
}

#[derive(Debug, Serialize)]
pub struct SimulationOutput {
    pub desktop_mode: bool,
    pub script: Vec<ScheduledAction>,
    pub report: SimulationReport,
    pub commands: Vec<ActuationCommand>,
    pub events: Vec<SyncEvent>,
}

/// Run the simulation. `recorder` is the actuator handed to the player (absent
/// in desktop mode); `commands` reads back what it accepted.
pub fn run(
    media: SimulatedMedia,
    table: std::sync::Arc<hapticsync_core::CueTable>,
    actuator: Option<Box<dyn Actuator>>,
    commands: impl Fn() -> Vec<ActuationCommand>,
    driver: SimulatedDriver,
) -> Result<SimulationOutput> {
    let mut player = HapticPlayer::new(media, table, actuator);
    let events: Receiver<SyncEvent> = player.subscribe();
    let desktop_mode = player.is_desktop_mode();

    let report = driver.run(&mut player).context("simulation failed")?;
    player.teardown();
    drop(player);

    Ok(SimulationOutput {
        desktop_mode,
        script: driver.actions().to_vec(),
        report,
        commands: commands(),
        events: events.try_iter().collect(),
    })
}

pub fn print_text(output: &SimulationOutput) {
    if output.desktop_mode {
        println!("Desktop mode: cues are tracked, nothing is actuated");
    }
    for event in &output.events {
        println!("{}", describe_event(event));
    }
    println!();
    println!(
        "{} frames, {:.2}s virtual, final position {}{}",
        output.report.frames,
        output.report.virtual_secs,
        format_timestamp(output.report.final_position),
        if output.report.reached_end { " (end of content)" } else { "" }
    );
    let starts = output.commands.iter().filter(|c| c.is_start()).count();
    println!(
        "Actuator: {} commands ({} starts, {} stops)",
        output.commands.len(),
        starts,
        output.commands.len() - starts
    );
}

pub fn print_json(output: &SimulationOutput) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(output)?);
    Ok(())
}

/// One-line rendering of an event for terminal output.
pub fn describe_event(event: &SyncEvent) -> String {
    match event {
        SyncEvent::CueEntered {
            cue_id,
            label,
            description,
            position,
            command,
        } => {
            let command = command
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "no vibration".to_string());
            if description.is_empty() {
                format!("{}  enter {} \"{}\" -> {}", format_timestamp(*position), cue_id, label, command)
            } else {
                format!(
                    "{}  enter {} \"{}\" ({}) -> {}",
                    format_timestamp(*position),
                    cue_id,
                    label,
                    description,
                    command
                )
            }
        }
        SyncEvent::CueExited { cue_id, reason } => format!("         exit  {} ({:?})", cue_id, reason),
        SyncEvent::ActuatorFailed { cue_id, message } => {
            format!("         actuator failed for {}: {}", cue_id.as_deref().unwrap_or("-"), message)
        }
        SyncEvent::PlaybackEnded { position } => format!("{}  end of content", format_timestamp(*position)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hapticsync_core::{CueTable, ExitReason, RecordingActuator};
    use std::sync::Arc;

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("5=21.1").unwrap(), (5.0, 21.1));
        assert!(parse_pair("5").is_err());
        assert!(parse_pair("x=1").is_err());
        assert!(parse_pair("1=-2").is_err());
    }

    #[test]
    fn test_parse_seconds_rejects_non_finite() {
        assert!(parse_seconds("inf").is_err());
        assert!(parse_seconds("NaN").is_err());
        assert!((parse_seconds(" 2.5 ").unwrap() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_script_pause_becomes_pause_and_resume() {
        let script = Script {
            pauses: vec![(11.0, 2.0)],
            ..Script::default()
        };
        let driver = script.apply_to(SimulatedDriver::new(60.0));
        let actions: Vec<_> = driver.actions().iter().map(|a| (a.at, a.action)).collect();
        assert_eq!(actions, vec![(11.0, ScriptAction::Pause), (13.0, ScriptAction::Resume)]);
    }

    #[test]
    fn test_run_demo_with_pause() {
        let recorder = RecordingActuator::new();
        let reader = recorder.clone();
        let script = Script {
            pauses: vec![(11.0, 1.0)],
            ..Script::default()
        };
        let output = run(
            SimulatedMedia::new(35.0),
            Arc::new(CueTable::demo()),
            Some(Box::new(recorder)),
            move || reader.commands(),
            script.apply_to(SimulatedDriver::new(60.0)),
        )
        .unwrap();

        assert!(!output.desktop_mode);
        assert!(output.report.reached_end);
        // The pause inside cue-1 forces a stop; resuming re-enters it.
        assert_eq!(output.commands.iter().filter(|c| c.is_start()).count(), 4);
        assert!(output.events.iter().any(|e| matches!(
            e,
            SyncEvent::CueExited {
                reason: ExitReason::Pause,
                ..
            }
        )));
        assert!(matches!(output.events.last(), Some(SyncEvent::PlaybackEnded { .. })));
    }

    #[test]
    fn test_describe_event() {
        let line = describe_event(&SyncEvent::CueEntered {
            cue_id: "cue-1".into(),
            label: "Intense Clean".into(),
            description: String::new(),
            position: 10.0,
            command: Some(ActuationCommand::Continuous { duration_ms: 2000 }),
        });
        assert_eq!(line, "0:10.00  enter cue-1 \"Intense Clean\" -> continuous(2000ms)");
    }
}
