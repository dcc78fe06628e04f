//! HapticSync CLI - The `haptic-sync` command.
//!
//! Drives the sync engine from the terminal: inspect and validate cue files,
//! simulate a viewing session in virtual time, or play one against the wall
//! clock with a logging actuator standing in for the vibration device.

mod simulate;

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hapticsync_core::{
    format_timestamp, Actuator, Config, CueTable, HapticPlayer, LogActuator, PlaybackControl,
    PlaybackController, RealtimeDriver, RecordingActuator, SimulatedDriver, SimulatedMedia,
};

use crate::simulate::Script;

/// HapticSync - vibration cues in step with video playback
#[derive(Parser, Debug)]
#[command(name = "haptic-sync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Synchronize vibration cues with video playback", long_about = None)]
struct Cli {
    /// Config file path (default: ~/.config/haptic-sync/config.toml)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the cue table
    Cues {
        /// Cue file (.toml or .json); defaults to the configured table
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Load and validate a cue file
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Accept overlapping windows (earliest-starting cue wins)
        #[arg(long)]
        allow_overlaps: bool,
    },

    /// Run a session in virtual time and print the actuator log
    Simulate {
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,

        /// Content length in seconds
        #[arg(short, long, value_name = "SECONDS")]
        duration: Option<f64>,

        /// Frame cadence in Hz
        #[arg(long, value_name = "HZ")]
        refresh_rate: Option<f64>,

        /// Seek at virtual time AT to media position TO
        #[arg(long = "seek", value_name = "AT=TO")]
        seeks: Vec<String>,

        /// Pause at virtual time AT for FOR seconds
        #[arg(long = "pause", value_name = "AT=FOR")]
        pauses: Vec<String>,

        /// Reset to the start at virtual time AT
        #[arg(long = "reset-at", value_name = "AT")]
        resets: Vec<String>,

        /// Run without a vibration actuator
        #[arg(long)]
        desktop: bool,

        /// Wrap to the start at the end of content
        #[arg(long = "loop")]
        looping: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Play a session against the wall clock until the end or Ctrl-C
    Play {
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,

        /// Content length in seconds
        #[arg(short, long, value_name = "SECONDS")]
        duration: Option<f64>,

        /// Run without a vibration actuator
        #[arg(long)]
        desktop: bool,
    },

    /// Create a default configuration file
    Init,

    /// Show the configuration file path
    ConfigPath,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    run(Cli::parse())
}

fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;

    match cli.command {
        Commands::Init => {
            let path = match config_path {
                Some(path) => {
                    Config::create_default_config_file_at(&path)?;
                    path
                }
                None => Config::create_default_config_file()?,
            };
            println!("Created default config at: {}", path.display());
            Ok(())
        }
        Commands::ConfigPath => {
            let path = match config_path {
                Some(path) => path,
                None => Config::config_path()?,
            };
            println!("{}", path.display());
            Ok(())
        }
        Commands::Validate { file, allow_overlaps } => {
            let table = CueTable::load(&file, allow_overlaps)
                .with_context(|| format!("Invalid cue file {}", file.display()))?;
            println!("{}: {} cues OK", file.display(), table.len());
            Ok(())
        }
        Commands::Cues { file } => {
            let config = load_config(config_path.as_deref())?;
            list_cues(&*load_table(&config, file)?)
        }
        Commands::Simulate {
            file,
            duration,
            refresh_rate,
            seeks,
            pauses,
            resets,
            desktop,
            looping,
            json,
        } => {
            let config = load_config(config_path.as_deref())?;
            let script = Script {
                seeks: seeks.iter().map(|s| simulate::parse_pair(s)).collect::<Result<_>>()?,
                pauses: pauses.iter().map(|s| simulate::parse_pair(s)).collect::<Result<_>>()?,
                resets: resets.iter().map(|s| simulate::parse_seconds(s)).collect::<Result<_>>()?,
            };
            run_simulation(
                &config,
                load_table(&config, file)?,
                duration,
                refresh_rate,
                script,
                desktop,
                looping,
                json,
            )
        }
        Commands::Play { file, duration, desktop } => {
            let config = load_config(config_path.as_deref())?;
            run_realtime(&config, load_table(&config, file)?, duration, desktop)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            Config::load_from(path).with_context(|| format!("Failed to load config {}", path.display()))
        }
        None => Ok(Config::load_or_default()),
    }
}

/// The table from `--file`, else the configured cue file, else the demo table.
fn load_table(config: &Config, file: Option<PathBuf>) -> Result<Arc<CueTable>> {
    let table = match file {
        Some(file) => CueTable::load(&file, config.cues.allow_overlaps)
            .with_context(|| format!("Failed to load cues from {}", file.display()))?,
        None => config.cue_table().context("Failed to load configured cue table")?,
    };
    Ok(Arc::new(table))
}

fn content_duration(config: &Config, duration: Option<f64>) -> Result<f64> {
    let duration = duration.unwrap_or(config.playback.duration_secs);
    if !duration.is_finite() || duration <= 0.0 {
        anyhow::bail!("Duration must be a positive number of seconds, got {}", duration);
    }
    Ok(duration)
}

fn list_cues(table: &CueTable) -> Result<()> {
    if table.is_empty() {
        println!("No cues");
        return Ok(());
    }
    for cue in table {
        let pattern = cue
            .vibration_pattern
            .as_ref()
            .map(|p| format!("pattern {}", p))
            .unwrap_or_else(|| "continuous".to_string());
        println!(
            "{:<12} {} - {}  {:<20} {}",
            cue.id,
            format_timestamp(cue.start_time),
            format_timestamp(cue.end_time),
            cue.label,
            pattern
        );
        if !cue.description.is_empty() {
            println!("{:<12} {}", "", cue.description);
        }
    }
    if table.overlaps_allowed() {
        println!("(overlapping windows allowed: earliest-starting cue wins)");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_simulation(
    config: &Config,
    table: Arc<CueTable>,
    duration: Option<f64>,
    refresh_rate: Option<f64>,
    script: Script,
    desktop: bool,
    looping: bool,
    json: bool,
) -> Result<()> {
    let duration = content_duration(config, duration)?;
    let refresh_rate = refresh_rate.unwrap_or(config.sync.refresh_rate_hz);
    let looping = looping || config.playback.looping;

    let mut media = SimulatedMedia::new(duration);
    media.set_looping(looping);

    let mut driver = script.apply_to(SimulatedDriver::new(refresh_rate));
    if looping {
        // Looping media never ends on its own: cover the script plus one pass.
        let last_action = driver.actions().last().map(|a| a.at).unwrap_or(0.0);
        driver = driver.with_time_limit(last_action + duration);
    }

    let recorder = RecordingActuator::new();
    let reader = recorder.clone();
    let actuator: Option<Box<dyn Actuator>> = if desktop || !config.actuator.enabled {
        None
    } else {
        Some(Box::new(recorder))
    };

    let output = simulate::run(media, table, actuator, move || reader.commands(), driver)?;
    if json {
        simulate::print_json(&output)
    } else {
        simulate::print_text(&output);
        Ok(())
    }
}

fn run_realtime(config: &Config, table: Arc<CueTable>, duration: Option<f64>, desktop: bool) -> Result<()> {
    let duration = content_duration(config, duration)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))
        .context("Failed to install Ctrl-C handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))
        .context("Failed to install SIGTERM handler")?;

    let mut clock = PlaybackController::with_duration(duration);
    clock.set_looping(config.playback.looping);

    let actuator: Option<Box<dyn Actuator>> = if desktop || !config.actuator.enabled {
        None
    } else {
        Some(Box::new(LogActuator::new("vibrate")))
    };

    let mut player = HapticPlayer::new(clock, table, actuator);
    let events = player.subscribe();
    let printer = std::thread::spawn(move || {
        for event in events {
            println!("{}", simulate::describe_event(&event));
        }
    });

    println!("Playing {} of content (Ctrl-C to stop)", format_timestamp(duration));
    player.play()?;
    let driver = RealtimeDriver::from_config(config, shutdown);
    let frames = driver.run(&mut player);
    log::debug!("Delivered {} frames", frames);

    player.teardown();
    if player.source().is_running() {
        player.source_mut().pause();
    }
    drop(player);
    join_printer(printer)
}

/// Wait for the event printer, surfacing a panic in it as an error.
fn join_printer(printer: JoinHandle<()>) -> Result<()> {
    printer
        .join()
        .map_err(|_| anyhow::anyhow!("Event printer thread panicked"))
}
