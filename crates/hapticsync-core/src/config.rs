//! Configuration file support for haptic-sync
//!
//! Configuration is stored in TOML format at:
//! - Linux: `~/.config/haptic-sync/config.toml`
//! - macOS: `~/Library/Application Support/haptic-sync/config.toml`
//! - Windows: `%APPDATA%\haptic-sync\config.toml`

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::cue::CueTable;
use crate::error::{Error, Result};

/// Default frame cadence of the realtime driver.
pub const DEFAULT_REFRESH_RATE_HZ: f64 = 60.0;

/// Duration of the bundled demo video.
pub const DEFAULT_DURATION_SECS: f64 = 35.0;

const MAX_REFRESH_RATE_HZ: f64 = 1000.0;

const DEFAULT_CONFIG: &str = r#"# haptic-sync configuration file

[sync]
# Frame cadence of the realtime driver in Hz (1-1000)
refresh_rate_hz = 60.0

[actuator]
# Set to false to force desktop (visual-only) mode
enabled = true

[cues]
# Cue file (.toml or .json). The built-in demo table is used when unset.
# path = "cues.toml"

# Accept overlapping cue windows; the earliest-starting cue wins
allow_overlaps = false

[playback]
# Wrap to the start at the end of content
looping = false

# Content length used by simulated playback, in seconds
duration_secs = 35.0
"#;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncSettings,
    pub actuator: ActuatorSettings,
    pub cues: CueSettings,
    pub playback: PlaybackSettings,
}

impl Config {
    /// Load configuration from the default config file location
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            Self::load_from(&path)
        } else {
            Err(Error::Config(format!("Config file not found at {:?}", path)))
        }
    }

    /// Load configuration or return default if not found
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(Error::Config(_)) => Self::default(),
            Err(err) => {
                log::warn!("[CONFIG] Ignoring unreadable config: {}", err);
                Self::default()
            }
        }
    }

    /// Load and validate configuration from `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        log::debug!("[CONFIG] Loaded {}", path.display());
        Ok(config)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = ProjectDirs::from("", "", "haptic-sync") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Err(Error::Config("Could not determine config directory".to_string()))
        }
    }

    /// Create a default config file with comments
    pub fn create_default_config_file() -> Result<PathBuf> {
        let path = Self::config_path()?;
        Self::create_default_config_file_at(&path)?;
        Ok(path)
    }

    /// Write the commented default config file to `path`.
    pub fn create_default_config_file_at(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, DEFAULT_CONFIG)?;
        Ok(())
    }

    /// Check value ranges that the TOML types cannot express.
    pub fn validate(&self) -> Result<()> {
        let hz = self.sync.refresh_rate_hz;
        if !hz.is_finite() || !(1.0..=MAX_REFRESH_RATE_HZ).contains(&hz) {
            return Err(Error::Config(format!(
                "sync.refresh_rate_hz must be between 1 and {MAX_REFRESH_RATE_HZ}, got {hz}"
            )));
        }
        let duration = self.playback.duration_secs;
        if !duration.is_finite() || duration <= 0.0 {
            return Err(Error::Config(format!(
                "playback.duration_secs must be positive, got {duration}"
            )));
        }
        Ok(())
    }

    /// The cue table this configuration points at, or the demo table.
    pub fn cue_table(&self) -> Result<CueTable> {
        match &self.cues.path {
            Some(path) => CueTable::load(path, self.cues.allow_overlaps),
            None => Ok(CueTable::demo()),
        }
    }
}

/// Sync loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Frame cadence in Hz
    pub refresh_rate_hz: f64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            refresh_rate_hz: DEFAULT_REFRESH_RATE_HZ,
        }
    }
}

/// Actuator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActuatorSettings {
    /// `false` forces desktop mode
    pub enabled: bool,
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Cue source settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CueSettings {
    /// Cue file; `None` selects the demo table
    pub path: Option<PathBuf>,
    /// Degraded first-match mode for overlapping windows
    pub allow_overlaps: bool,
}

/// Playback settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackSettings {
    pub looping: bool,
    /// Content length for simulated playback
    pub duration_secs: f64,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            looping: false,
            duration_secs: DEFAULT_DURATION_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!((config.sync.refresh_rate_hz - 60.0).abs() < f64::EPSILON);
        assert!(config.actuator.enabled);
        assert!(!config.cues.allow_overlaps);
        assert!(config.cues.path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_file_matches_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[actuator]\nenabled = false\n").unwrap();
        assert!(!config.actuator.enabled);
        assert!((config.playback.duration_secs - DEFAULT_DURATION_SECS).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.sync.refresh_rate_hz = 0.0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = Config::default();
        config.playback.duration_secs = f64::NAN;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.playback.looping = true;
        config.cues.path = Some(PathBuf::from("cues.json"));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_create_default_config_file_at() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        Config::create_default_config_file_at(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_cue_table_from_config() {
        assert_eq!(Config::default().cue_table().unwrap().len(), 3);

        let dir = tempfile::tempdir().unwrap();
        let cue_path = dir.path().join("cues.toml");
        fs::write(
            &cue_path,
            "[[cues]]\nid = \"a\"\nstart_time = 1.0\nend_time = 2.0\nlabel = \"A\"\n",
        )
        .unwrap();
        let mut config = Config::default();
        config.cues.path = Some(cue_path);
        let table = config.cue_table().unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.get("a").is_some());
    }
}
