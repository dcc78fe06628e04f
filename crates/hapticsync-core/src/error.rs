//! Error types for the haptic sync engine.

use thiserror::Error;

/// Result type alias for hapticsync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading cues, configuring or driving the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file or value error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A single cue definition is malformed
    #[error("Invalid cue '{id}': {reason}")]
    InvalidCue { id: String, reason: String },

    /// Two cue windows share time
    #[error("Cue '{first}' overlaps cue '{second}'")]
    OverlappingCues { first: String, second: String },

    /// Two cues use the same id
    #[error("Duplicate cue id '{0}'")]
    DuplicateCueId(String),

    /// The sync loop was asked to start before playback metadata is known
    #[error("Playback metadata not loaded")]
    MetadataNotLoaded,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid_cue(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidCue {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
