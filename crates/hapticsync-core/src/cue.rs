//! Haptic cues and the cue table.
//!
//! This module defines the static data the engine runs against:
//!
//! - [`Cue`] - A labelled half-open time window with an optional vibration pattern
//! - [`VibrationPattern`] - Alternating on/off durations in milliseconds, starting with "on"
//! - [`CueTable`] - The validated, time-ordered, immutable list of cues
//!
//! Cue files are TOML (`[[cues]]` tables) or JSON (an array, or an object with a
//! `cues` array). Numbers are read as floats and validated into the typed model,
//! so a negative or fractional pattern entry is reported instead of silently
//! truncated.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Alternating on/off vibration durations in milliseconds, starting with "on".
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct VibrationPattern(Vec<u32>);

impl VibrationPattern {
    /// Create a pattern from raw millisecond steps.
    pub fn new(steps: Vec<u32>) -> Self {
        Self(steps)
    }

    /// The on/off steps in milliseconds.
    pub fn steps(&self) -> &[u32] {
        &self.0
    }

    /// Total time the pattern takes to play out, in milliseconds.
    pub fn total_ms(&self) -> u64 {
        self.0.iter().map(|&step| step as u64).sum()
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// An empty pattern would be read by the actuator as a stop command.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn from_raw(cue_id: &str, raw: &[f64]) -> Result<Self> {
        let mut steps = Vec::with_capacity(raw.len());
        for (index, &value) in raw.iter().enumerate() {
            if !value.is_finite() {
                return Err(Error::invalid_cue(
                    cue_id,
                    format!("pattern entry {index} is not a finite number"),
                ));
            }
            if value < 0.0 {
                return Err(Error::invalid_cue(
                    cue_id,
                    format!("pattern entry {index} is negative ({value})"),
                ));
            }
            if value.fract() != 0.0 {
                return Err(Error::invalid_cue(
                    cue_id,
                    format!("pattern entry {index} is not a whole number of milliseconds ({value})"),
                ));
            }
            if value > u32::MAX as f64 {
                return Err(Error::invalid_cue(
                    cue_id,
                    format!("pattern entry {index} is too large ({value})"),
                ));
            }
            steps.push(value as u32);
        }
        Ok(Self(steps))
    }
}

impl From<Vec<u32>> for VibrationPattern {
    fn from(steps: Vec<u32>) -> Self {
        Self::new(steps)
    }
}

impl fmt::Display for VibrationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, step) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{step}")?;
        }
        write!(f, "]")
    }
}

/// A haptic cue: a labelled time window `[start_time, end_time)` in seconds.
///
/// Without a vibration pattern the cue vibrates continuously for whatever
/// remains of its window when it is entered.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Cue {
    /// Unique identifier within the table.
    pub id: String,
    /// Window start in seconds (inclusive).
    pub start_time: f64,
    /// Window end in seconds (exclusive).
    pub end_time: f64,
    /// Short display label.
    pub label: String,
    /// Longer display description.
    pub description: String,
    /// Optional on/off pattern issued once on entry.
    pub vibration_pattern: Option<VibrationPattern>,
}

impl Cue {
    /// Create a cue with no description and no pattern.
    ///
    /// The cue is checked when it is added to a [`CueTable`].
    pub fn new(id: impl Into<String>, start_time: f64, end_time: f64, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            start_time,
            end_time,
            label: label.into(),
            description: String::new(),
            vibration_pattern: None,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the vibration pattern.
    pub fn with_pattern(mut self, steps: impl Into<VibrationPattern>) -> Self {
        self.vibration_pattern = Some(steps.into());
        self
    }

    /// Whether `position` falls inside the half-open window.
    #[inline]
    pub fn contains(&self, position: f64) -> bool {
        position >= self.start_time && position < self.end_time
    }

    /// Window length in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.end_time - self.start_time
    }

    /// Milliseconds left in the window at `position`, never negative.
    pub fn remaining_ms(&self, position: f64) -> u32 {
        let remaining = ((self.end_time - position) * 1000.0).max(0.0).round();
        if remaining >= u32::MAX as f64 {
            u32::MAX
        } else {
            remaining as u32
        }
    }

    /// Whether the pattern keeps going after the window has closed.
    pub fn pattern_overruns_window(&self) -> bool {
        match &self.vibration_pattern {
            Some(pattern) => pattern.total_ms() as f64 > self.duration_secs() * 1000.0,
            None => false,
        }
    }

    /// Check the per-cue invariants.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::invalid_cue(&self.id, "id must not be empty"));
        }
        if !self.start_time.is_finite() || self.start_time < 0.0 {
            return Err(Error::invalid_cue(
                &self.id,
                format!("start_time must be a finite number >= 0 (got {})", self.start_time),
            ));
        }
        if !self.end_time.is_finite() {
            return Err(Error::invalid_cue(&self.id, "end_time must be finite"));
        }
        if self.end_time <= self.start_time {
            return Err(Error::invalid_cue(
                &self.id,
                format!(
                    "end_time ({}) must be greater than start_time ({})",
                    self.end_time, self.start_time
                ),
            ));
        }
        if let Some(pattern) = &self.vibration_pattern {
            if pattern.is_empty() {
                return Err(Error::invalid_cue(&self.id, "vibration_pattern must not be empty"));
            }
        }
        Ok(())
    }

    fn overlaps(&self, other: &Cue) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

/// Cue as written in a cue file, before validation.
#[derive(Debug, Deserialize)]
struct CueRecord {
    id: String,
    #[serde(alias = "startTime")]
    start_time: f64,
    #[serde(alias = "endTime")]
    end_time: f64,
    label: String,
    #[serde(default)]
    description: String,
    #[serde(default, alias = "vibrationPattern")]
    vibration_pattern: Option<Vec<f64>>,
}

impl CueRecord {
    fn into_cue(self) -> Result<Cue> {
        let vibration_pattern = match &self.vibration_pattern {
            Some(raw) => Some(VibrationPattern::from_raw(&self.id, raw)?),
            None => None,
        };
        Ok(Cue {
            id: self.id,
            start_time: self.start_time,
            end_time: self.end_time,
            label: self.label,
            description: self.description,
            vibration_pattern,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CueFile {
    #[serde(default)]
    cues: Vec<CueRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonCueFile {
    List(Vec<CueRecord>),
    Table(CueFile),
}

/// Immutable, time-ordered list of cues.
///
/// Built once at startup. In strict mode (the default) overlapping windows are
/// a configuration error. With overlaps allowed the matcher falls back to the
/// first cue in table order.
#[derive(Clone, Debug, Default)]
pub struct CueTable {
    cues: Vec<Cue>,
    overlaps_allowed: bool,
}

impl CueTable {
    /// Build a validated table; overlapping windows are rejected.
    pub fn new(cues: Vec<Cue>) -> Result<Self> {
        Self::build(cues, false)
    }

    /// Build a table that tolerates overlapping windows (degraded first-match mode).
    pub fn with_overlaps_allowed(cues: Vec<Cue>) -> Result<Self> {
        Self::build(cues, true)
    }

    /// A table with no cues.
    pub fn empty() -> Self {
        Self::default()
    }

    fn build(mut cues: Vec<Cue>, allow_overlaps: bool) -> Result<Self> {
        let mut seen = HashSet::with_capacity(cues.len());
        for cue in &cues {
            cue.validate()?;
            if !seen.insert(cue.id.as_str()) {
                return Err(Error::DuplicateCueId(cue.id.clone()));
            }
        }

        // Stable: equal start times keep file order for first-match tie-breaking.
        cues.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

        let mut overlap_count = 0;
        for (i, cue) in cues.iter().enumerate() {
            for later in &cues[i + 1..] {
                if later.start_time >= cue.end_time {
                    break;
                }
                if cue.overlaps(later) {
                    if !allow_overlaps {
                        return Err(Error::OverlappingCues {
                            first: cue.id.clone(),
                            second: later.id.clone(),
                        });
                    }
                    overlap_count += 1;
                    log::warn!(
                        "[CUES] Cue '{}' overlaps '{}'; '{}' wins while both are active",
                        cue.id,
                        later.id,
                        cue.id
                    );
                }
            }
        }

        for cue in cues.iter().filter(|c| c.pattern_overruns_window()) {
            log::warn!(
                "[CUES] Pattern of cue '{}' lasts {}ms but its window is {:.0}ms; it is stopped at window exit",
                cue.id,
                cue.vibration_pattern.as_ref().map(|p| p.total_ms()).unwrap_or_default(),
                cue.duration_secs() * 1000.0
            );
        }

        log::debug!(
            "[CUES] Built cue table with {} cues ({} overlaps)",
            cues.len(),
            overlap_count
        );

        Ok(Self {
            cues,
            overlaps_allowed: allow_overlaps,
        })
    }

    /// The three cues of the toothbrush product demo.
    pub fn demo() -> Self {
        Self {
            cues: vec![
                Cue::new("cue-1", 10.0, 12.0, "Intense Clean")
                    .with_description("Sonic vibration activation"),
                Cue::new("cue-2", 16.0, 17.0, "Pulse Mode").with_description("Short rapid burst"),
                Cue::new("cue-3", 28.0, 30.0, "Deep Scrub")
                    .with_description("Sustained sonic frequency"),
            ],
            overlaps_allowed: false,
        }
    }

    /// Parse a TOML cue file (`[[cues]]` tables).
    pub fn from_toml_str(content: &str, allow_overlaps: bool) -> Result<Self> {
        let file: CueFile = toml::from_str(content)?;
        Self::from_records(file.cues, allow_overlaps)
    }

    /// Parse a JSON cue file (array of cues, or `{ "cues": [...] }`).
    pub fn from_json_str(content: &str, allow_overlaps: bool) -> Result<Self> {
        let records = match serde_json::from_str::<JsonCueFile>(content)? {
            JsonCueFile::List(records) => records,
            JsonCueFile::Table(file) => file.cues,
        };
        Self::from_records(records, allow_overlaps)
    }

    /// Load a cue file, choosing the format by extension (`.json` or TOML).
    pub fn load(path: &Path, allow_overlaps: bool) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let table = if is_json {
            Self::from_json_str(&content, allow_overlaps)?
        } else {
            Self::from_toml_str(&content, allow_overlaps)?
        };
        log::info!("[CUES] Loaded {} cues from {}", table.len(), path.display());
        Ok(table)
    }

    fn from_records(records: Vec<CueRecord>, allow_overlaps: bool) -> Result<Self> {
        let cues = records
            .into_iter()
            .map(CueRecord::into_cue)
            .collect::<Result<Vec<_>>>()?;
        Self::build(cues, allow_overlaps)
    }

    /// All cues, ordered by start time.
    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    /// Iterate cues in table order.
    pub fn iter(&self) -> std::slice::Iter<'_, Cue> {
        self.cues.iter()
    }

    /// Look up a cue by id.
    pub fn get(&self, id: &str) -> Option<&Cue> {
        self.cues.iter().find(|cue| cue.id == id)
    }

    /// Number of cues.
    pub fn len(&self) -> usize {
        self.cues.len()
    }

    /// Whether the table has no cues.
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Whether the table was built in degraded first-match mode.
    pub fn overlaps_allowed(&self) -> bool {
        self.overlaps_allowed
    }
}

impl<'a> IntoIterator for &'a CueTable {
    type Item = &'a Cue;
    type IntoIter = std::slice::Iter<'a, Cue>;

    fn into_iter(self) -> Self::IntoIter {
        self.cues.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_demo_table_is_valid() {
        let demo = CueTable::demo();
        let rebuilt = CueTable::new(demo.cues().to_vec()).unwrap();
        assert_eq!(rebuilt.len(), 3);
        assert_eq!(rebuilt.get("cue-2").unwrap().label, "Pulse Mode");
    }

    #[test]
    fn test_table_sorted_by_start_time() {
        let table = CueTable::new(vec![
            Cue::new("late", 20.0, 21.0, "Late"),
            Cue::new("early", 1.0, 2.0, "Early"),
        ])
        .unwrap();
        let ids: Vec<_> = table.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[test]
    fn test_adjacent_windows_do_not_overlap() {
        let table = CueTable::new(vec![
            Cue::new("a", 1.0, 2.0, "A"),
            Cue::new("b", 2.0, 3.0, "B"),
        ]);
        assert!(table.is_ok());
    }

    #[test]
    fn test_overlap_rejected() {
        let err = CueTable::new(vec![
            Cue::new("a", 1.0, 3.0, "A"),
            Cue::new("b", 2.0, 4.0, "B"),
        ])
        .unwrap_err();
        match err {
            Error::OverlappingCues { first, second } => {
                assert_eq!(first, "a");
                assert_eq!(second, "b");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overlap_allowed_in_degraded_mode() {
        let table = CueTable::with_overlaps_allowed(vec![
            Cue::new("a", 1.0, 3.0, "A"),
            Cue::new("b", 2.0, 4.0, "B"),
        ])
        .unwrap();
        assert!(table.overlaps_allowed());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let err = CueTable::new(vec![
            Cue::new("a", 1.0, 2.0, "A"),
            Cue::new("a", 5.0, 6.0, "Again"),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::DuplicateCueId(id) if id == "a"));
    }

    #[test]
    fn test_invalid_windows_rejected() {
        assert!(CueTable::new(vec![Cue::new("neg", -1.0, 2.0, "x")]).is_err());
        assert!(CueTable::new(vec![Cue::new("empty", 2.0, 2.0, "x")]).is_err());
        assert!(CueTable::new(vec![Cue::new("nan", f64::NAN, 2.0, "x")]).is_err());
        assert!(CueTable::new(vec![Cue::new("inf", 1.0, f64::INFINITY, "x")]).is_err());
        assert!(CueTable::new(vec![Cue::new(" ", 1.0, 2.0, "x")]).is_err());
        assert!(CueTable::new(vec![Cue::new("p", 1.0, 2.0, "x").with_pattern(vec![])]).is_err());
    }

    #[test]
    fn test_remaining_ms() {
        let cue = Cue::new("a", 10.0, 12.0, "A");
        assert_eq!(cue.remaining_ms(10.0), 2000);
        assert_eq!(cue.remaining_ms(11.5), 500);
        assert_eq!(cue.remaining_ms(13.0), 0);
    }

    #[test]
    fn test_pattern_overrun_detection() {
        let fits = Cue::new("a", 21.0, 22.2, "A").with_pattern(vec![200, 200, 200, 200, 200, 200]);
        assert!(!fits.pattern_overruns_window());
        let overruns = Cue::new("b", 0.0, 0.5, "B").with_pattern(vec![400, 200]);
        assert!(overruns.pattern_overruns_window());
    }

    #[test]
    fn test_parse_toml() {
        let content = r#"
[[cues]]
id = "burst"
start_time = 21
end_time = 22.2
label = "Burst"
vibration_pattern = [200, 200, 200, 200, 200, 200]

[[cues]]
id = "hum"
start_time = 10.0
end_time = 12.0
label = "Hum"
description = "Continuous"
"#;
        let table = CueTable::from_toml_str(content, false).unwrap();
        assert_eq!(table.cues()[0].id, "hum");
        let burst = table.get("burst").unwrap();
        assert_eq!(burst.vibration_pattern.as_ref().unwrap().steps(), &[200; 6]);
        assert!((burst.start_time - 21.0).abs() < 0.001);
    }

    #[test]
    fn test_parse_json_with_camel_case() {
        let content = r#"[
            {"id": "cue-1", "startTime": 10, "endTime": 12, "label": "Intense Clean",
             "description": "Sonic vibration activation"},
            {"id": "cue-2", "startTime": 16, "endTime": 17, "label": "Pulse Mode",
             "vibrationPattern": [100, 50, 100]}
        ]"#;
        let table = CueTable::from_json_str(content, false).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("cue-1").unwrap().description, "Sonic vibration activation");
        assert_eq!(
            table.get("cue-2").unwrap().vibration_pattern.as_ref().unwrap().total_ms(),
            250
        );
    }

    #[test]
    fn test_parse_json_object_form() {
        let content = r#"{"cues": [{"id": "a", "start_time": 1, "end_time": 2, "label": "A"}]}"#;
        let table = CueTable::from_json_str(content, false).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_malformed_pattern_entries() {
        let negative = r#"[{"id": "a", "startTime": 1, "endTime": 2, "label": "A", "vibrationPattern": [100, -5]}]"#;
        let err = CueTable::from_json_str(negative, false).unwrap_err();
        assert!(err.to_string().contains("negative"), "{err}");

        let fractional = r#"[{"id": "a", "startTime": 1, "endTime": 2, "label": "A", "vibrationPattern": [100.5]}]"#;
        let err = CueTable::from_json_str(fractional, false).unwrap_err();
        assert!(err.to_string().contains("whole number"), "{err}");
    }

    #[test]
    fn test_load_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("cues.json");
        let mut file = fs::File::create(&json_path).unwrap();
        writeln!(file, r#"[{{"id": "a", "startTime": 1, "endTime": 2, "label": "A"}}]"#).unwrap();
        assert_eq!(CueTable::load(&json_path, false).unwrap().len(), 1);

        let toml_path = dir.path().join("cues.toml");
        fs::write(
            &toml_path,
            "[[cues]]\nid = \"b\"\nstart_time = 3\nend_time = 4\nlabel = \"B\"\n",
        )
        .unwrap();
        assert_eq!(CueTable::load(&toml_path, false).unwrap().get("b").unwrap().label, "B");
    }

    #[test]
    fn test_pattern_display() {
        let pattern = VibrationPattern::new(vec![200, 100]);
        assert_eq!(pattern.to_string(), "[200, 100]");
    }
}
