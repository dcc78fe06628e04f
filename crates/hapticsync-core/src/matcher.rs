//! Position-to-cue matching.
//!
//! A linear scan is plenty: demo tables hold a handful of cues.

use crate::cue::{Cue, CueTable};

/// Find the cue whose window `[start_time, end_time)` contains `position`.
///
/// With a validated table there is at most one such cue. A table built with
/// overlaps allowed resolves ties to the first cue in table order. Non-finite
/// positions never match.
pub fn match_cue(position: f64, table: &CueTable) -> Option<&Cue> {
    if !position.is_finite() {
        return None;
    }
    table.iter().find(|cue| cue.contains(position))
}
