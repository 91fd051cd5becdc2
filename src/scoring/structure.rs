//! Structural alignment: beat grids, phrase lengths and drop placement

use super::trace::{Dimension, TraceBuilder};
use crate::types::FeatureRecord;

const GRID_MAX_BPM_DELTA: f64 = 3.0;
const GRID_MIN_CONFIDENCE: f64 = 0.85;

pub(super) fn evaluate(prev: &FeatureRecord, candidate: &FeatureRecord, trace: &mut TraceBuilder<'_>) {
    beat_grid(prev, candidate, trace);
    phrase_length(prev, candidate, trace);
    drop_on_phrase(candidate, trace);
}

fn beat_grid(prev: &FeatureRecord, candidate: &FeatureRecord, trace: &mut TraceBuilder<'_>) {
    let (Some(a), Some(b)) = (prev.beat_offset, candidate.beat_offset) else {
        return;
    };
    if (prev.bpm - candidate.bpm).abs() > GRID_MAX_BPM_DELTA
        || prev.bpm_confidence.min(candidate.bpm_confidence) < GRID_MIN_CONFIDENCE
    {
        return;
    }
    let delta = (a - b).abs();
    let bonus = match delta {
        d if d <= 0.5 => 10.0,
        d if d <= 1.0 => 9.0,
        d if d <= 2.0 => 7.0,
        d if d <= 4.0 => 4.0,
        _ => 0.0,
    };
    if bonus > 0.0 {
        trace.add(
            Dimension::Structure,
            delta,
            bonus,
            format!("downbeat offsets {:.2}s apart", delta),
        );
    }
}

fn phrase_length(prev: &FeatureRecord, candidate: &FeatureRecord, trace: &mut TraceBuilder<'_>) {
    let (Some(a), Some(b)) = (prev.phrase_beats, candidate.phrase_beats) else {
        return;
    };
    if a == 0 || b == 0 {
        return;
    }
    let (score, reason) = if a == b {
        (6.0, "equal phrase lengths")
    } else if a % b == 0 || b % a == 0 {
        (3.0, "phrase lengths are multiples")
    } else {
        (-3.0, "phrase lengths do not line up")
    };
    trace.add(Dimension::Structure, b as f64, score, reason);
}

/// Bonus when the candidate's first drop lands on one of its phrase boundaries
fn drop_on_phrase(candidate: &FeatureRecord, trace: &mut TraceBuilder<'_>) {
    let (Some(drop), Some(offset), Some(phrase)) = (
        candidate.markers.first_drop,
        candidate.beat_offset,
        candidate.phrase_beats,
    ) else {
        return;
    };
    if phrase == 0 || !candidate.is_usable() || drop < offset {
        return;
    }
    let beats = (drop - offset) * candidate.bpm / 60.0;
    let into_phrase = beats.rem_euclid(phrase as f64);
    let off_boundary = into_phrase.min(phrase as f64 - into_phrase);
    if off_boundary <= 1.0 {
        trace.add(
            Dimension::Structure,
            off_boundary,
            5.0,
            "first drop on a phrase boundary",
        );
    }
}
