//! Vocal dimensions: overlap in the transition window and edge placement

use super::trace::{Dimension, TraceBuilder};
use super::ScorerConfig;
use crate::types::{FeatureRecord, EDGE_WINDOW_RATIO};

pub(super) fn evaluate(
    prev: &FeatureRecord,
    candidate: &FeatureRecord,
    config: &ScorerConfig,
    trace: &mut TraceBuilder<'_>,
) {
    let Some(overlap) = overlap_ratio(prev, candidate) else {
        trace.add(Dimension::VocalConflict, 0.0, 0.0, "no vocal timeline");
        return;
    };

    let (penalty, reason) = if overlap > config.vocal_overlap_heavy {
        (-30.0, "vocals clash across the transition")
    } else if overlap > config.vocal_overlap_moderate {
        (-15.0, "vocals partly overlap in the transition")
    } else {
        (0.0, "vocals clear of each other")
    };
    trace.add(Dimension::VocalConflict, overlap, penalty, reason);

    let (Some(outro), Some(intro)) = (prev.outro_vocal_ratio(), candidate.intro_vocal_ratio())
    else {
        return;
    };
    let placement = if outro < 0.3 && intro < 0.3 {
        8.0
    } else if outro < 0.3 || intro < 0.3 {
        4.0
    } else if outro > 0.7 && intro > 0.7 {
        -5.0
    } else {
        0.0
    };
    if placement != 0.0 {
        trace.add(
            Dimension::VocalPlacement,
            outro.max(intro),
            placement,
            format!("outro vocals {:.0}%, intro vocals {:.0}%", outro * 100.0, intro * 100.0),
        );
    }
}

/// Share of the transition window where both tracks carry vocals
///
/// `None` when either timeline is missing or no window can be formed.
///
/// The outgoing window runs from the lead-out marker (or the last 30%) to
/// the end; the incoming window from the start to the lead-in marker (or
/// the first 30%). Both are aligned on a common window of the shorter
/// length, ending at the outgoing track's end.
pub(super) fn overlap_ratio(prev: &FeatureRecord, candidate: &FeatureRecord) -> Option<f64> {
    let (prev_vocals, next_vocals) = (prev.vocals.as_ref()?, candidate.vocals.as_ref()?);
    let has_length = |secs: f64| secs.is_finite() && secs > 0.0;
    if !has_length(prev.duration_secs) || !has_length(candidate.duration_secs) {
        return None;
    }

    let prev_start = prev
        .markers
        .lead_out_start()
        .filter(|&t| t < prev.duration_secs)
        .unwrap_or(prev.duration_secs * (1.0 - EDGE_WINDOW_RATIO));
    let next_end = candidate
        .markers
        .lead_in_end()
        .filter(|&t| t > 0.0)
        .unwrap_or(candidate.duration_secs * EDGE_WINDOW_RATIO);

    let length = (prev.duration_secs - prev_start).min(next_end);
    if !has_length(length) {
        return None;
    }

    let outgoing = prev_vocals.window(prev.duration_secs - length, prev.duration_secs);
    let incoming = next_vocals.window(0.0, length);
    Some((intersection_seconds(&outgoing, &incoming) / length).clamp(0.0, 1.0))
}

/// Total length shared by two sorted, non-overlapping interval lists
fn intersection_seconds(a: &[(f64, f64)], b: &[(f64, f64)]) -> f64 {
    let (mut i, mut j, mut total) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        let start = a[i].0.max(b[j].0);
        let end = a[i].1.min(b[j].1);
        if end > start {
            total += end - start;
        }
        if a[i].1 < b[j].1 {
            i += 1;
        } else {
            j += 1;
        }
    }
    total
}
