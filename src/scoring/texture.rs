//! Timbre, rhythm, loudness and dynamics dimensions

use super::genre::rhythm_family_from_genre;
use super::trace::{Dimension, TraceBuilder};
use super::ScorerConfig;
use crate::types::{DrumPattern, FeatureRecord};

pub(super) fn evaluate(
    prev: &FeatureRecord,
    candidate: &FeatureRecord,
    config: &ScorerConfig,
    trace: &mut TraceBuilder<'_>,
) {
    timbre(prev, candidate, trace);
    rhythm(prev, candidate, trace);
    loudness(prev, candidate, config, trace);
    dynamics(prev, candidate, config, trace);
}

fn graded_delta(delta: f64) -> f64 {
    if delta <= 0.1 {
        6.0
    } else if delta <= 0.2 {
        3.0
    } else if delta > 0.35 {
        -4.0
    } else {
        0.0
    }
}

fn timbre(prev: &FeatureRecord, candidate: &FeatureRecord, trace: &mut TraceBuilder<'_>) {
    if let (Some(a), Some(b)) = (&prev.timbre, &candidate.timbre) {
        let similarity = a.cosine_similarity(b);
        let delta = if similarity > 0.8 {
            10.0
        } else if similarity < 0.4 {
            -10.0
        } else {
            0.0
        };
        trace.add(
            Dimension::Timbre,
            similarity,
            delta,
            format!("timbre similarity {:.2}", similarity),
        );
    }

    if let (Some(a), Some(b)) = (&prev.spectral_balance, &candidate.spectral_balance) {
        let delta = a.weighted_delta(b);
        trace.add(
            Dimension::Timbre,
            delta,
            graded_delta(delta),
            format!("spectral balance delta {:.2}", delta),
        );
    }
}

fn rhythm_family(record: &FeatureRecord) -> DrumPattern {
    match (record.drum_pattern, &record.genre) {
        (DrumPattern::Unknown, Some(genre)) => rhythm_family_from_genre(&genre.name),
        (pattern, _) => pattern,
    }
}

fn rhythm(prev: &FeatureRecord, candidate: &FeatureRecord, trace: &mut TraceBuilder<'_>) {
    if prev.time_signature != candidate.time_signature {
        trace.add(
            Dimension::Rhythm,
            candidate.time_signature as f64,
            -500.0,
            format!(
                "time signature {}/4 -> {}/4",
                prev.time_signature, candidate.time_signature
            ),
        );
    }

    let (from, to) = (rhythm_family(prev), rhythm_family(candidate));
    if from != DrumPattern::Unknown && to != DrumPattern::Unknown && from != to {
        use DrumPattern::*;
        let penalty = match (from, to) {
            (HalfTime, FourOnFloor) | (FourOnFloor, HalfTime) => -80.0,
            (Breakbeat, FourOnFloor) | (FourOnFloor, Breakbeat) => -40.0,
            (Latin, FourOnFloor) | (FourOnFloor, Latin) => -15.0,
            _ => -25.0,
        };
        trace.add(
            Dimension::Rhythm,
            0.0,
            penalty,
            format!("rhythm family {} -> {}", from.as_str(), to.as_str()),
        );
    }

    if let (Some(a), Some(b)) = (prev.groove_density, candidate.groove_density) {
        let delta = (a - b).abs();
        trace.add(
            Dimension::Rhythm,
            delta,
            graded_delta(delta),
            format!("groove density delta {:.2}", delta),
        );
    }

    if let (Some(a), Some(b)) = (prev.swing_amount, candidate.swing_amount) {
        let delta = (a - b).abs();
        let score = if delta < 0.15 {
            8.0
        } else if delta > 0.4 {
            -40.0
        } else {
            0.0
        };
        trace.add(
            Dimension::Rhythm,
            delta,
            score,
            format!("swing delta {:.2}", delta),
        );
    }
}

fn loudness(
    prev: &FeatureRecord,
    candidate: &FeatureRecord,
    config: &ScorerConfig,
    trace: &mut TraceBuilder<'_>,
) {
    let (Some(a), Some(b)) = (prev.lufs, candidate.lufs) else {
        return;
    };
    let delta = (a - b).abs();
    let score = if delta > config.lufs_max_db {
        -80.0
    } else if delta > config.lufs_warn_db {
        -40.0 * (delta / config.lufs_warn_db)
    } else if delta > config.lufs_mild_db {
        -10.0
    } else if delta <= config.lufs_match_db {
        10.0
    } else {
        0.0
    };
    trace.add(
        Dimension::Loudness,
        delta,
        score,
        format!("loudness delta {:.1} LU", delta),
    );
}

fn dynamics(
    prev: &FeatureRecord,
    candidate: &FeatureRecord,
    config: &ScorerConfig,
    trace: &mut TraceBuilder<'_>,
) {
    let (Some(a), Some(b)) = (prev.dynamic_range_db, candidate.dynamic_range_db) else {
        return;
    };
    let delta = (a - b).abs();
    let score = if delta <= config.dynamic_range_close_db {
        6.0
    } else if delta <= config.dynamic_range_near_db {
        2.0
    } else if delta > config.dynamic_range_far_db {
        -5.0
    } else {
        0.0
    };
    trace.add(
        Dimension::Dynamics,
        delta,
        score,
        format!("dynamic range delta {:.1} dB", delta),
    );
}
