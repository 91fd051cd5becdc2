//! Tonality dimension: Camelot wheel compatibility

use super::trace::{Dimension, TraceBuilder};
use crate::key::{self, CamelotKey};
use crate::types::FeatureRecord;

/// Compatibility assumed when either key is unknown
const UNKNOWN_KEY_COMPATIBILITY: f64 = 50.0;

/// Harmonic compatibility on a 0-100 scale
///
/// Same key and relative major/minor score 100. Beyond that the score
/// falls with wheel distance, and keeping the letter is worth 10 points.
pub fn key_compatibility(a: Option<CamelotKey>, b: Option<CamelotKey>) -> f64 {
    let (Some(a), Some(b)) = (a, b) else {
        return UNKNOWN_KEY_COMPATIBILITY;
    };
    let same_letter = a.mode() == b.mode();
    let (same, other) = match key::distance(a, b) {
        0 => (100.0, 100.0),
        1 => (95.0, 85.0),
        2 => (85.0, 75.0),
        3 | 4 => (70.0, 60.0),
        5 => (45.0, 35.0),
        _ => (30.0, 20.0),
    };
    if same_letter {
        same
    } else {
        other
    }
}

fn key_weight(compatibility: f64) -> f64 {
    if compatibility >= 100.0 {
        0.30
    } else if compatibility >= 95.0 {
        0.25
    } else if compatibility >= 85.0 {
        0.22
    } else {
        0.20
    }
}

pub(super) fn evaluate(prev: &FeatureRecord, candidate: &FeatureRecord, trace: &mut TraceBuilder<'_>) {
    let compatibility = key_compatibility(prev.key, candidate.key);

    let (Some(from), Some(to)) = (prev.key, candidate.key) else {
        trace.add(
            Dimension::Tonality,
            compatibility,
            compatibility * key_weight(compatibility),
            "key unknown, neutral compatibility",
        );
        return;
    };

    trace.add(
        Dimension::Tonality,
        compatibility,
        compatibility * key_weight(compatibility),
        format!("{} -> {} compatibility {:.0}", from, to, compatibility),
    );

    let distance = key::distance(from, to);
    let distance_penalty = match distance {
        d if d >= 5 => -50.0,
        4 => -30.0,
        3 => -15.0,
        _ => 0.0,
    };
    if distance_penalty < 0.0 {
        trace.add(
            Dimension::Tonality,
            distance as f64,
            distance_penalty,
            format!("wheel distance {}", distance),
        );
    }

    let clash_penalty = if compatibility < 40.0 {
        -30.0
    } else if compatibility < 60.0 {
        -15.0
    } else {
        0.0
    };
    if clash_penalty < 0.0 {
        trace.add(
            Dimension::Tonality,
            compatibility,
            clash_penalty,
            "low harmonic compatibility",
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: &str) -> Option<CamelotKey> {
        CamelotKey::parse(code).ok()
    }

    #[test]
    fn test_relative_and_same_key_score_maximally() {
        assert_eq!(key_compatibility(key("8A"), key("8A")), 100.0);
        assert_eq!(key_compatibility(key("8A"), key("8B")), 100.0);
    }

    #[test]
    fn test_adjacent_and_letter_bonus() {
        assert_eq!(key_compatibility(key("8A"), key("9A")), 95.0);
        assert_eq!(key_compatibility(key("8A"), key("9B")), 85.0);
        assert_eq!(key_compatibility(key("12A"), key("1A")), 95.0);
    }

    #[test]
    fn test_compatibility_falls_with_distance() {
        let origin = key("1A");
        let mut previous = 100.0;
        for step in 0..=6 {
            let score = key_compatibility(origin, origin.map(|k| k.step(step)));
            assert!(score <= previous, "step {} scored {}", step, score);
            previous = score;
        }
        assert_eq!(previous, 30.0);
    }

    #[test]
    fn test_unknown_key_is_neutral() {
        assert_eq!(key_compatibility(None, key("5B")), 50.0);
        assert_eq!(key_compatibility(key("5B"), None), 50.0);
    }
}
