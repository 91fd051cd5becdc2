//! Tempo dimension: tiered BPM delta rewards

use super::trace::{Dimension, TraceBuilder};
use crate::phase::PhaseTarget;
use crate::types::FeatureRecord;

/// BPM changes smaller than this count as steady
const STEADY_EPSILON: f64 = 0.05;

/// Absolute BPM delta bins
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TempoTier {
    Within2,
    Within4,
    Within6,
    Within8,
    Within10,
    Within12,
    Within16,
    Within20,
    Within30,
    Beyond30,
}

/// Sign of the tempo change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Accelerating,
    Steady,
    Decelerating,
}

impl Direction {
    fn of(change: f64) -> Self {
        if change.abs() < STEADY_EPSILON {
            Direction::Steady
        } else if change > 0.0 {
            Direction::Accelerating
        } else {
            Direction::Decelerating
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Direction::Accelerating => "accelerating",
            Direction::Steady => "steady",
            Direction::Decelerating => "decelerating",
        }
    }
}

impl TempoTier {
    pub fn for_delta(delta: f64) -> Self {
        let delta = delta.abs();
        match delta {
            d if d <= 2.0 => TempoTier::Within2,
            d if d <= 4.0 => TempoTier::Within4,
            d if d <= 6.0 => TempoTier::Within6,
            d if d <= 8.0 => TempoTier::Within8,
            d if d <= 10.0 => TempoTier::Within10,
            d if d <= 12.0 => TempoTier::Within12,
            d if d <= 16.0 => TempoTier::Within16,
            d if d <= 20.0 => TempoTier::Within20,
            d if d <= 30.0 => TempoTier::Within30,
            _ => TempoTier::Beyond30,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TempoTier::Within2 => "≤2",
            TempoTier::Within4 => "≤4",
            TempoTier::Within6 => "≤6",
            TempoTier::Within8 => "≤8",
            TempoTier::Within10 => "≤10",
            TempoTier::Within12 => "≤12",
            TempoTier::Within16 => "≤16",
            TempoTier::Within20 => "≤20",
            TempoTier::Within30 => "≤30",
            TempoTier::Beyond30 => ">30",
        }
    }

    /// (accelerating, steady, decelerating) base rewards
    fn rewards(self) -> (f64, f64, f64) {
        match self {
            TempoTier::Within2 => (100.0, 100.0, 100.0),
            TempoTier::Within4 => (90.0, 85.0, 60.0),
            TempoTier::Within6 => (70.0, 50.0, 20.0),
            TempoTier::Within8 => (50.0, 30.0, -20.0),
            TempoTier::Within10 => (30.0, 10.0, -60.0),
            TempoTier::Within12 => (10.0, -80.0, -80.0),
            TempoTier::Within16 => (-20.0, -100.0, -100.0),
            TempoTier::Within20 => (-60.0, -150.0, -150.0),
            TempoTier::Within30 => (-200.0, -200.0, -200.0),
            TempoTier::Beyond30 => (-300.0, -300.0, -300.0),
        }
    }

    /// Reward for this tier; cool-down relaxes deceleration above tier 3
    pub fn reward(self, direction: Direction, cooldown: bool) -> f64 {
        let (accelerating, steady, decelerating) = self.rewards();
        match direction {
            Direction::Accelerating => accelerating,
            Direction::Steady => steady,
            Direction::Decelerating if cooldown && self > TempoTier::Within6 => accelerating,
            Direction::Decelerating => decelerating,
        }
    }
}

pub(super) fn evaluate(
    prev: &FeatureRecord,
    candidate: &FeatureRecord,
    target: &PhaseTarget,
    trace: &mut TraceBuilder<'_>,
) {
    let change = candidate.bpm - prev.bpm;
    let delta = change.abs();
    let tier = TempoTier::for_delta(delta);
    let direction = Direction::of(change);
    let reward = tier.reward(direction, target.is_cooldown());

    trace.add(
        Dimension::Tempo,
        delta,
        reward,
        format!(
            "tier {} ({:+.1} BPM, {})",
            tier.label(),
            change,
            direction.as_str()
        ),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(TempoTier::for_delta(0.0), TempoTier::Within2);
        assert_eq!(TempoTier::for_delta(2.0), TempoTier::Within2);
        assert_eq!(TempoTier::for_delta(2.01), TempoTier::Within4);
        assert_eq!(TempoTier::for_delta(-7.5), TempoTier::Within8);
        assert_eq!(TempoTier::for_delta(30.0), TempoTier::Within30);
        assert_eq!(TempoTier::for_delta(40.0), TempoTier::Beyond30);
    }

    #[test]
    fn test_deceleration_penalized_outside_cooldown() {
        let tier = TempoTier::Within8;
        assert!(tier.reward(Direction::Decelerating, false) < tier.reward(Direction::Accelerating, false));
        assert_eq!(
            tier.reward(Direction::Decelerating, true),
            tier.reward(Direction::Accelerating, true)
        );
        // lower tiers keep their deceleration penalty even in cool-down
        let tier = TempoTier::Within4;
        assert_eq!(tier.reward(Direction::Decelerating, true), 60.0);
    }

    #[test]
    fn test_rewards_fall_with_distance() {
        let tiers = [
            TempoTier::Within2,
            TempoTier::Within4,
            TempoTier::Within6,
            TempoTier::Within8,
            TempoTier::Within10,
            TempoTier::Within12,
            TempoTier::Within16,
            TempoTier::Within20,
            TempoTier::Within30,
            TempoTier::Beyond30,
        ];
        for pair in tiers.windows(2) {
            assert!(
                pair[0].reward(Direction::Accelerating, false)
                    >= pair[1].reward(Direction::Accelerating, false)
            );
        }
    }
}
