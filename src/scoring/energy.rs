//! Energy dimension: band fit, drops, regressions and phase order

use super::trace::{Dimension, TraceBuilder};
use crate::phase::{Phase, PhaseTarget, PhaseVerdict};
use crate::types::FeatureRecord;

/// Energy below the peak that is tolerated before a regression penalty
const REGRESSION_TOLERANCE: i16 = 10;

pub(super) fn evaluate(
    prev: &FeatureRecord,
    candidate: &FeatureRecord,
    target: &PhaseTarget,
    trace: &mut TraceBuilder<'_>,
) {
    let energy = candidate.energy as i16;
    let cooldown = target.is_cooldown();

    // band fit
    let distance = (candidate.energy as f64 - target.band.center()).abs();
    let fit = (1.0 - distance / 40.0).max(0.0) * 20.0;
    trace.add(
        Dimension::Energy,
        candidate.energy as f64,
        fit,
        format!(
            "energy {} vs {} band {}-{}",
            candidate.energy, target.phase, target.band.min, target.band.max
        ),
    );

    // shortfall while the set should be building or holding
    if matches!(target.phase, Phase::BuildUp | Phase::Peak | Phase::Sustain)
        && energy < target.band.min as i16
    {
        let gap = target.band.min as i16 - energy;
        let penalty = match gap {
            g if g >= 15 => -300.0,
            g if g >= 10 => -200.0,
            g if g >= 5 => -100.0,
            _ => -50.0,
        };
        trace.add(
            Dimension::Energy,
            gap as f64,
            penalty,
            format!("{} below {} floor", gap, target.phase),
        );
    }

    // drop from the previous track
    let drop = prev.energy as i16 - energy;
    if drop > 0 && !cooldown {
        let penalty = match drop {
            d if d > 50 => -200.0,
            d if d > 35 => -120.0,
            d if d > 25 => -70.0,
            d if d > 15 => -35.0,
            d if d > 8 => -15.0,
            d if d > 3 => -8.0,
            _ => 0.0,
        };
        if penalty < 0.0 {
            trace.add(
                Dimension::Energy,
                drop as f64,
                penalty,
                format!("energy drop of {} outside cool-down", drop),
            );
        }
    } else if drop > 10 && cooldown {
        trace.add(
            Dimension::Energy,
            drop as f64,
            15.0,
            format!("cool-down release of {}", drop),
        );
    }

    // step size
    let step = (energy - prev.energy as i16).abs();
    let building = matches!(target.phase, Phase::BuildUp | Phase::Peak);
    let closeness = match (step, building) {
        (s, true) if s <= 5 => 40.0,
        (s, true) if s <= 10 => 27.0,
        (s, true) if s <= 15 => 13.0,
        (s, true) if s <= 20 => 7.0,
        (s, false) if s <= 5 => 30.0,
        (s, false) if s <= 10 => 20.0,
        (s, false) if s <= 15 => 10.0,
        (s, false) if s <= 20 => 5.0,
        _ => -5.0,
    };
    trace.add(
        Dimension::Energy,
        step as f64,
        closeness,
        format!("energy step {}", step),
    );

    // regression against the set's high point
    let regression = target.max_energy as i16 - energy;
    if target.peak_reached() && !cooldown && regression > REGRESSION_TOLERANCE {
        let excess = regression - REGRESSION_TOLERANCE;
        let penalty = match excess {
            e if e <= 5 => -20.0,
            e if e <= 10 => -50.0,
            _ => -100.0,
        };
        trace.add(
            Dimension::Energy,
            regression as f64,
            penalty,
            format!("{} below the set's peak energy {}", regression, target.max_energy),
        );
    }

    // phase order
    let implied = target.implied_phase(candidate.energy);
    let verdict = target.check_candidate(implied);
    let reason = match verdict {
        PhaseVerdict::Allowed => format!("fits {}", implied),
        PhaseVerdict::Penalized(_) => format!("implies {} after {}", implied, target.highest_phase),
        PhaseVerdict::Rejected(_) => format!(
            "implies {} after {}, arc already committed",
            implied, target.highest_phase
        ),
    };
    trace.add(Dimension::Phase, implied.index() as f64, verdict.delta(), reason);
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{Dimension, Scorer};
    use crate::phase::{EnergyPhaseModel, Phase, PhaseBands};

    #[test]
    fn test_drop_penalized_outside_cooldown() {
        let scorer = Scorer::default();
        let a = track("a", 124.0, "8A", 85);
        let b = track("b", 124.0, "8A", 40);
        let target = mid_set_target();
        let scored = scorer.score_records(&a, &b, &target);
        assert!(scored
            .trace
            .entries_for(Dimension::Energy)
            .any(|e| e.reason.contains("drop") && e.delta < 0.0));
    }

    #[test]
    fn test_drop_rewarded_in_cooldown() {
        let scorer = Scorer::default();
        let a = track("a", 124.0, "8A", 80);
        let b = track("b", 124.0, "8A", 55);

        let mut model = EnergyPhaseModel::new(PhaseBands::default(), 10);
        for (index, energy) in [50u8, 60, 70, 75, 80, 82, 80, 78, 80].iter().enumerate() {
            let phase = model.target(index).phase;
            model.record(phase, *energy);
        }
        let target = model.target(9);
        assert_eq!(target.phase, Phase::CoolDown);

        let scored = scorer.score_records(&a, &b, &target);
        assert!(scored
            .trace
            .entries_for(Dimension::Energy)
            .any(|e| e.reason.contains("release") && e.delta > 0.0));
        assert_eq!(scored.trace.delta_for(Dimension::Phase), 0.0);
    }

    #[test]
    fn test_regression_after_peak_is_penalized() {
        let scorer = Scorer::default();
        let mut model = EnergyPhaseModel::new(PhaseBands::default(), 20);
        for (index, energy) in [50u8, 55, 60, 65, 70, 75, 80, 85, 85].iter().enumerate() {
            let phase = model.target(index).phase;
            model.record(phase, *energy);
        }
        let target = model.target(9);
        assert!(target.peak_reached());

        let prev = track("a", 124.0, "8A", 85);
        let low = track("b", 124.0, "8A", 45);
        let scored = scorer.score_records(&prev, &low, &target);
        assert!(scored.trace.delta_for(Dimension::Phase) <= -100.0);
        assert!(scored
            .trace
            .entries_for(Dimension::Energy)
            .any(|e| e.reason.contains("peak energy")));
    }
}
