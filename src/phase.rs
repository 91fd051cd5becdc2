//! Energy phase model
//!
//! Maps a position in a set to a narrative phase and its target energy
//! band. Phases only move forward: realized energy can pull a phase
//! earlier than its position would suggest, and Cool-down is terminal.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Number of realized energies averaged for pull-forward
const RECENT_WINDOW: usize = 5;

/// Candidate energy this far outside the band implies a different phase
const IMPLIED_PHASE_MARGIN: i16 = 10;

/// Narrative segment of a set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    WarmUp = 0,
    BuildUp = 1,
    Peak = 2,
    Sustain = 3,
    CoolDown = 4,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Phase::WarmUp,
        Phase::BuildUp,
        Phase::Peak,
        Phase::Sustain,
        Phase::CoolDown,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn next(self) -> Option<Phase> {
        Phase::ALL.get(self.index() as usize + 1).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Phase::WarmUp => "Warm-up",
            Phase::BuildUp => "Build-up",
            Phase::Peak => "Peak",
            Phase::Sustain => "Sustain",
            Phase::CoolDown => "Cool-down",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inclusive target energy range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnergyBand {
    pub min: u8,
    pub max: u8,
}

impl EnergyBand {
    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    pub fn center(self) -> f64 {
        (self.min as f64 + self.max as f64) / 2.0
    }

    pub fn contains(self, energy: u8) -> bool {
        (self.min..=self.max).contains(&energy)
    }

    fn is_valid(self) -> bool {
        self.min < self.max && self.max <= 100
    }
}

/// Target band for every phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseBands {
    pub warm_up: EnergyBand,
    pub build_up: EnergyBand,
    pub peak: EnergyBand,
    pub sustain: EnergyBand,
    pub cool_down: EnergyBand,
}

impl Default for PhaseBands {
    fn default() -> Self {
        Self {
            warm_up: EnergyBand::new(30, 55),
            build_up: EnergyBand::new(50, 70),
            peak: EnergyBand::new(65, 85),
            sustain: EnergyBand::new(70, 90),
            cool_down: EnergyBand::new(45, 70),
        }
    }
}

impl PhaseBands {
    pub fn band(&self, phase: Phase) -> EnergyBand {
        match phase {
            Phase::WarmUp => self.warm_up,
            Phase::BuildUp => self.build_up,
            Phase::Peak => self.peak,
            Phase::Sustain => self.sustain,
            Phase::CoolDown => self.cool_down,
        }
    }

    pub fn is_valid(&self) -> bool {
        Phase::ALL.iter().all(|&phase| self.band(phase).is_valid())
    }
}

/// Phase implied by position alone, with `p = (index + 1) / total`
pub fn positional_phase(index: usize, total: usize) -> Phase {
    let p = (index + 1) as f64 / total.max(1) as f64;
    if p <= 0.2 {
        Phase::WarmUp
    } else if p <= 0.4 {
        Phase::BuildUp
    } else if p <= 0.75 {
        Phase::Peak
    } else if p <= 0.9 {
        Phase::Sustain
    } else {
        Phase::CoolDown
    }
}

/// What the next position of a set asks for
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseTarget {
    pub index: usize,
    pub total: usize,
    pub phase: Phase,
    pub band: EnergyBand,
    /// Highest phase any placed track has been assigned
    pub highest_phase: Phase,
    pub cooldown_entered: bool,
    /// Highest energy placed so far
    pub max_energy: u8,
    pub bands: PhaseBands,
}

impl PhaseTarget {
    pub fn position(&self) -> f64 {
        (self.index + 1) as f64 / self.total.max(1) as f64
    }

    pub fn is_cooldown(&self) -> bool {
        self.cooldown_entered || self.phase == Phase::CoolDown
    }

    pub fn peak_reached(&self) -> bool {
        self.highest_phase >= Phase::Peak
    }

    /// The phase a candidate's energy would put the set in
    pub fn implied_phase(&self, energy: u8) -> Phase {
        if self.is_cooldown() {
            return Phase::CoolDown;
        }

        let energy_i = energy as i16;
        if energy_i < self.band.min as i16 - IMPLIED_PHASE_MARGIN {
            return Phase::ALL[..self.phase.index() as usize]
                .iter()
                .rev()
                .copied()
                .find(|&p| self.bands.band(p).contains(energy))
                .unwrap_or(Phase::WarmUp);
        }

        if energy_i > self.band.max as i16 + IMPLIED_PHASE_MARGIN {
            return Phase::ALL[self.phase.index() as usize + 1..Phase::CoolDown.index() as usize]
                .iter()
                .copied()
                .find(|&p| self.bands.band(p).contains(energy))
                .unwrap_or(self.phase);
        }

        self.phase
    }

    /// Judge a candidate that would put the set in `candidate`
    pub fn check_candidate(&self, candidate: Phase) -> PhaseVerdict {
        if self.cooldown_entered && candidate < Phase::CoolDown {
            return PhaseVerdict::Rejected(-200.0);
        }
        // past Sustain the arc may only hold or wind down
        if self.highest_phase == Phase::Sustain && candidate < Phase::Sustain {
            return PhaseVerdict::Rejected(-150.0);
        }
        if candidate < self.highest_phase {
            return if self.peak_reached() {
                PhaseVerdict::Rejected(-100.0)
            } else {
                PhaseVerdict::Penalized(-30.0)
            };
        }
        if candidate.index() > self.highest_phase.index() + 1 && candidate != Phase::CoolDown {
            return PhaseVerdict::Penalized(-20.0);
        }
        PhaseVerdict::Allowed
    }
}

/// Outcome of a phase regression or skip check
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PhaseVerdict {
    Allowed,
    Penalized(f64),
    Rejected(f64),
}

impl PhaseVerdict {
    pub fn delta(self) -> f64 {
        match self {
            PhaseVerdict::Allowed => 0.0,
            PhaseVerdict::Penalized(delta) | PhaseVerdict::Rejected(delta) => delta,
        }
    }

    pub fn is_rejected(self) -> bool {
        matches!(self, PhaseVerdict::Rejected(_))
    }
}

/// Phase state for one set under construction
#[derive(Debug, Clone)]
pub struct EnergyPhaseModel {
    bands: PhaseBands,
    total: usize,
    highest: Phase,
    cooldown_entered: bool,
    recent: VecDeque<u8>,
    max_energy: u8,
}

impl EnergyPhaseModel {
    pub fn new(bands: PhaseBands, total: usize) -> Self {
        Self {
            bands,
            total: total.max(1),
            highest: Phase::WarmUp,
            cooldown_entered: false,
            recent: VecDeque::with_capacity(RECENT_WINDOW),
            max_energy: 0,
        }
    }

    pub fn highest_phase(&self) -> Phase {
        self.highest
    }

    pub fn cooldown_entered(&self) -> bool {
        self.cooldown_entered
    }

    /// Target for the track placed at `index`
    pub fn target(&self, index: usize) -> PhaseTarget {
        let phase = if self.cooldown_entered {
            Phase::CoolDown
        } else {
            let positional = positional_phase(index, self.total);
            self.pull_forward(positional).max(self.highest)
        };

        PhaseTarget {
            index,
            total: self.total,
            phase,
            band: self.bands.band(phase),
            highest_phase: self.highest,
            cooldown_entered: self.cooldown_entered,
            max_energy: self.max_energy,
            bands: self.bands,
        }
    }

    /// Advance past a placed track
    pub fn record(&mut self, phase: Phase, energy: u8) {
        let phase = if self.cooldown_entered {
            Phase::CoolDown
        } else {
            phase.max(self.highest)
        };
        self.highest = phase;
        if phase == Phase::CoolDown {
            self.cooldown_entered = true;
        }
        if self.recent.len() == RECENT_WINDOW {
            self.recent.pop_front();
        }
        self.recent.push_back(energy);
        self.max_energy = self.max_energy.max(energy);
    }

    /// Assign phases to an ordered list of realized energies
    pub fn replay(bands: PhaseBands, energies: &[u8]) -> Vec<Phase> {
        let mut model = EnergyPhaseModel::new(bands, energies.len());
        energies
            .iter()
            .enumerate()
            .map(|(index, &energy)| {
                let phase = model.target(index).phase;
                model.record(phase, energy);
                phase
            })
            .collect()
    }

    fn pull_forward(&self, positional: Phase) -> Phase {
        if self.recent.is_empty() || positional >= Phase::Sustain {
            return positional;
        }
        let average =
            self.recent.iter().map(|&e| e as f64).sum::<f64>() / self.recent.len() as f64;

        let mut phase = positional;
        while phase < Phase::Sustain && average > self.bands.band(phase).max as f64 {
            match phase.next() {
                Some(next) => phase = next,
                None => break,
            }
        }
        phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_boundaries() {
        // 10 tracks: p = 0.1 .. 1.0
        let phases: Vec<Phase> = (0..10).map(|i| positional_phase(i, 10)).collect();
        assert_eq!(
            phases,
            vec![
                Phase::WarmUp,
                Phase::WarmUp,
                Phase::BuildUp,
                Phase::BuildUp,
                Phase::Peak,
                Phase::Peak,
                Phase::Peak,
                Phase::Sustain,
                Phase::Sustain,
                Phase::CoolDown,
            ]
        );
    }

    #[test]
    fn test_pull_forward_after_high_energy() {
        let mut model = EnergyPhaseModel::new(PhaseBands::default(), 20);
        assert_eq!(model.target(0).phase, Phase::WarmUp);
        model.record(Phase::WarmUp, 80);
        model.record(Phase::WarmUp, 82);
        // still positionally warm-up, but realized energy is past its ceiling
        let target = model.target(2);
        assert!(target.phase > Phase::WarmUp);
        assert!(target.phase <= Phase::Sustain);
    }

    #[test]
    fn test_cooldown_is_terminal() {
        let mut model = EnergyPhaseModel::new(PhaseBands::default(), 10);
        model.record(Phase::CoolDown, 60);
        for index in 0..10 {
            assert_eq!(model.target(index).phase, Phase::CoolDown);
        }
        model.record(Phase::WarmUp, 20);
        assert_eq!(model.highest_phase(), Phase::CoolDown);
    }

    #[test]
    fn test_replay_never_leaves_cooldown_for_any_ordering() {
        // deterministic pseudo-random orderings
        let mut state: u64 = 0x2545_F491_4F6C_DD1D;
        for _ in 0..200 {
            let len = 5 + (state % 40) as usize;
            let energies: Vec<u8> = (0..len)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 7;
                    state ^= state << 17;
                    (state % 101) as u8
                })
                .collect();

            let phases = EnergyPhaseModel::replay(PhaseBands::default(), &energies);
            let mut seen_cooldown = false;
            for pair in phases.windows(2) {
                assert!(pair[1] >= pair[0], "phase regressed: {:?}", phases);
            }
            for phase in phases {
                if seen_cooldown {
                    assert_eq!(phase, Phase::CoolDown);
                }
                seen_cooldown |= phase == Phase::CoolDown;
            }
        }
    }

    #[test]
    fn test_regression_verdicts() {
        let mut model = EnergyPhaseModel::new(PhaseBands::default(), 10);
        model.record(Phase::BuildUp, 60);
        let target = model.target(2);
        assert_eq!(target.check_candidate(Phase::WarmUp), PhaseVerdict::Penalized(-30.0));

        model.record(Phase::Peak, 75);
        let target = model.target(4);
        assert!(target.check_candidate(Phase::BuildUp).is_rejected());
        assert_eq!(target.check_candidate(Phase::Peak), PhaseVerdict::Allowed);
    }

    #[test]
    fn test_sustain_only_holds_or_cools_down() {
        let mut model = EnergyPhaseModel::new(PhaseBands::default(), 10);
        for (phase, energy) in [(Phase::WarmUp, 50), (Phase::Peak, 75), (Phase::Sustain, 85)] {
            model.record(phase, energy);
        }
        let target = model.target(3);
        assert_eq!(target.highest_phase, Phase::Sustain);
        assert_eq!(target.check_candidate(Phase::Peak), PhaseVerdict::Rejected(-150.0));
        assert_eq!(target.check_candidate(Phase::WarmUp), PhaseVerdict::Rejected(-150.0));
        assert_eq!(target.check_candidate(Phase::Sustain), PhaseVerdict::Allowed);
        assert_eq!(target.check_candidate(Phase::CoolDown), PhaseVerdict::Allowed);

        model.record(Phase::CoolDown, 60);
        assert_eq!(model.target(4).check_candidate(Phase::Peak), PhaseVerdict::Rejected(-200.0));
    }

    #[test]
    fn test_implied_phase_for_low_energy() {
        let mut model = EnergyPhaseModel::new(PhaseBands::default(), 10);
        model.record(Phase::WarmUp, 45);
        model.record(Phase::BuildUp, 60);
        model.record(Phase::BuildUp, 62);
        let target = model.target(4);
        assert_eq!(target.phase, Phase::Peak);
        assert_eq!(target.implied_phase(40), Phase::WarmUp);
        assert_eq!(target.implied_phase(72), Phase::Peak);
    }
}
