//! Bounded local-swap repair
//!
//! Slides a window over a finished set and swaps tracks a position or two
//! apart when that clearly improves the transitions around them. The
//! parked tail is never touched and tracks never move between sets.

use super::{Set, SequencedTrack};
use crate::config::SequencingConfig;
use crate::phase::EnergyPhaseModel;
use crate::scoring::Scorer;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Swap search parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub enabled: bool,
    /// Upper bound on the window; the effective window is `min(window, len / 4)`
    pub window: usize,
    /// Farthest two swapped tracks may be apart
    pub max_move: usize,
    /// Score improvement a swap must exceed
    pub min_gain: f64,
    pub max_passes: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: 10,
            max_move: 2,
            min_gain: 20.0,
            max_passes: 8,
        }
    }
}

pub struct GlobalOptimizer<'a> {
    scorer: &'a Scorer,
    config: &'a SequencingConfig,
}

impl<'a> GlobalOptimizer<'a> {
    pub fn new(scorer: &'a Scorer, config: &'a SequencingConfig) -> Self {
        Self { scorer, config }
    }

    /// Improve `set` in place, returning the number of swaps made
    pub fn optimize(&self, set: &mut Set) -> usize {
        let options = &self.config.optimizer;
        let len = set.curated_len();
        let window = options.window.min(len / 4);
        if !options.enabled || window < 3 {
            return 0;
        }
        let step = (window / 2).max(1);

        let mut swaps = 0;
        for pass in 0..options.max_passes {
            let mut improved = false;
            let mut start = 0;
            loop {
                let end = (start + window).min(len);
                for i in start..end {
                    for distance in 1..=options.max_move {
                        let j = i + distance;
                        if j >= end {
                            break;
                        }
                        if let Some(gain) = self.swap_gain(&set.tracks[..len], i, j) {
                            trace!("pass {}: swap {} <-> {} (+{:.1})", pass, i, j, gain);
                            set.tracks.swap(i, j);
                            swaps += 1;
                            improved = true;
                        }
                    }
                }
                if end == len {
                    break;
                }
                start += step;
            }
            if !improved {
                break;
            }
        }
        swaps
    }

    /// Gain from swapping `i` and `j`, if the swap is worth making
    fn swap_gain(&self, tracks: &[SequencedTrack], i: usize, j: usize) -> Option<f64> {
        let len = tracks.len();
        let mut edges: Vec<usize> = [i, i + 1, j, j + 1]
            .into_iter()
            .filter(|&k| k >= 1 && k < len)
            .collect();
        edges.sort_unstable();
        edges.dedup();

        let identity: Vec<usize> = (0..len).collect();
        let mut swapped = identity.clone();
        swapped.swap(i, j);

        let tolerance = self.config.max_bpm_delta;
        for &k in &edges {
            let old = (tracks[k].record.bpm - tracks[k - 1].record.bpm).abs();
            let new = (tracks[swapped[k]].record.bpm - tracks[swapped[k - 1]].record.bpm).abs();
            if new > tolerance.max(old) {
                return None;
            }
        }

        let before = self.edge_total(tracks, &identity, &edges);
        let after = self.edge_total(tracks, &swapped, &edges);
        let gain = after - before;
        (gain > self.config.optimizer.min_gain).then_some(gain)
    }

    /// Sum of the scores into each position in `edges` under `order`
    fn edge_total(&self, tracks: &[SequencedTrack], order: &[usize], edges: &[usize]) -> f64 {
        let Some(&last) = edges.last() else {
            return 0.0;
        };
        let mut model = EnergyPhaseModel::new(self.config.bands, order.len());
        let mut total = 0.0;
        for (position, &index) in order.iter().enumerate().take(last + 1) {
            let target = model.target(position);
            if edges.contains(&position) {
                let prev = &tracks[order[position - 1]];
                total += self.scorer.score(prev, &tracks[index].record, &target).total;
            }
            model.record(target.phase, tracks[index].record.energy);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;
    use crate::scoring::test_support::track;
    use crate::sequence::BpmRange;

    fn set_of(specs: &[(&str, f64, &str, u8)]) -> Set {
        let tracks = specs
            .iter()
            .map(|&(name, bpm, key, energy)| SequencedTrack::seed(track(name, bpm, key, energy), Phase::WarmUp))
            .collect();
        Set::new("test", BpmRange { min: 120.0, max: 130.0 }, tracks, false)
    }

    fn ordered_energy_set() -> Set {
        let specs: Vec<(String, f64, u8)> = (0..16)
            .map(|i| (format!("t{:02}", i), 120.0 + i as f64 * 0.5, 40 + i as u8 * 3))
            .collect();
        let specs: Vec<(&str, f64, &str, u8)> = specs
            .iter()
            .map(|(name, bpm, energy)| (name.as_str(), *bpm, "8A", *energy))
            .collect();
        set_of(&specs)
    }

    #[test]
    fn test_short_sets_are_left_alone() {
        let config = SequencingConfig::default();
        let scorer = Scorer::default();
        let mut set = set_of(&[
            ("a", 124.0, "8A", 60),
            ("b", 124.0, "3B", 60),
            ("c", 124.0, "8A", 60),
            ("d", 124.0, "8A", 60),
        ]);
        let before = set.clone();
        assert_eq!(GlobalOptimizer::new(&scorer, &config).optimize(&mut set), 0);
        assert_eq!(set, before);
    }

    fn key_clashes(set: &Set) -> usize {
        set.tracks
            .windows(2)
            .filter(|w| match (w[0].record.key, w[1].record.key) {
                (Some(a), Some(b)) => crate::key::distance(a, b) >= 5,
                _ => false,
            })
            .count()
    }

    #[test]
    fn test_swap_repairs_key_clash() {
        let config = SequencingConfig::default();
        let scorer = Scorer::default();
        // one 2A track stranded among 8A tracks, and one 8A among the 2A
        let keys = ["8A", "8A", "8A", "8A", "8A", "2A", "8A", "2A", "2A", "2A", "2A", "2A"];
        let names: Vec<String> = (0..keys.len()).map(|i| format!("t{:02}", i)).collect();
        let specs: Vec<(&str, f64, &str, u8)> = names
            .iter()
            .zip(keys)
            .map(|(name, key)| (name.as_str(), 124.0, key, 65))
            .collect();
        let mut set = set_of(&specs);
        assert_eq!(key_clashes(&set), 3);

        let swaps = GlobalOptimizer::new(&scorer, &config).optimize(&mut set);
        assert_eq!(swaps, 1);
        assert_eq!(key_clashes(&set), 1);
        assert_eq!(set.len(), 12);
    }

    #[test]
    fn test_swap_never_exceeds_bpm_tolerance() {
        let config = SequencingConfig::default();
        let scorer = Scorer::default();
        let mut set = ordered_energy_set();
        set.tracks[8].record.bpm = 150.0;
        let before: Vec<f64> = set.tracks.windows(2).map(|w| (w[1].record.bpm - w[0].record.bpm).abs()).collect();
        GlobalOptimizer::new(&scorer, &config).optimize(&mut set);
        let worst_before = before.iter().copied().fold(0.0, f64::max);
        for pair in set.tracks.windows(2) {
            assert!((pair[1].record.bpm - pair[0].record.bpm).abs() <= worst_before.max(config.max_bpm_delta));
        }
    }

    #[test]
    fn test_disabled_optimizer_does_nothing() {
        let config = SequencingConfig {
            optimizer: OptimizerConfig {
                enabled: false,
                ..OptimizerConfig::default()
            },
            ..SequencingConfig::default()
        };
        let scorer = Scorer::default();
        let mut set = ordered_energy_set();
        set.tracks.swap(2, 10);
        let before = set.clone();
        assert_eq!(GlobalOptimizer::new(&scorer, &config).optimize(&mut set), 0);
        assert_eq!(set, before);
    }

    #[test]
    fn test_parked_tail_is_untouched() {
        let config = SequencingConfig::default();
        let scorer = Scorer::default();
        let mut set = ordered_energy_set();
        set.tracks.swap(2, 10);
        for t in &mut set.tracks[12..] {
            t.parked = true;
        }
        let tail: Vec<String> = set.tracks[12..].iter().map(|t| t.record.fingerprint.clone()).collect();
        GlobalOptimizer::new(&scorer, &config).optimize(&mut set);
        let after: Vec<String> = set.tracks[12..].iter().map(|t| t.record.fingerprint.clone()).collect();
        assert_eq!(tail, after);
    }
}
