//! Cutting sequenced runs into sets
//!
//! A run is cut once both the target duration and the minimum song count
//! are met, or when it hits the maximum song count. Each cut is then moved
//! a few positions toward the weakest transition nearby so sets break
//! where the mix was already loosest.

use super::{track_seconds, SequencedTrack};
use serde::{Deserialize, Serialize};

/// Set size and bucketing parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Target set length in minutes
    pub target_minutes: f64,
    pub min_songs: usize,
    pub max_songs: usize,
    /// How far a cut may move toward a weaker transition
    pub cut_window: usize,
    /// Widest BPM range of one bucket
    pub max_bpm_span: f64,
    /// Buckets smaller than this are merged into a neighbor
    pub min_bucket_size: usize,
    /// Largest BPM gap an undersized bucket bridges to its predecessor
    pub bucket_merge_gap: f64,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            target_minutes: 90.0,
            min_songs: 25,
            max_songs: 40,
            cut_window: 3,
            max_bpm_span: 25.0,
            min_bucket_size: 5,
            bucket_merge_gap: 15.0,
        }
    }
}

impl PartitionConfig {
    pub fn target_secs(&self) -> f64 {
        self.target_minutes * 60.0
    }

    /// Apply a named set shape, keeping the bucketing parameters
    pub fn with_preset(mut self, preset: Preset) -> Self {
        let (minutes, min, max) = preset.shape();
        self.target_minutes = minutes;
        self.min_songs = min;
        self.max_songs = max;
        self
    }
}

/// Named set shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Club,
    Radio,
    WarmUp,
    Extended,
}

impl Preset {
    /// (target minutes, min songs, max songs)
    pub fn shape(self) -> (f64, usize, usize) {
        match self {
            Preset::Club => (60.0, 15, 45),
            Preset::Radio => (45.0, 10, 30),
            Preset::WarmUp => (90.0, 20, 50),
            Preset::Extended => (120.0, 30, 80),
        }
    }
}

/// Segment lengths the builder should aim for when sequencing `n` tracks
///
/// Each segment gets its own phase arc, so a long run ramps and cools
/// once per future set instead of once overall.
pub fn plan_segments(n: usize, mean_duration: f64, config: &PartitionConfig) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    let max = config.max_songs.max(1);
    let min = config.min_songs.clamp(1, max);
    let by_duration = if mean_duration > 0.0 {
        (config.target_secs() / mean_duration).ceil() as usize
    } else {
        min
    };
    let per_set = by_duration.clamp(min, max);

    let mut plan = Vec::new();
    let mut remaining = n;
    while remaining > 0 {
        if remaining <= per_set || remaining - per_set < min {
            // the tail is too short for its own set
            if remaining > max {
                let first = remaining.div_ceil(2);
                plan.push(first);
                plan.push(remaining - first);
            } else {
                plan.push(remaining);
            }
            break;
        }
        plan.push(per_set);
        remaining -= per_set;
    }
    plan
}

/// Split a sequenced run into sets
pub fn partition(run: Vec<SequencedTrack>, config: &PartitionConfig) -> Vec<Vec<SequencedTrack>> {
    let cuts = cut_points(&run, config);
    let mut sets = Vec::with_capacity(cuts.len() + 1);
    let mut rest = run;
    for &cut in cuts.iter().rev() {
        sets.push(rest.split_off(cut));
    }
    if !rest.is_empty() {
        sets.push(rest);
    }
    sets.reverse();
    sets
}

/// Indices where a new set starts
pub(crate) fn cut_points(run: &[SequencedTrack], config: &PartitionConfig) -> Vec<usize> {
    let n = run.len();
    let max = config.max_songs.max(1);
    let min = config.min_songs.clamp(1, max);
    let target = config.target_secs();

    let mut cuts = Vec::new();
    let mut start = 0;
    while start < n {
        let Some(natural) = natural_cut(run, start, min, max, target) else {
            break;
        };
        let count = natural - start;
        let cut = if n - natural < min && count < max {
            // cutting here would strand a runt
            if n - start <= max {
                break;
            }
            let halfway = start + (n - start).div_ceil(2);
            weakest_near(run, start, halfway, 1, max, config.cut_window)
        } else {
            weakest_near(run, start, natural, min, max, config.cut_window)
        };
        cuts.push(cut);
        start = cut;
    }
    cuts
}

fn natural_cut(
    run: &[SequencedTrack],
    start: usize,
    min: usize,
    max: usize,
    target: f64,
) -> Option<usize> {
    let mut duration = 0.0;
    for (offset, track) in run[start..].iter().enumerate() {
        duration += track_seconds(&track.record);
        let count = offset + 1;
        if (duration >= target && count >= min) || count >= max {
            let cut = start + count;
            return (cut < run.len()).then_some(cut);
        }
    }
    None
}

/// Shift a cut to the weakest incoming transition within `window`
fn weakest_near(
    run: &[SequencedTrack],
    start: usize,
    cut: usize,
    min: usize,
    max: usize,
    window: usize,
) -> usize {
    let n = run.len();
    let mut lo = cut.saturating_sub(window).max(start + min);
    let mut hi = (cut + window).min(start + max).min(n - 1);
    if n - cut >= min {
        hi = hi.min(n - min);
    }
    if lo > hi {
        return cut;
    }
    lo = lo.max(start + 1);

    (lo..=hi)
        .min_by(|&a, &b| {
            let score = |i: usize| run[i].transition_score_in.unwrap_or(f64::INFINITY);
            score(a)
                .total_cmp(&score(b))
                .then_with(|| a.abs_diff(cut).cmp(&b.abs_diff(cut)))
        })
        .unwrap_or(cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::test_support::track;

    fn run_of(n: usize, secs: f64) -> Vec<SequencedTrack> {
        (0..n)
            .map(|i| {
                let mut record = track(&format!("t{:03}", i), 124.0, "8A", 70);
                record.duration_secs = secs;
                let mut seq = SequencedTrack::seed(record, crate::phase::Phase::Peak);
                if i > 0 {
                    seq.transition_score_in = Some(200.0);
                }
                seq
            })
            .collect()
    }

    #[test]
    fn test_forty_tracks_make_one_default_set() {
        let run = run_of(40, 300.0);
        let sets = partition(run, &PartitionConfig::default());
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].len(), 40);
    }

    #[test]
    fn test_cut_respects_bounds() {
        let config = PartitionConfig::default();
        let sets = partition(run_of(100, 300.0), &config);
        assert!(sets.len() >= 2);
        for set in &sets {
            assert!(set.len() >= config.min_songs, "set of {}", set.len());
            assert!(set.len() <= config.max_songs, "set of {}", set.len());
        }
        assert_eq!(sets.iter().map(Vec::len).sum::<usize>(), 100);
    }

    #[test]
    fn test_cut_moves_to_weak_transition() {
        let config = PartitionConfig::default();
        let mut run = run_of(60, 300.0);
        // the natural cut is at 25 (duration met once 25 songs are in)
        run[27].transition_score_in = Some(-40.0);
        let cuts = cut_points(&run, &config);
        assert_eq!(cuts, vec![27]);
    }

    #[test]
    fn test_max_songs_forces_cut() {
        let config = PartitionConfig {
            target_minutes: 600.0,
            ..PartitionConfig::default()
        };
        let sets = partition(run_of(90, 60.0), &config);
        assert!(sets.iter().all(|s| s.len() <= config.max_songs));
        assert_eq!(sets.iter().map(Vec::len).sum::<usize>(), 90);
    }

    #[test]
    fn test_plan_segments_cover_all_tracks() {
        let config = PartitionConfig::default();
        for n in [1usize, 10, 24, 25, 40, 41, 64, 65, 100, 333] {
            let plan = plan_segments(n, 300.0, &config);
            assert_eq!(plan.iter().sum::<usize>(), n, "n = {}", n);
            assert!(plan.iter().all(|&len| len <= config.max_songs), "n = {}: {:?}", n, plan);
        }
        assert_eq!(plan_segments(40, 300.0, &config), vec![40]);
        assert!(plan_segments(0, 300.0, &config).is_empty());
    }

    #[test]
    fn test_presets() {
        let club = PartitionConfig::default().with_preset(Preset::Club);
        assert_eq!((club.target_minutes, club.min_songs, club.max_songs), (60.0, 15, 45));
        assert_eq!(club.max_bpm_span, 25.0);
    }
}
