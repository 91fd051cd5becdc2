//! Greedy sequence builder
//!
//! Starting from a seed near the pool's median tempo and energy, the
//! builder repeatedly scores the tracks closest in BPM and appends the
//! best one. When nothing clears the quality floor, the mode decides:
//! boutique runs either take a continuity-preserving weak link or close,
//! live runs force the link or park the hopeless track at the end.

use super::partition::plan_segments;
use super::{mean_duration, SequencedTrack, Unplaceable, UnplaceableReason};
use crate::config::{SequencingConfig, SequencingMode};
use crate::error::SequencingDeadEnd;
use crate::key;
use crate::phase::{EnergyPhaseModel, PhaseBands, PhaseTarget};
use crate::scoring::{key_compatibility, ScoredTransition, Scorer};
use crate::types::FeatureRecord;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// One contiguous chain of tracks
#[derive(Debug, Clone)]
pub struct Run {
    pub tracks: Vec<SequencedTrack>,
    /// Dead end that stopped a boutique run before the pool ran out
    pub closed_by: Option<SequencingDeadEnd>,
}

impl Run {
    pub fn closed_early(&self) -> bool {
        self.closed_by.is_some()
    }
}

/// Everything the builder did with its pool
#[derive(Debug, Clone, Default)]
pub struct BuildOutcome {
    pub runs: Vec<Run>,
    /// Live-mode tracks that fit nowhere, in parking order
    pub parked: Vec<SequencedTrack>,
    pub unplaceable: Vec<Unplaceable>,
    pub dead_ends: Vec<SequencingDeadEnd>,
}

impl BuildOutcome {
    pub fn placed_count(&self) -> usize {
        self.runs.iter().map(|r| r.tracks.len()).sum::<usize>() + self.parked.len()
    }
}

/// Split off records that cannot be sequenced at all
///
/// An unknown (zero) duration is allowed; only a known duration outside
/// the configured range is rejected.
pub fn screen(
    records: Vec<FeatureRecord>,
    config: &SequencingConfig,
) -> (Vec<FeatureRecord>, Vec<Unplaceable>) {
    let mut usable = Vec::with_capacity(records.len());
    let mut rejected = Vec::new();
    for record in records {
        let secs = record.duration_secs;
        if !record.is_usable() {
            debug!("Skipping {}: unusable tempo {}", record.display_name(), record.bpm);
            rejected.push(Unplaceable {
                record,
                reason: UnplaceableReason::UnusableTempo,
            });
        } else if secs > 0.0 && (secs < config.min_track_secs || secs > config.max_track_secs) {
            debug!("Skipping {}: duration {:.0}s", record.display_name(), secs);
            rejected.push(Unplaceable {
                record,
                reason: UnplaceableReason::AbnormalDuration { secs },
            });
        } else {
            usable.push(record);
        }
    }
    (usable, rejected)
}

/// How many BPM neighbors get scored at each step
fn candidate_count(remaining: usize) -> usize {
    match remaining {
        n if n > 200 => 80,
        n if n > 100 => 60,
        n if n > 50 => 50,
        n => (n / 2).max(8).min(30).min(n),
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Index of the track closest to the pool's median energy and tempo
fn select_seed(pool: &[FeatureRecord]) -> usize {
    let energy = median(pool.iter().map(|r| r.energy as f64).collect());
    let bpm = median(pool.iter().map(|r| r.bpm).collect());
    let distance = |r: &FeatureRecord| (r.energy as f64 - energy).abs() + (r.bpm - bpm).abs();

    pool.iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            distance(a)
                .total_cmp(&distance(b))
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        })
        .map(|(index, _)| index)
        .unwrap_or(0)
}

fn preserves_continuity(prev: &FeatureRecord, next: &FeatureRecord, max_bpm_delta: f64) -> bool {
    let keys_close = match (prev.key, next.key) {
        (Some(a), Some(b)) => key::distance(a, b) <= 2,
        _ => true,
    };
    (prev.bpm - next.bpm).abs() <= max_bpm_delta
        && prev.time_signature == next.time_signature
        && keys_close
}

struct Candidate {
    /// Index into the pool
    index: usize,
    scored: ScoredTransition,
}

/// Tracks placed so far plus the phase state of the current segment
struct RunState {
    bands: PhaseBands,
    tracks: Vec<SequencedTrack>,
    segment_start: usize,
    segment_len: usize,
    model: EnergyPhaseModel,
}

impl RunState {
    fn new(bands: PhaseBands, segment_len: usize) -> Self {
        Self {
            bands,
            tracks: Vec::new(),
            segment_start: 0,
            segment_len: segment_len.max(1),
            model: EnergyPhaseModel::new(bands, segment_len),
        }
    }

    fn segment_full(&self) -> bool {
        self.tracks.len() - self.segment_start >= self.segment_len
    }

    fn start_segment(&mut self, len: usize) {
        self.segment_start = self.tracks.len();
        self.segment_len = len.max(1);
        self.model = EnergyPhaseModel::new(self.bands, self.segment_len);
    }

    fn target(&self) -> PhaseTarget {
        self.model.target(self.tracks.len() - self.segment_start)
    }

    fn last(&self) -> &SequencedTrack {
        &self.tracks[self.tracks.len() - 1]
    }

    fn push_seed(&mut self, record: FeatureRecord) {
        let phase = self.target().phase;
        self.model.record(phase, record.energy);
        self.tracks.push(SequencedTrack::seed(record, phase));
    }

    fn push(&mut self, record: FeatureRecord, scored: ScoredTransition, forced: bool, target: &PhaseTarget) {
        self.model.record(target.phase, record.energy);
        self.tracks
            .push(SequencedTrack::placed(record, target.phase, scored, forced));
    }

    /// Insert inside the current segment and re-score from there on
    fn insert(&mut self, position: usize, record: FeatureRecord, scorer: &Scorer) {
        let phase = self.tracks[position].assigned_phase;
        self.tracks.insert(position, SequencedTrack::seed(record, phase));

        let mut model = EnergyPhaseModel::new(self.bands, self.segment_len);
        for index in self.segment_start..self.tracks.len() {
            let target = model.target(index - self.segment_start);
            if index >= position {
                let scored = scorer.score(&self.tracks[index - 1], &self.tracks[index].record, &target);
                let track = &mut self.tracks[index];
                track.assigned_phase = target.phase;
                track.transition_score_in = Some(scored.total);
                track.score_trace = scored.trace;
            }
            let track = &self.tracks[index];
            model.record(track.assigned_phase, track.record.energy);
        }
        self.model = model;
    }
}

/// Greedy builder over one bucket's pool
pub struct SequenceBuilder<'a> {
    scorer: &'a Scorer,
    config: &'a SequencingConfig,
}

impl<'a> SequenceBuilder<'a> {
    pub fn new(scorer: &'a Scorer, config: &'a SequencingConfig) -> Self {
        Self { scorer, config }
    }

    /// Sequence `pool`, aiming the phase arcs at the segment lengths in `plan`
    ///
    /// Every input record ends up in a run, the parked tail, or
    /// `unplaceable` with a reason.
    pub fn build(&self, pool: Vec<FeatureRecord>, plan: &[usize]) -> BuildOutcome {
        let (mut pool, unplaceable) = screen(pool, self.config);
        pool.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

        let mut outcome = BuildOutcome {
            unplaceable,
            ..BuildOutcome::default()
        };
        let mut plan = plan.to_vec();
        let min_run = self.config.min_run_tracks.max(1);
        let mut closure: Option<SequencingDeadEnd> = None;

        while !pool.is_empty() {
            if let Some(dead_end) = closure.take() {
                if pool.len() < min_run {
                    debug!(
                        "{} track(s) left after a closed run, too few for a new one",
                        pool.len()
                    );
                    outcome
                        .unplaceable
                        .extend(pool.drain(..).map(|record| Unplaceable {
                            record,
                            reason: UnplaceableReason::DeadEnd {
                                dead_end: dead_end.clone(),
                            },
                        }));
                    break;
                }
                plan = plan_segments(pool.len(), mean_duration(&pool), &self.config.partition);
            }

            let run = self.build_run(&mut pool, &plan, &mut outcome);
            closure = run.closed_by.clone();
            match closure.clone() {
                // a run cut off before it reached set length is not a set
                Some(dead_end) if run.tracks.len() < min_run => {
                    debug!(
                        "Dropping a run of {} track(s) that closed at a dead end",
                        run.tracks.len()
                    );
                    outcome
                        .unplaceable
                        .extend(run.tracks.into_iter().map(|track| Unplaceable {
                            record: track.record,
                            reason: UnplaceableReason::DeadEnd {
                                dead_end: dead_end.clone(),
                            },
                        }));
                }
                _ => {
                    debug!(
                        "Run of {} track(s){}",
                        run.tracks.len(),
                        if run.closed_early() { ", closed early" } else { "" }
                    );
                    outcome.runs.push(run);
                }
            }
        }
        outcome
    }

    fn build_run(
        &self,
        pool: &mut Vec<FeatureRecord>,
        plan: &[usize],
        outcome: &mut BuildOutcome,
    ) -> Run {
        let floor = self.config.quality_floor;
        let mut segments: VecDeque<usize> = plan.iter().copied().filter(|&n| n > 0).collect();

        let seed = pool.remove(select_seed(pool));
        let first_len = segments.pop_front().unwrap_or(pool.len() + 1);
        let mut state = RunState::new(self.config.bands, first_len);
        debug!("Seed: {} ({:.1} BPM, energy {})", seed.display_name(), seed.bpm, seed.energy);
        state.push_seed(seed);

        let mut closed_by = None;
        while !pool.is_empty() {
            if state.segment_full() {
                let len = segments.pop_front().unwrap_or(pool.len());
                state.start_segment(len);
            }
            let target = state.target();
            let candidates = self.score_candidates(state.last(), pool, &target);
            let Some(best) = candidates.first() else {
                break;
            };

            if best.scored.total >= floor {
                if self.try_backtrack(&mut state, pool, &candidates) {
                    continue;
                }
                let best = &candidates[0];
                let record = pool.remove(best.index);
                state.push(record, best.scored.clone(), false, &target);
                continue;
            }

            let dead_end = SequencingDeadEnd {
                current: state.last().record.display_name(),
                best_candidate: pool[best.index].display_name(),
                best_score: best.scored.total,
                floor,
            };
            warn!("{}", dead_end);
            outcome.dead_ends.push(dead_end.clone());

            match self.config.mode {
                SequencingMode::Boutique => {
                    if preserves_continuity(&state.last().record, &pool[best.index], self.config.max_bpm_delta) {
                        let record = pool.remove(best.index);
                        state.push(record, best.scored.clone(), true, &target);
                    } else {
                        closed_by = Some(dead_end);
                        break;
                    }
                }
                SequencingMode::Live => {
                    if best.scored.total >= self.config.park_threshold {
                        let record = pool.remove(best.index);
                        state.push(record, best.scored.clone(), true, &target);
                    } else if let Some(worst) = candidates.last() {
                        let record = pool.remove(worst.index);
                        debug!("Parking {} ({:.1})", record.display_name(), worst.scored.total);
                        outcome
                            .parked
                            .push(SequencedTrack::parked(record, worst.scored.clone()));
                    }
                }
            }
        }

        Run {
            tracks: state.tracks,
            closed_by,
        }
    }

    /// Score the BPM neighbors of `current`, best first
    fn score_candidates(
        &self,
        current: &SequencedTrack,
        pool: &[FeatureRecord],
        target: &PhaseTarget,
    ) -> Vec<Candidate> {
        let bpm = current.record.bpm;
        let mut nearest: Vec<usize> = (0..pool.len()).collect();
        nearest.sort_by(|&a, &b| {
            (pool[a].bpm - bpm)
                .abs()
                .total_cmp(&(pool[b].bpm - bpm).abs())
                .then_with(|| pool[a].fingerprint.cmp(&pool[b].fingerprint))
        });
        nearest.truncate(candidate_count(pool.len()));

        let mut candidates: Vec<Candidate> = nearest
            .into_iter()
            .map(|index| Candidate {
                index,
                scored: self.scorer.score(current, &pool[index], target),
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.scored
                .total
                .total_cmp(&a.scored.total)
                .then_with(|| pool[a.index].fingerprint.cmp(&pool[b.index].fingerprint))
        });
        candidates
    }

    /// Slot a better-keyed alternative one or two positions back
    ///
    /// Only tried when the best candidate is a weak harmonic match. Returns
    /// true when an alternative was inserted; the best candidate then stays
    /// in the pool.
    fn try_backtrack(
        &self,
        state: &mut RunState,
        pool: &mut Vec<FeatureRecord>,
        candidates: &[Candidate],
    ) -> bool {
        let Some(chosen) = candidates.first() else {
            return false;
        };
        let chosen_compat = key_compatibility(state.last().record.key, pool[chosen.index].key);
        if chosen_compat >= self.config.backtrack_key_threshold {
            return false;
        }

        let len = state.tracks.len();
        let mut best: Option<(f64, usize, usize)> = None;
        for candidate in &candidates[1..] {
            if candidate.scored.total < self.config.quality_floor {
                continue;
            }
            let alt = &pool[candidate.index];
            for back in 1..=2 {
                let Some(position) = len.checked_sub(back) else {
                    continue;
                };
                if position <= state.segment_start {
                    continue;
                }
                let before = &state.tracks[position - 1].record;
                let after = &state.tracks[position].record;

                let tolerance = self.config.max_bpm_delta.max((before.bpm - after.bpm).abs());
                if (alt.bpm - before.bpm).abs() > tolerance || (alt.bpm - after.bpm).abs() > tolerance {
                    continue;
                }
                let gain = key_compatibility(before.key, alt.key)
                    + key_compatibility(alt.key, after.key)
                    - key_compatibility(before.key, after.key)
                    - chosen_compat;
                if gain >= self.config.backtrack_min_gain && best.map_or(true, |(g, ..)| gain > g) {
                    best = Some((gain, position, candidate.index));
                }
            }
        }

        let Some((gain, position, index)) = best else {
            return false;
        };
        let record = pool.remove(index);
        debug!(
            "Backtrack: inserting {} at {} (key gain {:.0})",
            record.display_name(),
            position,
            gain
        );
        state.insert(position, record, self.scorer);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::phase::Phase;
    use crate::scoring::test_support::track;

    fn build(records: Vec<FeatureRecord>, config: &SequencingConfig) -> BuildOutcome {
        let scorer = Scorer::new(config.scorer.clone());
        let plan = [records.len()];
        SequenceBuilder::new(&scorer, config).build(records, &plan)
    }

    fn tempo_cliff() -> Vec<FeatureRecord> {
        vec![
            track("a", 120.0, "8A", 70),
            track("b", 121.0, "8A", 70),
            track("c", 122.0, "8A", 70),
            track("d", 160.0, "8A", 70),
        ]
    }

    #[test]
    fn test_candidate_count_tiers() {
        assert_eq!(candidate_count(500), 80);
        assert_eq!(candidate_count(150), 60);
        assert_eq!(candidate_count(60), 50);
        assert_eq!(candidate_count(40), 20);
        assert_eq!(candidate_count(10), 8);
        assert_eq!(candidate_count(5), 5);
        assert_eq!(candidate_count(50), 25);
    }

    #[test]
    fn test_seed_is_closest_to_median() {
        let pool = vec![
            track("low", 110.0, "8A", 40),
            track("mid", 124.0, "8A", 65),
            track("high", 135.0, "8A", 90),
        ];
        assert_eq!(pool[select_seed(&pool)].fingerprint, "mid");
    }

    #[test]
    fn test_boutique_closes_run_at_tempo_cliff() {
        let config = SequencingConfig {
            mode: SequencingMode::Boutique,
            ..SequencingConfig::default()
        };
        let outcome = build(tempo_cliff(), &config);

        assert_eq!(outcome.runs.len(), 1);
        assert!(outcome.runs[0].closed_early());
        assert_eq!(outcome.runs[0].tracks.len(), 3);
        assert!(outcome.parked.is_empty());
        assert_eq!(outcome.unplaceable.len(), 1);
        assert_eq!(outcome.unplaceable[0].record.fingerprint, "d");
        assert!(matches!(
            outcome.unplaceable[0].reason,
            UnplaceableReason::DeadEnd { .. }
        ));
        assert_eq!(outcome.dead_ends.len(), 1);
        assert_eq!(outcome.dead_ends[0].best_candidate, "d");
    }

    #[test]
    fn test_live_parks_unreachable_track() {
        let outcome = build(tempo_cliff(), &SequencingConfig::default());

        assert_eq!(outcome.runs.len(), 1);
        assert!(!outcome.runs[0].closed_early());
        assert_eq!(outcome.runs[0].tracks.len(), 3);
        assert_eq!(outcome.parked.len(), 1);
        assert_eq!(outcome.parked[0].record.fingerprint, "d");
        assert!(outcome.parked[0].parked);
        assert_eq!(outcome.parked[0].assigned_phase, Phase::CoolDown);
        assert!(outcome.unplaceable.is_empty());
    }

    #[test]
    fn test_live_forces_mediocre_link() {
        let config = SequencingConfig {
            quality_floor: 1000.0,
            ..SequencingConfig::default()
        };
        let outcome = build(tempo_cliff()[..3].to_vec(), &config);
        assert_eq!(outcome.runs[0].tracks.len(), 3);
        assert!(outcome.runs[0].tracks[1..].iter().all(|t| t.forced));
        assert_eq!(outcome.dead_ends.len(), 2);
    }

    #[test]
    fn test_boutique_accepts_continuous_weak_link() {
        let config = SequencingConfig {
            mode: SequencingMode::Boutique,
            quality_floor: 1000.0,
            ..SequencingConfig::default()
        };
        let outcome = build(tempo_cliff()[..3].to_vec(), &config);
        assert_eq!(outcome.runs.len(), 1);
        assert!(!outcome.runs[0].closed_early());
        assert_eq!(outcome.runs[0].tracks.len(), 3);
    }

    #[test]
    fn test_boutique_starts_new_run_when_enough_remain() {
        let config = SequencingConfig {
            mode: SequencingMode::Boutique,
            ..SequencingConfig::default()
        };
        let mut records = tempo_cliff();
        records.push(track("e", 161.0, "8A", 70));
        records.push(track("f", 162.0, "8A", 70));
        let outcome = build(records, &config);

        assert_eq!(outcome.runs.len(), 2);
        assert!(outcome.runs[0].closed_early());
        assert_eq!(outcome.placed_count(), 6);
        assert!(outcome.unplaceable.is_empty());
    }

    #[test]
    fn test_every_record_is_accounted_for() {
        let mut records: Vec<FeatureRecord> = (0..60)
            .map(|i| {
                let keys = ["1A", "5B", "8A", "11B", "3A"];
                track(
                    &format!("t{:02}", i),
                    90.0 + (i * 7 % 80) as f64,
                    keys[i % keys.len()],
                    (20 + i * 13 % 80) as u8,
                )
            })
            .collect();
        records[0].bpm = f64::NAN;
        records[1].duration_secs = 2.0;

        for mode in [SequencingMode::Live, SequencingMode::Boutique] {
            let config = SequencingConfig {
                mode,
                ..SequencingConfig::default()
            };
            let outcome = build(records.clone(), &config);
            assert_eq!(
                outcome.placed_count() + outcome.unplaceable.len(),
                records.len(),
                "{:?}",
                mode
            );
        }
    }

    #[test]
    fn test_boutique_drops_runs_shorter_than_a_set() {
        let config = SequencingConfig {
            mode: SequencingMode::Boutique,
            ..SequencingConfig::default()
        };
        // the median seed sits alone between two distant tempo groups
        let records = vec![
            track("low1", 100.0, "8A", 70),
            track("low2", 101.0, "8A", 70),
            track("low3", 102.0, "8A", 70),
            track("lonely", 141.0, "3B", 70),
            track("high1", 180.0, "8A", 70),
            track("high2", 181.0, "8A", 70),
            track("high3", 182.0, "8A", 70),
        ];
        let outcome = build(records, &config);

        assert_eq!(outcome.runs.len(), 2);
        for run in &outcome.runs {
            assert!(run.tracks.len() >= config.min_run_tracks, "run of {}", run.tracks.len());
        }
        assert_eq!(outcome.unplaceable.len(), 1);
        assert_eq!(outcome.unplaceable[0].record.fingerprint, "lonely");
        assert!(matches!(
            outcome.unplaceable[0].reason,
            UnplaceableReason::DeadEnd { .. }
        ));
        assert_eq!(outcome.placed_count(), 6);
    }

    #[test]
    fn test_backtrack_inserts_better_keyed_track() {
        let config = SequencingConfig::default();
        let scorer = Scorer::default();
        let mut state = RunState::new(config.bands, 10);
        state.push_seed(track("a", 124.0, "8A", 60));
        let target = state.target();
        let b = track("b", 124.0, "10A", 62);
        let scored = scorer.score_records(&state.last().record, &b, &target);
        state.push(b, scored, false, &target);

        // 10A -> 3B is a poor match; 9A fits between 8A and 10A
        let mut pool = vec![track("bad", 124.0, "3B", 64), track("bridge", 124.0, "9A", 61)];
        let builder = SequenceBuilder::new(&scorer, &config);
        let target = state.target();
        let mut candidates = builder.score_candidates(state.last(), &pool, &target);
        candidates.sort_by_key(|c| if pool[c.index].fingerprint == "bad" { 0 } else { 1 });

        assert!(builder.try_backtrack(&mut state, &mut pool, &candidates));
        let order: Vec<&str> = state.tracks.iter().map(|t| t.record.fingerprint.as_str()).collect();
        assert_eq!(order, vec!["a", "bridge", "b"]);
        assert_eq!(pool.len(), 1);
        assert!(state.tracks[1..].iter().all(|t| t.transition_score_in.is_some()));
    }
}
