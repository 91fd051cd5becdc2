//! Set sequencing
//!
//! Turns a pool of feature records into ordered DJ sets:
//! 1. Screen out records that cannot be sequenced
//! 2. Bucket by BPM
//! 3. Sequence each bucket greedily (in parallel, one task per bucket)
//! 4. Cut each run into sets and repair them with bounded local swaps
//! 5. Relabel phases, re-score every transition and compute set metrics

pub mod bucket;
pub mod builder;
pub mod optimizer;
pub mod partition;

pub use bucket::{bucket_by_bpm, BpmBucket, BpmRange};
pub use builder::{screen, BuildOutcome, Run, SequenceBuilder};
pub use optimizer::{GlobalOptimizer, OptimizerConfig};
pub use partition::{partition, plan_segments, PartitionConfig, Preset};

use crate::config::SequencingConfig;
use crate::error::SequencingDeadEnd;
use crate::phase::{EnergyPhaseModel, Phase};
use crate::scoring::{ScoreTrace, ScoredTransition, Scorer, TransitionRisk};
use crate::types::FeatureRecord;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Assumed length of a track whose duration is unknown
pub const DEFAULT_TRACK_SECS: f64 = 180.0;

pub(crate) fn track_seconds(record: &FeatureRecord) -> f64 {
    if record.duration_secs.is_finite() && record.duration_secs > 0.0 {
        record.duration_secs
    } else {
        DEFAULT_TRACK_SECS
    }
}

pub(crate) fn mean_duration(records: &[FeatureRecord]) -> f64 {
    if records.is_empty() {
        return DEFAULT_TRACK_SECS;
    }
    records.iter().map(track_seconds).sum::<f64>() / records.len() as f64
}

/// A track placed in a sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedTrack {
    pub record: FeatureRecord,
    pub assigned_phase: Phase,
    /// Score of the transition into this track; `None` for a set opener
    pub transition_score_in: Option<f64>,
    pub score_trace: ScoreTrace,
    pub used: bool,
    /// Live-mode tail of tracks that fit nowhere
    pub parked: bool,
    /// Accepted below the quality floor
    pub forced: bool,
}

impl SequencedTrack {
    /// First track of a run
    pub fn seed(record: FeatureRecord, phase: Phase) -> Self {
        Self {
            record,
            assigned_phase: phase,
            transition_score_in: None,
            score_trace: ScoreTrace::default(),
            used: true,
            parked: false,
            forced: false,
        }
    }

    pub fn placed(record: FeatureRecord, phase: Phase, scored: ScoredTransition, forced: bool) -> Self {
        Self {
            record,
            assigned_phase: phase,
            transition_score_in: Some(scored.total),
            score_trace: scored.trace,
            used: true,
            parked: false,
            forced,
        }
    }

    pub fn parked(record: FeatureRecord, scored: ScoredTransition) -> Self {
        Self {
            record,
            assigned_phase: Phase::CoolDown,
            transition_score_in: Some(scored.total),
            score_trace: scored.trace,
            used: true,
            parked: true,
            forced: true,
        }
    }
}

/// Why a record is missing from every set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnplaceableReason {
    /// BPM is zero, negative or not a number
    UnusableTempo,
    /// Duration outside the accepted range
    AbnormalDuration { secs: f64 },
    /// Left over after a boutique run closed early
    DeadEnd { dead_end: SequencingDeadEnd },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unplaceable {
    pub record: FeatureRecord,
    #[serde(flatten)]
    pub reason: UnplaceableReason,
}

/// Risks flagged on the transition into `position`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskNote {
    pub position: usize,
    pub risks: Vec<TransitionRisk>,
}

/// Aggregate view of a set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetMetrics {
    pub duration_secs: f64,
    pub bpm_curve: Vec<f64>,
    pub energy_curve: Vec<u8>,
    /// Transitions below the quality floor or forced
    pub conflict_count: usize,
    pub mean_transition_score: f64,
    pub parked_count: usize,
    pub risks: Vec<RiskNote>,
    #[serde(default)]
    pub arc: EnergyCurveReport,
}

/// An ordered, playable set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Set {
    pub name: String,
    pub bucket: BpmRange,
    pub tracks: Vec<SequencedTrack>,
    /// The run behind this set ended on a dead end
    pub closed_early: bool,
    pub metrics: SetMetrics,
}

impl Set {
    pub fn new(
        name: impl Into<String>,
        bucket: BpmRange,
        tracks: Vec<SequencedTrack>,
        closed_early: bool,
    ) -> Self {
        Self {
            name: name.into(),
            bucket,
            tracks,
            closed_early,
            metrics: SetMetrics::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Number of leading tracks that are not part of the parked tail
    pub fn curated_len(&self) -> usize {
        self.tracks.iter().take_while(|t| !t.parked).count()
    }

    /// Relabel phases, re-score transitions and recompute metrics
    ///
    /// Phases are replayed over the curated tracks; the parked tail is
    /// always Cool-down.
    pub fn finalize(&mut self, scorer: &Scorer, config: &SequencingConfig) {
        let curated = self.curated_len();
        let mut model = EnergyPhaseModel::new(config.bands, curated);

        for index in 0..self.tracks.len() {
            let target = model.target(index);
            let phase = if self.tracks[index].parked {
                Phase::CoolDown
            } else {
                target.phase
            };

            let scored = (index > 0)
                .then(|| scorer.score(&self.tracks[index - 1], &self.tracks[index].record, &target));
            let track = &mut self.tracks[index];
            track.assigned_phase = phase;
            match scored {
                Some(scored) => {
                    track.forced &= scored.total < config.quality_floor;
                    track.transition_score_in = Some(scored.total);
                    track.score_trace = scored.trace;
                }
                None => {
                    track.transition_score_in = None;
                    track.score_trace = ScoreTrace::default();
                    track.forced = false;
                }
            }
            model.record(phase, track.record.energy);
        }

        self.metrics = self.compute_metrics(scorer, config.quality_floor);
        if !self.metrics.arc.is_complete() {
            debug!("{}: incomplete energy arc: {}", self.name, self.metrics.arc.issues.join("; "));
        }
    }

    fn compute_metrics(&self, scorer: &Scorer, floor: f64) -> SetMetrics {
        let scores: Vec<f64> = self
            .tracks
            .iter()
            .filter_map(|t| t.transition_score_in)
            .collect();
        let conflict_count = self
            .tracks
            .iter()
            .filter(|t| t.forced || t.transition_score_in.is_some_and(|s| s < floor))
            .count();
        let risks = self
            .tracks
            .windows(2)
            .enumerate()
            .filter_map(|(index, pair)| {
                let risks = scorer.risks(&pair[0].record, &pair[1].record);
                (!risks.is_empty()).then_some(RiskNote {
                    position: index + 1,
                    risks,
                })
            })
            .collect();

        SetMetrics {
            duration_secs: self.tracks.iter().map(|t| track_seconds(&t.record)).sum(),
            bpm_curve: self.tracks.iter().map(|t| t.record.bpm).collect(),
            energy_curve: self.tracks.iter().map(|t| t.record.energy).collect(),
            conflict_count,
            mean_transition_score: if scores.is_empty() {
                0.0
            } else {
                scores.iter().sum::<f64>() / scores.len() as f64
            },
            parked_count: self.tracks.iter().filter(|t| t.parked).count(),
            risks,
            arc: validate_energy_curve(self),
        }
    }
}

/// Every set built from one pool, plus what could not be placed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetsOutcome {
    pub sets: Vec<Set>,
    pub unplaceable: Vec<Unplaceable>,
    pub dead_ends: Vec<SequencingDeadEnd>,
}

impl SetsOutcome {
    pub fn placed_count(&self) -> usize {
        self.sets.iter().map(Set::len).sum()
    }

    /// Sets missing part of the warm-up, peak, cool-down arc
    pub fn incomplete_arc_count(&self) -> usize {
        self.sets.iter().filter(|s| !s.metrics.arc.is_complete()).count()
    }
}

struct BucketSets {
    sets: Vec<Set>,
    unplaceable: Vec<Unplaceable>,
    dead_ends: Vec<SequencingDeadEnd>,
}

/// Sequence a pool of records into sets
///
/// Buckets are independent, so they are sequenced in parallel; results
/// are concatenated in bucket order, which keeps the output deterministic.
pub fn build_sets(records: Vec<FeatureRecord>, config: &SequencingConfig) -> SetsOutcome {
    let start = Instant::now();
    let total = records.len();
    let scorer = Scorer::new(config.scorer.clone());

    let (usable, unplaceable) = screen(records, config);
    let buckets = bucket_by_bpm(usable, &config.partition);
    info!(
        "Sequencing {} tracks in {} BPM bucket(s) ({} screened out)",
        total - unplaceable.len(),
        buckets.len(),
        unplaceable.len()
    );

    let per_bucket: Vec<BucketSets> = buckets
        .into_par_iter()
        .map(|bucket| sequence_bucket(bucket, &scorer, config))
        .collect();

    let mut outcome = SetsOutcome {
        unplaceable,
        ..SetsOutcome::default()
    };
    for bucket in per_bucket {
        outcome.sets.extend(bucket.sets);
        outcome.unplaceable.extend(bucket.unplaceable);
        outcome.dead_ends.extend(bucket.dead_ends);
    }

    info!(
        "Built {} set(s) from {} tracks in {:.2}s ({} unplaceable, {} dead ends)",
        outcome.sets.len(),
        outcome.placed_count(),
        start.elapsed().as_secs_f64(),
        outcome.unplaceable.len(),
        outcome.dead_ends.len()
    );
    let incomplete = outcome.incomplete_arc_count();
    if incomplete > 0 {
        info!("{} set(s) without a full energy arc", incomplete);
    }
    outcome
}

fn sequence_bucket(bucket: BpmBucket, scorer: &Scorer, config: &SequencingConfig) -> BucketSets {
    let range = bucket.range;
    let plan = plan_segments(
        bucket.len(),
        mean_duration(&bucket.records),
        &config.partition,
    );
    debug!("Bucket {}: {} tracks, plan {:?}", range.label(), bucket.len(), plan);

    let built = SequenceBuilder::new(scorer, config).build(bucket.records, &plan);
    let optimizer = GlobalOptimizer::new(scorer, config);

    let mut sets: Vec<Set> = Vec::new();
    for run in built.runs {
        let closed_early = run.closed_early();
        let parts = partition(run.tracks, &config.partition);
        let last = parts.len().saturating_sub(1);
        for (index, tracks) in parts.into_iter().enumerate() {
            let name = format!("{} / Set {}", range.label(), sets.len() + 1);
            let mut set = Set::new(name, range, tracks, closed_early && index == last);
            let swaps = optimizer.optimize(&mut set);
            if swaps > 0 {
                debug!("{}: optimizer applied {} swap(s)", set.name, swaps);
            }
            sets.push(set);
        }
    }

    if !built.parked.is_empty() {
        match sets.last_mut() {
            Some(last) => last.tracks.extend(built.parked),
            None => {
                let name = format!("{} / Set 1", range.label());
                sets.push(Set::new(name, range, built.parked, false));
            }
        }
    }

    for set in &mut sets {
        set.finalize(scorer, config);
    }

    BucketSets {
        sets,
        unplaceable: built.unplaceable,
        dead_ends: built.dead_ends,
    }
}

/// Does a set tell the whole story?
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyCurveReport {
    pub has_warm_up: bool,
    pub has_peak: bool,
    pub has_cool_down: bool,
    /// Position of the highest-energy track
    pub peak_position: Option<usize>,
    pub issues: Vec<String>,
}

impl EnergyCurveReport {
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check that a set opens gently, peaks, and winds down
pub fn validate_energy_curve(set: &Set) -> EnergyCurveReport {
    let has = |phase: Phase| set.tracks.iter().any(|t| t.assigned_phase == phase);
    let has_warm_up = has(Phase::WarmUp);
    let has_peak = has(Phase::Peak) || has(Phase::Sustain);
    let has_cool_down = has(Phase::CoolDown);

    let peak_position = set
        .tracks
        .iter()
        .enumerate()
        .max_by_key(|(index, t)| (t.record.energy, std::cmp::Reverse(*index)))
        .map(|(index, _)| index);

    let mut issues = Vec::new();
    if !has_warm_up {
        issues.push("no warm-up: the set opens at full energy".to_string());
    }
    if !has_peak {
        issues.push("no peak: energy never reaches the peak band".to_string());
    }
    if !has_cool_down {
        issues.push("no cool-down: the set ends at full energy".to_string());
    }
    if let (Some(position), Some(first), Some(last)) =
        (peak_position, set.tracks.first(), set.tracks.last())
    {
        let peak = set.tracks[position].record.energy;
        if set.tracks.len() >= 3 && (peak <= first.record.energy || peak <= last.record.energy) {
            issues.push(format!(
                "flat curve: highest energy {} is not above both ends",
                peak
            ));
        }
    }

    EnergyCurveReport {
        has_warm_up,
        has_peak,
        has_cool_down,
        peak_position,
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::test_support::track;

    fn arc_records(n: usize) -> Vec<FeatureRecord> {
        let keys = ["8A", "8B", "9A", "9B", "8A", "7A", "7B", "8A"];
        (0..n)
            .map(|i| {
                let energy = (45 + (i * 40 / n.max(1))) as u8;
                track(
                    &format!("t{:03}", i),
                    120.0 + (i % 10) as f64,
                    keys[i % keys.len()],
                    energy,
                )
            })
            .collect()
    }

    #[test]
    fn test_forty_tracks_become_one_set() {
        let outcome = build_sets(arc_records(40), &SequencingConfig::default());
        assert_eq!(outcome.sets.len(), 1);
        assert_eq!(outcome.sets[0].len(), 40);
        assert!(outcome.unplaceable.is_empty());
    }

    #[test]
    fn test_every_record_is_accounted_for() {
        let mut records = arc_records(70);
        records[3].bpm = 0.0;
        records[9].duration_secs = 5.0;
        records[11].duration_secs = 1200.0;
        records.push(track("far", 174.0, "1A", 90));

        let outcome = build_sets(records, &SequencingConfig::default());
        assert_eq!(outcome.placed_count() + outcome.unplaceable.len(), 71);
        assert!(outcome
            .unplaceable
            .iter()
            .any(|u| u.reason == UnplaceableReason::UnusableTempo));
        assert_eq!(
            outcome
                .unplaceable
                .iter()
                .filter(|u| matches!(u.reason, UnplaceableReason::AbnormalDuration { .. }))
                .count(),
            2
        );
    }

    #[test]
    fn test_phases_never_leave_cooldown() {
        let outcome = build_sets(arc_records(90), &SequencingConfig::default());
        for set in &outcome.sets {
            let mut cooled = false;
            for pair in set.tracks.windows(2) {
                assert!(pair[1].assigned_phase >= pair[0].assigned_phase, "{}", set.name);
            }
            for t in &set.tracks {
                if cooled {
                    assert_eq!(t.assigned_phase, Phase::CoolDown);
                }
                cooled |= t.assigned_phase == Phase::CoolDown;
            }
        }
    }

    #[test]
    fn test_output_is_deterministic() {
        let config = SequencingConfig::default();
        let first = build_sets(arc_records(60), &config);
        let mut shuffled = arc_records(60);
        shuffled.reverse();
        let second = build_sets(shuffled, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn test_metrics_follow_tracks() {
        let outcome = build_sets(arc_records(30), &SequencingConfig::default());
        let set = &outcome.sets[0];
        assert_eq!(set.metrics.bpm_curve.len(), set.len());
        assert_eq!(set.metrics.energy_curve.len(), set.len());
        assert_eq!(set.metrics.duration_secs, 300.0 * set.len() as f64);
        assert_eq!(set.tracks[0].transition_score_in, None);
        assert!(set.tracks[1..].iter().all(|t| t.transition_score_in.is_some()));
    }

    #[test]
    fn test_finalize_records_the_arc() {
        let config = SequencingConfig::default();
        let scorer = Scorer::new(config.scorer.clone());
        let mut flat = Set::new(
            "flat",
            BpmRange { min: 124.0, max: 124.0 },
            (0..5)
                .map(|i| SequencedTrack::seed(track(&format!("f{}", i), 124.0, "8A", 80), Phase::Peak))
                .collect(),
            false,
        );
        flat.finalize(&scorer, &config);
        assert_eq!(flat.metrics.arc, validate_energy_curve(&flat));
        assert!(!flat.metrics.arc.is_complete());

        let outcome = SetsOutcome {
            sets: vec![flat],
            ..SetsOutcome::default()
        };
        assert_eq!(outcome.incomplete_arc_count(), 1);
    }

    #[test]
    fn test_energy_curve_report() {
        let outcome = build_sets(arc_records(30), &SequencingConfig::default());
        let report = validate_energy_curve(&outcome.sets[0]);
        assert!(report.has_warm_up);
        assert!(report.has_cool_down);

        let flat = Set::new(
            "flat",
            BpmRange { min: 124.0, max: 124.0 },
            (0..5)
                .map(|i| SequencedTrack::seed(track(&format!("f{}", i), 124.0, "8A", 80), Phase::Peak))
                .collect(),
            false,
        );
        let report = validate_energy_curve(&flat);
        assert!(!report.is_complete());
        assert!(!report.has_warm_up);
        assert!(!report.has_cool_down);
    }
}
