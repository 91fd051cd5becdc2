//! Compatibility scorer
//!
//! A pure function from (previous track, candidate, phase target) to a
//! weighted transition score plus the per-dimension trace that produced it.
//! The scorer holds only immutable configuration, so one instance can be
//! shared across bucket tasks.

mod energy;
pub mod genre;
mod structure;
mod tempo;
mod texture;
mod tonality;
pub mod trace;
mod vocal;

use crate::key::{self, CamelotKey};
use crate::phase::PhaseTarget;
use crate::sequence::SequencedTrack;
use crate::types::FeatureRecord;
use serde::{Deserialize, Serialize};

pub use tempo::TempoTier;
pub use tonality::key_compatibility;
pub use trace::{Dimension, ScoreTrace, TraceEntry};

use trace::TraceBuilder;

/// Multiplier applied to every delta of a dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerWeights {
    pub tempo: f64,
    pub tonality: f64,
    pub energy: f64,
    pub phase: f64,
    pub vocal_conflict: f64,
    pub vocal_placement: f64,
    pub timbre: f64,
    pub rhythm: f64,
    pub loudness: f64,
    pub dynamics: f64,
    pub structure: f64,
    pub genre: f64,
}

impl Default for ScorerWeights {
    fn default() -> Self {
        Self {
            tempo: 1.0,
            tonality: 1.0,
            energy: 1.0,
            phase: 1.0,
            vocal_conflict: 1.0,
            vocal_placement: 1.0,
            timbre: 1.0,
            rhythm: 1.0,
            loudness: 1.0,
            dynamics: 1.0,
            structure: 1.0,
            genre: 1.0,
        }
    }
}

impl ScorerWeights {
    pub fn get(&self, dimension: Dimension) -> f64 {
        match dimension {
            Dimension::Tempo => self.tempo,
            Dimension::Tonality => self.tonality,
            Dimension::Energy => self.energy,
            Dimension::Phase => self.phase,
            Dimension::VocalConflict => self.vocal_conflict,
            Dimension::VocalPlacement => self.vocal_placement,
            Dimension::Timbre => self.timbre,
            Dimension::Rhythm => self.rhythm,
            Dimension::Loudness => self.loudness,
            Dimension::Dynamics => self.dynamics,
            Dimension::Structure => self.structure,
            Dimension::Genre => self.genre,
        }
    }

    pub(crate) fn fields_mut(&mut self) -> [(&'static str, &mut f64); 12] {
        [
            ("weights.tempo", &mut self.tempo),
            ("weights.tonality", &mut self.tonality),
            ("weights.energy", &mut self.energy),
            ("weights.phase", &mut self.phase),
            ("weights.vocal_conflict", &mut self.vocal_conflict),
            ("weights.vocal_placement", &mut self.vocal_placement),
            ("weights.timbre", &mut self.timbre),
            ("weights.rhythm", &mut self.rhythm),
            ("weights.loudness", &mut self.loudness),
            ("weights.dynamics", &mut self.dynamics),
            ("weights.structure", &mut self.structure),
            ("weights.genre", &mut self.genre),
        ]
    }
}

/// Scorer weights and thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    pub weights: ScorerWeights,
    /// LUFS delta that still earns the matched-loudness bonus
    pub lufs_match_db: f64,
    /// LUFS delta where a mild penalty starts
    pub lufs_mild_db: f64,
    /// LUFS delta where the proportional penalty starts
    pub lufs_warn_db: f64,
    /// LUFS delta treated as a hard jump
    pub lufs_max_db: f64,
    pub dynamic_range_close_db: f64,
    pub dynamic_range_near_db: f64,
    pub dynamic_range_far_db: f64,
    /// Both genre tags need at least this confidence to count
    pub genre_min_confidence: f64,
    /// Vocal overlap above this is a heavy conflict
    pub vocal_overlap_heavy: f64,
    /// Vocal overlap above this is a moderate conflict
    pub vocal_overlap_moderate: f64,
    /// Risk report: loudness jump worth flagging
    pub risk_lufs_db: f64,
    /// Risk report: dynamic range jump worth flagging
    pub risk_dynamic_range_db: f64,
    /// Risk report: tempo jump worth flagging
    pub risk_bpm_delta: f64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            weights: ScorerWeights::default(),
            lufs_match_db: 2.0,
            lufs_mild_db: 2.5,
            lufs_warn_db: 4.5,
            lufs_max_db: 6.0,
            dynamic_range_close_db: 3.0,
            dynamic_range_near_db: 6.0,
            dynamic_range_far_db: 10.0,
            genre_min_confidence: 0.85,
            vocal_overlap_heavy: 0.5,
            vocal_overlap_moderate: 0.3,
            risk_lufs_db: 4.0,
            risk_dynamic_range_db: 6.0,
            risk_bpm_delta: 8.0,
        }
    }
}

/// Score and explanation of one transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTransition {
    pub total: f64,
    pub trace: ScoreTrace,
}

/// Something a DJ should look at before playing a transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransitionRisk {
    LoudnessJump { delta_db: f64 },
    DynamicRangeJump { delta_db: f64 },
    TempoJump { delta_bpm: f64 },
    KeyClash { from: CamelotKey, to: CamelotKey, distance: u8 },
}

/// Weighted multi-dimensional transition scorer
#[derive(Debug, Clone, Default)]
pub struct Scorer {
    config: ScorerConfig,
}

impl Scorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Score placing `candidate` right after `prev`
    pub fn score(
        &self,
        prev: &SequencedTrack,
        candidate: &FeatureRecord,
        target: &PhaseTarget,
    ) -> ScoredTransition {
        self.score_records(&prev.record, candidate, target)
    }

    /// Score a transition between two bare records
    pub fn score_records(
        &self,
        prev: &FeatureRecord,
        candidate: &FeatureRecord,
        target: &PhaseTarget,
    ) -> ScoredTransition {
        let mut trace = TraceBuilder::new(&self.config.weights);

        tempo::evaluate(prev, candidate, target, &mut trace);
        tonality::evaluate(prev, candidate, &mut trace);
        energy::evaluate(prev, candidate, target, &mut trace);
        vocal::evaluate(prev, candidate, &self.config, &mut trace);
        texture::evaluate(prev, candidate, &self.config, &mut trace);
        structure::evaluate(prev, candidate, &mut trace);
        evaluate_genre(prev, candidate, &self.config, &mut trace);

        let trace = trace.finish();
        ScoredTransition {
            total: trace.total(),
            trace,
        }
    }

    /// Flag transitions that need manual attention
    pub fn risks(&self, prev: &FeatureRecord, next: &FeatureRecord) -> Vec<TransitionRisk> {
        let mut risks = Vec::new();

        if let (Some(a), Some(b)) = (prev.lufs, next.lufs) {
            let delta_db = (a - b).abs();
            if delta_db > self.config.risk_lufs_db {
                risks.push(TransitionRisk::LoudnessJump { delta_db });
            }
        }
        if let (Some(a), Some(b)) = (prev.dynamic_range_db, next.dynamic_range_db) {
            let delta_db = (a - b).abs();
            if delta_db > self.config.risk_dynamic_range_db {
                risks.push(TransitionRisk::DynamicRangeJump { delta_db });
            }
        }
        let delta_bpm = (prev.bpm - next.bpm).abs();
        if delta_bpm > self.config.risk_bpm_delta {
            risks.push(TransitionRisk::TempoJump { delta_bpm });
        }
        if let (Some(from), Some(to)) = (prev.key, next.key) {
            let distance = key::distance(from, to);
            if distance >= 5 {
                risks.push(TransitionRisk::KeyClash { from, to, distance });
            }
        }
        risks
    }
}

fn evaluate_genre(
    prev: &FeatureRecord,
    candidate: &FeatureRecord,
    config: &ScorerConfig,
    trace: &mut TraceBuilder<'_>,
) {
    let (Some(a), Some(b)) = (&prev.genre, &candidate.genre) else {
        return;
    };
    let confidence = a.confidence.min(b.confidence);
    if confidence < config.genre_min_confidence {
        trace.add(
            Dimension::Genre,
            confidence,
            0.0,
            format!("genre confidence {:.2} below floor", confidence),
        );
        return;
    }
    match genre::affinity(&a.name, &b.name) {
        Some(affinity) if affinity.compatible => trace.add(
            Dimension::Genre,
            affinity.score,
            affinity.score * 0.27,
            format!("{} -> {} compatible", a.name, b.name),
        ),
        Some(affinity) => trace.add(
            Dimension::Genre,
            affinity.score,
            -20.0,
            format!("{} -> {} conflicting genres", a.name, b.name),
        ),
        None => {}
    }
}
