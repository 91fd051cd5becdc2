//! Per-dimension score trace
//!
//! Every transition score is the sum of its trace entries, so the trace is
//! the authoritative explanation of why a candidate won or lost.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A scored aspect of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Tempo,
    Tonality,
    Energy,
    Phase,
    VocalConflict,
    VocalPlacement,
    Timbre,
    Rhythm,
    Loudness,
    Dynamics,
    Structure,
    Genre,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Tempo => "tempo",
            Dimension::Tonality => "tonality",
            Dimension::Energy => "energy",
            Dimension::Phase => "phase",
            Dimension::VocalConflict => "vocal_conflict",
            Dimension::VocalPlacement => "vocal_placement",
            Dimension::Timbre => "timbre",
            Dimension::Rhythm => "rhythm",
            Dimension::Loudness => "loudness",
            Dimension::Dynamics => "dynamics",
            Dimension::Structure => "structure",
            Dimension::Genre => "genre",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One contribution to a transition score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub dimension: Dimension,
    /// The measured quantity (BPM delta, compatibility, overlap ratio, ...)
    pub value: f64,
    /// Weighted contribution to the total
    pub delta: f64,
    pub reason: String,
}

/// Ordered list of score contributions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreTrace {
    entries: Vec<TraceEntry>,
}

impl ScoreTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: TraceEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[TraceEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|e| e.delta).sum()
    }

    /// Summed contribution of one dimension
    pub fn delta_for(&self, dimension: Dimension) -> f64 {
        self.entries_for(dimension).map(|e| e.delta).sum()
    }

    pub fn entries_for(&self, dimension: Dimension) -> impl Iterator<Item = &TraceEntry> {
        self.entries.iter().filter(move |e| e.dimension == dimension)
    }

    /// First entry of a dimension, where the primary measurement lives
    pub fn primary(&self, dimension: Dimension) -> Option<&TraceEntry> {
        self.entries_for(dimension).next()
    }
}

/// Collects entries, applying per-dimension weights as they arrive
pub(crate) struct TraceBuilder<'a> {
    weights: &'a super::ScorerWeights,
    trace: ScoreTrace,
}

impl<'a> TraceBuilder<'a> {
    pub(crate) fn new(weights: &'a super::ScorerWeights) -> Self {
        Self {
            weights,
            trace: ScoreTrace::new(),
        }
    }

    pub(crate) fn add(
        &mut self,
        dimension: Dimension,
        value: f64,
        delta: f64,
        reason: impl Into<String>,
    ) {
        self.trace.push(TraceEntry {
            dimension,
            value,
            delta: delta * self.weights.get(dimension),
            reason: reason.into(),
        });
    }

    pub(crate) fn finish(self) -> ScoreTrace {
        self.trace
    }
}
