//! Core data types for djcurate
//!
//! [`FeatureRecord`] is the per-track schema everything downstream consumes.
//! Records are immutable once produced and keyed by their fingerprint.

use crate::key::CamelotKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Number of coefficients in a timbre fingerprint
pub const TIMBRE_DIMS: usize = 13;

/// Share of a track treated as its intro/outro when no markers exist
pub const EDGE_WINDOW_RATIO: f64 = 0.3;

// =============================================================================
// File identity
// =============================================================================

/// Filesystem facts that feed the fingerprint and cache validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileMetadata {
    /// Modification time in nanoseconds since the Unix epoch
    pub mtime_ns: u64,
    /// File size in bytes
    pub size: u64,
}

impl FileMetadata {
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        let mtime_ns = metadata
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Ok(Self {
            mtime_ns,
            size: metadata.len(),
        })
    }
}

// =============================================================================
// Feature groups
// =============================================================================

/// Named time markers, all in seconds from the start of the track
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureMarkers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intro_end: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_drop: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outro_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mix_in_point: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mix_out_point: Option<f64>,
}

impl StructureMarkers {
    /// Present markers in their canonical order
    pub fn ordered(&self) -> Vec<(&'static str, f64)> {
        [
            ("mix_in_point", self.mix_in_point),
            ("intro_end", self.intro_end),
            ("first_drop", self.first_drop),
            ("outro_start", self.outro_start),
            ("mix_out_point", self.mix_out_point),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.map(|v| (name, v)))
        .collect()
    }

    /// Where the leading transition window ends
    pub fn lead_in_end(&self) -> Option<f64> {
        self.mix_in_point.or(self.intro_end)
    }

    /// Where the trailing transition window starts
    pub fn lead_out_start(&self) -> Option<f64> {
        self.mix_out_point.or(self.outro_start)
    }
}

/// Ordered, non-overlapping vocal intervals in seconds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VocalTimeline {
    segments: Vec<(f64, f64)>,
}

impl VocalTimeline {
    /// Build a timeline, sorting and merging touching or overlapping intervals
    pub fn new(mut segments: Vec<(f64, f64)>) -> Self {
        segments.retain(|(start, end)| start.is_finite() && end.is_finite() && end > start);
        segments.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut merged: Vec<(f64, f64)> = Vec::with_capacity(segments.len());
        for (start, end) in segments {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }
        Self { segments: merged }
    }

    pub fn segments(&self) -> &[(f64, f64)] {
        &self.segments
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Seconds of vocals inside `[from, to]`
    pub fn vocal_seconds(&self, from: f64, to: f64) -> f64 {
        self.segments
            .iter()
            .map(|&(start, end)| (end.min(to) - start.max(from)).max(0.0))
            .sum()
    }

    /// Vocal intervals clipped to `[from, to]` and shifted so `from` is zero
    pub fn window(&self, from: f64, to: f64) -> Vec<(f64, f64)> {
        self.segments
            .iter()
            .filter_map(|&(start, end)| {
                let clipped = (start.max(from), end.min(to));
                (clipped.1 > clipped.0).then(|| (clipped.0 - from, clipped.1 - from))
            })
            .collect()
    }

    /// Share of the first 30% of the track that carries vocals
    pub fn intro_vocal_ratio(&self, duration: f64) -> f64 {
        let window = duration * EDGE_WINDOW_RATIO;
        if window <= 0.0 {
            return 0.0;
        }
        (self.vocal_seconds(0.0, window) / window).clamp(0.0, 1.0)
    }

    /// Share of the last 30% of the track that carries vocals
    pub fn outro_vocal_ratio(&self, duration: f64) -> f64 {
        let window = duration * EDGE_WINDOW_RATIO;
        if window <= 0.0 {
            return 0.0;
        }
        (self.vocal_seconds(duration - window, duration) / window).clamp(0.0, 1.0)
    }

    fn is_well_formed(&self) -> bool {
        self.segments.windows(2).all(|pair| pair[0].1 <= pair[1].0)
            && self.segments.iter().all(|(start, end)| end > start)
    }
}

/// Low/mid/high energy ratios
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralBalance {
    pub low: f64,
    pub mid: f64,
    pub high: f64,
}

impl SpectralBalance {
    /// Weighted band delta, low end weighted heaviest
    pub fn weighted_delta(&self, other: &SpectralBalance) -> f64 {
        0.5 * (self.low - other.low).abs()
            + 0.3 * (self.mid - other.mid).abs()
            + 0.2 * (self.high - other.high).abs()
    }
}

/// Fixed-length timbre fingerprint (MFCC-style coefficients)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimbreFingerprint(pub [f32; TIMBRE_DIMS]);

impl TimbreFingerprint {
    /// Cosine similarity in `[-1, 1]`; zero vectors compare as 0
    pub fn cosine_similarity(&self, other: &TimbreFingerprint) -> f64 {
        let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            let (a, b) = (*a as f64, *b as f64);
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a.sqrt() * norm_b.sqrt())
    }
}

/// Drum pattern family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrumPattern {
    FourOnFloor,
    HalfTime,
    Breakbeat,
    Latin,
    #[default]
    Unknown,
}

impl DrumPattern {
    pub fn as_str(self) -> &'static str {
        match self {
            DrumPattern::FourOnFloor => "four_on_floor",
            DrumPattern::HalfTime => "half_time",
            DrumPattern::Breakbeat => "breakbeat",
            DrumPattern::Latin => "latin",
            DrumPattern::Unknown => "unknown",
        }
    }
}

/// Declared genre with classifier confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreTag {
    pub name: String,
    pub confidence: f64,
}

// =============================================================================
// Feature record
// =============================================================================

/// Immutable per-track feature schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub fingerprint: String,
    pub source_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    pub duration_secs: f64,

    pub bpm: f64,
    pub bpm_confidence: f64,

    #[serde(default)]
    pub key: Option<CamelotKey>,
    #[serde(default)]
    pub key_confidence: f64,

    pub energy: u8,

    #[serde(default)]
    pub markers: StructureMarkers,
    /// First downbeat in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beat_offset: Option<f64>,
    /// Phrase length in beats
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phrase_beats: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocals: Option<VocalTimeline>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spectral_balance: Option<SpectralBalance>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timbre: Option<TimbreFingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groove_density: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swing_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lufs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_range_db: Option<f64>,
    #[serde(default = "default_time_signature")]
    pub time_signature: u8,
    #[serde(default)]
    pub drum_pattern: DrumPattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<GenreTag>,

    pub analyzer_version: String,
    #[serde(default)]
    pub model_versions: BTreeMap<String, String>,
}

fn default_time_signature() -> u8 {
    4
}

/// Reason a record violates the schema invariants
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RecordDefect {
    #[error("{field} confidence {value} is outside [0, 1]")]
    ConfidenceOutOfRange { field: &'static str, value: f64 },
    #[error("BPM {0} is not a positive tempo")]
    UnusableTempo(f64),
    #[error("energy {0} is above 100")]
    EnergyOutOfRange(u8),
    #[error("marker '{name}' at {at:.2}s is out of order or outside [0, {duration:.2}]")]
    MarkerOutOfOrder {
        name: &'static str,
        at: f64,
        duration: f64,
    },
    #[error("vocal intervals overlap or are unordered")]
    MalformedVocals,
}

impl FeatureRecord {
    /// Minimal record with neutral values for every optional group
    pub fn new(fingerprint: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            source_path: source_path.into(),
            title: None,
            artist: None,
            duration_secs: 0.0,
            bpm: 0.0,
            bpm_confidence: 0.0,
            key: None,
            key_confidence: 0.0,
            energy: 50,
            markers: StructureMarkers::default(),
            beat_offset: None,
            phrase_beats: None,
            vocals: None,
            spectral_balance: None,
            timbre: None,
            groove_density: None,
            swing_amount: None,
            lufs: None,
            dynamic_range_db: None,
            time_signature: default_time_signature(),
            drum_pattern: DrumPattern::Unknown,
            genre: None,
            analyzer_version: String::new(),
            model_versions: BTreeMap::new(),
        }
    }

    /// A record with a non-positive or non-finite tempo cannot be sequenced
    pub fn is_usable(&self) -> bool {
        self.bpm.is_finite() && self.bpm > 0.0
    }

    /// Label used in logs and reports
    pub fn display_name(&self) -> String {
        match (&self.artist, &self.title) {
            (Some(artist), Some(title)) => format!("{} - {}", artist, title),
            (None, Some(title)) => title.clone(),
            _ => self
                .source_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.fingerprint.clone()),
        }
    }

    /// Check the schema invariants
    pub fn validate(&self) -> Result<(), RecordDefect> {
        let confidences = [
            ("bpm", self.bpm_confidence),
            ("key", self.key_confidence),
            (
                "genre",
                self.genre.as_ref().map(|g| g.confidence).unwrap_or(0.0),
            ),
        ];
        for (field, value) in confidences {
            if !(0.0..=1.0).contains(&value) {
                return Err(RecordDefect::ConfidenceOutOfRange { field, value });
            }
        }

        if !self.is_usable() {
            return Err(RecordDefect::UnusableTempo(self.bpm));
        }

        if self.energy > 100 {
            return Err(RecordDefect::EnergyOutOfRange(self.energy));
        }

        let mut previous = 0.0;
        for (name, at) in self.markers.ordered() {
            if at < previous || at > self.duration_secs {
                return Err(RecordDefect::MarkerOutOfOrder {
                    name,
                    at,
                    duration: self.duration_secs,
                });
            }
            previous = at;
        }

        if let Some(vocals) = &self.vocals {
            if !vocals.is_well_formed() {
                return Err(RecordDefect::MalformedVocals);
            }
        }

        Ok(())
    }

    pub fn intro_vocal_ratio(&self) -> Option<f64> {
        self.vocals
            .as_ref()
            .map(|v| v.intro_vocal_ratio(self.duration_secs))
    }

    pub fn outro_vocal_ratio(&self) -> Option<f64> {
        self.vocals
            .as_ref()
            .map(|v| v.outro_vocal_ratio(self.duration_secs))
    }
}
