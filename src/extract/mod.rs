//! Feature extraction backends
//!
//! A [`FeatureExtractor`] turns a library track into a [`FeatureRecord`].
//! Backends are swappable and chosen once at startup with [`select`]:
//!
//! - [`NullExtractor`]: produces nothing; every track must come from the cache
//! - [`SidecarExtractor`]: reads `<file>.features.json` written by an external analyzer
//! - [`SignalExtractor`]: decodes the audio and measures loudness and energy
//! - [`ChainExtractor`]: tries several backends, first success wins

mod sidecar;
mod signal;

pub use sidecar::{sidecar_path, SidecarExtractor};
pub use signal::SignalExtractor;

use crate::error::AnalysisError;
use crate::library::LibraryTrack;
use crate::types::{FeatureRecord, GenreTag};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;

/// Version stamped on every record this build produces
pub const ANALYZER_VERSION: &str = concat!("djcurate-", env!("CARGO_PKG_VERSION"));

/// Analyzer and per-model versions a record was produced with
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersions {
    pub analyzer_version: String,
    #[serde(default)]
    pub model_versions: BTreeMap<String, String>,
}

impl SchemaVersions {
    pub fn new(analyzer_version: impl Into<String>) -> Self {
        Self {
            analyzer_version: analyzer_version.into(),
            model_versions: BTreeMap::new(),
        }
    }

    pub fn with_model(mut self, group: FeatureGroup, version: impl Into<String>) -> Self {
        self.model_versions
            .insert(group.model_key().to_string(), version.into());
        self
    }

    /// Stamp `record` with these versions
    pub fn stamp(&self, record: &mut FeatureRecord) {
        record.analyzer_version = self.analyzer_version.clone();
        record.model_versions = self.model_versions.clone();
    }

    /// Groups whose model version differs from `recorded`
    ///
    /// Model keys this build does not know are ignored.
    pub fn stale_groups(&self, recorded: &BTreeMap<String, String>) -> BTreeSet<FeatureGroup> {
        self.model_versions
            .iter()
            .filter(|(key, version)| recorded.get(*key) != Some(*version))
            .filter_map(|(key, _)| FeatureGroup::from_model_key(key))
            .collect()
    }
}

/// Independently versioned slice of a feature record
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureGroup {
    Tempo,
    Tonality,
    Energy,
    Structure,
    Vocals,
    Timbre,
    Genre,
}

impl FeatureGroup {
    pub const ALL: [FeatureGroup; 7] = [
        FeatureGroup::Tempo,
        FeatureGroup::Tonality,
        FeatureGroup::Energy,
        FeatureGroup::Structure,
        FeatureGroup::Vocals,
        FeatureGroup::Timbre,
        FeatureGroup::Genre,
    ];

    /// Key used for this group in `model_versions`
    pub fn model_key(self) -> &'static str {
        match self {
            FeatureGroup::Tempo => "bpm",
            FeatureGroup::Tonality => "key",
            FeatureGroup::Energy => "energy",
            FeatureGroup::Structure => "structure",
            FeatureGroup::Vocals => "vocal",
            FeatureGroup::Timbre => "timbre",
            FeatureGroup::Genre => "genre",
        }
    }

    pub fn from_model_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|group| group.model_key() == key)
    }
}

/// A cached record with some groups out of date
///
/// Extractors may reuse the fresh groups and recompute only `stale`.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRecord {
    pub record: FeatureRecord,
    pub stale: BTreeSet<FeatureGroup>,
}

impl PartialRecord {
    pub fn is_stale(&self, group: FeatureGroup) -> bool {
        self.stale.contains(&group)
    }

    /// The cached record with every stale group reset to its neutral value
    pub fn fresh_base(&self) -> FeatureRecord {
        let mut record = self.record.clone();
        for group in &self.stale {
            clear_group(&mut record, *group);
        }
        record
    }
}

fn clear_group(record: &mut FeatureRecord, group: FeatureGroup) {
    let neutral = FeatureRecord::new(String::new(), PathBuf::new());
    match group {
        FeatureGroup::Tempo => {
            record.bpm = neutral.bpm;
            record.bpm_confidence = neutral.bpm_confidence;
            record.beat_offset = None;
            record.phrase_beats = None;
            record.time_signature = neutral.time_signature;
            record.drum_pattern = neutral.drum_pattern;
            record.groove_density = None;
            record.swing_amount = None;
        }
        FeatureGroup::Tonality => {
            record.key = None;
            record.key_confidence = neutral.key_confidence;
        }
        FeatureGroup::Energy => {
            record.energy = neutral.energy;
            record.lufs = None;
            record.dynamic_range_db = None;
        }
        FeatureGroup::Structure => record.markers = neutral.markers,
        FeatureGroup::Vocals => record.vocals = None,
        FeatureGroup::Timbre => {
            record.timbre = None;
            record.spectral_balance = None;
        }
        FeatureGroup::Genre => record.genre = None,
    }
}

/// Confidence given to values that only come from file tags
pub const TAG_BPM_CONFIDENCE: f64 = 0.5;
pub const TAG_KEY_CONFIDENCE: f64 = 0.5;
pub const TAG_GENRE_CONFIDENCE: f64 = 0.6;

/// Fill gaps in `record` with what the library already knows
pub(crate) fn apply_library_tags(record: &mut FeatureRecord, track: &LibraryTrack) {
    if record.title.is_none() {
        record.title = track.title.clone();
    }
    if record.artist.is_none() {
        record.artist = track.artist.clone();
    }
    if record.key.is_none() && track.known_key.is_some() {
        record.key = track.known_key;
        record.key_confidence = TAG_KEY_CONFIDENCE;
    }
    if record.genre.is_none() {
        record.genre = track
            .genre
            .as_ref()
            .filter(|name| !name.trim().is_empty())
            .map(|name| GenreTag {
                name: name.trim().to_string(),
                confidence: TAG_GENRE_CONFIDENCE,
            });
    }
}

/// Feature extraction backend
pub trait FeatureExtractor: Send + Sync {
    /// Produce a record for `track`, reusing the fresh groups of `previous` when given
    fn extract(
        &self,
        track: &LibraryTrack,
        previous: Option<&PartialRecord>,
    ) -> Result<FeatureRecord, AnalysisError>;

    /// Versions stamped on the records this backend produces
    fn versions(&self) -> SchemaVersions;

    /// Get the name of this extractor (for logging)
    fn name(&self) -> &'static str;
}

/// Extractor that never produces a record
///
/// Used when all features are expected to be in the cache already.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullExtractor;

impl FeatureExtractor for NullExtractor {
    fn extract(
        &self,
        track: &LibraryTrack,
        _previous: Option<&PartialRecord>,
    ) -> Result<FeatureRecord, AnalysisError> {
        Err(AnalysisError::unavailable(
            &track.path,
            "no extractor configured and no cached features",
        ))
    }

    fn versions(&self) -> SchemaVersions {
        SchemaVersions::new(ANALYZER_VERSION)
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

/// Tries each extractor in order and returns the first success
pub struct ChainExtractor {
    extractors: Vec<Arc<dyn FeatureExtractor>>,
}

impl ChainExtractor {
    pub fn new(extractors: Vec<Arc<dyn FeatureExtractor>>) -> Self {
        Self { extractors }
    }
}

impl FeatureExtractor for ChainExtractor {
    fn extract(
        &self,
        track: &LibraryTrack,
        previous: Option<&PartialRecord>,
    ) -> Result<FeatureRecord, AnalysisError> {
        let mut last_error = None;
        for extractor in &self.extractors {
            match extractor.extract(track, previous) {
                Ok(record) => return Ok(record),
                Err(e) => {
                    tracing::trace!("{} could not analyze {}: {}", extractor.name(), track.path.display(), e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| AnalysisError::unavailable(&track.path, "empty extractor chain")))
    }

    /// Versions of the first backend in the chain
    fn versions(&self) -> SchemaVersions {
        self.extractors
            .first()
            .map(|e| e.versions())
            .unwrap_or_else(|| SchemaVersions::new(ANALYZER_VERSION))
    }

    fn name(&self) -> &'static str {
        "chain"
    }
}

/// Extractor backend selectable from the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    /// Cache only
    #[default]
    Null,
    /// `<file>.features.json` sidecars
    Sidecar,
    /// Decode audio and measure loudness/energy
    Signal,
    /// Sidecar first, then signal
    Auto,
}

/// Build the extractor for `kind`
pub fn select(kind: ExtractorKind) -> Arc<dyn FeatureExtractor> {
    match kind {
        ExtractorKind::Null => Arc::new(NullExtractor),
        ExtractorKind::Sidecar => Arc::new(SidecarExtractor::new()),
        ExtractorKind::Signal => Arc::new(SignalExtractor::new()),
        ExtractorKind::Auto => Arc::new(ChainExtractor::new(vec![
            Arc::new(SidecarExtractor::new()),
            Arc::new(SignalExtractor::new()),
        ])),
    }
}
