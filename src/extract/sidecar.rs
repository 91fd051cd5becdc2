//! Sidecar feature files
//!
//! External analyzers drop a `<file>.features.json` next to each track,
//! e.g. `Track.mp3.features.json`. The sidecar holds a feature record;
//! identity fields may be omitted and are filled in from the track.

use super::{apply_library_tags, FeatureExtractor, PartialRecord, SchemaVersions, ANALYZER_VERSION};
use crate::error::AnalysisError;
use crate::library::LibraryTrack;
use crate::types::FeatureRecord;
use serde_json::{json, Map, Value};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sidecar location for an audio file
pub fn sidecar_path(audio: &Path) -> PathBuf {
    let mut name = OsString::from(audio.as_os_str());
    name.push(".features.json");
    PathBuf::from(name)
}

#[derive(Debug, Default, Clone)]
pub struct SidecarExtractor {
    versions: SchemaVersions,
}

impl SidecarExtractor {
    pub fn new() -> Self {
        Self {
            versions: SchemaVersions::new(ANALYZER_VERSION),
        }
    }

    /// Sidecars stamped with explicit model versions
    pub fn with_versions(versions: SchemaVersions) -> Self {
        Self { versions }
    }

    fn read(&self, track: &LibraryTrack) -> Result<FeatureRecord, AnalysisError> {
        let path = sidecar_path(&track.path);
        let text = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AnalysisError::unavailable(&track.path, "no sidecar feature file"),
            _ => AnalysisError::extractor(&track.path, format!("cannot read {}: {}", path.display(), e)),
        })?;

        let mut value: Value = serde_json::from_str(&text)
            .map_err(|e| AnalysisError::extractor(&track.path, format!("malformed sidecar: {}", e)))?;
        let object = value
            .as_object_mut()
            .ok_or_else(|| AnalysisError::extractor(&track.path, "sidecar is not a JSON object"))?;
        fill_identity(object, track);

        serde_json::from_value(value)
            .map_err(|e| AnalysisError::extractor(&track.path, format!("malformed sidecar: {}", e)))
    }
}

/// Defaults for fields a sidecar may leave out
fn fill_identity(object: &mut Map<String, Value>, track: &LibraryTrack) {
    object.entry("fingerprint").or_insert_with(|| json!(""));
    object
        .entry("source_path")
        .or_insert_with(|| json!(track.path.to_string_lossy()));
    object.entry("duration_secs").or_insert_with(|| json!(0.0));
    object.entry("energy").or_insert_with(|| json!(50));
    object.entry("analyzer_version").or_insert_with(|| json!(""));
    if let Some(bpm) = track.usable_bpm() {
        object.entry("bpm").or_insert_with(|| json!(bpm));
    }
    object.entry("bpm_confidence").or_insert_with(|| json!(0.5));
}

impl FeatureExtractor for SidecarExtractor {
    fn extract(
        &self,
        track: &LibraryTrack,
        _previous: Option<&PartialRecord>,
    ) -> Result<FeatureRecord, AnalysisError> {
        let mut record = self.read(track)?;
        record.source_path = track.path.clone();
        apply_library_tags(&mut record, track);
        self.versions.stamp(&mut record);

        record
            .validate()
            .map_err(|defect| AnalysisError::extractor(&track.path, defect.to_string()))?;
        debug!("Read sidecar features for {}", track.path.display());
        Ok(record)
    }

    fn versions(&self) -> SchemaVersions {
        self.versions.clone()
    }

    fn name(&self) -> &'static str {
        "sidecar"
    }
}
