//! Signal-level extraction
//!
//! Decodes the track and measures what can be measured cheaply and
//! reliably: duration, integrated loudness, dynamic range and a
//! loudness-derived energy rating. Tempo and key come from the library
//! tags (or a still-fresh cached record); without a tempo the track
//! cannot be sequenced and extraction reports it as unavailable.

use super::{
    apply_library_tags, FeatureExtractor, FeatureGroup, PartialRecord, SchemaVersions, ANALYZER_VERSION,
    TAG_BPM_CONFIDENCE,
};
use crate::audio;
use crate::error::AnalysisError;
use crate::library::LibraryTrack;
use crate::types::FeatureRecord;
use tracing::debug;

/// Model version of the loudness/energy measurement
pub const ENERGY_MODEL_VERSION: &str = "rms-1";

/// Measurement block length in seconds
const BLOCK_SECS: f64 = 0.4;

/// Blocks quieter than this are ignored (absolute gate)
const SILENCE_GATE_DB: f64 = -70.0;

/// Loudness range mapped onto the energy scale
const QUIET_LUFS: f64 = -30.0;
const LOUD_LUFS: f64 = -6.0;

/// Dynamic range at or above which a track gets no compression bonus
const OPEN_DYNAMICS_DB: f64 = 12.0;

/// Loudness summary of a decoded track
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Loudness {
    /// Approximate integrated loudness (unweighted)
    pub lufs: f64,
    /// Spread between loud (p95) and quiet (p10) blocks
    pub dynamic_range_db: f64,
}

impl Loudness {
    /// Energy rating 0-100: loudness drives most of it, heavy
    /// compression adds up to 15 points
    pub fn energy(&self) -> u8 {
        let level = ((self.lufs - QUIET_LUFS) / (LOUD_LUFS - QUIET_LUFS)).clamp(0.0, 1.0);
        let squash = ((OPEN_DYNAMICS_DB - self.dynamic_range_db) / OPEN_DYNAMICS_DB).clamp(0.0, 1.0);
        (level * 85.0 + squash * 15.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Loudness of a track from the mean power of its blocks
pub fn measure_loudness(block_powers: &[f64]) -> Loudness {
    let mut powers: Vec<f64> = block_powers
        .iter()
        .copied()
        .filter(|&power| to_db(power) > SILENCE_GATE_DB)
        .collect();

    if powers.is_empty() {
        return Loudness {
            lufs: SILENCE_GATE_DB,
            dynamic_range_db: 0.0,
        };
    }

    let mean_power = powers.iter().sum::<f64>() / powers.len() as f64;
    // -0.691 dB aligns a full-scale sine with the LUFS scale
    let lufs = to_db(mean_power) - 0.691;

    powers.sort_by(|a, b| a.total_cmp(b));
    let dynamic_range_db = (to_db(percentile(&powers, 95.0)) - to_db(percentile(&powers, 10.0))).max(0.0);

    Loudness { lufs, dynamic_range_db }
}

fn to_db(power: f64) -> f64 {
    if power <= 0.0 {
        return f64::NEG_INFINITY;
    }
    10.0 * power.log10()
}

/// Nearest-rank percentile of sorted values
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = ((pct / 100.0) * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

#[derive(Debug, Clone)]
pub struct SignalExtractor {
    versions: SchemaVersions,
}

impl Default for SignalExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalExtractor {
    pub fn new() -> Self {
        Self {
            versions: SchemaVersions::new(ANALYZER_VERSION).with_model(FeatureGroup::Energy, ENERGY_MODEL_VERSION),
        }
    }
}

impl FeatureExtractor for SignalExtractor {
    fn extract(
        &self,
        track: &LibraryTrack,
        previous: Option<&PartialRecord>,
    ) -> Result<FeatureRecord, AnalysisError> {
        let mut record = match previous {
            Some(partial) => partial.fresh_base(),
            None => FeatureRecord::new(String::new(), &track.path),
        };
        record.source_path = track.path.clone();

        if !record.is_usable() {
            let bpm = track
                .usable_bpm()
                .ok_or_else(|| AnalysisError::unavailable(&track.path, "no tempo in tags and no tempo detector"))?;
            record.bpm = bpm;
            record.bpm_confidence = TAG_BPM_CONFIDENCE;
        }

        let blocks = audio::measure_blocks(&track.path, BLOCK_SECS)?;
        let loudness = measure_loudness(&blocks.powers);
        record.duration_secs = blocks.duration();
        record.lufs = Some(loudness.lufs);
        record.dynamic_range_db = Some(loudness.dynamic_range_db);
        record.energy = loudness.energy();

        apply_library_tags(&mut record, track);
        self.versions.stamp(&mut record);
        record
            .validate()
            .map_err(|defect| AnalysisError::extractor(&track.path, defect.to_string()))?;

        debug!(
            "{}: {:.1}s, {:.1} LUFS, DR {:.1} dB, energy {}",
            track.path.display(),
            record.duration_secs,
            loudness.lufs,
            loudness.dynamic_range_db,
            record.energy
        );
        Ok(record)
    }

    fn versions(&self) -> SchemaVersions {
        self.versions.clone()
    }

    fn name(&self) -> &'static str {
        "signal"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::BlockMeter;
    use std::f32::consts::PI;

    fn sine(amplitude: f32, secs: f32, sample_rate: u32) -> Vec<f32> {
        (0..(secs * sample_rate as f32) as usize)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / sample_rate as f32).sin() * amplitude)
            .collect()
    }

    fn blocks(samples: &[f32]) -> Vec<f64> {
        let mut meter = BlockMeter::for_rate(22050, BLOCK_SECS);
        meter.extend(samples.iter().copied());
        meter.finish().powers
    }

    #[test]
    fn test_full_scale_sine_is_near_zero_lufs() {
        let loudness = measure_loudness(&blocks(&sine(1.0, 2.0, 22050)));
        // -3.01 dB RMS minus the 0.691 offset
        assert!((loudness.lufs + 3.7).abs() < 0.1, "lufs {}", loudness.lufs);
        assert!(loudness.dynamic_range_db < 0.5);
    }

    #[test]
    fn test_louder_is_more_energetic() {
        let loud = measure_loudness(&blocks(&sine(0.5, 2.0, 22050)));
        let quiet = measure_loudness(&blocks(&sine(0.01, 2.0, 22050)));
        assert!(loud.lufs > quiet.lufs);
        assert!(loud.energy() > quiet.energy());
    }

    #[test]
    fn test_silence_is_gated() {
        let loudness = measure_loudness(&blocks(&[0.0; 44100]));
        assert_eq!(loudness.lufs, SILENCE_GATE_DB);
        assert_eq!(loudness.energy(), 15);
    }

    #[test]
    fn test_dynamic_range_spans_quiet_and_loud_blocks() {
        let mut samples = sine(0.05, 2.0, 22050);
        samples.extend(sine(0.8, 2.0, 22050));
        let loudness = measure_loudness(&blocks(&samples));
        // 20 * log10(0.8 / 0.05) = 24 dB
        assert!((loudness.dynamic_range_db - 24.1).abs() < 0.5, "dr {}", loudness.dynamic_range_db);
    }

    #[test]
    fn test_energy_bounds() {
        let loud = Loudness {
            lufs: 0.0,
            dynamic_range_db: 0.0,
        };
        let quiet = Loudness {
            lufs: -60.0,
            dynamic_range_db: 30.0,
        };
        assert_eq!(loud.energy(), 100);
        assert_eq!(quiet.energy(), 0);
    }

    #[test]
    fn test_missing_tempo_is_unavailable() {
        let track = LibraryTrack::new("/nonexistent/a.wav");
        assert!(matches!(
            SignalExtractor::new().extract(&track, None),
            Err(AnalysisError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_fresh_tempo_is_reused_from_cache() {
        let mut cached = FeatureRecord::new("fp", "/nonexistent/a.wav");
        cached.bpm = 126.0;
        let partial = PartialRecord {
            record: cached,
            stale: [FeatureGroup::Energy].into_iter().collect(),
        };
        // tempo is fresh, so extraction proceeds to decoding
        let err = SignalExtractor::new()
            .extract(&LibraryTrack::new("/nonexistent/a.wav"), Some(&partial))
            .unwrap_err();
        assert!(matches!(err, AnalysisError::FileNotFound(_)));
    }
}
