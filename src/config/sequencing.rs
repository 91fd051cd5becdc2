//! Sequencing configuration
//!
//! Loaded from an optional TOML file. Every field has a default, so a file
//! only needs the values it changes. Malformed values are reset to their
//! defaults by [`SequencingConfig::sanitize`] instead of failing the run.

use crate::error::ConfigError;
use crate::phase::PhaseBands;
use crate::scoring::ScorerConfig;
use crate::sequence::{OptimizerConfig, PartitionConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// How the builder reacts when no candidate clears the quality floor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SequencingMode {
    /// Permissive: force weak links, park hopeless tracks at the end
    #[default]
    Live,
    /// Strict: only continuity-preserving weak links, otherwise close the run
    Boutique,
}

impl SequencingMode {
    pub fn is_strict(self) -> bool {
        self == SequencingMode::Boutique
    }
}

/// Everything the sequencing engine can be tuned with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencingConfig {
    pub mode: SequencingMode,
    /// Lowest transition score accepted without a dead end
    pub quality_floor: f64,
    /// Live mode: below this a dead end parks a track instead of forcing it
    pub park_threshold: f64,
    /// Largest BPM step that still counts as continuous
    pub max_bpm_delta: f64,
    /// Boutique mode: smallest pool worth starting a new run from
    pub min_run_tracks: usize,
    /// Key compatibility below this triggers a backtracking attempt
    pub backtrack_key_threshold: f64,
    /// Key continuity gain a backtracking insert must achieve
    pub backtrack_min_gain: f64,
    /// Tracks shorter than this are not sequenced
    pub min_track_secs: f64,
    /// Tracks longer than this are not sequenced
    pub max_track_secs: f64,
    pub scorer: ScorerConfig,
    pub bands: PhaseBands,
    pub partition: PartitionConfig,
    pub optimizer: OptimizerConfig,
}

impl Default for SequencingConfig {
    fn default() -> Self {
        Self {
            mode: SequencingMode::default(),
            quality_floor: 40.0,
            park_threshold: -150.0,
            max_bpm_delta: 8.0,
            min_run_tracks: 3,
            backtrack_key_threshold: 85.0,
            backtrack_min_gain: 15.0,
            min_track_secs: 30.0,
            max_track_secs: 600.0,
            scorer: ScorerConfig::default(),
            bands: PhaseBands::default(),
            partition: PartitionConfig::default(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl SequencingConfig {
    /// Parse a TOML config file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    /// Load and sanitize a config file, falling back to defaults on any error
    pub fn load(path: &Path) -> Self {
        let config = match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!("{}; using default sequencing settings", e);
                return Self::default();
            }
        };
        let (config, problems) = config.sanitize();
        for problem in &problems {
            warn!("{}", problem);
        }
        config
    }

    /// Reset every malformed field to its default
    ///
    /// Returns the cleaned config and one error per field that was reset.
    pub fn sanitize(mut self) -> (Self, Vec<ConfigError>) {
        let defaults = Self::default();
        let mut problems = Vec::new();

        let mut check = |field: &'static str, value: &mut f64, default: f64, ok: bool| {
            if !ok || !value.is_finite() {
                problems.push(ConfigError::invalid(
                    field,
                    format!("{} is out of range", value),
                ));
                *value = default;
            }
        };

        let floor = self.quality_floor;
        check("quality_floor", &mut self.quality_floor, defaults.quality_floor, true);
        let park_ok = self.park_threshold < floor;
        check("park_threshold", &mut self.park_threshold, defaults.park_threshold, park_ok);
        let delta_ok = self.max_bpm_delta > 0.0;
        check("max_bpm_delta", &mut self.max_bpm_delta, defaults.max_bpm_delta, delta_ok);
        let key_ok = (0.0..=100.0).contains(&self.backtrack_key_threshold);
        check(
            "backtrack_key_threshold",
            &mut self.backtrack_key_threshold,
            defaults.backtrack_key_threshold,
            key_ok,
        );
        let gain_ok = self.backtrack_min_gain >= 0.0;
        check("backtrack_min_gain", &mut self.backtrack_min_gain, defaults.backtrack_min_gain, gain_ok);
        let min_ok = self.min_track_secs >= 0.0;
        check("min_track_secs", &mut self.min_track_secs, defaults.min_track_secs, min_ok);
        let max_ok = self.max_track_secs > self.min_track_secs;
        check("max_track_secs", &mut self.max_track_secs, defaults.max_track_secs, max_ok);

        for (field, weight) in self.scorer.weights.fields_mut() {
            if !weight.is_finite() || *weight < 0.0 {
                problems.push(ConfigError::invalid(field, format!("weight {} must be >= 0", weight)));
                *weight = 1.0;
            }
        }

        let scorer_defaults = ScorerConfig::default();
        let lufs = [
            self.scorer.lufs_match_db,
            self.scorer.lufs_mild_db,
            self.scorer.lufs_warn_db,
            self.scorer.lufs_max_db,
        ];
        if !ascending_positive(&lufs) {
            problems.push(ConfigError::invalid(
                "scorer.lufs_*",
                "loudness thresholds must be positive and ascending",
            ));
            self.scorer.lufs_match_db = scorer_defaults.lufs_match_db;
            self.scorer.lufs_mild_db = scorer_defaults.lufs_mild_db;
            self.scorer.lufs_warn_db = scorer_defaults.lufs_warn_db;
            self.scorer.lufs_max_db = scorer_defaults.lufs_max_db;
        }
        let dynamics = [
            self.scorer.dynamic_range_close_db,
            self.scorer.dynamic_range_near_db,
            self.scorer.dynamic_range_far_db,
        ];
        if !ascending_positive(&dynamics) {
            problems.push(ConfigError::invalid(
                "scorer.dynamic_range_*",
                "dynamic range thresholds must be positive and ascending",
            ));
            self.scorer.dynamic_range_close_db = scorer_defaults.dynamic_range_close_db;
            self.scorer.dynamic_range_near_db = scorer_defaults.dynamic_range_near_db;
            self.scorer.dynamic_range_far_db = scorer_defaults.dynamic_range_far_db;
        }
        let overlap = [self.scorer.vocal_overlap_moderate, self.scorer.vocal_overlap_heavy];
        if !ascending_positive(&overlap) || self.scorer.vocal_overlap_heavy > 1.0 {
            problems.push(ConfigError::invalid(
                "scorer.vocal_overlap_*",
                "vocal overlap thresholds must be ascending ratios",
            ));
            self.scorer.vocal_overlap_moderate = scorer_defaults.vocal_overlap_moderate;
            self.scorer.vocal_overlap_heavy = scorer_defaults.vocal_overlap_heavy;
        }
        if !(0.0..=1.0).contains(&self.scorer.genre_min_confidence) {
            problems.push(ConfigError::invalid(
                "scorer.genre_min_confidence",
                "must be within 0..=1",
            ));
            self.scorer.genre_min_confidence = scorer_defaults.genre_min_confidence;
        }

        if !self.bands.is_valid() {
            problems.push(ConfigError::invalid(
                "bands",
                "every phase band needs min < max <= 100",
            ));
            self.bands = PhaseBands::default();
        }

        let partition = &mut self.partition;
        let partition_defaults = PartitionConfig::default();
        if !partition.target_minutes.is_finite() || partition.target_minutes <= 0.0 {
            problems.push(ConfigError::invalid("partition.target_minutes", "must be > 0"));
            partition.target_minutes = partition_defaults.target_minutes;
        }
        if partition.min_songs == 0 || partition.min_songs > partition.max_songs {
            problems.push(ConfigError::invalid(
                "partition.min_songs",
                format!(
                    "[{}, {}] is not a valid song range",
                    partition.min_songs, partition.max_songs
                ),
            ));
            partition.min_songs = partition_defaults.min_songs;
            partition.max_songs = partition_defaults.max_songs;
        }
        if !partition.max_bpm_span.is_finite() || partition.max_bpm_span <= 0.0 {
            problems.push(ConfigError::invalid("partition.max_bpm_span", "must be > 0"));
            partition.max_bpm_span = partition_defaults.max_bpm_span;
        }
        if !partition.bucket_merge_gap.is_finite() || partition.bucket_merge_gap < 0.0 {
            problems.push(ConfigError::invalid("partition.bucket_merge_gap", "must be >= 0"));
            partition.bucket_merge_gap = partition_defaults.bucket_merge_gap;
        }

        let optimizer_defaults = OptimizerConfig::default();
        if self.optimizer.window < 3 {
            problems.push(ConfigError::invalid("optimizer.window", "must be at least 3"));
            self.optimizer.window = optimizer_defaults.window;
        }
        if self.optimizer.max_move == 0 {
            problems.push(ConfigError::invalid("optimizer.max_move", "must be at least 1"));
            self.optimizer.max_move = optimizer_defaults.max_move;
        }
        if !self.optimizer.min_gain.is_finite() || self.optimizer.min_gain < 0.0 {
            problems.push(ConfigError::invalid("optimizer.min_gain", "must be >= 0"));
            self.optimizer.min_gain = optimizer_defaults.min_gain;
        }

        (self, problems)
    }
}

fn ascending_positive(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite() && *v > 0.0) && values.windows(2).all(|w| w[0] <= w[1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_clean() {
        let (config, problems) = SequencingConfig::default().sanitize();
        assert!(problems.is_empty(), "{:?}", problems);
        assert_eq!(config, SequencingConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: SequencingConfig = toml::from_str(
            r#"
            mode = "boutique"
            quality_floor = 55.0

            [partition]
            target_minutes = 60.0

            [scorer.weights]
            tempo = 2.0
            "#,
        )
        .unwrap();
        assert_eq!(config.mode, SequencingMode::Boutique);
        assert_eq!(config.quality_floor, 55.0);
        assert_eq!(config.partition.target_minutes, 60.0);
        assert_eq!(config.partition.max_songs, 40);
        assert_eq!(config.scorer.weights.tempo, 2.0);
        assert_eq!(config.scorer.weights.energy, 1.0);
    }

    #[test]
    fn test_sanitize_resets_each_bad_field() {
        let mut config = SequencingConfig::default();
        config.max_bpm_delta = -3.0;
        config.scorer.weights.genre = f64::NAN;
        config.scorer.lufs_warn_db = 1.0;
        config.partition.min_songs = 50;
        config.bands.peak.min = 95;
        config.optimizer.window = 1;

        let (clean, problems) = config.sanitize();
        assert_eq!(problems.len(), 6, "{:?}", problems);
        assert_eq!(clean.max_bpm_delta, 8.0);
        assert_eq!(clean.scorer.weights.genre, 1.0);
        assert_eq!(clean.scorer.lufs_warn_db, 4.5);
        assert_eq!(clean.partition.min_songs, 25);
        assert_eq!(clean.bands, PhaseBands::default());
        assert_eq!(clean.optimizer.window, 10);
        assert!(problems
            .iter()
            .any(|p| matches!(p, ConfigError::Invalid { field: "max_bpm_delta", .. })));
    }

    #[test]
    fn test_park_threshold_must_sit_below_floor() {
        let config = SequencingConfig {
            park_threshold: 60.0,
            ..SequencingConfig::default()
        };
        let (clean, problems) = config.sanitize();
        assert_eq!(problems.len(), 1);
        assert_eq!(clean.park_threshold, -150.0);
    }

    #[test]
    fn test_load_falls_back_on_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "quality_floor = [not toml").unwrap();
        assert_eq!(SequencingConfig::load(file.path()), SequencingConfig::default());

        let missing = SequencingConfig::from_file(Path::new("/nonexistent/djcurate.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
