//! Runtime configuration settings

use super::{Cli, SequencingConfig};
use crate::extract::ExtractorKind;
use std::path::PathBuf;
use tracing::warn;

/// Runtime settings for a djcurate run
#[derive(Debug, Clone)]
pub struct Settings {
    /// Library root
    pub input: PathBuf,
    /// Output directory for set reports
    pub output: PathBuf,
    /// Analysis cache file
    pub cache_path: PathBuf,
    /// Extractor for tracks missing from the cache
    pub extractor: ExtractorKind,
    /// Number of analysis worker threads
    pub workers: usize,
    /// Cache checkpoint interval in records
    pub checkpoint_every: usize,
    /// Sequence failed tracks from their tagged BPM
    pub degraded_placeholders: bool,
    /// Stop after analysis
    pub analyze_only: bool,
    /// Show progress bars
    pub show_progress: bool,
    pub sequencing: SequencingConfig,
}

impl Settings {
    /// Create settings from CLI arguments
    ///
    /// The config file is loaded and sanitized here; CLI flags override it.
    pub fn from_cli(cli: &Cli) -> Self {
        let mut sequencing = match &cli.config {
            Some(path) => SequencingConfig::load(path),
            None => SequencingConfig::default(),
        };
        if let Some(mode) = cli.mode {
            sequencing.mode = mode;
        }
        if let Some(preset) = cli.preset {
            sequencing.partition = sequencing.partition.with_preset(preset);
        }

        let workers = match cli.threads {
            Some(0) => {
                warn!("--threads 0 is not usable, using 1 worker");
                1
            }
            Some(n) => n,
            None => default_workers(),
        };

        Self {
            input: cli.input.clone(),
            output: cli.output.clone(),
            cache_path: cli.cache_path(),
            extractor: cli.extractor,
            workers,
            checkpoint_every: cli.checkpoint_every,
            degraded_placeholders: cli.placeholders,
            analyze_only: cli.analyze_only,
            show_progress: !cli.quiet,
            sequencing,
        }
    }
}

/// One core is left for the cache writer and the caller
fn default_workers() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input: PathBuf::from("."),
            output: PathBuf::from("./output"),
            cache_path: PathBuf::from("./output").join(super::cli::DEFAULT_CACHE_FILE),
            extractor: ExtractorKind::default(),
            workers: default_workers(),
            checkpoint_every: 25,
            degraded_placeholders: false,
            analyze_only: false,
            show_progress: true,
            sequencing: SequencingConfig::default(),
        }
    }
}
