//! CLI argument parsing and configuration

use super::SequencingMode;
use crate::extract::ExtractorKind;
use crate::sequence::Preset;
use clap::Parser;
use std::path::PathBuf;

/// Default cache file name inside the output directory
pub const DEFAULT_CACHE_FILE: &str = "analysis-cache.json";

/// djcurate - Harmonic set sequencing for DJ libraries
///
/// Analyzes a folder-based library (each subfolder is a collection), caches
/// the per-track features, and orders every collection into playable sets
/// with smooth tempo, key and energy transitions.
#[derive(Parser, Debug)]
#[command(name = "djcurate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Library root (directory of collections, or a single file)
    #[arg(short, long, value_name = "PATH")]
    pub input: PathBuf,

    /// Output directory for set reports
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Analysis cache file (defaults to output/analysis-cache.json)
    #[arg(long, value_name = "FILE")]
    pub cache: Option<PathBuf>,

    /// TOML file with sequencing and scoring settings
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Sequencing mode (overrides the config file)
    #[arg(long, value_enum)]
    pub mode: Option<SequencingMode>,

    /// Set length preset (overrides the config file)
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// Feature extractor for tracks missing from the cache
    #[arg(long, value_enum, default_value_t = ExtractorKind::Null)]
    pub extractor: ExtractorKind,

    /// Number of worker threads (defaults to CPU count - 1)
    #[arg(short = 'j', long, value_name = "N")]
    pub threads: Option<usize>,

    /// Save the cache after this many new analyses
    #[arg(long, value_name = "N", default_value = "25")]
    pub checkpoint_every: usize,

    /// Sequence tracks that failed analysis using their tagged BPM
    #[arg(long, default_value = "false")]
    pub placeholders: bool,

    /// Only fill the cache; do not build sets
    #[arg(long, default_value = "false")]
    pub analyze_only: bool,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress progress bars)
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,
}

impl Cli {
    /// Get the effective cache file path
    pub fn cache_path(&self) -> PathBuf {
        self.cache
            .clone()
            .unwrap_or_else(|| self.output.join(DEFAULT_CACHE_FILE))
    }

    /// Get the log level based on verbosity flags
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
