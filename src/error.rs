//! Unified error types for djcurate
//!
//! Error strategy:
//! - Per-track errors (missing file, decode, extractor): recoverable, the
//!   track is reported and excluded, the batch continues
//! - Cache load errors: recovered by starting from an empty cache
//! - Cache save errors: the previous file stays intact, failure is reported
//! - Config errors: the offending value falls back to its default
//! - Sequencing dead ends: diagnostics only, never a hard failure

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Supported audio formats for helpful error messages
pub const SUPPORTED_FORMATS: &str = "MP3, WAV, FLAC, AIFF";

/// Per-track analysis failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error("File not found: '{0}'\n  Tip: Check the path exists and is accessible")]
    FileNotFound(PathBuf),

    #[error("Failed to decode audio file '{path}': {reason}\n  Supported formats: {SUPPORTED_FORMATS}")]
    Decode { path: PathBuf, reason: String },

    #[error("Unsupported audio format for '{path}': {format}\n  Supported formats: {SUPPORTED_FORMATS}")]
    Unsupported { path: PathBuf, format: String },

    #[error("Feature extraction failed for '{path}': {reason}")]
    Extractor { path: PathBuf, reason: String },

    #[error("No feature extractor could analyze '{path}': {reason}")]
    Unavailable { path: PathBuf, reason: String },
}

impl AnalysisError {
    /// Every analysis error is isolated to its track
    pub fn is_recoverable(&self) -> bool {
        true
    }

    /// Path of the track that failed
    pub fn path(&self) -> &Path {
        match self {
            AnalysisError::FileNotFound(path) => path,
            AnalysisError::Decode { path, .. }
            | AnalysisError::Unsupported { path, .. }
            | AnalysisError::Extractor { path, .. }
            | AnalysisError::Unavailable { path, .. } => path,
        }
    }

    pub fn decode(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        AnalysisError::Decode {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn extractor(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        AnalysisError::Extractor {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        AnalysisError::Unavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Analysis cache failure
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cannot access cache file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cache file '{path}' is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Cannot replace cache file '{path}': {source}\n  Tip: Check free disk space and write permissions; the previous cache was left untouched")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot lock cache file '{path}': {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Malformed configuration value
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },

    #[error("Invalid value for '{field}': {reason} (using default)")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// No candidate cleared the quality floor
///
/// Recorded and logged by the sequence builder; it never aborts a run.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
#[error("Dead end after '{current}': best candidate '{best_candidate}' scored {best_score:.1} (floor {floor:.1})")]
pub struct SequencingDeadEnd {
    pub current: String,
    pub best_candidate: String,
    pub best_score: f64,
    pub floor: f64,
}

/// Top-level error type for djcurate operations
#[derive(Debug, Error)]
pub enum DjcurateError {
    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Library error for '{path}': {reason}")]
    Library { path: PathBuf, reason: String },

    #[error("Cannot write output to '{path}': {reason}\n  Tip: Check write permissions for the output directory")]
    Output { path: PathBuf, reason: String },

    #[error("Failed to configure worker pool: {0}")]
    WorkerPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for djcurate operations
pub type Result<T> = std::result::Result<T, DjcurateError>;

impl DjcurateError {
    /// Returns true if the run can continue past this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, DjcurateError::Analysis(_) | DjcurateError::Config(_))
    }

    /// Create an output error, checking for common issues
    pub fn output_error(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        let reason = match err.kind() {
            std::io::ErrorKind::PermissionDenied => {
                format!("Permission denied. Check that you have write access to {}", path.display())
            }
            std::io::ErrorKind::NotFound => format!(
                "Directory does not exist: {}",
                path.parent()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            ),
            _ => err.to_string(),
        };
        DjcurateError::Output { path, reason }
    }

    pub fn library(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DjcurateError::Library {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_error_reports_path() {
        let err = AnalysisError::decode("/music/a.mp3", "truncated frame");
        assert_eq!(err.path(), Path::new("/music/a.mp3"));
        assert!(err.to_string().contains("truncated frame"));
    }

    #[test]
    fn test_output_error_permission_hint() {
        let err = DjcurateError::output_error(
            "/root/out/sets.json",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(err.to_string().contains("Permission denied"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_dead_end_display() {
        let dead_end = SequencingDeadEnd {
            current: "a".into(),
            best_candidate: "b".into(),
            best_score: -12.0,
            floor: 40.0,
        };
        assert!(dead_end.to_string().contains("-12.0"));
    }
}
