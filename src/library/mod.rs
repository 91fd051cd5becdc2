//! Music library access
//!
//! A [`LibraryConnector`] lists collections, yields their tracks with
//! whatever the library already knows about them (tags, tempo, key), and
//! receives the finished sets.

mod directory;
mod report;

pub use directory::{DirectoryLibrary, AUDIO_EXTENSIONS, ROOT_COLLECTION};
pub use report::{read_sets_report, write_sets_report, ReportMetadata, SetsReport};

use crate::error::Result;
use crate::key::CamelotKey;
use crate::sequence::SetsOutcome;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A track as the library knows it, before analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryTrack {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_bpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_key: Option<CamelotKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    /// Whether the library itself lists this track
    #[serde(default)]
    pub registered: bool,
}

impl LibraryTrack {
    /// An unregistered track with nothing known about it
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            known_bpm: None,
            known_key: None,
            title: None,
            artist: None,
            genre: None,
            registered: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Known BPM if it is a usable tempo
    pub fn usable_bpm(&self) -> Option<f64> {
        self.known_bpm.filter(|bpm| bpm.is_finite() && *bpm > 0.0)
    }
}

/// Source of tracks and destination for sets
pub trait LibraryConnector {
    /// Collection names, sorted
    fn collections(&self) -> Result<Vec<String>>;

    /// Tracks in `collection`, in a stable order
    fn tracks(&self, collection: &str) -> Result<Vec<LibraryTrack>>;

    /// Persist the sets built for `collection`, returning where they went
    fn write_sets(&self, collection: &str, outcome: &SetsOutcome) -> Result<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_bpm() {
        let mut track = LibraryTrack::new("/music/a.mp3");
        assert_eq!(track.usable_bpm(), None);
        track.known_bpm = Some(0.0);
        assert_eq!(track.usable_bpm(), None);
        track.known_bpm = Some(f64::NAN);
        assert_eq!(track.usable_bpm(), None);
        track.known_bpm = Some(124.0);
        assert_eq!(track.usable_bpm(), Some(124.0));
        assert!(!track.registered);
    }
}
