//! Folder-based library
//!
//! Each immediate subdirectory of the root is a collection (scanned
//! recursively); audio files directly under the root form the
//! [`ROOT_COLLECTION`]. Tags are read with lofty (ID3v2, Vorbis comments,
//! AIFF chunks) to supply title, artist, genre, BPM and key.

use super::{write_sets_report, LibraryConnector, LibraryTrack};
use crate::error::{DjcurateError, Result};
use crate::key::CamelotKey;
use crate::sequence::SetsOutcome;
use lofty::{Accessor, ItemKey, Probe, TaggedFileExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Name of the collection made of files directly under the root
pub const ROOT_COLLECTION: &str = "root";

/// File extensions treated as audio (compared case-insensitively)
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "aiff", "aif"];

/// Library rooted at a directory on disk
#[derive(Debug, Clone)]
pub struct DirectoryLibrary {
    root: PathBuf,
    output: PathBuf,
}

impl DirectoryLibrary {
    /// Library reading from `root` and writing sets into `output`
    pub fn new(root: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output: output.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the sets for `collection` are written
    pub fn sets_path(&self, collection: &str) -> PathBuf {
        self.output.join(format!("{}.sets.json", collection))
    }

    fn collection_dir(&self, collection: &str) -> Result<(PathBuf, usize)> {
        if collection == ROOT_COLLECTION {
            return Ok((self.root.clone(), 1));
        }
        let mut components = Path::new(collection).components();
        let single = matches!(
            (components.next(), components.next()),
            (Some(std::path::Component::Normal(_)), None)
        );
        if !single {
            return Err(DjcurateError::library(&self.root, format!("invalid collection name '{}'", collection)));
        }
        let dir = self.root.join(collection);
        if !dir.is_dir() {
            return Err(DjcurateError::library(&dir, "collection directory does not exist"));
        }
        Ok((dir, usize::MAX))
    }
}

impl LibraryConnector for DirectoryLibrary {
    fn collections(&self) -> Result<Vec<String>> {
        if self.root.is_file() {
            return Ok(if is_audio_file(&self.root) {
                vec![ROOT_COLLECTION.to_string()]
            } else {
                Vec::new()
            });
        }
        if !self.root.is_dir() {
            return Err(DjcurateError::library(&self.root, "library root does not exist"));
        }

        let mut names = Vec::new();
        let mut root_has_audio = false;
        let entries = std::fs::read_dir(&self.root).map_err(|e| DjcurateError::library(&self.root, e.to_string()))?;
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.is_dir() {
                if scan(&path, usize::MAX).next().is_some() {
                    names.push(entry.file_name().to_string_lossy().into_owned());
                }
            } else if is_audio_file(&path) {
                root_has_audio = true;
            }
        }
        if root_has_audio {
            names.push(ROOT_COLLECTION.to_string());
        }
        names.sort();
        debug!("Found {} collections under {}", names.len(), self.root.display());
        Ok(names)
    }

    fn tracks(&self, collection: &str) -> Result<Vec<LibraryTrack>> {
        let files: Vec<PathBuf> = if self.root.is_file() && collection == ROOT_COLLECTION {
            vec![self.root.clone()]
        } else {
            let (dir, depth) = self.collection_dir(collection)?;
            scan(&dir, depth).collect()
        };

        let tracks: Vec<LibraryTrack> = files.into_iter().map(|path| read_track(&path)).collect();
        info!("Collection '{}': {} audio files", collection, tracks.len());
        if tracks.is_empty() {
            warn!("No supported audio files found in collection '{}'", collection);
        }
        Ok(tracks)
    }

    fn write_sets(&self, collection: &str, outcome: &SetsOutcome) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.output).map_err(|e| DjcurateError::output_error(&self.output, e))?;
        let path = self.sets_path(collection);
        write_sets_report(collection, outcome, &path)?;
        Ok(path)
    }
}

/// Audio files under `dir`, in file-name order
fn scan(dir: &Path, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    WalkDir::new(dir)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| is_audio_file(path))
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| AUDIO_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Build a library track from a file's tags
///
/// On error (corrupt tags, unreadable file) the track is returned with no
/// tag data.
fn read_track(path: &Path) -> LibraryTrack {
    let mut track = LibraryTrack::new(path);
    track.registered = true;
    if let Err(e) = read_tags(path, &mut track) {
        warn!("Failed to read tags from {}: {}", path.display(), e);
    }
    track
}

fn read_tags(path: &Path, track: &mut LibraryTrack) -> std::result::Result<(), lofty::error::LoftyError> {
    let tagged_file = Probe::open(path)?.read()?;
    let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
        debug!("No tags found in {}", path.display());
        return Ok(());
    };

    track.title = tag.title().map(|s| s.to_string());
    track.artist = tag.artist().map(|s| s.to_string());
    track.genre = tag.genre().map(|s| s.to_string());
    track.known_bpm = tag.get_string(&ItemKey::Bpm).and_then(parse_bpm);
    track.known_key = tag
        .get_string(&ItemKey::InitialKey)
        .and_then(|text| CamelotKey::parse(text).ok());
    Ok(())
}

/// Parse a BPM tag value ("124", "124.00", "124,5")
fn parse_bpm(text: &str) -> Option<f64> {
    text.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|bpm| bpm.is_finite() && *bpm > 0.0)
}
