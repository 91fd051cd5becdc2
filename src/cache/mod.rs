//! Persistent analysis cache
//!
//! Maps track fingerprints to the feature records computed for them, so a
//! library is only analyzed once. The on-disk format is a single JSON
//! object `fingerprint -> CacheEntry`.
//!
//! Durability rules:
//! - Loading takes a shared advisory lock on the sibling `<cache>.lock`
//!   file; a missing or corrupt cache loads as empty
//! - Saving takes the exclusive lock, re-reads the file and merges this
//!   handle's new entries over it, so concurrent writers lose nothing
//! - The merged map is written to a temp file in the same directory,
//!   fsynced, then renamed over the cache. The previous file is copied to
//!   `<cache>.bak` first when possible. An interrupted save leaves the
//!   previous cache untouched.
//! - Entries whose versions no longer match are reported as misses but
//!   never deleted

mod fingerprint;

pub use fingerprint::fingerprint;

use crate::error::CacheError;
use crate::extract::{FeatureGroup, PartialRecord, SchemaVersions};
use crate::types::{FeatureRecord, FileMetadata};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// One cached analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    #[serde(default)]
    pub file_metadata: Option<FileMetadata>,
    pub analyzer_version: String,
    #[serde(default)]
    pub model_versions: BTreeMap<String, String>,
    pub feature_record: FeatureRecord,
    pub timestamp: DateTime<Utc>,
}

/// Why an entry can or cannot be served
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryValidity {
    Valid,
    AnalyzerMismatch { cached: String, current: String },
    FileChanged,
    /// Usable as a starting point; these groups need recomputing
    StaleModels(BTreeSet<FeatureGroup>),
}

/// Result of a cache lookup
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(FeatureRecord),
    Stale(PartialRecord),
    Miss,
}

#[derive(Default)]
struct CacheState {
    entries: BTreeMap<String, CacheEntry>,
    /// Fingerprints written since the last save, with the generation of the write
    dirty: BTreeMap<String, u64>,
    generation: u64,
}

/// Thread-safe handle on a cache file
pub struct AnalysisCache {
    path: PathBuf,
    versions: SchemaVersions,
    state: RwLock<CacheState>,
}

impl AnalysisCache {
    /// Load the cache at `path`, starting empty if it is missing or unreadable
    pub fn open(path: impl Into<PathBuf>, versions: SchemaVersions) -> Self {
        let path = path.into();
        let entries = match load_shared(&path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("{}; starting with an empty cache", e);
                BTreeMap::new()
            }
        };
        info!("Loaded {} cached analyses from {}", entries.len(), path.display());

        Self {
            path,
            versions,
            state: RwLock::new(CacheState {
                entries,
                ..CacheState::default()
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn versions(&self) -> &SchemaVersions {
        &self.versions
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries not yet saved
    pub fn pending(&self) -> usize {
        self.state.read().dirty.len()
    }

    /// Raw entry, regardless of validity
    pub fn entry(&self, fingerprint: &str) -> Option<CacheEntry> {
        self.state.read().entries.get(fingerprint).cloned()
    }

    /// Record for `fingerprint` if it was produced by the current versions
    pub fn get(&self, fingerprint: &str) -> Option<FeatureRecord> {
        match self.lookup(fingerprint, None) {
            CacheLookup::Hit(record) => Some(record),
            _ => None,
        }
    }

    /// Like [`get`](Self::get), also requiring the file to be unchanged
    pub fn get_checked(&self, fingerprint: &str, metadata: &FileMetadata) -> Option<FeatureRecord> {
        match self.lookup(fingerprint, Some(metadata)) {
            CacheLookup::Hit(record) => Some(record),
            _ => None,
        }
    }

    pub fn lookup(&self, fingerprint: &str, metadata: Option<&FileMetadata>) -> CacheLookup {
        let state = self.state.read();
        let Some(entry) = state.entries.get(fingerprint) else {
            return CacheLookup::Miss;
        };
        match self.validate(entry, metadata) {
            EntryValidity::Valid => CacheLookup::Hit(entry.feature_record.clone()),
            EntryValidity::StaleModels(stale) => CacheLookup::Stale(PartialRecord {
                record: entry.feature_record.clone(),
                stale,
            }),
            other => {
                debug!("Cache entry {} not served: {:?}", fingerprint, other);
                CacheLookup::Miss
            }
        }
    }

    pub fn validate(&self, entry: &CacheEntry, metadata: Option<&FileMetadata>) -> EntryValidity {
        if entry.analyzer_version != self.versions.analyzer_version {
            return EntryValidity::AnalyzerMismatch {
                cached: entry.analyzer_version.clone(),
                current: self.versions.analyzer_version.clone(),
            };
        }
        if let (Some(current), Some(cached)) = (metadata, entry.file_metadata.as_ref()) {
            if current != cached {
                return EntryValidity::FileChanged;
            }
        }
        let stale = self.versions.stale_groups(&entry.model_versions);
        if stale.is_empty() {
            EntryValidity::Valid
        } else {
            EntryValidity::StaleModels(stale)
        }
    }

    pub fn is_valid(&self, entry: &CacheEntry, metadata: Option<&FileMetadata>) -> bool {
        self.validate(entry, metadata) == EntryValidity::Valid
    }

    /// Store a record under the current versions; persisted on the next save
    pub fn put(&self, fingerprint: impl Into<String>, record: FeatureRecord, metadata: Option<FileMetadata>) {
        let fingerprint = fingerprint.into();
        let entry = CacheEntry {
            fingerprint: fingerprint.clone(),
            file_metadata: metadata,
            analyzer_version: self.versions.analyzer_version.clone(),
            model_versions: self.versions.model_versions.clone(),
            feature_record: record,
            timestamp: Utc::now(),
        };

        let mut state = self.state.write();
        state.generation += 1;
        let generation = state.generation;
        state.dirty.insert(fingerprint.clone(), generation);
        state.entries.insert(fingerprint, entry);
    }

    /// Merge new entries into the cache file
    pub fn save(&self) -> Result<(), CacheError> {
        if self.pending() == 0 {
            debug!("No new analyses to save");
            return Ok(());
        }
        self.stage()?.commit()
    }

    /// Write the merged cache to a temp file without replacing the cache yet
    ///
    /// The exclusive lock is held until the returned save is committed or dropped.
    /// Dropping it removes the temp file and leaves the cache untouched.
    pub fn stage(&self) -> Result<StagedSave<'_>, CacheError> {
        let dir = parent_dir(&self.path);
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let lock = open_lock(&self.path)?;
        FileExt::lock_exclusive(&lock).map_err(|source| CacheError::Lock {
            path: sibling(&self.path, ".lock"),
            source,
        })?;

        // only an unparseable file is replaced; a failed read keeps it
        let mut merged = match read_entries(&self.path) {
            Ok(entries) => entries,
            Err(e @ CacheError::Corrupt { .. }) => {
                warn!("{}; it will be replaced", e);
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };

        let staged: Vec<(String, u64)> = {
            let state = self.state.read();
            for fingerprint in state.dirty.keys() {
                if let Some(entry) = state.entries.get(fingerprint) {
                    merged.insert(fingerprint.clone(), entry.clone());
                }
            }
            state.dirty.iter().map(|(k, g)| (k.clone(), *g)).collect()
        };

        let mut temp = NamedTempFile::new_in(&dir).map_err(|e| CacheError::io(&dir, e))?;
        let temp_path = temp.path().to_path_buf();
        {
            let mut writer = BufWriter::new(temp.as_file_mut());
            serde_json::to_writer(&mut writer, &merged)?;
            writer.flush().map_err(|e| CacheError::io(&temp_path, e))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| CacheError::io(&temp_path, e))?;

        Ok(StagedSave {
            cache: self,
            temp,
            merged,
            staged,
            lock,
        })
    }
}

/// A fully written temp file waiting to replace the cache
pub struct StagedSave<'a> {
    cache: &'a AnalysisCache,
    temp: NamedTempFile,
    merged: BTreeMap<String, CacheEntry>,
    staged: Vec<(String, u64)>,
    lock: File,
}

impl StagedSave<'_> {
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Atomically replace the cache file
    pub fn commit(self) -> Result<(), CacheError> {
        let StagedSave {
            cache,
            temp,
            merged,
            staged,
            lock,
        } = self;
        let destination = &cache.path;

        if destination.exists() {
            let backup = sibling(destination, ".bak");
            if let Err(e) = fs::copy(destination, &backup) {
                debug!("Could not refresh cache backup {}: {}", backup.display(), e);
            }
        }

        // On failure the temp file is removed when the error is dropped
        temp.persist(destination).map_err(|e| CacheError::Persist {
            path: destination.clone(),
            source: e.error,
        })?;
        release(&lock, destination);

        let written = merged.len();
        let mut state = cache.state.write();
        for (fingerprint, generation) in &staged {
            if state.dirty.get(fingerprint) == Some(generation) {
                state.dirty.remove(fingerprint);
            }
        }
        // pick up entries other writers saved since we loaded
        for (fingerprint, entry) in merged {
            state.entries.entry(fingerprint).or_insert(entry);
        }

        info!("Saved {} cached analyses to {}", written, destination.display());
        Ok(())
    }
}

fn load_shared(path: &Path) -> Result<BTreeMap<String, CacheEntry>, CacheError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let lock = open_lock(path)?;
    FileExt::lock_shared(&lock).map_err(|source| CacheError::Lock {
        path: sibling(path, ".lock"),
        source,
    })?;
    let entries = read_entries(path);
    release(&lock, path);
    entries
}

/// Unlock early; closing the file would release the lock anyway
fn release(lock: &File, path: &Path) {
    if let Err(e) = FileExt::unlock(lock) {
        warn!("Could not release the lock on {}: {}", path.display(), e);
    }
}

fn read_entries(path: &Path) -> Result<BTreeMap<String, CacheEntry>, CacheError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(CacheError::io(path, e)),
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(BTreeMap::new());
    }
    serde_json::from_slice(&bytes).map_err(|e| CacheError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn open_lock(path: &Path) -> Result<File, CacheError> {
    let lock_path = sibling(path, ".lock");
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|source| CacheError::Lock {
            path: lock_path,
            source,
        })
}

/// `path` with `suffix` appended to its file name
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
