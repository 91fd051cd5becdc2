//! Parallel analysis
//!
//! Tracks are analyzed on a bounded, local rayon pool. Each worker serves
//! the cache when it can and otherwise runs the extractor; fresh records
//! go over a channel to a single cache-writer thread that stores them and
//! checkpoints the cache to disk as it goes. One bad track never stops
//! the batch.

use crate::cache::{fingerprint, AnalysisCache, CacheLookup};
use crate::error::{AnalysisError, DjcurateError, Result};
use crate::extract::{FeatureExtractor, PartialRecord};
use crate::library::LibraryTrack;
use crate::types::{FeatureRecord, FileMetadata};
use crossbeam_channel::{unbounded, Receiver, Sender};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Knobs for an analysis run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Worker threads in the analysis pool
    pub workers: usize,
    /// Save the cache after this many new records (0 disables checkpoints)
    pub checkpoint_every: usize,
    /// Give failed tracks with a known BPM a neutral placeholder record
    pub degraded_placeholders: bool,
    pub show_progress: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().saturating_sub(1).max(1),
            checkpoint_every: 25,
            degraded_placeholders: false,
            show_progress: false,
        }
    }
}

/// Where a track's result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    Cache,
    /// Produced (or attempted) by the extractor
    Extracted,
    /// Neutral stand-in for a failed analysis; never cached
    Placeholder,
}

/// Result for one input track
#[derive(Debug, Clone)]
pub struct TrackAnalysis {
    pub track: LibraryTrack,
    pub source: RecordSource,
    pub result: std::result::Result<FeatureRecord, AnalysisError>,
}

/// All results of a run, in input order
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    pub analyses: Vec<TrackAnalysis>,
    pub cached: usize,
    pub extracted: usize,
    pub failed: usize,
    pub placeholders: usize,
}

impl PipelineOutcome {
    fn from_analyses(analyses: Vec<TrackAnalysis>) -> Self {
        let mut outcome = Self {
            analyses,
            ..Self::default()
        };
        for analysis in &outcome.analyses {
            match (&analysis.result, analysis.source) {
                (Err(_), _) => outcome.failed += 1,
                (Ok(_), RecordSource::Cache) => outcome.cached += 1,
                (Ok(_), RecordSource::Extracted) => outcome.extracted += 1,
                (Ok(_), RecordSource::Placeholder) => outcome.placeholders += 1,
            }
        }
        outcome
    }

    /// Successful records, in input order
    pub fn records(&self) -> Vec<FeatureRecord> {
        self.analyses
            .iter()
            .filter_map(|a| a.result.as_ref().ok().cloned())
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &AnalysisError> {
        self.analyses.iter().filter_map(|a| a.result.as_ref().err())
    }
}

/// A fresh record on its way to the cache writer
struct Computed {
    fingerprint: String,
    record: FeatureRecord,
    metadata: FileMetadata,
}

pub struct AnalysisPipeline {
    extractor: Arc<dyn FeatureExtractor>,
    options: PipelineOptions,
}

impl AnalysisPipeline {
    pub fn new(extractor: Arc<dyn FeatureExtractor>, options: PipelineOptions) -> Self {
        Self { extractor, options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Analyze `tracks`, serving and filling `cache`
    ///
    /// Only a failed final cache save is an error; per-track failures are
    /// reported in the outcome.
    pub fn run(&self, tracks: &[LibraryTrack], cache: &AnalysisCache) -> Result<PipelineOutcome> {
        let start = Instant::now();
        let pool = build_pool(self.options.workers)?;
        let progress = self.progress_bar(tracks.len());
        info!(
            "Analyzing {} tracks with {} ({} workers)",
            tracks.len(),
            self.extractor.name(),
            self.options.workers
        );

        let (tx, rx) = unbounded::<Computed>();
        let checkpoint_every = self.options.checkpoint_every;
        let analyses = thread::scope(|scope| {
            let writer = scope.spawn(move || cache_writer(rx, cache, checkpoint_every));

            // collect() on an indexed parallel iterator keeps input order
            let analyses: Vec<TrackAnalysis> = pool.install(|| {
                tracks
                    .par_iter()
                    .map(|track| {
                        let analysis = self.analyze_track(track, cache, &tx);
                        if let Some(ref pb) = progress {
                            pb.inc(1);
                            pb.set_message(format!(
                                "{}",
                                track.path.file_name().unwrap_or_default().to_string_lossy()
                            ));
                        }
                        analysis
                    })
                    .collect()
            });
            drop(tx);

            match writer.join() {
                Ok(written) => debug!("Cache writer stored {} records", written),
                Err(_) => error!("Cache writer thread panicked; unsaved records will be retried on the final save"),
            }
            analyses
        });

        if let Some(pb) = progress {
            pb.finish_with_message("Analysis complete");
        }

        cache.save()?;

        let outcome = PipelineOutcome::from_analyses(analyses);
        info!(
            "Analysis completed in {:.2}s: {} cached, {} extracted, {} placeholders, {} failed",
            start.elapsed().as_secs_f64(),
            outcome.cached,
            outcome.extracted,
            outcome.placeholders,
            outcome.failed
        );
        Ok(outcome)
    }

    fn analyze_track(&self, track: &LibraryTrack, cache: &AnalysisCache, tx: &Sender<Computed>) -> TrackAnalysis {
        let metadata = match FileMetadata::from_path(&track.path) {
            Ok(metadata) => metadata,
            Err(e) => {
                let err = match e.kind() {
                    std::io::ErrorKind::NotFound => AnalysisError::FileNotFound(track.path.clone()),
                    _ => AnalysisError::extractor(&track.path, format!("cannot read file metadata: {}", e)),
                };
                return self.failed(track, err);
            }
        };
        let fingerprint = fingerprint(&track.path, &metadata);

        let previous: Option<PartialRecord> = match cache.lookup(&fingerprint, Some(&metadata)) {
            CacheLookup::Hit(record) => {
                debug!("Cache hit: {}", track.path.display());
                return TrackAnalysis {
                    track: track.clone(),
                    source: RecordSource::Cache,
                    result: Ok(record),
                };
            }
            CacheLookup::Stale(partial) => {
                debug!("Recomputing {:?} for {}", partial.stale, track.path.display());
                Some(partial)
            }
            CacheLookup::Miss => None,
        };

        match self.extractor.extract(track, previous.as_ref()) {
            Ok(mut record) => {
                record.fingerprint = fingerprint.clone();
                record.source_path = track.path.clone();
                let computed = Computed {
                    fingerprint,
                    record: record.clone(),
                    metadata,
                };
                if tx.send(computed).is_err() {
                    warn!("Cache writer is gone; {} will not be cached", track.path.display());
                }
                TrackAnalysis {
                    track: track.clone(),
                    source: RecordSource::Extracted,
                    result: Ok(record),
                }
            }
            Err(e) => match self.placeholder(track, &fingerprint) {
                Some(record) => {
                    warn!("Analysis failed for {} ({}); using a placeholder", track.path.display(), e);
                    TrackAnalysis {
                        track: track.clone(),
                        source: RecordSource::Placeholder,
                        result: Ok(record),
                    }
                }
                None => self.failed(track, e),
            },
        }
    }

    fn failed(&self, track: &LibraryTrack, err: AnalysisError) -> TrackAnalysis {
        warn!("Skipping {}: {}", track.path.display(), err);
        TrackAnalysis {
            track: track.clone(),
            source: RecordSource::Extracted,
            result: Err(err),
        }
    }

    /// Neutral record for a registered track with a known tempo
    fn placeholder(&self, track: &LibraryTrack, fingerprint: &str) -> Option<FeatureRecord> {
        if !self.options.degraded_placeholders || !track.registered {
            return None;
        }
        let bpm = track.usable_bpm()?;
        let mut record = FeatureRecord::new(fingerprint, &track.path);
        record.bpm = bpm;
        record.key = track.known_key;
        record.energy = 50;
        record.title = track.title.clone();
        record.artist = track.artist.clone();
        self.extractor.versions().stamp(&mut record);
        Some(record)
    }

    fn progress_bar(&self, len: usize) -> Option<ProgressBar> {
        if !self.options.show_progress {
            return None;
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Some(pb)
    }
}

/// Local pool so concurrent runs never share or resize the global one
fn build_pool(workers: usize) -> Result<rayon::ThreadPool> {
    let workers = workers.max(1);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("djcurate-analysis-{}", i))
        .build()
        .map_err(|e| DjcurateError::WorkerPool(e.to_string()))?;
    debug!("Configured analysis pool with {} threads", workers);
    Ok(pool)
}

/// Store incoming records, saving every `checkpoint_every`
///
/// Checkpoint failures are logged; the final save after the run retries them.
fn cache_writer(rx: Receiver<Computed>, cache: &AnalysisCache, checkpoint_every: usize) -> usize {
    let mut written = 0;
    let mut since_checkpoint = 0;
    for computed in rx {
        cache.put(computed.fingerprint, computed.record, Some(computed.metadata));
        written += 1;
        since_checkpoint += 1;
        if checkpoint_every > 0 && since_checkpoint >= checkpoint_every {
            match cache.save() {
                Ok(()) => debug!("Cache checkpoint after {} records", written),
                Err(e) => warn!("Cache checkpoint failed: {}", e),
            }
            since_checkpoint = 0;
        }
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{FeatureGroup, SchemaVersions};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Derives a record from the file name; files containing "bad" fail
    struct NameExtractor {
        calls: AtomicUsize,
    }

    impl NameExtractor {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl FeatureExtractor for NameExtractor {
        fn extract(
            &self,
            track: &LibraryTrack,
            previous: Option<&PartialRecord>,
        ) -> std::result::Result<FeatureRecord, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let name = track.path.file_stem().unwrap_or_default().to_string_lossy().into_owned();
            if name.contains("bad") {
                return Err(AnalysisError::decode(&track.path, "unreadable"));
            }
            let mut record = previous
                .map(|p| p.fresh_base())
                .unwrap_or_else(|| FeatureRecord::new("", &track.path));
            record.bpm = 120.0 + name.len() as f64;
            record.energy = 60;
            self.versions().stamp(&mut record);
            Ok(record)
        }

        fn versions(&self) -> SchemaVersions {
            SchemaVersions::new("names-1").with_model(FeatureGroup::Energy, "1")
        }

        fn name(&self) -> &'static str {
            "names"
        }
    }

    fn library(dir: &Path, names: &[&str]) -> Vec<LibraryTrack> {
        names
            .iter()
            .map(|name| {
                let path = dir.join(format!("{}.wav", name));
                std::fs::write(&path, name.as_bytes()).unwrap();
                let mut track = LibraryTrack::new(path);
                track.registered = true;
                track
            })
            .collect()
    }

    fn options(placeholders: bool) -> PipelineOptions {
        PipelineOptions {
            workers: 2,
            checkpoint_every: 2,
            degraded_placeholders: placeholders,
            show_progress: false,
        }
    }

    #[test]
    fn test_results_follow_input_order() {
        let dir = TempDir::new().unwrap();
        let names = ["e", "dd", "ccc", "bbbb", "aaaaa", "f", "gg"];
        let tracks = library(dir.path(), &names);
        let extractor = Arc::new(NameExtractor::new());
        let cache = AnalysisCache::open(dir.path().join("cache.json"), extractor.versions());

        let outcome = AnalysisPipeline::new(extractor, options(false)).run(&tracks, &cache).unwrap();
        let paths: Vec<_> = outcome.analyses.iter().map(|a| a.track.path.clone()).collect();
        let expected: Vec<_> = tracks.iter().map(|t| t.path.clone()).collect();
        assert_eq!(paths, expected);
        assert_eq!(outcome.extracted, names.len());
    }

    #[test]
    fn test_failures_are_isolated() {
        let dir = TempDir::new().unwrap();
        let mut tracks = library(dir.path(), &["good", "bad", "fine"]);
        tracks.push(LibraryTrack::new(dir.path().join("missing.wav")));
        let extractor = Arc::new(NameExtractor::new());
        let cache = AnalysisCache::open(dir.path().join("cache.json"), extractor.versions());

        let outcome = AnalysisPipeline::new(extractor, options(false)).run(&tracks, &cache).unwrap();
        assert_eq!(outcome.extracted, 2);
        assert_eq!(outcome.failed, 2);
        assert!(matches!(outcome.analyses[3].result, Err(AnalysisError::FileNotFound(_))));
        assert_eq!(outcome.records().len(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_second_run_is_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let tracks = library(dir.path(), &["one", "two", "three"]);
        let cache_path = dir.path().join("cache.json");

        let extractor = Arc::new(NameExtractor::new());
        let cache = AnalysisCache::open(&cache_path, extractor.versions());
        AnalysisPipeline::new(extractor.clone(), options(false)).run(&tracks, &cache).unwrap();
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 3);

        let reopened = AnalysisCache::open(&cache_path, extractor.versions());
        let outcome = AnalysisPipeline::new(extractor.clone(), options(false)).run(&tracks, &reopened).unwrap();
        assert_eq!(outcome.cached, 3);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 3);
        assert!(reopened.entry(&outcome.records()[0].fingerprint).is_some());
    }

    #[test]
    fn test_placeholders_only_for_registered_tracks_with_tempo() {
        let dir = TempDir::new().unwrap();
        let mut tracks = library(dir.path(), &["bad-tagged", "bad-untagged", "bad-loose"]);
        tracks[0].known_bpm = Some(128.0);
        tracks[2].known_bpm = Some(128.0);
        tracks[2].registered = false;
        let extractor = Arc::new(NameExtractor::new());
        let cache = AnalysisCache::open(dir.path().join("cache.json"), extractor.versions());

        let outcome = AnalysisPipeline::new(extractor, options(true)).run(&tracks, &cache).unwrap();
        assert_eq!(outcome.placeholders, 1);
        assert_eq!(outcome.failed, 2);
        assert_eq!(outcome.analyses[0].source, RecordSource::Placeholder);
        let placeholder = outcome.analyses[0].result.as_ref().unwrap();
        assert_eq!(placeholder.bpm, 128.0);
        assert_eq!(placeholder.energy, 50);
        assert_eq!(placeholder.bpm_confidence, 0.0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_save_failure_is_a_run_error() {
        let dir = TempDir::new().unwrap();
        let tracks = library(dir.path(), &["one"]);
        // a directory where the cache file should be
        let cache_path = dir.path().join("cache.json");
        std::fs::create_dir(&cache_path).unwrap();
        let extractor = Arc::new(NameExtractor::new());
        let cache = AnalysisCache::open(&cache_path, extractor.versions());

        let result = AnalysisPipeline::new(extractor, options(false)).run(&tracks, &cache);
        assert!(matches!(result, Err(DjcurateError::Cache(_))));
    }
}
