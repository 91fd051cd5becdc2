//! Run orchestration
//!
//! Walks the library collection by collection: analyze every track
//! (cache first), sequence the usable records into sets, and hand the
//! sets back to the library.

use super::{AnalysisPipeline, PipelineOptions};
use crate::cache::AnalysisCache;
use crate::config::Settings;
use crate::error::{DjcurateError, Result};
use crate::extract;
use crate::library::{DirectoryLibrary, LibraryConnector};
use crate::sequence::build_sets;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// Per-collection summary
#[derive(Debug, Clone, Default)]
pub struct CollectionSummary {
    pub name: String,
    pub tracks: usize,
    pub cached: usize,
    pub extracted: usize,
    pub placeholders: usize,
    pub failed: usize,
    pub sets: usize,
    pub placed: usize,
    pub unplaceable: usize,
    pub dead_ends: usize,
    /// Report file, unless the run was analysis only
    pub report: Option<PathBuf>,
}

/// Run result summary
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub collections: Vec<CollectionSummary>,
}

impl RunSummary {
    pub fn total_tracks(&self) -> usize {
        self.collections.iter().map(|c| c.tracks).sum()
    }

    pub fn failed(&self) -> usize {
        self.collections.iter().map(|c| c.failed).sum()
    }

    pub fn sets(&self) -> usize {
        self.collections.iter().map(|c| c.sets).sum()
    }
}

/// Run analysis and sequencing over the library at `settings.input`
pub fn run(settings: &Settings) -> Result<RunSummary> {
    let run_start = Instant::now();
    let library = DirectoryLibrary::new(&settings.input, &settings.output);
    std::fs::create_dir_all(&settings.output).map_err(|e| DjcurateError::output_error(&settings.output, e))?;

    let extractor = extract::select(settings.extractor);
    info!("Using the {} extractor", extractor.name());
    let cache = AnalysisCache::open(&settings.cache_path, extractor.versions());
    let pipeline = AnalysisPipeline::new(
        extractor,
        PipelineOptions {
            workers: settings.workers,
            checkpoint_every: settings.checkpoint_every,
            degraded_placeholders: settings.degraded_placeholders,
            show_progress: settings.show_progress,
        },
    );

    let collections = library.collections()?;
    if collections.is_empty() {
        warn!("No collections with audio files under {}", settings.input.display());
    }

    let mut summary = RunSummary::default();
    for name in collections {
        let tracks = library.tracks(&name)?;
        let analysis = pipeline.run(&tracks, &cache)?;

        let mut collection = CollectionSummary {
            name: name.clone(),
            tracks: tracks.len(),
            cached: analysis.cached,
            extracted: analysis.extracted,
            placeholders: analysis.placeholders,
            failed: analysis.failed,
            ..CollectionSummary::default()
        };

        if !settings.analyze_only {
            let sequencing_start = Instant::now();
            let outcome = build_sets(analysis.records(), &settings.sequencing);
            info!(
                "Sequenced '{}' into {} sets in {:.2}s",
                name,
                outcome.sets.len(),
                sequencing_start.elapsed().as_secs_f64()
            );
            collection.sets = outcome.sets.len();
            collection.placed = outcome.placed_count();
            collection.unplaceable = outcome.unplaceable.len();
            collection.dead_ends = outcome.dead_ends.len();
            collection.report = Some(library.write_sets(&name, &outcome)?);
        }
        summary.collections.push(collection);
    }

    info!("Total run time: {:.2}s", run_start.elapsed().as_secs_f64());
    Ok(summary)
}
