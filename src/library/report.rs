//! JSON set reports
//!
//! One file per collection holding the sets, every transition's score
//! trace, the unplaceable tracks and the dead ends hit while sequencing.

use crate::error::{DjcurateError, Result};
use crate::sequence::SetsOutcome;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

/// Report schema version
const SCHEMA_VERSION: &str = "1.0";

/// Top-level report structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetsReport {
    /// Schema version for forward compatibility
    pub version: String,
    pub metadata: ReportMetadata,
    #[serde(flatten)]
    pub outcome: SetsOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// djcurate version that generated this file
    pub generator_version: String,
    pub exported_at: String,
    pub collection: String,
    pub set_count: usize,
    pub placed_count: usize,
    pub unplaceable_count: usize,
    /// Sets lacking a warm-up, a peak or a cool-down
    #[serde(default)]
    pub incomplete_arc_count: usize,
}

/// Write the sets for `collection` to `output_path`
///
/// Uses atomic write pattern: writes to a temp file first, then renames.
/// An interrupted write never leaves a truncated report behind.
pub fn write_sets_report(collection: &str, outcome: &SetsOutcome, output_path: &Path) -> Result<()> {
    let temp_path = output_path.with_extension("json.tmp");

    let file = File::create(&temp_path).map_err(|e| DjcurateError::output_error(output_path, e))?;
    let mut writer = BufWriter::new(file);

    let report = SetsReport {
        version: SCHEMA_VERSION.to_string(),
        metadata: ReportMetadata {
            generator_version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: chrono::Utc::now().to_rfc3339(),
            collection: collection.to_string(),
            set_count: outcome.sets.len(),
            placed_count: outcome.placed_count(),
            unplaceable_count: outcome.unplaceable.len(),
            incomplete_arc_count: outcome.incomplete_arc_count(),
        },
        outcome: outcome.clone(),
    };

    let written = serde_json::to_writer_pretty(&mut writer, &report)
        .map_err(|e| e.to_string())
        .and_then(|_| writer.flush().map_err(|e| e.to_string()));
    drop(writer);
    if let Err(reason) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(DjcurateError::Output {
            path: output_path.to_path_buf(),
            reason,
        });
    }

    // Atomic rename: either succeeds completely or fails without modifying target
    std::fs::rename(&temp_path, output_path).map_err(|e| {
        let _ = std::fs::remove_file(&temp_path);
        DjcurateError::Output {
            path: output_path.to_path_buf(),
            reason: format!("Failed to finalize file: {}", e),
        }
    })?;

    info!(
        "Wrote {} sets ({} tracks) for '{}' to {}",
        report.metadata.set_count,
        report.metadata.placed_count,
        collection,
        output_path.display()
    );
    Ok(())
}

/// Read a report written by [`write_sets_report`]
pub fn read_sets_report(path: &Path) -> Result<SetsReport> {
    let file = File::open(path).map_err(|e| DjcurateError::library(path, e.to_string()))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| DjcurateError::library(path, e.to_string()))
}
