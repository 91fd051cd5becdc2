//! djcurate - Harmonic set sequencing for DJ libraries
//!
//! Analyzes a music library once, caches per-track features, and orders
//! tracks into playable sets whose transitions respect tempo, key, energy
//! flow, vocals, texture and phrasing.
//!
//! # Architecture
//!
//! - `library`: folder-based collections, tag reading and set reports
//! - `extract` / `audio`: swappable feature extractors
//! - `cache`: durable, versioned feature cache shared between runs
//! - `pipeline`: parallel analysis and run orchestration
//! - `scoring`: pairwise transition scoring with explainable traces
//! - `phase`: warm-up / build / peak / release / cool-down energy arc
//! - `sequence`: BPM bucketing, greedy sequencing, set partitioning and
//!   local optimization
//!
//! # Example
//!
//! ```no_run
//! use djcurate::config::SequencingConfig;
//! use djcurate::sequence::build_sets;
//!
//! let records = Vec::new();
//! let outcome = build_sets(records, &SequencingConfig::default());
//! println!("Built {} sets", outcome.sets.len());
//! ```

pub mod audio;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod key;
pub mod library;
pub mod phase;
pub mod pipeline;
pub mod scoring;
pub mod sequence;
pub mod types;

// Re-export key types at crate root
pub use error::{DjcurateError, Result};
pub use key::CamelotKey;
pub use sequence::{build_sets, Set, SetsOutcome};
pub use types::FeatureRecord;
