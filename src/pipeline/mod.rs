//! Analysis pipeline and run orchestration

mod analyze;
mod orchestrator;

pub use analyze::{AnalysisPipeline, PipelineOptions, PipelineOutcome, RecordSource, TrackAnalysis};
pub use orchestrator::{run, CollectionSummary, RunSummary};
