//! Configuration and CLI handling

pub mod cli;
pub mod sequencing;
pub mod settings;

pub use cli::Cli;
pub use sequencing::{SequencingConfig, SequencingMode};
pub use settings::Settings;
