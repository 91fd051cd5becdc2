//! djcurate CLI entry point

use clap::Parser;
use djcurate::config::{Cli, Settings};
use djcurate::pipeline;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(&cli);

    if let Err(e) = validate_inputs(&cli) {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let settings = Settings::from_cli(&cli);

    match pipeline::run(&settings) {
        Ok(summary) => {
            println!();
            for collection in &summary.collections {
                let report = collection
                    .report
                    .as_ref()
                    .map(|p| format!(" -> {}", p.display()))
                    .unwrap_or_default();
                println!(
                    "{}: {} tracks ({} cached, {} analyzed, {} failed), {} sets, {} unplaceable{}",
                    collection.name,
                    collection.tracks,
                    collection.cached,
                    collection.extracted,
                    collection.failed,
                    collection.sets,
                    collection.unplaceable,
                    report
                );
            }
            println!(
                "Summary: {} sets from {} tracks, {} failed analysis",
                summary.sets(),
                summary.total_tracks(),
                summary.failed()
            );

            if summary.failed() > 0 {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            eprintln!("Fatal error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter())),
        )
        .with_target(false)
        .init();
}

fn validate_inputs(cli: &Cli) -> Result<(), String> {
    if !cli.input.exists() {
        return Err(format!(
            "Input path does not exist: {}\n\n  Tip: Check the path is correct and accessible.\n  Examples:\n    djcurate -i ~/Music/DJ -o ./sets\n    djcurate -i ~/Music/DJ -o ./sets --extractor auto --mode boutique",
            cli.input.display()
        ));
    }

    // We create the output dir itself, but not its parents
    if let Some(parent) = cli.output.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(format!(
                "Output parent directory does not exist: {}\n\n  Tip: The output directory will be created automatically,\n  but its parent directory must exist.\n  Example: mkdir -p {}",
                parent.display(),
                parent.display()
            ));
        }
    }

    if let Some(config) = &cli.config {
        if !config.is_file() {
            return Err(format!("Config file does not exist: {}", config.display()));
        }
    }

    Ok(())
}
