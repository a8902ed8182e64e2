//! CLI for validating climate-division drought index datasets.
//!
//! Dispatches the grid-source ingestion collaborator, opens the division
//! store it resolves, and runs the default comparison suite with diagnostic
//! plots written under the output directory.

mod error;
mod ingest;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use chrono::Local;
use clap::{Parser, ValueEnum};
use log::{error, info};
use snafu::{Report, ResultExt};

use climdiv_core::ingest::GridSource;
use climdiv_core::pipeline::{default_comparisons, run_comparisons, RunOptions, RunReport};
use climdiv_core::store::DivisionStore;

use crate::error::{CliResult, IngestSnafu, OpenStoreSnafu, RunSnafu};
use crate::ingest::ingester_for;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GridArg {
    #[value(name = "nclimgrid")]
    NClimGrid,
    #[value(name = "prism")]
    Prism,
}

impl From<GridArg> for GridSource {
    fn from(value: GridArg) -> Self {
        match value {
            GridArg::NClimGrid => GridSource::NClimGrid,
            GridArg::Prism => GridSource::Prism,
        }
    }
}

/// Validate computed climate-division indices against reference datasets.
#[derive(Debug, Parser)]
#[command(name = "climdiv", version, about)]
struct Cli {
    /// Grid source whose division store should be validated
    #[arg(long, value_enum)]
    grid: GridArg,

    /// Base directory with precipitation and temperature source files
    #[arg(long = "source-dir", alias = "source_dir")]
    source_dir: PathBuf,

    /// Directory for the division store and diagnostic images
    #[arg(long = "output-dir", alias = "output_dir")]
    output_dir: PathBuf,
}

fn run(cli: &Cli) -> CliResult<RunReport> {
    let source = GridSource::from(cli.grid);

    let store_root = ingester_for(source)
        .ingest(&cli.source_dir, &cli.output_dir)
        .context(IngestSnafu {
            grid: source.as_str(),
        })?;

    let mut store = DivisionStore::open(&store_root).context(OpenStoreSnafu {
        path: store_root.display().to_string(),
    })?;

    let options = RunOptions {
        plots_dir: Some(cli.output_dir.clone()),
    };
    run_comparisons(&mut store, &default_comparisons(), &options).context(RunSnafu)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let start_instant = Instant::now();
    info!("Start time:    {}", Local::now().format("%Y-%m-%d %H:%M:%S"));

    let outcome = run(&cli);

    info!("End time:      {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
    info!("Elapsed time:  {:.2?}", start_instant.elapsed());

    match outcome {
        Ok(report) => {
            let written: usize = report.comparisons.iter().map(|c| c.written).sum();
            let skipped: usize = report.comparisons.iter().map(|c| c.skipped).sum();
            info!(
                "Validated {} comparisons: {written} rows written, {skipped} skipped",
                report.comparisons.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to complete: {}", Report::from_error(e));
            ExitCode::FAILURE
        }
    }
}
