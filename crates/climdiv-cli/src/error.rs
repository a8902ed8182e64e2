use snafu::Snafu;

use climdiv_core::ingest::IngestError;
use climdiv_core::pipeline::PipelineError;
use climdiv_core::store::StoreError;

pub type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CliError {
    #[snafu(display("Ingest for --grid {grid} failed: {source}"))]
    Ingest {
        grid: String,
        source: IngestError,
    },

    #[snafu(display(
        "Failed to open division store at {path}. \
         Run the index processor first so the store exists."
    ))]
    OpenStore {
        path: String,
        #[snafu(source(from(StoreError, Box::new)))]
        source: Box<StoreError>,
    },

    #[snafu(display("Comparison run failed: {source}"))]
    Run { source: PipelineError },
}
