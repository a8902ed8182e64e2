//! Grid-source selection and the ingestion collaborator contract.
//!
//! Ingestion of raw source grids is owned by external collaborators; this
//! module only fixes the closed set of grid sources and the narrow contract
//! a collaborator must satisfy: given a source directory and an output
//! directory, make the division store available and report its root path.
//!
//! The set of sources is an exhaustive tagged choice. An unrecognized
//! source name is an explicit error at parse time; there is no default and
//! no silent fall-through.

use snafu::prelude::*;
use std::{
    fmt, io,
    path::{Path, PathBuf},
    str::FromStr,
};

/// The closed set of supported grid sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridSource {
    /// NCEI nClimGrid gridded observations.
    NClimGrid,
    /// PRISM gridded observations.
    Prism,
}

impl GridSource {
    /// All supported sources, in display order.
    pub const ALL: [GridSource; 2] = [GridSource::NClimGrid, GridSource::Prism];

    /// Canonical lowercase name of the source.
    pub fn as_str(self) -> &'static str {
        match self {
            GridSource::NClimGrid => "nclimgrid",
            GridSource::Prism => "prism",
        }
    }
}

impl fmt::Display for GridSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a grid-source name outside the supported set.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(display(
    "'{value}' is not a recognized grid source (expected 'nclimgrid' or 'prism')"
))]
pub struct UnknownGridSource {
    /// The unrecognized name.
    pub value: String,
}

impl FromStr for GridSource {
    type Err = UnknownGridSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nclimgrid" => Ok(GridSource::NClimGrid),
            "prism" => Ok(GridSource::Prism),
            other => Err(UnknownGridSource {
                value: other.to_string(),
            }),
        }
    }
}

/// Errors an ingestion collaborator may surface.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum IngestError {
    /// The source directory does not exist or is not accessible.
    #[snafu(display("Source directory not found or not accessible: {path}"))]
    SourceDirMissing {
        /// The missing directory.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// I/O failure while preparing the output location.
    #[snafu(display("Failed to prepare output location {path}: {source}"))]
    PrepareOutput {
        /// The output path being prepared.
        path: String,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Narrow contract for a grid-source ingestion collaborator.
///
/// Implementations make the division store for their source available under
/// `output_dir` and return the store's root path. Each [`GridSource`]
/// variant is bound to exactly one collaborator by the caller's dispatch.
pub trait GridIngester {
    /// Prepare the division store and return its root path.
    fn ingest(&self, source_dir: &Path, output_dir: &Path) -> Result<PathBuf, IngestError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_sources_parse_round_trip() {
        for source in GridSource::ALL {
            let parsed: GridSource = source.as_str().parse().expect("round trip");
            assert_eq!(parsed, source);
        }
    }

    #[test]
    fn unknown_source_is_an_explicit_error() {
        let err = "daymet".parse::<GridSource>().expect_err("must fail");
        assert_eq!(err.value, "daymet");
        assert!(err.to_string().contains("nclimgrid"));
    }
}
