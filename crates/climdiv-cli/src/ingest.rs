//! Ingestion collaborators for the supported grid sources.
//!
//! Raw-grid conversion is owned by the upstream index processor; the
//! collaborators here satisfy the narrow `GridIngester` contract by
//! validating the source directory and resolving the division store root
//! under the output directory, creating the output directory if needed.

use std::fs;
use std::path::{Path, PathBuf};

use snafu::ResultExt;

use climdiv_core::ingest::{
    GridIngester, GridSource, IngestError, PrepareOutputSnafu, SourceDirMissingSnafu,
};

/// Collaborator for the NCEI nClimGrid source.
pub struct NClimGridIngester;

/// Collaborator for the PRISM source.
pub struct PrismIngester;

/// Bind each grid source to its ingestion collaborator.
///
/// The match is exhaustive over the closed source set, so adding a variant
/// forces a dispatch decision here.
pub fn ingester_for(source: GridSource) -> Box<dyn GridIngester> {
    match source {
        GridSource::NClimGrid => Box::new(NClimGridIngester),
        GridSource::Prism => Box::new(PrismIngester),
    }
}

fn prepare(
    source: GridSource,
    source_dir: &Path,
    output_dir: &Path,
) -> Result<PathBuf, IngestError> {
    fs::metadata(source_dir).context(SourceDirMissingSnafu {
        path: source_dir.display().to_string(),
    })?;

    fs::create_dir_all(output_dir).context(PrepareOutputSnafu {
        path: output_dir.display().to_string(),
    })?;

    Ok(output_dir.join(format!("{}_divisions", source.as_str())))
}

impl GridIngester for NClimGridIngester {
    fn ingest(&self, source_dir: &Path, output_dir: &Path) -> Result<PathBuf, IngestError> {
        prepare(GridSource::NClimGrid, source_dir, output_dir)
    }
}

impl GridIngester for PrismIngester {
    fn ingest(&self, source_dir: &Path, output_dir: &Path) -> Result<PathBuf, IngestError> {
        prepare(GridSource::Prism, source_dir, output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn resolves_store_root_under_output_dir() -> TestResult {
        let tmp = TempDir::new()?;
        let output = tmp.path().join("out");

        let root = ingester_for(GridSource::NClimGrid).ingest(tmp.path(), &output)?;

        assert_eq!(root, output.join("nclimgrid_divisions"));
        assert!(output.is_dir());
        Ok(())
    }

    #[test]
    fn missing_source_dir_is_rejected() -> TestResult {
        let tmp = TempDir::new()?;

        let result = ingester_for(GridSource::Prism)
            .ingest(&tmp.path().join("nope"), &tmp.path().join("out"));

        let err = result.expect_err("expected SourceDirMissing");
        assert!(matches!(err, IngestError::SourceDirMissing { .. }));
        Ok(())
    }
}
