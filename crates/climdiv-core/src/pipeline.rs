//! The comparison-and-persistence pipeline.
//!
//! For each comparison spec the pipeline computes per-division differences,
//! optionally renders the per-division diagnostic plots, and persists the
//! accumulated table into the store under `diffs_<label>`. Comparisons run
//! sequentially within one pipeline invocation; concurrency across runs is
//! handled by the per-path lock registry inside the provisioner.
//!
//! Plot rendering is a side effect: a failed image write is logged as a
//! warning and never affects the stored diff variable.

use log::{info, warn};
use snafu::prelude::*;
use std::path::{Path, PathBuf};

use crate::diff::{self, ComparisonSpec, DiffError, DiffTable};
use crate::persist::{self, PersistError, PersistReport};
use crate::plot;
use crate::store::ArrayStore;

/// Histogram bin count used for diagnostic plots.
pub const HISTOGRAM_BINS: usize = 80;

/// Histogram value range used for diagnostic plots.
pub const HISTOGRAM_RANGE: (f64, f64) = (-2.0, 2.0);

/// Common title prefix for the diagnostic histograms.
pub const HISTOGRAM_TITLE: &str = "CMB vs. NIDIS";

/// Options for one pipeline invocation.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Directory to write per-division diagnostic images into; `None`
    /// disables plotting.
    pub plots_dir: Option<PathBuf>,
}

/// Per-comparison outcome summaries for a pipeline invocation.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// One persistence report per comparison spec, in input order.
    pub comparisons: Vec<PersistReport>,
}

/// Errors that abort a pipeline invocation.
#[derive(Debug, Snafu)]
pub enum PipelineError {
    /// Difference computation failed for a comparison.
    #[snafu(display("Comparison '{label}' failed: {source}"))]
    Compute {
        /// Label of the failing comparison.
        label: String,
        /// Underlying diff error.
        source: DiffError,
    },

    /// Persistence failed for a comparison.
    #[snafu(display("Persisting comparison '{label}' failed: {source}"))]
    Persist {
        /// Label of the failing comparison.
        label: String,
        /// Underlying persist error.
        source: PersistError,
    },
}

/// The comparison table validated by default: reference variables from the
/// CMB/WRCC datasets against the locally computed candidates.
pub fn default_comparisons() -> Vec<ComparisonSpec> {
    vec![
        ComparisonSpec::new("PDSI", "wrcc_pdsi", "pdsi"),
        ComparisonSpec::new("PHDI", "wrcc_phdi", "phdi"),
        ComparisonSpec::new("PMDI", "wrcc_pmdi", "pmdi"),
        ComparisonSpec::new("Z-Index", "cmb_zndx", "zindex"),
    ]
}

/// Run the given comparisons against one store.
///
/// Each comparison computes its diff table, renders diagnostics when a
/// plots directory is configured, and persists the table. A failure in
/// compute or persist aborts the invocation with the comparison's label
/// attached; plot failures only warn.
pub fn run_comparisons<S: ArrayStore>(
    store: &mut S,
    specs: &[ComparisonSpec],
    options: &RunOptions,
) -> Result<RunReport, PipelineError> {
    let mut comparisons = Vec::with_capacity(specs.len());

    for spec in specs {
        info!("Computing differences on variable {}", spec.label);

        let diffs = diff::compute_diffs(&*store, spec).context(ComputeSnafu {
            label: spec.label.clone(),
        })?;

        if let Some(plots_dir) = &options.plots_dir {
            render_diagnostics(&*store, spec, &diffs, plots_dir);
        }

        let report = persist::persist(store, &diffs, &spec.label).context(PersistSnafu {
            label: spec.label.clone(),
        })?;
        info!(
            "Persisted {} rows into {} ({} skipped)",
            report.written, report.variable, report.skipped
        );
        comparisons.push(report);
    }

    Ok(RunReport { comparisons })
}

/// Render the histogram and line-chart images for every division in the
/// diff table. Failures are logged and swallowed.
fn render_diagnostics<S: ArrayStore>(
    store: &S,
    spec: &ComparisonSpec,
    diffs: &DiffTable,
    plots_dir: &Path,
) {
    for record in diffs.iter() {
        let histogram_path = plots_dir.join(format!(
            "diffs_histogram_{}_{}.png",
            spec.candidate, record.division
        ));
        info!(
            "Saving histogram plot for index {} to file {}",
            spec.label,
            histogram_path.display()
        );
        if let Err(e) = plot::plot_histogram(
            &record.values,
            HISTOGRAM_BINS,
            HISTOGRAM_RANGE,
            &spec.label,
            &record.division,
            HISTOGRAM_TITLE,
            &histogram_path,
        ) {
            warn!("Skipping histogram for division {}: {e}", record.division);
        }

        let reference = match store.read_row(&spec.reference, record.ordinal) {
            Ok(row) => row,
            Err(e) => {
                warn!(
                    "Skipping line plot for division {}: failed to re-read {}: {e}",
                    record.division, spec.reference
                );
                continue;
            }
        };
        let candidate = match store.read_row(&spec.candidate, record.ordinal) {
            Ok(row) => row,
            Err(e) => {
                warn!(
                    "Skipping line plot for division {}: failed to re-read {}: {e}",
                    record.division, spec.candidate
                );
                continue;
            }
        };

        let lines_path = plots_dir.join(format!(
            "diffs_line_{}_{}.png",
            spec.candidate, record.division
        ));
        info!(
            "Saving line plot for index {} to file {}",
            spec.label,
            lines_path.display()
        );
        if let Err(e) = plot::plot_lines(
            &reference,
            &candidate,
            &record.values,
            &record.division,
            &spec.label,
            &lines_path,
        ) {
            warn!("Skipping line plot for division {}: {e}", record.division);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DivisionId, DivisionStore, NumericType};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn default_comparisons_cover_the_palmer_suite() {
        let specs = default_comparisons();
        let labels: Vec<&str> = specs.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, ["PDSI", "PHDI", "PMDI", "Z-Index"]);
        let zindex = &specs[3];
        assert_eq!(zindex.reference, "cmb_zndx");
        assert_eq!(zindex.candidate, "zindex");
    }

    #[test]
    fn missing_variable_aborts_with_the_comparison_label() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = DivisionStore::create(
            tmp.path().join("divs"),
            vec![DivisionId::Num(101)],
            4,
        )?;
        store.ensure_variable("zindex", NumericType::F64, None, BTreeMap::new())?;

        let specs = vec![ComparisonSpec::new("Z-Index", "cmb_zndx", "zindex")];
        let err = run_comparisons(&mut store, &specs, &RunOptions::default())
            .expect_err("must fail");

        assert!(matches!(err, PipelineError::Compute { ref label, .. } if label == "Z-Index"));
        Ok(())
    }
}
