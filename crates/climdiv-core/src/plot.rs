//! Diagnostic plot rendering for comparison runs.
//!
//! Two artifacts are produced per division: a frequency histogram of the
//! difference values over a caller-supplied range and bin count, and a
//! time-ordered line chart overlaying the reference, candidate, and
//! difference series with a root-mean-square-error summary in the title.
//!
//! Rendering is a pure side effect; the stored diff variable never depends
//! on a plot succeeding, and callers are expected to downgrade failures
//! here to warnings.

use plotters::prelude::*;
use snafu::prelude::*;
use std::{fmt, path::Path};

use crate::store::DivisionId;

/// Errors from rendering a diagnostic image.
#[derive(Debug, Snafu)]
pub enum PlotError {
    /// The chart could not be rendered to the target file.
    #[snafu(display("Failed to render {path}: {message}"))]
    Render {
        /// Target image path.
        path: String,
        /// Rendering backend diagnostic.
        message: String,
    },
}

fn render_error(path: &Path, err: impl fmt::Display) -> PlotError {
    RenderSnafu {
        path: path.display().to_string(),
        message: err.to_string(),
    }
    .build()
}

/// Root mean square error between two series, over time steps where both
/// values are present. NaN when no such time step exists.
pub fn rmse(predictions: &[f64], targets: &[f64]) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for (&p, &t) in predictions.iter().zip(targets.iter()) {
        if p.is_finite() && t.is_finite() {
            sum += (p - t) * (p - t);
            count += 1;
        }
    }
    if count == 0 {
        f64::NAN
    } else {
        (sum / count as f64).sqrt()
    }
}

/// Render a frequency histogram of `values` over `[range.0, range.1)` with
/// `bins` equal-width bins and save it to `path`.
///
/// Non-finite values and values outside the range are not counted. A zero
/// bin count is rejected.
pub fn plot_histogram(
    values: &[f64],
    bins: usize,
    range: (f64, f64),
    index_label: &str,
    division: &DivisionId,
    title: &str,
    path: &Path,
) -> Result<(), PlotError> {
    ensure!(
        bins > 0,
        RenderSnafu {
            path: path.display().to_string(),
            message: "histogram requires a nonzero bin count".to_string(),
        }
    );

    let (lo, hi) = range;
    let bin_width = (hi - lo) / bins as f64;

    let mut counts = vec![0u32; bins];
    for &v in values {
        if !v.is_finite() || v < lo || v > hi {
            continue;
        }
        // The upper range bound lands in the last bin.
        let bin = (((v - lo) / bin_width) as usize).min(bins - 1);
        counts[bin] += 1;
    }
    let max_count = counts.iter().copied().max().unwrap_or(0).max(1);

    let root = BitMapBackend::new(path, (900, 620)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| render_error(path, e))?;

    let caption = format!("{title}: {index_label}, {division}");
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(lo..hi, 0u32..max_count)
        .map_err(|e| render_error(path, e))?;

    chart
        .configure_mesh()
        .x_desc("Value")
        .y_desc("Frequency")
        .draw()
        .map_err(|e| render_error(path, e))?;

    chart
        .draw_series(counts.iter().enumerate().map(|(i, &count)| {
            let x0 = lo + i as f64 * bin_width;
            Rectangle::new([(x0, 0u32), (x0 + bin_width, count)], BLUE.filled())
        }))
        .map_err(|e| render_error(path, e))?;

    root.present().map_err(|e| render_error(path, e))?;
    Ok(())
}

/// Render a time-ordered overlay of reference, candidate, and difference
/// series with the RMSE between candidate and reference in the title, and
/// save it to `path`.
///
/// Missing time steps are omitted from the drawn series.
pub fn plot_lines(
    reference: &[f64],
    candidate: &[f64],
    differences: &[f64],
    division: &DivisionId,
    var_label: &str,
    path: &Path,
) -> Result<(), PlotError> {
    let error = rmse(candidate, reference);
    let n = differences.len().max(1);

    let root = BitMapBackend::new(path, (1800, 400)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| render_error(path, e))?;

    let caption = format!("Comparison for {division}: {var_label}     (RMSE: {error:.4})");
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..n as f64, -5f64..5f64)
        .map_err(|e| render_error(path, e))?;

    chart
        .configure_mesh()
        .x_desc("months")
        .y_desc("value")
        .draw()
        .map_err(|e| render_error(path, e))?;

    // Zero baseline.
    chart
        .draw_series(LineSeries::new([(0.0, 0.0), (n as f64, 0.0)], &BLACK))
        .map_err(|e| render_error(path, e))?;

    chart
        .draw_series(LineSeries::new(finite_points(reference), &BLUE))
        .map_err(|e| render_error(path, e))?
        .label("NCEI (expected)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    chart
        .draw_series(LineSeries::new(finite_points(candidate), &YELLOW))
        .map_err(|e| render_error(path, e))?
        .label("NIDIS (actual)")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], YELLOW));

    chart
        .draw_series(LineSeries::new(finite_points(differences), &RED))
        .map_err(|e| render_error(path, e))?
        .label("Difference")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(|e| render_error(path, e))?;

    root.present().map_err(|e| render_error(path, e))?;
    Ok(())
}

fn finite_points(values: &[f64]) -> Vec<(f64, f64)> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .map(|(i, &v)| (i as f64, v))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rmse_of_identical_series_is_zero() {
        let a = [1.0, 2.0, 3.0];
        assert_eq!(rmse(&a, &a), 0.0);
    }

    #[test]
    fn rmse_ignores_missing_pairs() {
        let predictions = [1.0, f64::NAN, 5.0];
        let targets = [0.0, 2.0, f64::NAN];
        // Only the first pair participates.
        assert_eq!(rmse(&predictions, &targets), 1.0);
    }

    #[test]
    fn rmse_of_all_missing_is_nan() {
        assert!(rmse(&[f64::NAN], &[f64::NAN]).is_nan());
        assert!(rmse(&[], &[]).is_nan());
    }

    #[test]
    fn finite_points_drops_gaps_but_keeps_positions() {
        let points = finite_points(&[1.0, f64::NAN, 3.0]);
        assert_eq!(points, vec![(0.0, 1.0), (2.0, 3.0)]);
    }

    #[test]
    fn zero_bin_histogram_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let target = tmp.path().join("hist.png");

        let err = plot_histogram(
            &[0.5],
            0,
            (-2.0, 2.0),
            "Z-Index",
            &DivisionId::Num(101),
            "CMB vs. NIDIS",
            &target,
        )
        .expect_err("zero bins must fail");

        assert!(err.to_string().contains("nonzero bin count"));
        assert!(!target.exists());
        Ok(())
    }

    // Rendering needs a usable font backend, which headless environments
    // may not provide; run with `cargo test -- --ignored` locally.
    #[test]
    #[ignore = "requires system fonts for chart captions"]
    fn histogram_and_lines_render_to_png() -> Result<(), Box<dyn std::error::Error>> {
        let tmp = TempDir::new()?;
        let division = DivisionId::Num(101);

        let reference = [1.0, 2.0, 3.0, 4.0];
        let candidate = [1.0, 1.0, 2.0, 5.0];
        let diffs = [0.0, -1.0, -1.0, 1.0];

        let hist = tmp.path().join("hist.png");
        plot_histogram(&diffs, 80, (-2.0, 2.0), "Z-Index", &division, "CMB vs. NIDIS", &hist)?;
        assert!(hist.metadata()?.len() > 0);

        let lines = tmp.path().join("lines.png");
        plot_lines(&reference, &candidate, &diffs, &division, "Z-Index", &lines)?;
        assert!(lines.metadata()?.len() > 0);
        Ok(())
    }
}
