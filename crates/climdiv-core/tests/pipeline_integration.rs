//! End-to-end tests for the comparison-and-persistence pipeline against a
//! real on-disk division store.

use std::collections::BTreeMap;

use climdiv_core::diff::ComparisonSpec;
use climdiv_core::pipeline::{run_comparisons, RunOptions};
use climdiv_core::store::{ArrayStore, DivisionId, DivisionStore, NumericType};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Store with divisions `[101, 102]`, time size 4, reference `cmb_zndx`
/// and candidate `zindex` populated.
fn zindex_store(tmp: &TempDir) -> Result<DivisionStore, Box<dyn std::error::Error>> {
    let root = tmp.path().join("nclimdiv");
    let mut store = DivisionStore::create(
        &root,
        vec![DivisionId::Num(101), DivisionId::Num(102)],
        4,
    )?;

    store.ensure_variable("cmb_zndx", NumericType::F64, None, BTreeMap::new())?;
    store.ensure_variable("zindex", NumericType::F64, None, BTreeMap::new())?;

    store.write_row("cmb_zndx", 0, &[1.0, 2.0, 3.0, 4.0])?;
    store.write_row("cmb_zndx", 1, &[5.0, 6.0, 7.0, 8.0])?;
    store.write_row("zindex", 0, &[1.0, 1.0, 2.0, 5.0])?;
    store.write_row("zindex", 1, &[5.0, 6.0, 7.0, 9.0])?;

    Ok(store)
}

#[test]
fn zindex_comparison_writes_the_expected_diff_variable() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = zindex_store(&tmp)?;

    let specs = vec![ComparisonSpec::new("Z-Index", "cmb_zndx", "zindex")];
    let report = run_comparisons(&mut store, &specs, &RunOptions::default())?;

    assert_eq!(report.comparisons.len(), 1);
    assert_eq!(report.comparisons[0].variable, "diffs_Z-Index");
    assert_eq!(report.comparisons[0].written, 2);
    assert_eq!(report.comparisons[0].skipped, 0);

    // Reopen from disk to check what was actually persisted.
    let reopened = DivisionStore::open(store.store_path())?;
    assert!(reopened.has_variable("diffs_Z-Index"));
    assert_eq!(
        reopened.read_row("diffs_Z-Index", 0)?,
        vec![0.0, -1.0, -1.0, 1.0]
    );
    assert_eq!(
        reopened.read_row("diffs_Z-Index", 1)?,
        vec![0.0, 0.0, 0.0, 1.0]
    );
    Ok(())
}

#[test]
fn plot_rendering_never_affects_the_persisted_diffs() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = zindex_store(&tmp)?;
    let plots_dir = tmp.path().join("plots");
    std::fs::create_dir_all(&plots_dir)?;

    let specs = vec![ComparisonSpec::new("Z-Index", "cmb_zndx", "zindex")];
    let options = RunOptions {
        plots_dir: Some(plots_dir),
    };
    let report = run_comparisons(&mut store, &specs, &options)?;

    // The diff variable is written whether or not the image backend could
    // render on this host.
    assert_eq!(report.comparisons[0].written, 2);
    let reopened = DivisionStore::open(store.store_path())?;
    assert_eq!(
        reopened.read_row("diffs_Z-Index", 0)?,
        vec![0.0, -1.0, -1.0, 1.0]
    );
    assert_eq!(
        reopened.read_row("diffs_Z-Index", 1)?,
        vec![0.0, 0.0, 0.0, 1.0]
    );
    Ok(())
}

#[test]
fn rerunning_the_pipeline_is_idempotent() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = zindex_store(&tmp)?;

    let specs = vec![ComparisonSpec::new("Z-Index", "cmb_zndx", "zindex")];
    run_comparisons(&mut store, &specs, &RunOptions::default())?;
    let first_row = store.read_row("diffs_Z-Index", 0)?;
    let first_meta = store.variable("diffs_Z-Index").cloned();

    let report = run_comparisons(&mut store, &specs, &RunOptions::default())?;

    assert_eq!(report.comparisons[0].written, 2);
    assert_eq!(store.read_row("diffs_Z-Index", 0)?, first_row);
    assert_eq!(store.variable("diffs_Z-Index").cloned(), first_meta);
    Ok(())
}

#[test]
fn source_variables_are_untouched_by_a_run() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = zindex_store(&tmp)?;

    let specs = vec![ComparisonSpec::new("Z-Index", "cmb_zndx", "zindex")];
    run_comparisons(&mut store, &specs, &RunOptions::default())?;

    assert_eq!(store.read_row("cmb_zndx", 0)?, vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(store.read_row("zindex", 1)?, vec![5.0, 6.0, 7.0, 9.0]);
    Ok(())
}

#[test]
fn masked_entries_flow_through_to_the_stored_diffs() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = zindex_store(&tmp)?;
    store.write_row("zindex", 0, &[1.0, f64::NAN, 2.0, 5.0])?;

    let specs = vec![ComparisonSpec::new("Z-Index", "cmb_zndx", "zindex")];
    run_comparisons(&mut store, &specs, &RunOptions::default())?;

    let row = store.read_row("diffs_Z-Index", 0)?;
    assert_eq!(row[0], 0.0);
    assert!(row[1].is_nan());
    assert_eq!(row[2], -1.0);
    assert_eq!(row[3], 1.0);
    Ok(())
}

#[test]
fn two_comparisons_share_one_store_without_interference() -> TestResult {
    let tmp = TempDir::new()?;
    let mut store = zindex_store(&tmp)?;

    store.ensure_variable("wrcc_pdsi", NumericType::F64, None, BTreeMap::new())?;
    store.ensure_variable("pdsi", NumericType::F64, None, BTreeMap::new())?;
    store.write_row("wrcc_pdsi", 0, &[1.0, 1.0, 1.0, 1.0])?;
    store.write_row("wrcc_pdsi", 1, &[2.0, 2.0, 2.0, 2.0])?;
    store.write_row("pdsi", 0, &[1.5, 1.0, 0.5, 1.0])?;
    store.write_row("pdsi", 1, &[2.0, 2.5, 2.0, 1.5])?;

    let specs = vec![
        ComparisonSpec::new("PDSI", "wrcc_pdsi", "pdsi"),
        ComparisonSpec::new("Z-Index", "cmb_zndx", "zindex"),
    ];
    let report = run_comparisons(&mut store, &specs, &RunOptions::default())?;

    assert_eq!(report.comparisons.len(), 2);
    assert_eq!(store.read_row("diffs_PDSI", 0)?, vec![0.5, 0.0, -0.5, 0.0]);
    assert_eq!(
        store.read_row("diffs_Z-Index", 0)?,
        vec![0.0, -1.0, -1.0, 1.0]
    );
    Ok(())
}
