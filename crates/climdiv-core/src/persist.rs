//! Persisting computed differences back into the store.
//!
//! The provisioner derives a `diffs_<label>` variable name, ensures the
//! variable exists (reusing a pre-existing one untouched, otherwise
//! creating it over `(division, time)` with a NaN fill and a numeric type
//! chosen from a representative sample of the diff table), then writes each
//! division's difference array into its row.
//!
//! A division whose array length disagrees with the store's declared time
//! extent is skipped with a diagnostic; this is per-division and never
//! aborts the run. All writes happen under the store's per-path lock so
//! concurrent runs targeting the same store serialize, while runs against
//! other stores proceed unhindered.

use log::warn;
use snafu::prelude::*;
use std::collections::BTreeMap;

use crate::diff::DiffTable;
use crate::locks;
use crate::store::{ArrayStore, NumericType, StoreError};

/// Outcome summary of one persistence pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistReport {
    /// Name of the derived variable the diffs were written to.
    pub variable: String,
    /// Number of division rows written.
    pub written: usize,
    /// Number of division rows skipped due to a length mismatch.
    pub skipped: usize,
}

/// Errors from persisting a diff table.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PersistError {
    /// Store error while provisioning the variable or writing a row.
    #[snafu(display("Failed to persist differences: {source}"))]
    Write {
        /// Underlying store error.
        source: StoreError,
    },
}

/// Derived variable name for a comparison label.
pub fn diff_variable_name(label: &str) -> String {
    format!("diffs_{label}")
}

/// Persist a diff table into the store under `diffs_<label>`.
///
/// Row writes are keyed by ordinal position against the store's division
/// list: divisions absent from the table are left untouched, rows whose
/// length matches the time extent are written verbatim, and mismatched rows
/// are skipped with a logged diagnostic naming the division and the
/// expected/actual lengths.
///
/// Calling this twice with the same table and label is idempotent: the
/// variable is created at most once and row writes are plain assignments.
pub fn persist<S: ArrayStore>(
    store: &mut S,
    diffs: &DiffTable,
    label: &str,
) -> Result<PersistReport, PersistError> {
    let variable = diff_variable_name(label);

    let lock = locks::path_lock(store.store_path());
    let _guard = locks::acquire(&lock);

    // An empty diff table offers no sample; default to the wide type.
    let numeric_type = diffs
        .representative()
        .map(NumericType::for_value)
        .unwrap_or(NumericType::F64);
    store
        .ensure_variable(&variable, numeric_type, None, BTreeMap::new())
        .context(WriteSnafu)?;

    let time_size = store.time_size();
    let division_count = store.division_ids().len();
    let mut written = 0;
    let mut skipped = 0;

    for ordinal in 0..division_count {
        let Some(record) = diffs.by_ordinal(ordinal) else {
            continue;
        };

        if record.values.len() == time_size {
            store
                .write_row(&variable, ordinal, &record.values)
                .context(WriteSnafu)?;
            written += 1;
        } else {
            warn!(
                "Unexpected size of data array for division {} (ordinal {ordinal}) -- \
                 expected {time_size} time steps but the array contains {}",
                record.division,
                record.values.len()
            );
            skipped += 1;
        }
    }

    Ok(PersistReport {
        variable,
        written,
        skipped,
    })
}
