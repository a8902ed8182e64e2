//! Per-division difference computation between two store variables.
//!
//! A comparison pairs a reference variable (the trusted dataset) with a
//! candidate variable (the computed dataset) under a shared display label.
//! For each division, in the store's stored order, both time series are
//! read, invalid entries are masked, and the elementwise difference
//! `candidate - reference` is accumulated into a [`DiffTable`].
//!
//! This module never mutates the store; independent comparisons may run
//! concurrently as long as the store accessor supports concurrent reads.

use log::{info, warn};
use snafu::prelude::*;
use std::collections::HashMap;

use crate::store::{ArrayStore, DivisionId, StoreError};

/// A reference/candidate variable pair under a shared display label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonSpec {
    /// Display label for the index being validated, e.g. `"Z-Index"`.
    pub label: String,
    /// Name of the reference (expected) variable.
    pub reference: String,
    /// Name of the candidate (computed) variable.
    pub candidate: String,
}

impl ComparisonSpec {
    /// Build a spec from the label and the two variable names.
    pub fn new(
        label: impl Into<String>,
        reference: impl Into<String>,
        candidate: impl Into<String>,
    ) -> Self {
        ComparisonSpec {
            label: label.into(),
            reference: reference.into(),
            candidate: candidate.into(),
        }
    }
}

/// One division's computed difference series.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffRecord {
    /// Ordinal position of the division in the store's division list.
    pub ordinal: usize,
    /// The division's external identifier.
    pub division: DivisionId,
    /// Elementwise `candidate - reference`, NaN where either operand was
    /// missing.
    pub values: Vec<f64>,
}

/// Accumulated differences for one comparison run.
///
/// A single owned table of records in ordinal order, with a secondary
/// lookup view keyed by division identifier. Keeping one table with two
/// views (rather than duplicating entries under two key schemes) means the
/// views cannot diverge; when identifiers are not unique the identifier
/// view resolves to the first occurrence and the collision is logged.
#[derive(Debug, Default)]
pub struct DiffTable {
    records: Vec<DiffRecord>,
    by_id: HashMap<DivisionId, usize>,
}

impl DiffTable {
    /// Create an empty table.
    pub fn new() -> Self {
        DiffTable::default()
    }

    /// Append the next division's difference series.
    ///
    /// Ordinals are assigned in insertion order, mirroring the store's
    /// division order.
    pub fn insert(&mut self, division: DivisionId, values: Vec<f64>) {
        let ordinal = self.records.len();
        if self.by_id.contains_key(&division) {
            warn!(
                "Duplicate division identifier {division}; identifier lookup keeps the \
                 first occurrence, ordinal {ordinal} remains addressable by position"
            );
        } else {
            self.by_id.insert(division.clone(), ordinal);
        }
        self.records.push(DiffRecord {
            ordinal,
            division,
            values,
        });
    }

    /// Look up a record by ordinal position.
    pub fn by_ordinal(&self, ordinal: usize) -> Option<&DiffRecord> {
        self.records.get(ordinal)
    }

    /// Look up a record by division identifier (first occurrence wins).
    pub fn by_division(&self, id: &DivisionId) -> Option<&DiffRecord> {
        self.by_id.get(id).and_then(|&i| self.records.get(i))
    }

    /// Number of divisions in the table.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over records in ordinal order.
    pub fn iter(&self) -> impl Iterator<Item = &DiffRecord> {
        self.records.iter()
    }

    /// A representative finite sample value, used to choose the numeric
    /// type when provisioning the derived variable.
    pub fn representative(&self) -> Option<f64> {
        self.records
            .iter()
            .flat_map(|r| r.values.iter())
            .copied()
            .find(|v| v.is_finite())
    }
}

/// Errors from difference computation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DiffError {
    /// One of the comparison's variables is not present in the store.
    #[snafu(display("{role} variable '{name}' is not present in the store"))]
    MissingVariable {
        /// `reference` or `candidate`.
        role: String,
        /// The missing variable name.
        name: String,
    },

    /// Store error while reading a division's time series.
    #[snafu(display("Failed to read store data: {source}"))]
    Read {
        /// Underlying store error.
        source: StoreError,
    },
}

/// Elementwise `candidate - reference` with missing-value propagation.
///
/// A non-finite entry in either operand yields NaN at that time step; a
/// difference is never manufactured from a missing operand.
pub fn masked_diff(reference: &[f64], candidate: &[f64]) -> Vec<f64> {
    reference
        .iter()
        .zip(candidate.iter())
        .map(|(&r, &c)| {
            if r.is_finite() && c.is_finite() {
                c - r
            } else {
                f64::NAN
            }
        })
        .collect()
}

/// Compute per-division differences for one comparison spec.
///
/// Reads the store's division list once; its stored order defines ordinal
/// positions for the rest of the run. Both variables must exist before any
/// row is read.
pub fn compute_diffs<S: ArrayStore>(store: &S, spec: &ComparisonSpec) -> Result<DiffTable, DiffError> {
    for (role, name) in [("reference", &spec.reference), ("candidate", &spec.candidate)] {
        ensure!(
            store.has_variable(name),
            MissingVariableSnafu { role, name: name.clone() }
        );
    }

    let divisions: Vec<DivisionId> = store.division_ids().to_vec();
    let mut table = DiffTable::new();

    for (ordinal, division) in divisions.into_iter().enumerate() {
        info!("Computing diffs for climate division ID: {division}");

        let reference = store.read_row(&spec.reference, ordinal).context(ReadSnafu)?;
        let candidate = store.read_row(&spec.candidate, ordinal).context(ReadSnafu)?;

        table.insert(division, masked_diff(&reference, &candidate));
    }

    Ok(table)
}
