//! Self-describing array store over the shared `(division, time)` dimensions.
//!
//! A division store is a directory holding:
//!
//! - `store.json` — the metadata document: format version, creation
//!   timestamp, the ordered division identifier list, the time-dimension
//!   size, and one record per named variable (numeric type, dimensions,
//!   fill value, attributes). Updated with atomic write-then-rename.
//! - `<variable>.dat` — raw little-endian values in row-major
//!   `(division, time)` order, pre-filled with the variable's fill value
//!   at creation time.
//!
//! The ordinal position of a division in the stored list is the join key
//! between variables; identifiers are carried alongside for reporting and
//! identifier-based lookup. Duplicate identifiers are tolerated but flagged
//! with a warning when a store is opened, since identifier-based addressing
//! is ambiguous in that case.
//!
//! Missing values are represented as NaN in memory. `store.json` records a
//! `null` fill value to mean the NaN sentinel, since JSON cannot carry NaN
//! directly; finite fill sentinels are mapped to NaN on read.

use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    path::{Path, PathBuf},
};

use crate::storage::{self, StorageError, StoreLocation};

/// Current store metadata format version.
///
/// Bumped only when we make a breaking change to the on-disk JSON format.
pub const STORE_FORMAT_VERSION: u32 = 1;

/// Name of the metadata document inside the store root.
const META_FILE: &str = "store.json";

/// Result type used by store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// An opaque identifier naming one spatial/administrative unit.
///
/// Identifiers may be integers (the common case for US climate divisions)
/// or strings. The identifier is *not* the join key between variables; the
/// ordinal position in the store's division list is. Callers must not
/// assume identifiers are unique without checking [`DivisionStore::open`]'s
/// duplicate warning.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DivisionId {
    /// A numeric division identifier.
    Num(i64),
    /// A named division identifier.
    Name(String),
}

impl fmt::Display for DivisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DivisionId::Num(n) => write!(f, "{n}"),
            DivisionId::Name(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for DivisionId {
    fn from(n: i64) -> Self {
        DivisionId::Num(n)
    }
}

impl From<&str> for DivisionId {
    fn from(s: &str) -> Self {
        DivisionId::Name(s.to_string())
    }
}

/// Numeric element type of a stored variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericType {
    /// 32-bit IEEE 754 floating point.
    F32,
    /// 64-bit IEEE 754 floating point.
    F64,
}

impl NumericType {
    /// Width of one element in bytes.
    pub fn width(self) -> usize {
        match self {
            NumericType::F32 => 4,
            NumericType::F64 => 8,
        }
    }

    /// Choose the narrowest type that represents `value` without loss.
    ///
    /// Used when provisioning a derived variable from a representative
    /// sample of the data that will be stored in it.
    pub fn for_value(value: f64) -> Self {
        if value.is_nan() || (value as f32) as f64 == value {
            NumericType::F32
        } else {
            NumericType::F64
        }
    }
}

/// Metadata record for one named variable in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableMeta {
    /// Variable name, unique within the store.
    pub name: String,
    /// Element type of the stored data.
    pub numeric_type: NumericType,
    /// Dimension names, outermost first. Always `("division", "time")`.
    pub dimensions: (String, String),
    /// Declared fill value; `None` encodes the NaN sentinel since JSON
    /// cannot represent NaN.
    pub fill_value: Option<f64>,
    /// Free-form attributes (standard name, valid range, units, ...).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl VariableMeta {
    /// The fill value as an `f64`, with `None` mapped to NaN.
    pub fn fill(&self) -> f64 {
        self.fill_value.unwrap_or(f64::NAN)
    }
}

/// On-disk metadata document for a division store.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreMeta {
    format_version: u32,
    created_at: DateTime<Utc>,
    divisions: Vec<DivisionId>,
    time_size: usize,
    variables: BTreeMap<String, VariableMeta>,
}

/// Errors from division store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    /// Storage error while accessing store data or metadata.
    #[snafu(display("Storage error while accessing store data: {source}"))]
    Storage {
        /// Underlying storage error.
        #[snafu(backtrace)]
        source: StorageError,
    },

    /// The metadata document could not be decoded.
    #[snafu(display("Corrupt store metadata at {path}: {source}"))]
    MetaDecode {
        /// Path of the metadata document.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The metadata document could not be encoded.
    #[snafu(display("Failed to encode store metadata: {source}"))]
    MetaEncode {
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// The metadata document declares an unsupported format version.
    #[snafu(display(
        "Unsupported store format version {found} (this build supports {supported})"
    ))]
    UnsupportedFormat {
        /// Version found in the metadata document.
        found: u32,
        /// Version supported by this build.
        supported: u32,
    },

    /// A named variable is not present in the store.
    #[snafu(display("Variable '{name}' is not present in the store"))]
    UnknownVariable {
        /// The missing variable name.
        name: String,
    },

    /// A division ordinal beyond the store's division list was requested.
    #[snafu(display(
        "Division ordinal {ordinal} is out of range (store has {divisions} divisions)"
    ))]
    DivisionOutOfRange {
        /// The requested ordinal.
        ordinal: usize,
        /// Number of divisions in the store.
        divisions: usize,
    },

    /// A row write supplied an array whose length differs from the store's
    /// time-dimension size.
    #[snafu(display(
        "Row for variable '{variable}' has {actual} time steps, expected {expected}"
    ))]
    RowLength {
        /// The variable being written.
        variable: String,
        /// The store's declared time size.
        expected: usize,
        /// The supplied array length.
        actual: usize,
    },
}

/// Read/write access to named variables over `(division, time)` dimensions.
///
/// This is the narrow contract the comparison pipeline consumes: an ordered
/// division listing, a time-dimension size, per-variable row reads, partial
/// row writes, and idempotent variable provisioning. [`DivisionStore`] is
/// the directory-backed implementation shipped with this crate.
pub trait ArrayStore {
    /// The ordered division identifier list. Ordinal positions in this
    /// slice define row positions for every variable in the store.
    fn division_ids(&self) -> &[DivisionId];

    /// Declared size of the time dimension.
    fn time_size(&self) -> usize;

    /// Whether a variable of the given name exists.
    fn has_variable(&self, name: &str) -> bool;

    /// Metadata record for the given variable, if present.
    fn variable(&self, name: &str) -> Option<&VariableMeta>;

    /// Ensure a variable exists, creating it if necessary.
    ///
    /// If a variable of this name is already present it is reused as-is: no
    /// attribute, type, or shape changes are applied and its data is left
    /// untouched. Otherwise a new variable is created over
    /// `(division, time)` with every element set to the fill value.
    fn ensure_variable(
        &mut self,
        name: &str,
        numeric_type: NumericType,
        fill_value: Option<f64>,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> StoreResult<()>;

    /// Read one division's full time series for the named variable.
    ///
    /// Values equal to a finite fill sentinel are surfaced as NaN; the
    /// returned vector always has `time_size()` elements.
    fn read_row(&self, variable: &str, ordinal: usize) -> StoreResult<Vec<f64>>;

    /// Write one division's full time series for the named variable,
    /// without touching any other division's row.
    fn write_row(&mut self, variable: &str, ordinal: usize, values: &[f64]) -> StoreResult<()>;

    /// Stable path identity of the store, used to key the per-path write
    /// lock registry.
    fn store_path(&self) -> &Path;
}

/// Directory-backed division store.
///
/// See the module documentation for the on-disk layout.
#[derive(Debug)]
pub struct DivisionStore {
    location: StoreLocation,
    root: PathBuf,
    meta: StoreMeta,
}

impl DivisionStore {
    /// Create a new store at `root` with the given division list and
    /// time-dimension size.
    ///
    /// The root directory is created if needed; the metadata document is
    /// written atomically. Fails if a metadata document already exists.
    pub fn create(
        root: impl Into<PathBuf>,
        divisions: Vec<DivisionId>,
        time_size: usize,
    ) -> StoreResult<Self> {
        let root = root.into();
        let location = StoreLocation::local(&root);

        let meta = StoreMeta {
            format_version: STORE_FORMAT_VERSION,
            created_at: Utc::now(),
            divisions,
            time_size,
            variables: BTreeMap::new(),
        };

        let store = DivisionStore {
            location,
            root,
            meta,
        };
        let encoded = store.encode_meta()?;
        storage::write_new(&store.location, Path::new(META_FILE), &encoded)
            .context(StorageSnafu)?;
        Ok(store)
    }

    /// Open an existing store at `root`.
    ///
    /// Duplicate division identifiers are legal for ordinal-based access
    /// but make identifier-based lookup ambiguous, so they are reported
    /// with a warning here rather than silently accepted.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        let location = StoreLocation::local(&root);

        let meta_path = root.join(META_FILE);
        let raw =
            storage::read_to_string(&location, Path::new(META_FILE)).context(StorageSnafu)?;
        let meta: StoreMeta = serde_json::from_str(&raw).context(MetaDecodeSnafu {
            path: meta_path.display().to_string(),
        })?;

        ensure!(
            meta.format_version == STORE_FORMAT_VERSION,
            UnsupportedFormatSnafu {
                found: meta.format_version,
                supported: STORE_FORMAT_VERSION,
            }
        );

        let mut seen = HashSet::new();
        for id in &meta.divisions {
            if !seen.insert(id) {
                warn!(
                    "Store at {} contains duplicate division identifier {id}; \
                     identifier-based lookups will resolve to the first occurrence",
                    root.display()
                );
            }
        }

        Ok(DivisionStore {
            location,
            root,
            meta,
        })
    }

    fn encode_meta(&self) -> StoreResult<Vec<u8>> {
        serde_json::to_vec_pretty(&self.meta).context(MetaEncodeSnafu)
    }

    fn write_meta(&self) -> StoreResult<()> {
        let encoded = self.encode_meta()?;
        storage::write_atomic(&self.location, Path::new(META_FILE), &encoded)
            .context(StorageSnafu)
    }

    fn data_rel(name: &str) -> PathBuf {
        PathBuf::from(format!("{name}.dat"))
    }

    fn variable_meta(&self, name: &str) -> StoreResult<&VariableMeta> {
        self.meta
            .variables
            .get(name)
            .context(UnknownVariableSnafu { name })
    }

    fn check_ordinal(&self, ordinal: usize) -> StoreResult<()> {
        ensure!(
            ordinal < self.meta.divisions.len(),
            DivisionOutOfRangeSnafu {
                ordinal,
                divisions: self.meta.divisions.len(),
            }
        );
        Ok(())
    }
}

impl ArrayStore for DivisionStore {
    fn division_ids(&self) -> &[DivisionId] {
        &self.meta.divisions
    }

    fn time_size(&self) -> usize {
        self.meta.time_size
    }

    fn has_variable(&self, name: &str) -> bool {
        self.meta.variables.contains_key(name)
    }

    fn variable(&self, name: &str) -> Option<&VariableMeta> {
        self.meta.variables.get(name)
    }

    fn ensure_variable(
        &mut self,
        name: &str,
        numeric_type: NumericType,
        fill_value: Option<f64>,
        attributes: BTreeMap<String, serde_json::Value>,
    ) -> StoreResult<()> {
        if self.meta.variables.contains_key(name) {
            return Ok(());
        }

        let var = VariableMeta {
            name: name.to_string(),
            numeric_type,
            dimensions: ("division".to_string(), "time".to_string()),
            fill_value,
            attributes,
        };

        let elements = self.meta.divisions.len() * self.meta.time_size;
        let contents = fill_pattern(var.fill(), numeric_type, elements);
        storage::write_new(&self.location, &Self::data_rel(name), &contents)
            .context(StorageSnafu)?;

        self.meta.variables.insert(name.to_string(), var);
        self.write_meta()
    }

    fn read_row(&self, variable: &str, ordinal: usize) -> StoreResult<Vec<f64>> {
        let var = self.variable_meta(variable)?;
        self.check_ordinal(ordinal)?;

        let width = var.numeric_type.width();
        let row_bytes = self.meta.time_size * width;
        let offset = (ordinal * row_bytes) as u64;

        let bytes = storage::read_at(&self.location, &Self::data_rel(variable), offset, row_bytes)
            .context(StorageSnafu)?;

        let mut values = decode_row(&bytes, var.numeric_type);
        if let Some(fill) = var.fill_value {
            for v in &mut values {
                if *v == fill {
                    *v = f64::NAN;
                }
            }
        }
        Ok(values)
    }

    fn write_row(&mut self, variable: &str, ordinal: usize, values: &[f64]) -> StoreResult<()> {
        let var = self.variable_meta(variable)?;
        self.check_ordinal(ordinal)?;
        ensure!(
            values.len() == self.meta.time_size,
            RowLengthSnafu {
                variable,
                expected: self.meta.time_size,
                actual: values.len(),
            }
        );

        let numeric_type = var.numeric_type;
        let width = numeric_type.width();
        let row_bytes = self.meta.time_size * width;
        let offset = (ordinal * row_bytes) as u64;

        let bytes = encode_row(values, numeric_type);
        storage::write_at(&self.location, &Self::data_rel(variable), offset, &bytes)
            .context(StorageSnafu)
    }

    fn store_path(&self) -> &Path {
        &self.root
    }
}

fn encode_row(values: &[f64], numeric_type: NumericType) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * numeric_type.width());
    match numeric_type {
        NumericType::F32 => {
            for &v in values {
                out.extend_from_slice(&(v as f32).to_le_bytes());
            }
        }
        NumericType::F64 => {
            for &v in values {
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
    }
    out
}

fn decode_row(bytes: &[u8], numeric_type: NumericType) -> Vec<f64> {
    match numeric_type {
        NumericType::F32 => bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
            .collect(),
        NumericType::F64 => bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect(),
    }
}

fn fill_pattern(fill: f64, numeric_type: NumericType, elements: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(elements * numeric_type.width());
    match numeric_type {
        NumericType::F32 => {
            let unit = (fill as f32).to_le_bytes();
            for _ in 0..elements {
                out.extend_from_slice(&unit);
            }
        }
        NumericType::F64 => {
            let unit = fill.to_le_bytes();
            for _ in 0..elements {
                out.extend_from_slice(&unit);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn divisions() -> Vec<DivisionId> {
        vec![DivisionId::Num(101), DivisionId::Num(102)]
    }

    #[test]
    fn create_then_open_round_trips_metadata() -> TestResult {
        let tmp = TempDir::new()?;
        let root = tmp.path().join("divs");

        let store = DivisionStore::create(&root, divisions(), 4)?;
        assert_eq!(store.time_size(), 4);

        let reopened = DivisionStore::open(&root)?;
        assert_eq!(reopened.division_ids(), divisions().as_slice());
        assert_eq!(reopened.time_size(), 4);
        assert!(!reopened.has_variable("pdsi"));
        Ok(())
    }

    #[test]
    fn create_twice_at_same_root_fails() -> TestResult {
        let tmp = TempDir::new()?;
        let root = tmp.path().join("divs");

        DivisionStore::create(&root, divisions(), 4)?;
        let err = DivisionStore::create(&root, divisions(), 4).expect_err("expected failure");
        assert!(matches!(
            err,
            StoreError::Storage {
                source: StorageError::AlreadyExists { .. }
            }
        ));
        Ok(())
    }

    #[test]
    fn new_variable_rows_start_as_fill() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = DivisionStore::create(tmp.path().join("divs"), divisions(), 4)?;

        store.ensure_variable("pdsi", NumericType::F64, None, BTreeMap::new())?;

        let row = store.read_row("pdsi", 0)?;
        assert_eq!(row.len(), 4);
        assert!(row.iter().all(|v| v.is_nan()));
        Ok(())
    }

    #[test]
    fn write_then_read_row_round_trips_including_nan() -> TestResult {
        let tmp = TempDir::new()?;
        let root = tmp.path().join("divs");
        let mut store = DivisionStore::create(&root, divisions(), 4)?;
        store.ensure_variable("pdsi", NumericType::F64, None, BTreeMap::new())?;

        store.write_row("pdsi", 1, &[1.5, f64::NAN, -3.25, 0.0])?;

        // Re-open to make sure the data survived on disk.
        let reopened = DivisionStore::open(&root)?;
        let row = reopened.read_row("pdsi", 1)?;
        assert_eq!(row[0], 1.5);
        assert!(row[1].is_nan());
        assert_eq!(row[2], -3.25);
        assert_eq!(row[3], 0.0);

        // Row 0 must be untouched.
        assert!(reopened.read_row("pdsi", 0)?.iter().all(|v| v.is_nan()));
        Ok(())
    }

    #[test]
    fn f32_variable_reads_back_as_f64() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = DivisionStore::create(tmp.path().join("divs"), divisions(), 3)?;
        store.ensure_variable("zindex", NumericType::F32, None, BTreeMap::new())?;

        store.write_row("zindex", 0, &[0.5, -1.0, 2.0])?;

        assert_eq!(store.read_row("zindex", 0)?, vec![0.5, -1.0, 2.0]);
        Ok(())
    }

    #[test]
    fn finite_fill_sentinel_surfaces_as_nan() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = DivisionStore::create(tmp.path().join("divs"), divisions(), 3)?;
        store.ensure_variable("prcp", NumericType::F64, Some(-999.0), BTreeMap::new())?;

        store.write_row("prcp", 0, &[1.0, -999.0, 2.0])?;

        let row = store.read_row("prcp", 0)?;
        assert_eq!(row[0], 1.0);
        assert!(row[1].is_nan());
        assert_eq!(row[2], 2.0);
        Ok(())
    }

    #[test]
    fn ensure_variable_is_idempotent() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = DivisionStore::create(tmp.path().join("divs"), divisions(), 4)?;
        store.ensure_variable("pdsi", NumericType::F64, None, BTreeMap::new())?;
        store.write_row("pdsi", 0, &[1.0, 2.0, 3.0, 4.0])?;

        // A second ensure with a different declared type must not alter the
        // existing variable or its data.
        store.ensure_variable("pdsi", NumericType::F32, Some(0.0), BTreeMap::new())?;

        let var = store.variable("pdsi").ok_or("variable missing")?;
        assert_eq!(var.numeric_type, NumericType::F64);
        assert_eq!(var.fill_value, None);
        assert_eq!(store.read_row("pdsi", 0)?, vec![1.0, 2.0, 3.0, 4.0]);
        Ok(())
    }

    #[test]
    fn unknown_variable_and_bad_ordinal_are_rejected() -> TestResult {
        let tmp = TempDir::new()?;
        let mut store = DivisionStore::create(tmp.path().join("divs"), divisions(), 4)?;
        store.ensure_variable("pdsi", NumericType::F64, None, BTreeMap::new())?;

        assert!(matches!(
            store.read_row("nope", 0),
            Err(StoreError::UnknownVariable { .. })
        ));
        assert!(matches!(
            store.read_row("pdsi", 2),
            Err(StoreError::DivisionOutOfRange { .. })
        ));
        assert!(matches!(
            store.write_row("pdsi", 0, &[1.0, 2.0]),
            Err(StoreError::RowLength { .. })
        ));
        Ok(())
    }

    #[test]
    fn numeric_type_for_value_prefers_narrow() {
        assert_eq!(NumericType::for_value(0.5), NumericType::F32);
        assert_eq!(NumericType::for_value(f64::NAN), NumericType::F32);
        assert_eq!(NumericType::for_value(0.1), NumericType::F64);
    }

    #[test]
    fn string_division_ids_survive_serde() -> TestResult {
        let tmp = TempDir::new()?;
        let root = tmp.path().join("divs");
        let ids = vec![DivisionId::from("AL-01"), DivisionId::Num(102)];

        DivisionStore::create(&root, ids.clone(), 2)?;

        let reopened = DivisionStore::open(&root)?;
        assert_eq!(reopened.division_ids(), ids.as_slice());
        Ok(())
    }
}
