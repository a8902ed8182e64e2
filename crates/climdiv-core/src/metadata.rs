//! Variable metadata resolution for supported climate indices.
//!
//! Each index an upstream processor can compute maps to a fixed attribute
//! record: the variable name it is stored under, CF-style standard/long
//! names, a valid range, and optional units. Single-scale indices (PET and
//! the Palmer family) use the identifier itself as the variable name;
//! month-scaled indices (percent of normal, SPI, SPEI) append the
//! zero-padded two-digit scale, e.g. 3-month gamma-fitted SPI is stored as
//! `spi_gamma_03`.
//!
//! The set of supported indices is closed. Resolution is a pure function
//! with no I/O and no shared state, safe to call from any thread.

use snafu::prelude::*;
use std::collections::BTreeMap;

/// Errors from resolving an index identifier to its metadata.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum ResolveError {
    /// The identifier does not name a supported index.
    #[snafu(display("{name} is an unsupported index type"))]
    UnsupportedIndex {
        /// The offending identifier.
        name: String,
    },

    /// The identifier names a month-scaled index but no scale was given.
    #[snafu(display("index {name} requires a time scale in months"))]
    MissingTimeScale {
        /// The identifier that was missing its scale.
        name: String,
    },
}

/// Immutable attribute record for one resolved index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    /// Name the index is stored under in the array store.
    pub variable_name: String,
    /// CF-style standard name; equals the variable name for these datasets.
    pub standard_name: String,
    /// Human-readable description.
    pub long_name: String,
    /// Smallest physically meaningful value.
    pub valid_min: f64,
    /// Largest physically meaningful value.
    pub valid_max: f64,
    /// Measurement units, when the index is not dimensionless.
    pub units: Option<String>,
}

impl IndexMetadata {
    /// Render the record as a generic attribute map suitable for storing
    /// on an array-store variable.
    pub fn attributes(&self) -> BTreeMap<String, serde_json::Value> {
        let mut attrs = BTreeMap::new();
        attrs.insert("standard_name".to_string(), self.standard_name.clone().into());
        attrs.insert("long_name".to_string(), self.long_name.clone().into());
        attrs.insert("valid_min".to_string(), self.valid_min.into());
        attrs.insert("valid_max".to_string(), self.valid_max.into());
        if let Some(units) = &self.units {
            attrs.insert("units".to_string(), units.clone().into());
        }
        attrs
    }
}

/// The closed set of climate indices this processor understands.
///
/// One variant per index family; month-scaled families carry their scale so
/// an index value is fully determined by the variant alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClimateIndex {
    /// Potential evapotranspiration from Thornthwaite's equation.
    Pet,
    /// Palmer Drought Severity Index.
    Pdsi,
    /// Self-calibrated Palmer Drought Severity Index.
    ScPdsi,
    /// Palmer Hydrological Drought Index.
    Phdi,
    /// Palmer Modified Drought Index.
    Pmdi,
    /// Palmer Z-Index.
    ZIndex,
    /// Percent of normal precipitation at the given month scale.
    PercentOfNormal(u8),
    /// Standardized Precipitation Index, gamma fitting, at the given scale.
    SpiGamma(u8),
    /// Standardized Precipitation Index, Pearson III fitting, at the given scale.
    SpiPearson(u8),
    /// Standardized Precipitation-Evapotranspiration Index, gamma fitting.
    SpeiGamma(u8),
    /// Standardized Precipitation-Evapotranspiration Index, Pearson III fitting.
    SpeiPearson(u8),
}

/// Valid range shared by the Palmer family of indices.
const PALMER_RANGE: (f64, f64) = (-10.0, 10.0);

/// Valid range shared by the SPI/SPEI variants (dimensionless sigma units).
const SIGMA_RANGE: (f64, f64) = (-3.09, 3.09);

impl ClimateIndex {
    /// Resolve an index identifier and optional month scale to a variant.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::UnsupportedIndex`] for identifiers outside the
    ///   closed set; resolution never falls through silently.
    /// - [`ResolveError::MissingTimeScale`] when a month-scaled identifier
    ///   is given without a scale.
    pub fn resolve(name: &str, months: Option<u8>) -> Result<Self, ResolveError> {
        let scaled = |index: fn(u8) -> ClimateIndex| {
            months
                .map(index)
                .context(MissingTimeScaleSnafu { name })
        };

        match name {
            "pet" => Ok(ClimateIndex::Pet),
            "pdsi" => Ok(ClimateIndex::Pdsi),
            "scpdsi" => Ok(ClimateIndex::ScPdsi),
            "phdi" => Ok(ClimateIndex::Phdi),
            "pmdi" => Ok(ClimateIndex::Pmdi),
            "zindex" => Ok(ClimateIndex::ZIndex),
            "pnp" => scaled(ClimateIndex::PercentOfNormal),
            "spi_gamma" => scaled(ClimateIndex::SpiGamma),
            "spi_pearson" => scaled(ClimateIndex::SpiPearson),
            "spei_gamma" => scaled(ClimateIndex::SpeiGamma),
            "spei_pearson" => scaled(ClimateIndex::SpeiPearson),
            _ => UnsupportedIndexSnafu { name }.fail(),
        }
    }

    /// The name this index is stored under in the array store.
    pub fn variable_name(&self) -> String {
        match *self {
            ClimateIndex::Pet => "pet".to_string(),
            ClimateIndex::Pdsi => "pdsi".to_string(),
            ClimateIndex::ScPdsi => "scpdsi".to_string(),
            ClimateIndex::Phdi => "phdi".to_string(),
            ClimateIndex::Pmdi => "pmdi".to_string(),
            ClimateIndex::ZIndex => "zindex".to_string(),
            ClimateIndex::PercentOfNormal(m) => format!("pnp_{m:02}"),
            ClimateIndex::SpiGamma(m) => format!("spi_gamma_{m:02}"),
            ClimateIndex::SpiPearson(m) => format!("spi_pearson_{m:02}"),
            ClimateIndex::SpeiGamma(m) => format!("spei_gamma_{m:02}"),
            ClimateIndex::SpeiPearson(m) => format!("spei_pearson_{m:02}"),
        }
    }

    /// The immutable attribute record for this index.
    pub fn metadata(&self) -> IndexMetadata {
        let variable_name = self.variable_name();

        let (long_name, (valid_min, valid_max), units) = match *self {
            ClimateIndex::Pet => (
                "Potential Evapotranspiration (PET), from Thornthwaite's equation".to_string(),
                (0.0, 2000.0),
                Some("millimeter".to_string()),
            ),
            ClimateIndex::Pdsi => (
                "Palmer Drought Severity Index (PDSI)".to_string(),
                PALMER_RANGE,
                None,
            ),
            ClimateIndex::ScPdsi => (
                "Self-calibrated Palmer Drought Severity Index (PDSI)".to_string(),
                PALMER_RANGE,
                None,
            ),
            ClimateIndex::Phdi => (
                "Palmer Hydrological Drought Index (PHDI)".to_string(),
                PALMER_RANGE,
                None,
            ),
            ClimateIndex::Pmdi => (
                "Palmer Modified Drought Index (PMDI)".to_string(),
                PALMER_RANGE,
                None,
            ),
            ClimateIndex::ZIndex => ("Palmer Z-Index".to_string(), PALMER_RANGE, None),
            ClimateIndex::PercentOfNormal(m) => (
                format!("Percent average precipitation, {m}-month scale"),
                (0.0, 10.0),
                Some("percent of average".to_string()),
            ),
            ClimateIndex::SpiGamma(m) => {
                (format!("SPI (Gamma), {m}-month scale"), SIGMA_RANGE, None)
            }
            ClimateIndex::SpiPearson(m) => {
                (format!("SPI (Pearson), {m}-month scale"), SIGMA_RANGE, None)
            }
            ClimateIndex::SpeiGamma(m) => {
                (format!("SPEI (Gamma), {m}-month scale"), SIGMA_RANGE, None)
            }
            ClimateIndex::SpeiPearson(m) => {
                (format!("SPEI (Pearson), {m}-month scale"), SIGMA_RANGE, None)
            }
        };

        IndexMetadata {
            standard_name: variable_name.clone(),
            variable_name,
            long_name,
            valid_min,
            valid_max,
            units,
        }
    }
}

/// Resolve an index identifier directly to its attribute record.
///
/// Convenience wrapper over [`ClimateIndex::resolve`] followed by
/// [`ClimateIndex::metadata`].
pub fn resolve_metadata(name: &str, months: Option<u8>) -> Result<IndexMetadata, ResolveError> {
    ClimateIndex::resolve(name, months).map(|index| index.metadata())
}
