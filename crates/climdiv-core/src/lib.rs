//! Core engine for validating climate-division drought index datasets.
//!
//! This crate provides the foundational pieces for `climdiv-validate`:
//!
//! - A directory-backed, self-describing array store over the shared
//!   `(division, time)` dimensions, with atomic metadata updates and
//!   partial-row writes (`store` and `storage` modules).
//! - A metadata resolver mapping a climate index identifier (plus an
//!   optional month scale) to its canonical variable attributes
//!   (`metadata` module).
//! - A diff computation engine producing per-division masked differences
//!   between a reference and a candidate variable (`diff` module).
//! - A variable provisioner that persists those differences back into the
//!   store under a derived `diffs_*` variable, skipping rows whose length
//!   disagrees with the store's time extent (`persist` module).
//! - A per-path lock registry serializing writers targeting the same
//!   output store (`locks` module).
//! - Diagnostic plotting of difference histograms and overlay line charts
//!   (`plot` module), and the comparison pipeline tying it all together
//!   (`pipeline` module).
//!
//! Higher-level crates (for example, the `climdiv` CLI) are expected to
//! depend on this core crate rather than re-implementing the comparison
//! and persistence logic.
#![deny(missing_docs)]

pub mod diff;
pub mod ingest;
pub mod locks;
pub mod metadata;
pub mod persist;
pub mod pipeline;
pub mod plot;
pub mod storage;
pub mod store;
