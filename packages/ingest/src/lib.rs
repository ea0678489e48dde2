#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Input readers and output writers.
//!
//! Every reader validates its whole input once at the boundary and
//! returns typed records; downstream stages never see raw rows. Schema
//! defects (missing columns, unparsable demographics, bad geometry) fail
//! the read with the offending record. Incident rows with unusable
//! coordinates or dates are kept and flagged invalid so they can be
//! counted.

pub mod boundaries;
pub mod demographics;
pub mod incidents;
pub mod isochrones;
pub mod output;

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use trauma_desert_spatial::SpatialError;

pub use boundaries::read_boundaries;
pub use demographics::read_demographics;
pub use incidents::read_incidents;
pub use isochrones::read_isochrones;
pub use output::{write_csv, write_csv_file};

/// Errors raised while reading inputs or writing tables.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// I/O error opening or reading a file.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// CSV parsing or writing error.
    #[error("CSV error in {source_name}: {source}")]
    Csv {
        /// Input or output name.
        source_name: String,
        /// Underlying CSV error.
        source: csv::Error,
    },

    /// The document is not valid `GeoJSON`.
    #[error("GeoJSON error in {source_name}: {source}")]
    GeoJson {
        /// Input name.
        source_name: String,
        /// Underlying `GeoJSON` error.
        source: Box<geojson::Error>,
    },

    /// The document is valid `GeoJSON` but not a feature collection.
    #[error("{source_name} is not a GeoJSON FeatureCollection")]
    NotFeatureCollection {
        /// Input name.
        source_name: String,
    },

    /// A feature has no geometry.
    #[error("Feature {feature} in {source_name} has no geometry")]
    MissingGeometry {
        /// Input name.
        source_name: String,
        /// Zero-based feature index.
        feature: usize,
    },

    /// A feature lacks a required property.
    #[error("Feature {feature} in {source_name} has no {property} property")]
    MissingProperty {
        /// Input name.
        source_name: String,
        /// Zero-based feature index.
        feature: usize,
        /// Accepted property names.
        property: &'static str,
    },

    /// A field could not be parsed or is out of range.
    #[error("Record {record_id} in {source_name} has invalid {field} '{value}'")]
    InvalidField {
        /// Input name.
        source_name: String,
        /// Offending record.
        record_id: String,
        /// Field name.
        field: &'static str,
        /// The raw value.
        value: String,
    },

    /// Two records share an id.
    #[error("Duplicate id {id} in {source_name}")]
    DuplicateId {
        /// Input name.
        source_name: String,
        /// The repeated id.
        id: String,
    },

    /// A boundary geometry failed validation.
    #[error(transparent)]
    Spatial(#[from] SpatialError),
}

/// Opens `path` for buffered reading.
///
/// # Errors
///
/// Returns [`IngestError::Io`] if the file cannot be opened.
pub fn open(path: &Path) -> Result<BufReader<File>, IngestError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| IngestError::Io {
            path: path.display().to_string(),
            source,
        })
}

/// Parses an optional numeric field; blank is `None`.
pub(crate) fn parse_f64(
    source_name: &str,
    record_id: &str,
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<f64>, IngestError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| IngestError::InvalidField {
            source_name: source_name.to_string(),
            record_id: record_id.to_string(),
            field,
            value: raw.to_string(),
        })
}
