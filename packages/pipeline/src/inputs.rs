//! Loading the four input files.

use std::path::PathBuf;

use trauma_desert_area_models::{AreaUnit, IncidentRecord, ReachabilityPolygon};
use trauma_desert_ingest::{
    IngestError, open, read_boundaries, read_demographics, read_incidents, read_isochrones,
};

use crate::{PipelineError, Stage};

/// Locations of the input files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPaths {
    /// `GeoJSON` area unit boundaries.
    pub boundaries: PathBuf,
    /// Demographic CSV keyed by area unit id.
    pub demographics: PathBuf,
    /// Incident CSV.
    pub incidents: PathBuf,
    /// `GeoJSON` reachability polygons.
    pub isochrones: PathBuf,
}

/// Validated inputs of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisInputs {
    /// Area units with demographics attached.
    pub area_units: Vec<AreaUnit>,
    /// Every incident row, valid or not.
    pub incidents: Vec<IncidentRecord>,
    /// Reachability polygons of the target facilities.
    pub isochrones: Vec<ReachabilityPolygon>,
}

impl AnalysisInputs {
    /// Reads and validates every input file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Stage`] at [`Stage::Ingestion`] wrapping the
    /// first read or schema error, which names the file and record.
    pub fn load(paths: &InputPaths) -> Result<Self, PipelineError> {
        let ingest = |e: IngestError| PipelineError::stage(Stage::Ingestion, e);
        let name = |path: &PathBuf| path.display().to_string();

        let demographics = read_demographics(
            open(&paths.demographics).map_err(ingest)?,
            &name(&paths.demographics),
        )
        .map_err(ingest)?;
        let area_units = read_boundaries(
            open(&paths.boundaries).map_err(ingest)?,
            &name(&paths.boundaries),
            &demographics,
        )
        .map_err(ingest)?;
        let incidents = read_incidents(
            open(&paths.incidents).map_err(ingest)?,
            &name(&paths.incidents),
        )
        .map_err(ingest)?;
        let isochrones = read_isochrones(
            open(&paths.isochrones).map_err(ingest)?,
            &name(&paths.isochrones),
        )
        .map_err(ingest)?;

        Ok(Self {
            area_units,
            incidents,
            isochrones,
        })
    }
}
