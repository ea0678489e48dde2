//! Drive-time isochrone reader.
//!
//! Each feature is one facility's reachability polygon for one
//! threshold. The facility is named by `facility_id` (or the generator's
//! `hospital_name`) and the threshold by `threshold_minutes` (or
//! `time_minutes`). Thresholds are validated later when the reachability
//! index is built.

use std::io::Read;

use serde_json::Value;
use trauma_desert_area_models::ReachabilityPolygon;
use trauma_desert_spatial::geometry::geojson_to_multipolygon;

use crate::IngestError;
use crate::boundaries::{property_text, read_features};

const FACILITY_PROPERTIES: [&str; 2] = ["facility_id", "hospital_name"];
const THRESHOLD_PROPERTIES: [&str; 2] = ["threshold_minutes", "time_minutes"];

fn whole_minutes(value: &Value) -> Option<u32> {
    let minutes = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    if minutes.fract() != 0.0 || !(0.0..=f64::from(u32::MAX)).contains(&minutes) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(minutes as u32)
}

/// Reads every isochrone polygon.
///
/// # Errors
///
/// * [`IngestError::MissingProperty`] without a facility or threshold
/// * [`IngestError::InvalidField`] for a fractional or negative threshold
/// * [`IngestError::MissingGeometry`] / [`IngestError::Spatial`] for
///   absent or non-areal geometry
pub fn read_isochrones(
    reader: impl Read,
    source_name: &str,
) -> Result<Vec<ReachabilityPolygon>, IngestError> {
    let features = read_features(reader, source_name)?;
    let mut polygons = Vec::with_capacity(features.len());

    for (index, feature) in features.into_iter().enumerate() {
        let missing = |property| IngestError::MissingProperty {
            source_name: source_name.to_string(),
            feature: index,
            property,
        };

        let facility_id =
            property_text(&feature, &FACILITY_PROPERTIES).ok_or_else(|| missing("facility_id"))?;
        let raw_threshold = THRESHOLD_PROPERTIES
            .iter()
            .find_map(|name| feature.property(*name))
            .ok_or_else(|| missing("threshold_minutes"))?;
        let threshold_minutes =
            whole_minutes(raw_threshold).ok_or_else(|| IngestError::InvalidField {
                source_name: source_name.to_string(),
                record_id: facility_id.clone(),
                field: "threshold_minutes",
                value: raw_threshold.to_string(),
            })?;

        let geometry = feature
            .geometry
            .ok_or_else(|| IngestError::MissingGeometry {
                source_name: source_name.to_string(),
                feature: index,
            })?;

        polygons.push(ReachabilityPolygon {
            geometry: geojson_to_multipolygon(&facility_id, geometry)?,
            facility_id,
            threshold_minutes,
        });
    }

    log::info!("Read {} isochrone polygons from {source_name}", polygons.len());
    Ok(polygons)
}
