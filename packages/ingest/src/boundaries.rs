//! Area unit boundary reader.
//!
//! Reads a `GeoJSON` `FeatureCollection` of tract polygons, joins each
//! feature to its demographics by id and builds validated
//! [`AreaUnit`]s.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;

use geojson::{Feature, FeatureCollection, GeoJson};
use serde_json::Value;
use trauma_desert_area_models::{AreaUnit, Demographics};
use trauma_desert_spatial::geometry::{build_area_unit, geojson_to_multipolygon};

use crate::IngestError;

const ID_PROPERTIES: [&str; 3] = ["GEOID", "geoid", "id"];
const NAME_PROPERTIES: [&str; 3] = ["NAMELSAD", "NAME", "name"];

/// Renders a string or numeric property as text.
pub(crate) fn property_text(feature: &Feature, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match feature.property(*name)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Parses a `GeoJSON` document into its features.
pub(crate) fn read_features(
    mut reader: impl Read,
    source_name: &str,
) -> Result<Vec<Feature>, IngestError> {
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|source| IngestError::Io {
            path: source_name.to_string(),
            source,
        })?;

    let geojson: GeoJson = text.parse().map_err(|source| IngestError::GeoJson {
        source_name: source_name.to_string(),
        source: Box::new(source),
    })?;
    let collection =
        FeatureCollection::try_from(geojson).map_err(|_| IngestError::NotFeatureCollection {
            source_name: source_name.to_string(),
        })?;
    Ok(collection.features)
}

/// Reads boundaries and attaches demographics.
///
/// Units without a demographic row get empty [`Demographics`] and are
/// logged; demographic rows without a boundary are ignored.
///
/// # Errors
///
/// * [`IngestError::GeoJson`] / [`IngestError::NotFeatureCollection`] for
///   a malformed document
/// * [`IngestError::MissingProperty`] / [`IngestError::MissingGeometry`]
///   for an incomplete feature
/// * [`IngestError::DuplicateId`] for a repeated id
/// * [`IngestError::Spatial`] for invalid or zero-area geometry
pub fn read_boundaries(
    reader: impl Read,
    source_name: &str,
    demographics: &BTreeMap<String, Demographics>,
) -> Result<Vec<AreaUnit>, IngestError> {
    let features = read_features(reader, source_name)?;

    let mut seen = BTreeSet::new();
    let mut missing_demographics = 0;
    let mut units = Vec::with_capacity(features.len());

    for (index, feature) in features.into_iter().enumerate() {
        let id = property_text(&feature, &ID_PROPERTIES).ok_or_else(|| {
            IngestError::MissingProperty {
                source_name: source_name.to_string(),
                feature: index,
                property: "GEOID",
            }
        })?;
        if !seen.insert(id.clone()) {
            return Err(IngestError::DuplicateId {
                source_name: source_name.to_string(),
                id,
            });
        }
        let name = property_text(&feature, &NAME_PROPERTIES).unwrap_or_else(|| id.clone());

        let geometry = feature
            .geometry
            .ok_or_else(|| IngestError::MissingGeometry {
                source_name: source_name.to_string(),
                feature: index,
            })?;
        let geometry = geojson_to_multipolygon(&id, geometry)?;

        let unit_demographics = demographics.get(&id).cloned().unwrap_or_else(|| {
            missing_demographics += 1;
            Demographics::default()
        });

        units.push(build_area_unit(id, name, geometry, unit_demographics)?);
    }

    if missing_demographics > 0 {
        log::warn!("{source_name}: {missing_demographics} area units have no demographic row");
    }
    log::info!("Read {} area units from {source_name}", units.len());

    Ok(units)
}
