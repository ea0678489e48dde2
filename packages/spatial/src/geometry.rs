//! Geometry validation, equal-area measurement and `GeoJSON` conversion.
//!
//! All areas are computed with one fixed projection (Lambert cylindrical
//! equal-area on the mean-radius sphere) so that densities are comparable
//! across area units.

use geo::{Area, BoundingRect, Centroid, Coord, MapCoords, MultiPolygon, Validation};
use rstar::AABB;
use trauma_desert_area_models::{AreaUnit, Demographics};

use crate::SpatialError;

/// Mean Earth radius in meters (IUGG).
const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Square meters per square mile.
pub const SQ_METERS_PER_SQ_MILE: f64 = 2_589_988.110_336;

/// Rejects geometry that would silently bias downstream metrics.
///
/// # Errors
///
/// * [`SpatialError::NonFiniteCoordinate`] if any coordinate is NaN or infinite
/// * [`SpatialError::EmptyGeometry`] if the geometry has no polygons
/// * [`SpatialError::InvalidGeometry`] if a ring self-intersects or is
///   degenerate
pub fn validate_geometry(
    record_id: &str,
    geometry: &MultiPolygon<f64>,
) -> Result<(), SpatialError> {
    if geometry.0.is_empty() {
        return Err(SpatialError::EmptyGeometry {
            record_id: record_id.to_string(),
        });
    }

    let non_finite = geometry.0.iter().any(|polygon| {
        std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .flat_map(|ring| ring.0.iter())
            .any(|c| !c.x.is_finite() || !c.y.is_finite())
    });
    if non_finite {
        return Err(SpatialError::NonFiniteCoordinate {
            record_id: record_id.to_string(),
        });
    }

    if !geometry.is_valid() {
        return Err(SpatialError::InvalidGeometry {
            record_id: record_id.to_string(),
            message: "self-intersecting, overlapping or degenerate ring".to_string(),
        });
    }

    Ok(())
}

/// Projects WGS84 longitude/latitude onto the cylindrical equal-area plane
/// (meters).
#[must_use]
pub fn project_equal_area(geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    geometry.map_coords(|Coord { x, y }| Coord {
        x: EARTH_RADIUS_M * x.to_radians(),
        y: EARTH_RADIUS_M * y.to_radians().sin(),
    })
}

/// Area of a WGS84 geometry in square miles.
#[must_use]
pub fn area_sq_mi(geometry: &MultiPolygon<f64>) -> f64 {
    project_equal_area(geometry).unsigned_area() / SQ_METERS_PER_SQ_MILE
}

/// Bounding box envelope for the R-tree.
pub(crate) fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

/// Validates a boundary and derives its area and centroid.
///
/// # Errors
///
/// Returns the first validation failure of [`validate_geometry`], or
/// [`SpatialError::ZeroArea`] if the boundary encloses no area.
pub fn build_area_unit(
    id: impl Into<String>,
    name: impl Into<String>,
    geometry: MultiPolygon<f64>,
    demographics: Demographics,
) -> Result<AreaUnit, SpatialError> {
    let id = id.into();
    validate_geometry(&id, &geometry)?;

    let area_sq_mi = area_sq_mi(&geometry);
    if area_sq_mi <= 0.0 {
        return Err(SpatialError::ZeroArea { record_id: id });
    }

    let Some(centroid) = geometry.centroid() else {
        return Err(SpatialError::EmptyGeometry { record_id: id });
    };

    Ok(AreaUnit {
        id,
        name: name.into(),
        geometry,
        area_sq_mi,
        centroid,
        demographics,
    })
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
///
/// Handles both `Polygon` and `MultiPolygon` geometry types.
///
/// # Errors
///
/// * [`SpatialError::GeoJson`] if the geometry cannot be converted
/// * [`SpatialError::UnsupportedGeometry`] for non-areal geometry types
pub fn geojson_to_multipolygon(
    record_id: &str,
    geometry: geojson::Geometry,
) -> Result<MultiPolygon<f64>, SpatialError> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        geo::Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        other => Err(SpatialError::UnsupportedGeometry {
            record_id: record_id.to_string(),
            kind: geometry_kind(&other).to_string(),
        }),
    }
}

const fn geometry_kind(geometry: &geo::Geometry<f64>) -> &'static str {
    match geometry {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::Line(_) | geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        _ => "Polygonal",
    }
}
