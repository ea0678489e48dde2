#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory spatial indexes for incident attribution and reachability.
//!
//! Builds R-tree indexes over validated area unit boundaries and
//! reachability polygons and provides boundary-inclusive point-in-polygon
//! lookups. Every tie is broken by identifier so results never depend on
//! input order.

pub mod geometry;

use std::collections::{BTreeMap, BTreeSet};

use geo::algorithm::coordinate_position::{CoordPos, CoordinatePosition};
use geo::{Coord, MultiPolygon};
use rstar::{AABB, RTree, RTreeObject};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use trauma_desert_area_models::{
    AreaUnit, AssignedIncident, IncidentRecord, MAX_THRESHOLD_MINUTES, Reachability,
    ReachabilityPolygon,
};

use crate::geometry::{compute_envelope, validate_geometry};

/// Errors raised while building or querying the spatial indexes.
#[derive(Debug, thiserror::Error)]
pub enum SpatialError {
    /// A coordinate is NaN or infinite.
    #[error("Non-finite coordinate in geometry of record {record_id}")]
    NonFiniteCoordinate {
        /// Offending record.
        record_id: String,
    },

    /// The geometry has no polygons.
    #[error("Empty geometry for record {record_id}")]
    EmptyGeometry {
        /// Offending record.
        record_id: String,
    },

    /// The geometry failed topological validation.
    #[error("Invalid geometry for record {record_id}: {message}")]
    InvalidGeometry {
        /// Offending record.
        record_id: String,
        /// What is wrong with it.
        message: String,
    },

    /// The geometry encloses no area.
    #[error("Geometry of record {record_id} has zero area")]
    ZeroArea {
        /// Offending record.
        record_id: String,
    },

    /// The geometry is not a polygon or multipolygon.
    #[error("Unsupported geometry type {kind} for record {record_id}")]
    UnsupportedGeometry {
        /// Offending record.
        record_id: String,
        /// The geometry type encountered.
        kind: String,
    },

    /// `GeoJSON` conversion failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// Two area units share an id.
    #[error("Duplicate area unit id {id}")]
    DuplicateAreaId {
        /// The repeated id.
        id: String,
    },

    /// A reachability threshold outside `1..=30` minutes.
    #[error("Reachability polygon for facility {facility_id} has invalid threshold {threshold}")]
    InvalidThreshold {
        /// Offending facility.
        facility_id: String,
        /// The rejected threshold.
        threshold: u32,
    },

    /// The study envelope bounds are not finite or are inverted.
    #[error("Invalid study envelope: {message}")]
    InvalidEnvelope {
        /// What is wrong with it.
        message: String,
    },

    /// An incident lies strictly inside more than one area unit.
    #[error("Incident {incident_id} lies inside multiple area units: {area_ids:?}")]
    Topology {
        /// Offending incident.
        incident_id: String,
        /// Every unit containing the incident, sorted.
        area_ids: Vec<String>,
    },
}

/// How to treat an incident strictly inside more than one area unit.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TopologyPolicy {
    /// Fail the run with [`SpatialError::Topology`].
    #[default]
    Strict,
    /// Assign to the lowest id and count the defect.
    Tolerant,
}

/// Rectangular study area in WGS84. Bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StudyEnvelope {
    /// Western bound.
    pub min_lng: f64,
    /// Southern bound.
    pub min_lat: f64,
    /// Eastern bound.
    pub max_lng: f64,
    /// Northern bound.
    pub max_lat: f64,
}

impl StudyEnvelope {
    /// Checks that the bounds are finite and ordered.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::InvalidEnvelope`] otherwise.
    pub fn validate(&self) -> Result<(), SpatialError> {
        let bounds = [self.min_lng, self.min_lat, self.max_lng, self.max_lat];
        if bounds.iter().any(|b| !b.is_finite()) {
            return Err(SpatialError::InvalidEnvelope {
                message: "bounds must be finite".to_string(),
            });
        }
        if self.min_lng >= self.max_lng || self.min_lat >= self.max_lat {
            return Err(SpatialError::InvalidEnvelope {
                message: format!(
                    "min ({}, {}) must be below max ({}, {})",
                    self.min_lng, self.min_lat, self.max_lng, self.max_lat
                ),
            });
        }
        Ok(())
    }

    /// Whether the point lies inside or on the envelope.
    #[must_use]
    pub fn contains(&self, lng: f64, lat: f64) -> bool {
        (self.min_lng..=self.max_lng).contains(&lng) && (self.min_lat..=self.max_lat).contains(&lat)
    }
}

/// Counts accounting for every incident passed to
/// [`AreaIndex::assign_incidents`].
///
/// `total == invalid + outside_envelope + unassigned + assigned`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssignmentReport {
    /// Incidents considered.
    pub total: u64,
    /// Missing or non-finite location or missing date.
    pub invalid: u64,
    /// Valid but outside the study envelope.
    pub outside_envelope: u64,
    /// Inside the envelope but in no area unit.
    pub unassigned: u64,
    /// Joined to exactly one area unit.
    pub assigned: u64,
    /// Assigned to the lowest id because the point lies only on boundaries.
    pub boundary_ties: u64,
    /// Strictly inside several units and tolerated by policy.
    pub overlaps: u64,
}

impl AssignmentReport {
    /// Fraction of in-envelope valid incidents that were assigned.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn assignment_rate(&self) -> f64 {
        let eligible = self.assigned + self.unassigned;
        if eligible == 0 {
            return 0.0;
        }
        self.assigned as f64 / eligible as f64
    }
}

/// Result of [`AreaIndex::assign_incidents`].
#[derive(Debug, Clone)]
pub struct AssignmentOutcome {
    /// Assigned incidents in input order.
    pub assigned: Vec<AssignedIncident>,
    /// Exclusion counts.
    pub report: AssignmentReport,
}

/// An area unit boundary stored in the R-tree.
struct BoundaryEntry {
    id: String,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built R-tree over area unit boundaries.
pub struct AreaIndex {
    units: RTree<BoundaryEntry>,
}

impl AreaIndex {
    /// Validates every boundary and builds the index.
    ///
    /// # Errors
    ///
    /// * [`SpatialError::DuplicateAreaId`] if two units share an id
    /// * any geometry error from [`validate_geometry`], naming the unit
    pub fn build(area_units: &[AreaUnit]) -> Result<Self, SpatialError> {
        let mut seen = BTreeSet::new();
        let mut entries = Vec::with_capacity(area_units.len());

        for unit in area_units {
            if !seen.insert(unit.id.as_str()) {
                return Err(SpatialError::DuplicateAreaId {
                    id: unit.id.clone(),
                });
            }
            validate_geometry(&unit.id, &unit.geometry)?;

            entries.push(BoundaryEntry {
                id: unit.id.clone(),
                envelope: compute_envelope(&unit.geometry),
                polygon: unit.geometry.clone(),
            });
        }

        let units = RTree::bulk_load(entries);
        log::info!("Loaded {} area units into spatial index", units.size());

        Ok(Self { units })
    }

    /// Number of indexed units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.size()
    }

    /// Whether the index holds no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.size() == 0
    }

    /// Finds the area unit containing a point.
    ///
    /// A point strictly inside one unit goes to that unit. A point only on
    /// boundaries goes to the lowest id. A point strictly inside several
    /// units is a topology defect handled according to `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Topology`] under [`TopologyPolicy::Strict`]
    /// when the point is strictly inside more than one unit.
    pub fn locate(
        &self,
        incident_id: &str,
        lng: f64,
        lat: f64,
        policy: TopologyPolicy,
    ) -> Result<Option<Location<'_>>, SpatialError> {
        let coord = Coord { x: lng, y: lat };
        let query_env = AABB::from_point([lng, lat]);

        let mut inside = BTreeSet::new();
        let mut on_boundary = BTreeSet::new();

        for entry in self.units.locate_in_envelope_intersecting(&query_env) {
            match entry.polygon.coordinate_position(&coord) {
                CoordPos::Inside => {
                    inside.insert(entry.id.as_str());
                }
                CoordPos::OnBoundary => {
                    on_boundary.insert(entry.id.as_str());
                }
                CoordPos::Outside => {}
            }
        }

        if let Some(&first) = inside.first() {
            if inside.len() == 1 {
                return Ok(Some(Location::Interior(first)));
            }
            return match policy {
                TopologyPolicy::Strict => Err(SpatialError::Topology {
                    incident_id: incident_id.to_string(),
                    area_ids: inside.iter().map(ToString::to_string).collect(),
                }),
                TopologyPolicy::Tolerant => Ok(Some(Location::Overlap(first))),
            };
        }

        Ok(on_boundary.first().map(|&id| Location::Boundary(id)))
    }

    /// Joins incidents to their containing area unit.
    ///
    /// Invalid incidents and incidents outside `envelope` are excluded
    /// before the point-in-polygon test and counted in the report.
    ///
    /// # Errors
    ///
    /// Returns [`SpatialError::Topology`] for an overlapping assignment
    /// under [`TopologyPolicy::Strict`].
    pub fn assign_incidents(
        &self,
        incidents: &[IncidentRecord],
        envelope: &StudyEnvelope,
        policy: TopologyPolicy,
    ) -> Result<AssignmentOutcome, SpatialError> {
        let mut report = AssignmentReport::default();
        let mut assigned = Vec::with_capacity(incidents.len());

        for incident in incidents {
            report.total += 1;

            let Some((lng, lat)) = incident.location().filter(|_| incident.is_valid()) else {
                report.invalid += 1;
                continue;
            };

            if !envelope.contains(lng, lat) {
                report.outside_envelope += 1;
                continue;
            }

            let Some(location) = self.locate(&incident.id, lng, lat, policy)? else {
                report.unassigned += 1;
                continue;
            };

            match location {
                Location::Interior(_) => {}
                Location::Boundary(_) => report.boundary_ties += 1,
                Location::Overlap(_) => report.overlaps += 1,
            }

            report.assigned += 1;
            assigned.push(AssignedIncident {
                incident: incident.clone(),
                area_id: location.area_id().to_string(),
            });
        }

        log::info!(
            "Assigned {}/{} incidents ({} invalid, {} outside envelope, {} unassigned)",
            report.assigned,
            report.total,
            report.invalid,
            report.outside_envelope,
            report.unassigned,
        );
        if report.unassigned > 0 {
            log::warn!(
                "{} incidents inside the study envelope matched no area unit",
                report.unassigned
            );
        }
        if report.overlaps > 0 {
            log::warn!(
                "{} incidents fell inside overlapping area units and were assigned to the lowest id",
                report.overlaps
            );
        }

        Ok(AssignmentOutcome { assigned, report })
    }
}

/// How a point was matched to an area unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location<'a> {
    /// Strictly inside exactly one unit.
    Interior(&'a str),
    /// Only on boundaries; lowest id.
    Boundary(&'a str),
    /// Strictly inside several units; lowest id.
    Overlap(&'a str),
}

impl<'a> Location<'a> {
    /// The chosen area unit id.
    #[must_use]
    pub const fn area_id(self) -> &'a str {
        match self {
            Self::Interior(id) | Self::Boundary(id) | Self::Overlap(id) => id,
        }
    }
}

/// A reachability polygon stored in the R-tree.
struct ReachabilityEntry {
    facility_id: String,
    threshold_minutes: u32,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for ReachabilityEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Pre-built R-tree over the reachability polygons of one target class of
/// facility.
pub struct ReachabilityIndex {
    polygons: RTree<ReachabilityEntry>,
}

impl ReachabilityIndex {
    /// Validates every polygon and its threshold and builds the index.
    ///
    /// # Errors
    ///
    /// * [`SpatialError::InvalidThreshold`] for a threshold outside `1..=30`
    /// * any geometry error from [`validate_geometry`], naming the facility
    pub fn build(polygons: &[ReachabilityPolygon]) -> Result<Self, SpatialError> {
        let mut entries = Vec::with_capacity(polygons.len());
        let mut per_facility: BTreeMap<&str, usize> = BTreeMap::new();

        for polygon in polygons {
            if !(1..=MAX_THRESHOLD_MINUTES).contains(&polygon.threshold_minutes) {
                return Err(SpatialError::InvalidThreshold {
                    facility_id: polygon.facility_id.clone(),
                    threshold: polygon.threshold_minutes,
                });
            }
            validate_geometry(
                &format!("{}@{}min", polygon.facility_id, polygon.threshold_minutes),
                &polygon.geometry,
            )?;

            *per_facility.entry(polygon.facility_id.as_str()).or_default() += 1;
            entries.push(ReachabilityEntry {
                facility_id: polygon.facility_id.clone(),
                threshold_minutes: polygon.threshold_minutes,
                envelope: compute_envelope(&polygon.geometry),
                polygon: polygon.geometry.clone(),
            });
        }

        let polygons = RTree::bulk_load(entries);
        log::info!(
            "Loaded {} reachability polygons for {} facilities",
            polygons.size(),
            per_facility.len()
        );

        Ok(Self { polygons })
    }

    /// Smallest threshold among all polygons containing the point (boundary
    /// inclusive) and the facility providing it. Equal thresholds resolve
    /// to the lowest facility id.
    #[must_use]
    pub fn nearest(&self, lng: f64, lat: f64) -> Option<(u32, &str)> {
        let coord = Coord { x: lng, y: lat };
        let query_env = AABB::from_point([lng, lat]);

        self.polygons
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| entry.polygon.coordinate_position(&coord) != CoordPos::Outside)
            .map(|entry| (entry.threshold_minutes, entry.facility_id.as_str()))
            .min()
    }

    /// Smallest containing threshold, or [`Reachability::BeyondMaximum`]
    /// when no polygon contains the point.
    #[must_use]
    pub fn nearest_reachability(&self, lng: f64, lat: f64) -> Reachability {
        self.nearest(lng, lat)
            .map_or(Reachability::BeyondMaximum, |(minutes, _)| {
                Reachability::Within(minutes)
            })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use geo::{Rect, coord};
    use trauma_desert_area_models::{Demographics, VictimAttributes};

    use super::*;
    use crate::geometry::build_area_unit;

    fn square(min_x: f64, min_y: f64, size: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![
            Rect::new(
                coord! { x: min_x, y: min_y },
                coord! { x: min_x + size, y: min_y + size },
            )
            .to_polygon(),
        ])
    }

    fn unit(id: &str, min_x: f64, min_y: f64, size: f64) -> AreaUnit {
        build_area_unit(id, id, square(min_x, min_y, size), Demographics::default()).unwrap()
    }

    fn incident(id: &str, lng: Option<f64>, lat: Option<f64>) -> IncidentRecord {
        IncidentRecord {
            id: id.to_string(),
            occurred_on: NaiveDate::from_ymd_opt(2020, 6, 1),
            latitude: lat,
            longitude: lng,
            is_fatal: false,
            victim: VictimAttributes::default(),
        }
    }

    fn envelope() -> StudyEnvelope {
        StudyEnvelope {
            min_lng: -1.0,
            min_lat: -1.0,
            max_lng: 3.0,
            max_lat: 3.0,
        }
    }

    #[test]
    fn assigns_interior_and_boundary_points() {
        let units = vec![unit("b", 1.0, 0.0, 1.0), unit("a", 0.0, 0.0, 1.0)];
        let index = AreaIndex::build(&units).unwrap();

        let incidents = vec![
            incident("1", Some(0.5), Some(0.5)),
            incident("2", Some(1.5), Some(0.5)),
            incident("3", Some(1.0), Some(0.5)),
        ];
        let outcome = index
            .assign_incidents(&incidents, &envelope(), TopologyPolicy::Strict)
            .unwrap();

        let ids: Vec<_> = outcome.assigned.iter().map(|a| a.area_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "a"]);
        assert_eq!(outcome.report.boundary_ties, 1);
        assert_eq!(outcome.report.assigned, 3);
    }

    #[test]
    fn counts_every_exclusion() {
        let units = vec![unit("a", 0.0, 0.0, 1.0)];
        let index = AreaIndex::build(&units).unwrap();

        let mut undated = incident("4", Some(0.5), Some(0.5));
        undated.occurred_on = None;
        let incidents = vec![
            incident("1", Some(0.5), Some(0.5)),
            incident("2", None, Some(0.5)),
            incident("3", Some(10.0), Some(10.0)),
            undated,
            incident("5", Some(2.5), Some(2.5)),
        ];
        let outcome = index
            .assign_incidents(&incidents, &envelope(), TopologyPolicy::Strict)
            .unwrap();
        let report = outcome.report;

        assert_eq!(report.total, 5);
        assert_eq!(report.invalid, 2);
        assert_eq!(report.outside_envelope, 1);
        assert_eq!(report.unassigned, 1);
        assert_eq!(report.assigned, 1);
        assert_eq!(
            report.total,
            report.invalid + report.outside_envelope + report.unassigned + report.assigned
        );
        assert!((report.assignment_rate() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn overlapping_units_follow_policy() {
        let units = vec![unit("b", 0.0, 0.0, 1.0), unit("a", 0.5, 0.5, 1.0)];
        let index = AreaIndex::build(&units).unwrap();
        let incidents = vec![incident("x", Some(0.75), Some(0.75))];

        let err = index
            .assign_incidents(&incidents, &envelope(), TopologyPolicy::Strict)
            .unwrap_err();
        match err {
            SpatialError::Topology {
                incident_id,
                area_ids,
            } => {
                assert_eq!(incident_id, "x");
                assert_eq!(area_ids, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }

        let outcome = index
            .assign_incidents(&incidents, &envelope(), TopologyPolicy::Tolerant)
            .unwrap();
        assert_eq!(outcome.assigned[0].area_id, "a");
        assert_eq!(outcome.report.overlaps, 1);
    }

    #[test]
    fn rejects_duplicate_ids() {
        let units = vec![unit("a", 0.0, 0.0, 1.0), unit("a", 1.0, 0.0, 1.0)];
        assert!(matches!(
            AreaIndex::build(&units),
            Err(SpatialError::DuplicateAreaId { .. })
        ));
    }

    fn reachability(facility: &str, minutes: u32, size: f64) -> ReachabilityPolygon {
        ReachabilityPolygon {
            facility_id: facility.to_string(),
            threshold_minutes: minutes,
            geometry: square(-size, -size, 2.0 * size),
        }
    }

    #[test]
    fn nearest_takes_smallest_threshold_across_facilities() {
        let mut far = reachability("north", 5, 0.1);
        far.geometry = square(5.0, 5.0, 0.2);
        let polygons = vec![
            reachability("south", 10, 1.0),
            reachability("south", 20, 2.0),
            reachability("central", 15, 1.5),
            far,
        ];
        let index = ReachabilityIndex::build(&polygons).unwrap();

        assert_eq!(index.nearest(0.0, 0.0), Some((10, "south")));
        assert_eq!(index.nearest(1.2, 0.0), Some((15, "central")));
        assert_eq!(index.nearest(1.5, 0.0), Some((15, "central")));
        assert_eq!(index.nearest_reachability(1.8, 0.0), Reachability::Within(20));
    }

    #[test]
    fn outside_every_polygon_is_sentinel() {
        let index = ReachabilityIndex::build(&[reachability("h", 30, 1.0)]).unwrap();
        let value = index.nearest_reachability(4.0, 4.0);
        assert_eq!(value, Reachability::BeyondMaximum);
        assert!(value > index.nearest_reachability(0.0, 0.0));
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        for threshold in [0, 31, 45] {
            assert!(matches!(
                ReachabilityIndex::build(&[reachability("h", threshold, 1.0)]),
                Err(SpatialError::InvalidThreshold { .. })
            ));
        }
    }

    #[test]
    fn envelope_validation() {
        assert!(envelope().validate().is_ok());
        let inverted = StudyEnvelope {
            min_lng: 1.0,
            min_lat: 0.0,
            max_lng: 0.0,
            max_lat: 1.0,
        };
        assert!(inverted.validate().is_err());
        assert!(envelope().contains(3.0, -1.0));
    }
}
