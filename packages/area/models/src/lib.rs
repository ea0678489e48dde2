#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Area unit, incident and reachability types for trauma-desert analysis.
//!
//! These are the records every pipeline stage reads and produces. Each
//! stage returns new values keyed by the stable area unit `id`; nothing
//! here is mutated across stage boundaries.

pub mod classification;
pub mod reachability;

use chrono::NaiveDate;
use geo::{MultiPolygon, Point};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

pub use classification::{
    BivariateClass, InvalidClassError, InvalidTercileError, PriorityGroup, Tercile,
};
pub use reachability::{
    BEYOND_MAXIMUM_MINUTES, DEFAULT_GOLDEN_HOUR_MINUTES, MAX_THRESHOLD_MINUTES, Reachability,
    TIME_BAND_UPPER_BOUNDS, TimeBand,
};

/// Demographic attributes of an area unit.
///
/// Fractions are in `[0, 1]`. Any field may be `None` when the source
/// suppressed the estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demographics {
    /// Total residents.
    pub population: Option<u32>,
    /// Fraction of residents identifying as Black.
    pub pct_black: Option<f64>,
    /// Fraction of residents below the poverty line.
    pub pct_poverty: Option<f64>,
    /// Median household income in dollars.
    pub median_income: Option<f64>,
}

/// A polygon sub-region of the study area (e.g. a census tract).
///
/// Built once by the spatial crate, which validates the geometry and
/// computes `area_sq_mi` with a fixed equal-area projection.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaUnit {
    /// Stable unique identifier (e.g. a tract GEOID).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Boundary in WGS84 longitude/latitude.
    pub geometry: MultiPolygon<f64>,
    /// Land area in square miles.
    pub area_sq_mi: f64,
    /// Planar centroid of the boundary.
    pub centroid: Point<f64>,
    /// Demographic attributes joined by `id`.
    pub demographics: Demographics,
}

/// Normalized victim race.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Race {
    /// Black.
    Black,
    /// White.
    White,
    /// Hispanic.
    Hispanic,
    /// Asian.
    Asian,
    /// Any other recorded value.
    Other,
    /// Missing or explicitly unknown.
    #[default]
    Unknown,
}

impl Race {
    /// Maps the single-letter codes used by police incident exports.
    ///
    /// Blank input is [`Race::Unknown`]; unrecognized codes are
    /// [`Race::Other`].
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "B" => Self::Black,
            "W" => Self::White,
            "H" => Self::Hispanic,
            "A" => Self::Asian,
            "U" | "" => Self::Unknown,
            _ => Self::Other,
        }
    }
}

/// Demographic attributes of the subject of an incident.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VictimAttributes {
    /// Normalized race.
    pub race: Race,
    /// `Some(true)` when recorded as male.
    pub is_male: Option<bool>,
    /// Age in years.
    pub age: Option<u8>,
}

/// A point event (e.g. a shooting).
///
/// Coordinates and date are optional so that malformed source rows can be
/// counted rather than dropped; see [`IncidentRecord::is_valid`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentRecord {
    /// Source identifier.
    pub id: String,
    /// Date of occurrence.
    pub occurred_on: Option<NaiveDate>,
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
    /// Whether the incident was fatal.
    pub is_fatal: bool,
    /// Subject demographics.
    pub victim: VictimAttributes,
}

impl IncidentRecord {
    /// Returns `(longitude, latitude)` when both are present and finite.
    #[must_use]
    pub fn location(&self) -> Option<(f64, f64)> {
        match (self.longitude, self.latitude) {
            (Some(lng), Some(lat)) if lng.is_finite() && lat.is_finite() => Some((lng, lat)),
            _ => None,
        }
    }

    /// Validity flag: a usable location and a date.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.location().is_some() && self.occurred_on.is_some()
    }
}

/// An incident joined to the area unit containing it.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignedIncident {
    /// The incident as ingested.
    pub incident: IncidentRecord,
    /// `id` of the containing [`AreaUnit`].
    pub area_id: String,
}

/// A polygon reachable from `facility_id` within `threshold_minutes`.
///
/// Polygons for the same facility are nested: a larger threshold contains
/// every smaller one.
#[derive(Debug, Clone, PartialEq)]
pub struct ReachabilityPolygon {
    /// Facility identifier (e.g. hospital name).
    pub facility_id: String,
    /// Drive-time threshold in minutes.
    pub threshold_minutes: u32,
    /// Reachable area in WGS84 longitude/latitude.
    pub geometry: MultiPolygon<f64>,
}

/// One output row per area unit, in a stable column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedAreaUnit {
    /// Area unit identifier.
    pub id: String,
    /// Area unit name.
    pub name: String,
    /// Land area in square miles.
    pub area_sq_mi: f64,
    /// Total residents.
    pub population: Option<u32>,
    /// Fraction Black.
    pub pct_black: Option<f64>,
    /// Fraction below poverty.
    pub pct_poverty: Option<f64>,
    /// Median household income.
    pub median_income: Option<f64>,
    /// Assigned incidents.
    pub incident_count: u64,
    /// Assigned fatal incidents.
    pub fatal_count: u64,
    /// Incidents per year of the observation period.
    pub incidents_per_year: f64,
    /// Fatal share of incidents in percent, `None` without incidents.
    pub fatality_rate: Option<f64>,
    /// Annual incidents per 10,000 residents.
    pub annual_per_10k: Option<f64>,
    /// Mean age of victims with a recorded age.
    pub mean_victim_age: Option<f64>,
    /// Male share of victims with a recorded sex, in percent.
    pub pct_male: Option<f64>,
    /// Annual incidents per square mile.
    pub density_metric: f64,
    /// Minutes to the nearest facility, sentinel for beyond coverage.
    #[serde(rename = "time_to_nearest_minutes")]
    pub time_metric: Reachability,
    /// Categorical band of `time_metric`.
    pub time_band: TimeBand,
    /// Facility providing the smallest threshold, `None` beyond coverage.
    pub nearest_facility: Option<String>,
    /// Whether the unit is within the golden-hour threshold.
    pub within_golden_hour: bool,
    /// Rank-based density tercile.
    pub density_tercile: Tercile,
    /// Rank-based time tercile.
    pub time_tercile: Tercile,
    /// Composite 1-9 class.
    pub bivariate_class: BivariateClass,
    /// Label from the fixed lookup table.
    pub bivariate_label: &'static str,
    /// Priority group from the fixed lookup table.
    pub priority_group: PriorityGroup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn race_codes() {
        assert_eq!(Race::from_code("b"), Race::Black);
        assert_eq!(Race::from_code(" W "), Race::White);
        assert_eq!(Race::from_code(""), Race::Unknown);
        assert_eq!(Race::from_code("I"), Race::Other);
    }

    #[test]
    fn incident_validity() {
        let mut incident = IncidentRecord {
            id: "1".to_string(),
            occurred_on: NaiveDate::from_ymd_opt(2020, 1, 1),
            latitude: Some(39.95),
            longitude: Some(-75.16),
            is_fatal: false,
            victim: VictimAttributes::default(),
        };
        assert!(incident.is_valid());
        assert_eq!(incident.location(), Some((-75.16, 39.95)));

        incident.latitude = Some(f64::NAN);
        assert!(!incident.is_valid());

        incident.latitude = Some(39.95);
        incident.occurred_on = None;
        assert!(!incident.is_valid());
    }
}
