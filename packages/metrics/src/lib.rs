#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-area metric aggregation.
//!
//! Turns assigned incidents into an annualized, area-normalized density
//! and looks up each area unit's travel time to the nearest facility.
//! Every area is measured with the same equal-area projection, so
//! densities are comparable across units.

pub mod distribution;
pub mod period;
pub mod trends;

use std::collections::BTreeMap;

use serde::Serialize;
use trauma_desert_area_models::{
    AreaUnit, AssignedIncident, IncidentRecord, Race, Reachability, TimeBand,
};
use trauma_desert_spatial::ReachabilityIndex;

pub use distribution::{
    BandDistribution, BandFatality, BandShare, NEAR_ACCESS_MINUTES, RaceAccess, access_by_race,
    fatality_by_band,
};
pub use period::ObservationPeriod;
pub use trends::{AnnualCount, OverallTrend, TemporalTrends, UnitTrend, temporal_trends};

/// Errors raised while aggregating per-area metrics.
#[derive(Debug, thiserror::Error)]
pub enum MetricError {
    /// The observation period is empty, inverted or non-finite.
    #[error("Invalid observation period: {message}")]
    InvalidPeriod {
        /// What is wrong with it.
        message: String,
    },

    /// No valid incident carries a date to derive the period from.
    #[error("No dated incidents to derive an observation period from")]
    NoDatedIncidents,

    /// Density would divide by a non-positive area.
    #[error("Area unit {area_id} has non-positive area {area_sq_mi}")]
    ZeroArea {
        /// Offending area unit.
        area_id: String,
        /// The rejected area.
        area_sq_mi: f64,
    },

    /// An assigned incident references an area unit that does not exist.
    #[error("Incident {incident_id} is assigned to unknown area unit {area_id}")]
    UnknownArea {
        /// Offending incident.
        incident_id: String,
        /// The missing area unit id.
        area_id: String,
    },

    /// A log transform was requested for a value below the floor.
    #[error("Cannot log-transform {value}: values must be >= 0")]
    LogDomain {
        /// The rejected value.
        value: f64,
    },
}

/// Travel time from an area unit's centroid to the nearest facility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeMetric {
    /// Smallest containing threshold, or the sentinel.
    pub reachability: Reachability,
    /// Categorical band of `reachability`.
    pub band: TimeBand,
    /// Facility providing `reachability`, `None` beyond coverage.
    pub nearest_facility: Option<String>,
}

/// Aggregated metrics of one area unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaMetrics {
    /// Area unit id.
    pub area_id: String,
    /// Assigned incidents.
    pub incident_count: u64,
    /// Assigned fatal incidents.
    pub fatal_count: u64,
    /// `incident_count / years`.
    pub incidents_per_year: f64,
    /// Fatal share in percent, `None` without incidents.
    pub fatality_rate: Option<f64>,
    /// Annual incidents per 10,000 residents, `None` without population.
    pub annual_per_10k: Option<f64>,
    /// Mean age of victims with a recorded age.
    pub mean_victim_age: Option<f64>,
    /// Male share of victims with a recorded sex, in percent.
    pub pct_male: Option<f64>,
    /// Annual incidents per square mile.
    pub density: f64,
    /// Travel time to the nearest facility.
    pub time: TimeMetric,
    /// Whether `time` is within the golden-hour threshold.
    pub within_golden_hour: bool,
}

/// An assigned incident with the travel time of its area unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncidentAccess {
    /// Incident id.
    pub incident_id: String,
    /// Containing area unit.
    pub area_id: String,
    /// Travel time of the containing area unit.
    pub reachability: Reachability,
    /// Whether the incident was fatal.
    pub is_fatal: bool,
    /// Victim race.
    pub race: Race,
}

/// Running per-unit totals while aggregating.
#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    incidents: u64,
    fatal: u64,
    age_sum: f64,
    aged: u64,
    male: u64,
    sexed: u64,
}

impl Tally {
    fn add(&mut self, incident: &IncidentRecord) {
        self.incidents += 1;
        if incident.is_fatal {
            self.fatal += 1;
        }
        if let Some(age) = incident.victim.age {
            self.age_sum += f64::from(age);
            self.aged += 1;
        }
        if let Some(is_male) = incident.victim.is_male {
            self.sexed += 1;
            if is_male {
                self.male += 1;
            }
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean_age(&self) -> Option<f64> {
        (self.aged > 0).then(|| self.age_sum / self.aged as f64)
    }

    #[allow(clippy::cast_precision_loss)]
    fn pct_male(&self) -> Option<f64> {
        (self.sexed > 0).then(|| self.male as f64 / self.sexed as f64 * 100.0)
    }
}

/// Annualized incidents per square mile for one area unit.
///
/// `density = (count / years) / area_sq_mi` where `count` is the number of
/// `assigned_incidents` whose `area_id` is this unit.
///
/// # Errors
///
/// Returns [`MetricError::ZeroArea`] if the unit's area is not positive.
pub fn compute_density(
    area_unit: &AreaUnit,
    assigned_incidents: &[AssignedIncident],
    period: &ObservationPeriod,
) -> Result<f64, MetricError> {
    let count = assigned_incidents
        .iter()
        .filter(|assigned| assigned.area_id == area_unit.id)
        .count() as u64;

    density_from_count(&area_unit.id, area_unit.area_sq_mi, count, period)
}

#[allow(clippy::cast_precision_loss)]
fn density_from_count(
    area_id: &str,
    area_sq_mi: f64,
    count: u64,
    period: &ObservationPeriod,
) -> Result<f64, MetricError> {
    if !area_sq_mi.is_finite() || area_sq_mi <= 0.0 {
        return Err(MetricError::ZeroArea {
            area_id: area_id.to_string(),
            area_sq_mi,
        });
    }
    Ok(count as f64 / period.years() / area_sq_mi)
}

/// Travel-time metric of an area unit, looked up at its centroid.
#[must_use]
pub fn compute_time_metric(area_unit: &AreaUnit, reachability: &ReachabilityIndex) -> TimeMetric {
    let (lng, lat) = (area_unit.centroid.x(), area_unit.centroid.y());

    match reachability.nearest(lng, lat) {
        Some((minutes, facility)) => {
            let reachability = Reachability::Within(minutes);
            TimeMetric {
                reachability,
                band: reachability.band(),
                nearest_facility: Some(facility.to_string()),
            }
        }
        None => TimeMetric {
            reachability: Reachability::BeyondMaximum,
            band: Reachability::BeyondMaximum.band(),
            nearest_facility: None,
        },
    }
}

/// Computes [`AreaMetrics`] for every area unit, sorted by id.
///
/// Units without incidents get a density of zero; they are still ranked by
/// the classifier.
///
/// # Errors
///
/// * [`MetricError::UnknownArea`] if an incident references a missing unit
/// * [`MetricError::ZeroArea`] for a unit with non-positive area
#[allow(clippy::cast_precision_loss)]
pub fn aggregate(
    area_units: &[AreaUnit],
    assigned_incidents: &[AssignedIncident],
    reachability: &ReachabilityIndex,
    period: &ObservationPeriod,
    golden_hour_minutes: u32,
) -> Result<Vec<AreaMetrics>, MetricError> {
    let mut tallies: BTreeMap<&str, Tally> = area_units
        .iter()
        .map(|unit| (unit.id.as_str(), Tally::default()))
        .collect();

    for assigned in assigned_incidents {
        let Some(tally) = tallies.get_mut(assigned.area_id.as_str()) else {
            return Err(MetricError::UnknownArea {
                incident_id: assigned.incident.id.clone(),
                area_id: assigned.area_id.clone(),
            });
        };
        tally.add(&assigned.incident);
    }

    let mut units: Vec<&AreaUnit> = area_units.iter().collect();
    units.sort_by(|a, b| a.id.cmp(&b.id));

    let mut metrics = Vec::with_capacity(units.len());
    let mut missing_population = 0_usize;

    for unit in units {
        let tally = tallies.get(unit.id.as_str()).copied().unwrap_or_default();
        let (incident_count, fatal_count) = (tally.incidents, tally.fatal);
        let incidents_per_year = incident_count as f64 / period.years();
        let density = density_from_count(&unit.id, unit.area_sq_mi, incident_count, period)?;
        let time = compute_time_metric(unit, reachability);

        let annual_per_10k = match unit.demographics.population {
            Some(population) if population > 0 => {
                Some(incidents_per_year / f64::from(population) * 10_000.0)
            }
            _ => {
                missing_population += 1;
                None
            }
        };

        metrics.push(AreaMetrics {
            area_id: unit.id.clone(),
            incident_count,
            fatal_count,
            incidents_per_year,
            fatality_rate: (incident_count > 0)
                .then(|| fatal_count as f64 / incident_count as f64 * 100.0),
            annual_per_10k,
            mean_victim_age: tally.mean_age(),
            pct_male: tally.pct_male(),
            density,
            within_golden_hour: time.reachability.is_within(golden_hour_minutes),
            time,
        });
    }

    let beyond = metrics
        .iter()
        .filter(|m| m.time.reachability == Reachability::BeyondMaximum)
        .count();
    log::info!(
        "Aggregated metrics for {} area units over {:.2} years ({} beyond coverage)",
        metrics.len(),
        period.years(),
        beyond
    );
    if missing_population > 0 {
        log::warn!("{missing_population} area units have no population; per-capita rates omitted");
    }

    Ok(metrics)
}

/// Pairs each assigned incident with its area unit's travel time.
///
/// # Errors
///
/// Returns [`MetricError::UnknownArea`] if an incident references a unit
/// missing from `metrics`.
pub fn incident_access(
    assigned_incidents: &[AssignedIncident],
    metrics: &[AreaMetrics],
) -> Result<Vec<IncidentAccess>, MetricError> {
    let by_id: BTreeMap<&str, &AreaMetrics> =
        metrics.iter().map(|m| (m.area_id.as_str(), m)).collect();

    assigned_incidents
        .iter()
        .map(|assigned| {
            let area = by_id.get(assigned.area_id.as_str()).ok_or_else(|| {
                MetricError::UnknownArea {
                    incident_id: assigned.incident.id.clone(),
                    area_id: assigned.area_id.clone(),
                }
            })?;
            Ok(IncidentAccess {
                incident_id: assigned.incident.id.clone(),
                area_id: assigned.area_id.clone(),
                reachability: area.time.reachability,
                is_fatal: assigned.incident.is_fatal,
                race: assigned.incident.victim.race,
            })
        })
        .collect()
}

/// Log transform with a `+1` offset: `ln(1 + value)`.
///
/// Zero maps to zero instead of negative infinity.
///
/// # Errors
///
/// Returns [`MetricError::LogDomain`] for negative or non-finite input.
pub fn log1p_floor(value: f64) -> Result<f64, MetricError> {
    if !value.is_finite() || value < 0.0 {
        return Err(MetricError::LogDomain { value });
    }
    Ok(value.ln_1p())
}
