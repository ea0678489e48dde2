//! Year-over-year incident trends.
//!
//! Years run over every calendar year between the first and last dated
//! assigned incident, so a year without incidents still counts as zero.

use std::collections::BTreeMap;

use chrono::Datelike as _;
use serde::Serialize;
use trauma_desert_area_models::{AreaUnit, AssignedIncident};

use crate::MetricError;

/// Trailing years averaged into [`UnitTrend::recent_mean`].
pub const RECENT_YEARS: usize = 3;
/// Largest first-year count of an emerging unit.
pub const EMERGING_MAX_FIRST_YEAR: u64 = 5;
/// Smallest recent annual mean of an emerging unit.
pub const EMERGING_MIN_RECENT_MEAN: f64 = 10.0;
/// Smallest first-year count of an improving unit.
pub const IMPROVING_MIN_FIRST_YEAR: u64 = 10;
/// An improving unit's recent mean stays below this share of its overall
/// annual mean.
pub const IMPROVING_RECENT_RATIO: f64 = 0.7;

/// Incident totals of one calendar year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnualCount {
    /// Calendar year.
    pub year: i32,
    /// Assigned incidents.
    pub incidents: u64,
    /// Fatal assigned incidents.
    pub fatal: u64,
    /// Fatal share in percent, `None` for a year without incidents.
    pub fatality_rate: Option<f64>,
}

/// First-year to last-year movement of one area unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitTrend {
    /// Area unit id.
    pub area_id: String,
    /// Incidents in the first year.
    pub first_year_count: u64,
    /// Incidents in the last year.
    pub last_year_count: u64,
    /// Incidents over all years.
    pub total: u64,
    /// `total` per year.
    pub mean_annual: f64,
    /// Mean over the last [`RECENT_YEARS`] years.
    pub recent_mean: f64,
    /// `last_year_count - first_year_count`.
    pub change: i64,
    /// `change` relative to the first year in percent. A unit with no
    /// first-year incidents reports 100 if it has any in the last year
    /// and 0 otherwise.
    pub pct_change: f64,
    /// Few incidents in the first year, many recently.
    pub is_emerging: bool,
    /// Many incidents in the first year, clearly fewer recently.
    pub is_improving: bool,
}

/// Study-wide movement between the first and last year.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallTrend {
    /// First calendar year.
    pub first_year: i32,
    /// Last calendar year.
    pub last_year: i32,
    /// Change in annual incidents in percent, `None` when the first year
    /// has none.
    pub pct_change: Option<f64>,
    /// Year with the most incidents; the earliest wins a tie.
    pub peak_year: i32,
    /// Incidents in `peak_year`.
    pub peak_incidents: u64,
}

/// Annual and per-unit trends of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemporalTrends {
    /// One row per calendar year, ascending.
    pub annual: Vec<AnnualCount>,
    /// One row per area unit, sorted by id.
    pub units: Vec<UnitTrend>,
    /// `None` without dated incidents.
    pub overall: Option<OverallTrend>,
}

impl TemporalTrends {
    /// Area units flagged as emerging.
    pub fn emerging(&self) -> impl Iterator<Item = &UnitTrend> {
        self.units.iter().filter(|unit| unit.is_emerging)
    }

    /// Area units flagged as improving.
    pub fn improving(&self) -> impl Iterator<Item = &UnitTrend> {
        self.units.iter().filter(|unit| unit.is_improving)
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(counts: &[u64]) -> f64 {
    if counts.is_empty() {
        0.0
    } else {
        counts.iter().sum::<u64>() as f64 / counts.len() as f64
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
fn unit_trend(area_id: &str, counts: &[u64]) -> UnitTrend {
    let first = counts.first().copied().unwrap_or(0);
    let last = counts.last().copied().unwrap_or(0);
    let total = counts.iter().sum();
    let mean_annual = mean(counts);
    let recent_mean = mean(&counts[counts.len().saturating_sub(RECENT_YEARS)..]);
    let change = last as i64 - first as i64;

    let pct_change = if first > 0 {
        change as f64 / first as f64 * 100.0
    } else if last > 0 {
        100.0
    } else {
        0.0
    };

    UnitTrend {
        area_id: area_id.to_string(),
        first_year_count: first,
        last_year_count: last,
        total,
        mean_annual,
        recent_mean,
        change,
        pct_change,
        is_emerging: first <= EMERGING_MAX_FIRST_YEAR && recent_mean >= EMERGING_MIN_RECENT_MEAN,
        is_improving: first >= IMPROVING_MIN_FIRST_YEAR
            && recent_mean < mean_annual * IMPROVING_RECENT_RATIO,
    }
}

/// Computes annual totals and per-unit trends of the assigned incidents.
///
/// Every area unit gets a row, including units without incidents. Without
/// any dated incident the result is empty.
///
/// # Errors
///
/// Returns [`MetricError::UnknownArea`] if an incident references a unit
/// missing from `area_units`.
#[allow(clippy::cast_precision_loss)]
pub fn temporal_trends(
    area_units: &[AreaUnit],
    assigned_incidents: &[AssignedIncident],
) -> Result<TemporalTrends, MetricError> {
    let dated: Vec<(&AssignedIncident, i32)> = assigned_incidents
        .iter()
        .filter_map(|assigned| {
            assigned
                .incident
                .occurred_on
                .map(|date| (assigned, date.year()))
        })
        .collect();

    let (Some(first_year), Some(last_year)) = (
        dated.iter().map(|(_, year)| *year).min(),
        dated.iter().map(|(_, year)| *year).max(),
    ) else {
        log::warn!("No dated incidents; temporal trends are empty");
        return Ok(TemporalTrends::default());
    };
    let span = usize::try_from(last_year - first_year).unwrap_or(0) + 1;

    let mut annual = vec![(0_u64, 0_u64); span];
    let mut per_unit: BTreeMap<&str, Vec<u64>> = area_units
        .iter()
        .map(|unit| (unit.id.as_str(), vec![0; span]))
        .collect();

    for (assigned, year) in dated {
        let offset = usize::try_from(year - first_year).unwrap_or(0);
        let Some(counts) = per_unit.get_mut(assigned.area_id.as_str()) else {
            return Err(MetricError::UnknownArea {
                incident_id: assigned.incident.id.clone(),
                area_id: assigned.area_id.clone(),
            });
        };
        counts[offset] += 1;
        annual[offset].0 += 1;
        if assigned.incident.is_fatal {
            annual[offset].1 += 1;
        }
    }

    let annual: Vec<AnnualCount> = (first_year..=last_year)
        .zip(annual)
        .map(|(year, (incidents, fatal))| AnnualCount {
            year,
            incidents,
            fatal,
            fatality_rate: (incidents > 0).then(|| fatal as f64 / incidents as f64 * 100.0),
        })
        .collect();

    let units: Vec<UnitTrend> = per_unit
        .iter()
        .map(|(area_id, counts)| unit_trend(area_id, counts))
        .collect();

    let first_count = annual.first().map_or(0, |row| row.incidents);
    let last_count = annual.last().map_or(0, |row| row.incidents);
    let peak = annual
        .iter()
        .reduce(|best, row| if row.incidents > best.incidents { row } else { best });
    let overall = OverallTrend {
        first_year,
        last_year,
        pct_change: (first_count > 0)
            .then(|| (last_count as f64 - first_count as f64) / first_count as f64 * 100.0),
        peak_year: peak.map_or(first_year, |row| row.year),
        peak_incidents: peak.map_or(0, |row| row.incidents),
    };

    let trends = TemporalTrends {
        annual,
        units,
        overall: Some(overall),
    };

    log::info!(
        "Trends {first_year}-{last_year}: {} emerging and {} improving area units",
        trends.emerging().count(),
        trends.improving().count()
    );

    Ok(trends)
}
