//! Observation period used to annualize incident counts.

use chrono::NaiveDate;
use serde::Serialize;
use trauma_desert_area_models::IncidentRecord;

use crate::MetricError;

/// Mean days per year.
const DAYS_PER_YEAR: f64 = 365.25;

/// Length of the window incident counts were collected over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObservationPeriod {
    /// First day of the window, when known.
    pub start: Option<NaiveDate>,
    /// Last day of the window, when known.
    pub end: Option<NaiveDate>,
    years: f64,
}

impl ObservationPeriod {
    /// Inclusive date range: `(end - start + 1 day) / 365.25`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidPeriod`] if `end` precedes `start`.
    pub fn from_date_range(start: NaiveDate, end: NaiveDate) -> Result<Self, MetricError> {
        if end < start {
            return Err(MetricError::InvalidPeriod {
                message: format!("end {end} precedes start {start}"),
            });
        }
        #[allow(clippy::cast_precision_loss)]
        let days = ((end - start).num_days() + 1) as f64;

        Ok(Self {
            start: Some(start),
            end: Some(end),
            years: days / DAYS_PER_YEAR,
        })
    }

    /// A period given directly in years.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::InvalidPeriod`] unless `years` is finite and
    /// positive.
    pub fn from_years(years: f64) -> Result<Self, MetricError> {
        if !years.is_finite() || years <= 0.0 {
            return Err(MetricError::InvalidPeriod {
                message: format!("observation period must be positive, got {years} years"),
            });
        }
        Ok(Self {
            start: None,
            end: None,
            years,
        })
    }

    /// Date range spanned by the valid incidents.
    ///
    /// # Errors
    ///
    /// Returns [`MetricError::NoDatedIncidents`] if no valid incident has a
    /// date.
    pub fn from_incidents(incidents: &[IncidentRecord]) -> Result<Self, MetricError> {
        let mut dates = incidents
            .iter()
            .filter(|incident| incident.is_valid())
            .filter_map(|incident| incident.occurred_on);

        let Some(first) = dates.next() else {
            return Err(MetricError::NoDatedIncidents);
        };
        let (start, end) =
            dates.fold((first, first), |(lo, hi), date| (lo.min(date), hi.max(date)));

        log::info!("Observation period derived from incidents: {start} to {end}");
        Self::from_date_range(start, end)
    }

    /// Period length in years.
    #[must_use]
    pub const fn years(&self) -> f64 {
        self.years
    }
}
