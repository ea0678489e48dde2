//! Incident distributions over the travel-time bands.

use std::collections::BTreeMap;

use serde::Serialize;
use trauma_desert_area_models::{Race, TimeBand};

use crate::IncidentAccess;

/// Incident count and share of one band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandShare {
    /// Travel-time band.
    pub band: TimeBand,
    /// Incidents in this band.
    pub count: u64,
    /// `count / total`.
    pub share: f64,
    /// Share of incidents in this band or any faster one.
    pub cumulative_share: f64,
}

/// Incidents per band, in band order, covering every band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandDistribution {
    /// One row per [`TimeBand`].
    pub rows: Vec<BandShare>,
    /// Sum of all counts.
    pub total: u64,
}

impl BandDistribution {
    /// Builds the distribution from per-band counts. Missing bands count
    /// as zero; with no incidents every share is zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(counts: &BTreeMap<TimeBand, u64>) -> Self {
        let total: u64 = counts.values().sum();
        let mut running = 0;

        let rows = TimeBand::all()
            .iter()
            .map(|&band| {
                let count = counts.get(&band).copied().unwrap_or(0);
                running += count;
                let (share, cumulative_share) = if total == 0 {
                    (0.0, 0.0)
                } else {
                    (count as f64 / total as f64, running as f64 / total as f64)
                };
                BandShare {
                    band,
                    count,
                    share,
                    cumulative_share,
                }
            })
            .collect();

        Self { rows, total }
    }

    /// Golden-hour distribution of assigned incidents.
    #[must_use]
    pub fn from_incidents(incidents: &[IncidentAccess]) -> Self {
        let mut counts = BTreeMap::new();
        for incident in incidents {
            *counts.entry(incident.reachability.band()).or_insert(0) += 1;
        }
        Self::from_counts(&counts)
    }

    /// Share of incidents in bands whose upper bound is at most
    /// `threshold_minutes`.
    #[must_use]
    pub fn cumulative_share_within(&self, threshold_minutes: u32) -> f64 {
        self.rows
            .iter()
            .filter(|row| row.band.upper_bound().is_some_and(|bound| bound <= threshold_minutes))
            .map(|row| row.share)
            .sum()
    }
}

/// Fatal outcomes within one band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandFatality {
    /// Travel-time band.
    pub band: TimeBand,
    /// Incidents in this band.
    pub total: u64,
    /// Fatal incidents in this band.
    pub fatal: u64,
    /// Fatal share in percent, `None` for an empty band.
    pub fatality_rate: Option<f64>,
}

/// Fatality counts per band, one row per [`TimeBand`].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn fatality_by_band(incidents: &[IncidentAccess]) -> Vec<BandFatality> {
    let mut counts: BTreeMap<TimeBand, (u64, u64)> = BTreeMap::new();
    for incident in incidents {
        let entry = counts.entry(incident.reachability.band()).or_default();
        entry.0 += 1;
        if incident.is_fatal {
            entry.1 += 1;
        }
    }

    TimeBand::all()
        .iter()
        .map(|&band| {
            let (total, fatal) = counts.get(&band).copied().unwrap_or_default();
            BandFatality {
                band,
                total,
                fatal,
                fatality_rate: (total > 0).then(|| fatal as f64 / total as f64 * 100.0),
            }
        })
        .collect()
}

/// Threshold of the near-access columns of [`RaceAccess`].
pub const NEAR_ACCESS_MINUTES: u32 = 10;

/// Travel-time access of the incidents whose victims share one race.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceAccess {
    /// Victim race.
    pub race: Race,
    /// Incidents with this race.
    pub incidents: u64,
    /// Fatal incidents with this race.
    pub fatal: u64,
    /// Incidents within [`NEAR_ACCESS_MINUTES`].
    pub within_10: u64,
    /// `within_10` in percent of `incidents`.
    pub pct_within_10: f64,
    /// Incidents within the golden-hour threshold.
    pub within_golden_hour: u64,
    /// `within_golden_hour` in percent of `incidents`.
    pub pct_within_golden_hour: f64,
    /// Incidents beyond the golden-hour threshold, coverage gaps included.
    pub beyond_golden_hour: u64,
    /// `beyond_golden_hour` in percent of `incidents`.
    pub pct_beyond_golden_hour: f64,
    /// Mean minutes, counting coverage gaps at the sentinel value.
    pub mean_minutes: f64,
}

#[derive(Debug, Default)]
struct RaceTally {
    incidents: u64,
    fatal: u64,
    near: u64,
    within: u64,
    minutes: f64,
}

/// Golden-hour access per victim race, in [`Race`] order.
///
/// Races without incidents are omitted.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn access_by_race(incidents: &[IncidentAccess], golden_hour_minutes: u32) -> Vec<RaceAccess> {
    let mut tallies: BTreeMap<Race, RaceTally> = BTreeMap::new();
    for incident in incidents {
        let tally = tallies.entry(incident.race).or_default();
        tally.incidents += 1;
        tally.fatal += u64::from(incident.is_fatal);
        tally.near += u64::from(incident.reachability.is_within(NEAR_ACCESS_MINUTES));
        tally.within += u64::from(incident.reachability.is_within(golden_hour_minutes));
        tally.minutes += incident.reachability.minutes_f64();
    }

    let rows: Vec<RaceAccess> = tallies
        .into_iter()
        .map(|(race, tally)| {
            let total = tally.incidents as f64;
            let beyond = tally.incidents - tally.within;
            RaceAccess {
                race,
                incidents: tally.incidents,
                fatal: tally.fatal,
                within_10: tally.near,
                pct_within_10: tally.near as f64 / total * 100.0,
                within_golden_hour: tally.within,
                pct_within_golden_hour: tally.within as f64 / total * 100.0,
                beyond_golden_hour: beyond,
                pct_beyond_golden_hour: beyond as f64 / total * 100.0,
                mean_minutes: tally.minutes / total,
            }
        })
        .collect();

    for row in &rows {
        log::info!(
            "{}: {} incidents, {:.1}% within {golden_hour_minutes} minutes (mean {:.1} min)",
            row.race,
            row.incidents,
            row.pct_within_golden_hour,
            row.mean_minutes
        );
    }

    rows
}
