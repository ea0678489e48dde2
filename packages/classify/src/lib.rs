#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bivariate classification of area units.
//!
//! Density and travel time are ranked independently into rank-based
//! terciles and crossed into the nine-class scheme of
//! [`trauma_desert_area_models::BivariateClass`].

pub mod profile;
pub mod rank;

use std::collections::{BTreeMap, BTreeSet};

use trauma_desert_area_models::{AreaUnit, BivariateClass, ClassifiedAreaUnit, Tercile};
use trauma_desert_metrics::AreaMetrics;

pub use profile::{ClassProfile, PriorityRanking, class_profiles, rank_highest_priority};
pub use rank::{competition_ranks, cut_point, rank_groups, ranks};

/// Errors raised while classifying area units.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// An area unit has no metrics to classify by.
    #[error("Area unit {area_id} has no metrics")]
    MissingMetrics {
        /// Offending area unit.
        area_id: String,
    },

    /// Metrics were computed for an area unit that does not exist.
    #[error("Metrics reference unknown area unit {area_id}")]
    UnknownArea {
        /// The orphaned id.
        area_id: String,
    },

    /// Two records share an id.
    #[error("Duplicate area unit id {id}")]
    DuplicateId {
        /// The repeated id.
        id: String,
    },

    /// A metric is NaN, infinite or negative.
    #[error("Area unit {area_id} has invalid {metric} value {value}")]
    InvalidMetric {
        /// Offending area unit.
        area_id: String,
        /// Metric name.
        metric: &'static str,
        /// The rejected value.
        value: f64,
    },
}

fn tercile_of_group(group: usize) -> Tercile {
    match group {
        1 => Tercile::Low,
        2 => Tercile::Medium,
        _ => Tercile::High,
    }
}

/// Rank-based terciles of `(id, value)` pairs, aligned with the input.
///
/// Cut points are `ceil(n/3)` and `ceil(2n/3)` with ties broken by id.
/// For `n < 3` the first unit is [`Tercile::Low`] and a second one
/// [`Tercile::Medium`].
#[must_use]
pub fn terciles<S: AsRef<str>>(items: &[(S, f64)]) -> Vec<Tercile> {
    rank_groups(items, 3)
        .into_iter()
        .map(tercile_of_group)
        .collect()
}

/// Classifies every area unit by joining it with its metrics on `id`.
///
/// Output is sorted by id. Units with zero incidents are ranked like any
/// other (density `0.0`) so every unit receives a class.
///
/// # Errors
///
/// * [`ClassifyError::DuplicateId`] for repeated unit or metric ids
/// * [`ClassifyError::MissingMetrics`] / [`ClassifyError::UnknownArea`]
///   when the two sides of the join do not match
/// * [`ClassifyError::InvalidMetric`] for a non-finite or negative density
pub fn classify(
    area_units: &[AreaUnit],
    metrics: &[AreaMetrics],
) -> Result<Vec<ClassifiedAreaUnit>, ClassifyError> {
    let mut by_id: BTreeMap<&str, &AreaMetrics> = BTreeMap::new();
    for metric in metrics {
        if by_id.insert(metric.area_id.as_str(), metric).is_some() {
            return Err(ClassifyError::DuplicateId {
                id: metric.area_id.clone(),
            });
        }
        if !metric.density.is_finite() || metric.density < 0.0 {
            return Err(ClassifyError::InvalidMetric {
                area_id: metric.area_id.clone(),
                metric: "density",
                value: metric.density,
            });
        }
    }

    let mut seen = BTreeSet::new();
    let mut joined: Vec<(&AreaUnit, &AreaMetrics)> = Vec::with_capacity(area_units.len());
    for unit in area_units {
        if !seen.insert(unit.id.as_str()) {
            return Err(ClassifyError::DuplicateId {
                id: unit.id.clone(),
            });
        }
        let metric = by_id
            .get(unit.id.as_str())
            .ok_or_else(|| ClassifyError::MissingMetrics {
                area_id: unit.id.clone(),
            })?;
        joined.push((unit, metric));
    }
    if let Some(orphan) = by_id.keys().find(|id| !seen.contains(*id)) {
        return Err(ClassifyError::UnknownArea {
            area_id: (*orphan).to_string(),
        });
    }
    joined.sort_by(|a, b| a.0.id.cmp(&b.0.id));

    let density: Vec<(&str, f64)> = joined
        .iter()
        .map(|(unit, metric)| (unit.id.as_str(), metric.density))
        .collect();
    let time: Vec<(&str, f64)> = joined
        .iter()
        .map(|(unit, metric)| (unit.id.as_str(), metric.time.reachability.minutes_f64()))
        .collect();

    let density_terciles = terciles(&density);
    let time_terciles = terciles(&time);

    let classified: Vec<ClassifiedAreaUnit> = joined
        .iter()
        .zip(density_terciles.into_iter().zip(time_terciles))
        .map(|((unit, metric), (density_tercile, time_tercile))| {
            let class = BivariateClass::from_terciles(density_tercile, time_tercile);
            ClassifiedAreaUnit {
                id: unit.id.clone(),
                name: unit.name.clone(),
                area_sq_mi: unit.area_sq_mi,
                population: unit.demographics.population,
                pct_black: unit.demographics.pct_black,
                pct_poverty: unit.demographics.pct_poverty,
                median_income: unit.demographics.median_income,
                incident_count: metric.incident_count,
                fatal_count: metric.fatal_count,
                incidents_per_year: metric.incidents_per_year,
                fatality_rate: metric.fatality_rate,
                annual_per_10k: metric.annual_per_10k,
                mean_victim_age: metric.mean_victim_age,
                pct_male: metric.pct_male,
                density_metric: metric.density,
                time_metric: metric.time.reachability,
                time_band: metric.time.band,
                nearest_facility: metric.time.nearest_facility.clone(),
                within_golden_hour: metric.within_golden_hour,
                density_tercile,
                time_tercile,
                bivariate_class: class,
                bivariate_label: class.label(),
                priority_group: class.priority(),
            }
        })
        .collect();

    log_distribution(&classified);

    Ok(classified)
}

fn log_distribution(classified: &[ClassifiedAreaUnit]) {
    if classified.len() < 3 {
        log::warn!(
            "Only {} area units to classify; terciles are degenerate",
            classified.len()
        );
    }

    let mut per_class: BTreeMap<BivariateClass, usize> = BTreeMap::new();
    for unit in classified {
        *per_class.entry(unit.bivariate_class).or_default() += 1;
    }
    for (class, count) in &per_class {
        log::info!("Class {class} ({}): {count} area units", class.label());
    }
}
