#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Composite vulnerability index.
//!
//! Each indicator is min-max normalized to `[0, 1]` across all units,
//! inverted when a higher raw value is better, weighted and summed, then
//! scaled to 0-100. Missing raw values are imputed with the indicator's
//! median before normalization. Quartiles use the same rank-based cut as
//! the bivariate terciles.

pub mod weights;

use std::collections::BTreeMap;

use serde::Serialize;
use strum::IntoEnumIterator as _;
use strum_macros::{AsRefStr, Display};
use thiserror::Error;
use trauma_desert_area_models::{BivariateClass, ClassifiedAreaUnit};
use trauma_desert_classify::{competition_ranks, rank_groups};

pub use weights::{Direction, Indicator, WEIGHT_SUM_TOLERANCE, Weights};

/// Points added to the index score of highest-priority units.
pub const HIGHEST_PRIORITY_BONUS: f64 = 20.0;

/// Errors raised while building the index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// No weights were given.
    #[error("No indicator weights given")]
    EmptyWeights,

    /// A weight names an indicator that does not exist.
    #[error("Unknown indicator '{name}'")]
    UnknownIndicator {
        /// The unrecognized name.
        name: String,
    },

    /// A weight is negative or not finite.
    #[error("Invalid weight {weight} for indicator {indicator}")]
    InvalidWeight {
        /// Offending indicator.
        indicator: Indicator,
        /// The rejected weight.
        weight: f64,
    },

    /// Weights do not sum to 1.
    #[error("Indicator weights sum to {sum}, expected 1.0")]
    WeightSum {
        /// Actual sum.
        sum: f64,
    },

    /// A raw indicator value is NaN or infinite.
    #[error("Area unit {area_id} has invalid {indicator} value {value}")]
    InvalidValue {
        /// Offending area unit.
        area_id: String,
        /// Indicator.
        indicator: Indicator,
        /// The rejected value.
        value: f64,
    },

    /// Every unit is missing a weighted indicator, so nothing can be imputed.
    #[error("No area unit reports indicator {indicator}")]
    NoData {
        /// Indicator.
        indicator: Indicator,
    },
}

/// Fixed 20-point bands of the 0-100 index score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Display, AsRefStr)]
pub enum VulnerabilityCategory {
    /// `[0, 20)`
    #[strum(serialize = "Very Low")]
    #[serde(rename = "Very Low")]
    VeryLow,
    /// `[20, 40)`
    Low,
    /// `[40, 60)`
    Moderate,
    /// `[60, 80)`
    High,
    /// `[80, 100]`
    #[strum(serialize = "Very High")]
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl VulnerabilityCategory {
    /// Category of a 0-100 score.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score < 20.0 {
            Self::VeryLow
        } else if score < 40.0 {
            Self::Low
        } else if score < 60.0 {
            Self::Moderate
        } else if score < 80.0 {
            Self::High
        } else {
            Self::VeryHigh
        }
    }
}

/// One indexed area unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexedAreaUnit {
    /// Area unit identifier.
    pub id: String,
    /// Area unit name.
    pub name: String,
    /// Bivariate class carried over from classification.
    pub bivariate_class: BivariateClass,
    /// Normalized poverty, higher is more vulnerable.
    pub poverty_norm: f64,
    /// Normalized and inverted income, higher is more vulnerable.
    pub income_norm: f64,
    /// Normalized density, higher is more vulnerable.
    pub violence_norm: f64,
    /// Normalized minutes, higher is more vulnerable.
    pub access_norm: f64,
    /// Indicators whose raw value was imputed.
    pub imputed_indicators: usize,
    /// Weighted sum scaled to 0-100.
    pub vulnerability_score: f64,
    /// Rank-based quartile of the score; 4 is the most vulnerable.
    pub vulnerability_quartile: u8,
    /// 20-point band of the score.
    pub vulnerability_category: VulnerabilityCategory,
    /// Score plus [`HIGHEST_PRIORITY_BONUS`] for class 9, capped at 100.
    pub compound_score: f64,
    /// Descending competition rank of `compound_score`; 1 is the most
    /// disadvantaged and tied scores share a rank.
    pub compound_rank: usize,
    /// Whether the compound score falls in its top rank quartile.
    pub compound_top_quartile: bool,
}

/// A normalized indicator column aligned with the input units.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedColumn {
    /// Values in `[0, 1]`, oriented so that higher is more vulnerable.
    pub values: Vec<f64>,
    /// Which entries were imputed.
    pub imputed: Vec<bool>,
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        f64::midpoint(sorted[mid - 1], sorted[mid])
    } else {
        sorted[mid]
    })
}

/// Median-imputes, min-max normalizes and orients one indicator.
///
/// A constant indicator normalizes to 0.5 for every unit, so it shifts
/// all scores equally and never reorders them.
///
/// # Errors
///
/// * [`IndexError::InvalidValue`] for a non-finite raw value
/// * [`IndexError::NoData`] if every value is missing
pub fn normalize(
    indicator: Indicator,
    units: &[ClassifiedAreaUnit],
) -> Result<NormalizedColumn, IndexError> {
    let raw: Vec<Option<f64>> = units.iter().map(|unit| indicator.value(unit)).collect();
    for (unit, value) in units.iter().zip(&raw) {
        if let Some(value) = *value
            && !value.is_finite()
        {
            return Err(IndexError::InvalidValue {
                area_id: unit.id.clone(),
                indicator,
                value,
            });
        }
    }

    let present: Vec<f64> = raw.iter().flatten().copied().collect();
    let fill = median(&present).ok_or(IndexError::NoData { indicator })?;
    let imputed: Vec<bool> = raw.iter().map(Option::is_none).collect();
    let filled: Vec<f64> = raw.iter().map(|v| v.unwrap_or(fill)).collect();

    let min = filled.iter().copied().fold(f64::INFINITY, f64::min);
    let max = filled.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    let values = filled
        .iter()
        .map(|&v| {
            let n = if range > 0.0 { (v - min) / range } else { 0.5 };
            match indicator.direction() {
                Direction::HigherIsWorse => n,
                Direction::HigherIsBetter => 1.0 - n,
            }
        })
        .collect();

    let imputed_count = imputed.iter().filter(|&&i| i).count();
    if imputed_count > 0 {
        log::warn!("Imputed {indicator} with median {fill:.4} for {imputed_count} area units");
    }

    Ok(NormalizedColumn { values, imputed })
}

fn quartile(group: usize) -> u8 {
    u8::try_from(group).unwrap_or(4)
}

/// Builds the vulnerability index and compound disadvantage score.
///
/// Output is aligned with `units`. Indicators with zero or no weight are
/// still normalized for the output columns but contribute nothing.
///
/// # Errors
///
/// Any error of [`normalize`] for a weighted indicator.
pub fn build_index(
    units: &[ClassifiedAreaUnit],
    weights: &Weights,
) -> Result<Vec<IndexedAreaUnit>, IndexError> {
    if units.is_empty() {
        return Ok(vec![]);
    }

    let mut columns = BTreeMap::new();
    for indicator in Indicator::iter() {
        let column = match normalize(indicator, units) {
            Ok(column) => column,
            Err(IndexError::NoData { .. }) if weights.get(indicator) <= 0.0 => NormalizedColumn {
                values: vec![0.0; units.len()],
                imputed: vec![true; units.len()],
            },
            Err(e) => return Err(e),
        };
        columns.insert(indicator, column);
    }
    let norm = |indicator: Indicator, i: usize| {
        columns.get(&indicator).map_or(0.0, |column| column.values[i])
    };

    let scores: Vec<f64> = (0..units.len())
        .map(|i| {
            weights
                .iter()
                .map(|(indicator, weight)| weight * norm(indicator, i))
                .sum::<f64>()
                * 100.0
        })
        .collect();
    let compound: Vec<f64> = units
        .iter()
        .zip(&scores)
        .map(|(unit, score)| {
            let bonus = if unit.bivariate_class.is_highest_priority() {
                HIGHEST_PRIORITY_BONUS
            } else {
                0.0
            };
            (score + bonus).min(100.0)
        })
        .collect();

    let keyed = |values: &[f64]| -> Vec<(String, f64)> {
        units
            .iter()
            .zip(values)
            .map(|(unit, &v)| (unit.id.clone(), v))
            .collect()
    };
    let quartiles = rank_groups(&keyed(&scores), 4);
    let compound_quartiles = rank_groups(&keyed(&compound), 4);
    let compound_ranks = competition_ranks(&compound);

    let indexed: Vec<IndexedAreaUnit> = units
        .iter()
        .enumerate()
        .map(|(i, unit)| IndexedAreaUnit {
            id: unit.id.clone(),
            name: unit.name.clone(),
            bivariate_class: unit.bivariate_class,
            poverty_norm: norm(Indicator::Poverty, i),
            income_norm: norm(Indicator::Income, i),
            violence_norm: norm(Indicator::Violence, i),
            access_norm: norm(Indicator::Access, i),
            imputed_indicators: weights
                .iter()
                .filter(|&(indicator, weight)| {
                    weight > 0.0 && columns.get(&indicator).is_some_and(|c| c.imputed[i])
                })
                .count(),
            vulnerability_score: scores[i],
            vulnerability_quartile: quartile(quartiles[i]),
            vulnerability_category: VulnerabilityCategory::from_score(scores[i]),
            compound_score: compound[i],
            compound_rank: compound_ranks[i],
            compound_top_quartile: compound_quartiles[i] == 4,
        })
        .collect();

    log::info!(
        "Built vulnerability index for {} area units ({} in the top compound quartile)",
        indexed.len(),
        indexed.iter().filter(|u| u.compound_top_quartile).count()
    );

    Ok(indexed)
}

#[cfg(test)]
mod tests {
    use trauma_desert_area_models::{PriorityGroup, Reachability, Tercile};

    use super::*;

    fn unit(id: &str, poverty: f64, income: f64, density: f64, minutes: u32) -> ClassifiedAreaUnit {
        let reachability = Reachability::from(minutes);
        ClassifiedAreaUnit {
            id: id.to_string(),
            name: id.to_string(),
            area_sq_mi: 1.0,
            population: Some(1000),
            pct_black: Some(0.5),
            pct_poverty: Some(poverty),
            median_income: Some(income),
            incident_count: 0,
            fatal_count: 0,
            incidents_per_year: 0.0,
            fatality_rate: None,
            annual_per_10k: None,
            mean_victim_age: None,
            pct_male: None,
            density_metric: density,
            time_metric: reachability,
            time_band: reachability.band(),
            nearest_facility: None,
            within_golden_hour: false,
            density_tercile: Tercile::Low,
            time_tercile: Tercile::Low,
            bivariate_class: BivariateClass::from_terciles(Tercile::Low, Tercile::Low),
            bivariate_label: "Low burden, good access",
            priority_group: PriorityGroup::Lowest,
        }
    }

    fn highest(mut unit: ClassifiedAreaUnit) -> ClassifiedAreaUnit {
        unit.bivariate_class = BivariateClass::HIGHEST;
        unit.density_tercile = Tercile::High;
        unit.time_tercile = Tercile::High;
        unit
    }

    fn equal_weights() -> Weights {
        Weights::new(
            [
                Indicator::Poverty,
                Indicator::Income,
                Indicator::Violence,
                Indicator::Access,
            ]
            .into_iter()
            .map(|i| (i, 0.25))
            .collect::<BTreeMap<_, _>>(),
        )
        .unwrap()
    }

    /// Two units identical except for one indicator; returns their scores.
    fn pair_scores(low: ClassifiedAreaUnit, high: ClassifiedAreaUnit) -> (f64, f64) {
        let indexed = build_index(&[low, high], &equal_weights()).unwrap();
        (indexed[0].vulnerability_score, indexed[1].vulnerability_score)
    }

    #[test]
    fn higher_poverty_is_more_vulnerable() {
        let (low, high) = pair_scores(
            unit("a", 0.1, 40_000.0, 2.0, 10),
            unit("b", 0.4, 40_000.0, 2.0, 10),
        );
        assert!(high > low);
    }

    #[test]
    fn higher_income_is_less_vulnerable() {
        let (low_income, high_income) = pair_scores(
            unit("a", 0.2, 25_000.0, 2.0, 10),
            unit("b", 0.2, 90_000.0, 2.0, 10),
        );
        assert!(high_income < low_income);
    }

    #[test]
    fn higher_density_is_more_vulnerable() {
        let (low, high) = pair_scores(
            unit("a", 0.2, 40_000.0, 1.0, 10),
            unit("b", 0.2, 40_000.0, 9.0, 10),
        );
        assert!(high > low);
    }

    #[test]
    fn longer_travel_time_is_more_vulnerable() {
        let (near, far) = pair_scores(
            unit("a", 0.2, 40_000.0, 2.0, 5),
            unit("b", 0.2, 40_000.0, 2.0, 31),
        );
        assert!(far > near);
    }

    #[test]
    fn normalization_bounds_and_constants() {
        let units = vec![
            unit("a", 0.0, 30_000.0, 2.0, 10),
            unit("b", 0.25, 60_000.0, 2.0, 10),
            unit("c", 0.5, 90_000.0, 2.0, 10),
        ];
        let poverty = normalize(Indicator::Poverty, &units).unwrap();
        assert_eq!(poverty.values, vec![0.0, 0.5, 1.0]);
        let income = normalize(Indicator::Income, &units).unwrap();
        assert_eq!(income.values, vec![1.0, 0.5, 0.0]);
        let violence = normalize(Indicator::Violence, &units).unwrap();
        assert_eq!(violence.values, vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn missing_values_take_the_median() {
        let mut units = vec![
            unit("a", 0.1, 30_000.0, 1.0, 10),
            unit("b", 0.2, 50_000.0, 2.0, 10),
            unit("c", 0.9, 70_000.0, 3.0, 10),
            unit("d", 0.0, 0.0, 4.0, 10),
        ];
        units[3].median_income = None;
        let income = normalize(Indicator::Income, &units).unwrap();
        assert_eq!(income.imputed, vec![false, false, false, true]);
        assert!((income.values[3] - 0.5).abs() < 1e-12);

        let indexed = build_index(&units, &equal_weights()).unwrap();
        assert_eq!(indexed[3].imputed_indicators, 1);
        assert_eq!(indexed[0].imputed_indicators, 0);
    }

    #[test]
    fn all_missing_weighted_indicator_is_an_error() {
        let mut units = vec![
            unit("a", 0.1, 30_000.0, 1.0, 10),
            unit("b", 0.2, 50_000.0, 2.0, 10),
        ];
        for u in &mut units {
            u.median_income = None;
        }
        assert!(matches!(
            build_index(&units, &equal_weights()),
            Err(IndexError::NoData {
                indicator: Indicator::Income
            })
        ));

        let without_income = Weights::new(
            [(Indicator::Violence, 0.5), (Indicator::Access, 0.5)]
                .into_iter()
                .collect(),
        )
        .unwrap();
        assert!(build_index(&units, &without_income).is_ok());
    }

    #[test]
    fn quartiles_and_categories() {
        let units: Vec<_> = (0..8_u32)
            .map(|i| {
                unit(
                    &format!("u{i}"),
                    f64::from(i) / 10.0,
                    f64::from(80 - i * 5) * 1000.0,
                    f64::from(i),
                    5 + i * 3,
                )
            })
            .collect();
        let indexed = build_index(&units, &Weights::default()).unwrap();

        let quartiles: Vec<u8> = indexed.iter().map(|u| u.vulnerability_quartile).collect();
        assert_eq!(quartiles, vec![1, 1, 2, 2, 3, 3, 4, 4]);
        assert!(indexed[0].vulnerability_score.abs() < 1e-9);
        assert!((indexed[7].vulnerability_score - 100.0).abs() < 1e-9);
        assert_eq!(indexed[0].vulnerability_category, VulnerabilityCategory::VeryLow);
        assert_eq!(indexed[7].vulnerability_category, VulnerabilityCategory::VeryHigh);
    }

    #[test]
    fn compound_score_rewards_highest_priority() {
        let units = vec![
            unit("a", 0.1, 60_000.0, 1.0, 5),
            highest(unit("b", 0.2, 50_000.0, 2.0, 10)),
            highest(unit("c", 0.9, 20_000.0, 9.0, 31)),
            unit("d", 0.5, 40_000.0, 5.0, 20),
        ];
        let indexed = build_index(&units, &Weights::default()).unwrap();

        assert!((indexed[1].compound_score - (indexed[1].vulnerability_score + 20.0)).abs() < 1e-9);
        assert!((indexed[2].compound_score - 100.0).abs() < 1e-9);
        assert!((indexed[3].compound_score - indexed[3].vulnerability_score).abs() < 1e-12);
        assert!(indexed[2].compound_top_quartile);
        assert_eq!(
            indexed.iter().filter(|u| u.compound_top_quartile).count(),
            1
        );
    }

    #[test]
    fn compound_rank_is_competition_ranking() {
        let units = vec![
            unit("mid1", 0.5, 50_000.0, 5.0, 15),
            unit("low", 0.1, 80_000.0, 1.0, 5),
            unit("top", 0.9, 20_000.0, 9.0, 31),
            unit("mid2", 0.5, 50_000.0, 5.0, 15),
        ];
        let indexed = build_index(&units, &Weights::default()).unwrap();

        let ranks: Vec<usize> = indexed.iter().map(|u| u.compound_rank).collect();
        assert_eq!(ranks, vec![2, 4, 1, 2]);
        assert!((indexed[0].compound_score - indexed[3].compound_score).abs() < f64::EPSILON);
    }

    #[test]
    fn capped_compound_scores_share_first_rank() {
        let units = vec![
            highest(unit("a", 0.9, 20_000.0, 9.0, 31)),
            highest(unit("b", 0.8, 25_000.0, 8.0, 30)),
            unit("c", 0.1, 80_000.0, 1.0, 5),
        ];
        let indexed = build_index(&units, &Weights::default()).unwrap();

        assert!((indexed[1].compound_score - 100.0).abs() < 1e-9);
        let ranks: Vec<usize> = indexed.iter().map(|u| u.compound_rank).collect();
        assert_eq!(ranks, vec![1, 1, 3]);
    }

    #[test]
    fn category_bands() {
        assert_eq!(VulnerabilityCategory::from_score(19.99), VulnerabilityCategory::VeryLow);
        assert_eq!(VulnerabilityCategory::from_score(20.0), VulnerabilityCategory::Low);
        assert_eq!(VulnerabilityCategory::from_score(59.9), VulnerabilityCategory::Moderate);
        assert_eq!(VulnerabilityCategory::from_score(100.0), VulnerabilityCategory::VeryHigh);
        assert_eq!(VulnerabilityCategory::VeryHigh.to_string(), "Very High");
        assert_eq!(
            serde_json::to_value(VulnerabilityCategory::VeryLow).unwrap(),
            "Very Low"
        );
    }
}
