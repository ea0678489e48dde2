//! Index indicators and their validated weights.

use std::collections::BTreeMap;
use std::str::FromStr as _;

use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator as _;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use trauma_desert_area_models::ClassifiedAreaUnit;

use crate::IndexError;

/// Allowed deviation of the weight sum from 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Which end of an indicator's scale is the vulnerable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    /// Larger raw values mean more vulnerability.
    HigherIsWorse,
    /// Larger raw values mean less vulnerability; normalized values are
    /// inverted before weighting.
    HigherIsBetter,
}

/// A constituent of the vulnerability index.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Indicator {
    /// Fraction below the poverty line.
    Poverty,
    /// Median household income.
    Income,
    /// Shooting density.
    Violence,
    /// Minutes to the nearest trauma center.
    Access,
}

impl Indicator {
    /// Orientation of the raw value.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::Income => Direction::HigherIsBetter,
            Self::Poverty | Self::Violence | Self::Access => Direction::HigherIsWorse,
        }
    }

    /// Raw value of this indicator for a classified unit.
    #[must_use]
    pub fn value(self, unit: &ClassifiedAreaUnit) -> Option<f64> {
        match self {
            Self::Poverty => unit.pct_poverty,
            Self::Income => unit.median_income,
            Self::Violence => Some(unit.density_metric),
            Self::Access => Some(unit.time_metric.minutes_f64()),
        }
    }
}

/// Non-negative indicator weights summing to 1.
///
/// Indicators without an entry take no part in the score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Weights(BTreeMap<Indicator, f64>);

impl Weights {
    /// Validates a weight mapping.
    ///
    /// # Errors
    ///
    /// * [`IndexError::EmptyWeights`] for an empty mapping
    /// * [`IndexError::InvalidWeight`] for a negative or non-finite weight
    /// * [`IndexError::WeightSum`] if the weights do not sum to 1 within
    ///   [`WEIGHT_SUM_TOLERANCE`]
    pub fn new(weights: BTreeMap<Indicator, f64>) -> Result<Self, IndexError> {
        if weights.is_empty() {
            return Err(IndexError::EmptyWeights);
        }
        for (&indicator, &weight) in &weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(IndexError::InvalidWeight { indicator, weight });
            }
        }
        let sum: f64 = weights.values().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(IndexError::WeightSum { sum });
        }
        Ok(Self(weights))
    }

    /// Validates a mapping keyed by indicator name, as read from config.
    ///
    /// # Errors
    ///
    /// [`IndexError::UnknownIndicator`] for an unrecognized name, then any
    /// error of [`Self::new`].
    pub fn from_names(weights: &BTreeMap<String, f64>) -> Result<Self, IndexError> {
        let mut parsed = BTreeMap::new();
        for (name, &weight) in weights {
            let indicator =
                Indicator::from_str(name).map_err(|_| IndexError::UnknownIndicator {
                    name: name.clone(),
                })?;
            parsed.insert(indicator, weight);
        }
        Self::new(parsed)
    }

    /// Weight of `indicator`, zero when absent.
    #[must_use]
    pub fn get(&self, indicator: Indicator) -> f64 {
        self.0.get(&indicator).copied().unwrap_or(0.0)
    }

    /// Weighted indicators in a fixed order.
    pub fn iter(&self) -> impl Iterator<Item = (Indicator, f64)> + '_ {
        self.0.iter().map(|(&indicator, &weight)| (indicator, weight))
    }
}

impl Default for Weights {
    /// Poverty 0.25, income 0.20, violence 0.30, access 0.25.
    fn default() -> Self {
        Self(
            Indicator::iter()
                .map(|indicator| {
                    let weight = match indicator {
                        Indicator::Poverty | Indicator::Access => 0.25,
                        Indicator::Income => 0.20,
                        Indicator::Violence => 0.30,
                    };
                    (indicator, weight)
                })
                .collect(),
        )
    }
}
