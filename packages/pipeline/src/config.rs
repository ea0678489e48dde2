//! Analysis configuration.
//!
//! Every tunable parameter of a run lives in [`AnalysisConfig`], which is
//! parsed from TOML and passed by reference into each stage. The default
//! configuration is embedded in the binary.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;
use trauma_desert_analytics::{DisparityConfig, LogisticOptions};
use trauma_desert_area_models::{IncidentRecord, MAX_THRESHOLD_MINUTES};
use trauma_desert_index::Weights;
use trauma_desert_metrics::ObservationPeriod;
use trauma_desert_spatial::{StudyEnvelope, TopologyPolicy};

use crate::{PipelineError, Stage};

/// The embedded default configuration.
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Logistic regression solver settings as written in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogisticConfig {
    /// Newton iteration cap.
    pub max_iterations: usize,
    /// Convergence tolerance on the largest coefficient step.
    pub tolerance: f64,
}

impl From<LogisticConfig> for LogisticOptions {
    fn from(value: LogisticConfig) -> Self {
        Self {
            max_iterations: value.max_iterations,
            tolerance: value.tolerance,
        }
    }
}

/// Parameters of one analysis run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Incidents outside this rectangle are excluded before assignment.
    pub study_envelope: StudyEnvelope,
    /// Travel time counted as timely care.
    pub golden_hour_minutes: u32,
    /// Fraction Black at or above which a unit is majority Black.
    pub majority_threshold: f64,
    /// Alpha for reporting significant comparisons.
    pub significance: f64,
    /// Treatment of incidents inside overlapping units.
    #[serde(default)]
    pub topology: TopologyPolicy,
    /// Fixed observation window start.
    #[serde(default)]
    pub observation_start: Option<NaiveDate>,
    /// Fixed observation window end (inclusive).
    #[serde(default)]
    pub observation_end: Option<NaiveDate>,
    /// Logistic regression solver settings.
    pub logistic: LogisticConfig,
    /// Composite index weights keyed by indicator name.
    pub weights: BTreeMap<String, f64>,
}

fn invalid(message: impl Into<String>) -> PipelineError {
    PipelineError::Config {
        message: message.into(),
    }
}

impl AnalysisConfig {
    /// Parses and validates a TOML configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] for malformed TOML, unknown keys
    /// or values that fail [`AnalysisConfig::validate`].
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::de::from_str(text).map_err(|e| invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The embedded default configuration.
    ///
    /// # Errors
    ///
    /// Only if the embedded file is itself invalid.
    pub fn embedded() -> Result<Self, PipelineError> {
        Self::parse(DEFAULT_CONFIG)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] if the file cannot be read or
    /// parsed.
    pub fn from_file(path: &Path) -> Result<Self, PipelineError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("{}: {e}", path.display())))?;
        let config = Self::parse(&text)?;
        log::info!("Loaded analysis configuration from {}", path.display());
        Ok(config)
    }

    /// Checks every parameter range.
    ///
    /// # Errors
    ///
    /// * [`PipelineError::Config`] for an out-of-range parameter or a
    ///   half-specified observation window
    /// * [`PipelineError::Stage`] wrapping the index or spatial error for
    ///   bad weights or an invalid envelope
    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(1..=MAX_THRESHOLD_MINUTES).contains(&self.golden_hour_minutes) {
            return Err(invalid(format!(
                "golden_hour_minutes must be within 1..={MAX_THRESHOLD_MINUTES}, got {}",
                self.golden_hour_minutes
            )));
        }
        if !(self.majority_threshold > 0.0 && self.majority_threshold <= 1.0) {
            return Err(invalid(format!(
                "majority_threshold must be in (0, 1], got {}",
                self.majority_threshold
            )));
        }
        if !(self.significance > 0.0 && self.significance < 1.0) {
            return Err(invalid(format!(
                "significance must be in (0, 1), got {}",
                self.significance
            )));
        }
        if self.logistic.max_iterations == 0
            || !self.logistic.tolerance.is_finite()
            || self.logistic.tolerance <= 0.0
        {
            return Err(invalid(
                "logistic.max_iterations and logistic.tolerance must be positive",
            ));
        }
        match (self.observation_start, self.observation_end) {
            (Some(start), Some(end)) if end < start => {
                return Err(invalid(format!(
                    "observation_end {end} precedes observation_start {start}"
                )));
            }
            (Some(_), None) | (None, Some(_)) => {
                return Err(invalid(
                    "observation_start and observation_end must be given together",
                ));
            }
            _ => {}
        }

        self.index_weights()?;
        self.study_envelope
            .validate()
            .map_err(|e| PipelineError::stage(Stage::Configuration, e))
    }

    /// Composite index weights.
    ///
    /// # Errors
    ///
    /// Wraps the [`trauma_desert_index::IndexError`] for unknown names or
    /// weights that do not sum to one.
    pub fn index_weights(&self) -> Result<Weights, PipelineError> {
        Weights::from_names(&self.weights)
            .map_err(|e| PipelineError::stage(Stage::Configuration, e))
    }

    /// Settings for the disparity analyzer.
    #[must_use]
    pub fn disparity(&self) -> DisparityConfig {
        DisparityConfig {
            majority_threshold: self.majority_threshold,
            logistic: self.logistic.into(),
        }
    }

    /// The configured window, or the span of the valid incidents.
    ///
    /// # Errors
    ///
    /// Wraps the [`trauma_desert_metrics::MetricError`] when no window is
    /// configured and no valid incident carries a date.
    pub fn observation_period(
        &self,
        incidents: &[IncidentRecord],
    ) -> Result<ObservationPeriod, PipelineError> {
        let period = match (self.observation_start, self.observation_end) {
            (Some(start), Some(end)) => ObservationPeriod::from_date_range(start, end),
            _ => ObservationPeriod::from_incidents(incidents),
        };
        period.map_err(|e| PipelineError::stage(Stage::Aggregation, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults() {
        let config = AnalysisConfig::embedded().unwrap();
        assert_eq!(config.golden_hour_minutes, 20);
        assert!((config.majority_threshold - 0.5).abs() < f64::EPSILON);
        assert!((config.significance - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.topology, TopologyPolicy::Strict);
        assert_eq!(config.logistic.max_iterations, 100);
        assert!(config.observation_start.is_none());
        assert!(config.study_envelope.contains(-75.16, 39.95));

        let weights = config.index_weights().unwrap();
        assert!((weights.iter().map(|(_, w)| w).sum::<f64>() - 1.0).abs() < 1e-12);
    }

    fn with(line_from: &str, line_to: &str) -> Result<AnalysisConfig, PipelineError> {
        assert!(DEFAULT_CONFIG.contains(line_from));
        AnalysisConfig::parse(&DEFAULT_CONFIG.replacen(line_from, line_to, 1))
    }

    #[test]
    fn rejects_bad_weights() {
        let result = with("access = 0.25", "access = 0.35");
        assert!(matches!(result, Err(PipelineError::Stage { .. })));

        let result = with("access = 0.25", "acces = 0.25");
        assert!(matches!(result, Err(PipelineError::Stage { .. })));
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        assert!(matches!(
            with("golden_hour_minutes = 20", "golden_hour_minutes = 45"),
            Err(PipelineError::Config { .. })
        ));
        assert!(matches!(
            with("majority_threshold = 0.5", "majority_threshold = 0.0"),
            Err(PipelineError::Config { .. })
        ));
        assert!(matches!(
            with("significance = 0.05", "significance = 1.0"),
            Err(PipelineError::Config { .. })
        ));
        assert!(matches!(
            with("min_lng = -75.28", "min_lng = -74.00"),
            Err(PipelineError::Stage { .. })
        ));
    }

    #[test]
    fn rejects_unknown_keys_and_malformed_toml() {
        assert!(matches!(
            with("significance = 0.05", "significance = 0.05\ntercile_count = 4"),
            Err(PipelineError::Config { .. })
        ));
        assert!(matches!(
            AnalysisConfig::parse("golden_hour_minutes = "),
            Err(PipelineError::Config { .. })
        ));
    }

    #[test]
    fn observation_window() {
        let config = with(
            "# observation_start = \"2015-01-01\"\n# observation_end = \"2024-12-31\"",
            "observation_start = \"2020-01-01\"\nobservation_end = \"2020-12-31\"",
        )
        .unwrap();
        let period = config.observation_period(&[]).unwrap();
        assert!((period.years() - 366.0 / 365.25).abs() < 1e-12);

        assert!(matches!(
            with(
                "# observation_start = \"2015-01-01\"",
                "observation_start = \"2015-01-01\"",
            ),
            Err(PipelineError::Config { .. })
        ));

        let config = AnalysisConfig::embedded().unwrap();
        assert!(matches!(
            config.observation_period(&[]),
            Err(PipelineError::Stage {
                stage: Stage::Aggregation,
                ..
            })
        ));
    }

    #[test]
    fn disparity_settings_follow_config() {
        let config = with("majority_threshold = 0.5", "majority_threshold = 0.6").unwrap();
        let disparity = config.disparity();
        assert!((disparity.majority_threshold - 0.6).abs() < f64::EPSILON);
        assert_eq!(disparity.logistic.max_iterations, 100);
    }
}
