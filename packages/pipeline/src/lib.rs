#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Runs the full trauma-desert analysis.
//!
//! [`run`] threads one [`AnalysisConfig`] through every stage:
//!
//! 1. assign incidents to area units
//! 2. build the reachability index
//! 3. aggregate density and travel-time metrics
//! 4. classify units into the 3x3 bivariate scheme
//! 5. profile classes and rank the highest-priority units
//! 6. summarize golden-hour access by victim race and yearly trends
//! 7. analyze disparities
//! 8. build the composite vulnerability index
//! 9. grade the outputs in a [`ValidationReport`]
//!
//! Each stage returns a new value; inputs are never mutated, and every
//! ordering is keyed by area unit id so repeated runs are identical.

pub mod config;
pub mod inputs;
pub mod tables;
pub mod validation;

use strum_macros::{AsRefStr, Display};
use thiserror::Error;
use trauma_desert_analytics::analyze;
use trauma_desert_analytics_models::DisparityReport;
use trauma_desert_area_models::ClassifiedAreaUnit;
use trauma_desert_classify::{
    ClassProfile, ClassifyError, PriorityRanking, class_profiles, classify, rank_highest_priority,
};
use trauma_desert_index::{IndexError, IndexedAreaUnit, build_index};
use trauma_desert_ingest::IngestError;
use trauma_desert_metrics::{
    BandDistribution, BandFatality, MetricError, ObservationPeriod, RaceAccess, TemporalTrends,
    access_by_race, aggregate, fatality_by_band, incident_access, temporal_trends,
};
use trauma_desert_spatial::{AreaIndex, AssignmentReport, ReachabilityIndex, SpatialError};

pub use config::{AnalysisConfig, DEFAULT_CONFIG};
pub use inputs::{AnalysisInputs, InputPaths};
pub use tables::write_tables;
pub use validation::{CheckStatus, ValidationCheck, ValidationReport, validate_run};

/// The stage a [`PipelineError`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// Checking the analysis configuration.
    Configuration,
    /// Reading input files.
    Ingestion,
    /// Joining incidents to area units.
    Assignment,
    /// Building the reachability index.
    Reachability,
    /// Computing per-unit metrics.
    Aggregation,
    /// Tercile and bivariate classification.
    Classification,
    /// Composite vulnerability index.
    Index,
    /// Writing output tables.
    Output,
}

/// Error raised inside a stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// Geometry or assignment error.
    #[error(transparent)]
    Spatial(#[from] SpatialError),
    /// Metric aggregation error.
    #[error(transparent)]
    Metric(#[from] MetricError),
    /// Classification error.
    #[error(transparent)]
    Classify(#[from] ClassifyError),
    /// Index construction error.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Input or output error.
    #[error(transparent)]
    Ingest(#[from] IngestError),
}

/// Errors raised by a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A configuration value is missing, malformed or out of range.
    #[error("Invalid configuration: {message}")]
    Config {
        /// What is wrong.
        message: String,
    },

    /// A stage failed; `source` names the offending record.
    #[error("{stage} stage failed: {source}")]
    Stage {
        /// Failing stage.
        stage: Stage,
        /// Underlying error.
        #[source]
        source: StageError,
    },
}

impl PipelineError {
    /// Wraps a stage error with the stage it came from.
    pub fn stage(stage: Stage, source: impl Into<StageError>) -> Self {
        Self::Stage {
            stage,
            source: source.into(),
        }
    }
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutput {
    /// Incident exclusion counts.
    pub assignment: AssignmentReport,
    /// Observation window used for annual rates.
    pub period: ObservationPeriod,
    /// One row per area unit, sorted by id.
    pub classified: Vec<ClassifiedAreaUnit>,
    /// Per-class summary.
    pub class_profiles: Vec<ClassProfile>,
    /// Highest-priority units, most severe first.
    pub priority_ranking: Vec<PriorityRanking>,
    /// Assigned incidents by travel-time band.
    pub golden_hour: BandDistribution,
    /// Share of assigned incidents within the golden hour.
    pub golden_hour_share: f64,
    /// Fatality rate per travel-time band.
    pub fatality_by_band: Vec<BandFatality>,
    /// Golden-hour access per victim race.
    pub access_by_race: Vec<RaceAccess>,
    /// Annual and per-unit incident trends.
    pub trends: TemporalTrends,
    /// Statistical comparisons.
    pub disparity: DisparityReport,
    /// Composite vulnerability index, aligned with `classified`.
    pub vulnerability_index: Vec<IndexedAreaUnit>,
    /// Post-run checks.
    pub validation: ValidationReport,
}

impl AnalysisOutput {
    /// Names of the comparisons whose p-value is below `alpha`.
    #[must_use]
    pub fn significant_comparisons(&self, alpha: f64) -> Vec<&str> {
        self.disparity
            .summaries
            .iter()
            .filter(|s| s.p_value.is_some_and(|p| p < alpha))
            .map(|s| s.comparison_name.as_str())
            .collect()
    }
}

/// Runs every stage on already-loaded inputs.
///
/// # Errors
///
/// * [`PipelineError::Config`] if `config` fails validation
/// * [`PipelineError::Stage`] wrapping the first stage error, e.g. a
///   topology defect under the strict policy or a weighted index
///   indicator no unit reports
pub fn run(
    inputs: &AnalysisInputs,
    config: &AnalysisConfig,
) -> Result<AnalysisOutput, PipelineError> {
    config.validate()?;
    let weights = config.index_weights()?;

    log::info!(
        "Running analysis over {} area units, {} incidents, {} isochrones",
        inputs.area_units.len(),
        inputs.incidents.len(),
        inputs.isochrones.len()
    );

    let area_index = AreaIndex::build(&inputs.area_units)
        .map_err(|e| PipelineError::stage(Stage::Assignment, e))?;
    let outcome = area_index
        .assign_incidents(&inputs.incidents, &config.study_envelope, config.topology)
        .map_err(|e| PipelineError::stage(Stage::Assignment, e))?;

    let reachability = ReachabilityIndex::build(&inputs.isochrones)
        .map_err(|e| PipelineError::stage(Stage::Reachability, e))?;

    let period = config.observation_period(&inputs.incidents)?;
    let metrics = aggregate(
        &inputs.area_units,
        &outcome.assigned,
        &reachability,
        &period,
        config.golden_hour_minutes,
    )
    .map_err(|e| PipelineError::stage(Stage::Aggregation, e))?;
    let access = incident_access(&outcome.assigned, &metrics)
        .map_err(|e| PipelineError::stage(Stage::Aggregation, e))?;

    let trends = temporal_trends(&inputs.area_units, &outcome.assigned)
        .map_err(|e| PipelineError::stage(Stage::Aggregation, e))?;

    let classified = classify(&inputs.area_units, &metrics)
        .map_err(|e| PipelineError::stage(Stage::Classification, e))?;

    let golden_hour = BandDistribution::from_incidents(&access);
    let golden_hour_share = golden_hour.cumulative_share_within(config.golden_hour_minutes);
    log::info!(
        "{:.1}% of assigned incidents lie within {} minutes of a facility",
        golden_hour_share * 100.0,
        config.golden_hour_minutes
    );

    let disparity = analyze(&classified, &access, &config.disparity());

    let vulnerability_index = build_index(&classified, &weights)
        .map_err(|e| PipelineError::stage(Stage::Index, e))?;

    let validation = validate_run(&inputs.area_units, &outcome.report, &classified);

    let output = AnalysisOutput {
        assignment: outcome.report,
        period,
        class_profiles: class_profiles(&classified),
        priority_ranking: rank_highest_priority(&classified),
        fatality_by_band: fatality_by_band(&access),
        access_by_race: access_by_race(&access, config.golden_hour_minutes),
        trends,
        classified,
        golden_hour,
        golden_hour_share,
        disparity,
        vulnerability_index,
        validation,
    };

    log::info!(
        "{} of {} comparisons significant at alpha = {} ({} skipped)",
        output.significant_comparisons(config.significance).len(),
        output.disparity.summaries.len(),
        config.significance,
        output.disparity.skipped.len()
    );

    Ok(output)
}


#[cfg(test)]
mod tests {
    use trauma_desert_area_models::{BivariateClass, Race, Reachability};
    use trauma_desert_ingest::write_csv;
    use trauma_desert_spatial::TopologyPolicy;

    use super::fixtures::{SIDE, X0, Y0, grid, rect};
    use super::*;

    fn class_of(output: &AnalysisOutput, id: &str) -> u8 {
        output
            .classified
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.bivariate_class.value())
            .unwrap()
    }

    #[test]
    fn grid_yields_one_unit_per_class() {
        let config = AnalysisConfig::embedded().unwrap();
        let output = run(&grid(), &config).unwrap();

        assert_eq!(output.assignment.assigned, 36);
        assert_eq!(output.classified.len(), 9);
        for row in 0..3_u8 {
            for col in 0..3_u8 {
                assert_eq!(class_of(&output, &format!("r{row}c{col}")), row * 3 + col + 1);
            }
        }

        let highest: Vec<&str> = output
            .classified
            .iter()
            .filter(|u| u.bivariate_class == BivariateClass::HIGHEST)
            .map(|u| u.id.as_str())
            .collect();
        assert_eq!(highest, ["r2c2"]);
        assert_eq!(
            output.classified.iter().find(|u| u.id == "r2c2").map(|u| u.time_metric),
            Some(Reachability::Within(30))
        );

        assert_eq!(output.priority_ranking.len(), 1);
        assert_eq!(output.class_profiles.iter().map(|p| p.unit_count).sum::<usize>(), 9);
        assert_eq!(output.vulnerability_index.len(), 9);
        assert_eq!(output.validation.count(CheckStatus::Warn), 0);
        assert!(!output.validation.has_failures());
    }

    #[test]
    fn golden_hour_share_counts_units_within_twenty_minutes() {
        let config = AnalysisConfig::embedded().unwrap();
        let output = run(&grid(), &config).unwrap();

        assert_eq!(output.golden_hour.total, 36);
        assert!((output.golden_hour_share - 24.0 / 36.0).abs() < 1e-12);
        let fatal: u64 = output.fatality_by_band.iter().map(|b| b.fatal).sum();
        assert_eq!(fatal, 3 * (1 + 2 + 2));
    }

    #[test]
    fn golden_hour_access_splits_by_victim_race() {
        let config = AnalysisConfig::embedded().unwrap();
        let output = run(&grid(), &config).unwrap();

        let rows: Vec<(Race, u64, u64, u64)> = output
            .access_by_race
            .iter()
            .map(|r| (r.race, r.within_10, r.within_golden_hour, r.beyond_golden_hour))
            .collect();
        assert_eq!(
            rows,
            vec![
                (Race::Black, 12, 12, 0),
                (Race::White, 0, 12, 0),
                (Race::Hispanic, 0, 0, 12),
            ]
        );
        let means: Vec<f64> = output.access_by_race.iter().map(|r| r.mean_minutes).collect();
        assert_eq!(means, vec![10.0, 20.0, 30.0]);

        let r0c0 = output.classified.iter().find(|u| u.id == "r0c0").unwrap();
        assert_eq!(r0c0.mean_victim_age, Some(18.5));
        assert_eq!(r0c0.pct_male, Some(50.0));
    }

    #[test]
    fn trends_cover_the_single_observed_year() {
        let output = run(&grid(), &AnalysisConfig::embedded().unwrap()).unwrap();

        assert_eq!(output.trends.annual.len(), 1);
        assert_eq!(output.trends.annual[0].year, 2020);
        assert_eq!(output.trends.annual[0].incidents, 36);
        assert_eq!(output.trends.annual[0].fatal, 15);
        assert_eq!(output.trends.units.len(), 9);
        assert!(output.trends.units.iter().all(|u| u.change == 0));
        assert_eq!(output.trends.emerging().count(), 0);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let config = AnalysisConfig::embedded().unwrap();
        let inputs = grid();
        let first = run(&inputs, &config).unwrap();
        let second = run(&inputs, &config).unwrap();
        assert_eq!(first.classified, second.classified);

        let bytes = |output: &AnalysisOutput| {
            let mut buffer = Vec::new();
            write_csv(&mut buffer, &output.classified, "classified").unwrap();
            write_csv(&mut buffer, &output.disparity.summaries, "summaries").unwrap();
            write_csv(&mut buffer, &output.vulnerability_index, "index").unwrap();
            buffer
        };
        assert_eq!(bytes(&first), bytes(&second));
    }

    #[test]
    fn input_order_does_not_change_classes() {
        let config = AnalysisConfig::embedded().unwrap();
        let inputs = grid();
        let mut reversed = inputs.clone();
        reversed.area_units.reverse();
        reversed.incidents.reverse();
        reversed.isochrones.reverse();

        let forward = run(&inputs, &config).unwrap();
        let backward = run(&reversed, &config).unwrap();
        assert_eq!(forward.classified, backward.classified);
        assert_eq!(forward.vulnerability_index, backward.vulnerability_index);
    }

    #[test]
    fn overlapping_units_follow_topology_policy() {
        let mut inputs = grid();
        inputs.area_units.push(
            trauma_desert_spatial::geometry::build_area_unit(
                "overlap",
                "Overlap",
                rect(X0, Y0, X0 + SIDE / 2.0, Y0 + SIDE / 2.0),
                inputs.area_units[0].demographics.clone(),
            )
            .unwrap(),
        );

        let strict = AnalysisConfig::embedded().unwrap();
        assert!(matches!(
            run(&inputs, &strict),
            Err(PipelineError::Stage {
                stage: Stage::Assignment,
                source: StageError::Spatial(SpatialError::Topology { .. }),
            })
        ));

        let tolerant = AnalysisConfig {
            topology: TopologyPolicy::Tolerant,
            ..strict
        };
        let output = run(&inputs, &tolerant).unwrap();
        assert_eq!(output.assignment.overlaps, 2);
        assert_eq!(output.assignment.assigned, 36);
        assert!(!output.validation.has_failures());
    }

    #[test]
    fn incidents_outside_envelope_are_excluded() {
        let mut inputs = grid();
        inputs.incidents[0].longitude = Some(-80.0);
        inputs.incidents[1].latitude = None;

        let output = run(&inputs, &AnalysisConfig::embedded().unwrap()).unwrap();
        assert_eq!(output.assignment.outside_envelope, 1);
        assert_eq!(output.assignment.invalid, 1);
        assert_eq!(output.assignment.assigned, 34);
    }

    #[test]
    fn invalid_isochrone_names_the_stage() {
        let mut inputs = grid();
        inputs.isochrones[0].threshold_minutes = 45;
        assert!(matches!(
            run(&inputs, &AnalysisConfig::embedded().unwrap()),
            Err(PipelineError::Stage {
                stage: Stage::Reachability,
                ..
            })
        ));
    }
}
