//! Output tables.
//!
//! Every result of a run is written as its own CSV file so downstream
//! rendering tools can pick up exactly the table they need.

use std::path::{Path, PathBuf};

use serde::Serialize;
use trauma_desert_analytics_models::OaxacaResult;
use trauma_desert_ingest::{IngestError, write_csv_file};

use crate::{AnalysisOutput, PipelineError, Stage};

/// One row per classified area unit.
pub const CLASSIFIED_UNITS: &str = "classified_area_units.csv";
/// One row per computed comparison.
pub const DISPARITY_SUMMARY: &str = "disparity_summary.csv";
/// Comparisons that could not be computed.
pub const SKIPPED_COMPARISONS: &str = "skipped_comparisons.csv";
/// Oaxaca-Blinder totals per decomposition.
pub const DECOMPOSITIONS: &str = "oaxaca_decompositions.csv";
/// Per-predictor explained contributions.
pub const CONTRIBUTIONS: &str = "oaxaca_contributions.csv";
/// Logistic fit of fatal outcome on minutes.
pub const FATALITY_LOGISTIC: &str = "fatality_logistic.csv";
/// Chi-square of time band against fatal outcome.
pub const FATALITY_CHI_SQUARE: &str = "fatality_chi_square.csv";
/// Per-class summary.
pub const CLASS_PROFILES: &str = "class_profiles.csv";
/// Ranked highest-priority units.
pub const PRIORITY_RANKING: &str = "priority_ranking.csv";
/// Composite vulnerability index.
pub const VULNERABILITY_INDEX: &str = "vulnerability_index.csv";
/// Incidents by travel-time band.
pub const GOLDEN_HOUR: &str = "golden_hour_distribution.csv";
/// Fatality rate by travel-time band.
pub const FATALITY_BY_BAND: &str = "fatality_by_band.csv";
/// Golden-hour access per victim race.
pub const GOLDEN_HOUR_BY_RACE: &str = "golden_hour_by_race.csv";
/// Incidents per calendar year.
pub const TRENDS_ANNUAL: &str = "temporal_trends_annual.csv";
/// First-year to last-year movement per area unit.
pub const TRENDS_BY_UNIT: &str = "temporal_trends_by_unit.csv";
/// Incident exclusion counts.
pub const ASSIGNMENT: &str = "assignment_report.csv";
/// Validation checks.
pub const VALIDATION: &str = "validation_report.csv";

#[derive(Serialize)]
struct DecompositionRow<'a> {
    comparison_name: &'a str,
    n_a: usize,
    n_b: usize,
    mean_a: f64,
    mean_b: f64,
    raw_gap: f64,
    explained: f64,
    unexplained: f64,
    explained_fraction: f64,
    unexplained_fraction: f64,
    endowments: f64,
    coefficients: f64,
    interaction: f64,
    r_squared_a: f64,
    r_squared_b: f64,
}

impl<'a> DecompositionRow<'a> {
    const fn new(comparison_name: &'a str, result: &OaxacaResult) -> Self {
        Self {
            comparison_name,
            n_a: result.n_a,
            n_b: result.n_b,
            mean_a: result.mean_a,
            mean_b: result.mean_b,
            raw_gap: result.raw_gap,
            explained: result.explained,
            unexplained: result.unexplained,
            explained_fraction: result.explained_fraction,
            unexplained_fraction: result.unexplained_fraction,
            endowments: result.endowments,
            coefficients: result.coefficients,
            interaction: result.interaction,
            r_squared_a: result.r_squared_a,
            r_squared_b: result.r_squared_b,
        }
    }
}

#[derive(Serialize)]
struct ContributionRow<'a> {
    comparison_name: &'a str,
    predictor: &'a str,
    contribution: f64,
    fraction_of_gap: f64,
}

/// Writes every table of `output` into `dir`, creating it if needed.
///
/// Returns the written paths in a fixed order. Optional results that were
/// not computed produce a header-less empty file so the set of files is
/// the same for every run.
///
/// # Errors
///
/// Returns [`PipelineError::Stage`] at [`Stage::Output`] if the directory
/// or a file cannot be written.
pub fn write_tables(dir: &Path, output: &AnalysisOutput) -> Result<Vec<PathBuf>, PipelineError> {
    std::fs::create_dir_all(dir).map_err(|source| {
        PipelineError::stage(
            Stage::Output,
            IngestError::Io {
                path: dir.display().to_string(),
                source,
            },
        )
    })?;

    let decompositions: Vec<DecompositionRow<'_>> = output
        .disparity
        .decompositions
        .iter()
        .map(|(name, result)| DecompositionRow::new(name, result))
        .collect();
    let contributions: Vec<ContributionRow<'_>> = output
        .disparity
        .decompositions
        .iter()
        .flat_map(|(name, result)| {
            result.contributions.iter().map(move |c| ContributionRow {
                comparison_name: name,
                predictor: &c.predictor,
                contribution: c.contribution,
                fraction_of_gap: c.fraction_of_gap,
            })
        })
        .collect();
    let logistic = output
        .disparity
        .fatality_logistic
        .as_ref()
        .map(|fit| fit.coefficients.as_slice())
        .unwrap_or_default();
    let chi_square: Vec<_> = output.disparity.fatality_chi_square.into_iter().collect();

    let mut written = Vec::new();
    let mut write = |name: &str, result: Result<(), IngestError>| {
        result.map_err(|e| PipelineError::stage(Stage::Output, e))?;
        written.push(dir.join(name));
        Ok::<_, PipelineError>(())
    };
    let path = |name: &str| dir.join(name);

    write(CLASSIFIED_UNITS, write_csv_file(&path(CLASSIFIED_UNITS), &output.classified))?;
    write(
        DISPARITY_SUMMARY,
        write_csv_file(&path(DISPARITY_SUMMARY), &output.disparity.summaries),
    )?;
    write(
        SKIPPED_COMPARISONS,
        write_csv_file(&path(SKIPPED_COMPARISONS), &output.disparity.skipped),
    )?;
    write(DECOMPOSITIONS, write_csv_file(&path(DECOMPOSITIONS), &decompositions))?;
    write(CONTRIBUTIONS, write_csv_file(&path(CONTRIBUTIONS), &contributions))?;
    write(FATALITY_LOGISTIC, write_csv_file(&path(FATALITY_LOGISTIC), logistic))?;
    write(FATALITY_CHI_SQUARE, write_csv_file(&path(FATALITY_CHI_SQUARE), &chi_square))?;
    write(CLASS_PROFILES, write_csv_file(&path(CLASS_PROFILES), &output.class_profiles))?;
    write(PRIORITY_RANKING, write_csv_file(&path(PRIORITY_RANKING), &output.priority_ranking))?;
    write(
        VULNERABILITY_INDEX,
        write_csv_file(&path(VULNERABILITY_INDEX), &output.vulnerability_index),
    )?;
    write(GOLDEN_HOUR, write_csv_file(&path(GOLDEN_HOUR), &output.golden_hour.rows))?;
    write(FATALITY_BY_BAND, write_csv_file(&path(FATALITY_BY_BAND), &output.fatality_by_band))?;
    write(
        GOLDEN_HOUR_BY_RACE,
        write_csv_file(&path(GOLDEN_HOUR_BY_RACE), &output.access_by_race),
    )?;
    write(TRENDS_ANNUAL, write_csv_file(&path(TRENDS_ANNUAL), &output.trends.annual))?;
    write(TRENDS_BY_UNIT, write_csv_file(&path(TRENDS_BY_UNIT), &output.trends.units))?;
    write(
        ASSIGNMENT,
        write_csv_file(&path(ASSIGNMENT), std::slice::from_ref(&output.assignment)),
    )?;
    write(VALIDATION, write_csv_file(&path(VALIDATION), &output.validation.checks))?;

    log::info!("Wrote {} tables to {}", written.len(), dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use crate::fixtures::grid;
    use crate::{AnalysisConfig, run};

    use super::*;

    #[test]
    fn writes_every_table() {
        let output = run(&grid(), &AnalysisConfig::embedded().unwrap()).unwrap();
        let dir = std::env::temp_dir().join(format!("trauma_desert_tables_{}", std::process::id()));

        let written = write_tables(&dir, &output).unwrap();
        assert_eq!(written.len(), 17);
        assert!(written.iter().all(|p| p.exists()));

        let classified = std::fs::read_to_string(dir.join(CLASSIFIED_UNITS)).unwrap();
        assert_eq!(classified.lines().count(), 10);
        assert!(classified.starts_with("id,name,area_sq_mi,"));

        let by_race = std::fs::read_to_string(dir.join(GOLDEN_HOUR_BY_RACE)).unwrap();
        assert!(by_race.starts_with("race,incidents,fatal,within_10,"));
        assert_eq!(by_race.lines().count(), 4);

        let trends = std::fs::read_to_string(dir.join(TRENDS_BY_UNIT)).unwrap();
        assert!(trends.starts_with("area_id,first_year_count,last_year_count,"));
        assert_eq!(trends.lines().count(), 10);

        let index = std::fs::read_to_string(dir.join(VULNERABILITY_INDEX)).unwrap();
        assert!(index.lines().next().unwrap().contains("compound_score,compound_rank,"));

        let validation = std::fs::read_to_string(dir.join(VALIDATION)).unwrap();
        assert!(validation.starts_with("check,status,detail"));
        assert!(validation.contains(",PASS,"));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
