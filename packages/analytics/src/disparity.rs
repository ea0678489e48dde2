//! The named comparisons of one analysis run.
//!
//! Every comparison is independent: one that cannot be computed (too few
//! units, zero variance, non-convergence) is recorded in
//! [`DisparityReport::skipped`] with its reason and the rest still run.

use thiserror::Error;
use trauma_desert_analytics_models::{
    ComparisonKind, DisparityReport, DisparitySummary, SkippedComparison,
};
use trauma_desert_area_models::ClassifiedAreaUnit;
use trauma_desert_metrics::{IncidentAccess, fatality_by_band, log1p_floor};

use crate::StatsError;
use crate::chi_square::chi_square_independence;
use crate::correlation::pearson;
use crate::descriptive::standardize;
use crate::oaxaca::{Observation, oaxaca_blinder};
use crate::regression::{LogisticOptions, Predictor, logistic_regression};
use crate::ttest::welch_t_test;

/// Parameters of the disparity comparisons.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisparityConfig {
    /// Units with `pct_black` at or above this are majority Black.
    pub majority_threshold: f64,
    /// Solver settings for the fatality regression.
    pub logistic: LogisticOptions,
}

impl Default for DisparityConfig {
    fn default() -> Self {
        Self {
            majority_threshold: 0.5,
            logistic: LogisticOptions::default(),
        }
    }
}

/// Why a comparison produced no row.
#[derive(Debug, Error)]
enum Skip {
    #[error(transparent)]
    Stats(#[from] StatsError),
    #[error("{0}")]
    Data(String),
}

type Field = fn(&ClassifiedAreaUnit) -> Option<f64>;

fn minutes(unit: &ClassifiedAreaUnit) -> f64 {
    unit.time_metric.minutes_f64()
}

fn majority_black(unit: &ClassifiedAreaUnit, threshold: f64) -> Option<bool> {
    unit.pct_black.map(|pct| pct >= threshold)
}

/// Splits the defined values of `field` by `in_group`.
fn split_by(
    units: &[ClassifiedAreaUnit],
    in_group: impl Fn(&ClassifiedAreaUnit) -> Option<bool>,
    field: impl Fn(&ClassifiedAreaUnit) -> Option<f64>,
) -> (Vec<f64>, Vec<f64>) {
    let mut a = Vec::new();
    let mut b = Vec::new();
    for unit in units {
        if let (Some(group), Some(value)) = (in_group(unit), field(unit)) {
            if group { a.push(value) } else { b.push(value) }
        }
    }
    (a, b)
}

fn t_test_summary(name: &str, a: &[f64], b: &[f64]) -> Result<DisparitySummary, Skip> {
    let result = welch_t_test(a, b)?;
    Ok(DisparitySummary {
        comparison_name: name.to_string(),
        group_a_stat: Some(result.group_a.mean),
        group_b_stat: Some(result.group_b.mean),
        test_statistic: result.t_statistic,
        p_value: Some(result.p_value),
        effect_size: Some(result.cohens_d),
        kind: ComparisonKind::WelchTTest,
        note: None,
    })
}

fn correlation_summary(
    name: &str,
    units: &[ClassifiedAreaUnit],
    x: impl Fn(&ClassifiedAreaUnit) -> Option<f64>,
    y: impl Fn(&ClassifiedAreaUnit) -> Option<f64>,
) -> Result<DisparitySummary, Skip> {
    let xs: Vec<Option<f64>> = units.iter().map(x).collect();
    let ys: Vec<Option<f64>> = units.iter().map(y).collect();
    let result = pearson(&xs, &ys)?;
    Ok(DisparitySummary {
        comparison_name: name.to_string(),
        group_a_stat: None,
        group_b_stat: None,
        test_statistic: result.r,
        p_value: Some(result.p_value),
        effect_size: Some(result.r),
        kind: ComparisonKind::Pearson,
        note: (result.excluded > 0)
            .then(|| format!("{} units excluded for missing values", result.excluded)),
    })
}

fn low_expected_note(cells_below_five: usize) -> Option<String> {
    (cells_below_five > 0)
        .then(|| format!("{cells_below_five} cells with expected count < 5; p-value unreliable"))
}

/// Majority Black x highest priority, with the highest-priority share of
/// each demographic group as the group statistics.
#[allow(clippy::cast_precision_loss)]
fn majority_by_priority(
    units: &[ClassifiedAreaUnit],
    threshold: f64,
) -> Result<DisparitySummary, Skip> {
    let mut table = vec![vec![0_u64; 2]; 2];
    for unit in units {
        let Some(majority) = majority_black(unit, threshold) else {
            continue;
        };
        let row = usize::from(!majority);
        let col = usize::from(!unit.bivariate_class.is_highest_priority());
        table[row][col] += 1;
    }

    let share = |row: &[u64]| {
        let total = row[0] + row[1];
        (total > 0).then(|| row[0] as f64 / total as f64)
    };
    let result = chi_square_independence(&table)?;
    Ok(DisparitySummary {
        comparison_name: "majority_black_x_highest_priority".to_string(),
        group_a_stat: share(&table[0]),
        group_b_stat: share(&table[1]),
        test_statistic: result.statistic,
        p_value: Some(result.p_value),
        effect_size: Some(result.cramers_v),
        kind: ComparisonKind::ChiSquare,
        note: low_expected_note(result.cells_below_five),
    })
}

/// Listwise-complete observations with z-standardized poverty and income.
fn decomposition_groups(
    units: &[ClassifiedAreaUnit],
    threshold: f64,
    outcome: impl Fn(&ClassifiedAreaUnit) -> Result<f64, Skip>,
) -> Result<(Vec<Observation>, Vec<Observation>), Skip> {
    let complete: Vec<(&ClassifiedAreaUnit, f64, f64)> = units
        .iter()
        .filter_map(|unit| {
            unit.pct_black?;
            Some((unit, unit.pct_poverty?, unit.median_income?))
        })
        .collect();

    let poverty: Vec<f64> = complete.iter().map(|c| c.1).collect();
    let income: Vec<f64> = complete.iter().map(|c| c.2).collect();
    let poverty = standardize(&poverty, "pct_poverty")?;
    let income = standardize(&income, "median_income")?;

    let mut group_a = Vec::new();
    let mut group_b = Vec::new();
    for (i, &(unit, _, _)) in complete.iter().enumerate() {
        let observation = Observation {
            outcome: outcome(unit)?,
            covariates: vec![poverty[i], income[i]],
        };
        if majority_black(unit, threshold) == Some(true) {
            group_a.push(observation);
        } else {
            group_b.push(observation);
        }
    }
    Ok((group_a, group_b))
}

fn decomposition_summary(
    name: &str,
    units: &[ClassifiedAreaUnit],
    threshold: f64,
    outcome: impl Fn(&ClassifiedAreaUnit) -> Result<f64, Skip>,
    report: &mut DisparityReport,
) -> Result<DisparitySummary, Skip> {
    let (group_a, group_b) = decomposition_groups(units, threshold, outcome)?;
    let names = vec!["pct_poverty".to_string(), "median_income".to_string()];
    let result = oaxaca_blinder(&names, &group_a, &group_b)?;

    let summary = DisparitySummary {
        comparison_name: name.to_string(),
        group_a_stat: Some(result.mean_a),
        group_b_stat: Some(result.mean_b),
        test_statistic: result.raw_gap,
        p_value: None,
        effect_size: Some(result.unexplained_fraction),
        kind: ComparisonKind::OaxacaBlinder,
        note: Some(format!(
            "explained {:.1}%, unexplained {:.1}%",
            result.explained_fraction * 100.0,
            result.unexplained_fraction * 100.0
        )),
    };
    report.decompositions.push((name.to_string(), result));
    Ok(summary)
}

fn fatality_by_band_summary(
    incidents: &[IncidentAccess],
    report: &mut DisparityReport,
) -> Result<DisparitySummary, Skip> {
    let table: Vec<Vec<u64>> = fatality_by_band(incidents)
        .into_iter()
        .filter(|row| row.total > 0)
        .map(|row| vec![row.fatal, row.total - row.fatal])
        .collect();

    let result = chi_square_independence(&table)?;
    report.fatality_chi_square = Some(result);
    Ok(DisparitySummary {
        comparison_name: "time_band_x_fatal".to_string(),
        group_a_stat: None,
        group_b_stat: None,
        test_statistic: result.statistic,
        p_value: Some(result.p_value),
        effect_size: Some(result.cramers_v),
        kind: ComparisonKind::ChiSquare,
        note: low_expected_note(result.cells_below_five),
    })
}

fn fatality_logistic_summary(
    incidents: &[IncidentAccess],
    options: &LogisticOptions,
    report: &mut DisparityReport,
) -> Result<DisparitySummary, Skip> {
    let fatal: Vec<bool> = incidents.iter().map(|i| i.is_fatal).collect();
    let minutes: Vec<f64> = incidents
        .iter()
        .map(|i| i.reachability.minutes_f64())
        .collect();

    let result = logistic_regression(&fatal, &[Predictor::numeric("minutes", minutes)], options)?;
    let slope = result
        .coefficient("minutes")
        .cloned()
        .ok_or_else(|| Skip::Data("fit has no minutes coefficient".to_string()))?;
    report.fatality_logistic = Some(result);

    Ok(DisparitySummary {
        comparison_name: "fatal_odds_per_minute".to_string(),
        group_a_stat: None,
        group_b_stat: None,
        test_statistic: slope.z,
        p_value: Some(slope.p_value),
        effect_size: Some(slope.odds_ratio),
        kind: ComparisonKind::Logistic,
        note: Some(format!(
            "odds ratio 95% CI [{:.4}, {:.4}]",
            slope.ci_lower, slope.ci_upper
        )),
    })
}

fn push(report: &mut DisparityReport, name: &str, outcome: Result<DisparitySummary, Skip>) {
    match outcome {
        Ok(summary) => report.summaries.push(summary),
        Err(reason) => {
            log::warn!("Skipping comparison {name}: {reason}");
            report.skipped.push(SkippedComparison {
                comparison_name: name.to_string(),
                reason: reason.to_string(),
            });
        }
    }
}

/// Runs every comparison over the classified units and the incidents'
/// travel times.
///
/// Group A is always the highest-priority class (for class comparisons)
/// or the majority-Black units (for demographic comparisons). Units
/// missing a value needed by a comparison are left out of that
/// comparison only.
#[must_use]
pub fn analyze(
    classified: &[ClassifiedAreaUnit],
    incidents: &[IncidentAccess],
    config: &DisparityConfig,
) -> DisparityReport {
    let mut report = DisparityReport::default();
    let threshold = config.majority_threshold;
    let highest = |unit: &ClassifiedAreaUnit| Some(unit.bivariate_class.is_highest_priority());
    let majority = |unit: &ClassifiedAreaUnit| majority_black(unit, threshold);

    let class_comparisons: [(&str, Field); 3] = [
        ("pct_black_highest_priority_vs_other", |u| u.pct_black),
        ("pct_poverty_highest_priority_vs_other", |u| u.pct_poverty),
        ("median_income_highest_priority_vs_other", |u| u.median_income),
    ];
    for (name, field) in class_comparisons {
        let (a, b) = split_by(classified, highest, field);
        push(&mut report, name, t_test_summary(name, &a, &b));
    }

    let demographic_comparisons: [(&str, Field); 2] = [
        ("minutes_majority_black_vs_other", |u| Some(minutes(u))),
        ("density_majority_black_vs_other", |u| Some(u.density_metric)),
    ];
    for (name, field) in demographic_comparisons {
        let (a, b) = split_by(classified, majority, field);
        push(&mut report, name, t_test_summary(name, &a, &b));
    }

    let correlations: [(&str, Field, Field); 3] = [
        ("pct_black_vs_minutes", |u| u.pct_black, |u| Some(minutes(u))),
        ("pct_black_vs_density", |u| u.pct_black, |u| Some(u.density_metric)),
        ("pct_poverty_vs_minutes", |u| u.pct_poverty, |u| Some(minutes(u))),
    ];
    for (name, x, y) in correlations {
        push(&mut report, name, correlation_summary(name, classified, x, y));
    }

    push(
        &mut report,
        "majority_black_x_highest_priority",
        majority_by_priority(classified, threshold),
    );

    let band = fatality_by_band_summary(incidents, &mut report);
    push(&mut report, "time_band_x_fatal", band);

    let logistic = fatality_logistic_summary(incidents, &config.logistic, &mut report);
    push(&mut report, "fatal_odds_per_minute", logistic);

    let density_gap = decomposition_summary(
        "log_density_gap_majority_black",
        classified,
        threshold,
        |u| log1p_floor(u.density_metric).map_err(|e| Skip::Data(e.to_string())),
        &mut report,
    );
    push(&mut report, "log_density_gap_majority_black", density_gap);

    let minutes_gap = decomposition_summary(
        "minutes_gap_majority_black",
        classified,
        threshold,
        |u| Ok(minutes(u)),
        &mut report,
    );
    push(&mut report, "minutes_gap_majority_black", minutes_gap);

    log::info!(
        "Disparity analysis: {} comparisons computed, {} skipped",
        report.summaries.len(),
        report.skipped.len()
    );
    report
}

#[cfg(test)]
mod tests {
    use trauma_desert_area_models::{BivariateClass, Race, Reachability};

    use super::*;

    fn unit(i: u32) -> ClassifiedAreaUnit {
        let black_rank = (i * 7) % 24;
        let pct_black = f64::from(black_rank) / 24.0;
        // every fourth unit is highest priority, the rest spread over 2-8
        let class_value = if i % 4 == 0 {
            9
        } else {
            u8::try_from(i % 8).unwrap() + 1
        };
        let class = BivariateClass::new(class_value).unwrap();
        let reachability = Reachability::from(5 + black_rank / 2 + i % 3);

        ClassifiedAreaUnit {
            id: format!("{i:03}"),
            name: format!("Unit {i}"),
            area_sq_mi: 1.0,
            population: Some(1000 + i * 10),
            pct_black: Some(pct_black),
            pct_poverty: Some(0.02f64.mul_add(f64::from((i * 5) % 11), 0.1)),
            median_income: Some(1500.0f64.mul_add(f64::from((i * 3) % 13), 30_000.0)),
            incident_count: u64::from(i),
            fatal_count: 0,
            incidents_per_year: f64::from(i),
            fatality_rate: None,
            annual_per_10k: None,
            mean_victim_age: None,
            pct_male: None,
            density_metric: 0.5f64.mul_add(f64::from(i), 3.0 * pct_black) + 1.0,
            time_metric: reachability,
            time_band: reachability.band(),
            nearest_facility: Some("H1".to_string()),
            within_golden_hour: reachability.is_within(20),
            density_tercile: class.density_tercile(),
            time_tercile: class.time_tercile(),
            bivariate_class: class,
            bivariate_label: class.label(),
            priority_group: class.priority(),
        }
    }

    fn incidents() -> Vec<IncidentAccess> {
        (0..60_u32)
            .map(|j| {
                let minutes = 3 + (j * 7) % 28;
                IncidentAccess {
                    incident_id: format!("I{j}"),
                    area_id: format!("{:03}", j % 24),
                    reachability: Reachability::from(minutes),
                    is_fatal: j % 5 == 0 || (minutes > 20 && j % 3 == 0),
                    race: Race::default(),
                }
            })
            .collect()
    }

    #[test]
    fn computes_every_comparison() {
        let units: Vec<_> = (0..24).map(unit).collect();
        let report = analyze(&units, &incidents(), &DisparityConfig::default());

        assert!(report.skipped.is_empty(), "{:?}", report.skipped);
        let names: Vec<_> = report
            .summaries
            .iter()
            .map(|s| s.comparison_name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "pct_black_highest_priority_vs_other",
                "pct_poverty_highest_priority_vs_other",
                "median_income_highest_priority_vs_other",
                "minutes_majority_black_vs_other",
                "density_majority_black_vs_other",
                "pct_black_vs_minutes",
                "pct_black_vs_density",
                "pct_poverty_vs_minutes",
                "majority_black_x_highest_priority",
                "time_band_x_fatal",
                "fatal_odds_per_minute",
                "log_density_gap_majority_black",
                "minutes_gap_majority_black",
            ]
        );
        assert!(report.fatality_chi_square.is_some());
        assert!(report.fatality_logistic.is_some());
        assert_eq!(report.decompositions.len(), 2);

        for (_, decomposition) in &report.decompositions {
            assert!(
                (decomposition.explained + decomposition.unexplained - decomposition.raw_gap)
                    .abs()
                    < 1e-6
            );
            assert_eq!(decomposition.n_a + decomposition.n_b, 24);
        }
    }

    #[test]
    fn majority_black_units_wait_longer() {
        let units: Vec<_> = (0..24).map(unit).collect();
        let report = analyze(&units, &incidents(), &DisparityConfig::default());

        let minutes = report.summary("minutes_majority_black_vs_other").unwrap();
        assert!(minutes.group_a_stat.unwrap() > minutes.group_b_stat.unwrap());
        assert!(minutes.test_statistic > 0.0);

        let correlation = report.summary("pct_black_vs_minutes").unwrap();
        assert!(correlation.effect_size.unwrap() > 0.5);
    }

    #[test]
    fn priority_table_flags_low_expected_counts() {
        let units: Vec<_> = (0..24).map(unit).collect();
        let report = analyze(&units, &incidents(), &DisparityConfig::default());
        let chi = report.summary("majority_black_x_highest_priority").unwrap();
        assert_eq!(chi.group_a_stat, Some(0.25));
        assert_eq!(chi.group_b_stat, Some(0.25));
        assert!(chi.note.is_some());
    }

    #[test]
    fn small_inputs_are_skipped_not_fatal() {
        let units: Vec<_> = (0..2).map(unit).collect();
        let report = analyze(&units, &[], &DisparityConfig::default());

        assert!(report.summaries.is_empty());
        assert_eq!(report.skipped.len(), 13);
        assert!(report.fatality_logistic.is_none());
        assert!(report.decompositions.is_empty());
    }
}
