#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Result types of the disparity statistics.
//!
//! Each statistical operation returns its own typed record. Named
//! comparisons are flattened into [`DisparitySummary`] rows for tabular
//! output.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Sample size, mean and sample standard deviation of one group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupStats {
    /// Observations.
    pub n: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation (`n - 1` denominator).
    pub std_dev: f64,
}

/// Welch's unequal-variance two-sample t-test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TTestResult {
    /// First sample.
    pub group_a: GroupStats,
    /// Second sample.
    pub group_b: GroupStats,
    /// `(mean_a - mean_b) / sqrt(var_a/n_a + var_b/n_b)`.
    pub t_statistic: f64,
    /// Welch-Satterthwaite degrees of freedom.
    pub degrees_of_freedom: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Cohen's d with the average-variance denominator.
    pub cohens_d: f64,
}

/// Pearson product-moment correlation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    /// Correlation coefficient.
    pub r: f64,
    /// Two-sided p-value from the t distribution with `n - 2` df.
    pub p_value: f64,
    /// Complete pairs used.
    pub n: usize,
    /// Pairs dropped because either side was missing.
    pub excluded: usize,
}

/// Chi-square test of independence over a contingency table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChiSquareResult {
    /// Test statistic.
    pub statistic: f64,
    /// `(rows - 1) * (cols - 1)`.
    pub degrees_of_freedom: usize,
    /// Upper-tail p-value.
    pub p_value: f64,
    /// Smallest expected cell count.
    pub min_expected: f64,
    /// Cells with an expected count below five.
    pub cells_below_five: usize,
    /// Whether `cells_below_five > 0`; the p-value is then unreliable.
    pub low_expected_warning: bool,
    /// Whether Yates' continuity correction was applied (2x2 tables).
    pub yates_corrected: bool,
    /// Cramér's V effect size.
    pub cramers_v: f64,
    /// Total observations.
    pub n: u64,
}

/// One coefficient of a fitted logistic regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticCoefficient {
    /// Predictor (or dummy column) name; `const` for the intercept.
    pub predictor: String,
    /// Log-odds coefficient.
    pub coefficient: f64,
    /// Standard error from the inverse information matrix.
    pub std_error: f64,
    /// Wald z statistic.
    pub z: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// `exp(coefficient)`.
    pub odds_ratio: f64,
    /// Lower bound of the 95% odds-ratio interval.
    pub ci_lower: f64,
    /// Upper bound of the 95% odds-ratio interval.
    pub ci_upper: f64,
}

/// A converged logistic regression fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticResult {
    /// Intercept first, then predictors in design order.
    pub coefficients: Vec<LogisticCoefficient>,
    /// Newton-Raphson iterations used.
    pub iterations: usize,
    /// Log-likelihood at the solution.
    pub log_likelihood: f64,
    /// Observations.
    pub n: usize,
}

impl LogisticResult {
    /// Looks up a coefficient by predictor name.
    #[must_use]
    pub fn coefficient(&self, predictor: &str) -> Option<&LogisticCoefficient> {
        self.coefficients.iter().find(|c| c.predictor == predictor)
    }
}

/// An ordinary least squares fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OlsResult {
    /// Column names, `const` first.
    pub predictors: Vec<String>,
    /// Coefficients aligned with `predictors`.
    pub coefficients: Vec<f64>,
    /// Coefficient of determination, zero for a constant outcome.
    pub r_squared: f64,
    /// Observations.
    pub n: usize,
}

/// Contribution of one predictor to the explained part of a gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorContribution {
    /// Predictor name.
    pub predictor: String,
    /// `(mean_a - mean_b) * pooled_coefficient`.
    pub contribution: f64,
    /// `contribution / raw_gap`.
    pub fraction_of_gap: f64,
}

/// Two-group Oaxaca-Blinder decomposition of a mean gap.
///
/// `explained + unexplained == raw_gap` and
/// `endowments + coefficients + interaction == raw_gap`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OaxacaResult {
    /// Observations in group A.
    pub n_a: usize,
    /// Observations in group B.
    pub n_b: usize,
    /// Mean outcome of group A.
    pub mean_a: f64,
    /// Mean outcome of group B.
    pub mean_b: f64,
    /// `mean_a - mean_b`.
    pub raw_gap: f64,
    /// Covariate differences weighted by pooled coefficients.
    pub explained: f64,
    /// Coefficient differences relative to the pooled model.
    pub unexplained: f64,
    /// `explained / raw_gap`.
    pub explained_fraction: f64,
    /// `unexplained / raw_gap`.
    pub unexplained_fraction: f64,
    /// Threefold: covariate differences at group B coefficients.
    pub endowments: f64,
    /// Threefold: coefficient differences at group B covariates.
    pub coefficients: f64,
    /// Threefold: joint covariate and coefficient differences.
    pub interaction: f64,
    /// Per-predictor split of `explained` (intercept excluded).
    pub contributions: Vec<PredictorContribution>,
    /// R-squared of the group A model.
    pub r_squared_a: f64,
    /// R-squared of the group B model.
    pub r_squared_b: f64,
}

/// The statistical procedure behind a [`DisparitySummary`] row.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ComparisonKind {
    /// Welch t-test; effect size is Cohen's d.
    WelchTTest,
    /// Pearson correlation; effect size is r.
    Pearson,
    /// Chi-square independence; effect size is Cramér's V.
    ChiSquare,
    /// Logistic regression; effect size is the odds ratio.
    Logistic,
    /// Oaxaca-Blinder; test statistic is the raw gap, effect size the
    /// unexplained fraction.
    OaxacaBlinder,
}

/// One named statistical comparison, flattened for tabular output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisparitySummary {
    /// Stable comparison name.
    pub comparison_name: String,
    /// Group A statistic (usually a mean).
    pub group_a_stat: Option<f64>,
    /// Group B statistic (usually a mean).
    pub group_b_stat: Option<f64>,
    /// Test statistic.
    pub test_statistic: f64,
    /// p-value, when the procedure yields one.
    pub p_value: Option<f64>,
    /// Effect size, see [`ComparisonKind`].
    pub effect_size: Option<f64>,
    /// Procedure used.
    pub kind: ComparisonKind,
    /// Caveat attached to the result (e.g. low expected counts).
    pub note: Option<String>,
}

/// A comparison that could not be computed, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedComparison {
    /// Comparison name.
    pub comparison_name: String,
    /// Why it was skipped.
    pub reason: String,
}

/// All comparisons of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisparityReport {
    /// Computed comparisons in a fixed order.
    pub summaries: Vec<DisparitySummary>,
    /// Comparisons skipped for statistical-validity reasons.
    pub skipped: Vec<SkippedComparison>,
    /// Full chi-square result for band x fatal outcome, when computed.
    pub fatality_chi_square: Option<ChiSquareResult>,
    /// Full logistic fit of fatal outcome on minutes, when computed.
    pub fatality_logistic: Option<LogisticResult>,
    /// Full decompositions keyed by comparison name.
    pub decompositions: Vec<(String, OaxacaResult)>,
}

impl DisparityReport {
    /// Looks up a summary row by name.
    #[must_use]
    pub fn summary(&self, comparison_name: &str) -> Option<&DisparitySummary> {
        self.summaries
            .iter()
            .find(|s| s.comparison_name == comparison_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_serializes_stable_columns() {
        let summary = DisparitySummary {
            comparison_name: "pct_black_highest_priority_vs_other".to_string(),
            kind: ComparisonKind::WelchTTest,
            group_a_stat: Some(0.8),
            group_b_stat: Some(0.4),
            test_statistic: 3.2,
            p_value: Some(0.002),
            effect_size: Some(1.1),
            note: None,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["kind"], "welch-t-test");
        assert_eq!(json["comparison_name"], "pct_black_highest_priority_vs_other");
        assert!(json["note"].is_null());
    }

    #[test]
    fn report_lookup_by_name() {
        let report = DisparityReport {
            summaries: vec![DisparitySummary {
                comparison_name: "a".to_string(),
                kind: ComparisonKind::Pearson,
                group_a_stat: None,
                group_b_stat: None,
                test_statistic: 0.5,
                p_value: Some(0.1),
                effect_size: Some(0.5),
                note: None,
            }],
            ..DisparityReport::default()
        };
        assert!(report.summary("a").is_some());
        assert!(report.summary("b").is_none());
    }
}
