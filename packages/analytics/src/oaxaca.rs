//! Two-group Oaxaca-Blinder decomposition of a mean-outcome gap.
//!
//! The twofold split weights covariate differences by the pooled
//! (both-groups) coefficients. The threefold split uses group B as the
//! reference. Both sum exactly to the raw gap because every OLS fit
//! includes an intercept and therefore passes through the group means.

use trauma_desert_analytics_models::{OaxacaResult, PredictorContribution};

use crate::StatsError;
use crate::descriptive::mean;
use crate::regression::{Predictor, ols};

/// Gaps smaller than this make the fractions meaningless.
const MIN_GAP: f64 = 1e-12;

/// One observation: an outcome and its covariates in a fixed order.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Outcome (already transformed, e.g. `ln(1 + density)`).
    pub outcome: f64,
    /// Covariate values aligned with the predictor names.
    pub covariates: Vec<f64>,
}

/// Covariate means with a leading 1 for the intercept.
fn design_means(observations: &[Observation], k: usize) -> Vec<f64> {
    let mut means = vec![1.0];
    means.extend((0..k).map(|j| {
        let column: Vec<f64> = observations.iter().map(|o| o.covariates[j]).collect();
        mean(&column).unwrap_or(0.0)
    }));
    means
}

fn fit(names: &[String], observations: &[Observation]) -> Result<(Vec<f64>, f64), StatsError> {
    let y: Vec<f64> = observations.iter().map(|o| o.outcome).collect();
    let predictors: Vec<Predictor> = names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            Predictor::numeric(
                name.clone(),
                observations.iter().map(|o| o.covariates[j]).collect(),
            )
        })
        .collect();
    let result = ols(&y, &predictors)?;
    Ok((result.coefficients, result.r_squared))
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn check_group(
    label: &str,
    observations: &[Observation],
    k: usize,
) -> Result<(), StatsError> {
    if observations.len() < k + 2 {
        return Err(StatsError::InsufficientSample {
            context: format!("decomposition group {label}"),
            required: k + 2,
            actual: observations.len(),
        });
    }
    if let Some(bad) = observations.iter().find(|o| o.covariates.len() != k) {
        return Err(StatsError::LengthMismatch {
            left: k,
            right: bad.covariates.len(),
        });
    }
    Ok(())
}

/// Decomposes `mean(A) - mean(B)`.
///
/// # Errors
///
/// * [`StatsError::InsufficientSample`] if a group cannot support its own
///   regression (`n < predictors + 2`)
/// * [`StatsError::LengthMismatch`] if an observation has the wrong
///   number of covariates
/// * [`StatsError::ZeroGap`] if the group means coincide
/// * [`StatsError::SingularMatrix`] for a collinear design within a group
pub fn oaxaca_blinder(
    names: &[String],
    group_a: &[Observation],
    group_b: &[Observation],
) -> Result<OaxacaResult, StatsError> {
    let k = names.len();
    check_group("A", group_a, k)?;
    check_group("B", group_b, k)?;

    let outcomes = |group: &[Observation]| group.iter().map(|o| o.outcome).collect::<Vec<_>>();
    let mean_a = mean(&outcomes(group_a)).unwrap_or(0.0);
    let mean_b = mean(&outcomes(group_b)).unwrap_or(0.0);
    let raw_gap = mean_a - mean_b;
    if raw_gap.abs() < MIN_GAP {
        return Err(StatsError::ZeroGap { raw_gap });
    }

    let (beta_a, r_squared_a) = fit(names, group_a)?;
    let (beta_b, r_squared_b) = fit(names, group_b)?;
    let pooled: Vec<Observation> = group_a.iter().chain(group_b).cloned().collect();
    let (beta_pooled, _) = fit(names, &pooled)?;

    let x_a = design_means(group_a, k);
    let x_b = design_means(group_b, k);
    let x_diff: Vec<f64> = x_a.iter().zip(&x_b).map(|(a, b)| a - b).collect();
    let beta_diff: Vec<f64> = beta_a.iter().zip(&beta_b).map(|(a, b)| a - b).collect();

    let explained = dot(&x_diff, &beta_pooled);
    let a_vs_pooled: Vec<f64> = beta_a.iter().zip(&beta_pooled).map(|(a, p)| a - p).collect();
    let pooled_vs_b: Vec<f64> = beta_pooled.iter().zip(&beta_b).map(|(p, b)| p - b).collect();
    let unexplained = dot(&x_a, &a_vs_pooled) + dot(&x_b, &pooled_vs_b);

    let endowments = dot(&x_diff, &beta_b);
    let coefficients = dot(&x_b, &beta_diff);
    let interaction = dot(&x_diff, &beta_diff);

    let contributions = names
        .iter()
        .enumerate()
        .map(|(j, name)| {
            let contribution = x_diff[j + 1] * beta_pooled[j + 1];
            PredictorContribution {
                predictor: name.clone(),
                contribution,
                fraction_of_gap: contribution / raw_gap,
            }
        })
        .collect();

    log::info!(
        "Oaxaca-Blinder: gap {raw_gap:.4} = explained {explained:.4} + unexplained {unexplained:.4} (n_a = {}, n_b = {})",
        group_a.len(),
        group_b.len()
    );

    Ok(OaxacaResult {
        n_a: group_a.len(),
        n_b: group_b.len(),
        mean_a,
        mean_b,
        raw_gap,
        explained,
        unexplained,
        explained_fraction: explained / raw_gap,
        unexplained_fraction: unexplained / raw_gap,
        endowments,
        coefficients,
        interaction,
        contributions,
        r_squared_a,
        r_squared_b,
    })
}
