//! Ordinary least squares and logistic regression.
//!
//! Both fits add an intercept column named `const`. Categorical
//! predictors are expanded into dummy columns named `name[level]`, with
//! the alphabetically first level as the reference.

use std::collections::BTreeSet;

use nalgebra::{DMatrix, DVector};
use statrs::distribution::{ContinuousCDF, Normal};
use trauma_desert_analytics_models::{LogisticCoefficient, LogisticResult, OlsResult};

use crate::StatsError;

/// Two-sided 97.5% standard normal quantile.
const Z_975: f64 = 1.959_963_984_540_054;

/// Name of the intercept column.
pub const INTERCEPT: &str = "const";

/// Observed values of one predictor.
#[derive(Debug, Clone, PartialEq)]
pub enum PredictorValues {
    /// A continuous predictor.
    Numeric(Vec<f64>),
    /// A categorical predictor, expanded into dummies.
    Categorical(Vec<String>),
}

impl PredictorValues {
    const fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Categorical(v) => v.len(),
        }
    }
}

/// A named predictor column.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictor {
    /// Column name.
    pub name: String,
    /// One value per observation.
    pub values: PredictorValues,
}

impl Predictor {
    /// A continuous predictor.
    #[must_use]
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values: PredictorValues::Numeric(values),
        }
    }

    /// A categorical predictor.
    #[must_use]
    pub fn categorical(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values: PredictorValues::Categorical(values),
        }
    }
}

/// Stopping rule for the Newton-Raphson solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogisticOptions {
    /// Iterations before giving up.
    pub max_iterations: usize,
    /// Converged once every coefficient moves less than this.
    pub tolerance: f64,
}

impl Default for LogisticOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            tolerance: 1e-8,
        }
    }
}

/// Builds the design matrix (intercept first) and its column names.
fn design(n: usize, predictors: &[Predictor]) -> Result<(DMatrix<f64>, Vec<String>), StatsError> {
    let mut columns: Vec<Vec<f64>> = vec![vec![1.0; n]];
    let mut names = vec![INTERCEPT.to_string()];

    for predictor in predictors {
        if predictor.values.len() != n {
            return Err(StatsError::LengthMismatch {
                left: n,
                right: predictor.values.len(),
            });
        }
        match &predictor.values {
            PredictorValues::Numeric(values) => {
                crate::ensure_finite(values, &predictor.name)?;
                columns.push(values.clone());
                names.push(predictor.name.clone());
            }
            PredictorValues::Categorical(values) => {
                let levels: BTreeSet<&str> = values.iter().map(String::as_str).collect();
                for level in levels.iter().skip(1) {
                    columns.push(
                        values
                            .iter()
                            .map(|v| if v == level { 1.0 } else { 0.0 })
                            .collect(),
                    );
                    names.push(format!("{}[{level}]", predictor.name));
                }
            }
        }
    }

    let p = columns.len();
    if n <= p {
        return Err(StatsError::InsufficientSample {
            context: "regression design".to_string(),
            required: p + 1,
            actual: n,
        });
    }

    Ok((DMatrix::from_fn(n, p, |i, j| columns[j][i]), names))
}

fn solve_normal(
    lhs: DMatrix<f64>,
    rhs: &DVector<f64>,
    context: &str,
) -> Result<DVector<f64>, StatsError> {
    lhs.cholesky()
        .map(|chol| chol.solve(rhs))
        .ok_or_else(|| StatsError::SingularMatrix {
            context: context.to_string(),
        })
}

/// Fits `y ~ const + predictors` by least squares.
///
/// # Errors
///
/// * [`StatsError::LengthMismatch`] if a predictor's length differs from `y`
/// * [`StatsError::InsufficientSample`] unless `n` exceeds the column count
/// * [`StatsError::SingularMatrix`] for collinear predictors
///
/// A constant outcome still fits, with an `r_squared` of zero.
pub fn ols(y: &[f64], predictors: &[Predictor]) -> Result<OlsResult, StatsError> {
    crate::ensure_finite(y, "outcome")?;
    let (x, names) = design(y.len(), predictors)?;
    let y_vec = DVector::from_column_slice(y);

    let xt = x.transpose();
    let beta = solve_normal(&xt * &x, &(&xt * &y_vec), "least squares")?;

    let fitted = &x * &beta;
    let mean_y = y_vec.mean();
    let ss_res: f64 = y_vec.iter().zip(fitted.iter()).map(|(o, f)| (o - f).powi(2)).sum();
    let ss_tot: f64 = y_vec.iter().map(|o| (o - mean_y).powi(2)).sum();
    // A constant outcome has nothing to explain.
    let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 };

    Ok(OlsResult {
        predictors: names,
        coefficients: beta.iter().copied().collect(),
        r_squared,
        n: y.len(),
    })
}

fn sigmoid(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

/// Probabilities and the information matrix `X' W X` at `beta`.
fn information(x: &DMatrix<f64>, beta: &DVector<f64>) -> (DVector<f64>, DMatrix<f64>) {
    let probs = (x * beta).map(sigmoid);
    let weighted = DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| {
        probs[i] * (1.0 - probs[i]) * x[(i, j)]
    });
    (probs, x.transpose() * weighted)
}

/// Fits `logit(P(y)) ~ const + predictors` by Newton-Raphson.
///
/// Never returns unconverged coefficients.
///
/// # Errors
///
/// * [`StatsError::ZeroVariance`] if every outcome is equal
/// * [`StatsError::SingularMatrix`] if the information matrix is singular
/// * [`StatsError::NonConvergence`] if the step never falls below
///   `options.tolerance` (e.g. under complete separation)
/// * the design errors of [`ols`]
#[allow(clippy::cast_precision_loss)]
pub fn logistic_regression(
    y: &[bool],
    predictors: &[Predictor],
    options: &LogisticOptions,
) -> Result<LogisticResult, StatsError> {
    let (x, names) = design(y.len(), predictors)?;
    if y.iter().all(|&v| v) || y.iter().all(|&v| !v) {
        return Err(StatsError::ZeroVariance {
            context: "binary outcome".to_string(),
        });
    }
    let y_vec = DVector::from_iterator(y.len(), y.iter().map(|&v| if v { 1.0 } else { 0.0 }));

    let mut beta = DVector::zeros(x.ncols());
    let mut converged_after = None;
    let mut last_step = f64::INFINITY;

    for iteration in 1..=options.max_iterations {
        let (probs, info) = information(&x, &beta);
        let gradient = x.transpose() * (&y_vec - &probs);
        let step = solve_normal(info, &gradient, "logistic information matrix")?;

        beta += &step;
        last_step = step.amax();
        if !last_step.is_finite() {
            break;
        }
        if last_step < options.tolerance {
            converged_after = Some(iteration);
            break;
        }
    }

    let Some(iterations) = converged_after else {
        return Err(StatsError::NonConvergence {
            iterations: options.max_iterations,
            last_step,
        });
    };

    let (probs, info) = information(&x, &beta);
    let covariance = info
        .cholesky()
        .map(|chol| chol.inverse())
        .ok_or_else(|| StatsError::SingularMatrix {
            context: "logistic covariance".to_string(),
        })?;

    let log_likelihood: f64 = y_vec
        .iter()
        .zip(probs.iter())
        .map(|(o, p)| o.mul_add(p.ln(), (1.0 - o) * (1.0 - p).ln()))
        .sum();

    let normal = Normal::new(0.0, 1.0).map_err(|e| StatsError::Distribution {
        message: format!("{e:?}"),
    })?;

    let coefficients = names
        .into_iter()
        .enumerate()
        .map(|(j, predictor)| {
            let coefficient = beta[j];
            let std_error = covariance[(j, j)].sqrt();
            let z = coefficient / std_error;
            LogisticCoefficient {
                predictor,
                coefficient,
                std_error,
                z,
                p_value: (2.0 * normal.sf(z.abs())).min(1.0),
                odds_ratio: coefficient.exp(),
                ci_lower: Z_975.mul_add(-std_error, coefficient).exp(),
                ci_upper: Z_975.mul_add(std_error, coefficient).exp(),
            }
        })
        .collect();

    log::info!(
        "Logistic regression converged after {iterations} iterations (n = {}, log-likelihood {log_likelihood:.3})",
        y.len()
    );

    Ok(LogisticResult {
        coefficients,
        iterations,
        log_likelihood,
        n: y.len(),
    })
}
