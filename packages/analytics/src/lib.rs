#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Statistical engine for disparity analysis.
//!
//! Each public function is a pure computation over plain samples and
//! returns a typed record from `trauma_desert_analytics_models`. Invalid
//! input (too few observations, zero variance, singular designs,
//! non-convergence) is always an explicit [`StatsError`] rather than a NaN
//! carried downstream. The [`disparity`] module composes these operations
//! into the named comparisons of one run.

pub mod chi_square;
pub mod correlation;
pub mod descriptive;
pub mod disparity;
pub mod oaxaca;
pub mod regression;
pub mod ttest;

use thiserror::Error;

pub use chi_square::chi_square_independence;
pub use correlation::pearson;
pub use descriptive::describe;
pub use disparity::{DisparityConfig, analyze};
pub use oaxaca::{Observation, oaxaca_blinder};
pub use regression::{LogisticOptions, Predictor, PredictorValues, logistic_regression, ols};
pub use ttest::welch_t_test;

/// Errors that can occur during statistical operations.
#[derive(Debug, Error)]
pub enum StatsError {
    /// Too few observations for the requested procedure.
    #[error("Insufficient sample for {context}: need at least {required}, got {actual}")]
    InsufficientSample {
        /// Which sample or group.
        context: String,
        /// Minimum observations.
        required: usize,
        /// Observations provided.
        actual: usize,
    },

    /// A sample has no variance, so the statistic is undefined.
    #[error("Zero variance in {context}")]
    ZeroVariance {
        /// Which sample or variable.
        context: String,
    },

    /// Paired inputs differ in length.
    #[error("Length mismatch: {left} vs {right}")]
    LengthMismatch {
        /// Length of the first input.
        left: usize,
        /// Length of the second input.
        right: usize,
    },

    /// A value is NaN or infinite.
    #[error("Non-finite value in {context}")]
    NonFinite {
        /// Which input.
        context: String,
    },

    /// The contingency table is malformed.
    #[error("Invalid contingency table: {message}")]
    InvalidTable {
        /// What is wrong with it.
        message: String,
    },

    /// The design matrix or information matrix cannot be inverted.
    #[error("Singular matrix in {context}")]
    SingularMatrix {
        /// Which fit.
        context: String,
    },

    /// Newton-Raphson did not converge.
    #[error("Logistic regression did not converge after {iterations} iterations (last step {last_step:e})")]
    NonConvergence {
        /// Iterations performed.
        iterations: usize,
        /// Largest coefficient change in the final iteration.
        last_step: f64,
    },

    /// The decomposed gap is zero, so fractions are undefined.
    #[error("Group means are equal (gap {raw_gap:e}); fractions are undefined")]
    ZeroGap {
        /// The near-zero gap.
        raw_gap: f64,
    },

    /// A reference distribution could not be constructed.
    #[error("Distribution error: {message}")]
    Distribution {
        /// Description of what went wrong.
        message: String,
    },
}

pub(crate) fn ensure_finite(values: &[f64], context: &str) -> Result<(), StatsError> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(StatsError::NonFinite {
            context: context.to_string(),
        })
    }
}
