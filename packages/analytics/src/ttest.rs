//! Welch's two-sample t-test.
//!
//! Unequal variances are assumed: group sizes and spreads differ a lot
//! between, e.g., the nine-unit highest-priority class and the rest of
//! the city.

use statrs::distribution::{ContinuousCDF, StudentsT};
use trauma_desert_analytics_models::TTestResult;

use crate::StatsError;
use crate::descriptive::describe;

/// Two-sided p-value of `t` under Student's t with `df` degrees of
/// freedom.
pub(crate) fn t_two_sided_p(t: f64, df: f64) -> Result<f64, StatsError> {
    let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| StatsError::Distribution {
        message: format!("{e:?}"),
    })?;
    Ok((2.0 * dist.sf(t.abs())).min(1.0))
}

/// Compares the means of two independent samples.
///
/// # Errors
///
/// * [`StatsError::InsufficientSample`] if either sample has fewer than two
///   observations
/// * [`StatsError::ZeroVariance`] if both samples are constant
/// * [`StatsError::NonFinite`] for NaN or infinite input
#[allow(clippy::cast_precision_loss)]
pub fn welch_t_test(group_a: &[f64], group_b: &[f64]) -> Result<TTestResult, StatsError> {
    let a = describe(group_a, "group A")?;
    let b = describe(group_b, "group B")?;

    let (na, nb) = (a.n as f64, b.n as f64);
    let (va, vb) = (a.std_dev.powi(2), b.std_dev.powi(2));
    let (sa, sb) = (va / na, vb / nb);
    let se2 = sa + sb;

    if se2 <= 0.0 {
        return Err(StatsError::ZeroVariance {
            context: "both groups".to_string(),
        });
    }

    let t_statistic = (a.mean - b.mean) / se2.sqrt();
    let degrees_of_freedom = se2.powi(2) / (sa.powi(2) / (na - 1.0) + sb.powi(2) / (nb - 1.0));
    let p_value = t_two_sided_p(t_statistic, degrees_of_freedom)?;
    let cohens_d = (a.mean - b.mean) / f64::midpoint(va, vb).sqrt();

    Ok(TTestResult {
        group_a: a,
        group_b: b,
        t_statistic,
        degrees_of_freedom,
        p_value,
        cohens_d,
    })
}
