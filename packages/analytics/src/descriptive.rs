//! Sample moments.

use trauma_desert_analytics_models::GroupStats;

use crate::{StatsError, ensure_finite};

/// Arithmetic mean, `None` for an empty sample.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample variance (`n - 1` denominator), `None` below two observations.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some(ss / (values.len() - 1) as f64)
}

/// Size, mean and sample standard deviation of a sample.
///
/// # Errors
///
/// * [`StatsError::InsufficientSample`] below two observations
/// * [`StatsError::NonFinite`] for NaN or infinite values
pub fn describe(values: &[f64], context: &str) -> Result<GroupStats, StatsError> {
    ensure_finite(values, context)?;
    let (Some(mean), Some(variance)) = (mean(values), sample_variance(values)) else {
        return Err(StatsError::InsufficientSample {
            context: context.to_string(),
            required: 2,
            actual: values.len(),
        });
    };

    Ok(GroupStats {
        n: values.len(),
        mean,
        std_dev: variance.sqrt(),
    })
}

/// Z-scores with the sample mean and standard deviation.
///
/// # Errors
///
/// * [`StatsError::InsufficientSample`] below two observations
/// * [`StatsError::ZeroVariance`] for a constant sample
pub fn standardize(values: &[f64], context: &str) -> Result<Vec<f64>, StatsError> {
    let stats = describe(values, context)?;
    if stats.std_dev <= 0.0 {
        return Err(StatsError::ZeroVariance {
            context: context.to_string(),
        });
    }
    Ok(values
        .iter()
        .map(|v| (v - stats.mean) / stats.std_dev)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moments() {
        let stats = describe(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], "x").unwrap();
        assert_eq!(stats.n, 8);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.std_dev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn small_samples_are_errors() {
        assert!(matches!(
            describe(&[1.0], "x"),
            Err(StatsError::InsufficientSample { actual: 1, .. })
        ));
        assert!(matches!(
            describe(&[1.0, f64::NAN], "x"),
            Err(StatsError::NonFinite { .. })
        ));
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn standardized_values_have_unit_variance() {
        let z = standardize(&[1.0, 2.0, 3.0, 4.0], "x").unwrap();
        assert!(mean(&z).unwrap().abs() < 1e-12);
        assert!((sample_variance(&z).unwrap() - 1.0).abs() < 1e-12);
        assert!(matches!(
            standardize(&[3.0, 3.0, 3.0], "x"),
            Err(StatsError::ZeroVariance { .. })
        ));
    }
}
