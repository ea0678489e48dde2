//! Pearson correlation with pairwise exclusion of missing values.

use trauma_desert_analytics_models::CorrelationResult;

use crate::StatsError;
use crate::ttest::t_two_sided_p;

/// Correlates two equal-length sequences.
///
/// Pairs where either side is `None` or non-finite are excluded and
/// counted in [`CorrelationResult::excluded`].
///
/// # Errors
///
/// * [`StatsError::LengthMismatch`] if the sequences differ in length
/// * [`StatsError::InsufficientSample`] with fewer than three complete pairs
/// * [`StatsError::ZeroVariance`] if either side is constant
#[allow(clippy::cast_precision_loss)]
pub fn pearson(x: &[Option<f64>], y: &[Option<f64>]) -> Result<CorrelationResult, StatsError> {
    if x.len() != y.len() {
        return Err(StatsError::LengthMismatch {
            left: x.len(),
            right: y.len(),
        });
    }

    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter_map(|(a, b)| match (a, b) {
            (Some(a), Some(b)) if a.is_finite() && b.is_finite() => Some((*a, *b)),
            _ => None,
        })
        .collect();
    let excluded = x.len() - pairs.len();
    let n = pairs.len();

    if n < 3 {
        return Err(StatsError::InsufficientSample {
            context: "correlation pairs".to_string(),
            required: 3,
            actual: n,
        });
    }

    let nf = n as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / nf;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / nf;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in &pairs {
        let (dx, dy) = (a - mean_x, b - mean_y);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx <= 0.0 || syy <= 0.0 {
        return Err(StatsError::ZeroVariance {
            context: if sxx <= 0.0 { "x" } else { "y" }.to_string(),
        });
    }

    let r = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    let df = nf - 2.0;
    let p_value = if r.abs() >= 1.0 {
        0.0
    } else {
        t_two_sided_p(r * (df / (1.0 - r * r)).sqrt(), df)?
    };

    if excluded > 0 {
        log::info!("Correlation excluded {excluded} incomplete pairs ({n} used)");
    }

    Ok(CorrelationResult {
        r,
        p_value,
        n,
        excluded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn matches_reference_values() {
        let result = pearson(
            &some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            &some(&[2.0, 1.0, 4.0, 3.0, 7.0, 5.0]),
        )
        .unwrap();
        assert!((result.r - 0.791_794_655).abs() < 1e-8);
        assert!((result.p_value - 0.060_511_403).abs() < 1e-6);
        assert_eq!(result.excluded, 0);
    }

    #[test]
    fn excludes_missing_pairs() {
        let mut x = some(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut y = some(&[2.0, 1.0, 4.0, 3.0, 7.0, 5.0]);
        x.push(None);
        y.push(Some(100.0));
        x.push(Some(100.0));
        y.push(Some(f64::NAN));

        let result = pearson(&x, &y).unwrap();
        assert_eq!(result.n, 6);
        assert_eq!(result.excluded, 2);
        assert!((result.r - 0.791_794_655).abs() < 1e-8);
    }

    #[test]
    fn perfect_correlation() {
        let result = pearson(&some(&[1.0, 2.0, 3.0]), &some(&[2.0, 4.0, 6.0])).unwrap();
        assert!((result.r - 1.0).abs() < 1e-12);
        assert!(result.p_value.abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_invalid_inputs() {
        assert!(matches!(
            pearson(&some(&[1.0, 2.0]), &some(&[1.0])),
            Err(StatsError::LengthMismatch { .. })
        ));
        assert!(matches!(
            pearson(&some(&[1.0, 2.0]), &some(&[1.0, 3.0])),
            Err(StatsError::InsufficientSample { .. })
        ));
        assert!(matches!(
            pearson(&some(&[1.0, 1.0, 1.0]), &some(&[1.0, 2.0, 3.0])),
            Err(StatsError::ZeroVariance { .. })
        ));
    }
}
