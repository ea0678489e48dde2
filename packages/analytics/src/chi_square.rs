//! Chi-square test of independence.

use statrs::distribution::{ChiSquared, ContinuousCDF};
use trauma_desert_analytics_models::ChiSquareResult;

use crate::StatsError;

/// Expected counts below this make the chi-square approximation unreliable.
pub const MIN_EXPECTED_COUNT: f64 = 5.0;

/// Tests independence of the row and column variables of `table`.
///
/// 2x2 tables get Yates' continuity correction. Low expected counts do not
/// fail the test; they are reported in the result and logged.
///
/// # Errors
///
/// [`StatsError::InvalidTable`] if the table is smaller than 2x2, ragged,
/// or has an all-zero row or column.
#[allow(clippy::cast_precision_loss)]
pub fn chi_square_independence(table: &[Vec<u64>]) -> Result<ChiSquareResult, StatsError> {
    let rows = table.len();
    let cols = table.first().map_or(0, Vec::len);

    if rows < 2 || cols < 2 {
        return Err(StatsError::InvalidTable {
            message: format!("need at least 2x2, got {rows}x{cols}"),
        });
    }
    if table.iter().any(|row| row.len() != cols) {
        return Err(StatsError::InvalidTable {
            message: "rows have different lengths".to_string(),
        });
    }

    let row_totals: Vec<u64> = table.iter().map(|row| row.iter().sum()).collect();
    let col_totals: Vec<u64> = (0..cols)
        .map(|j| table.iter().map(|row| row[j]).sum())
        .collect();
    let n: u64 = row_totals.iter().sum();

    if let Some(i) = row_totals.iter().position(|&t| t == 0) {
        return Err(StatsError::InvalidTable {
            message: format!("row {i} is all zero"),
        });
    }
    if let Some(j) = col_totals.iter().position(|&t| t == 0) {
        return Err(StatsError::InvalidTable {
            message: format!("column {j} is all zero"),
        });
    }

    let degrees_of_freedom = (rows - 1) * (cols - 1);
    let yates_corrected = degrees_of_freedom == 1;
    let total = n as f64;

    let mut statistic = 0.0;
    let mut min_expected = f64::INFINITY;
    let mut cells_below_five = 0;

    for (i, row) in table.iter().enumerate() {
        for (j, &observed) in row.iter().enumerate() {
            let expected = row_totals[i] as f64 * col_totals[j] as f64 / total;
            min_expected = min_expected.min(expected);
            if expected < MIN_EXPECTED_COUNT {
                cells_below_five += 1;
            }

            let mut deviation = (observed as f64 - expected).abs();
            if yates_corrected {
                deviation = (deviation - 0.5).max(0.0);
            }
            statistic += deviation * deviation / expected;
        }
    }

    let dist = ChiSquared::new(degrees_of_freedom as f64).map_err(|e| StatsError::Distribution {
        message: format!("{e:?}"),
    })?;
    let p_value = dist.sf(statistic);
    let min_dim = (rows.min(cols) - 1) as f64;
    let cramers_v = (statistic / (total * min_dim)).sqrt();

    let low_expected_warning = cells_below_five > 0;
    if low_expected_warning {
        log::warn!(
            "Chi-square: {cells_below_five} of {} cells have expected count < {MIN_EXPECTED_COUNT} (min {min_expected:.2}); p-value may be unreliable",
            rows * cols
        );
    }

    Ok(ChiSquareResult {
        statistic,
        degrees_of_freedom,
        p_value,
        min_expected,
        cells_below_five,
        low_expected_warning,
        yates_corrected,
        cramers_v,
        n,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_by_two_uses_yates() {
        let result = chi_square_independence(&[vec![10, 20], vec![30, 40]]).unwrap();
        assert!(result.yates_corrected);
        assert_eq!(result.degrees_of_freedom, 1);
        assert!((result.statistic - 0.446_428_571).abs() < 1e-8);
        assert!((result.p_value - 0.504_035_866).abs() < 1e-6);
        assert!((result.min_expected - 12.0).abs() < 1e-12);
        assert!(!result.low_expected_warning);
        assert!((result.cramers_v - 0.066_815_310).abs() < 1e-8);
    }

    #[test]
    fn three_by_three() {
        let table = vec![vec![30, 10, 5], vec![20, 25, 10], vec![10, 15, 25]];
        let result = chi_square_independence(&table).unwrap();
        assert!(!result.yates_corrected);
        assert_eq!(result.degrees_of_freedom, 4);
        assert!((result.statistic - 33.215_909_091).abs() < 1e-8);
        assert!((result.p_value - 1.078_861_99e-6).abs() < 1e-10);
        assert!((result.cramers_v - 0.332_745_694).abs() < 1e-8);
        assert_eq!(result.n, 150);
    }

    #[test]
    fn reports_low_expected_counts() {
        let result = chi_square_independence(&[vec![1, 9], vec![8, 2]]).unwrap();
        assert!(result.low_expected_warning);
        assert_eq!(result.cells_below_five, 2);
        assert!((result.min_expected - 4.5).abs() < 1e-12);
    }

    #[test]
    fn rejects_malformed_tables() {
        assert!(chi_square_independence(&[vec![1, 2]]).is_err());
        assert!(chi_square_independence(&[vec![1, 2], vec![3]]).is_err());
        assert!(chi_square_independence(&[vec![0, 0], vec![3, 4]]).is_err());
        assert!(chi_square_independence(&[vec![0, 5], vec![0, 4]]).is_err());
    }
}
