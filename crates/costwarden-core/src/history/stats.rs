//! Basic statistics over cost series.

/// Calculates the mean of a slice of values.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Calculates the population standard deviation of a slice of values.
pub fn std_dev_population(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert!((mean(&values) - 3.0).abs() < 0.001);
        assert_eq!(mean(&[]), 0.0);
    }

    #[test]
    fn test_std_dev_population() {
        // Population std dev of [2, 4, 4, 4, 5, 5, 7, 9] is exactly 2
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let m = mean(&values);
        assert!((std_dev_population(&values, m) - 2.0).abs() < 0.001);
    }

    #[test]
    fn test_std_dev_flat_series_is_zero() {
        let values = vec![3.0, 3.0, 3.0];
        assert_eq!(std_dev_population(&values, 3.0), 0.0);
    }
}
