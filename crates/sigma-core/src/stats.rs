/// Descriptive statistics shared by the engine and the risk modeler.

/// Compute the mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Population standard deviation (divides by n).
pub fn population_std(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let m = mean(data);
    let variance = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64;
    variance.sqrt()
}

/// Compute sample standard deviation (divides by n - 1).
pub fn sample_std(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let variance = data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    variance.sqrt()
}

/// Percentile `q` (0-100) with linear interpolation between closest ranks.
/// Returns 0.0 for empty input.
pub fn percentile(data: &[f64], q: f64) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut sorted = data.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    percentile_sorted(&sorted, q)
}

/// Same as [`percentile`] for data that is already sorted ascending.
pub fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let q = q.clamp(0.0, 100.0);
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// z-score of `value` against `data` using the sample standard deviation.
/// Returns 0.0 if data has insufficient variance.
pub fn z_score_of(value: f64, data: &[f64]) -> f64 {
    let sd = sample_std(data);
    if sd < 1e-12 {
        return 0.0;
    }
    (value - mean(data)) / sd
}

/// Population skewness. 0.0 for fewer than three points or zero variance.
pub fn skewness(data: &[f64]) -> f64 {
    standardized_moment(data, 3).unwrap_or(0.0)
}

/// Population excess kurtosis (normal = 0). 0.0 for fewer than four points or zero variance.
pub fn excess_kurtosis(data: &[f64]) -> f64 {
    if data.len() < 4 {
        return 0.0;
    }
    standardized_moment(data, 4).map_or(0.0, |k| k - 3.0)
}

fn standardized_moment(data: &[f64], order: i32) -> Option<f64> {
    if data.len() < 3 {
        return None;
    }
    let sd = population_std(data);
    if sd < 1e-12 {
        return None;
    }
    let m = mean(data);
    let moment = data.iter().map(|x| ((x - m) / sd).powi(order)).sum::<f64>() / data.len() as f64;
    Some(moment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_std_variants() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&data), 5.0);
        assert_relative_eq!(population_std(&data), 2.0);
        assert_relative_eq!(sample_std(&data), 2.138_089_935, epsilon = 1e-9);
        assert_eq!(sample_std(&[1.0]), 0.0);
    }

    #[test]
    fn test_percentile_linear_interpolation() {
        let data = [5.0, 1.0, 4.0, 2.0, 3.0];
        assert_relative_eq!(percentile(&data, 0.0), 1.0);
        assert_relative_eq!(percentile(&data, 50.0), 3.0);
        assert_relative_eq!(percentile(&data, 100.0), 5.0);
        // rank = 0.1 * 4 = 0.4
        assert_relative_eq!(percentile(&data, 10.0), 1.4, epsilon = 1e-12);
        assert_eq!(percentile(&[], 5.0), 0.0);
    }

    #[test]
    fn test_z_score_flat_data() {
        assert_eq!(z_score_of(1.0, &[1.0, 1.0, 1.0]), 0.0);
        let z = z_score_of(3.0, &[1.0, 2.0, 3.0]);
        assert_relative_eq!(z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_higher_moments() {
        // Symmetric: no skew
        assert_relative_eq!(skewness(&[1.0, 2.0, 3.0, 4.0, 5.0]), 0.0, epsilon = 1e-12);
        // Uniform-like spread is platykurtic
        assert_relative_eq!(excess_kurtosis(&[1.0, 2.0, 3.0, 4.0, 5.0]), -1.3, epsilon = 1e-12);
        // One large winner drags the skew positive
        assert!(skewness(&[-1.0, -1.0, -1.0, -1.0, 10.0]) > 1.0);
        assert_eq!(skewness(&[3.0, 3.0, 3.0]), 0.0);
        assert_eq!(excess_kurtosis(&[1.0, 2.0, 3.0]), 0.0);
    }
}
