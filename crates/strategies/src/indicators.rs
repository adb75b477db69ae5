//! Rolling indicators aligned to the input: output has one value per bar and
//! bars before the first full window are `NaN`.

use sigma_core::PriceSeries;

/// Simple Moving Average
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; data.len()];
    if period == 0 || data.len() < period {
        return result;
    }

    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result[i] = sum / period as f64;
    }
    result
}

/// Rolling sample standard deviation (divides by `period - 1`).
pub fn rolling_std(data: &[f64], period: usize) -> Vec<f64> {
    let mut result = vec![f64::NAN; data.len()];
    if period < 2 || data.len() < period {
        return result;
    }

    for i in period - 1..data.len() {
        let window = &data[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance = window.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (period - 1) as f64;
        result[i] = variance.sqrt();
    }
    result
}

/// True range per bar. The first bar has no previous close, so its range is high - low.
pub fn true_range(series: &PriceSeries) -> Vec<f64> {
    let bars = series.bars();
    bars.iter()
        .enumerate()
        .map(|(i, bar)| {
            let high_low = bar.high - bar.low;
            match i.checked_sub(1).map(|p| bars[p].close) {
                Some(prev_close) => {
                    let high_close = (bar.high - prev_close).abs();
                    let low_close = (bar.low - prev_close).abs();
                    high_low.max(high_close).max(low_close)
                }
                None => high_low,
            }
        })
        .collect()
}

/// Average True Range as a plain rolling mean of the true range.
pub fn atr(series: &PriceSeries, period: usize) -> Vec<f64> {
    sma(&true_range(series), period)
}

/// Rolling z-score of each value against its trailing window.
/// `NaN` when the window is incomplete or has zero dispersion.
pub fn rolling_zscore(data: &[f64], period: usize) -> Vec<f64> {
    let means = sma(data, period);
    let stds = rolling_std(data, period);
    data.iter()
        .zip(means.iter().zip(stds.iter()))
        .map(|(x, (m, s))| {
            if s.is_nan() || *s <= 0.0 {
                f64::NAN
            } else {
                (x - m) / s
            }
        })
        .collect()
}
