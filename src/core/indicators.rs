//! Rolling technical indicators over a close series. Each output has one
//! entry per input close; entries without a full window are `None`.

use crate::core::analytics::daily_returns;
use crate::core::quote::PriceSeries;
use serde::Serialize;
use statrs::statistics::Statistics;

pub const SHORT_SMA_WINDOW: usize = 20;
pub const LONG_SMA_WINDOW: usize = 50;
pub const RSI_PERIOD: usize = 14;
pub const VOLATILITY_WINDOW: usize = 20;

pub fn sma(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; closes.len()];
    }
    (0..closes.len())
        .map(|i| {
            (i + 1 >= window)
                .then(|| closes[i + 1 - window..=i].iter().sum::<f64>() / window as f64)
        })
        .collect()
}

/// Relative strength index using simple rolling means of gains and losses.
/// A window with no losses reads 100; a window with no movement is `None`.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut output = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return output;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    for end in period..=deltas.len() {
        let window = &deltas[end - period..end];
        let gain = window.iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
        let loss = -window.iter().filter(|d| **d < 0.0).sum::<f64>() / period as f64;

        output[end] = if loss == 0.0 {
            (gain > 0.0).then_some(100.0)
        } else {
            Some(100.0 - 100.0 / (1.0 + gain / loss))
        };
    }
    output
}

/// Sample standard deviation of daily returns over a trailing window.
/// Not annualized.
pub fn rolling_volatility(closes: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut output = vec![None; closes.len()];
    if window < 2 {
        return output;
    }
    let returns = daily_returns(closes);
    for end in window..=returns.len() {
        let std_dev = returns[end - window..end].std_dev();
        output[end] = std_dev.is_finite().then_some(std_dev);
    }
    output
}

/// Latest value of each indicator for a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub sma_short: Option<f64>,
    pub sma_long: Option<f64>,
    pub rsi: Option<f64>,
    pub volatility: Option<f64>,
}

impl IndicatorSnapshot {
    pub fn latest(series: &PriceSeries) -> Self {
        let closes = series.closes();
        let last = |values: Vec<Option<f64>>| values.last().copied().flatten();
        IndicatorSnapshot {
            sma_short: last(sma(&closes, SHORT_SMA_WINDOW)),
            sma_long: last(sma(&closes, LONG_SMA_WINDOW)),
            rsi: last(rsi(&closes, RSI_PERIOD)),
            volatility: last(rolling_volatility(&closes, VOLATILITY_WINDOW)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::quote::Horizon;
    use chrono::NaiveDate;

    #[test]
    fn test_sma() {
        let values = sma(&[1.0, 2.0, 3.0, 4.0], 2);
        assert_eq!(values, vec![None, Some(1.5), Some(2.5), Some(3.5)]);
        assert_eq!(sma(&[1.0], 3), vec![None]);
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (1..=20).map(|v| v as f64).collect();
        let values = rsi(&rising, 14);
        assert!(values[13].is_none());
        assert_eq!(values[14], Some(100.0));

        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        assert_eq!(rsi(&falling, 14)[19], Some(0.0));

        assert_eq!(rsi(&vec![10.0; 20], 14)[19], None);
    }

    #[test]
    fn test_rsi_mixed_moves() {
        // gains 2, losses 1 over a period of 2 -> rs = 2
        let values = rsi(&[10.0, 12.0, 11.0], 2);
        let expected = 100.0 - 100.0 / 3.0;
        assert!((values[2].unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_rolling_volatility() {
        let flat = rolling_volatility(&vec![10.0; 25], 20);
        assert!(flat[19].is_none());
        assert_eq!(flat[20], Some(0.0));

        let zigzag: Vec<f64> = (0..25).map(|i| if i % 2 == 0 { 100.0 } else { 110.0 }).collect();
        assert!(rolling_volatility(&zigzag, 20)[24].unwrap() > 0.0);
    }

    #[test]
    fn test_snapshot_of_short_series() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let series = PriceSeries::new(
            "AAPL",
            Horizon::SixMonths,
            (0..30).map(|i| (start + chrono::Duration::days(i), 100.0 + i as f64)),
        );
        let snapshot = IndicatorSnapshot::latest(&series);
        assert!((snapshot.sma_short.unwrap() - 119.5).abs() < 1e-9);
        assert!(snapshot.sma_long.is_none());
        assert_eq!(snapshot.rsi, Some(100.0));
        assert!(snapshot.volatility.is_some());
    }
}
