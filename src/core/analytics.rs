//! Return and risk metrics over daily close series.
//!
//! All functions are pure. Volatility-style figures use the sample standard
//! deviation of daily simple returns and annualize over 252 trading days.

use crate::core::error::{MarketError, MarketResult};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_finprim::rate::cagr;
use serde::Serialize;
use statrs::statistics::Statistics;
use std::cmp::Ordering;
use tracing::debug;

pub const TRADING_DAYS: f64 = 252.0;

/// Simple returns between consecutive values: `v[i] / v[i-1] - 1`.
pub fn daily_returns(values: &[f64]) -> Vec<f64> {
    values.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
}

/// Total growth from the first to the last value, as a fraction.
pub fn cumulative_return(values: &[f64]) -> MarketResult<f64> {
    match (values.first(), values.last()) {
        (Some(first), Some(last)) if values.len() >= 2 && *first > 0.0 => Ok(last / first - 1.0),
        _ => Err(MarketError::InsufficientData(format!(
            "cumulative return needs at least 2 points, got {}",
            values.len()
        ))),
    }
}

/// Running `v[i] / v[0] - 1` for every point.
pub fn cumulative_return_series(values: &[f64]) -> Vec<f64> {
    match values.first() {
        Some(first) if *first > 0.0 => values.iter().map(|v| v / first - 1.0).collect(),
        _ => Vec::new(),
    }
}

fn sample_std_dev(returns: &[f64]) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let std_dev = returns.std_dev();
    if std_dev.is_finite() { std_dev } else { 0.0 }
}

fn mean(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.mean()
}

pub fn annualized_return(returns: &[f64]) -> f64 {
    mean(returns) * TRADING_DAYS
}

pub fn annualized_volatility(returns: &[f64]) -> f64 {
    sample_std_dev(returns) * TRADING_DAYS.sqrt()
}

/// Annualized Sharpe ratio from daily returns. Zero when returns do not vary.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    let std_dev = sample_std_dev(returns);
    if std_dev <= f64::EPSILON {
        return 0.0;
    }
    (mean(returns) - risk_free_rate / TRADING_DAYS) / std_dev * TRADING_DAYS.sqrt()
}

/// Largest peak-to-trough decline of `values`, as a positive fraction.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &value in values {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst
}

/// `cov(asset, benchmark) / var(benchmark)`, zero when the benchmark is flat.
pub fn beta(asset_returns: &[f64], benchmark_returns: &[f64]) -> f64 {
    let n = asset_returns.len().min(benchmark_returns.len());
    if n < 2 {
        return 0.0;
    }
    let (asset, bench) = (&asset_returns[..n], &benchmark_returns[..n]);
    let variance = bench.variance();
    if !variance.is_finite() || variance <= f64::EPSILON {
        return 0.0;
    }
    let covariance = asset.covariance(bench);
    if covariance.is_finite() {
        covariance / variance
    } else {
        0.0
    }
}

/// Pearson correlation, zero when either side is flat.
pub fn correlation(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    if n < 2 {
        return 0.0;
    }
    let (a, b) = (&a[..n], &b[..n]);
    let denominator = sample_std_dev(a) * sample_std_dev(b);
    if denominator <= f64::EPSILON {
        return 0.0;
    }
    let covariance = a.covariance(b);
    if covariance.is_finite() {
        (covariance / denominator).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Compound annual growth between two values `days` apart, as a fraction.
pub fn compound_annual_growth(begin: f64, end: f64, days: i64) -> Option<f64> {
    if begin <= 0.0 || end <= 0.0 || days <= 0 {
        return None;
    }
    let years = days as f64 / 365.0;
    let begin_bal = Decimal::from_f64(begin)?;
    let end_bal = Decimal::from_f64(end)?;
    let n_years = Decimal::from_f64(years)?;
    if n_years.is_zero() {
        return None;
    }
    let rate = cagr(begin_bal, end_bal, n_years);
    debug!("cagr: {begin_bal}, {end_bal}, {n_years} = {rate}");
    rate.to_f64()
}

/// Inner join of two date-sorted series on date. Returns the shared dates with
/// the matching values from each side.
pub fn align_by_date(
    left: &[(NaiveDate, f64)],
    right: &[(NaiveDate, f64)],
) -> Vec<(NaiveDate, f64, f64)> {
    let mut aligned = Vec::with_capacity(left.len().min(right.len()));
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        match left[i].0.cmp(&right[j].0) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                aligned.push((left[i].0, left[i].1, right[j].1));
                i += 1;
                j += 1;
            }
        }
    }
    aligned
}

/// Summary metrics of one value series. Fractions throughout.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSet {
    pub cumulative_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub cagr: Option<f64>,
}

impl MetricSet {
    /// Metrics of a dated value series. Needs at least two points.
    pub fn from_values(
        dates: &[NaiveDate],
        values: &[f64],
        risk_free_rate: f64,
    ) -> MarketResult<Self> {
        let cumulative = cumulative_return(values)?;
        let returns = daily_returns(values);
        let days = match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => (*last - *first).num_days(),
            _ => 0,
        };
        let (begin, end) = (values[0], values[values.len() - 1]);

        Ok(MetricSet {
            cumulative_return: cumulative,
            annualized_return: annualized_return(&returns),
            annualized_volatility: annualized_volatility(&returns),
            sharpe_ratio: sharpe_ratio(&returns, risk_free_rate),
            max_drawdown: max_drawdown(values),
            cagr: compound_annual_growth(begin, end, days),
        })
    }
}
