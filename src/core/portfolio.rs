//! Portfolio definitions and the simulator that turns holdings into a value
//! series, risk metrics and a benchmark comparison.

use crate::core::analytics::{self, MetricSet};
use crate::core::config::AnalyticsConfig;
use crate::core::error::{MarketError, MarketResult};
use crate::core::market::MarketData;
use crate::core::quote::{Horizon, PriceSeries, Quote, Sector, validate_ticker};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Allocation {
    /// Percent of the initial capital.
    Weight(f64),
    /// Number of shares bought at the first close of the horizon.
    Shares(f64),
}

/// One line of a portfolio. Exactly one of `weight` or `shares` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shares: Option<f64>,
}

impl Holding {
    pub fn weighted(ticker: &str, weight: f64) -> Self {
        Holding {
            ticker: ticker.to_string(),
            weight: Some(weight),
            shares: None,
        }
    }

    pub fn with_shares(ticker: &str, shares: f64) -> Self {
        Holding {
            ticker: ticker.to_string(),
            weight: None,
            shares: Some(shares),
        }
    }

    pub fn allocation(&self) -> MarketResult<Allocation> {
        let allocation = match (self.weight, self.shares) {
            (Some(weight), None) => Allocation::Weight(weight),
            (None, Some(shares)) => Allocation::Shares(shares),
            _ => {
                return Err(MarketError::Validation(format!(
                    "holding {} must set exactly one of weight or shares",
                    self.ticker
                )));
            }
        };
        let amount = match allocation {
            Allocation::Weight(v) | Allocation::Shares(v) => v,
        };
        if !amount.is_finite() || amount <= 0.0 {
            return Err(MarketError::Validation(format!(
                "holding {} has a non-positive allocation: {amount}",
                self.ticker
            )));
        }
        Ok(allocation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub name: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_capital: Option<f64>,
    pub holdings: Vec<Holding>,
}

/// Normalized portfolio name used for lookups; names compare case-insensitively
/// and ignore surrounding whitespace.
pub fn portfolio_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl Portfolio {
    pub fn new(name: &str, holdings: Vec<Holding>) -> Self {
        Portfolio {
            name: name.to_string(),
            created_at: Utc::now(),
            initial_capital: None,
            holdings,
        }
    }

    pub fn validate(&self) -> MarketResult<()> {
        if self.name.trim().is_empty() {
            return Err(MarketError::Validation(
                "portfolio name must not be empty".to_string(),
            ));
        }
        validate_holdings(&self.holdings)?;
        if let Some(capital) = self.initial_capital {
            validate_capital(capital)?;
        }
        Ok(())
    }
}

fn validate_capital(capital: f64) -> MarketResult<()> {
    if capital.is_finite() && capital > 0.0 {
        Ok(())
    } else {
        Err(MarketError::Validation(format!(
            "initial capital must be positive, got {capital}"
        )))
    }
}

/// Normalized tickers with their allocations, in holding order.
fn validate_holdings(holdings: &[Holding]) -> MarketResult<Vec<(String, Allocation)>> {
    if holdings.is_empty() {
        return Err(MarketError::Validation(
            "portfolio needs at least one holding".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    holdings
        .iter()
        .map(|holding| {
            let ticker = validate_ticker(&holding.ticker)?;
            if !seen.insert(ticker.clone()) {
                return Err(MarketError::Validation(format!(
                    "duplicate holding: {ticker}"
                )));
            }
            Ok((ticker, holding.allocation()?))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingAllocation {
    pub ticker: String,
    pub capital: f64,
    /// Fraction of the initial capital.
    pub weight: f64,
    pub first_close: f64,
    pub last_close: f64,
    pub cumulative_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkComparison {
    pub ticker: String,
    pub metrics: MetricSet,
    pub beta: f64,
    pub correlation: f64,
    /// Portfolio minus benchmark cumulative return over the shared dates.
    pub outperformance: f64,
    pub aligned_points: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioResult {
    pub horizon: Horizon,
    pub initial_capital: f64,
    pub dates: Vec<NaiveDate>,
    pub value_series: Vec<f64>,
    pub cumulative_returns: Vec<f64>,
    pub final_value: f64,
    pub metrics: MetricSet,
    pub benchmark: Option<BenchmarkComparison>,
    pub allocations: Vec<HoldingAllocation>,
}

impl PortfolioResult {
    pub fn dated_values(&self) -> Vec<(NaiveDate, f64)> {
        self.dates
            .iter()
            .copied()
            .zip(self.value_series.iter().copied())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoldingValue {
    pub ticker: String,
    pub shares: f64,
    pub price: f64,
    pub value: f64,
    /// Fraction of the total value.
    pub weight: f64,
    pub sector: Sector,
}

/// A portfolio priced at current quotes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioValuation {
    pub holdings: Vec<HoldingValue>,
    pub total_value: f64,
    /// Against `initial_capital`, when the portfolio sets one.
    pub total_return: Option<f64>,
    /// Fraction of the total value per sector, largest first.
    pub sectors: Vec<(Sector, f64)>,
    /// Tickers left out because they had no quote.
    pub skipped: Vec<String>,
}

/// Prices `portfolio` at `quotes`, keyed by normalized ticker.
///
/// Share holdings are worth shares × price. A weighted holding gets its
/// percent of `capital` (split over all weights, priced or not) and the
/// shares that buys at today's price. Holdings without a quote are skipped.
pub fn value_holdings(
    portfolio: &Portfolio,
    quotes: &HashMap<String, Quote>,
    capital: f64,
) -> MarketResult<PortfolioValuation> {
    let holdings = validate_holdings(&portfolio.holdings)?;
    validate_capital(capital)?;
    let total_weight: f64 = holdings
        .iter()
        .filter_map(|(_, allocation)| match allocation {
            Allocation::Weight(percent) => Some(*percent),
            Allocation::Shares(_) => None,
        })
        .sum();

    let mut valued = Vec::with_capacity(holdings.len());
    let mut skipped = Vec::new();
    for (ticker, allocation) in holdings {
        let Some(quote) = quotes.get(&ticker) else {
            skipped.push(ticker);
            continue;
        };
        let shares = match allocation {
            Allocation::Shares(shares) => shares,
            Allocation::Weight(percent) => capital * percent / total_weight / quote.price,
        };
        valued.push(HoldingValue {
            ticker,
            shares,
            price: quote.price,
            value: shares * quote.price,
            weight: 0.0,
            sector: quote.sector,
        });
    }

    let total_value: f64 = valued.iter().map(|h| h.value).sum();
    if valued.is_empty() || total_value <= 0.0 {
        return Err(MarketError::InsufficientData(format!(
            "no holding of {} could be priced",
            portfolio.name
        )));
    }

    let mut by_sector: BTreeMap<Sector, f64> = BTreeMap::new();
    for holding in &mut valued {
        holding.weight = holding.value / total_value;
        *by_sector.entry(holding.sector).or_default() += holding.weight;
    }
    let mut sectors: Vec<(Sector, f64)> = by_sector.into_iter().collect();
    sectors.sort_by(|a, b| b.1.total_cmp(&a.1));

    Ok(PortfolioValuation {
        holdings: valued,
        total_value,
        total_return: portfolio
            .initial_capital
            .map(|initial| (total_value - initial) / initial),
        sectors,
        skipped,
    })
}

/// Closes of every holding on the dates all of them traded.
struct AlignedCloses {
    dates: Vec<NaiveDate>,
    closes: Vec<Vec<f64>>,
}

fn align_holdings(series: &[PriceSeries]) -> AlignedCloses {
    let mut by_date: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    if let Some(first) = series.first() {
        for point in first.points() {
            by_date.insert(point.date, vec![point.close]);
        }
    }
    for other in series.iter().skip(1) {
        let closes: BTreeMap<NaiveDate, f64> =
            other.points().iter().map(|p| (p.date, p.close)).collect();
        by_date.retain(|date, row| match closes.get(date) {
            Some(close) => {
                row.push(*close);
                true
            }
            None => false,
        });
    }

    let dates: Vec<NaiveDate> = by_date.keys().copied().collect();
    let closes = (0..series.len())
        .map(|i| by_date.values().map(|row| row[i]).collect())
        .collect();
    AlignedCloses { dates, closes }
}

/// Splits `initial_capital` across holdings. Weights are percent of capital,
/// shares are valued at `first_closes`; the result is rescaled to sum to
/// `initial_capital`.
fn allocate_capital(
    allocations: &[Allocation],
    first_closes: &[f64],
    initial_capital: f64,
) -> Vec<f64> {
    let raw: Vec<f64> = allocations
        .iter()
        .zip(first_closes)
        .map(|(allocation, first_close)| match allocation {
            Allocation::Weight(percent) => initial_capital * percent / 100.0,
            Allocation::Shares(count) => count * first_close,
        })
        .collect();
    let total: f64 = raw.iter().sum();
    raw.iter().map(|v| initial_capital * v / total).collect()
}

/// Compares a dated portfolio value series with a benchmark on their shared dates.
pub fn compare_with_benchmark(
    portfolio: &[(NaiveDate, f64)],
    benchmark: &PriceSeries,
    risk_free_rate: f64,
) -> MarketResult<BenchmarkComparison> {
    let benchmark_points: Vec<(NaiveDate, f64)> =
        benchmark.points().iter().map(|p| (p.date, p.close)).collect();
    let aligned = analytics::align_by_date(portfolio, &benchmark_points);
    if aligned.len() < 2 {
        return Err(MarketError::InsufficientData(format!(
            "portfolio and {} share {} dates, need at least 2",
            benchmark.ticker,
            aligned.len()
        )));
    }

    let dates: Vec<NaiveDate> = aligned.iter().map(|(d, _, _)| *d).collect();
    let portfolio_values: Vec<f64> = aligned.iter().map(|(_, p, _)| *p).collect();
    let benchmark_values: Vec<f64> = aligned.iter().map(|(_, _, b)| *b).collect();

    let portfolio_returns = analytics::daily_returns(&portfolio_values);
    let benchmark_returns = analytics::daily_returns(&benchmark_values);
    let metrics = MetricSet::from_values(&dates, &benchmark_values, risk_free_rate)?;
    let portfolio_cumulative = analytics::cumulative_return(&portfolio_values)?;

    Ok(BenchmarkComparison {
        ticker: benchmark.ticker.clone(),
        beta: analytics::beta(&portfolio_returns, &benchmark_returns),
        correlation: analytics::correlation(&portfolio_returns, &benchmark_returns),
        outperformance: portfolio_cumulative - metrics.cumulative_return,
        metrics,
        aligned_points: aligned.len(),
    })
}

pub struct PortfolioAnalytics {
    market: Arc<MarketData>,
    risk_free_rate: f64,
    benchmark: String,
    default_capital: f64,
}

impl PortfolioAnalytics {
    pub fn new(market: Arc<MarketData>, config: &AnalyticsConfig) -> Self {
        PortfolioAnalytics {
            market,
            risk_free_rate: config.risk_free_rate,
            benchmark: config.benchmark.clone(),
            default_capital: config.initial_capital,
        }
    }

    pub async fn simulate_portfolio(
        &self,
        portfolio: &Portfolio,
        horizon: Horizon,
    ) -> MarketResult<PortfolioResult> {
        let capital = portfolio.initial_capital.unwrap_or(self.default_capital);
        self.simulate(&portfolio.holdings, capital, horizon).await
    }

    /// Simulates a buy-and-rebalance-daily portfolio over `horizon`.
    ///
    /// Every holding must have at least two closes; the first one that does
    /// not fails the whole simulation with `InsufficientData`. A benchmark
    /// that cannot be fetched or aligned leaves `benchmark` empty.
    pub async fn simulate(
        &self,
        holdings: &[Holding],
        initial_capital: f64,
        horizon: Horizon,
    ) -> MarketResult<PortfolioResult> {
        validate_capital(initial_capital)?;
        let holdings = validate_holdings(holdings)?;

        let fetches = holdings
            .iter()
            .map(|(ticker, _)| self.market.get_history(ticker, horizon));
        let mut series = Vec::with_capacity(holdings.len());
        for ((ticker, _), result) in holdings.iter().zip(join_all(fetches).await) {
            let history = result?;
            if history.len() < 2 {
                return Err(MarketError::InsufficientData(format!(
                    "{ticker} has {} price points over {horizon}, need at least 2",
                    history.len()
                )));
            }
            series.push(history);
        }

        let aligned = align_holdings(&series);
        if aligned.dates.len() < 2 {
            return Err(MarketError::InsufficientData(format!(
                "holdings share {} trading dates over {horizon}, need at least 2",
                aligned.dates.len()
            )));
        }
        debug!(
            "Aligned {} holdings on {} dates",
            holdings.len(),
            aligned.dates.len()
        );

        let first_closes: Vec<f64> = aligned.closes.iter().map(|c| c[0]).collect();
        let kinds: Vec<Allocation> = holdings.iter().map(|(_, a)| *a).collect();
        let capital = allocate_capital(&kinds, &first_closes, initial_capital);
        let weights: Vec<f64> = capital.iter().map(|c| c / initial_capital).collect();

        let holding_returns: Vec<Vec<f64>> = aligned
            .closes
            .iter()
            .map(|closes| analytics::daily_returns(closes))
            .collect();
        let mut value_series = Vec::with_capacity(aligned.dates.len());
        value_series.push(initial_capital);
        for day in 0..aligned.dates.len() - 1 {
            let daily: f64 = weights
                .iter()
                .zip(&holding_returns)
                .map(|(w, returns)| w * returns[day])
                .sum();
            let previous = value_series[value_series.len() - 1];
            value_series.push(previous * (1.0 + daily));
        }

        let metrics = MetricSet::from_values(&aligned.dates, &value_series, self.risk_free_rate)?;
        let allocations = holdings
            .iter()
            .zip(&aligned.closes)
            .zip(&capital)
            .map(|(((ticker, _), closes), capital)| {
                let first_close = closes[0];
                let last_close = closes[closes.len() - 1];
                HoldingAllocation {
                    ticker: ticker.clone(),
                    capital: *capital,
                    weight: capital / initial_capital,
                    first_close,
                    last_close,
                    cumulative_return: last_close / first_close - 1.0,
                }
            })
            .collect();

        let mut result = PortfolioResult {
            horizon,
            initial_capital,
            cumulative_returns: analytics::cumulative_return_series(&value_series),
            final_value: value_series[value_series.len() - 1],
            dates: aligned.dates,
            value_series,
            metrics,
            benchmark: None,
            allocations,
        };
        result.benchmark = self.benchmark_comparison(&result).await;
        Ok(result)
    }

    async fn benchmark_comparison(&self, result: &PortfolioResult) -> Option<BenchmarkComparison> {
        let series = match self.market.get_history(&self.benchmark, result.horizon).await {
            Ok(series) => series,
            Err(e) => {
                warn!("Skipping benchmark {}: {}", self.benchmark, e);
                return None;
            }
        };
        match compare_with_benchmark(&result.dated_values(), &series, self.risk_free_rate) {
            Ok(comparison) => Some(comparison),
            Err(e) => {
                warn!("Skipping benchmark {}: {}", self.benchmark, e);
                None
            }
        }
    }

    /// Values `portfolio` at live quotes. Tickers whose quote fails are
    /// logged and skipped.
    pub async fn value_portfolio(&self, portfolio: &Portfolio) -> MarketResult<PortfolioValuation> {
        let tickers: Vec<&str> = portfolio
            .holdings
            .iter()
            .map(|h| h.ticker.as_str())
            .collect();
        let mut quotes = HashMap::new();
        for (ticker, result) in self.market.get_quotes(&tickers).await {
            match result {
                Ok(quote) => {
                    quotes.insert(quote.ticker.clone(), quote);
                }
                Err(e) => warn!("Skipping {} in valuation: {}", ticker, e),
            }
        }
        let capital = portfolio.initial_capital.unwrap_or(self.default_capital);
        value_holdings(portfolio, &quotes, capital)
    }

    /// Share of capital per sector, largest first. Holdings whose quote
    /// cannot be fetched count as `Sector::Unknown`.
    pub async fn sector_allocation(&self, allocations: &[HoldingAllocation]) -> Vec<(Sector, f64)> {
        let tickers: Vec<&str> = allocations.iter().map(|a| a.ticker.as_str()).collect();
        let quotes = self.market.get_quotes(&tickers).await;

        let mut by_sector: BTreeMap<Sector, f64> = BTreeMap::new();
        for (allocation, (ticker, quote)) in allocations.iter().zip(quotes) {
            let sector = match quote {
                Ok(quote) => quote.sector,
                Err(e) => {
                    warn!("No sector for {}: {}", ticker, e);
                    Sector::Unknown
                }
            };
            *by_sector.entry(sector).or_default() += allocation.weight;
        }

        let mut sectors: Vec<(Sector, f64)> = by_sector.into_iter().collect();
        sectors.sort_by(|a, b| b.1.total_cmp(&a.1));
        sectors
    }
}
