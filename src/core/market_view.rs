//! Market-wide views: major indices, sector performance, breadth and movers.

use crate::core::market::MarketData;
use crate::core::quote::{Horizon, Quote, Sector};
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub const MAJOR_INDICES: &[(&str, &str)] = &[
    ("^GSPC", "S&P 500"),
    ("^DJI", "Dow Jones Industrial Average"),
    ("^IXIC", "NASDAQ Composite"),
    ("^RUT", "Russell 2000 Index"),
];

/// Large caps monitored for breadth, movers and screening.
pub const STOCK_UNIVERSE: &[(&str, Sector)] = &[
    ("AAPL", Sector::Technology),
    ("MSFT", Sector::Technology),
    ("GOOGL", Sector::Technology),
    ("TSLA", Sector::Consumer),
    ("NVDA", Sector::Technology),
    ("META", Sector::Technology),
    ("AMZN", Sector::Consumer),
    ("NFLX", Sector::Communication),
    ("AMD", Sector::Technology),
    ("INTC", Sector::Technology),
    ("JPM", Sector::Financial),
    ("BAC", Sector::Financial),
    ("WFC", Sector::Financial),
    ("GS", Sector::Financial),
    ("MS", Sector::Financial),
    ("C", Sector::Financial),
    ("AXP", Sector::Financial),
    ("BLK", Sector::Financial),
    ("SCHW", Sector::Financial),
    ("USB", Sector::Financial),
    ("JNJ", Sector::Healthcare),
    ("PFE", Sector::Healthcare),
    ("UNH", Sector::Healthcare),
    ("ABBV", Sector::Healthcare),
    ("MRK", Sector::Healthcare),
    ("TMO", Sector::Healthcare),
    ("DHR", Sector::Healthcare),
    ("LLY", Sector::Healthcare),
    ("BMY", Sector::Healthcare),
    ("AMGN", Sector::Healthcare),
    ("PG", Sector::Consumer),
    ("KO", Sector::Consumer),
    ("PEP", Sector::Consumer),
    ("WMT", Sector::Consumer),
    ("HD", Sector::Consumer),
    ("MCD", Sector::Consumer),
    ("SBUX", Sector::Consumer),
    ("NKE", Sector::Consumer),
    ("DIS", Sector::Communication),
    ("CMCSA", Sector::Communication),
    ("XOM", Sector::Energy),
    ("CVX", Sector::Energy),
    ("COP", Sector::Energy),
    ("EOG", Sector::Energy),
    ("SLB", Sector::Energy),
    ("KMI", Sector::Energy),
    ("PSX", Sector::Energy),
    ("VLO", Sector::Energy),
    ("MPC", Sector::Energy),
    ("OXY", Sector::Energy),
    ("BA", Sector::Industrial),
    ("CAT", Sector::Industrial),
    ("MMM", Sector::Industrial),
    ("GE", Sector::Industrial),
    ("HON", Sector::Industrial),
    ("UPS", Sector::Industrial),
    ("FDX", Sector::Industrial),
    ("LMT", Sector::Industrial),
    ("RTX", Sector::Industrial),
    ("NOC", Sector::Industrial),
    ("LIN", Sector::Materials),
    ("APD", Sector::Materials),
    ("FCX", Sector::Materials),
    ("NEM", Sector::Materials),
    ("DOW", Sector::Materials),
    ("DD", Sector::Materials),
    ("ECL", Sector::Materials),
    ("ALB", Sector::Materials),
    ("NUE", Sector::Materials),
];

/// Representative constituents used to gauge each sector's day.
pub const SECTOR_LEADERS: &[(Sector, &[&str])] = &[
    (Sector::Technology, &["AAPL", "MSFT", "GOOGL", "NVDA", "META"]),
    (Sector::Healthcare, &["JNJ", "PFE", "UNH", "ABBV", "TMO"]),
    (Sector::Financial, &["JPM", "BAC", "WFC", "GS", "MS"]),
    (Sector::Consumer, &["AMZN", "TSLA", "NFLX", "HD", "MCD"]),
    (Sector::Industrial, &["BA", "CAT", "GE", "MMM", "HON"]),
];

/// Absolute day change, in percent, that counts as a move.
pub const DEFAULT_MOVER_THRESHOLD: f64 = 1.0;
pub const DEFAULT_MOVER_LIMIT: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSnapshot {
    pub ticker: String,
    pub name: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorPerformance {
    pub sector: Sector,
    pub average_change_percent: f64,
    pub constituents: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarketBreadth {
    pub advancing: usize,
    pub declining: usize,
    pub unchanged: usize,
}

impl MarketBreadth {
    pub fn from_quotes(quotes: &[Quote]) -> Self {
        quotes.iter().fold(MarketBreadth::default(), |mut acc, q| {
            if q.change > 0.0 {
                acc.advancing += 1;
            } else if q.change < 0.0 {
                acc.declining += 1;
            } else {
                acc.unchanged += 1;
            }
            acc
        })
    }

    pub fn total(&self) -> usize {
        self.advancing + self.declining + self.unchanged
    }
}

/// Quotes moving more than `min_abs_change` percent, largest moves first.
pub fn top_movers(quotes: &[Quote], min_abs_change: f64, limit: usize) -> Vec<Quote> {
    let mut movers: Vec<Quote> = quotes
        .iter()
        .filter(|q| q.change_percent.abs() > min_abs_change)
        .cloned()
        .collect();
    movers.sort_by(|a, b| b.change_percent.abs().total_cmp(&a.change_percent.abs()));
    movers.truncate(limit);
    movers
}

/// Snapshot of an index from its last two daily closes.
pub fn index_snapshot(ticker: &str, name: &str, closes: &[f64]) -> Option<IndexSnapshot> {
    match closes {
        [.., previous, last] => {
            let change = last - previous;
            Some(IndexSnapshot {
                ticker: ticker.to_string(),
                name: name.to_string(),
                price: *last,
                change,
                change_percent: change / previous * 100.0,
            })
        }
        _ => None,
    }
}

/// Average day change per sector, best first. Sectors without any quote are left out.
pub fn average_by_sector(quotes: &[(Sector, Quote)]) -> Vec<SectorPerformance> {
    let mut totals: BTreeMap<Sector, (f64, usize)> = BTreeMap::new();
    for (sector, quote) in quotes {
        if !quote.change_percent.is_finite() {
            continue;
        }
        let entry = totals.entry(*sector).or_default();
        entry.0 += quote.change_percent;
        entry.1 += 1;
    }

    let mut performance: Vec<SectorPerformance> = totals
        .into_iter()
        .map(|(sector, (sum, count))| SectorPerformance {
            sector,
            average_change_percent: sum / count as f64,
            constituents: count,
        })
        .collect();
    performance.sort_by(|a, b| b.average_change_percent.total_cmp(&a.average_change_percent));
    performance
}

pub struct MarketView {
    market: Arc<MarketData>,
}

impl MarketView {
    pub fn new(market: Arc<MarketData>) -> Self {
        MarketView { market }
    }

    /// Latest level of each major index. Indices that fail are skipped.
    pub async fn market_overview(&self) -> Vec<IndexSnapshot> {
        let fetches = MAJOR_INDICES
            .iter()
            .map(|(ticker, _)| self.market.get_history(ticker, Horizon::SixMonths));
        let results = join_all(fetches).await;

        MAJOR_INDICES
            .iter()
            .zip(results)
            .filter_map(|((ticker, name), result)| match result {
                Ok(series) => {
                    let snapshot = index_snapshot(ticker, name, &series.closes());
                    if snapshot.is_none() {
                        warn!("Not enough closes for index {}", ticker);
                    }
                    snapshot
                }
                Err(e) => {
                    warn!("Skipping index {}: {}", ticker, e);
                    None
                }
            })
            .collect()
    }

    /// Quotes for the monitored universe. Failed tickers are skipped.
    pub async fn universe_quotes(&self) -> Vec<Quote> {
        let tickers: Vec<&str> = STOCK_UNIVERSE.iter().map(|(t, _)| *t).collect();
        self.quotes_or_skip(&tickers).await
    }

    pub async fn sector_performance(&self) -> Vec<SectorPerformance> {
        let tagged: Vec<(Sector, &str)> = SECTOR_LEADERS
            .iter()
            .flat_map(|(sector, tickers)| tickers.iter().map(move |t| (*sector, *t)))
            .collect();
        let tickers: Vec<&str> = tagged.iter().map(|(_, t)| *t).collect();
        let results = self.market.get_quotes(&tickers).await;

        let quotes: Vec<(Sector, Quote)> = tagged
            .iter()
            .zip(results)
            .filter_map(|((sector, _), (ticker, result))| match result {
                Ok(quote) => Some((*sector, quote)),
                Err(e) => {
                    warn!("Skipping {} in sector performance: {}", ticker, e);
                    None
                }
            })
            .collect();
        average_by_sector(&quotes)
    }

    pub async fn market_breadth(&self) -> MarketBreadth {
        MarketBreadth::from_quotes(&self.universe_quotes().await)
    }

    pub async fn top_movers(&self, min_abs_change: f64, limit: usize) -> Vec<Quote> {
        top_movers(&self.universe_quotes().await, min_abs_change, limit)
    }

    async fn quotes_or_skip(&self, tickers: &[&str]) -> Vec<Quote> {
        self.market
            .get_quotes(tickers)
            .await
            .into_iter()
            .filter_map(|(ticker, result)| match result {
                Ok(quote) => Some(quote),
                Err(e) => {
                    warn!("Skipping {}: {}", ticker, e);
                    None
                }
            })
            .collect()
    }
}
