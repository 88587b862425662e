//! Quote and price history types, and the provider abstraction

use crate::core::error::{MarketError, MarketResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

const MAX_TICKER_LEN: usize = 10;

/// Normalizes a ticker symbol to uppercase and checks its shape.
///
/// Accepts 1-10 alphabetic or period characters, starting with a letter. Index
/// symbols may carry a single leading `^` (e.g. `^GSPC`).
pub fn validate_ticker(ticker: &str) -> MarketResult<String> {
    let normalized = ticker.trim().to_uppercase();
    let body = normalized.strip_prefix('^').unwrap_or(&normalized);

    let starts_with_letter = body.chars().next().is_some_and(|c| c.is_ascii_alphabetic());
    let valid_chars = body.chars().all(|c| c.is_ascii_alphabetic() || c == '.');

    if body.is_empty() || body.len() > MAX_TICKER_LEN || !starts_with_letter || !valid_chars {
        return Err(MarketError::Validation(format!(
            "Invalid ticker symbol: '{ticker}'"
        )));
    }
    Ok(normalized)
}

pub(crate) fn is_valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Horizon {
    SixMonths,
    OneYear,
    TwoYears,
    FiveYears,
}

impl Display for Horizon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Horizon::SixMonths => "6M",
                Horizon::OneYear => "1Y",
                Horizon::TwoYears => "2Y",
                Horizon::FiveYears => "5Y",
            }
        )
    }
}

impl Horizon {
    pub fn to_duration(&self) -> Duration {
        match self {
            Horizon::SixMonths => Duration::days(182),
            Horizon::OneYear => Duration::days(365),
            Horizon::TwoYears => Duration::days(365 * 2),
            Horizon::FiveYears => Duration::days(365 * 5),
        }
    }
}

impl FromStr for Horizon {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "6M" | "6MO" => Ok(Horizon::SixMonths),
            "1Y" => Ok(Horizon::OneYear),
            "2Y" => Ok(Horizon::TwoYears),
            "5Y" => Ok(Horizon::FiveYears),
            _ => Err(MarketError::Validation(format!("Invalid horizon: {s}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Sector {
    Technology,
    Healthcare,
    Financial,
    Consumer,
    Energy,
    Industrial,
    Materials,
    Utilities,
    RealEstate,
    Communication,
    Unknown,
}

impl From<&str> for Sector {
    /// Maps provider sector labels (and the short names used on the command
    /// line) onto the dashboard's sector buckets.
    fn from(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "technology" | "tech" => Sector::Technology,
            "healthcare" | "health care" => Sector::Healthcare,
            "financial" | "financials" | "financial services" => Sector::Financial,
            "consumer" | "consumer cyclical" | "consumer defensive" => Sector::Consumer,
            "energy" => Sector::Energy,
            "industrial" | "industrials" => Sector::Industrial,
            "materials" | "basic materials" => Sector::Materials,
            "utilities" => Sector::Utilities,
            "real estate" | "realestate" => Sector::RealEstate,
            "communication" | "communication services" => Sector::Communication,
            _ => Sector::Unknown,
        }
    }
}

impl FromStr for Sector {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match Sector::from(s) {
            Sector::Unknown => Err(MarketError::Validation(format!("Unknown sector: {s}"))),
            sector => Ok(sector),
        }
    }
}

impl Display for Sector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Sector::Technology => "Technology",
            Sector::Healthcare => "Healthcare",
            Sector::Financial => "Financial",
            Sector::Consumer => "Consumer",
            Sector::Energy => "Energy",
            Sector::Industrial => "Industrial",
            Sector::Materials => "Materials",
            Sector::Utilities => "Utilities",
            Sector::RealEstate => "Real Estate",
            Sector::Communication => "Communication",
            Sector::Unknown => "N/A",
        };
        write!(f, "{name}")
    }
}

/// Point-in-time snapshot of a ticker. `price` is always positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub ticker: String,
    pub name: Option<String>,
    pub price: f64,
    pub previous_close: Option<f64>,
    pub change: f64,
    pub change_percent: f64,
    pub volume: Option<u64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    /// Fraction, e.g. 0.012 for 1.2%.
    pub dividend_yield: Option<f64>,
    pub sector: Sector,
    pub industry: Option<String>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub average_volume: Option<u64>,
    pub fetched_at: DateTime<Utc>,
}

/// Provider fields as received, before any fallback or validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQuote {
    pub current_price: Option<f64>,
    pub regular_market_price: Option<f64>,
    pub previous_close: Option<f64>,
    pub change: Option<f64>,
    /// Percent, e.g. 1.5 for +1.5%.
    pub change_percent: Option<f64>,
    pub volume: Option<u64>,
    pub market_cap: Option<f64>,
    pub trailing_pe: Option<f64>,
    pub forward_pe: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub long_name: Option<String>,
    pub short_name: Option<String>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
    pub average_volume: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Daily closes for one ticker, in strictly increasing date order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub ticker: String,
    pub horizon: Horizon,
    points: Vec<PricePoint>,
}

/// Chronological points with positive closes and one point per date, the
/// last occurrence winning.
pub(crate) fn normalize_points(
    points: impl IntoIterator<Item = (NaiveDate, f64)>,
) -> Vec<PricePoint> {
    let mut sorted: Vec<PricePoint> = points
        .into_iter()
        .filter(|(_, close)| is_valid_price(*close))
        .map(|(date, close)| PricePoint { date, close })
        .collect();
    sorted.sort_by_key(|p| p.date);

    let mut deduped: Vec<PricePoint> = Vec::with_capacity(sorted.len());
    for point in sorted {
        match deduped.last_mut() {
            Some(last) if last.date == point.date => *last = point,
            _ => deduped.push(point),
        }
    }
    deduped
}

impl PriceSeries {
    /// Builds a series from unordered points. Non-positive closes are dropped
    /// and, for duplicate dates, the last occurrence wins.
    pub fn new(
        ticker: &str,
        horizon: Horizon,
        points: impl IntoIterator<Item = (NaiveDate, f64)>,
    ) -> Self {
        Self {
            ticker: ticker.to_string(),
            horizon,
            points: normalize_points(points),
        }
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }
}

/// Read-only access to a market-data source.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Live quote fields. Fails with `NotFound` for unknown tickers.
    async fn fetch_quote(&self, ticker: &str) -> MarketResult<RawQuote>;

    /// Daily closes covering `lookback` up to today, in any order.
    async fn fetch_history(
        &self,
        ticker: &str,
        lookback: Duration,
    ) -> MarketResult<Vec<(NaiveDate, f64)>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_validate_ticker() {
        assert_eq!(validate_ticker(" aapl ").unwrap(), "AAPL");
        assert_eq!(validate_ticker("brk.b").unwrap(), "BRK.B");
        assert_eq!(validate_ticker("^gspc").unwrap(), "^GSPC");

        assert!(validate_ticker("").is_err());
        assert!(validate_ticker("^").is_err());
        assert!(validate_ticker("ABCDEFGHIJK").is_err());
        assert!(validate_ticker("AB1").is_err());
        assert!(validate_ticker(".AB").is_err());
        assert!(matches!(
            validate_ticker("A B"),
            Err(MarketError::Validation(_))
        ));
    }

    #[test]
    fn test_horizon_parse_and_display() {
        assert_eq!("6m".parse::<Horizon>().unwrap(), Horizon::SixMonths);
        assert_eq!("6mo".parse::<Horizon>().unwrap(), Horizon::SixMonths);
        assert_eq!("1Y".parse::<Horizon>().unwrap(), Horizon::OneYear);
        assert_eq!("5y".parse::<Horizon>().unwrap(), Horizon::FiveYears);
        assert!("10y".parse::<Horizon>().is_err());
        assert_eq!(Horizon::TwoYears.to_string(), "2Y");
        assert_eq!(Horizon::OneYear.to_duration().num_days(), 365);
    }

    #[test]
    fn test_sector_mapping() {
        assert_eq!(Sector::from("Financial Services"), Sector::Financial);
        assert_eq!(Sector::from("Consumer Cyclical"), Sector::Consumer);
        assert_eq!(Sector::from("Basic Materials"), Sector::Materials);
        assert_eq!(Sector::from("Something Else"), Sector::Unknown);
        assert_eq!("technology".parse::<Sector>().unwrap(), Sector::Technology);
        assert!("nope".parse::<Sector>().is_err());
        assert_eq!(Sector::RealEstate.to_string(), "Real Estate");
    }

    #[test]
    fn test_normalize_points() {
        let points = normalize_points(vec![
            (date(2024, 1, 3), 12.0),
            (date(2024, 1, 2), -1.0),
            (date(2024, 1, 1), 10.0),
            (date(2024, 1, 3), 13.0),
        ]);
        let closes: Vec<f64> = points.iter().map(|p| p.close).collect();
        assert_eq!(closes, vec![10.0, 13.0]);
    }

    #[test]
    fn test_price_series_sorts_dedups_and_drops_invalid() {
        let series = PriceSeries::new(
            "AAPL",
            Horizon::OneYear,
            vec![
                (date(2024, 1, 3), 103.0),
                (date(2024, 1, 1), 101.0),
                (date(2024, 1, 2), 0.0),
                (date(2024, 1, 3), 104.0),
                (date(2024, 1, 4), f64::NAN),
                (date(2024, 1, 5), 105.0),
            ],
        );

        assert_eq!(
            series.dates(),
            vec![date(2024, 1, 1), date(2024, 1, 3), date(2024, 1, 5)]
        );
        assert_eq!(series.closes(), vec![101.0, 104.0, 105.0]);
        assert_eq!(series.last().unwrap().close, 105.0);
    }
}
