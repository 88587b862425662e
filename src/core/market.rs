//! Data access layer: validated, cached quotes and price history on top of a
//! `MarketDataProvider`.

use crate::core::cache::TtlCache;
use crate::core::config::CacheConfig;
use crate::core::error::{MarketError, MarketResult};
use crate::core::quote::{
    Horizon, MarketDataProvider, PriceSeries, Quote, RawQuote, Sector, is_valid_price,
    normalize_points, validate_ticker,
};
use crate::store::KeyValueCollection;
use chrono::{Duration, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, warn};

/// Lookback used when live fields carry no usable price.
const FALLBACK_LOOKBACK_DAYS: i64 = 7;

type PriceExtractor = fn(&RawQuote) -> Option<f64>;

fn current_price(raw: &RawQuote) -> Option<f64> {
    raw.current_price
}

fn regular_market_price(raw: &RawQuote) -> Option<f64> {
    raw.regular_market_price
}

fn previous_close(raw: &RawQuote) -> Option<f64> {
    raw.previous_close
}

/// Live price fields, in order of preference.
const PRICE_EXTRACTORS: &[(&str, PriceExtractor)] = &[
    ("current price", current_price),
    ("regular market price", regular_market_price),
    ("previous close", previous_close),
];

fn extract_live_price(raw: &RawQuote) -> Option<(&'static str, f64)> {
    PRICE_EXTRACTORS.iter().find_map(|(field, extract)| {
        extract(raw)
            .filter(|p| is_valid_price(*p))
            .map(|p| (*field, p))
    })
}

pub struct MarketData {
    provider: Arc<dyn MarketDataProvider>,
    quotes: TtlCache<String, Quote>,
    history: TtlCache<(String, Horizon), PriceSeries>,
    saved_history: Option<Arc<dyn KeyValueCollection>>,
    saved_data_expiry: std::time::Duration,
}

impl MarketData {
    pub fn new(provider: Arc<dyn MarketDataProvider>, config: &CacheConfig) -> Self {
        MarketData {
            provider,
            quotes: TtlCache::new(config.ttl(), config.max_entries),
            history: TtlCache::new(config.ttl(), config.max_entries),
            saved_history: None,
            saved_data_expiry: config.saved_data_expiry(),
        }
    }

    /// Keeps fetched history in `collection` for `cache.saved_data_expiry_secs`,
    /// so it outlives the in-memory cache.
    pub fn with_saved_history(mut self, collection: Arc<dyn KeyValueCollection>) -> Self {
        self.saved_history = Some(collection);
        self
    }

    pub async fn get_quote(&self, ticker: &str) -> MarketResult<Quote> {
        let ticker = validate_ticker(ticker)?;
        self.quotes
            .get_or_fetch(ticker.clone(), || self.fetch_quote(ticker.clone()))
            .await
    }

    /// Fetches quotes concurrently. Results keep the order of `tickers`.
    pub async fn get_quotes(&self, tickers: &[&str]) -> Vec<(String, MarketResult<Quote>)> {
        let futures = tickers.iter().map(|ticker| async move {
            (ticker.to_string(), self.get_quote(ticker).await)
        });
        join_all(futures).await
    }

    pub async fn get_history(&self, ticker: &str, horizon: Horizon) -> MarketResult<PriceSeries> {
        let ticker = validate_ticker(ticker)?;
        self.history
            .get_or_fetch((ticker.clone(), horizon), || {
                self.fetch_history(ticker.clone(), horizon)
            })
            .await
    }

    async fn fetch_quote(&self, ticker: String) -> MarketResult<Quote> {
        let raw = self.provider.fetch_quote(&ticker).await?;

        let (price, change, change_percent) = match extract_live_price(&raw) {
            Some((field, price)) => {
                debug!("Using {} for {}: {}", field, ticker, price);
                let (change, change_percent) = day_change(&raw, price);
                (price, change, change_percent)
            }
            None => self.price_from_recent_history(&ticker).await?,
        };

        let name = raw.long_name.or(raw.short_name);
        let sector = raw.sector.as_deref().map(Sector::from).unwrap_or(Sector::Unknown);

        Ok(Quote {
            ticker,
            name,
            price,
            previous_close: raw.previous_close.filter(|p| is_valid_price(*p)),
            change,
            change_percent,
            volume: raw.volume,
            market_cap: raw.market_cap,
            pe_ratio: raw.trailing_pe.or(raw.forward_pe),
            dividend_yield: raw.dividend_yield,
            sector,
            industry: raw.industry,
            fifty_two_week_high: raw.fifty_two_week_high,
            fifty_two_week_low: raw.fifty_two_week_low,
            average_volume: raw.average_volume,
            fetched_at: Utc::now(),
        })
    }

    /// Last close over a short lookback, with day change from the last two closes.
    async fn price_from_recent_history(&self, ticker: &str) -> MarketResult<(f64, f64, f64)> {
        warn!("No live price for {}, falling back to recent history", ticker);
        let points = self
            .provider
            .fetch_history(ticker, Duration::days(FALLBACK_LOOKBACK_DAYS))
            .await
            .map_err(|e| {
                MarketError::Upstream(format!(
                    "no usable price for {ticker}: history fallback failed: {e}"
                ))
            })?;
        let closes: Vec<f64> = normalize_points(points)
            .iter()
            .map(|p| p.close)
            .collect();

        match closes.as_slice() {
            [.., previous, last] => {
                let change = last - previous;
                Ok((*last, change, change / previous * 100.0))
            }
            [last] => Ok((*last, 0.0, 0.0)),
            [] => Err(MarketError::Upstream(format!("no usable price for {ticker}"))),
        }
    }

    async fn fetch_history(&self, ticker: String, horizon: Horizon) -> MarketResult<PriceSeries> {
        let saved_key = format!("{ticker}:{horizon}");
        if let Some(series) = self.load_saved_history(&saved_key).await {
            return Ok(series);
        }

        let points = self
            .provider
            .fetch_history(&ticker, horizon.to_duration())
            .await?;
        let series = PriceSeries::new(&ticker, horizon, points);
        debug!("Fetched {} closes for {} over {}", series.len(), ticker, horizon);

        self.save_history(&saved_key, &series).await;
        Ok(series)
    }

    async fn load_saved_history(&self, key: &str) -> Option<PriceSeries> {
        let collection = self.saved_history.as_ref()?;
        match collection.get(key).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(series) => Some(series),
                Err(e) => {
                    warn!("Discarding unreadable saved history for {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read saved history for {}: {}", key, e);
                None
            }
        }
    }

    async fn save_history(&self, key: &str, series: &PriceSeries) {
        let Some(collection) = self.saved_history.as_ref() else {
            return;
        };
        if series.is_empty() {
            return;
        }
        let result = match serde_json::to_vec(series) {
            Ok(bytes) => {
                collection
                    .put(key, bytes, Some(self.saved_data_expiry))
                    .await
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!("Failed to save history for {}: {}", key, e);
        }
    }
}

/// Day change in absolute and percent terms, preferring the provider's figures.
fn day_change(raw: &RawQuote, price: f64) -> (f64, f64) {
    let previous = raw.previous_close.filter(|p| is_valid_price(*p));
    let change = raw
        .change
        .filter(|c| c.is_finite())
        .or_else(|| previous.map(|p| price - p))
        .unwrap_or(0.0);
    let change_percent = raw
        .change_percent
        .filter(|c| c.is_finite())
        .or_else(|| previous.map(|p| change / p * 100.0))
        .unwrap_or(0.0);
    (change, change_percent)
}
