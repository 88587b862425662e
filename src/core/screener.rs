//! Stock screener over a fixed, sector-tagged ticker universe.

use crate::core::error::{MarketError, MarketResult};
use crate::core::market::MarketData;
use crate::core::market_view::STOCK_UNIVERSE;
use crate::core::quote::{Quote, Sector};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Optional predicates, ANDed together. An unset field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenFilters {
    pub min_pe: Option<f64>,
    pub max_pe: Option<f64>,
    /// Fraction, e.g. 0.02 for 2%.
    pub min_dividend_yield: Option<f64>,
    pub sector: Option<Sector>,
    pub min_market_cap: Option<f64>,
    pub max_market_cap: Option<f64>,
}

fn check_non_negative(name: &str, value: Option<f64>) -> MarketResult<()> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(MarketError::Validation(format!(
            "{name} must be a non-negative number, got {v}"
        ))),
        _ => Ok(()),
    }
}

fn check_range(name: &str, min: Option<f64>, max: Option<f64>) -> MarketResult<()> {
    match (min, max) {
        (Some(min), Some(max)) if min > max => Err(MarketError::Validation(format!(
            "min {name} ({min}) is greater than max {name} ({max})"
        ))),
        _ => Ok(()),
    }
}

fn at_least(value: Option<f64>, bound: Option<f64>) -> bool {
    match bound {
        Some(bound) => value.is_some_and(|v| v >= bound),
        None => true,
    }
}

fn at_most(value: Option<f64>, bound: Option<f64>) -> bool {
    match bound {
        Some(bound) => value.is_some_and(|v| v <= bound),
        None => true,
    }
}

impl ScreenFilters {
    pub fn validate(&self) -> MarketResult<()> {
        check_non_negative("min P/E", self.min_pe)?;
        check_non_negative("max P/E", self.max_pe)?;
        check_non_negative("min dividend yield", self.min_dividend_yield)?;
        check_non_negative("min market cap", self.min_market_cap)?;
        check_non_negative("max market cap", self.max_market_cap)?;
        check_range("P/E", self.min_pe, self.max_pe)?;
        check_range("market cap", self.min_market_cap, self.max_market_cap)?;
        if self.sector == Some(Sector::Unknown) {
            return Err(MarketError::Validation(
                "sector filter must name a known sector".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether `quote` passes every active predicate. A quote without a field
    /// an active predicate needs does not pass. `tagged_sector` stands in for
    /// a quote whose provider sector is unknown.
    pub fn matches(&self, quote: &Quote, tagged_sector: Sector) -> bool {
        let sector = match quote.sector {
            Sector::Unknown => tagged_sector,
            known => known,
        };

        at_least(quote.pe_ratio, self.min_pe)
            && at_most(quote.pe_ratio, self.max_pe)
            && at_least(quote.dividend_yield, self.min_dividend_yield)
            && at_least(quote.market_cap, self.min_market_cap)
            && at_most(quote.market_cap, self.max_market_cap)
            && self.sector.is_none_or(|wanted| wanted == sector)
    }
}

pub struct Screener {
    market: Arc<MarketData>,
    universe: Vec<(String, Sector)>,
}

impl Screener {
    pub fn new(market: Arc<MarketData>) -> Self {
        let universe = STOCK_UNIVERSE
            .iter()
            .map(|(ticker, sector)| (ticker.to_string(), *sector))
            .collect();
        Self::with_universe(market, universe)
    }

    pub fn with_universe(market: Arc<MarketData>, universe: Vec<(String, Sector)>) -> Self {
        Screener { market, universe }
    }

    pub fn universe_size(&self) -> usize {
        self.universe.len()
    }

    pub async fn screen(&self, filters: &ScreenFilters) -> MarketResult<Vec<Quote>> {
        self.screen_with_progress(filters, &|| {}).await
    }

    /// Screens the universe, calling `update_callback` once per ticker fetched.
    /// Tickers whose quote cannot be fetched are skipped.
    pub async fn screen_with_progress(
        &self,
        filters: &ScreenFilters,
        update_callback: &(dyn Fn() + Sync),
    ) -> MarketResult<Vec<Quote>> {
        filters.validate()?;

        let fetches = self.universe.iter().map(|(ticker, _)| async move {
            let result = self.market.get_quote(ticker).await;
            update_callback();
            result
        });
        let results = join_all(fetches).await;

        let mut matched = Vec::new();
        for ((ticker, tagged_sector), result) in self.universe.iter().zip(results) {
            match result {
                Ok(mut quote) if filters.matches(&quote, *tagged_sector) => {
                    if quote.sector == Sector::Unknown {
                        quote.sector = *tagged_sector;
                    }
                    matched.push(quote);
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping {} in screen: {}", ticker, e),
            }
        }
        debug!(
            "Screen matched {} of {} tickers",
            matched.len(),
            self.universe.len()
        );
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CacheConfig;
    use crate::core::market::tests::MockProvider;
    use crate::core::quote::RawQuote;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quote(pe: Option<f64>, dividend: Option<f64>, cap: Option<f64>, sector: Sector) -> Quote {
        Quote {
            ticker: "TEST".to_string(),
            name: None,
            price: 10.0,
            previous_close: None,
            change: 0.0,
            change_percent: 0.0,
            volume: None,
            market_cap: cap,
            pe_ratio: pe,
            dividend_yield: dividend,
            sector,
            industry: None,
            fifty_two_week_high: None,
            fifty_two_week_low: None,
            average_volume: None,
            fetched_at: Utc::now(),
        }
    }

    fn raw(pe: f64, sector: &str) -> RawQuote {
        RawQuote {
            current_price: Some(100.0),
            trailing_pe: Some(pe),
            sector: Some(sector.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_filter_validation() {
        assert!(ScreenFilters::default().validate().is_ok());
        let bad = [
            ScreenFilters {
                min_pe: Some(-1.0),
                ..Default::default()
            },
            ScreenFilters {
                min_pe: Some(30.0),
                max_pe: Some(10.0),
                ..Default::default()
            },
            ScreenFilters {
                min_market_cap: Some(2e12),
                max_market_cap: Some(1e9),
                ..Default::default()
            },
            ScreenFilters {
                min_dividend_yield: Some(f64::NAN),
                ..Default::default()
            },
        ];
        for filters in bad {
            assert!(matches!(
                filters.validate(),
                Err(MarketError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_missing_fields_fail_active_predicates() {
        let filters = ScreenFilters {
            min_dividend_yield: Some(0.01),
            ..Default::default()
        };
        assert!(!filters.matches(
            &quote(Some(15.0), None, None, Sector::Energy),
            Sector::Energy
        ));
        assert!(filters.matches(
            &quote(None, Some(0.03), None, Sector::Energy),
            Sector::Energy
        ));
        // inactive predicates ignore missing fields
        let bare = quote(None, None, None, Sector::Unknown);
        assert!(ScreenFilters::default().matches(&bare, Sector::Unknown));
    }

    #[test]
    fn test_unknown_sector_uses_universe_tag() {
        let filters = ScreenFilters {
            sector: Some(Sector::Financial),
            ..Default::default()
        };
        let untagged = quote(None, None, None, Sector::Unknown);
        assert!(filters.matches(&untagged, Sector::Financial));
        assert!(!filters.matches(&untagged, Sector::Energy));
        let tech = quote(None, None, None, Sector::Technology);
        assert!(!filters.matches(&tech, Sector::Financial));
    }

    #[tokio::test]
    async fn test_screen_applies_all_predicates_and_skips_failures() {
        let provider = MockProvider::default()
            .with_quote("AAA", raw(15.0, "Technology"))
            .with_quote("BBB", raw(25.0, "Technology"))
            .with_quote("CCC", raw(12.0, "Healthcare"))
            .with_quote("DDD", raw(10.0, "Technology"))
            .failing("EEE");
        let market = Arc::new(MarketData::new(Arc::new(provider), &CacheConfig::default()));
        let universe = ["AAA", "BBB", "CCC", "DDD", "EEE", "FFF"]
            .iter()
            .map(|t| (t.to_string(), Sector::Technology))
            .collect();
        let screener = Screener::with_universe(market, universe);

        let filters = ScreenFilters {
            min_pe: Some(10.0),
            max_pe: Some(20.0),
            sector: Some(Sector::Technology),
            ..Default::default()
        };
        let calls = AtomicUsize::new(0);
        let results = screener
            .screen_with_progress(&filters, &|| {
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        let tickers: Vec<&str> = results.iter().map(|q| q.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AAA", "DDD"]);
        assert!(results.len() <= screener.universe_size());
        assert_eq!(calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_screen_labels_untagged_quotes_with_universe_sector() {
        let untagged = RawQuote {
            current_price: Some(50.0),
            ..Default::default()
        };
        let provider = MockProvider::default()
            .with_quote("AAA", untagged)
            .with_quote("BBB", raw(12.0, "Energy"));
        let market = Arc::new(MarketData::new(Arc::new(provider), &CacheConfig::default()));
        let universe = vec![
            ("AAA".to_string(), Sector::Technology),
            ("BBB".to_string(), Sector::Technology),
        ];
        let screener = Screener::with_universe(market, universe);

        let filters = ScreenFilters {
            sector: Some(Sector::Technology),
            ..Default::default()
        };
        let results = screener.screen(&filters).await.unwrap();

        let sectors: Vec<(&str, Sector)> = results
            .iter()
            .map(|q| (q.ticker.as_str(), q.sector))
            .collect();
        assert_eq!(sectors, vec![("AAA", Sector::Technology)]);
    }

    #[tokio::test]
    async fn test_screen_rejects_invalid_filters() {
        let market = Arc::new(MarketData::new(
            Arc::new(MockProvider::default()),
            &CacheConfig::default(),
        ));
        let screener = Screener::new(market);
        let filters = ScreenFilters {
            max_pe: Some(-3.0),
            ..Default::default()
        };
        assert!(matches!(
            screener.screen(&filters).await,
            Err(MarketError::Validation(_))
        ));
    }
}
