use crate::core::error::{MarketError, MarketResult};
use crate::core::quote::{MarketDataProvider, RawQuote};
use crate::providers::util::with_retry;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, instrument};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const QUOTE_MODULES: &str = "price,summaryDetail,financialData,assetProfile";

pub struct YahooFinanceProvider {
    base_url: String,
    timeout: std::time::Duration,
    retries: usize,
}

impl YahooFinanceProvider {
    pub fn new(base_url: &str, timeout: std::time::Duration) -> Self {
        YahooFinanceProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            retries: 3,
        }
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    async fn get(&self, url: &str) -> MarketResult<reqwest::Response> {
        debug!("Requesting market data from {}", url);
        let client = reqwest::Client::builder()
            .user_agent("stockdash/0.1")
            .timeout(self.timeout)
            .build()?;

        let response = with_retry(|| async { client.get(url).send().await }, self.retries, 500)
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MarketError::Upstream(format!(
                        "Request timed out after {}s: {url}",
                        self.timeout.as_secs()
                    ))
                } else {
                    MarketError::Upstream(format!("Request error: {e} for URL: {url}"))
                }
            })?;

        debug!(status = %response.status(), "Received Yahoo response");
        Ok(response)
    }
}

/// Yahoo wraps most numbers as `{"raw": 1.23, "fmt": "1.23"}`, or `{}` when absent.
#[derive(Deserialize, Debug, Default, Clone, Copy)]
struct RawValue {
    raw: Option<f64>,
}

fn raw(value: &Option<RawValue>) -> Option<f64> {
    value.and_then(|v| v.raw).filter(|v| v.is_finite())
}

fn raw_u64(value: &Option<RawValue>) -> Option<u64> {
    raw(value).filter(|v| *v >= 0.0).map(|v| v as u64)
}

#[derive(Deserialize, Debug)]
struct YahooErrorBody {
    code: String,
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: QuoteSummary,
}

#[derive(Deserialize, Debug)]
struct QuoteSummary {
    result: Option<Vec<QuoteSummaryItem>>,
    error: Option<YahooErrorBody>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryItem {
    price: Option<PriceModule>,
    summary_detail: Option<SummaryDetail>,
    financial_data: Option<FinancialData>,
    asset_profile: Option<AssetProfile>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    regular_market_price: Option<RawValue>,
    regular_market_previous_close: Option<RawValue>,
    regular_market_change: Option<RawValue>,
    // fraction, e.g. 0.0123
    regular_market_change_percent: Option<RawValue>,
    regular_market_volume: Option<RawValue>,
    market_cap: Option<RawValue>,
    long_name: Option<String>,
    short_name: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    previous_close: Option<RawValue>,
    #[serde(rename = "trailingPE")]
    trailing_pe: Option<RawValue>,
    #[serde(rename = "forwardPE")]
    forward_pe: Option<RawValue>,
    dividend_yield: Option<RawValue>,
    volume: Option<RawValue>,
    average_volume: Option<RawValue>,
    market_cap: Option<RawValue>,
    fifty_two_week_high: Option<RawValue>,
    fifty_two_week_low: Option<RawValue>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct FinancialData {
    current_price: Option<RawValue>,
}

#[derive(Deserialize, Debug, Default)]
struct AssetProfile {
    sector: Option<String>,
    industry: Option<String>,
}

impl From<QuoteSummaryItem> for RawQuote {
    fn from(item: QuoteSummaryItem) -> Self {
        let price = item.price.unwrap_or_default();
        let detail = item.summary_detail.unwrap_or_default();
        let financial = item.financial_data.unwrap_or_default();
        let profile = item.asset_profile.unwrap_or_default();

        RawQuote {
            current_price: raw(&financial.current_price),
            regular_market_price: raw(&price.regular_market_price),
            previous_close: raw(&detail.previous_close)
                .or_else(|| raw(&price.regular_market_previous_close)),
            change: raw(&price.regular_market_change),
            change_percent: raw(&price.regular_market_change_percent).map(|p| p * 100.0),
            volume: raw_u64(&price.regular_market_volume).or_else(|| raw_u64(&detail.volume)),
            market_cap: raw(&price.market_cap).or_else(|| raw(&detail.market_cap)),
            trailing_pe: raw(&detail.trailing_pe),
            forward_pe: raw(&detail.forward_pe),
            dividend_yield: raw(&detail.dividend_yield),
            sector: profile.sector,
            industry: profile.industry,
            long_name: price.long_name,
            short_name: price.short_name,
            fifty_two_week_high: raw(&detail.fifty_two_week_high),
            fifty_two_week_low: raw(&detail.fifty_two_week_low),
            average_volume: raw_u64(&detail.average_volume),
        }
    }
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
    error: Option<YahooErrorBody>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    timestamp: Option<Vec<i64>>,
    indicators: Option<Indicators>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<ChartQuote>,
}

#[derive(Deserialize, Debug)]
struct ChartQuote {
    close: Option<Vec<Option<f64>>>,
}

fn extract_daily_closes(item: &ChartItem) -> Vec<(NaiveDate, f64)> {
    let (Some(timestamps), Some(closes)) = (
        item.timestamp.as_ref(),
        item.indicators
            .as_ref()
            .and_then(|inds| inds.quote.first())
            .and_then(|q| q.close.as_ref()),
    ) else {
        return Vec::new();
    };

    timestamps
        .iter()
        .zip(closes.iter())
        .filter_map(|(ts, close)| {
            let date = Utc.timestamp_opt(*ts, 0).single()?.date_naive();
            close.map(|c| (date, c))
        })
        .collect()
}

fn not_found_or(error: Option<YahooErrorBody>, ticker: &str, fallback: String) -> MarketError {
    match error {
        Some(e) if e.code.eq_ignore_ascii_case("Not Found") => {
            MarketError::NotFound(ticker.to_string())
        }
        Some(e) => MarketError::Upstream(format!(
            "{}: {} for ticker: {ticker}",
            e.code,
            e.description.unwrap_or_default()
        )),
        None => MarketError::Upstream(fallback),
    }
}

#[async_trait]
impl MarketDataProvider for YahooFinanceProvider {
    #[instrument(name = "YahooQuoteFetch", skip(self), fields(ticker = %ticker))]
    async fn fetch_quote(&self, ticker: &str) -> MarketResult<RawQuote> {
        let url = format!(
            "{}/v10/finance/quoteSummary/{}?modules={}",
            self.base_url, ticker, QUOTE_MODULES
        );
        let response = self.get(&url).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(MarketError::NotFound(ticker.to_string()));
        }
        if !status.is_success() {
            return Err(MarketError::Upstream(format!(
                "HTTP error: {status} for ticker: {ticker}"
            )));
        }

        let text = response.text().await?;
        let data: QuoteSummaryResponse = serde_json::from_str(&text).map_err(|e| {
            MarketError::Upstream(format!(
                "Failed to parse quote response for {ticker}: {e}"
            ))
        })?;

        let summary = data.quote_summary;
        match summary.result.and_then(|items| items.into_iter().next()) {
            Some(item) => Ok(RawQuote::from(item)),
            None => Err(match summary.error {
                None => MarketError::NotFound(ticker.to_string()),
                error => not_found_or(error, ticker, String::new()),
            }),
        }
    }

    #[instrument(name = "YahooHistoryFetch", skip(self), fields(ticker = %ticker))]
    async fn fetch_history(
        &self,
        ticker: &str,
        lookback: Duration,
    ) -> MarketResult<Vec<(NaiveDate, f64)>> {
        let now = Utc::now();
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&period1={}&period2={}",
            self.base_url,
            ticker,
            (now - lookback).timestamp(),
            now.timestamp()
        );
        let response = self.get(&url).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(MarketError::NotFound(ticker.to_string()));
        }
        if !status.is_success() {
            return Err(MarketError::Upstream(format!(
                "HTTP error: {status} for ticker: {ticker}"
            )));
        }

        let text = response.text().await?;
        let data: YahooChartResponse = serde_json::from_str(&text).map_err(|e| {
            MarketError::Upstream(format!(
                "Failed to parse history response for {ticker}: {e}"
            ))
        })?;

        let chart = data.chart;
        let item = match chart.result.and_then(|items| items.into_iter().next()) {
            Some(item) => item,
            None => {
                return Err(not_found_or(
                    chart.error,
                    ticker,
                    format!("No history data found for ticker: {ticker}"),
                ));
            }
        };

        let closes = extract_daily_closes(&item);
        debug!("Parsed {} daily closes for {}", closes.len(), ticker);
        Ok(closes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

    async fn create_quote_mock_server(
        ticker: &str,
        mock_response: &str,
        status_code: u16,
    ) -> MockServer {
        let mock_server = MockServer::start().await;
        let request_path = format!("/v10/finance/quoteSummary/{ticker}");

        Mock::given(method("GET"))
            .and(path(request_path))
            .and(query_param("modules", QUOTE_MODULES))
            .respond_with(ResponseTemplate::new(status_code).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        mock_server
    }

    async fn create_chart_mock_server(ticker: &str, mock_response: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        let request_path = format!("/v8/finance/chart/{ticker}");

        Mock::given(method("GET"))
            .and(path(request_path))
            .and(query_param("interval", "1d"))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;

        mock_server
    }

    fn provider(server: &MockServer) -> YahooFinanceProvider {
        YahooFinanceProvider::new(&server.uri(), TIMEOUT).with_retries(0)
    }

    #[tokio::test]
    async fn test_successful_quote_fetch() {
        let mock_response = r#"{
            "quoteSummary": {
                "result": [{
                    "price": {
                        "regularMarketPrice": {"raw": 189.5, "fmt": "189.50"},
                        "regularMarketChange": {"raw": 2.5, "fmt": "2.50"},
                        "regularMarketChangePercent": {"raw": 0.0134, "fmt": "1.34%"},
                        "regularMarketVolume": {"raw": 51234567, "fmt": "51.23M"},
                        "marketCap": {"raw": 2950000000000, "fmt": "2.95T"},
                        "longName": "Apple Inc.",
                        "shortName": "Apple"
                    },
                    "summaryDetail": {
                        "previousClose": {"raw": 187.0, "fmt": "187.00"},
                        "trailingPE": {"raw": 29.4, "fmt": "29.40"},
                        "forwardPE": {},
                        "dividendYield": {"raw": 0.0051, "fmt": "0.51%"},
                        "averageVolume": {"raw": 60000000, "fmt": "60M"},
                        "fiftyTwoWeekHigh": {"raw": 199.6, "fmt": "199.60"},
                        "fiftyTwoWeekLow": {"raw": 164.1, "fmt": "164.10"}
                    },
                    "financialData": {
                        "currentPrice": {"raw": 189.6, "fmt": "189.60"}
                    },
                    "assetProfile": {
                        "sector": "Technology",
                        "industry": "Consumer Electronics"
                    }
                }],
                "error": null
            }
        }"#;

        let mock_server = create_quote_mock_server("AAPL", mock_response, 200).await;
        let raw = provider(&mock_server).fetch_quote("AAPL").await.unwrap();

        assert_eq!(raw.current_price, Some(189.6));
        assert_eq!(raw.regular_market_price, Some(189.5));
        assert_eq!(raw.previous_close, Some(187.0));
        assert_eq!(raw.change, Some(2.5));
        assert!((raw.change_percent.unwrap() - 1.34).abs() < 1e-9);
        assert_eq!(raw.volume, Some(51_234_567));
        assert_eq!(raw.market_cap, Some(2.95e12));
        assert_eq!(raw.trailing_pe, Some(29.4));
        assert_eq!(raw.forward_pe, None);
        assert_eq!(raw.dividend_yield, Some(0.0051));
        assert_eq!(raw.sector.as_deref(), Some("Technology"));
        assert_eq!(raw.long_name.as_deref(), Some("Apple Inc."));
        assert_eq!(raw.average_volume, Some(60_000_000));
    }

    #[tokio::test]
    async fn test_quote_with_missing_modules() {
        let mock_response = r#"{
            "quoteSummary": {
                "result": [{
                    "price": {"regularMarketPrice": {}}
                }],
                "error": null
            }
        }"#;

        let mock_server = create_quote_mock_server("XYZ", mock_response, 200).await;
        let raw = provider(&mock_server).fetch_quote("XYZ").await.unwrap();
        assert_eq!(raw, RawQuote::default());
    }

    #[tokio::test]
    async fn test_quote_not_found() {
        let mock_response = r#"{
            "quoteSummary": {
                "result": null,
                "error": {
                    "code": "Not Found",
                    "description": "Quote not found for ticker symbol: ZZZZ"
                }
            }
        }"#;

        let mock_server = create_quote_mock_server("ZZZZ", mock_response, 404).await;
        let result = provider(&mock_server).fetch_quote("ZZZZ").await;
        assert_eq!(result, Err(MarketError::NotFound("ZZZZ".to_string())));
    }

    #[tokio::test]
    async fn test_quote_empty_result_is_not_found() {
        let mock_response = r#"{"quoteSummary": {"result": [], "error": null}}"#;
        let mock_server = create_quote_mock_server("ZZZZ", mock_response, 200).await;
        let result = provider(&mock_server).fetch_quote("ZZZZ").await;
        assert_eq!(result, Err(MarketError::NotFound("ZZZZ".to_string())));
    }

    #[tokio::test]
    async fn test_quote_server_error() {
        let mock_server = create_quote_mock_server("AAPL", "Server Error", 500).await;
        let result = provider(&mock_server).fetch_quote("AAPL").await;
        assert_eq!(
            result,
            Err(MarketError::Upstream(
                "HTTP error: 500 Internal Server Error for ticker: AAPL".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_quote_malformed_response() {
        let mock_response = r#"{"quoteSummaries": []}"#;
        let mock_server = create_quote_mock_server("AAPL", mock_response, 200).await;
        let result = provider(&mock_server).fetch_quote("AAPL").await;

        match result {
            Err(MarketError::Upstream(msg)) => {
                assert!(msg.contains("Failed to parse quote response for AAPL"))
            }
            other => panic!("Expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_quote_timeout_is_upstream() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v10/finance/quoteSummary/SLOW"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(std::time::Duration::from_millis(500))
                    .set_body_string("{}"),
            )
            .mount(&mock_server)
            .await;

        let provider =
            YahooFinanceProvider::new(&mock_server.uri(), std::time::Duration::from_millis(50))
                .with_retries(0);
        let result = provider.fetch_quote("SLOW").await;
        assert!(matches!(result, Err(MarketError::Upstream(_))));
    }

    #[tokio::test]
    async fn test_successful_history_fetch() {
        let mock_response = r#"{
            "chart": {
                "result": [{
                    "meta": {"currency": "USD", "regularMarketPrice": 103.0},
                    "timestamp": [1704205800, 1704292200, 1704378600, 1704465000],
                    "indicators": {
                        "quote": [{
                            "close": [100.0, null, 102.5, 103.0]
                        }]
                    }
                }],
                "error": null
            }
        }"#;

        let mock_server = create_chart_mock_server("AAPL", mock_response).await;
        let closes = provider(&mock_server)
            .fetch_history("AAPL", Duration::days(30))
            .await
            .unwrap();

        assert_eq!(closes.len(), 3);
        assert_eq!(
            closes[0],
            (NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 100.0)
        );
        assert_eq!(
            closes[2],
            (NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(), 103.0)
        );
    }

    #[tokio::test]
    async fn test_history_without_bars_is_empty() {
        let mock_response = r#"{
            "chart": {
                "result": [{"meta": {"currency": "USD"}}],
                "error": null
            }
        }"#;

        let mock_server = create_chart_mock_server("NEW", mock_response).await;
        let closes = provider(&mock_server)
            .fetch_history("NEW", Duration::days(30))
            .await
            .unwrap();
        assert!(closes.is_empty());
    }

    #[tokio::test]
    async fn test_history_not_found() {
        let mock_response = r#"{
            "chart": {
                "result": null,
                "error": {
                    "code": "Not Found",
                    "description": "No data found, symbol may be delisted"
                }
            }
        }"#;

        let mock_server = create_chart_mock_server("GONE", mock_response).await;
        let result = provider(&mock_server)
            .fetch_history("GONE", Duration::days(30))
            .await;
        assert_eq!(result, Err(MarketError::NotFound("GONE".to_string())));
    }
}
