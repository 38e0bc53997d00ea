use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use valuation_core::{MarketDataProvider, Quote, TrackerError};

const BASE_URL: &str = "https://api.polygon.io";

/// Quarters requested per financials call; enough for several rolling TTM windows.
const FINANCIALS_LIMIT: u32 = 12;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    async fn acquire(&self) {
        loop {
            let mut ts = self.timestamps.lock().await;
            let now = Instant::now();

            // Remove timestamps outside the window
            while let Some(&front) = ts.front() {
                if now.duration_since(front) >= self.window {
                    ts.pop_front();
                } else {
                    break;
                }
            }

            if ts.len() < self.max_requests {
                ts.push_back(now);
                return;
            }

            // Wait until the oldest request falls out of the window
            let sleep_dur = match ts.front() {
                Some(&oldest) => (oldest + self.window).saturating_duration_since(now) + Duration::from_millis(50),
                None => Duration::from_millis(50),
            };
            drop(ts);
            tracing::debug!("Rate limiter: waiting {:.1}s for Polygon API slot", sleep_dur.as_secs_f64());
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
}

impl PolygonClient {
    pub fn new(api_key: String) -> Self {
        // Default 500 req/min for Starter plan. Free tier users should set POLYGON_RATE_LIMIT=5.
        let rate_limit: usize = std::env::var("POLYGON_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);
        Self::with_rate_limit(api_key, rate_limit)
    }

    pub fn with_rate_limit(api_key: String, requests_per_minute: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url: BASE_URL.to_string(),
            client,
            rate_limiter: RateLimiter::new(requests_per_minute, Duration::from_secs(60)),
        }
    }

    /// Point the client at another host (a proxy or a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Send a request with rate limiting and automatic 429 retry.
    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response, TrackerError> {
        let request = builder.build().map_err(unavailable)?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| TrackerError::ProviderUnavailable("Cannot clone request".to_string()))?;
            let response = self.client.execute(req_clone).await.map_err(unavailable)?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!("Polygon 429 rate limited, waiting {}s before retry {}/3", wait_secs, attempt + 1);
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(TrackerError::ProviderUnavailable(
            "Rate limited by Polygon after 3 retries".to_string(),
        ))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        label: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, TrackerError> {
        let response = self
            .send_request(
                self.client
                    .get(url)
                    .query(query)
                    .query(&[("apiKey", self.api_key.as_str())]),
            )
            .await?;

        if !response.status().is_success() {
            return Err(TrackerError::ProviderUnavailable(format!(
                "{} HTTP {}: {}",
                label,
                response.status(),
                response.text().await.unwrap_or_default()
            )));
        }

        response.json().await.map_err(unavailable)
    }

    /// Get ticker details (name, currency, market cap, shares)
    pub async fn get_ticker_details(&self, symbol: &str) -> Result<TickerDetails, TrackerError> {
        let url = format!("{}/v3/reference/tickers/{}", self.base_url, symbol);
        let details: TickerDetailsResponse = self.get_json("Ticker details", &url, &[]).await?;
        Ok(details.results)
    }

    /// Get the current market snapshot for a symbol
    pub async fn get_snapshot(&self, symbol: &str) -> Result<SnapshotTicker, TrackerError> {
        let url = format!(
            "{}/v2/snapshot/locale/us/markets/stocks/tickers/{}",
            self.base_url, symbol
        );
        let snapshot: SnapshotResponse = self.get_json("Snapshot", &url, &[]).await?;
        Ok(snapshot.ticker)
    }

    /// Get quarterly financial statements, newest first
    pub async fn get_financials(&self, symbol: &str) -> Result<Vec<QuarterlyFinancials>, TrackerError> {
        let url = format!("{}/vX/reference/financials", self.base_url);
        let limit = FINANCIALS_LIMIT.to_string();
        let financials: FinancialsResponse = self
            .get_json(
                "Financials",
                &url,
                &[
                    ("ticker", symbol),
                    ("timeframe", "quarterly"),
                    ("order", "desc"),
                    ("sort", "period_of_report_date"),
                    ("limit", limit.as_str()),
                ],
            )
            .await?;

        Ok(financials.results.into_iter().map(QuarterlyFinancials::from).collect())
    }
}

fn unavailable(e: reqwest::Error) -> TrackerError {
    TrackerError::ProviderUnavailable(e.to_string())
}

fn to_decimal(value: Option<f64>) -> Option<Decimal> {
    value.filter(|v| v.is_finite()).and_then(Decimal::from_f64)
}

/// Last trade, else today's close, else the previous close.
pub fn last_price(snapshot: &SnapshotTicker) -> Option<f64> {
    let day_close = |day: &Option<SnapshotDay>| day.as_ref().and_then(|d| d.c).filter(|c| *c > 0.0);

    snapshot
        .last_trade
        .as_ref()
        .and_then(|t| t.p)
        .filter(|p| *p > 0.0)
        .or_else(|| day_close(&snapshot.day))
        .or_else(|| day_close(&snapshot.prev_day))
}

/// Merge reference details and a snapshot into a quote. Either side may be missing.
pub fn build_quote(details: Option<&TickerDetails>, snapshot: Option<&SnapshotTicker>) -> Quote {
    Quote {
        name: details.map(|d| d.name.clone()).filter(|n| !n.is_empty()),
        price: to_decimal(snapshot.and_then(last_price)),
        currency: details
            .and_then(|d| d.currency_name.clone())
            .map(|c| c.to_uppercase()),
        shares_outstanding: to_decimal(
            details.and_then(|d| d.weighted_shares_outstanding.or(d.share_class_shares_outstanding)),
        ),
        market_cap: to_decimal(details.and_then(|d| d.market_cap)),
    }
}

/// Revenue per quarter, newest first, cut at the first quarter that lacks a figure
/// so that every four-quarter window stays contiguous.
pub fn quarterly_revenues(financials: &[QuarterlyFinancials]) -> Vec<Decimal> {
    financials
        .iter()
        .filter(|f| f.fiscal_period.starts_with('Q'))
        .map(|f| to_decimal(f.revenue))
        .take_while(Option::is_some)
        .flatten()
        .collect()
}

#[async_trait]
impl MarketDataProvider for PolygonClient {
    async fn get_quote(&self, symbol: &str) -> Result<Quote, TrackerError> {
        let (details, snapshot) = tokio::join!(self.get_ticker_details(symbol), self.get_snapshot(symbol));

        if let (Err(e), Err(_)) = (&details, &snapshot) {
            return Err(e.clone());
        }
        if let Err(e) = &details {
            tracing::warn!("{}: ticker details unavailable: {}", symbol, e);
        }
        if let Err(e) = &snapshot {
            tracing::warn!("{}: snapshot unavailable: {}", symbol, e);
        }

        Ok(build_quote(details.as_ref().ok(), snapshot.as_ref().ok()))
    }

    async fn get_quarterly_revenue(&self, symbol: &str) -> Result<Vec<Decimal>, TrackerError> {
        let financials = self.get_financials(symbol).await?;
        let revenues = quarterly_revenues(&financials);
        tracing::debug!("{}: {} of {} quarters carry revenue", symbol, revenues.len(), financials.len());
        Ok(revenues)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuarterlyFinancials {
    pub fiscal_period: String,
    pub fiscal_year: String,
    pub revenue: Option<f64>,
}

impl From<FinancialResult> for QuarterlyFinancials {
    fn from(r: FinancialResult) -> Self {
        Self {
            fiscal_period: r.fiscal_period,
            fiscal_year: r.fiscal_year,
            revenue: r
                .financials
                .income_statement
                .get("revenues")
                .and_then(|v| v.get("value"))
                .and_then(|v| v.as_f64()),
        }
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct FinancialsResponse {
    #[serde(default)]
    results: Vec<FinancialResult>,
}

#[derive(Debug, Deserialize)]
struct FinancialResult {
    #[serde(default)]
    fiscal_period: String,
    #[serde(default)]
    fiscal_year: String,
    financials: FinancialStatements,
}

#[derive(Debug, Deserialize)]
struct FinancialStatements {
    #[serde(default)]
    income_statement: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    results: TickerDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickerDetails {
    pub ticker: String,
    #[serde(default)]
    pub name: String,
    pub currency_name: Option<String>,
    pub market_cap: Option<f64>,
    pub share_class_shares_outstanding: Option<f64>,
    pub weighted_shares_outstanding: Option<f64>,
}

// Snapshot types
#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    ticker: SnapshotTicker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotTicker {
    pub day: Option<SnapshotDay>,
    #[serde(rename = "lastTrade")]
    pub last_trade: Option<SnapshotLastTrade>,
    #[serde(rename = "prevDay")]
    pub prev_day: Option<SnapshotDay>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDay {
    pub c: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotLastTrade {
    pub p: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn financials_fixture() -> Vec<QuarterlyFinancials> {
        let body = r#"{
            "results": [
                {"fiscal_period": "Q2", "fiscal_year": "2025", "financials": {"income_statement": {"revenues": {"value": 1200.0}}}},
                {"fiscal_period": "Q1", "fiscal_year": "2025", "financials": {"income_statement": {"revenues": {"value": 1100.0}}}},
                {"fiscal_period": "FY", "fiscal_year": "2024", "financials": {"income_statement": {"revenues": {"value": 4000.0}}}},
                {"fiscal_period": "Q4", "fiscal_year": "2024", "financials": {"income_statement": {"revenues": {"value": 1000.5}}}},
                {"fiscal_period": "Q3", "fiscal_year": "2024", "financials": {"income_statement": {"revenues": {"value": 950.0}}}},
                {"fiscal_period": "Q2", "fiscal_year": "2024", "financials": {"income_statement": {}}},
                {"fiscal_period": "Q1", "fiscal_year": "2024", "financials": {"income_statement": {"revenues": {"value": 900.0}}}}
            ]
        }"#;
        let parsed: FinancialsResponse = serde_json::from_str(body).unwrap();
        parsed.results.into_iter().map(QuarterlyFinancials::from).collect()
    }

    #[test]
    fn test_quarterly_revenues_skip_annual_and_stop_at_gap() {
        let revenues = quarterly_revenues(&financials_fixture());
        assert_eq!(revenues, vec![dec!(1200), dec!(1100), dec!(1000.5), dec!(950)]);
    }

    #[test]
    fn test_last_price_fallbacks() {
        let snapshot: SnapshotTicker = serde_json::from_str(
            r#"{"day": {"c": 0.0}, "lastTrade": {"p": 187.25}, "prevDay": {"c": 185.0}}"#,
        )
        .unwrap();
        assert_eq!(last_price(&snapshot), Some(187.25));

        let snapshot: SnapshotTicker =
            serde_json::from_str(r#"{"day": {"c": 0.0}, "prevDay": {"c": 185.0}}"#).unwrap();
        assert_eq!(last_price(&snapshot), Some(185.0));

        let snapshot: SnapshotTicker = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(last_price(&snapshot), None);
    }

    #[test]
    fn test_build_quote() {
        let details: TickerDetailsResponse = serde_json::from_str(
            r#"{"results": {
                "ticker": "AAPL",
                "name": "Apple Inc.",
                "currency_name": "usd",
                "market_cap": 3000000000000.0,
                "share_class_shares_outstanding": 15100000000.0,
                "weighted_shares_outstanding": 15000000000.0
            }}"#,
        )
        .unwrap();
        let snapshot: SnapshotTicker = serde_json::from_str(r#"{"lastTrade": {"p": 200.0}}"#).unwrap();

        let quote = build_quote(Some(&details.results), Some(&snapshot));
        assert_eq!(quote.name.as_deref(), Some("Apple Inc."));
        assert_eq!(quote.currency.as_deref(), Some("USD"));
        assert_eq!(quote.price, Some(dec!(200)));
        assert_eq!(quote.shares_outstanding, Some(dec!(15000000000)));
        assert_eq!(quote.market_cap, Some(dec!(3000000000000)));
    }

    #[test]
    fn test_build_quote_with_nothing() {
        assert_eq!(build_quote(None, None), Quote::default());
    }

    #[tokio::test]
    #[ignore] // Only run with a valid POLYGON_API_KEY
    async fn test_live_quote() {
        let client = PolygonClient::new(std::env::var("POLYGON_API_KEY").unwrap());
        let quote = client.get_quote("AAPL").await.unwrap();
        assert!(quote.price.is_some());

        let revenue = client.get_quarterly_revenue("AAPL").await.unwrap();
        assert!(revenue.len() >= 4);
    }
}
