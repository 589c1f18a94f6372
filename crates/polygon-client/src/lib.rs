use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use forecast_core::{
    Fundamentals, FundamentalsProvider, NewsArticle, NewsProvider, PickError, PriceBar,
    PriceHistoryProvider, QuoteProvider,
};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

mod throttle;

use throttle::RateLimiter;
pub use throttle::RetryPolicy;

const BASE_URL: &str = "https://api.polygon.io";

/// Connection settings for the Polygon REST API
#[derive(Debug, Clone)]
pub struct PolygonConfig {
    pub base_url: String,
    /// Requests per minute
    pub rate_limit: usize,
    /// Per-call timeout
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for PolygonConfig {
    fn default() -> Self {
        // Default 500 req/min for Starter plan. Free tier users should set POLYGON_RATE_LIMIT=5.
        let rate_limit: usize = std::env::var("POLYGON_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);

        Self {
            base_url: BASE_URL.to_string(),
            rate_limit,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone)]
pub struct PolygonClient {
    api_key: String,
    base_url: String,
    client: Client,
    rate_limiter: RateLimiter,
    retry: RetryPolicy,
}

impl PolygonClient {
    pub fn new(api_key: String) -> Self {
        Self::with_config(api_key, PolygonConfig::default())
    }

    pub fn with_config(api_key: String, config: PolygonConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_key,
            base_url: config.base_url,
            client,
            rate_limiter: RateLimiter::new(config.rate_limit, Duration::from_secs(60)),
            retry: config.retry,
        }
    }

    /// Send a request with rate limiting and bounded retries on 429, 5xx and transport errors.
    async fn send_request(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, PickError> {
        let request = builder.build().map_err(|e| PickError::Upstream(e.to_string()))?;
        let mut retries = 0u32;

        loop {
            self.rate_limiter.acquire().await;
            let req_clone = request
                .try_clone()
                .ok_or_else(|| PickError::Upstream("Cannot clone request".to_string()))?;

            let failure = match self.client.execute(req_clone).await {
                Ok(response) => {
                    let status = response.status();
                    if !RetryPolicy::is_retryable(status) {
                        return Ok(response);
                    }
                    PickError::Upstream(format!("HTTP {}", status))
                }
                Err(e) if e.is_timeout() => PickError::Timeout(e.to_string()),
                Err(e) if e.is_connect() || e.is_request() => PickError::Upstream(e.to_string()),
                Err(e) => return Err(PickError::Upstream(e.to_string())),
            };

            retries += 1;
            if retries >= self.retry.max_attempts {
                tracing::warn!("Polygon request failed after {} attempts: {}", retries, failure);
                return Err(failure);
            }

            let delay = self.retry.delay_for(retries);
            tracing::warn!(
                "Polygon request failed ({}), retrying in {}ms ({}/{})",
                failure,
                delay.as_millis(),
                retries,
                self.retry.max_attempts - 1
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn error_from(response: reqwest::Response) -> PickError {
        PickError::Upstream(format!(
            "HTTP {}: {}",
            response.status(),
            response.text().await.unwrap_or_default()
        ))
    }

    /// Get daily aggregates (bars) for a symbol
    pub async fn get_daily_bars(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>, PickError> {
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.base_url,
            symbol,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.as_str()),
                ("adjusted", "true"),
                ("sort", "asc"),
                ("limit", "50000"),
            ]))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let agg_response: AggregateResponse = response
            .json()
            .await
            .map_err(|e| PickError::Upstream(e.to_string()))?;

        Ok(agg_response.into_bars())
    }

    /// Get news articles for a symbol
    pub async fn get_news(&self, symbol: &str, limit: u32) -> Result<Vec<NewsArticle>, PickError> {
        let url = format!("{}/v2/reference/news", self.base_url);

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("apiKey", self.api_key.clone()),
                ("ticker", symbol.to_string()),
                ("limit", limit.to_string()),
                ("order", "desc".to_string()),
            ]))
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let news_response: NewsResponse = response
            .json()
            .await
            .map_err(|e| PickError::Upstream(e.to_string()))?;

        Ok(news_response.into_articles())
    }

    /// Basic EPS for the most recent reported quarters, newest first
    pub async fn get_quarterly_eps(
        &self,
        symbol: &str,
        quarters: u32,
    ) -> Result<Vec<f64>, PickError> {
        let url = format!("{}/vX/reference/financials", self.base_url);
        let limit = quarters.to_string();

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("ticker", symbol),
                ("timeframe", "quarterly"),
                ("apiKey", self.api_key.as_str()),
                ("limit", limit.as_str()),
                ("order", "desc"),
            ]))
            .await?;

        if !response.status().is_success() {
            if response.status().as_u16() == 403 || response.status().as_u16() == 401 {
                return Ok(Vec::new());
            }
            return Err(Self::error_from(response).await);
        }

        let fin_response: FinancialsResponse = response
            .json()
            .await
            .map_err(|e| PickError::Upstream(e.to_string()))?;

        Ok(fin_response.basic_eps())
    }

    /// Get dividend history for a symbol, newest first
    pub async fn get_dividends(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<DividendInfo>, PickError> {
        let url = format!("{}/v3/reference/dividends", self.base_url);
        let limit = limit.to_string();

        let response = self
            .send_request(self.client.get(&url).query(&[
                ("ticker", symbol),
                ("apiKey", self.api_key.as_str()),
                ("limit", limit.as_str()),
                ("order", "desc"),
            ]))
            .await?;

        if !response.status().is_success() {
            if response.status().as_u16() == 403 || response.status().as_u16() == 401 {
                return Ok(Vec::new());
            }
            return Err(Self::error_from(response).await);
        }

        let div_response: DividendResponse = response
            .json()
            .await
            .map_err(|e| PickError::Upstream(e.to_string()))?;

        Ok(div_response.results)
    }

    /// Get snapshot for a ticker (near-real-time last trade, today's bar, prev day)
    pub async fn get_snapshot(&self, symbol: &str) -> Result<SnapshotTicker, PickError> {
        let url = format!(
            "{}/v2/snapshot/locale/us/markets/stocks/tickers/{}",
            self.base_url, symbol
        );

        let response = self
            .send_request(self.client.get(&url).query(&[("apiKey", &self.api_key)]))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(PickError::MissingData(format!("no snapshot for {}", symbol)));
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response).await);
        }

        let snap_response: SnapshotResponse = response
            .json()
            .await
            .map_err(|e| PickError::Upstream(e.to_string()))?;

        Ok(snap_response.ticker)
    }
}

#[async_trait]
impl PriceHistoryProvider for PolygonClient {
    async fn daily_bars(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>, PickError> {
        self.get_daily_bars(ticker, from, to).await
    }
}

#[async_trait]
impl NewsProvider for PolygonClient {
    async fn recent_news(&self, ticker: &str, limit: u32) -> Result<Vec<NewsArticle>, PickError> {
        self.get_news(ticker, limit).await
    }
}

#[async_trait]
impl FundamentalsProvider for PolygonClient {
    async fn fundamentals(
        &self,
        ticker: &str,
        current_price: f64,
    ) -> Result<Fundamentals, PickError> {
        let (eps, dividends) = tokio::join!(
            self.get_quarterly_eps(ticker, 4),
            self.get_dividends(ticker, 12),
        );
        let today = Utc::now().date_naive();

        Ok(trailing_fundamentals(
            &eps.unwrap_or_else(|e| {
                tracing::debug!("EPS unavailable for {}: {}", ticker, e);
                Vec::new()
            }),
            &dividends.unwrap_or_else(|e| {
                tracing::debug!("Dividends unavailable for {}: {}", ticker, e);
                Vec::new()
            }),
            current_price,
            today,
        ))
    }
}

#[async_trait]
impl QuoteProvider for PolygonClient {
    async fn last_price(&self, ticker: &str) -> Result<f64, PickError> {
        let snapshot = self.get_snapshot(ticker).await?;
        snapshot
            .price()
            .ok_or_else(|| PickError::MissingData(format!("snapshot for {} has no price", ticker)))
    }
}

/// Trailing P/E from the last four quarters of EPS and dividend yield from the
/// last year of cash dividends. Non-positive earnings leave P/E absent.
pub fn trailing_fundamentals(
    quarterly_eps: &[f64],
    dividends: &[DividendInfo],
    current_price: f64,
    today: NaiveDate,
) -> Fundamentals {
    if current_price <= 0.0 || !current_price.is_finite() {
        return Fundamentals::default();
    }

    let pe_ratio = if quarterly_eps.len() >= 4 {
        let ttm_eps: f64 = quarterly_eps.iter().take(4).sum();
        (ttm_eps > 0.0).then(|| current_price / ttm_eps)
    } else {
        None
    };

    let dividend_yield = if dividends.is_empty() {
        None
    } else {
        let cutoff = today - ChronoDuration::days(365);
        let annual: f64 = dividends
            .iter()
            .filter(|d| {
                d.ex_dividend_date
                    .as_deref()
                    .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                    .map(|date| date > cutoff && date <= today)
                    .unwrap_or(false)
            })
            .filter_map(|d| d.cash_amount)
            .sum();
        Some((annual / current_price).clamp(0.0, 1.0))
    };

    Fundamentals {
        pe_ratio,
        dividend_yield,
    }
}

// Response structures
#[derive(Debug, Deserialize)]
struct AggregateResponse {
    #[serde(default)]
    results: Vec<AggregateResult>,
}

#[derive(Debug, Deserialize)]
struct AggregateResult {
    t: i64, // timestamp
    o: f64, // open
    h: f64, // high
    l: f64, // low
    c: f64, // close
    #[serde(default)]
    v: f64, // volume
}

impl AggregateResponse {
    fn into_bars(self) -> Vec<PriceBar> {
        self.results
            .into_iter()
            .filter_map(|r| {
                DateTime::from_timestamp_millis(r.t).map(|timestamp| PriceBar {
                    timestamp,
                    open: r.o,
                    high: r.h,
                    low: r.l,
                    close: r.c,
                    volume: r.v,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct FinancialsResponse {
    #[serde(default)]
    results: Vec<FinancialResult>,
}

#[derive(Debug, Deserialize)]
struct FinancialResult {
    financials: FinancialStatements,
}

#[derive(Debug, Deserialize)]
struct FinancialStatements {
    #[serde(default)]
    income_statement: HashMap<String, serde_json::Value>,
}

impl FinancialsResponse {
    fn basic_eps(&self) -> Vec<f64> {
        self.results
            .iter()
            .filter_map(|r| {
                r.financials
                    .income_statement
                    .get("basic_earnings_per_share")
                    .and_then(|v| v.get("value"))
                    .and_then(|v| v.as_f64())
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct NewsResponse {
    #[serde(default)]
    results: Vec<NewsResult>,
}

#[derive(Debug, Deserialize)]
struct NewsResult {
    id: String,
    title: String,
    published_utc: String,
    description: Option<String>,
    publisher: Option<NewsPublisher>,
    #[serde(default)]
    tickers: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NewsPublisher {
    name: Option<String>,
}

impl NewsResponse {
    fn into_articles(self) -> Vec<NewsArticle> {
        self.results
            .into_iter()
            .map(|r| NewsArticle {
                id: r.id,
                title: r.title,
                published_utc: DateTime::parse_from_rfc3339(&r.published_utc)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
                description: r.description,
                source: r.publisher.and_then(|p| p.name),
                tickers: r.tickers,
            })
            .collect()
    }
}

// Dividend types
#[derive(Debug, Deserialize)]
struct DividendResponse {
    #[serde(default)]
    results: Vec<DividendInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DividendInfo {
    pub cash_amount: Option<f64>,
    pub ex_dividend_date: Option<String>,
    pub pay_date: Option<String>,
    pub frequency: Option<i32>,
}

// Snapshot types
#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    ticker: SnapshotTicker,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotTicker {
    pub day: Option<SnapshotDay>,
    #[serde(rename = "lastTrade")]
    pub last_trade: Option<SnapshotLastTrade>,
    #[serde(rename = "prevDay")]
    pub prev_day: Option<SnapshotDay>,
}

impl SnapshotTicker {
    /// Last trade, then today's close, then the previous close. Zero prices are ignored.
    pub fn price(&self) -> Option<f64> {
        let positive = |p: Option<f64>| p.filter(|v| *v > 0.0);
        positive(self.last_trade.as_ref().and_then(|t| t.p))
            .or_else(|| positive(self.day.as_ref().and_then(|d| d.c)))
            .or_else(|| positive(self.prev_day.as_ref().and_then(|d| d.c)))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotDay {
    pub o: Option<f64>,
    pub h: Option<f64>,
    pub l: Option<f64>,
    pub c: Option<f64>,
    pub v: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotLastTrade {
    pub p: Option<f64>,
    pub s: Option<i64>,
    pub t: Option<i64>,
}
