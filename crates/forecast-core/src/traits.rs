use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{Fundamentals, NewsArticle, PickError, PriceBar};

/// Source of historical daily bars
#[async_trait]
pub trait PriceHistoryProvider: Send + Sync {
    /// Daily bars in `[from, to]`. An unknown or delisted ticker yields an empty vec.
    async fn daily_bars(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PriceBar>, PickError>;
}

/// Source of recent news headlines
#[async_trait]
pub trait NewsProvider: Send + Sync {
    async fn recent_news(&self, ticker: &str, limit: u32) -> Result<Vec<NewsArticle>, PickError>;
}

/// Source of trailing P/E and dividend yield
#[async_trait]
pub trait FundamentalsProvider: Send + Sync {
    async fn fundamentals(
        &self,
        ticker: &str,
        current_price: f64,
    ) -> Result<Fundamentals, PickError>;
}

/// Source of near-real-time last trade prices
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn last_price(&self, ticker: &str) -> Result<f64, PickError>;
}
