use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One daily bar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Ordered daily history for one ticker. Immutable once fetched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    ticker: String,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Bars are sorted by timestamp on construction; upstream order is not trusted.
    pub fn new(ticker: impl Into<String>, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.timestamp);
        Self {
            ticker: ticker.into(),
            bars,
        }
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }
}

/// News article
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub id: String,
    pub title: String,
    pub published_utc: DateTime<Utc>,
    pub description: Option<String>,
    pub source: Option<String>,
    pub tickers: Vec<String>,
}

/// Trailing valuation figures. Either may be absent upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub pe_ratio: Option<f64>,
    /// Annual cash dividends over price, as a fraction in [0, 1]
    pub dividend_yield: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastResult {
    pub ticker: String,
    pub current_price: f64,
    pub predicted_next_price: f64,
}

/// Recommendation bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Recommendation {
    StrongBuy,
    Buy,
    Hold,
    Sell,
    StrongSell,
}

impl Recommendation {
    pub fn from_expected_return(pct: f64) -> Self {
        match pct {
            p if p >= 5.0 => Recommendation::StrongBuy,
            p if p >= 1.0 => Recommendation::Buy,
            p if p > -1.0 => Recommendation::Hold,
            p if p > -5.0 => Recommendation::Sell,
            _ => Recommendation::StrongSell,
        }
    }

    pub fn to_label(&self) -> &'static str {
        match self {
            Recommendation::StrongBuy => "Strong Buy",
            Recommendation::Buy => "Buy",
            Recommendation::Hold => "Hold",
            Recommendation::Sell => "Sell",
            Recommendation::StrongSell => "Strong Sell",
        }
    }
}

/// Scored candidate for one ticker in one analysis pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentSignal {
    pub ticker: String,
    pub current_price: f64,
    pub predicted_price: f64,
    pub expected_return_pct: f64,
    pub sentiment_score: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub volatility: Option<f64>,
    pub composite_score: f64,
    pub recommendation: Recommendation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bar(day: u32, close: f64) -> PriceBar {
        PriceBar {
            timestamp: Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn test_series_sorted_by_time() {
        let series = PriceSeries::new("AAPL", vec![bar(3, 12.0), bar(1, 10.0), bar(2, 11.0)]);
        assert_eq!(series.closes(), vec![10.0, 11.0, 12.0]);
        assert_eq!(series.last_close(), Some(12.0));
        assert_eq!(series.ticker(), "AAPL");
    }

    #[test]
    fn test_recommendation_thresholds() {
        assert_eq!(Recommendation::from_expected_return(7.5), Recommendation::StrongBuy);
        assert_eq!(Recommendation::from_expected_return(1.0), Recommendation::Buy);
        assert_eq!(Recommendation::from_expected_return(0.0), Recommendation::Hold);
        assert_eq!(Recommendation::from_expected_return(-1.0), Recommendation::Sell);
        assert_eq!(Recommendation::from_expected_return(-5.0), Recommendation::StrongSell);
    }
}
