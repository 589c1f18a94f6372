//! One analysis pass: fetch, window, fit, predict and score every ticker in a
//! universe, then reduce the per-ticker outcomes into a ranked report.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use forecast_core::{
    ErrorKind, ForecastResult, FundamentalsProvider, InvestmentSignal, PickError, PickResult,
    PriceHistoryProvider, PriceSeries,
};
use forecasting::{forecast_next_close_cancellable, CancelToken, ForecastConfig};
use futures_util::stream::{self, StreamExt};
use sentiment_analysis::NewsSentimentSource;
use serde::{Deserialize, Serialize};
use signal_ranker::{
    rank_signals, simulate_investment, Allocation, RankedUniverse, RankingKey,
    ScoreNormalization, ScoringWeights, SignalAggregator, SignalInputs, VolatilityMeasure,
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub forecast: ForecastConfig,
    pub weights: ScoringWeights,
    pub normalization: ScoreNormalization,
    pub volatility: VolatilityMeasure,
    pub ranking_key: RankingKey,
    pub lookback_days: i64,
    pub investment_amount: f64,
    /// Tickers analysed at once; 1 runs the universe sequentially.
    pub concurrency: usize,
    pub ticker_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            forecast: ForecastConfig::default(),
            weights: ScoringWeights::default(),
            normalization: ScoreNormalization::Raw,
            volatility: VolatilityMeasure::PriceStd,
            ranking_key: RankingKey::CompositeScore,
            lookback_days: 365,
            investment_amount: 100.0,
            concurrency: 1,
            ticker_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedTicker {
    pub ticker: String,
    pub kind: ErrorKind,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassReport {
    pub generated_at: DateTime<Utc>,
    pub strategy: String,
    pub total_analyzed: usize,
    pub ranked: RankedUniverse,
    pub skipped: Vec<SkippedTicker>,
    /// Simulated investment in the head of `ranked`.
    pub best_allocation: Option<Allocation>,
}

impl PassReport {
    pub fn best(&self) -> Option<&InvestmentSignal> {
        self.ranked.best()
    }
}

pub type TickerOutcome = (String, PickResult<InvestmentSignal>);

/// Splits outcomes into ranked signals and skipped tickers. Input order is kept
/// for both, so equal scores rank in universe order.
pub fn fold_outcomes(
    outcomes: Vec<TickerOutcome>,
    key: RankingKey,
) -> (RankedUniverse, Vec<SkippedTicker>) {
    let (signals, skipped) = outcomes.into_iter().fold(
        (Vec::new(), Vec::new()),
        |(mut signals, mut skipped), (ticker, outcome)| {
            match outcome {
                Ok(signal) => signals.push(signal),
                Err(e) => skipped.push(SkippedTicker {
                    ticker,
                    kind: e.kind(),
                    reason: e.to_string(),
                }),
            }
            (signals, skipped)
        },
    );
    (rank_signals(signals, key), skipped)
}

pub struct PickPipeline {
    prices: Arc<dyn PriceHistoryProvider>,
    sentiment: Option<NewsSentimentSource>,
    fundamentals: Option<Arc<dyn FundamentalsProvider>>,
    aggregator: SignalAggregator,
    config: PipelineConfig,
}

impl PickPipeline {
    pub fn new(prices: Arc<dyn PriceHistoryProvider>, config: PipelineConfig) -> Self {
        Self {
            prices,
            sentiment: None,
            fundamentals: None,
            aggregator: SignalAggregator::new(config.weights, config.normalization),
            config,
        }
    }

    pub fn with_sentiment(mut self, source: NewsSentimentSource) -> Self {
        self.sentiment = Some(source);
        self
    }

    pub fn with_fundamentals(mut self, provider: Arc<dyn FundamentalsProvider>) -> Self {
        self.fundamentals = Some(provider);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run_pass(&self, tickers: &[String]) -> PassReport {
        self.run_pass_at(tickers, Utc::now()).await
    }

    /// Runs a pass with `now` as the end of the lookback range.
    pub async fn run_pass_at(&self, tickers: &[String], now: DateTime<Utc>) -> PassReport {
        let from = now - chrono::Duration::days(self.config.lookback_days);
        let concurrency = self.config.concurrency.max(1);

        info!(
            tickers = tickers.len(),
            concurrency,
            strategy = %self.config.forecast.strategy,
            "Starting analysis pass"
        );

        let outcomes: Vec<TickerOutcome> = stream::iter(tickers.iter().cloned())
            .map(|ticker| async move {
                let outcome = match tokio::time::timeout(
                    self.config.ticker_timeout,
                    self.analyze_ticker(&ticker, from, now),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(PickError::Timeout(format!(
                        "analysis exceeded {}s",
                        self.config.ticker_timeout.as_secs()
                    ))),
                };
                if let Err(e) = &outcome {
                    warn!(ticker = %ticker, kind = e.kind().label(), "Skipping ticker: {}", e);
                }
                (ticker, outcome)
            })
            .buffered(concurrency)
            .collect()
            .await;

        let (ranked, skipped) = fold_outcomes(outcomes, self.config.ranking_key);

        let best_allocation = match ranked.best() {
            Some(best) => match simulate_investment(self.config.investment_amount, best) {
                Ok(allocation) => Some(allocation),
                Err(e) => {
                    warn!("Could not simulate investment in {}: {}", best.ticker, e);
                    None
                }
            },
            None => None,
        };

        info!(
            ranked = ranked.len(),
            skipped = skipped.len(),
            best = ranked.best().map(|s| s.ticker.as_str()).unwrap_or("-"),
            "Analysis pass complete"
        );

        PassReport {
            generated_at: now,
            strategy: self.config.forecast.strategy.to_string(),
            total_analyzed: tickers.len(),
            ranked,
            skipped,
            best_allocation,
        }
    }

    pub async fn analyze_ticker(
        &self,
        ticker: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> PickResult<InvestmentSignal> {
        let bars = self.prices.daily_bars(ticker, from, to).await?;
        let series = PriceSeries::new(ticker, bars);
        let closes = series.closes();
        let current_price = series
            .last_close()
            .ok_or_else(|| PickError::MissingData(format!("no daily bars for {}", ticker)))?;

        let window = self.config.forecast.window_size;
        if closes.len() <= window {
            return Err(PickError::InsufficientHistory {
                needed: window + 1,
                got: closes.len(),
            });
        }

        debug!(ticker, bars = closes.len(), current_price, "Fetched history");

        let volatility = self.config.volatility.measure(&closes);
        let forecast_config = self.config.forecast.clone();

        // A timeout drops this future; the guard then stops the blocking fit.
        let cancel = CancelToken::new();
        let _cancel_on_drop = cancel.drop_guard();
        let forecast_task = tokio::task::spawn_blocking(move || {
            forecast_next_close_cancellable(&closes, &forecast_config, &cancel)
        });

        let (forecast, sentiment_score, fundamentals) = tokio::join!(
            forecast_task,
            self.fetch_sentiment(ticker),
            self.fetch_fundamentals(ticker, current_price),
        );

        let predicted = forecast
            .map_err(|e| PickError::Degenerate(format!("forecast task failed: {}", e)))??;

        let result = ForecastResult {
            ticker: ticker.to_string(),
            current_price,
            predicted_next_price: predicted,
        };
        let inputs = SignalInputs {
            sentiment_score,
            fundamentals,
            volatility,
            volatility_unit: self.config.volatility.unit(),
        };

        let signal = self.aggregator.aggregate(&result, &inputs)?;
        debug!(
            ticker,
            predicted,
            expected_return_pct = signal.expected_return_pct,
            composite_score = signal.composite_score,
            "Scored ticker"
        );
        Ok(signal)
    }

    async fn fetch_sentiment(&self, ticker: &str) -> Option<f64> {
        match &self.sentiment {
            Some(source) => Some(source.fetch_sentiment(ticker).await),
            None => None,
        }
    }

    async fn fetch_fundamentals(
        &self,
        ticker: &str,
        current_price: f64,
    ) -> Option<forecast_core::Fundamentals> {
        let provider = self.fundamentals.as_ref()?;
        match provider.fundamentals(ticker, current_price).await {
            Ok(f) => Some(f),
            Err(e) => {
                warn!(ticker, "Fundamentals unavailable: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use forecast_core::{Fundamentals, NewsArticle, NewsProvider, PriceBar};
    use forecasting::{ForecastStrategy, RecurrentConfig};
    use std::collections::HashMap;

    struct MemoryPrices(HashMap<String, Vec<f64>>);

    impl MemoryPrices {
        fn new(series: &[(&str, Vec<f64>)]) -> Self {
            Self(
                series
                    .iter()
                    .map(|(t, closes)| (t.to_string(), closes.clone()))
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl PriceHistoryProvider for MemoryPrices {
        async fn daily_bars(
            &self,
            ticker: &str,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<PriceBar>, PickError> {
            if ticker == "DOWN" {
                return Err(PickError::Upstream("HTTP 503".to_string()));
            }
            let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            Ok(self
                .0
                .get(ticker)
                .map(|closes| {
                    closes
                        .iter()
                        .enumerate()
                        .map(|(i, &close)| PriceBar {
                            timestamp: start + chrono::Duration::days(i as i64),
                            open: close,
                            high: close,
                            low: close,
                            close,
                            volume: 1_000.0,
                        })
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    struct SlowPrices;

    #[async_trait]
    impl PriceHistoryProvider for SlowPrices {
        async fn daily_bars(
            &self,
            _ticker: &str,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> Result<Vec<PriceBar>, PickError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(Vec::new())
        }
    }

    struct FlatFundamentals;

    #[async_trait]
    impl FundamentalsProvider for FlatFundamentals {
        async fn fundamentals(&self, ticker: &str, _price: f64) -> Result<Fundamentals, PickError> {
            if ticker == "UP" {
                Ok(Fundamentals {
                    pe_ratio: Some(25.0),
                    dividend_yield: Some(0.01),
                })
            } else {
                Err(PickError::Upstream("quota".to_string()))
            }
        }
    }

    struct Headlines;

    #[async_trait]
    impl NewsProvider for Headlines {
        async fn recent_news(
            &self,
            ticker: &str,
            _limit: u32,
        ) -> Result<Vec<NewsArticle>, PickError> {
            Ok(vec![NewsArticle {
                id: "1".to_string(),
                title: format!("{} shares rally on strong demand", ticker),
                published_utc: Utc::now(),
                description: None,
                source: None,
                tickers: vec![ticker.to_string()],
            }])
        }
    }

    fn ramp(start: f64, step: f64, n: usize) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    fn config(window: usize) -> PipelineConfig {
        PipelineConfig {
            forecast: ForecastConfig {
                window_size: window,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn tickers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_pass_ranks_and_skips() {
        let prices = MemoryPrices::new(&[
            ("UP", ramp(10.0, 1.0, 30)),
            ("DOWN_TREND", ramp(80.0, -1.0, 30)),
            ("SHORT", ramp(10.0, 1.0, 4)),
            ("FLAT", vec![42.0; 30]),
        ]);
        let pipeline = PickPipeline::new(Arc::new(prices), config(5));

        let report = pipeline
            .run_pass(&tickers(&["UP", "EMPTY", "DOWN_TREND", "SHORT", "FLAT", "DOWN"]))
            .await;

        assert_eq!(report.total_analyzed, 6);
        let ranked: Vec<&str> = report.ranked.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(ranked, vec!["UP", "DOWN_TREND"]);

        let best = report.best().unwrap();
        assert_abs_diff_eq!(best.predicted_price, 40.0, epsilon = 0.5);
        assert_eq!(best.current_price, 39.0);

        let skipped: Vec<(&str, ErrorKind)> = report
            .skipped
            .iter()
            .map(|s| (s.ticker.as_str(), s.kind))
            .collect();
        assert_eq!(
            skipped,
            vec![
                ("EMPTY", ErrorKind::MissingData),
                ("SHORT", ErrorKind::InsufficientWindow),
                ("FLAT", ErrorKind::FitFailure),
                ("DOWN", ErrorKind::Upstream),
            ]
        );

        let allocation = report.best_allocation.unwrap();
        assert_eq!(allocation.ticker, "UP");
        assert_abs_diff_eq!(allocation.shares_to_buy, 100.0 / 39.0, epsilon = 1e-12);
    }

    #[tokio::test]
    async fn test_enrichment_flows_into_signal() {
        let prices = MemoryPrices::new(&[
            ("UP", ramp(10.0, 1.0, 30)),
            ("ALSO_UP", ramp(20.0, 1.0, 30)),
        ]);
        let pipeline = PickPipeline::new(Arc::new(prices), config(5))
            .with_sentiment(NewsSentimentSource::new(Arc::new(Headlines), 5))
            .with_fundamentals(Arc::new(FlatFundamentals));

        let report = pipeline.run_pass(&tickers(&["UP", "ALSO_UP"])).await;
        assert!(report.skipped.is_empty());

        let up = report.ranked.iter().find(|s| s.ticker == "UP").unwrap();
        assert_eq!(up.sentiment_score, Some(2.0));
        assert_eq!(up.pe_ratio, Some(25.0));
        assert_eq!(up.dividend_yield, Some(0.01));
        assert!(up.volatility.is_some());

        // fundamentals failure degrades to absent, not a skip
        let also = report.ranked.iter().find(|s| s.ticker == "ALSO_UP").unwrap();
        assert_eq!(also.pe_ratio, None);
        assert_eq!(also.sentiment_score, Some(2.0));
    }

    #[tokio::test]
    async fn test_concurrent_pass_matches_sequential_order() {
        let prices = Arc::new(MemoryPrices::new(&[
            ("A", vec![10.0, 12.0, 11.0, 13.0, 12.0, 14.0, 13.0, 15.0, 14.0, 16.0]),
            ("B", vec![10.0, 12.0, 11.0, 13.0, 12.0, 14.0, 13.0, 15.0, 14.0, 16.0]),
            ("C", ramp(5.0, 0.5, 10)),
        ]));
        let names = tickers(&["A", "B", "C"]);

        let sequential = PickPipeline::new(prices.clone(), config(3)).run_pass(&names).await;
        let mut parallel_cfg = config(3);
        parallel_cfg.concurrency = 3;
        let parallel = PickPipeline::new(prices, parallel_cfg).run_pass(&names).await;

        let order = |r: &PassReport| r.ranked.iter().map(|s| s.ticker.clone()).collect::<Vec<_>>();
        assert_eq!(order(&sequential), order(&parallel));
        // identical series score identically; input order breaks the tie
        let a = order(&sequential).iter().position(|t| t == "A").unwrap();
        let b = order(&sequential).iter().position(|t| t == "B").unwrap();
        assert!(a < b);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_ticker_times_out() {
        let mut cfg = config(5);
        cfg.ticker_timeout = Duration::from_secs(5);
        let pipeline = PickPipeline::new(Arc::new(SlowPrices), cfg);

        let report = pipeline.run_pass(&tickers(&["SLOW"])).await;

        assert!(report.ranked.is_empty());
        assert_eq!(report.skipped[0].kind, ErrorKind::Upstream);
        assert!(report.skipped[0].reason.contains("5s"));
        assert!(report.best_allocation.is_none());
    }

    #[test]
    fn test_timed_out_forecast_stops_training() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        let closes: Vec<f64> = (0..200).map(|i| 100.0 + (i % 11) as f64).collect();
        let mut cfg = config(30);
        cfg.forecast.strategy = ForecastStrategy::Recurrent(RecurrentConfig {
            hidden_size: 8,
            epochs: 10_000_000,
            patience: None,
            seed: Some(4),
            ..Default::default()
        });
        cfg.ticker_timeout = Duration::from_millis(200);
        let pipeline = PickPipeline::new(Arc::new(MemoryPrices::new(&[("LONG", closes)])), cfg);

        let report = runtime.block_on(pipeline.run_pass(&tickers(&["LONG"])));
        assert!(report.ranked.is_empty());
        assert_eq!(report.skipped[0].kind, ErrorKind::Upstream);

        // shutdown waits on blocking threads, so a fit left running would hold it here
        let started = std::time::Instant::now();
        runtime.shutdown_timeout(Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_fold_is_pure_reduction() {
        let make = |t: &str, score: f64| InvestmentSignal {
            ticker: t.to_string(),
            current_price: 10.0,
            predicted_price: 10.0,
            expected_return_pct: 0.0,
            sentiment_score: None,
            pe_ratio: None,
            dividend_yield: None,
            volatility: None,
            composite_score: score,
            recommendation: forecast_core::Recommendation::Hold,
        };
        let outcomes = vec![
            ("X".to_string(), Ok(make("X", 1.0))),
            ("Y".to_string(), Err(PickError::MissingData("none".to_string()))),
            ("Z".to_string(), Ok(make("Z", 3.0))),
        ];

        let (ranked, skipped) = fold_outcomes(outcomes, RankingKey::CompositeScore);
        assert_eq!(ranked.best().unwrap().ticker, "Z");
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].ticker, "Y");
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let prices = MemoryPrices::new(&[("UP", ramp(10.0, 1.0, 30))]);
        let report = PickPipeline::new(Arc::new(prices), config(5))
            .run_pass(&tickers(&["UP", "GONE"]))
            .await;

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["strategy"], "linear");
        assert_eq!(json["skipped"][0]["kind"], "missing_data");
        assert_eq!(json["best_allocation"]["ticker"], "UP");
    }
}
