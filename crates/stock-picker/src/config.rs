use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use forecasting::{ForecastConfig, ForecastStrategy, TuningGrid};
use pick_orchestrator::PipelineConfig;
use polygon_client::{PolygonConfig, RetryPolicy};
use signal_ranker::{RankingKey, ScoreNormalization, ScoringWeights, VolatilityMeasure};

use crate::cli::Cli;

#[derive(Debug, Clone)]
pub struct PickerConfig {
    // Polygon
    pub polygon_api_key: String,
    pub polygon_rate_limit: usize,
    pub http_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_ms: u64,

    // Pass
    pub investment_amount: f64,
    pub window_size: usize,
    pub lookback_days: i64,
    pub max_universe: usize,
    pub strategy: ForecastStrategy,
    pub scale: bool,
    pub tune: bool,
    pub concurrency: usize,
    pub ticker_timeout_secs: u64,

    // Scoring
    pub weights: ScoringWeights,
    pub normalization: ScoreNormalization,
    pub volatility: VolatilityMeasure,
    pub ranking_key: RankingKey,

    // Enrichment
    pub enable_sentiment: bool,
    pub enable_fundamentals: bool,
    pub news_limit: u32,
}

impl PickerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, applying defaults for absent keys.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            polygon_api_key: lookup("POLYGON_API_KEY").context("POLYGON_API_KEY not set")?,
            polygon_rate_limit: env_or(&lookup, "POLYGON_RATE_LIMIT", "500")?,
            http_timeout_secs: env_or(&lookup, "PICKER_HTTP_TIMEOUT_SECS", "30")?,
            max_retries: env_or(&lookup, "PICKER_MAX_RETRIES", "3")?,
            retry_base_ms: env_or(&lookup, "PICKER_RETRY_BASE_MS", "500")?,

            investment_amount: env_or(&lookup, "PICKER_INVESTMENT_AMOUNT", "100")?,
            window_size: env_or(&lookup, "PICKER_WINDOW_SIZE", "30")?,
            lookback_days: env_or(&lookup, "PICKER_LOOKBACK_DAYS", "365")?,
            max_universe: env_or(&lookup, "PICKER_MAX_UNIVERSE", "20")?,
            strategy: env_or(&lookup, "PICKER_STRATEGY", "linear")?,
            scale: env_or(&lookup, "PICKER_SCALE", "true")?,
            tune: false,
            concurrency: env_or(&lookup, "PICKER_CONCURRENCY", "1")?,
            ticker_timeout_secs: env_or(&lookup, "PICKER_TICKER_TIMEOUT_SECS", "120")?,

            weights: ScoringWeights {
                expected_return: env_or(&lookup, "PICKER_WEIGHT_RETURN", "0.5")?,
                dividend_yield: env_or(&lookup, "PICKER_WEIGHT_DIVIDEND", "0.3")?,
                volatility: env_or(&lookup, "PICKER_WEIGHT_VOLATILITY", "0.2")?,
                sentiment: env_or(&lookup, "PICKER_WEIGHT_SENTIMENT", "0.1")?,
            },
            normalization: env_or(&lookup, "PICKER_SCORE_NORMALIZATION", "raw")?,
            volatility: env_or(&lookup, "PICKER_VOLATILITY", "price-std")?,
            ranking_key: RankingKey::CompositeScore,

            enable_sentiment: env_or(&lookup, "PICKER_ENABLE_SENTIMENT", "true")?,
            enable_fundamentals: env_or(&lookup, "PICKER_ENABLE_FUNDAMENTALS", "true")?,
            news_limit: env_or(&lookup, "PICKER_NEWS_LIMIT", "20")?,
        };

        Ok(config)
    }

    /// Command-line flags win over the environment.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(strategy) = &cli.strategy {
            self.strategy = strategy.clone();
        }
        if let Some(window) = cli.window {
            self.window_size = window;
        }
        if let Some(lookback) = cli.lookback {
            self.lookback_days = lookback;
        }
        if let Some(amount) = cli.amount {
            self.investment_amount = amount;
        }
        if let Some(max) = cli.max_universe {
            self.max_universe = max;
        }
        if let Some(concurrency) = cli.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(normalization) = cli.normalization {
            self.normalization = normalization;
        }
        if let Some(volatility) = cli.volatility {
            self.volatility = volatility;
        }
        if let (ForecastStrategy::Recurrent(recurrent), Some(seed)) =
            (&mut self.strategy, cli.seed)
        {
            recurrent.seed = Some(seed);
        }
        if cli.rank_by_return {
            self.ranking_key = RankingKey::ExpectedReturn;
        }
        self.enable_sentiment &= !cli.no_sentiment;
        self.enable_fundamentals &= !cli.no_fundamentals;
        self.tune |= cli.tune;
    }

    pub fn validate(&self) -> Result<()> {
        if self.polygon_api_key.trim().is_empty() {
            bail!("POLYGON_API_KEY is empty");
        }
        if self.window_size == 0 {
            bail!("window size must be at least 1");
        }
        if !self.investment_amount.is_finite() || self.investment_amount <= 0.0 {
            bail!("investment amount must be positive, got {}", self.investment_amount);
        }
        if self.max_universe == 0 {
            bail!("universe cap must be at least 1");
        }
        if self.concurrency == 0 {
            bail!("concurrency must be at least 1");
        }
        if self.lookback_days <= 0 {
            bail!("lookback must be a positive number of days");
        }
        if self.polygon_rate_limit == 0 {
            bail!("POLYGON_RATE_LIMIT must be at least 1");
        }
        if self.max_retries == 0 {
            bail!("PICKER_MAX_RETRIES must be at least 1");
        }
        self.weights.validate()?;
        if let ForecastStrategy::Recurrent(recurrent) = &self.strategy {
            recurrent.validate()?;
        }
        Ok(())
    }

    pub fn polygon_config(&self) -> PolygonConfig {
        PolygonConfig {
            rate_limit: self.polygon_rate_limit,
            timeout: Duration::from_secs(self.http_timeout_secs),
            retry: RetryPolicy {
                max_attempts: self.max_retries,
                base_delay: Duration::from_millis(self.retry_base_ms),
                ..RetryPolicy::default()
            },
            ..PolygonConfig::default()
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let tuning = match (&self.strategy, self.tune) {
            (ForecastStrategy::Recurrent(_), true) => Some(TuningGrid::default()),
            (ForecastStrategy::Linear, true) => {
                tracing::warn!("--tune only applies to the recurrent strategy, ignoring");
                None
            }
            _ => None,
        };

        PipelineConfig {
            forecast: ForecastConfig {
                window_size: self.window_size,
                scale: self.scale,
                strategy: self.strategy.clone(),
                tuning,
            },
            weights: self.weights,
            normalization: self.normalization,
            volatility: self.volatility,
            ranking_key: self.ranking_key,
            lookback_days: self.lookback_days,
            investment_amount: self.investment_amount,
            concurrency: self.concurrency,
            ticker_timeout: Duration::from_secs(self.ticker_timeout_secs),
        }
    }
}

fn env_or<T, F>(lookup: &F, key: &str, default: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    parse(&raw, key)
}

fn parse<T>(raw: &str, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.trim()
        .parse::<T>()
        .with_context(|| format!("invalid value '{}' for {}", raw, key))
}
