use clap::Parser;
use forecasting::ForecastStrategy;
use pick_orchestrator::StockUniverse;
use signal_ranker::{ScoreNormalization, VolatilityMeasure};

/// Forecast next-day closes for a stock universe and rank the candidates.
///
/// Flags override the PICKER_* environment variables.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Tickers to analyse; replaces --universe when given
    #[arg(value_name = "TICKER")]
    pub tickers: Vec<String>,

    /// Preset universe: original, popular, tech, blue-chips
    #[arg(long, short)]
    pub universe: Option<StockUniverse>,

    /// Forecast strategy: linear or recurrent
    #[arg(long, short)]
    pub strategy: Option<ForecastStrategy>,

    /// Closes per input window
    #[arg(long, short)]
    pub window: Option<usize>,

    /// Days of daily history to fetch
    #[arg(long)]
    pub lookback: Option<i64>,

    /// Amount invested in the best pick
    #[arg(long, short)]
    pub amount: Option<f64>,

    /// Cap on the number of tickers per pass
    #[arg(long)]
    pub max_universe: Option<usize>,

    /// Tickers analysed concurrently
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Score normalization: raw or relative
    #[arg(long)]
    pub normalization: Option<ScoreNormalization>,

    /// Volatility measure: price-std or rolling-returns
    #[arg(long)]
    pub volatility: Option<VolatilityMeasure>,

    /// Rank by expected return instead of composite score
    #[arg(long, default_value_t = false)]
    pub rank_by_return: bool,

    #[arg(long, default_value_t = false)]
    pub no_sentiment: bool,

    #[arg(long, default_value_t = false)]
    pub no_fundamentals: bool,

    /// Grid-search batch size and epochs before fitting (recurrent only)
    #[arg(long, default_value_t = false)]
    pub tune: bool,

    /// Seed for recurrent weight initialisation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Print the pass report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// After the pass, refresh last-trade prices this many times
    #[arg(long)]
    pub watch_cycles: Option<usize>,

    /// Seconds between price refreshes
    #[arg(long, default_value_t = 60)]
    pub watch_interval: u64,
}
