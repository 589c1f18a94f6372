//! stock-picker: forecast the next close for each ticker in a universe, score
//! the forecasts, and recommend the best candidate.
//!
//! Usage:
//!   cargo run -p stock-picker                          # default ten-stock universe
//!   cargo run -p stock-picker -- AAPL MSFT NVDA --json
//!   cargo run -p stock-picker -- --universe tech --strategy recurrent --tune
//!   cargo run -p stock-picker -- --watch-cycles 10 --watch-interval 30

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use pick_orchestrator::{LiveRefresh, PickPipeline, StockUniverse, SystemClock};
use polygon_client::PolygonClient;
use sentiment_analysis::NewsSentimentSource;
use tokio::sync::{mpsc, watch};

mod cli;
mod config;
mod report;

use cli::Cli;
use config::PickerConfig;

const DEFAULT_LOG_FILTER: &str = "stock_picker=info,pick_orchestrator=info,polygon_client=warn";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    let cli = Cli::parse();
    let mut config = PickerConfig::from_env()?;
    config.apply_cli(&cli);
    config.validate().context("invalid configuration")?;

    tracing::info!(
        strategy = %config.strategy,
        window = config.window_size,
        lookback_days = config.lookback_days,
        amount = config.investment_amount,
        normalization = %config.normalization,
        volatility = %config.volatility,
        "Configuration loaded"
    );

    let universe = if cli.tickers.is_empty() {
        cli.universe.clone().unwrap_or_default()
    } else {
        StockUniverse::Custom(cli.tickers.clone())
    };
    let tickers = universe.resolve(config.max_universe);
    if tickers.is_empty() {
        bail!("no tickers to analyse");
    }

    let polygon = Arc::new(PolygonClient::with_config(
        config.polygon_api_key.clone(),
        config.polygon_config(),
    ));

    let mut pipeline = PickPipeline::new(polygon.clone(), config.pipeline_config());
    if config.enable_sentiment {
        let news = NewsSentimentSource::new(polygon.clone(), config.news_limit);
        pipeline = pipeline.with_sentiment(news);
    }
    if config.enable_fundamentals {
        pipeline = pipeline.with_fundamentals(polygon.clone());
    }

    let report = tokio::select! {
        report = pipeline.run_pass(&tickers) => report,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted before the pass completed");
            return Ok(());
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report::render_text(&report, config.investment_amount));
    }

    if let Some(cycles) = cli.watch_cycles {
        let watched: Vec<String> = match report.best() {
            Some(best) => vec![best.ticker.clone()],
            None => tickers.clone(),
        };
        watch_prices(polygon, watched, Duration::from_secs(cli.watch_interval), cycles).await?;
    }

    Ok(())
}

fn init_tracing() {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Re-polls last-trade prices until the cycle budget runs out or Ctrl-C.
async fn watch_prices(
    polygon: Arc<PolygonClient>,
    tickers: Vec<String>,
    interval: Duration,
    cycles: usize,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel(256);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresh =
        LiveRefresh::new(polygon, tickers, interval, Arc::new(SystemClock)).max_cycles(cycles);
    let handle = tokio::spawn(refresh.run(tx, shutdown_rx));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    while let Some(tick) = rx.recv().await {
        println!("{}", report::render_tick(&tick));
    }

    let summary = handle.await.context("live refresh task failed")??;
    tracing::info!(
        cycles = summary.cycles,
        ticks = summary.ticks,
        stop_reason = ?summary.stop_reason,
        "Price watch finished"
    );
    Ok(())
}
