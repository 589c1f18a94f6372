//! Bounded re-polling of last-trade prices.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use forecast_core::{PickError, PickResult, QuoteProvider};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Wall-clock source for deadline checks.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub ticker: String,
    pub price: f64,
    pub observed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxCycles,
    Deadline,
    Shutdown,
    ReceiverClosed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub cycles: usize,
    pub ticks: usize,
    pub stop_reason: StopReason,
}

pub struct LiveRefresh {
    quotes: Arc<dyn QuoteProvider>,
    tickers: Vec<String>,
    interval: Duration,
    clock: Arc<dyn Clock>,
    max_cycles: Option<usize>,
    deadline: Option<DateTime<Utc>>,
}

impl LiveRefresh {
    pub fn new(
        quotes: Arc<dyn QuoteProvider>,
        tickers: Vec<String>,
        interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            quotes,
            tickers,
            interval,
            clock,
            max_cycles: None,
            deadline: None,
        }
    }

    pub fn max_cycles(mut self, cycles: usize) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    pub fn until(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Polls every ticker once per interval until a stop condition fires.
    ///
    /// At least one of `max_cycles` or a deadline must be set. A failed quote
    /// is logged and skipped; the cycle still counts.
    pub async fn run(
        self,
        tx: mpsc::Sender<PriceTick>,
        mut shutdown: watch::Receiver<bool>,
    ) -> PickResult<RefreshSummary> {
        if self.max_cycles.is_none() && self.deadline.is_none() {
            return Err(PickError::InvalidConfig(
                "live refresh needs max_cycles or a deadline".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(PickError::InvalidConfig(
                "live refresh interval must be positive".to_string(),
            ));
        }

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut shutdown_open = true;
        let mut cycles = 0usize;
        let mut ticks = 0usize;

        info!(
            tickers = self.tickers.len(),
            interval_ms = self.interval.as_millis() as u64,
            max_cycles = ?self.max_cycles,
            "Starting live price refresh"
        );

        let stop_reason = 'refresh: loop {
            if *shutdown.borrow() {
                break StopReason::Shutdown;
            }
            if self.max_cycles.is_some_and(|max| cycles >= max) {
                break StopReason::MaxCycles;
            }
            if self.deadline.is_some_and(|deadline| self.clock.now() >= deadline) {
                break StopReason::Deadline;
            }

            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed(), if shutdown_open => {
                    if changed.is_err() {
                        // sender gone; only the other stop conditions remain
                        shutdown_open = false;
                    }
                    continue;
                }
            }

            for ticker in &self.tickers {
                match self.quotes.last_price(ticker).await {
                    Ok(price) => {
                        let tick = PriceTick {
                            ticker: ticker.clone(),
                            price,
                            observed_at: self.clock.now(),
                        };
                        if tx.send(tick).await.is_err() {
                            break 'refresh StopReason::ReceiverClosed;
                        }
                        ticks += 1;
                    }
                    Err(e) => warn!(ticker = %ticker, "Quote refresh failed: {}", e),
                }
            }

            cycles += 1;
            debug!(cycle = cycles, ticks, "Refresh cycle complete");
        };

        info!(cycles, ticks, stop_reason = ?stop_reason, "Live price refresh stopped");
        Ok(RefreshSummary {
            cycles,
            ticks,
            stop_reason,
        })
    }
}
