use reqwest::StatusCode;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window rate limiter: at most `max_requests` per `window` duration.
#[derive(Clone)]
pub(crate) struct RateLimiter {
    timestamps: Arc<Mutex<VecDeque<Instant>>>,
    max_requests: usize,
    window: Duration,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(VecDeque::new())),
            max_requests: max_requests.max(1),
            window,
        }
    }

    pub(crate) async fn acquire(&self) {
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

            let oldest = match ts.front() {
                Some(&oldest) if ts.len() >= self.max_requests => oldest,
                _ => {
                    ts.push_back(now);
                    return;
                }
            };

            // Wait until the oldest request falls out of the window
            let sleep_dur = (oldest + self.window).saturating_duration_since(now)
                + Duration::from_millis(50);
            drop(ts);
            tracing::debug!(
                "Rate limiter: waiting {:.1}s for Polygon API slot",
                sleep_dur.as_secs_f64()
            );
            tokio::time::sleep(sleep_dur).await;
        }
    }
}

/// Bounded retries with exponential backoff for transient upstream failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
        }
    }
}

impl RetryPolicy {
    /// Throttling and server errors are worth another attempt; any other
    /// status goes straight back to the caller.
    pub fn is_retryable(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}
