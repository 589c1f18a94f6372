use std::fmt;
use std::str::FromStr;

use forecast_core::PickError;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Trailing observations used by the rolling return measure.
pub const ROLLING_RETURN_WINDOW: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VolatilityMeasure {
    /// Sample standard deviation of the closing prices, in price units.
    PriceStd,
    /// Sample standard deviation of the last N daily percentage returns.
    RollingReturns { window: usize },
}

/// Unit a volatility value is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityUnit {
    /// Same unit as the close, e.g. dollars.
    #[default]
    Price,
    /// Fraction of price, e.g. 0.02 for 2%.
    Fraction,
}

impl Default for VolatilityMeasure {
    fn default() -> Self {
        VolatilityMeasure::PriceStd
    }
}

impl VolatilityMeasure {
    pub fn unit(&self) -> VolatilityUnit {
        match self {
            VolatilityMeasure::PriceStd => VolatilityUnit::Price,
            VolatilityMeasure::RollingReturns { .. } => VolatilityUnit::Fraction,
        }
    }

    /// `None` when the series is too short for the measure.
    pub fn measure(&self, closes: &[f64]) -> Option<f64> {
        match self {
            VolatilityMeasure::PriceStd => price_std(closes),
            VolatilityMeasure::RollingReturns { window } => rolling_return_std(closes, *window),
        }
    }
}

impl fmt::Display for VolatilityMeasure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatilityMeasure::PriceStd => write!(f, "price-std"),
            VolatilityMeasure::RollingReturns { window } => {
                write!(f, "rolling-returns({})", window)
            }
        }
    }
}

impl FromStr for VolatilityMeasure {
    type Err = PickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "price-std" | "price_std" | "std" => Ok(VolatilityMeasure::PriceStd),
            "rolling-returns" | "rolling_returns" | "rolling" => {
                Ok(VolatilityMeasure::RollingReturns {
                    window: ROLLING_RETURN_WINDOW,
                })
            }
            other => Err(PickError::InvalidConfig(format!(
                "unknown volatility measure '{}', expected 'price-std' or 'rolling-returns'",
                other
            ))),
        }
    }
}

pub fn price_std(closes: &[f64]) -> Option<f64> {
    if closes.len() < 2 {
        return None;
    }
    let std = closes.iter().std_dev();
    std.is_finite().then_some(std)
}

/// Std of the trailing `window` returns `close[i] / close[i-1] - 1`.
pub fn rolling_return_std(closes: &[f64], window: usize) -> Option<f64> {
    if window < 2 || closes.len() < window + 1 {
        return None;
    }

    let tail = &closes[closes.len() - window - 1..];
    let mut returns = Vec::with_capacity(window);
    for pair in tail.windows(2) {
        if pair[0] == 0.0 {
            return None;
        }
        returns.push(pair[1] / pair[0] - 1.0);
    }

    let std = returns.iter().std_dev();
    std.is_finite().then_some(std)
}
