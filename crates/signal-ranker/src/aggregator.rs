use std::fmt;
use std::str::FromStr;

use forecast_core::{
    ForecastResult, Fundamentals, InvestmentSignal, PickError, PickResult, Recommendation,
};
use serde::{Deserialize, Serialize};

use crate::volatility::VolatilityUnit;

/// Weights for the composite score. Volatility is subtracted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub expected_return: f64,
    pub dividend_yield: f64,
    pub volatility: f64,
    pub sentiment: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            expected_return: 0.5,
            dividend_yield: 0.3,
            volatility: 0.2,
            sentiment: 0.1,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> PickResult<()> {
        let named = [
            ("expected_return", self.expected_return),
            ("dividend_yield", self.dividend_yield),
            ("volatility", self.volatility),
            ("sentiment", self.sentiment),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(PickError::InvalidConfig(format!(
                    "weight {} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// How inputs with different units are brought together before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreNormalization {
    /// Return in percent, yield as a fraction, volatility in price units.
    #[default]
    Raw,
    /// Every term in percent: volatility relative to current price, yield times 100.
    /// Volatility already expressed as a fraction of price is only scaled by 100.
    Relative,
}

impl fmt::Display for ScoreNormalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreNormalization::Raw => write!(f, "raw"),
            ScoreNormalization::Relative => write!(f, "relative"),
        }
    }
}

impl FromStr for ScoreNormalization {
    type Err = PickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(ScoreNormalization::Raw),
            "relative" | "percent" => Ok(ScoreNormalization::Relative),
            other => Err(PickError::InvalidConfig(format!(
                "unknown score normalization '{}', expected 'raw' or 'relative'",
                other
            ))),
        }
    }
}

/// Optional enrichment gathered for one ticker.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SignalInputs {
    pub sentiment_score: Option<f64>,
    pub fundamentals: Option<Fundamentals>,
    pub volatility: Option<f64>,
    pub volatility_unit: VolatilityUnit,
}

pub fn expected_return_pct(current_price: f64, predicted_price: f64) -> PickResult<f64> {
    if !current_price.is_finite() || current_price <= 0.0 {
        return Err(PickError::Degenerate(format!(
            "current price must be positive, got {}",
            current_price
        )));
    }
    if !predicted_price.is_finite() {
        return Err(PickError::Degenerate("predicted price is not finite".to_string()));
    }
    Ok((predicted_price - current_price) / current_price * 100.0)
}

#[derive(Debug, Clone, Default)]
pub struct SignalAggregator {
    weights: ScoringWeights,
    normalization: ScoreNormalization,
}

impl SignalAggregator {
    pub fn new(weights: ScoringWeights, normalization: ScoreNormalization) -> Self {
        Self {
            weights,
            normalization,
        }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn normalization(&self) -> ScoreNormalization {
        self.normalization
    }

    /// Composite score from already-computed terms; absent terms contribute nothing.
    pub fn composite_score(
        &self,
        expected_return_pct: f64,
        dividend_yield: Option<f64>,
        volatility: Option<f64>,
        volatility_unit: VolatilityUnit,
        sentiment_score: Option<f64>,
        current_price: f64,
    ) -> f64 {
        let (dividend_term, volatility_term) = match self.normalization {
            ScoreNormalization::Raw => (dividend_yield.unwrap_or(0.0), volatility.unwrap_or(0.0)),
            ScoreNormalization::Relative => {
                let volatility_pct = volatility.map_or(0.0, |v| match volatility_unit {
                    VolatilityUnit::Price => v / current_price * 100.0,
                    VolatilityUnit::Fraction => v * 100.0,
                });
                (dividend_yield.unwrap_or(0.0) * 100.0, volatility_pct)
            }
        };

        self.weights.expected_return * expected_return_pct
            + self.weights.dividend_yield * dividend_term
            - self.weights.volatility * volatility_term
            + self.weights.sentiment * sentiment_score.unwrap_or(0.0)
    }

    pub fn aggregate(
        &self,
        forecast: &ForecastResult,
        inputs: &SignalInputs,
    ) -> PickResult<InvestmentSignal> {
        let expected_return =
            expected_return_pct(forecast.current_price, forecast.predicted_next_price)?;
        let pe_ratio = inputs.fundamentals.and_then(|f| f.pe_ratio);
        let dividend_yield = inputs.fundamentals.and_then(|f| f.dividend_yield);

        let composite_score = self.composite_score(
            expected_return,
            dividend_yield,
            inputs.volatility,
            inputs.volatility_unit,
            inputs.sentiment_score,
            forecast.current_price,
        );
        if !composite_score.is_finite() {
            return Err(PickError::Degenerate(format!(
                "composite score for {} is not finite",
                forecast.ticker
            )));
        }

        Ok(InvestmentSignal {
            ticker: forecast.ticker.clone(),
            current_price: forecast.current_price,
            predicted_price: forecast.predicted_next_price,
            expected_return_pct: expected_return,
            sentiment_score: inputs.sentiment_score,
            pe_ratio,
            dividend_yield,
            volatility: inputs.volatility,
            composite_score,
            recommendation: Recommendation::from_expected_return(expected_return),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volatility::VolatilityMeasure;
    use approx::assert_relative_eq;

    fn forecast(current: f64, predicted: f64) -> ForecastResult {
        ForecastResult {
            ticker: "MSFT".to_string(),
            current_price: current,
            predicted_next_price: predicted,
        }
    }

    #[test]
    fn test_reference_composite_score() {
        let agg = SignalAggregator::new(
            ScoringWeights {
                sentiment: 0.0,
                ..Default::default()
            },
            ScoreNormalization::Raw,
        );
        let score = agg.composite_score(
            10.0,
            Some(0.02),
            Some(1.5),
            VolatilityUnit::Price,
            None,
            100.0,
        );
        assert_relative_eq!(score, 4.706, epsilon = 1e-12);
    }

    #[test]
    fn test_aggregate_builds_signal() {
        let agg = SignalAggregator::default();
        let inputs = SignalInputs {
            sentiment_score: Some(3.0),
            fundamentals: Some(Fundamentals {
                pe_ratio: Some(28.5),
                dividend_yield: Some(0.02),
            }),
            volatility: Some(1.5),
            volatility_unit: VolatilityUnit::Price,
        };

        let signal = agg.aggregate(&forecast(100.0, 110.0), &inputs).unwrap();

        assert_relative_eq!(signal.expected_return_pct, 10.0, epsilon = 1e-12);
        // 4.706 plus 0.1 * 3
        assert_relative_eq!(signal.composite_score, 5.006, epsilon = 1e-12);
        assert_eq!(signal.pe_ratio, Some(28.5));
        assert_eq!(signal.recommendation, Recommendation::StrongBuy);
    }

    #[test]
    fn test_missing_inputs_contribute_zero() {
        let agg = SignalAggregator::default();
        let signal = agg
            .aggregate(&forecast(50.0, 49.0), &SignalInputs::default())
            .unwrap();

        assert_relative_eq!(signal.expected_return_pct, -2.0, epsilon = 1e-12);
        assert_relative_eq!(signal.composite_score, -1.0, epsilon = 1e-12);
        assert_eq!(signal.sentiment_score, None);
        assert_eq!(signal.recommendation, Recommendation::Sell);
    }

    #[test]
    fn test_relative_normalization_uses_percent_units() {
        let agg = SignalAggregator::new(
            ScoringWeights {
                sentiment: 0.0,
                ..Default::default()
            },
            ScoreNormalization::Relative,
        );
        // vol 1.5 on a 50 price is 3%, yield 0.02 is 2%
        let score = agg.composite_score(
            10.0,
            Some(0.02),
            Some(1.5),
            VolatilityUnit::Price,
            None,
            50.0,
        );
        assert_relative_eq!(score, 5.0 + 0.6 - 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_relative_normalization_keeps_return_volatility_in_percent() {
        let agg = SignalAggregator::new(
            ScoringWeights {
                expected_return: 0.0,
                dividend_yield: 0.0,
                volatility: 1.0,
                sentiment: 0.0,
            },
            ScoreNormalization::Relative,
        );

        // alternating +2% / -2% days on a 200 price
        let mut closes = vec![200.0];
        for i in 0..20 {
            let last = closes[closes.len() - 1];
            closes.push(if i % 2 == 0 { last * 1.02 } else { last / 1.02 });
        }
        let measure = VolatilityMeasure::RollingReturns {
            window: crate::volatility::ROLLING_RETURN_WINDOW,
        };
        let vol = measure.measure(&closes).unwrap();
        let price = closes[closes.len() - 1];

        let penalty = -agg.composite_score(0.0, None, Some(vol), measure.unit(), None, price);
        assert_relative_eq!(penalty, vol * 100.0, epsilon = 1e-12);
        assert!(penalty > 1.5 && penalty < 2.5);

        let price_vol = VolatilityMeasure::PriceStd.measure(&closes).unwrap();
        let penalty =
            -agg.composite_score(0.0, None, Some(price_vol), VolatilityUnit::Price, None, price);
        assert_relative_eq!(penalty, price_vol / price * 100.0, epsilon = 1e-12);
    }

    #[test]
    fn test_raw_normalization_ignores_volatility_unit() {
        let agg = SignalAggregator::default();
        let price = agg.composite_score(0.0, None, Some(0.5), VolatilityUnit::Price, None, 80.0);
        let fraction =
            agg.composite_score(0.0, None, Some(0.5), VolatilityUnit::Fraction, None, 80.0);
        assert_relative_eq!(price, fraction, epsilon = 1e-12);
        assert_relative_eq!(price, -0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_non_positive_price_is_degenerate() {
        let agg = SignalAggregator::default();
        assert!(matches!(
            agg.aggregate(&forecast(0.0, 10.0), &SignalInputs::default()),
            Err(PickError::Degenerate(_))
        ));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let weights = ScoringWeights {
            volatility: -0.2,
            ..Default::default()
        };
        assert!(matches!(weights.validate(), Err(PickError::InvalidConfig(_))));
        assert!(ScoringWeights::default().validate().is_ok());
    }
}
