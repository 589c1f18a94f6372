use forecast_core::{InvestmentSignal, PickError, PickResult};
use serde::{Deserialize, Serialize};

/// Outcome of putting a fixed amount into one ticker at its current price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub ticker: String,
    pub amount: f64,
    pub shares_to_buy: f64,
    pub projected_value: f64,
    pub projected_profit: f64,
}

pub fn simulate_investment(amount: f64, signal: &InvestmentSignal) -> PickResult<Allocation> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(PickError::InvalidConfig(format!(
            "investment amount must be positive, got {}",
            amount
        )));
    }
    if !signal.current_price.is_finite() || signal.current_price <= 0.0 {
        return Err(PickError::Degenerate(format!(
            "{} has non-positive price {}",
            signal.ticker, signal.current_price
        )));
    }

    let projected_value = amount * (1.0 + signal.expected_return_pct / 100.0);
    Ok(Allocation {
        ticker: signal.ticker.clone(),
        amount,
        shares_to_buy: amount / signal.current_price,
        projected_value,
        projected_profit: projected_value - amount,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use forecast_core::Recommendation;

    fn signal(price: f64, ret: f64) -> InvestmentSignal {
        InvestmentSignal {
            ticker: "DIS".to_string(),
            current_price: price,
            predicted_price: price * (1.0 + ret / 100.0),
            expected_return_pct: ret,
            sentiment_score: None,
            pe_ratio: None,
            dividend_yield: None,
            volatility: None,
            composite_score: 0.0,
            recommendation: Recommendation::from_expected_return(ret),
        }
    }

    #[test]
    fn test_shares_for_amount() {
        let alloc = simulate_investment(100.0, &signal(50.0, 4.0)).unwrap();
        assert_eq!(alloc.shares_to_buy, 2.0);
        assert_relative_eq!(alloc.projected_value, 104.0, epsilon = 1e-9);
        assert_relative_eq!(alloc.projected_profit, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_serializes_for_report() {
        let alloc = simulate_investment(250.0, &signal(125.0, -2.0)).unwrap();
        let json = serde_json::to_value(&alloc).unwrap();
        assert_eq!(json["ticker"], "DIS");
        assert_eq!(json["shares_to_buy"], 2.0);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(matches!(
            simulate_investment(0.0, &signal(50.0, 1.0)),
            Err(PickError::InvalidConfig(_))
        ));
        assert!(matches!(
            simulate_investment(100.0, &signal(0.0, 1.0)),
            Err(PickError::Degenerate(_))
        ));
    }
}
