//! Scoring and ranking for one analysis pass
//!
//! Turns forecasts plus optional enrichment into investment signals, orders
//! them, and sizes a simulated position in the winner.

pub mod aggregator;
pub mod allocation;
pub mod ranker;
pub mod volatility;

pub use aggregator::{
    expected_return_pct, ScoreNormalization, ScoringWeights, SignalAggregator, SignalInputs,
};
pub use allocation::{simulate_investment, Allocation};
pub use ranker::{rank_signals, RankedUniverse, RankingKey};
pub use volatility::{
    price_std, rolling_return_std, VolatilityMeasure, VolatilityUnit, ROLLING_RETURN_WINDOW,
};
