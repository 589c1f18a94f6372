//! Orders a pass's signals; the head is the recommendation.

use std::cmp::Ordering;

use forecast_core::InvestmentSignal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingKey {
    #[default]
    CompositeScore,
    /// Raw predicted delta, for runs that ignore the composite score.
    ExpectedReturn,
}

impl RankingKey {
    fn value(&self, signal: &InvestmentSignal) -> f64 {
        match self {
            RankingKey::CompositeScore => signal.composite_score,
            RankingKey::ExpectedReturn => signal.expected_return_pct,
        }
    }
}

/// Signals sorted descending by the ranking key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RankedUniverse {
    key: RankingKey,
    signals: Vec<InvestmentSignal>,
}

impl RankedUniverse {
    pub fn key(&self) -> RankingKey {
        self.key
    }

    pub fn best(&self) -> Option<&InvestmentSignal> {
        self.signals.first()
    }

    pub fn top_n(&self, n: usize) -> &[InvestmentSignal] {
        &self.signals[..n.min(self.signals.len())]
    }

    pub fn iter(&self) -> impl Iterator<Item = &InvestmentSignal> {
        self.signals.iter()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn as_slice(&self) -> &[InvestmentSignal] {
        &self.signals
    }

    pub fn into_vec(self) -> Vec<InvestmentSignal> {
        self.signals
    }
}

/// Stable descending sort: equal keys keep their input order.
pub fn rank_signals(mut signals: Vec<InvestmentSignal>, key: RankingKey) -> RankedUniverse {
    signals.sort_by(|a, b| {
        key.value(b)
            .partial_cmp(&key.value(a))
            .unwrap_or(Ordering::Equal)
    });
    RankedUniverse { key, signals }
}
