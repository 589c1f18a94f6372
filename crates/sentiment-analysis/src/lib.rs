//! Headline sentiment: keyword counting with short-range negation, and a
//! soft-failing fetch over any news source.

use std::collections::HashSet;
use std::sync::Arc;

use forecast_core::{NewsArticle, NewsProvider};
use tracing::{debug, warn};

const POSITIVE_WORDS: &[&str] = &[
    "bullish", "rally", "surge", "gain", "gains", "profit", "growth", "beat", "beats",
    "upgrade", "outperform", "strong", "positive", "rise", "rises", "increase",
    "breakthrough", "innovation", "success", "exceed", "momentum",
    "buy", "recommend", "optimistic", "record", "high", "advance",
    "dividend", "buyback", "repurchase", "accretive", "upside",
    "recovery", "rebound", "expansion", "robust", "accelerating",
    "overweight", "raised", "upgraded", "outpacing", "tailwind",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bearish", "decline", "loss", "losses", "fall", "falls", "plunge", "crash", "miss", "misses",
    "downgrade", "underperform", "weak", "negative", "drop", "drops", "decrease",
    "concern", "risk", "fail", "disappoint", "slump", "sell",
    "warning", "pessimistic", "low", "retreat", "fear", "trouble",
    "dilution", "dilutive", "headwind", "lawsuit", "litigation",
    "recall", "investigation", "probe", "default", "bankruptcy",
    "restructuring", "layoff", "layoffs", "downside", "overvalued", "bubble",
    "underweight", "lowered", "downgraded", "suspended",
];

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "aren't",
    "wasn't", "weren't", "won't", "wouldn't", "couldn't", "shouldn't", "hardly",
    "barely", "neither", "nor", "without",
];

/// A sentiment keyword preceded by a negation within this many words flips sign.
const NEGATION_WINDOW: usize = 3;

/// Counts positive minus negative keywords; the score is unbounded.
#[derive(Debug, Clone)]
pub struct KeywordScorer {
    positive: HashSet<&'static str>,
    negative: HashSet<&'static str>,
    negation: HashSet<&'static str>,
}

impl KeywordScorer {
    pub fn new() -> Self {
        Self {
            positive: POSITIVE_WORDS.iter().copied().collect(),
            negative: NEGATIVE_WORDS.iter().copied().collect(),
            negation: NEGATION_WORDS.iter().copied().collect(),
        }
    }

    pub fn score_text(&self, text: &str) -> f64 {
        let text_lower = text.to_lowercase();
        let words: Vec<&str> = text_lower
            .split(|c: char| {
                c.is_whitespace()
                    || matches!(c, ',' | ';' | '.' | '!' | '?' | ':' | '"' | '(' | ')')
            })
            .filter(|w| !w.is_empty())
            .collect();

        let negation_positions: Vec<usize> = words
            .iter()
            .enumerate()
            .filter(|(_, w)| self.negation.contains(*w))
            .map(|(i, _)| i)
            .collect();

        let mut score: i32 = 0;
        for (i, word) in words.iter().enumerate() {
            let polarity = if self.positive.contains(*word) {
                1
            } else if self.negative.contains(*word) {
                -1
            } else {
                continue;
            };

            let negated = negation_positions
                .iter()
                .any(|&neg| neg < i && i - neg <= NEGATION_WINDOW);

            score += if negated { -polarity } else { polarity };
        }

        score as f64
    }

    /// Sum of title scores across the articles.
    pub fn score_headlines(&self, articles: &[NewsArticle]) -> f64 {
        articles.iter().map(|a| self.score_text(&a.title)).sum()
    }
}

impl Default for KeywordScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetches recent headlines for a ticker and scores them.
#[derive(Clone)]
pub struct NewsSentimentSource {
    provider: Arc<dyn NewsProvider>,
    scorer: KeywordScorer,
    limit: u32,
}

impl NewsSentimentSource {
    pub fn new(provider: Arc<dyn NewsProvider>, limit: u32) -> Self {
        Self {
            provider,
            scorer: KeywordScorer::new(),
            limit,
        }
    }

    /// Never fails: a provider error or an empty feed scores 0.
    pub async fn fetch_sentiment(&self, ticker: &str) -> f64 {
        match self.provider.recent_news(ticker, self.limit).await {
            Ok(articles) if articles.is_empty() => {
                debug!(ticker, "No headlines, neutral sentiment");
                0.0
            }
            Ok(articles) => {
                let score = self.scorer.score_headlines(&articles);
                debug!(ticker, articles = articles.len(), score, "Scored headlines");
                score
            }
            Err(e) => {
                warn!(ticker, error = %e, "News fetch failed, treating sentiment as neutral");
                0.0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use forecast_core::PickError;

    fn article(title: &str) -> NewsArticle {
        NewsArticle {
            id: title.to_string(),
            title: title.to_string(),
            published_utc: Utc::now(),
            description: None,
            source: None,
            tickers: vec!["AAPL".to_string()],
        }
    }

    struct FixedNews(Vec<NewsArticle>);

    #[async_trait]
    impl NewsProvider for FixedNews {
        async fn recent_news(
            &self,
            _ticker: &str,
            limit: u32,
        ) -> Result<Vec<NewsArticle>, PickError> {
            Ok(self.0.iter().take(limit as usize).cloned().collect())
        }
    }

    struct FailingNews;

    #[async_trait]
    impl NewsProvider for FailingNews {
        async fn recent_news(
            &self,
            _ticker: &str,
            _limit: u32,
        ) -> Result<Vec<NewsArticle>, PickError> {
            Err(PickError::Upstream("429 quota exceeded".to_string()))
        }
    }

    #[test]
    fn test_counts_positive_minus_negative() {
        let scorer = KeywordScorer::new();
        assert_eq!(scorer.score_text("Apple shares surge to record high"), 3.0);
        assert_eq!(scorer.score_text("Analysts warn of decline, downgrade follows"), -2.0);
        assert_eq!(scorer.score_text("Company holds annual meeting"), 0.0);
    }

    #[test]
    fn test_negation_flips_nearby_keywords() {
        let scorer = KeywordScorer::new();
        assert_eq!(scorer.score_text("Results were not strong"), -1.0);
        assert_eq!(scorer.score_text("No slump in sight"), 1.0);
        // negation too far back to apply
        assert_eq!(scorer.score_text("Not everyone expected such a strong quarter"), 1.0);
    }

    #[test]
    fn test_headlines_are_summed() {
        let scorer = KeywordScorer::new();
        let articles = vec![
            article("Nvidia rally continues"),
            article("Tesla recall widens"),
            article("Microsoft beats estimates, raises dividend"),
        ];
        assert_eq!(scorer.score_headlines(&articles), 2.0);
    }

    #[tokio::test]
    async fn test_fetch_sentiment_scores_provider_headlines() {
        let source = NewsSentimentSource::new(
            Arc::new(FixedNews(vec![article("Strong growth ahead"), article("Weak guidance")])),
            20,
        );
        assert_eq!(source.fetch_sentiment("AAPL").await, 1.0);
    }

    #[tokio::test]
    async fn test_fetch_sentiment_fails_soft() {
        let failing = NewsSentimentSource::new(Arc::new(FailingNews), 20);
        assert_eq!(failing.fetch_sentiment("AAPL").await, 0.0);

        let empty = NewsSentimentSource::new(Arc::new(FixedNews(Vec::new())), 20);
        assert_eq!(empty.fetch_sentiment("AAPL").await, 0.0);
    }
}
