use std::collections::HashSet;
use std::str::FromStr;

use forecast_core::PickError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockUniverse {
    Custom(Vec<String>),
    /// The ten large caps the picker has always screened.
    Original,
    PopularStocks,
    TechStocks,
    BlueChips,
}

impl Default for StockUniverse {
    fn default() -> Self {
        StockUniverse::Original
    }
}

impl StockUniverse {
    pub fn get_symbols(&self) -> Vec<String> {
        let preset: &[&str] = match self {
            StockUniverse::Custom(symbols) => return symbols.clone(),
            StockUniverse::Original => &[
                "AAPL", "GOOG", "MSFT", "AMZN", "TSLA", "NFLX", "META", "NVDA", "DIS", "BA",
            ],
            StockUniverse::PopularStocks => &[
                "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "TSLA", "META", "BRK.B", "V", "JPM",
                "WMT", "MA", "PG", "HD", "DIS", "NFLX", "ADBE", "CRM", "CSCO", "INTC", "AMD",
                "PYPL", "COST", "PEP", "TMO", "MRK", "ABBV", "NKE", "CVX", "MCD",
            ],
            StockUniverse::TechStocks => &[
                "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "TSLA", "META", "NFLX", "ADBE", "CRM",
                "CSCO", "INTC", "AMD", "PYPL", "ORCL", "IBM", "QCOM", "NOW", "SNOW", "ZM",
            ],
            StockUniverse::BlueChips => &[
                "AAPL", "MSFT", "JPM", "JNJ", "V", "WMT", "PG", "MA", "HD", "DIS", "CVX", "MCD",
                "KO", "PEP", "CSCO", "VZ", "INTC", "MRK", "ABBV", "NKE",
            ],
        };
        preset.iter().map(|s| s.to_string()).collect()
    }

    /// Normalised, de-duplicated symbols capped at `max`. First occurrence wins.
    pub fn resolve(&self, max: usize) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut symbols: Vec<String> = self
            .get_symbols()
            .into_iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .filter(|s| seen.insert(s.clone()))
            .collect();

        if symbols.len() > max {
            tracing::warn!(
                "Universe has {} symbols, truncating to the first {}",
                symbols.len(),
                max
            );
            symbols.truncate(max);
        }
        symbols
    }
}

impl FromStr for StockUniverse {
    type Err = PickError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "original" | "default" => Ok(StockUniverse::Original),
            "popular" | "popular-stocks" => Ok(StockUniverse::PopularStocks),
            "tech" | "tech-stocks" => Ok(StockUniverse::TechStocks),
            "bluechips" | "blue-chips" => Ok(StockUniverse::BlueChips),
            other => Err(PickError::InvalidConfig(format!(
                "unknown universe '{}', expected original, popular, tech or blue-chips",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_original_universe() {
        let symbols = StockUniverse::Original.get_symbols();
        assert_eq!(symbols.len(), 10);
        assert_eq!(symbols[0], "AAPL");
        assert!(symbols.contains(&"META".to_string()));
    }

    #[test]
    fn test_resolve_dedups_and_caps() {
        let custom = StockUniverse::Custom(vec![
            "aapl".to_string(),
            "MSFT".to_string(),
            " AAPL ".to_string(),
            "".to_string(),
            "NVDA".to_string(),
        ]);
        assert_eq!(custom.resolve(20), vec!["AAPL", "MSFT", "NVDA"]);
        assert_eq!(custom.resolve(2), vec!["AAPL", "MSFT"]);
        assert_eq!(StockUniverse::PopularStocks.resolve(20).len(), 20);
    }

    #[test]
    fn test_parse_preset_names() {
        assert_eq!("tech".parse::<StockUniverse>().unwrap(), StockUniverse::TechStocks);
        assert_eq!("Blue-Chips".parse::<StockUniverse>().unwrap(), StockUniverse::BlueChips);
        assert!("nasdaq".parse::<StockUniverse>().is_err());
    }
}
