use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::dataset::WindowedDataset;
use crate::error::ForecastError;
use crate::recurrent::{RecurrentConfig, RecurrentForecaster};
use crate::Forecaster;

#[derive(Debug, Clone, PartialEq)]
pub struct TuningGrid {
    pub batch_sizes: Vec<usize>,
    pub epochs: Vec<usize>,
    pub folds: usize,
}

impl Default for TuningGrid {
    fn default() -> Self {
        Self {
            batch_sizes: vec![8, 16, 32, 64],
            epochs: vec![3, 5, 10, 20, 30],
            folds: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub batch_size: usize,
    pub epochs: usize,
    pub mean_mse: f64,
}

#[derive(Debug, Clone)]
pub struct TuningOutcome {
    pub best: RecurrentConfig,
    /// Every evaluated candidate, in grid order.
    pub scores: Vec<CandidateScore>,
}

/// Mean validation MSE over expanding-window folds.
///
/// The dataset is cut into `folds + 1` equal blocks; fold `k` trains on blocks
/// `0..k` and validates on block `k`. Validation data always comes after the
/// training data.
pub fn walk_forward_mse<F: Forecaster>(
    forecaster: &F,
    dataset: &WindowedDataset,
    folds: usize,
) -> Result<f64, ForecastError> {
    if folds == 0 {
        return Err(ForecastError::InvalidConfig("folds must be positive".to_string()));
    }
    let block = dataset.len() / (folds + 1);
    if block == 0 {
        return Err(ForecastError::InsufficientHistory {
            needed: folds + 1,
            got: dataset.len(),
        });
    }

    let mut total = 0.0;
    for k in 1..=folds {
        let train = dataset.slice(0..k * block);
        let validation = dataset.slice(k * block..(k + 1) * block);
        let model = forecaster.fit(&train)?;

        let mut squared = 0.0;
        for (window, label) in validation.iter() {
            let err = forecaster.predict_next(&model, window)? - label;
            squared += err * err;
        }
        total += squared / validation.len() as f64;
    }

    Ok(total / folds as f64)
}

/// Exhaustive search over batch size and epoch count for the recurrent strategy.
///
/// Other fields of `base` carry through unchanged. Ties keep the earlier
/// candidate; a candidate whose folds fail to train is skipped. A set `cancel`
/// aborts the search with `ForecastError::Cancelled`.
pub fn grid_search(
    base: &RecurrentConfig,
    grid: &TuningGrid,
    dataset: &WindowedDataset,
    cancel: &CancelToken,
) -> Result<TuningOutcome, ForecastError> {
    if grid.batch_sizes.is_empty() || grid.epochs.is_empty() {
        return Err(ForecastError::InvalidConfig("tuning grid is empty".to_string()));
    }
    if dataset.len() / (grid.folds + 1) == 0 {
        return Err(ForecastError::InsufficientHistory {
            needed: grid.folds + 1,
            got: dataset.len(),
        });
    }

    let mut best: Option<(RecurrentConfig, f64)> = None;
    let mut scores = Vec::with_capacity(grid.batch_sizes.len() * grid.epochs.len());

    for &batch_size in &grid.batch_sizes {
        for &epochs in &grid.epochs {
            let candidate = RecurrentConfig {
                batch_size,
                epochs,
                ..base.clone()
            };

            if cancel.is_cancelled() {
                return Err(ForecastError::Cancelled);
            }

            let forecaster =
                RecurrentForecaster::new(candidate.clone()).with_cancel(cancel.clone());
            let mean_mse = match walk_forward_mse(&forecaster, dataset, grid.folds) {
                Ok(mse) if mse.is_finite() => mse,
                Ok(_) => {
                    warn!(
                        batch_size,
                        epochs, "Skipping candidate with non-finite validation error"
                    );
                    continue;
                }
                Err(e @ (ForecastError::InvalidConfig(_) | ForecastError::Cancelled)) => {
                    return Err(e)
                }
                Err(e) => {
                    warn!(
                        batch_size,
                        epochs,
                        error = %e,
                        "Skipping candidate that failed to train"
                    );
                    continue;
                }
            };

            debug!(batch_size, epochs, mean_mse, "Evaluated candidate");
            scores.push(CandidateScore {
                batch_size,
                epochs,
                mean_mse,
            });

            let improves = best.as_ref().map_or(true, |(_, score)| mean_mse < *score);
            if improves {
                best = Some((candidate, mean_mse));
            }
        }
    }

    match best {
        Some((best, _)) => Ok(TuningOutcome { best, scores }),
        None => Err(ForecastError::Training(
            "no tuning candidate produced a finite validation error".to_string(),
        )),
    }
}
