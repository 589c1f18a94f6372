use nalgebra::{DMatrix, DVector};

use crate::dataset::WindowedDataset;
use crate::error::ForecastError;
use crate::Forecaster;

/// Singular values below this fraction of the largest are treated as zero.
const RANK_TOLERANCE: f64 = 1e-10;

/// Ordinary least squares over the flattened window plus an intercept.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearForecaster;

#[derive(Debug, Clone)]
pub struct LinearModel {
    coefficients: DVector<f64>,
    intercept: f64,
}

impl LinearModel {
    pub fn coefficients(&self) -> &[f64] {
        self.coefficients.as_slice()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl LinearForecaster {
    pub fn new() -> Self {
        Self
    }
}

impl Forecaster for LinearForecaster {
    type Model = LinearModel;

    fn name(&self) -> &'static str {
        "linear"
    }

    fn fit(&self, dataset: &WindowedDataset) -> Result<LinearModel, ForecastError> {
        if dataset.is_empty() {
            return Err(ForecastError::EmptyDataset);
        }

        let rows = dataset.len();
        let width = dataset.window_size();
        let windows = dataset.windows();

        let design = DMatrix::from_fn(rows, width + 1, |r, c| {
            if c == width {
                1.0
            } else {
                windows[r][c]
            }
        });
        let targets = DVector::from_column_slice(dataset.labels());

        if design.iter().chain(targets.iter()).any(|v| !v.is_finite()) {
            return Err(ForecastError::NonFinite);
        }

        // Minimum-norm least squares; stays well defined when window columns are collinear.
        let svd = design.svd(true, true);
        let largest = svd.singular_values.max();
        if largest <= 0.0 {
            return Err(ForecastError::Degenerate("all-zero design matrix".to_string()));
        }
        let beta = svd
            .solve(&targets, largest * RANK_TOLERANCE)
            .map_err(|e| ForecastError::Training(e.to_string()))?;

        if beta.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::Degenerate(
                "least squares produced non-finite weights".to_string(),
            ));
        }

        Ok(LinearModel {
            coefficients: DVector::from_iterator(width, beta.iter().take(width).copied()),
            intercept: beta[width],
        })
    }

    fn predict_next(&self, model: &LinearModel, window: &[f64]) -> Result<f64, ForecastError> {
        if window.len() != model.coefficients.len() {
            return Err(ForecastError::ShapeMismatch {
                expected: model.coefficients.len(),
                got: window.len(),
            });
        }

        let prediction = model
            .coefficients
            .iter()
            .zip(window)
            .map(|(c, x)| c * x)
            .sum::<f64>()
            + model.intercept;

        if prediction.is_finite() {
            Ok(prediction)
        } else {
            Err(ForecastError::NonFinite)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::last_window;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_linear_ramp_extrapolates() {
        let series: Vec<f64> = (10..40).map(|v| v as f64).collect();
        let ds = WindowedDataset::build(&series, 5);
        let forecaster = LinearForecaster::new();

        let model = forecaster.fit(&ds).unwrap();
        let next = forecaster
            .predict_next(&model, last_window(&series, 5).unwrap())
            .unwrap();

        assert_abs_diff_eq!(next, 40.0, epsilon = 0.5);
    }

    #[test]
    fn test_recovers_ar_coefficients() {
        // x[t] = 0.6 x[t-1] + 0.3 x[t-2] + 1.0, seeded with non-collinear values
        let mut series = vec![3.0, 7.0];
        for t in 2..60 {
            let shock = if t % 3 == 0 { 0.5 } else { -0.25 };
            let next = 0.6 * series[t - 1] + 0.3 * series[t - 2] + 1.0 + shock;
            series.push(next);
        }
        let ds = WindowedDataset::build(&series, 2);
        let forecaster = LinearForecaster::new();
        let model = forecaster.fit(&ds).unwrap();

        for (window, label) in ds.iter().take(5) {
            let predicted = forecaster.predict_next(&model, window).unwrap();
            assert_abs_diff_eq!(predicted, label, epsilon = 1.0);
        }
    }

    #[test]
    fn test_window_length_checked() {
        let series: Vec<f64> = (0..20).map(|v| (v as f64).sin()).collect();
        let ds = WindowedDataset::build(&series, 4);
        let forecaster = LinearForecaster::new();
        let model = forecaster.fit(&ds).unwrap();

        assert!(matches!(
            forecaster.predict_next(&model, &[1.0, 2.0]),
            Err(ForecastError::ShapeMismatch { expected: 4, got: 2 })
        ));
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let ds = WindowedDataset::build(&[1.0, 2.0], 5);
        assert!(matches!(
            LinearForecaster::new().fit(&ds),
            Err(ForecastError::EmptyDataset)
        ));
    }
}
