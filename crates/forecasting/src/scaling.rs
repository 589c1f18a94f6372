use crate::error::ForecastError;

/// Min-max transform fitted on one ticker's own history.
///
/// Owned by that ticker's forecast; the same instance that scaled the inputs
/// inverts the prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScalingContext {
    min: f64,
    max: f64,
}

impl ScalingContext {
    pub fn fit(series: &[f64]) -> Result<Self, ForecastError> {
        if series.is_empty() {
            return Err(ForecastError::EmptyDataset);
        }
        if series.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::NonFinite);
        }

        let min = series.iter().copied().fold(f64::INFINITY, f64::min);
        let max = series.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        if max - min <= f64::EPSILON * max.abs().max(1.0) {
            return Err(ForecastError::Degenerate(format!(
                "constant series at {:.4}",
                min
            )));
        }

        Ok(Self { min, max })
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn scale(&self, value: f64) -> f64 {
        (value - self.min) / (self.max - self.min)
    }

    pub fn inverse(&self, scaled: f64) -> f64 {
        scaled * (self.max - self.min) + self.min
    }

    pub fn scale_all(&self, series: &[f64]) -> Vec<f64> {
        series.iter().map(|v| self.scale(*v)).collect()
    }
}
