//! Walk-forward single-step price forecasting.
//!
//! A close series is cut into fixed-length windows labelled with the next
//! close, optionally min-max scaled per ticker, and fed to one of two
//! interchangeable strategies: ordinary least squares over the flattened
//! window, or a small two-layer recurrent regressor. The production forecast
//! always comes from the last window of the series.

pub mod cancel;
pub mod dataset;
pub mod error;
pub mod linear;
pub mod recurrent;
pub mod scaling;
pub mod strategy;
pub mod tuning;

pub use cancel::{CancelOnDrop, CancelToken};
pub use dataset::{last_window, WindowedDataset};
pub use error::ForecastError;
pub use linear::{LinearForecaster, LinearModel};
pub use recurrent::{RecurrentConfig, RecurrentForecaster, RecurrentModel};
pub use scaling::ScalingContext;
pub use strategy::{
    forecast_next_close, forecast_next_close_cancellable, ForecastConfig, ForecastStrategy,
};
pub use tuning::{grid_search, walk_forward_mse, CandidateScore, TuningGrid, TuningOutcome};

/// Fit on a windowed dataset, then predict the value following a window.
pub trait Forecaster: Send + Sync {
    type Model: Send;

    fn name(&self) -> &'static str;

    fn fit(&self, dataset: &WindowedDataset) -> Result<Self::Model, ForecastError>;

    fn predict_next(&self, model: &Self::Model, window: &[f64]) -> Result<f64, ForecastError>;
}
