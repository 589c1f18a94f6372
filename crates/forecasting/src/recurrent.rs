//! Two stacked tanh recurrent layers with a linear read-out, trained by
//! backpropagation through time and Adam on mean squared error.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::dataset::WindowedDataset;
use crate::error::ForecastError;
use crate::Forecaster;

const ADAM_BETA1: f64 = 0.9;
const ADAM_BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-7;

#[derive(Debug, Clone, PartialEq)]
pub struct RecurrentConfig {
    pub hidden_size: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Epochs without improvement before training stops. `None` always runs every epoch.
    pub patience: Option<usize>,
    pub min_delta: f64,
    /// Global gradient norm ceiling.
    pub clip_norm: f64,
    /// Fixed seed for weight initialisation; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for RecurrentConfig {
    fn default() -> Self {
        Self {
            hidden_size: 50,
            epochs: 50,
            batch_size: 32,
            learning_rate: 0.001,
            patience: Some(5),
            min_delta: 0.0,
            clip_norm: 1.0,
            seed: None,
        }
    }
}

impl RecurrentConfig {
    pub fn validate(&self) -> Result<(), ForecastError> {
        if self.hidden_size == 0 {
            return Err(ForecastError::InvalidConfig("hidden_size must be positive".to_string()));
        }
        if self.epochs == 0 {
            return Err(ForecastError::InvalidConfig("epochs must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(ForecastError::InvalidConfig("batch_size must be positive".to_string()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(ForecastError::InvalidConfig(format!(
                "learning_rate must be a non-negative number, got {}",
                self.learning_rate
            )));
        }
        if !(self.clip_norm > 0.0) {
            return Err(ForecastError::InvalidConfig("clip_norm must be positive".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Params {
    w1x: DVector<f64>,
    w1h: DMatrix<f64>,
    b1: DVector<f64>,
    w2x: DMatrix<f64>,
    w2h: DMatrix<f64>,
    b2: DVector<f64>,
    wo: DVector<f64>,
    bo: f64,
}

/// Hidden states per step; index 0 is the zero initial state.
struct Trace {
    h1: Vec<DVector<f64>>,
    h2: Vec<DVector<f64>>,
}

impl Params {
    fn zeros(hidden: usize) -> Self {
        Self {
            w1x: DVector::zeros(hidden),
            w1h: DMatrix::zeros(hidden, hidden),
            b1: DVector::zeros(hidden),
            w2x: DMatrix::zeros(hidden, hidden),
            w2h: DMatrix::zeros(hidden, hidden),
            b2: DVector::zeros(hidden),
            wo: DVector::zeros(hidden),
            bo: 0.0,
        }
    }

    /// Xavier-uniform weights, zero biases.
    fn init(hidden: usize, rng: &mut StdRng) -> Self {
        let mut uniform = |rows: usize, cols: usize, fan_in: usize, fan_out: usize| {
            let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
            DMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-limit..limit))
        };

        let w1x = uniform(hidden, 1, 1, hidden).column(0).into_owned();
        let w1h = uniform(hidden, hidden, hidden, hidden);
        let w2x = uniform(hidden, hidden, hidden, hidden);
        let w2h = uniform(hidden, hidden, hidden, hidden);
        let wo = uniform(hidden, 1, hidden, 1).column(0).into_owned();

        Self {
            w1x,
            w1h,
            b1: DVector::zeros(hidden),
            w2x,
            w2h,
            b2: DVector::zeros(hidden),
            wo,
            bo: 0.0,
        }
    }

    fn hidden(&self) -> usize {
        self.b1.len()
    }

    fn slices(&self) -> [&[f64]; 8] {
        [
            self.w1x.as_slice(),
            self.w1h.as_slice(),
            self.b1.as_slice(),
            self.w2x.as_slice(),
            self.w2h.as_slice(),
            self.b2.as_slice(),
            self.wo.as_slice(),
            std::slice::from_ref(&self.bo),
        ]
    }

    fn slices_mut(&mut self) -> [&mut [f64]; 8] {
        [
            self.w1x.as_mut_slice(),
            self.w1h.as_mut_slice(),
            self.b1.as_mut_slice(),
            self.w2x.as_mut_slice(),
            self.w2h.as_mut_slice(),
            self.b2.as_mut_slice(),
            self.wo.as_mut_slice(),
            std::slice::from_mut(&mut self.bo),
        ]
    }

    fn forward(&self, window: &[f64]) -> (f64, Trace) {
        let hidden = self.hidden();
        let mut h1 = Vec::with_capacity(window.len() + 1);
        let mut h2 = Vec::with_capacity(window.len() + 1);
        h1.push(DVector::zeros(hidden));
        h2.push(DVector::zeros(hidden));

        for (t, &x) in window.iter().enumerate() {
            let a1 = &self.w1x * x + &self.w1h * &h1[t] + &self.b1;
            let next1 = a1.map(f64::tanh);
            let a2 = &self.w2x * &next1 + &self.w2h * &h2[t] + &self.b2;
            h1.push(next1);
            h2.push(a2.map(f64::tanh));
        }

        let out = self.wo.dot(&h2[window.len()]) + self.bo;
        (out, Trace { h1, h2 })
    }

    /// Accumulates d(loss)/d(params) into `grads` given d(loss)/d(output).
    fn backward(&self, window: &[f64], trace: &Trace, d_out: f64, grads: &mut Params) {
        let steps = window.len();
        grads.wo.axpy(d_out, &trace.h2[steps], 1.0);
        grads.bo += d_out;

        let mut dh2 = &self.wo * d_out;
        let mut dh1_next = DVector::zeros(self.hidden());

        for t in (1..=steps).rev() {
            let h1 = &trace.h1[t];
            let h2 = &trace.h2[t];

            let da2 = dh2.component_mul(&h2.map(|v| 1.0 - v * v));
            grads.w2x.ger(1.0, &da2, h1, 1.0);
            grads.w2h.ger(1.0, &da2, &trace.h2[t - 1], 1.0);
            grads.b2 += &da2;

            let dh1 = self.w2x.tr_mul(&da2) + &dh1_next;
            let da1 = dh1.component_mul(&h1.map(|v| 1.0 - v * v));
            grads.w1x.axpy(window[t - 1], &da1, 1.0);
            grads.w1h.ger(1.0, &da1, &trace.h1[t - 1], 1.0);
            grads.b1 += &da1;

            dh2 = self.w2h.tr_mul(&da2);
            dh1_next = self.w1h.tr_mul(&da1);
        }
    }

    fn clip_global_norm(&mut self, max_norm: f64) {
        let norm = self
            .slices()
            .iter()
            .flat_map(|s| s.iter())
            .map(|g| g * g)
            .sum::<f64>()
            .sqrt();
        if norm > max_norm {
            let factor = max_norm / norm;
            for slice in self.slices_mut() {
                slice.iter_mut().for_each(|g| *g *= factor);
            }
        }
    }
}

struct Adam {
    m: Params,
    v: Params,
    step: i32,
    learning_rate: f64,
}

impl Adam {
    fn new(hidden: usize, learning_rate: f64) -> Self {
        Self {
            m: Params::zeros(hidden),
            v: Params::zeros(hidden),
            step: 0,
            learning_rate,
        }
    }

    fn update(&mut self, params: &mut Params, grads: &Params) {
        self.step += 1;
        let correction1 = 1.0 - ADAM_BETA1.powi(self.step);
        let correction2 = 1.0 - ADAM_BETA2.powi(self.step);
        let lr = self.learning_rate;

        let tensors = params
            .slices_mut()
            .into_iter()
            .zip(self.m.slices_mut())
            .zip(self.v.slices_mut())
            .zip(grads.slices());

        for (((p, m), v), g) in tensors {
            for i in 0..p.len() {
                m[i] = ADAM_BETA1 * m[i] + (1.0 - ADAM_BETA1) * g[i];
                v[i] = ADAM_BETA2 * v[i] + (1.0 - ADAM_BETA2) * g[i] * g[i];
                let m_hat = m[i] / correction1;
                let v_hat = v[i] / correction2;
                p[i] -= lr * m_hat / (v_hat.sqrt() + ADAM_EPSILON);
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecurrentForecaster {
    config: RecurrentConfig,
    cancel: CancelToken,
}

#[derive(Debug, Clone)]
pub struct RecurrentModel {
    params: Params,
    window_size: usize,
    loss_history: Vec<f64>,
    best_loss: f64,
}

impl RecurrentModel {
    /// Mean training loss per completed epoch.
    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    /// Loss of the epoch whose weights the model carries.
    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn epochs_run(&self) -> usize {
        self.loss_history.len()
    }
}

impl RecurrentForecaster {
    pub fn new(config: RecurrentConfig) -> Self {
        Self {
            config,
            cancel: CancelToken::new(),
        }
    }

    /// Training checks `cancel` before every batch and gives up with
    /// `ForecastError::Cancelled` once it is set.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RecurrentConfig {
        &self.config
    }
}

impl Forecaster for RecurrentForecaster {
    type Model = RecurrentModel;

    fn name(&self) -> &'static str {
        "recurrent"
    }

    fn fit(&self, dataset: &WindowedDataset) -> Result<RecurrentModel, ForecastError> {
        self.config.validate()?;
        if dataset.is_empty() {
            return Err(ForecastError::EmptyDataset);
        }
        if dataset
            .iter()
            .any(|(w, label)| !label.is_finite() || w.iter().any(|v| !v.is_finite()))
        {
            return Err(ForecastError::NonFinite);
        }

        let cfg = &self.config;
        let mut rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut params = Params::init(cfg.hidden_size, &mut rng);
        let mut adam = Adam::new(cfg.hidden_size, cfg.learning_rate);

        let samples: Vec<(&[f64], f64)> = dataset.iter().collect();
        let mut best_params = params.clone();
        let mut best_loss = f64::INFINITY;
        let mut stale_epochs = 0usize;
        let mut loss_history = Vec::with_capacity(cfg.epochs);

        for epoch in 0..cfg.epochs {
            let mut loss_sum = 0.0;

            for batch in samples.chunks(cfg.batch_size) {
                if self.cancel.is_cancelled() {
                    debug!(epoch = epoch + 1, "Training cancelled");
                    return Err(ForecastError::Cancelled);
                }
                let mut grads = Params::zeros(cfg.hidden_size);
                let scale = 2.0 / batch.len() as f64;

                for (window, target) in batch {
                    let (out, trace) = params.forward(window);
                    let err = out - target;
                    loss_sum += err * err;
                    params.backward(window, &trace, scale * err, &mut grads);
                }

                grads.clip_global_norm(cfg.clip_norm);
                adam.update(&mut params, &grads);
            }

            let epoch_loss = loss_sum / samples.len() as f64;
            if !epoch_loss.is_finite() {
                return Err(ForecastError::Training(format!(
                    "loss diverged at epoch {}",
                    epoch + 1
                )));
            }
            loss_history.push(epoch_loss);

            if epoch_loss < best_loss - cfg.min_delta {
                best_loss = epoch_loss;
                best_params = params.clone();
                stale_epochs = 0;
            } else {
                stale_epochs += 1;
                if let Some(patience) = cfg.patience {
                    if stale_epochs >= patience {
                        debug!(
                            epoch = epoch + 1,
                            best_loss, "Early stopping, restoring best weights"
                        );
                        break;
                    }
                }
            }
        }

        Ok(RecurrentModel {
            params: best_params,
            window_size: dataset.window_size(),
            loss_history,
            best_loss,
        })
    }

    fn predict_next(&self, model: &RecurrentModel, window: &[f64]) -> Result<f64, ForecastError> {
        if window.len() != model.window_size {
            return Err(ForecastError::ShapeMismatch {
                expected: model.window_size,
                got: window.len(),
            });
        }
        if window.iter().any(|v| !v.is_finite()) {
            return Err(ForecastError::NonFinite);
        }

        let (out, _) = model.params.forward(window);
        if out.is_finite() {
            Ok(out)
        } else {
            Err(ForecastError::NonFinite)
        }
    }
}
