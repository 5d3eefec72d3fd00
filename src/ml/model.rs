//! Trainable model seam and the built-in binary MLP classifier.

use std::sync::Arc;

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::TrainingSettings;

const PROB_EPS: f32 = 1e-7;

/// A binary classifier that can be fitted batch by batch.
pub trait TrainableModel: Send {
    fn name(&self) -> &str;

    /// Size parameters for rows of `input_len` features.
    ///
    /// Called by the trainer before the first batch; a model already sized
    /// for `input_len` keeps its parameters.
    fn prepare(&mut self, input_len: usize);

    /// One gradient step on a batch. Returns the mean batch loss.
    fn fit_batch(&mut self, x: ArrayView2<'_, f32>, y: ArrayView1<'_, f32>, learning_rate: f32)
    -> f32;

    /// Positive-class probability per row.
    fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Array1<f32>;

    /// Serialized parameters, written when a weights path is configured.
    fn to_json(&self) -> Result<String, serde_json::Error>;
}

/// Produces a fresh, untrained model for each run.
pub type ModelFactory = Arc<dyn Fn() -> Box<dyn TrainableModel> + Send + Sync>;

/// Factory for [`MlpClassifier`] using the configured hyperparameters.
pub fn mlp_factory(settings: &TrainingSettings) -> ModelFactory {
    let options = MlpOptions {
        hidden_size: settings.hidden_size,
        l2_penalty: settings.l2_penalty,
        seed: settings.seed,
    };
    Arc::new(move || Box::new(MlpClassifier::new(options.clone())) as Box<dyn TrainableModel>)
}

#[derive(Debug, Clone)]
pub struct MlpOptions {
    pub hidden_size: usize,
    pub l2_penalty: f32,
    pub seed: u64,
}

impl Default for MlpOptions {
    fn default() -> Self {
        Self {
            hidden_size: 64,
            l2_penalty: 1e-4,
            seed: 42,
        }
    }
}

/// One ReLU hidden layer followed by a sigmoid output, trained with binary
/// cross-entropy and an L2 penalty on the weights.
#[derive(Debug, Clone)]
pub struct MlpClassifier {
    options: MlpOptions,
    weights1: Array2<f32>,
    bias1: Array1<f32>,
    weights2: Array1<f32>,
    bias2: f32,
}

#[derive(Serialize)]
struct MlpWeights<'a> {
    kind: &'static str,
    input_len: usize,
    hidden_size: usize,
    weights1: &'a [f32],
    bias1: &'a [f32],
    weights2: &'a [f32],
    bias2: f32,
}

impl MlpClassifier {
    pub fn new(options: MlpOptions) -> Self {
        let hidden = options.hidden_size.max(1);
        Self {
            options,
            weights1: Array2::zeros((hidden, 0)),
            bias1: Array1::zeros(hidden),
            weights2: Array1::zeros(hidden),
            bias2: 0.0,
        }
    }

    pub fn input_len(&self) -> usize {
        self.weights1.ncols()
    }

    fn forward(&self, x: ArrayView2<'_, f32>) -> (Array2<f32>, Array2<f32>, Array1<f32>) {
        let pre = x.dot(&self.weights1.t()) + &self.bias1;
        let hidden = pre.mapv(|v| v.max(0.0));
        let probs = (hidden.dot(&self.weights2) + self.bias2).mapv(sigmoid);
        (pre, hidden, probs)
    }
}

impl TrainableModel for MlpClassifier {
    fn name(&self) -> &str {
        "mlp"
    }

    fn prepare(&mut self, input_len: usize) {
        if self.input_len() == input_len {
            return;
        }
        let hidden = self.bias1.len();
        let mut rng = StdRng::seed_from_u64(self.options.seed);
        let limit1 = (6.0 / (input_len + hidden) as f32).sqrt();
        let limit2 = (6.0 / (hidden + 1) as f32).sqrt();
        self.weights1 =
            Array2::from_shape_fn((hidden, input_len), |_| rng.random_range(-limit1..limit1));
        self.bias1 = Array1::zeros(hidden);
        self.weights2 = Array1::from_shape_fn(hidden, |_| rng.random_range(-limit2..limit2));
        self.bias2 = 0.0;
    }

    fn fit_batch(
        &mut self,
        x: ArrayView2<'_, f32>,
        y: ArrayView1<'_, f32>,
        learning_rate: f32,
    ) -> f32 {
        let rows = x.nrows();
        if rows == 0 {
            return 0.0;
        }
        let (pre, hidden, probs) = self.forward(x);
        let loss = binary_cross_entropy(probs.view(), y);

        let dz = (&probs - &y) / rows as f32;
        let l2 = self.options.l2_penalty;
        let d_w2 = hidden.t().dot(&dz) + &self.weights2 * l2;
        let d_b2 = dz.sum();
        let mut d_hidden = dz
            .view()
            .insert_axis(Axis(1))
            .dot(&self.weights2.view().insert_axis(Axis(0)));
        d_hidden.zip_mut_with(&pre, |grad, &p| {
            if p <= 0.0 {
                *grad = 0.0;
            }
        });
        let d_w1 = d_hidden.t().dot(&x) + &self.weights1 * l2;
        let d_b1 = d_hidden.sum_axis(Axis(0));

        self.weights1.scaled_add(-learning_rate, &d_w1);
        self.bias1.scaled_add(-learning_rate, &d_b1);
        self.weights2.scaled_add(-learning_rate, &d_w2);
        self.bias2 -= learning_rate * d_b2;
        loss
    }

    fn predict_proba(&self, x: ArrayView2<'_, f32>) -> Array1<f32> {
        self.forward(x).2
    }

    fn to_json(&self) -> Result<String, serde_json::Error> {
        let weights1 = self.weights1.as_standard_layout();
        serde_json::to_string(&MlpWeights {
            kind: "mlp_binary_v1",
            input_len: self.input_len(),
            hidden_size: self.bias1.len(),
            weights1: weights1.as_slice().unwrap_or(&[]),
            bias1: self.bias1.as_slice().unwrap_or(&[]),
            weights2: self.weights2.as_slice().unwrap_or(&[]),
            bias2: self.bias2,
        })
    }
}

fn sigmoid(z: f32) -> f32 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Mean binary cross-entropy with probabilities clamped away from 0 and 1.
pub fn binary_cross_entropy(probs: ArrayView1<'_, f32>, targets: ArrayView1<'_, f32>) -> f32 {
    if probs.is_empty() {
        return 0.0;
    }
    let total: f32 = probs
        .iter()
        .zip(targets.iter())
        .map(|(&p, &t)| {
            let p = p.clamp(PROB_EPS, 1.0 - PROB_EPS);
            -(t * p.ln() + (1.0 - t) * (1.0 - p).ln())
        })
        .sum();
    total / probs.len() as f32
}

/// Share of rows whose thresholded probability matches the target.
pub fn binary_accuracy(probs: ArrayView1<'_, f32>, targets: ArrayView1<'_, f32>) -> f32 {
    if probs.is_empty() {
        return 0.0;
    }
    let correct = probs
        .iter()
        .zip(targets.iter())
        .filter(|&(&p, &t)| (p >= 0.5) == (t >= 0.5))
        .count();
    correct as f32 / probs.len() as f32
}
