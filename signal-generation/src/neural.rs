// Neural Inference Engine
// Fixed-topology multilayer perceptron (20 -> 64 -> 32 -> 3) with versioned,
// atomically swapped weight snapshots. Readers pin an `Arc` to one snapshot;
// training builds the next version off to the side and publishes it whole.

use crate::config::NeuralConfig;
use crate::features::{FeatureVector, FEATURE_DIM};
use crate::{Result, SignalError};
use common::{Direction, WindowId};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub const HIDDEN_1: usize = 64;
pub const HIDDEN_2: usize = 32;
pub const OUTPUT_CLASSES: usize = 3;

/// Output class order
const CLASSES: [Direction; OUTPUT_CLASSES] = [Direction::Long, Direction::Short, Direction::Neutral];

/// Calibrated neural call for one feature vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuralInferenceResult {
    pub window_id: WindowId,
    pub direction: Direction,
    /// Softmax probability of `direction`, 0..1
    pub confidence: f64,
    /// Softmax output in (LONG, SHORT, NEUTRAL) order
    pub probabilities: [f64; OUTPUT_CLASSES],
    /// Snapshot that produced this result
    pub weights_version: u64,
    /// False while running on seeded, never-trained weights
    pub trained: bool,
}

/// Labelled example for supervised training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExample {
    pub features: FeatureVector,
    pub label: Direction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub loss_before: f64,
    pub loss_after: f64,
    pub samples: usize,
    /// Version published by this training call
    pub version: u64,
}

/// One immutable weight set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkWeights {
    version: u64,
    trained: bool,
    w1: Array2<f64>,
    b1: Array1<f64>,
    w2: Array2<f64>,
    b2: Array1<f64>,
    w3: Array2<f64>,
    b3: Array1<f64>,
}

struct Activations {
    z1: Array1<f64>,
    a1: Array1<f64>,
    z2: Array1<f64>,
    a2: Array1<f64>,
    probabilities: Array1<f64>,
}

impl NetworkWeights {
    /// He-uniform initialisation from a fixed seed
    pub fn initialize(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let w1 = he_uniform(&mut rng, HIDDEN_1, FEATURE_DIM);
        let w2 = he_uniform(&mut rng, HIDDEN_2, HIDDEN_1);
        let w3 = he_uniform(&mut rng, OUTPUT_CLASSES, HIDDEN_2);

        Self {
            version: 0,
            trained: false,
            w1,
            b1: Array1::zeros(HIDDEN_1),
            w2,
            b2: Array1::zeros(HIDDEN_2),
            w3,
            b3: Array1::zeros(OUTPUT_CLASSES),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Output fixed by the class biases alone, whatever the input
    #[cfg(test)]
    pub(crate) fn with_output_bias(bias: [f64; OUTPUT_CLASSES]) -> Self {
        let mut weights = Self::initialize(0);
        weights.w3 = Array2::zeros((OUTPUT_CLASSES, HIDDEN_2));
        weights.b3 = Array1::from(bias.to_vec());
        weights.trained = true;
        weights
    }

    fn validate(&self) -> Result<()> {
        let shapes = [
            ("w1", self.w1.dim(), (HIDDEN_1, FEATURE_DIM)),
            ("w2", self.w2.dim(), (HIDDEN_2, HIDDEN_1)),
            ("w3", self.w3.dim(), (OUTPUT_CLASSES, HIDDEN_2)),
        ];
        for (name, actual, expected) in shapes {
            if actual != expected {
                return Err(SignalError::WeightLoad(format!(
                    "{} has shape {:?}, expected {:?}",
                    name, actual, expected
                )));
            }
        }

        let biases = [
            ("b1", self.b1.len(), HIDDEN_1),
            ("b2", self.b2.len(), HIDDEN_2),
            ("b3", self.b3.len(), OUTPUT_CLASSES),
        ];
        for (name, actual, expected) in biases {
            if actual != expected {
                return Err(SignalError::WeightLoad(format!(
                    "{} has length {}, expected {}",
                    name, actual, expected
                )));
            }
        }

        let finite = [&self.w1, &self.w2, &self.w3]
            .iter()
            .all(|w| w.iter().all(|v| v.is_finite()))
            && [&self.b1, &self.b2, &self.b3]
                .iter()
                .all(|b| b.iter().all(|v| v.is_finite()));
        if !finite {
            return Err(SignalError::WeightLoad("non-finite weight value".to_string()));
        }

        Ok(())
    }

    fn activate(&self, x: ArrayView1<'_, f64>) -> Activations {
        let z1 = self.w1.dot(&x) + &self.b1;
        let a1 = z1.mapv(relu);
        let z2 = self.w2.dot(&a1) + &self.b2;
        let a2 = z2.mapv(relu);
        let logits = self.w3.dot(&a2) + &self.b3;

        Activations {
            z1,
            a1,
            z2,
            a2,
            probabilities: softmax(&logits),
        }
    }

    fn mean_loss(&self, batch: &[TrainingExample]) -> f64 {
        let total: f64 = batch
            .iter()
            .map(|example| {
                let x = ArrayView1::from(&example.features.values()[..]);
                let p = self.activate(x).probabilities[class_index(example.label)];
                -p.max(1e-12).ln()
            })
            .sum();
        total / batch.len() as f64
    }

    /// One full-batch softmax cross-entropy gradient step
    fn gradient_step(&mut self, batch: &[TrainingExample], learning_rate: f64) {
        let mut g_w1 = Array2::<f64>::zeros(self.w1.raw_dim());
        let mut g_b1 = Array1::<f64>::zeros(self.b1.raw_dim());
        let mut g_w2 = Array2::<f64>::zeros(self.w2.raw_dim());
        let mut g_b2 = Array1::<f64>::zeros(self.b2.raw_dim());
        let mut g_w3 = Array2::<f64>::zeros(self.w3.raw_dim());
        let mut g_b3 = Array1::<f64>::zeros(self.b3.raw_dim());

        for example in batch {
            let x = ArrayView1::from(&example.features.values()[..]);
            let act = self.activate(x);

            let mut d3 = act.probabilities.clone();
            d3[class_index(example.label)] -= 1.0;
            g_w3 += &outer(&d3, act.a2.view());
            g_b3 += &d3;

            let d2 = self.w3.t().dot(&d3) * act.z2.mapv(relu_grad);
            g_w2 += &outer(&d2, act.a1.view());
            g_b2 += &d2;

            let d1 = self.w2.t().dot(&d2) * act.z1.mapv(relu_grad);
            g_w1 += &outer(&d1, x);
            g_b1 += &d1;
        }

        let scale = -learning_rate / batch.len() as f64;
        self.w1.scaled_add(scale, &g_w1);
        self.b1.scaled_add(scale, &g_b1);
        self.w2.scaled_add(scale, &g_w2);
        self.b2.scaled_add(scale, &g_b2);
        self.w3.scaled_add(scale, &g_w3);
        self.b3.scaled_add(scale, &g_b3);
    }
}

fn he_uniform(rng: &mut StdRng, rows: usize, cols: usize) -> Array2<f64> {
    let limit = (6.0 / cols as f64).sqrt();
    Array2::from_shape_fn((rows, cols), |_| rng.random_range(-limit..limit))
}

fn relu(x: f64) -> f64 {
    x.max(0.0)
}

fn relu_grad(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn softmax(logits: &Array1<f64>) -> Array1<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp = logits.mapv(|v| (v - max).exp());
    let sum = exp.sum();
    exp / sum
}

fn outer(column: &Array1<f64>, row: ArrayView1<'_, f64>) -> Array2<f64> {
    column
        .view()
        .insert_axis(Axis(1))
        .dot(&row.insert_axis(Axis(0)))
}

fn class_index(direction: Direction) -> usize {
    match direction {
        Direction::Long => 0,
        Direction::Short => 1,
        Direction::Neutral => 2,
    }
}

/// Inference engine holding the current weight snapshot
pub struct NeuralInferenceEngine {
    current: RwLock<Arc<NetworkWeights>>,
    /// Serialises training and loading; never taken by readers
    writer: Mutex<()>,
    config: NeuralConfig,
}

impl NeuralInferenceEngine {
    /// Start from seeded, untrained weights
    pub fn new(config: NeuralConfig) -> Self {
        let weights = NetworkWeights::initialize(config.init_seed);
        Self {
            current: RwLock::new(Arc::new(weights)),
            writer: Mutex::new(()),
            config,
        }
    }

    /// Latest published snapshot; the lock is held only to clone the `Arc`
    pub fn snapshot(&self) -> Arc<NetworkWeights> {
        Arc::clone(&self.current.read())
    }

    fn publish(&self, weights: NetworkWeights) {
        *self.current.write() = Arc::new(weights);
    }

    /// Forward pass against the latest snapshot
    pub fn forward(&self, features: &FeatureVector) -> NeuralInferenceResult {
        Self::infer(&self.snapshot(), features)
    }

    /// Forward pass against a pinned snapshot
    pub fn infer(weights: &NetworkWeights, features: &FeatureVector) -> NeuralInferenceResult {
        let x = ArrayView1::from(&features.values()[..]);
        let probs = weights.activate(x).probabilities;

        // First maximum wins so ties never depend on iteration order
        let mut best = 0;
        for i in 1..OUTPUT_CLASSES {
            if probs[i] > probs[best] {
                best = i;
            }
        }

        let result = NeuralInferenceResult {
            window_id: features.window_id(),
            direction: CLASSES[best],
            confidence: probs[best],
            probabilities: [probs[0], probs[1], probs[2]],
            weights_version: weights.version,
            trained: weights.trained,
        };

        debug!(
            window_id = %result.window_id,
            direction = %result.direction,
            confidence = result.confidence,
            version = result.weights_version,
            "Neural inference"
        );

        result
    }

    /// Backpropagation over `batch`; publishes a new version on success
    pub fn train(&self, batch: &[TrainingExample]) -> Result<TrainingSummary> {
        if batch.is_empty() {
            return Err(SignalError::InsufficientData {
                component: "neural training",
                required: 1,
                actual: 0,
            });
        }

        let _writer = self.writer.lock();
        let base = self.snapshot();
        let mut next = (*base).clone();

        let loss_before = next.mean_loss(batch);
        for _ in 0..self.config.epochs {
            next.gradient_step(batch, self.config.learning_rate);
        }
        let loss_after = next.mean_loss(batch);

        if !loss_after.is_finite() || next.validate().is_err() {
            return Err(SignalError::Training(format!(
                "update diverged (loss {} -> {}), keeping version {}",
                loss_before, loss_after, base.version
            )));
        }

        next.version = base.version + 1;
        next.trained = true;
        let version = next.version;
        self.publish(next);

        info!(
            samples = batch.len(),
            loss_before,
            loss_after,
            version,
            "Published trained weights"
        );

        Ok(TrainingSummary {
            loss_before,
            loss_after,
            samples: batch.len(),
            version,
        })
    }

    /// Serialise the current snapshot
    pub fn export_weights(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&*self.snapshot())?)
    }

    /// Replace the current weights with a previously exported set
    pub fn load_weights(&self, bytes: &[u8]) -> Result<()> {
        let mut loaded: NetworkWeights =
            serde_json::from_slice(bytes).map_err(|e| SignalError::WeightLoad(e.to_string()))?;
        loaded.validate()?;

        let _writer = self.writer.lock();
        // Keep versions monotonic within this process
        loaded.version = loaded.version.max(self.snapshot().version + 1);
        let version = loaded.version;
        self.publish(loaded);

        info!(version, "Loaded neural weights");
        Ok(())
    }
}

impl std::fmt::Debug for NeuralInferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.snapshot();
        f.debug_struct("NeuralInferenceEngine")
            .field("version", &snapshot.version)
            .field("trained", &snapshot.trained)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureExtractor;
    use crate::test_support::trending_window;

    fn engine() -> NeuralInferenceEngine {
        NeuralInferenceEngine::new(NeuralConfig::default())
    }

    fn synthetic_batch() -> Vec<TrainingExample> {
        let id = trending_window(5, 100.0, 1.0).id();
        (0..30)
            .map(|i| {
                let label = match i % 3 {
                    0 => Direction::Long,
                    1 => Direction::Short,
                    _ => Direction::Neutral,
                };
                let mut values = [0.0; FEATURE_DIM];
                values[0] = label.sign();
                values[10] = label.sign() * 0.8;
                values[19] = if label == Direction::Neutral { 1.0 } else { 0.0 };
                TrainingExample {
                    features: FeatureVector::new(id, values),
                    label,
                }
            })
            .collect()
    }

    #[test]
    fn test_forward_returns_calibrated_probabilities() {
        let window = trending_window(60, 100.0, 0.5);
        let features = FeatureExtractor::new().extract(&window, 50).unwrap();
        let result = engine().forward(&features);

        let sum: f64 = result.probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(result.confidence >= 1.0 / 3.0 && result.confidence <= 1.0);
        assert_eq!(result.window_id, window.id());
        assert!(!result.trained);
        assert_eq!(result.weights_version, 0);
    }

    #[test]
    fn test_seeded_initialisation_is_reproducible() {
        assert_eq!(NetworkWeights::initialize(11), NetworkWeights::initialize(11));
        assert_ne!(NetworkWeights::initialize(11), NetworkWeights::initialize(12));
    }

    #[test]
    fn test_training_reduces_loss_and_bumps_version() {
        let engine = engine();
        let summary = engine.train(&synthetic_batch()).unwrap();

        assert!(summary.loss_after < summary.loss_before);
        assert_eq!(summary.version, 1);
        assert_eq!(engine.snapshot().version(), 1);
        assert!(engine.snapshot().is_trained());
    }

    #[test]
    fn test_empty_batch_is_rejected() {
        assert!(matches!(
            engine().train(&[]),
            Err(SignalError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_pinned_snapshot_survives_training() {
        let engine = engine();
        let pinned = engine.snapshot();
        let window = trending_window(60, 100.0, 0.5);
        let features = FeatureExtractor::new().extract(&window, 50).unwrap();
        let before = NeuralInferenceEngine::infer(&pinned, &features);

        engine.train(&synthetic_batch()).unwrap();

        let after_pinned = NeuralInferenceEngine::infer(&pinned, &features);
        assert_eq!(before, after_pinned);
        assert_eq!(engine.forward(&features).weights_version, 1);
    }

    #[test]
    fn test_export_and_load_weights() {
        let source = engine();
        source.train(&synthetic_batch()).unwrap();
        let bytes = source.export_weights().unwrap();

        let target = NeuralInferenceEngine::new(NeuralConfig {
            init_seed: 99,
            ..NeuralConfig::default()
        });
        target.load_weights(&bytes).unwrap();

        let window = trending_window(60, 100.0, 0.5);
        let features = FeatureExtractor::new().extract(&window, 50).unwrap();
        assert_eq!(
            source.forward(&features).probabilities,
            target.forward(&features).probabilities
        );
        assert!(target.snapshot().is_trained());
        // Bit-exact, not merely close
        assert_eq!(source.snapshot().w1, target.snapshot().w1);
        assert_eq!(source.snapshot().b3, target.snapshot().b3);
    }

    #[test]
    fn test_load_rejects_bad_shapes() {
        let engine = engine();
        let mut weights = NetworkWeights::initialize(1);
        weights.w2 = Array2::zeros((HIDDEN_2, HIDDEN_2));
        let bytes = serde_json::to_vec(&weights).unwrap();

        assert!(matches!(
            engine.load_weights(&bytes),
            Err(SignalError::WeightLoad(_))
        ));
        assert!(matches!(
            engine.load_weights(b"not json"),
            Err(SignalError::WeightLoad(_))
        ));
        assert_eq!(engine.snapshot().version(), 0);
    }
}
