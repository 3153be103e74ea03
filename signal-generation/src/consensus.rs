// Regime-Weighted Consensus
// Blends the neural call with the algorithmic bias using regime-dependent
// weights and raises the neural-filter skip flag (first veto authority).

use crate::algorithmic::AlgorithmicSignal;
use crate::config::{ConsensusConfig, RegimeWeights};
use crate::neural::NeuralInferenceResult;
use crate::regime::{Regime, RegimeClassification};
use crate::{Result, SignalError};
use common::{Direction, WindowId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Absorbs float noise when comparing neural confidence to the threshold
const THRESHOLD_EPSILON: f64 = 1e-9;

/// The three upstream results for one window
#[derive(Debug, Clone)]
pub struct ConsensusInput {
    regime: RegimeClassification,
    neural: NeuralInferenceResult,
    algorithmic: AlgorithmicSignal,
}

impl ConsensusInput {
    /// Fails with `InputMismatch` unless all three describe the same window
    pub fn new(
        regime: RegimeClassification,
        neural: NeuralInferenceResult,
        algorithmic: AlgorithmicSignal,
    ) -> Result<Self> {
        if regime.window_id != neural.window_id || regime.window_id != algorithmic.window_id {
            return Err(SignalError::InputMismatch(format!(
                "regime {}, neural {}, algorithmic {}",
                regime.window_id, neural.window_id, algorithmic.window_id
            )));
        }
        Ok(Self {
            regime,
            neural,
            algorithmic,
        })
    }

    pub fn window_id(&self) -> WindowId {
        self.regime.window_id
    }

    pub fn regime(&self) -> &RegimeClassification {
        &self.regime
    }

    pub fn neural(&self) -> &NeuralInferenceResult {
        &self.neural
    }

    pub fn algorithmic(&self) -> &AlgorithmicSignal {
        &self.algorithmic
    }

    pub fn into_parts(self) -> (RegimeClassification, NeuralInferenceResult, AlgorithmicSignal) {
        (self.regime, self.neural, self.algorithmic)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeConsensus {
    pub window_id: WindowId,
    pub regime: Regime,
    pub regime_strength: f64,
    pub neural_direction: Direction,
    /// 0..1
    pub neural_confidence: f64,
    pub algorithmic_bias: Direction,
    /// 0..100
    pub algorithmic_confidence: f64,
    pub weights: RegimeWeights,
    pub weighted_direction: Direction,
    /// 0..100
    pub weighted_confidence: f64,
    pub effective_threshold: f64,
    pub skip_trade: bool,
    pub skip_reason: Option<String>,
    /// Neural and algorithmic calls point in opposite directions
    pub conflict: bool,
}

#[derive(Debug, Clone)]
pub struct RegimeWeightedConsensus {
    config: ConsensusConfig,
}

impl RegimeWeightedConsensus {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn weights_for(&self, regime: Regime) -> RegimeWeights {
        match regime {
            Regime::Trending => self.config.trending_weights,
            Regime::Ranging => self.config.ranging_weights,
        }
    }

    /// Neural confidence floor, relaxed for very confident structure
    pub fn effective_threshold(&self, algorithmic_confidence: f64) -> f64 {
        if algorithmic_confidence > self.config.high_confidence_cutoff {
            self.config.base_threshold - self.config.relaxation
        } else {
            self.config.base_threshold
        }
    }

    pub fn combine(&self, input: &ConsensusInput) -> RegimeConsensus {
        let regime = input.regime().regime;
        let neural = input.neural();
        let algorithmic = input.algorithmic();
        let weights = self.weights_for(regime);

        let conflict = neural.direction.opposes(algorithmic.bias);
        let (weighted_direction, weighted_confidence) = if conflict {
            (Direction::Neutral, 0.0)
        } else {
            let score = weights.algorithmic * algorithmic.bias.sign() * algorithmic.confidence
                + weights.neural * neural.direction.sign() * neural.confidence * 100.0;
            (Direction::from_sign(score), score.abs().min(100.0))
        };

        let effective_threshold = self.effective_threshold(algorithmic.confidence);
        let skip_trade = regime == Regime::Trending
            && neural.confidence + THRESHOLD_EPSILON < effective_threshold;
        let skip_reason = skip_trade.then(|| {
            format!(
                "neural confidence {:.3} below {:.3} threshold in {} regime",
                neural.confidence, effective_threshold, regime
            )
        });

        debug!(
            window_id = %input.window_id(),
            regime = %regime,
            weighted_direction = %weighted_direction,
            weighted_confidence,
            effective_threshold,
            skip_trade,
            conflict,
            "Regime consensus combined"
        );

        RegimeConsensus {
            window_id: input.window_id(),
            regime,
            regime_strength: input.regime().strength,
            neural_direction: neural.direction,
            neural_confidence: neural.confidence,
            algorithmic_bias: algorithmic.bias,
            algorithmic_confidence: algorithmic.confidence,
            weights,
            weighted_direction,
            weighted_confidence,
            effective_threshold,
            skip_trade,
            skip_reason,
            conflict,
        }
    }
}
