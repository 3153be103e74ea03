// Signal Engine
// Orchestrates one analysis run from multi-timeframe windows to the
// ConsensusVerdict, plus background training and weight persistence

use crate::algorithmic::AlgorithmicSignalGenerator;
use crate::config::EngineConfig;
use crate::consensus::{ConsensusInput, RegimeWeightedConsensus};
use crate::features::FeatureExtractor;
use crate::neural::{NeuralInferenceEngine, TrainingExample, TrainingSummary};
use crate::regime::RegimeClassifier;
use crate::storage::WeightStore;
use crate::tri_modular::TriModularAnalyzer;
use crate::veto::{ConsensusVerdict, QualityScorer, VerdictParts, VetoHierarchy};
use crate::{Result, SignalError};
use common::{Direction, MarketContext, MultiTimeframeWindows, PriceWindow};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Signal fusion engine
pub struct SignalEngine {
    config: EngineConfig,
    features: FeatureExtractor,
    neural: NeuralInferenceEngine,
    regime: RegimeClassifier,
    algorithmic: AlgorithmicSignalGenerator,
    consensus: RegimeWeightedConsensus,
    tri_modular: TriModularAnalyzer,
    scorer: QualityScorer,
    veto: VetoHierarchy,
    weight_store: Option<Arc<dyn WeightStore>>,
}

impl SignalEngine {
    /// Create an engine with seeded, untrained weights
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        info!(
            primary = %config.primary_timeframe,
            timeframes = config.algorithmic.required_timeframes.len(),
            "Creating signal engine"
        );

        Ok(Self {
            features: FeatureExtractor::new(),
            neural: NeuralInferenceEngine::new(config.neural.clone()),
            regime: RegimeClassifier::new(config.regime.clone()),
            algorithmic: AlgorithmicSignalGenerator::new(
                config.algorithmic.clone(),
                config.primary_timeframe,
            ),
            consensus: RegimeWeightedConsensus::new(config.consensus.clone()),
            tri_modular: TriModularAnalyzer::new(config.tri_modular.clone()),
            scorer: QualityScorer::new(config.veto.clone()),
            veto: VetoHierarchy::new(config.veto.clone()),
            weight_store: None,
            config,
        })
    }

    /// Set weight storage
    pub fn with_weight_store(mut self, store: Arc<dyn WeightStore>) -> Self {
        info!("Setting weight store");
        self.weight_store = Some(store);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn neural(&self) -> &NeuralInferenceEngine {
        &self.neural
    }

    /// Run the full pipeline for one asset.
    ///
    /// One weight snapshot is pinned for the whole run, and every time-based
    /// judgement uses the primary window's last sample, so repeated calls
    /// with the same inputs and snapshot serialise to identical bytes.
    pub fn analyze(
        &self,
        asset: &str,
        windows: &MultiTimeframeWindows,
        context: Option<&MarketContext>,
    ) -> Result<ConsensusVerdict> {
        let primary_tf = self.config.primary_timeframe;
        let primary = windows
            .get(primary_tf)
            .ok_or(SignalError::MissingTimeframe(primary_tf))?;
        let as_of = primary
            .last()
            .map(|s| s.timestamp)
            .ok_or(SignalError::InsufficientData {
                component: "signal engine",
                required: self.config.features.min_length,
                actual: 0,
            })?;

        let weights = self.neural.snapshot();
        debug!(asset, window_id = %primary.id(), version = weights.version(), "Analysis started");

        let features = self.features.extract(primary, self.config.features.min_length)?;
        let neural = NeuralInferenceEngine::infer(&weights, &features);
        let regime = self.regime.classify(primary)?;
        let algorithmic = self.algorithmic.analyze(windows)?;

        let input = ConsensusInput::new(regime, neural, algorithmic)?;
        let consensus = self.consensus.combine(&input);
        let tri_modular = self.tri_modular.analyze(primary, &consensus, context)?;
        let base = self.scorer.score(input.algorithmic(), input.neural());

        let verdict = self.veto.verdict(VerdictParts {
            asset,
            as_of,
            base: &base,
            consensus: &consensus,
            tri_modular: &tri_modular,
            algorithmic: input.algorithmic(),
            neural: input.neural(),
        });

        info!(
            asset,
            window_id = %verdict.window_id,
            regime = %verdict.regime,
            direction = %verdict.direction,
            recommendation = %verdict.trade_recommendation,
            score = verdict.final_quality_score,
            base = verdict.base_quality_score,
            capped = verdict.capped_by.len(),
            version = verdict.weights_version,
            "Analysis complete"
        );

        Ok(verdict)
    }

    /// Labelled example from a window, using the engine's feature floor
    pub fn training_example(&self, window: &PriceWindow, label: Direction) -> Result<TrainingExample> {
        Ok(TrainingExample {
            features: self.features.extract(window, self.config.features.min_length)?,
            label,
        })
    }

    /// Train synchronously; intended for offline use
    pub fn train(&self, batch: &[TrainingExample]) -> Result<TrainingSummary> {
        self.neural.train(batch)
    }

    /// Train on the blocking pool; analysis keeps running on the previous
    /// snapshot until the new one is published
    pub async fn train_in_background(
        self: Arc<Self>,
        batch: Vec<TrainingExample>,
    ) -> Result<TrainingSummary> {
        tokio::task::spawn_blocking(move || self.neural.train(&batch))
            .await
            .map_err(|e| SignalError::Training(format!("training task failed: {}", e)))?
    }

    /// Load weights from the configured store. Any failure keeps the current
    /// weights; returns whether stored weights were applied.
    pub async fn restore_weights(&self) -> bool {
        let Some(store) = &self.weight_store else {
            debug!("No weight store configured");
            return false;
        };

        match store.load().await {
            Ok(Some(bytes)) => match self.neural.load_weights(&bytes) {
                Ok(()) => {
                    info!(version = self.neural.snapshot().version(), "Restored neural weights");
                    true
                }
                Err(e) => {
                    warn!("Stored weights rejected, keeping initialised weights: {}", e);
                    false
                }
            },
            Ok(None) => {
                info!("No stored weights, using initialised weights");
                false
            }
            Err(e) => {
                warn!("Failed to read weight store, keeping initialised weights: {}", e);
                false
            }
        }
    }

    /// Save the current snapshot to the configured store
    pub async fn persist_weights(&self) -> anyhow::Result<bool> {
        let Some(store) = &self.weight_store else {
            return Ok(false);
        };
        let bytes = self.neural.export_weights()?;
        store.save(&bytes).await?;
        info!(
            version = self.neural.snapshot().version(),
            size = bytes.len(),
            "Persisted neural weights"
        );
        Ok(true)
    }
}

impl std::fmt::Debug for SignalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalEngine")
            .field("primary", &self.config.primary_timeframe)
            .field("neural", &self.neural)
            .field("weight_store", &self.weight_store.is_some())
            .finish()
    }
}
