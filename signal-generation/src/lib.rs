// Signal Generation Engine
// Fuses a neural classifier, multi-timeframe structural analysis and
// tri-modular voting into one ConsensusVerdict per asset

pub mod algorithmic;
pub mod config;
pub mod consensus;
pub mod error;
pub mod features;
pub mod indicators;
pub mod neural;
pub mod pipeline;
pub mod regime;
pub mod storage;
pub mod tri_modular;
pub mod veto;
pub mod views;

#[cfg(test)]
mod test_support;

pub use algorithmic::{
    AlgorithmicSignal, AlgorithmicSignalGenerator, Evidence, EvidenceKind, KeyLevels,
    SwingStructure, TimeframeVote,
};
pub use config::{
    AlgorithmicConfig, ConsensusConfig, EngineConfig, FeatureConfig, NeuralConfig, RegimeConfig,
    RegimeWeights, TriModularConfig, VetoConfig,
};
pub use consensus::{ConsensusInput, RegimeConsensus, RegimeWeightedConsensus};
pub use error::{Result, SignalError};
pub use features::{FeatureExtractor, FeatureVector, FEATURE_DIM, FEATURE_NAMES};
pub use neural::{
    NetworkWeights, NeuralInferenceEngine, NeuralInferenceResult, TrainingExample,
    TrainingSummary,
};
pub use pipeline::SignalEngine;
pub use regime::{Regime, RegimeClassification, RegimeClassifier};
pub use storage::{FileWeightStore, InMemoryWeightStore, WeightStore, WeightStoreStats};
pub use tri_modular::{
    ContextStatus, PositionSize, TriModularAnalyzer, TriModularLayer, TriModularLayerResult,
    TriModularVerdict, WeightedConfidenceScore,
};
pub use veto::{
    Alignment, AnalysisWarning, BaseQualityScore, CapTag, ConsensusVerdict, Polarity,
    QualityScorer, TradeRecommendation, VerdictParts, VetoHierarchy, VetoOutcome,
};
pub use views::{BadgeTone, DetailPanel, QualityBadge, SummaryBanner};
