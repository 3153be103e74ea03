//! Engine configuration
//!
//! Every threshold used by the fusion pipeline lives here as a named field.
//! Components receive their own section by value; nothing reads constants
//! from anywhere else.

use crate::{Result, SignalError};
use common::Timeframe;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound for staleness and macro-event windows (one year)
pub const MAX_CONTEXT_WINDOW_MINUTES: i64 = 365 * 24 * 60;

/// Root configuration for [`crate::SignalEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Timeframe whose window feeds the feature extractor, regime
    /// classifier and tri-modular analyzer
    #[serde(default = "default_primary_timeframe")]
    pub primary_timeframe: Timeframe,

    #[serde(default)]
    pub features: FeatureConfig,

    #[serde(default)]
    pub neural: NeuralConfig,

    #[serde(default)]
    pub regime: RegimeConfig,

    #[serde(default)]
    pub algorithmic: AlgorithmicConfig,

    #[serde(default)]
    pub consensus: ConsensusConfig,

    #[serde(default)]
    pub tri_modular: TriModularConfig,

    #[serde(default)]
    pub veto: VetoConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            primary_timeframe: default_primary_timeframe(),
            features: FeatureConfig::default(),
            neural: NeuralConfig::default(),
            regime: RegimeConfig::default(),
            algorithmic: AlgorithmicConfig::default(),
            consensus: ConsensusConfig::default(),
            tri_modular: TriModularConfig::default(),
            veto: VetoConfig::default(),
        }
    }
}

fn default_primary_timeframe() -> Timeframe {
    Timeframe::H1
}

/// Feature extraction settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Minimum window length accepted by the extractor
    pub min_length: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self { min_length: 50 }
    }
}

/// Neural engine training and initialisation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeuralConfig {
    pub learning_rate: f64,
    /// Full-batch passes per `train` call
    pub epochs: usize,
    /// Seed for the initial (untrained) weights
    pub init_seed: u64,
}

impl Default for NeuralConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            epochs: 20,
            init_seed: 7,
        }
    }
}

/// Directional-movement regime settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    /// Wilder smoothing period
    pub period: usize,
    /// ADX above this is TRENDING
    pub trending_threshold: f64,
    pub min_length: usize,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            period: 14,
            trending_threshold: 25.0,
            min_length: 30,
        }
    }
}

/// Structural multi-timeframe analysis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlgorithmicConfig {
    /// Timeframes that must be present for a run to proceed
    pub required_timeframes: Vec<Timeframe>,
    /// Minimum samples per timeframe window
    pub min_length: usize,
    /// Bars on each side that a swing point must dominate
    pub swing_strength: usize,
    pub fast_ema: usize,
    pub slow_ema: usize,
    /// Bars used for the order-flow imbalance reading
    pub flow_lookback: usize,
    /// Absolute imbalance (-1..1) required to count as directional flow
    pub flow_threshold: f64,
    /// Bars scanned for unfilled fair-value gaps
    pub gap_lookback: usize,
    /// Confidence reported at full timeframe agreement
    pub max_confidence: f64,
}

impl Default for AlgorithmicConfig {
    fn default() -> Self {
        Self {
            required_timeframes: Timeframe::ALL.to_vec(),
            min_length: 30,
            swing_strength: 2,
            fast_ema: 21,
            slow_ema: 50,
            flow_lookback: 20,
            flow_threshold: 0.2,
            gap_lookback: 20,
            max_confidence: 95.0,
        }
    }
}

/// Algorithmic / neural blend for one regime (fractions summing to 1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeWeights {
    pub algorithmic: f64,
    pub neural: f64,
}

/// Regime-weighted consensus and neural veto settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Neural confidence (0..1) required in a trending regime
    pub base_threshold: f64,
    /// Algorithmic confidence (0..100) above which the threshold relaxes
    pub high_confidence_cutoff: f64,
    /// Amount subtracted from `base_threshold` for high-confidence setups
    pub relaxation: f64,
    pub trending_weights: RegimeWeights,
    pub ranging_weights: RegimeWeights,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            base_threshold: 0.55,
            high_confidence_cutoff: 65.0,
            relaxation: 0.05,
            trending_weights: RegimeWeights {
                algorithmic: 0.7,
                neural: 0.3,
            },
            ranging_weights: RegimeWeights {
                algorithmic: 0.5,
                neural: 0.5,
            },
        }
    }
}

/// Three-layer voting settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriModularConfig {
    pub structural_weight: f64,
    pub momentum_weight: f64,
    pub contextual_weight: f64,
    /// Weighted percentage below which the verdict is AVOID
    pub avoid_floor: f64,
    /// Weighted percentage at which the position size reaches FULL
    pub full_size_at: f64,
    /// Context older than this is stale
    pub stale_after_minutes: i64,
    /// Multiplier on contextual confidence when stale
    pub stale_factor: f64,
    pub macro_event_window_hours: i64,
    /// Multiplier on contextual confidence when a macro event is near
    pub macro_event_factor: f64,
    pub swing_strength: usize,
}

impl Default for TriModularConfig {
    fn default() -> Self {
        Self {
            structural_weight: 0.40,
            momentum_weight: 0.35,
            contextual_weight: 0.25,
            avoid_floor: 50.0,
            full_size_at: 80.0,
            stale_after_minutes: 360,
            stale_factor: 0.5,
            macro_event_window_hours: 24,
            macro_event_factor: 0.5,
            swing_strength: 2,
        }
    }
}

/// Base quality score weights and veto caps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VetoConfig {
    pub neural_filter_cap: u8,
    pub tri_modular_cap: u8,
    /// Fewer confirmations than this yields WAIT_CONFIRMATION
    pub min_confirmations: usize,
    /// More contra signals than this yields AVOID_BAD_TRADE
    pub max_contra_signals: usize,
    pub base_score: i32,
    pub per_confirmation: i32,
    pub max_counted_confirmations: usize,
    pub alignment_bonus: i32,
    pub opposition_penalty: i32,
    pub per_contra_penalty: i32,
    /// Largest partial size (percent) a WAIT_CONFIRMATION verdict may carry
    pub hold_size_cap: u8,
}

impl Default for VetoConfig {
    fn default() -> Self {
        Self {
            neural_filter_cap: 35,
            tri_modular_cap: 30,
            min_confirmations: 3,
            max_contra_signals: 3,
            base_score: 40,
            per_confirmation: 10,
            max_counted_confirmations: 5,
            alignment_bonus: 10,
            opposition_penalty: 15,
            per_contra_penalty: 8,
            hold_size_cap: 50,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| SignalError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SignalError::Configuration(e.to_string()))
    }

    /// Reject values that would break pipeline invariants
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SignalError::Configuration(msg));

        if self.features.min_length < 2 || self.regime.min_length < 2 {
            return invalid("window minimums must be at least 2".to_string());
        }
        if self.algorithmic.min_length < 2 * self.algorithmic.swing_strength + 1 {
            return invalid("algorithmic min_length too short for swing detection".to_string());
        }
        if self.regime.period == 0 {
            return invalid("regime period must be positive".to_string());
        }
        if self.neural.learning_rate <= 0.0 || !self.neural.learning_rate.is_finite() {
            return invalid(format!(
                "learning rate must be positive, got {}",
                self.neural.learning_rate
            ));
        }

        let consensus = &self.consensus;
        if !(0.0..=1.0).contains(&consensus.base_threshold) {
            return invalid(format!(
                "consensus base threshold {} outside 0..1",
                consensus.base_threshold
            ));
        }
        if consensus.relaxation < 0.0 || consensus.relaxation > consensus.base_threshold {
            return invalid(format!(
                "relaxation {} must lie within 0..base threshold",
                consensus.relaxation
            ));
        }
        if !(0.0..=100.0).contains(&consensus.high_confidence_cutoff) {
            return invalid("high confidence cutoff outside 0..100".to_string());
        }
        for (name, weights) in [
            ("trending", consensus.trending_weights),
            ("ranging", consensus.ranging_weights),
        ] {
            if weights.algorithmic < 0.0
                || weights.neural < 0.0
                || (weights.algorithmic + weights.neural - 1.0).abs() > 1e-6
            {
                return invalid(format!("{} regime weights must be >= 0 and sum to 1", name));
            }
        }

        let tri = &self.tri_modular;
        let layer_sum = tri.structural_weight + tri.momentum_weight + tri.contextual_weight;
        if (layer_sum - 1.0).abs() > 1e-6
            || [tri.structural_weight, tri.momentum_weight, tri.contextual_weight]
                .iter()
                .any(|w| *w < 0.0)
        {
            return invalid(format!("tri-modular layer weights sum to {}", layer_sum));
        }
        if !(0.0 < tri.avoid_floor && tri.avoid_floor < tri.full_size_at && tri.full_size_at <= 100.0)
        {
            return invalid("require 0 < avoid_floor < full_size_at <= 100".to_string());
        }
        for (name, factor) in [
            ("stale_factor", tri.stale_factor),
            ("macro_event_factor", tri.macro_event_factor),
        ] {
            if !(0.0..=1.0).contains(&factor) {
                return invalid(format!("{} {} outside 0..1", name, factor));
            }
        }
        if !(1..=MAX_CONTEXT_WINDOW_MINUTES).contains(&tri.stale_after_minutes) {
            return invalid(format!(
                "stale_after_minutes {} outside 1..{}",
                tri.stale_after_minutes, MAX_CONTEXT_WINDOW_MINUTES
            ));
        }
        if !(1..=MAX_CONTEXT_WINDOW_MINUTES / 60).contains(&tri.macro_event_window_hours) {
            return invalid(format!(
                "macro_event_window_hours {} outside 1..{}",
                tri.macro_event_window_hours,
                MAX_CONTEXT_WINDOW_MINUTES / 60
            ));
        }

        let veto = &self.veto;
        if veto.neural_filter_cap > 100 || veto.tri_modular_cap > 100 {
            return invalid("veto caps must be within 0..100".to_string());
        }
        if !(1..=99).contains(&veto.hold_size_cap) {
            return invalid(format!(
                "hold size cap {} outside 1..99",
                veto.hold_size_cap
            ));
        }

        let algorithmic = &self.algorithmic;
        if algorithmic.required_timeframes.is_empty() {
            return invalid("at least one timeframe is required".to_string());
        }
        if !algorithmic
            .required_timeframes
            .contains(&self.primary_timeframe)
        {
            return invalid(format!(
                "primary timeframe {} must be a required timeframe",
                self.primary_timeframe
            ));
        }

        Ok(())
    }
}
