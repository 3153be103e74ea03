// Veto Hierarchy / Quality Scorer
// Base quality from evidence counts, then the neural-filter cap and the
// tri-modular AVOID cap applied in that order. Each step can only lower
// the score. The resulting ConsensusVerdict is the one object every
// presentation surface reads.

use crate::algorithmic::{AlgorithmicSignal, Evidence};
use crate::config::VetoConfig;
use crate::consensus::RegimeConsensus;
use crate::neural::NeuralInferenceResult;
use crate::regime::Regime;
use crate::tri_modular::{ContextStatus, PositionSize, TriModularVerdict};
use common::{DateTime, Decimal, Direction, Utc, WindowId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// How the neural call relates to the algorithmic bias
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Alignment {
    Aligned,
    Opposed,
    Unaligned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseQualityScore {
    /// 0..100
    pub score: u8,
    pub confirmations: usize,
    pub contra_signals: usize,
    pub alignment: Alignment,
}

#[derive(Debug, Clone)]
pub struct QualityScorer {
    config: VetoConfig,
}

impl QualityScorer {
    pub fn new(config: VetoConfig) -> Self {
        Self { config }
    }

    /// Score from the evidence computed by the algorithmic generator
    pub fn score(
        &self,
        algorithmic: &AlgorithmicSignal,
        neural: &NeuralInferenceResult,
    ) -> BaseQualityScore {
        let alignment = if algorithmic.bias.is_directional() && neural.direction == algorithmic.bias
        {
            Alignment::Aligned
        } else if neural.direction.opposes(algorithmic.bias) {
            Alignment::Opposed
        } else {
            Alignment::Unaligned
        };
        self.from_counts(
            algorithmic.supporting_factors.len(),
            algorithmic.contra_factors.len(),
            alignment,
        )
    }

    pub fn from_counts(
        &self,
        confirmations: usize,
        contra_signals: usize,
        alignment: Alignment,
    ) -> BaseQualityScore {
        let c = &self.config;
        let counted = confirmations.min(c.max_counted_confirmations) as i32;
        let alignment_points = match alignment {
            Alignment::Aligned => c.alignment_bonus,
            Alignment::Opposed => -c.opposition_penalty,
            Alignment::Unaligned => 0,
        };
        let contra_points =
            c.per_contra_penalty.saturating_mul(i32::try_from(contra_signals).unwrap_or(i32::MAX));
        let raw = (c.base_score + c.per_confirmation * counted + alignment_points)
            .saturating_sub(contra_points);

        BaseQualityScore {
            score: raw.clamp(0, 100) as u8,
            confirmations,
            contra_signals,
            alignment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapTag {
    NeuralFilter,
    TriModularAvoid,
}

impl fmt::Display for CapTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapTag::NeuralFilter => f.write_str("NEURAL_FILTER"),
            CapTag::TriModularAvoid => f.write_str("TRI_MODULAR_AVOID"),
        }
    }
}

/// Coarse meaning of a recommendation, shared by every view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarity {
    Proceed,
    Hold,
    Avoid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeRecommendation {
    Execute,
    WaitConfirmation,
    SkippedNeuralFilter,
    AvoidBadTrade,
}

impl TradeRecommendation {
    pub fn polarity(&self) -> Polarity {
        match self {
            TradeRecommendation::Execute => Polarity::Proceed,
            TradeRecommendation::WaitConfirmation => Polarity::Hold,
            TradeRecommendation::SkippedNeuralFilter | TradeRecommendation::AvoidBadTrade => {
                Polarity::Avoid
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TradeRecommendation::Execute => "EXECUTE",
            TradeRecommendation::WaitConfirmation => "WAIT_CONFIRMATION",
            TradeRecommendation::SkippedNeuralFilter => "SKIPPED_NEURAL_FILTER",
            TradeRecommendation::AvoidBadTrade => "AVOID_BAD_TRADE",
        }
    }
}

impl fmt::Display for TradeRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Non-fatal conditions recovered during the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisWarning {
    StaleContext { age_minutes: i64 },
    MissingContext,
    /// Context was supplied without a fear/greed reading
    MissingSentiment,
    UntrainedWeights,
}

impl fmt::Display for AnalysisWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisWarning::StaleContext { age_minutes } => {
                write!(f, "macro context is {} minutes old", age_minutes)
            }
            AnalysisWarning::MissingContext => f.write_str("macro context unavailable"),
            AnalysisWarning::MissingSentiment => f.write_str("macro context has no sentiment reading"),
            AnalysisWarning::UntrainedWeights => f.write_str("neural weights are untrained"),
        }
    }
}

/// Output of the capping steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VetoOutcome {
    pub final_quality_score: u8,
    pub capped_by: Vec<CapTag>,
    pub trade_recommendation: TradeRecommendation,
    pub direction: Direction,
    pub display_confidence_percentage: u8,
    /// Tri-modular size limited by the recommendation's polarity
    pub position_size: PositionSize,
}

/// The single authoritative result of one analysis run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusVerdict {
    pub asset: String,
    pub window_id: WindowId,
    pub as_of: DateTime<Utc>,
    pub weights_version: u64,
    pub regime: Regime,
    pub direction: Direction,
    pub base_quality_score: u8,
    pub final_quality_score: u8,
    pub capped_by: Vec<CapTag>,
    pub trade_recommendation: TradeRecommendation,
    pub display_confidence_percentage: u8,
    pub position_size: PositionSize,
    pub kill_switch_price: Decimal,
    pub skip_reason: Option<String>,
    pub supporting_factors: Vec<Evidence>,
    pub contra_factors: Vec<Evidence>,
    pub warnings: Vec<AnalysisWarning>,
}

impl ConsensusVerdict {
    pub fn polarity(&self) -> Polarity {
        self.trade_recommendation.polarity()
    }

    pub fn was_capped(&self) -> bool {
        !self.capped_by.is_empty()
    }
}

/// Everything the verdict is assembled from, all for one window
pub struct VerdictParts<'a> {
    pub asset: &'a str,
    pub as_of: DateTime<Utc>,
    pub base: &'a BaseQualityScore,
    pub consensus: &'a RegimeConsensus,
    pub tri_modular: &'a TriModularVerdict,
    pub algorithmic: &'a AlgorithmicSignal,
    pub neural: &'a NeuralInferenceResult,
}

#[derive(Debug, Clone)]
pub struct VetoHierarchy {
    config: VetoConfig,
}

impl VetoHierarchy {
    pub fn new(config: VetoConfig) -> Self {
        Self { config }
    }

    pub fn arbitrate(
        &self,
        base: &BaseQualityScore,
        consensus: &RegimeConsensus,
        tri_modular: &TriModularVerdict,
    ) -> VetoOutcome {
        let mut score = base.score.min(100);
        let mut capped_by = Vec::new();

        let neural_fired = consensus.skip_trade;
        if neural_fired {
            score = score.min(self.config.neural_filter_cap);
            capped_by.push(CapTag::NeuralFilter);
        }

        let tri_fired = tri_modular.is_avoid();
        if tri_fired {
            score = score.min(self.config.tri_modular_cap);
            capped_by.push(CapTag::TriModularAvoid);
        }

        // Derived from the same flags that drove the caps
        let trade_recommendation = if tri_fired {
            TradeRecommendation::AvoidBadTrade
        } else if neural_fired {
            TradeRecommendation::SkippedNeuralFilter
        } else if base.contra_signals > self.config.max_contra_signals {
            TradeRecommendation::AvoidBadTrade
        } else if base.confirmations < self.config.min_confirmations {
            TradeRecommendation::WaitConfirmation
        } else {
            TradeRecommendation::Execute
        };

        let display_confidence_percentage = if capped_by.is_empty() {
            let tri_pct = tri_modular
                .weighted_confidence_score
                .percentage
                .round()
                .clamp(0.0, 100.0) as u8;
            score.min(tri_pct)
        } else {
            score
        };

        let position_size = self.size_for(
            trade_recommendation,
            tri_modular.position_size_recommendation,
        );

        debug!(
            base = base.score,
            score,
            capped = capped_by.len(),
            recommendation = %trade_recommendation,
            position = %position_size,
            "Veto hierarchy applied"
        );

        VetoOutcome {
            final_quality_score: score,
            capped_by,
            trade_recommendation,
            direction: tri_modular.weighted_confidence_score.direction,
            display_confidence_percentage,
            position_size,
        }
    }

    /// Avoid carries no size; Hold is limited to `hold_size_cap`
    fn size_for(&self, recommendation: TradeRecommendation, size: PositionSize) -> PositionSize {
        let cap = self.config.hold_size_cap;
        match (recommendation.polarity(), size) {
            (Polarity::Avoid, _) | (_, PositionSize::Avoid) => PositionSize::Avoid,
            (Polarity::Hold, PositionSize::Full) => PositionSize::Partial(cap),
            (Polarity::Hold, PositionSize::Partial(pct)) => PositionSize::Partial(pct.min(cap)),
            (Polarity::Proceed, size) => size,
        }
    }

    pub fn verdict(&self, parts: VerdictParts<'_>) -> ConsensusVerdict {
        let outcome = self.arbitrate(parts.base, parts.consensus, parts.tri_modular);

        let mut warnings = Vec::new();
        match parts.tri_modular.context_status {
            ContextStatus::Fresh => {}
            ContextStatus::Stale { age_minutes } => {
                warnings.push(AnalysisWarning::StaleContext { age_minutes })
            }
            ContextStatus::Missing => warnings.push(AnalysisWarning::MissingContext),
        }
        if parts.tri_modular.sentiment_missing {
            warnings.push(AnalysisWarning::MissingSentiment);
        }
        if !parts.neural.trained {
            warnings.push(AnalysisWarning::UntrainedWeights);
        }

        ConsensusVerdict {
            asset: parts.asset.to_string(),
            window_id: parts.consensus.window_id,
            as_of: parts.as_of,
            weights_version: parts.neural.weights_version,
            regime: parts.consensus.regime,
            direction: outcome.direction,
            base_quality_score: parts.base.score,
            final_quality_score: outcome.final_quality_score,
            capped_by: outcome.capped_by,
            trade_recommendation: outcome.trade_recommendation,
            display_confidence_percentage: outcome.display_confidence_percentage,
            position_size: outcome.position_size,
            kill_switch_price: parts.tri_modular.kill_switch_price,
            skip_reason: parts.consensus.skip_reason.clone(),
            supporting_factors: parts.algorithmic.supporting_factors.clone(),
            contra_factors: parts.algorithmic.contra_factors.clone(),
            warnings,
        }
    }
}
