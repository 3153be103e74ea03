// Presentation Views
// Every surface is built from a ConsensusVerdict alone and formats only the
// verdict's own numbers.

use crate::veto::{ConsensusVerdict, Polarity};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BadgeTone {
    Positive,
    Caution,
    Negative,
}

impl From<Polarity> for BadgeTone {
    fn from(polarity: Polarity) -> Self {
        match polarity {
            Polarity::Proceed => BadgeTone::Positive,
            Polarity::Hold => BadgeTone::Caution,
            Polarity::Avoid => BadgeTone::Negative,
        }
    }
}

/// One-line headline for lists and notifications
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryBanner {
    pub asset: String,
    pub polarity: Polarity,
    pub headline: String,
}

impl SummaryBanner {
    pub fn from_verdict(verdict: &ConsensusVerdict) -> Self {
        Self {
            asset: verdict.asset.clone(),
            polarity: verdict.polarity(),
            headline: format!(
                "{} {} {} @ {}%",
                verdict.asset,
                verdict.trade_recommendation,
                verdict.direction,
                verdict.display_confidence_percentage
            ),
        }
    }
}

impl fmt::Display for SummaryBanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.headline)
    }
}

/// Full breakdown for the detail screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailPanel {
    pub polarity: Polarity,
    pub lines: Vec<String>,
}

impl DetailPanel {
    pub fn from_verdict(verdict: &ConsensusVerdict) -> Self {
        let mut lines = vec![
            format!(
                "Recommendation: {} ({})",
                verdict.trade_recommendation, verdict.direction
            ),
            format!("Quality score: {}/100", verdict.final_quality_score),
            format!("Confidence: {}%", verdict.display_confidence_percentage),
            format!("Regime: {}", verdict.regime),
            format!("Position size: {}", verdict.position_size),
            format!("Kill switch: {}", verdict.kill_switch_price),
        ];

        if verdict.was_capped() {
            let caps: Vec<String> = verdict.capped_by.iter().map(|c| c.to_string()).collect();
            lines.push(format!("Capped by: {}", caps.join(", ")));
        }
        if let Some(reason) = &verdict.skip_reason {
            lines.push(format!("Skipped: {}", reason));
        }
        lines.extend(verdict.supporting_factors.iter().map(|e| format!("+ {}", e)));
        lines.extend(verdict.contra_factors.iter().map(|e| format!("- {}", e)));
        lines.extend(verdict.warnings.iter().map(|w| format!("! {}", w)));

        Self {
            polarity: verdict.polarity(),
            lines,
        }
    }
}

impl fmt::Display for DetailPanel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}

/// Compact score badge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityBadge {
    pub score: u8,
    pub label: String,
    pub tone: BadgeTone,
}

impl QualityBadge {
    pub fn from_verdict(verdict: &ConsensusVerdict) -> Self {
        Self {
            score: verdict.final_quality_score,
            label: verdict.trade_recommendation.label().to_string(),
            tone: BadgeTone::from(verdict.polarity()),
        }
    }

    pub fn polarity(&self) -> Polarity {
        match self.tone {
            BadgeTone::Positive => Polarity::Proceed,
            BadgeTone::Caution => Polarity::Hold,
            BadgeTone::Negative => Polarity::Avoid,
        }
    }
}

impl fmt::Display for QualityBadge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} {}]", self.label, self.score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RegimeWeights, VetoConfig};
    use crate::consensus::RegimeConsensus;
    use crate::regime::Regime;
    use crate::test_support::{start_time, window_id};
    use crate::tri_modular::{
        ContextStatus, PositionSize, TriModularVerdict, WeightedConfidenceScore,
    };
    use crate::veto::{
        Alignment, BaseQualityScore, CapTag, TradeRecommendation, VetoHierarchy, VetoOutcome,
    };
    use common::{Decimal, Direction};

    fn verdict(recommendation: TradeRecommendation, score: u8, capped_by: Vec<CapTag>) -> ConsensusVerdict {
        ConsensusVerdict {
            asset: "BTC-USD".to_string(),
            window_id: window_id(9),
            as_of: start_time(),
            weights_version: 3,
            regime: Regime::Trending,
            direction: Direction::Long,
            base_quality_score: 85,
            final_quality_score: score,
            capped_by,
            trade_recommendation: recommendation,
            display_confidence_percentage: score,
            position_size: PositionSize::Avoid,
            kill_switch_price: Decimal::new(41250, 0),
            skip_reason: None,
            supporting_factors: Vec::new(),
            contra_factors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_views_share_polarity() {
        let cases = [
            verdict(TradeRecommendation::Execute, 85, vec![]),
            verdict(TradeRecommendation::WaitConfirmation, 55, vec![]),
            verdict(TradeRecommendation::SkippedNeuralFilter, 35, vec![CapTag::NeuralFilter]),
            verdict(
                TradeRecommendation::AvoidBadTrade,
                30,
                vec![CapTag::NeuralFilter, CapTag::TriModularAvoid],
            ),
        ];

        for v in &cases {
            let banner = SummaryBanner::from_verdict(v);
            let panel = DetailPanel::from_verdict(v);
            let badge = QualityBadge::from_verdict(v);

            assert_eq!(banner.polarity, panel.polarity);
            assert_eq!(panel.polarity, badge.polarity());
            assert_eq!(badge.score, v.final_quality_score);
        }
    }

    fn arbitrate(skip_trade: bool, confirmations: usize, contra: usize, size: PositionSize) -> VetoOutcome {
        let base = BaseQualityScore {
            score: 90,
            confirmations,
            contra_signals: contra,
            alignment: Alignment::Aligned,
        };
        let consensus = RegimeConsensus {
            window_id: window_id(9),
            regime: Regime::Trending,
            regime_strength: 40.0,
            neural_direction: Direction::Long,
            neural_confidence: if skip_trade { 0.45 } else { 0.8 },
            algorithmic_bias: Direction::Long,
            algorithmic_confidence: 95.0,
            weights: RegimeWeights {
                algorithmic: 0.7,
                neural: 0.3,
            },
            weighted_direction: Direction::Long,
            weighted_confidence: 90.0,
            effective_threshold: 0.5,
            skip_trade,
            skip_reason: None,
            conflict: false,
        };
        let tri = TriModularVerdict {
            window_id: window_id(9),
            layers: Vec::new(),
            raw_score: 85.0,
            weighted_confidence_score: WeightedConfidenceScore {
                direction: Direction::Long,
                percentage: 85.0,
            },
            position_size_recommendation: size,
            kill_switch_price: Decimal::new(41250, 0),
            context_status: ContextStatus::Fresh,
            macro_event_near: false,
            sentiment_missing: false,
        };
        VetoHierarchy::new(VetoConfig::default()).arbitrate(&base, &consensus, &tri)
    }

    #[test]
    fn test_avoid_polarity_never_shows_a_size() {
        let sizes = [PositionSize::Avoid, PositionSize::Partial(70), PositionSize::Full];
        for size in sizes {
            for (skip, confirmations, contra) in [(true, 5, 0), (false, 5, 4), (false, 2, 0), (false, 5, 0)] {
                let outcome = arbitrate(skip, confirmations, contra, size);
                let mut v = verdict(
                    outcome.trade_recommendation,
                    outcome.final_quality_score,
                    outcome.capped_by.clone(),
                );
                v.position_size = outcome.position_size;
                let panel = DetailPanel::from_verdict(&v);

                if panel.polarity == Polarity::Avoid {
                    assert!(panel.lines.contains(&"Position size: AVOID".to_string()));
                }
                if panel.polarity == Polarity::Hold {
                    assert!(!panel.to_string().contains("FULL"));
                }
            }
        }
    }

    #[test]
    fn test_capped_verdict_shows_capped_number() {
        let v = verdict(
            TradeRecommendation::AvoidBadTrade,
            30,
            vec![CapTag::NeuralFilter, CapTag::TriModularAvoid],
        );
        let banner = SummaryBanner::from_verdict(&v);
        let panel = DetailPanel::from_verdict(&v);

        assert_eq!(banner.to_string(), "BTC-USD AVOID_BAD_TRADE LONG @ 30%");
        assert!(panel.lines.contains(&"Quality score: 30/100".to_string()));
        assert!(panel
            .lines
            .contains(&"Capped by: NEURAL_FILTER, TRI_MODULAR_AVOID".to_string()));
        assert!(!panel.to_string().contains("85"));
        assert_eq!(QualityBadge::from_verdict(&v).to_string(), "[AVOID_BAD_TRADE 30]");
    }
}
