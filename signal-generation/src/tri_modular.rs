// Tri-Modular Analyzer
// Structural, momentum and contextual layers vote independently; the
// weighted score sets the position size and the second veto (AVOID).
//
// Layers read only the price window or the context bundle, never each
// other's results.

use crate::algorithmic::{swing_structure, SwingStructure};
use crate::config::TriModularConfig;
use crate::consensus::RegimeConsensus;
use crate::indicators;
use crate::{Result, SignalError};
use common::{DateTime, Decimal, Direction, Duration, MarketContext, PriceWindow, Utc, WindowId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

const GOLDEN_ZONE: (f64, f64) = (0.382, 0.618);
const RSI_PERIOD: usize = 14;
const STOCHASTIC_PERIOD: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriModularLayer {
    Structural,
    Momentum,
    Contextual,
}

impl TriModularLayer {
    pub fn name(&self) -> &'static str {
        match self {
            TriModularLayer::Structural => "structural",
            TriModularLayer::Momentum => "momentum",
            TriModularLayer::Contextual => "contextual",
        }
    }
}

impl fmt::Display for TriModularLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriModularLayerResult {
    pub layer: TriModularLayer,
    pub direction_vote: Direction,
    /// 0..100
    pub confidence_vote: f64,
    pub weight: f64,
    pub notes: Vec<String>,
}

impl TriModularLayerResult {
    fn abstain(layer: TriModularLayer, weight: f64, note: &str) -> Self {
        Self {
            layer,
            direction_vote: Direction::Neutral,
            confidence_vote: 0.0,
            weight,
            notes: vec![note.to_string()],
        }
    }

    /// Signed contribution to the weighted score
    pub fn contribution(&self) -> f64 {
        self.confidence_vote * self.weight * self.direction_vote.sign()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedConfidenceScore {
    pub direction: Direction,
    /// 0..100, projected onto `direction`
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSize {
    Avoid,
    /// Percent of a full position, 1..99
    Partial(u8),
    Full,
}

impl fmt::Display for PositionSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionSize::Avoid => f.write_str("AVOID"),
            PositionSize::Partial(pct) => write!(f, "PARTIAL({}%)", pct),
            PositionSize::Full => f.write_str("FULL"),
        }
    }
}

/// Freshness of the macro/sentiment bundle at analysis time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextStatus {
    Fresh,
    Stale { age_minutes: i64 },
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriModularVerdict {
    pub window_id: WindowId,
    pub layers: Vec<TriModularLayerResult>,
    /// Σ confidence × weight × sign before projection
    pub raw_score: f64,
    pub weighted_confidence_score: WeightedConfidenceScore,
    pub position_size_recommendation: PositionSize,
    pub kill_switch_price: Decimal,
    pub context_status: ContextStatus,
    pub macro_event_near: bool,
    /// A bundle was supplied but carried no fear/greed reading
    pub sentiment_missing: bool,
}

impl TriModularVerdict {
    pub fn is_avoid(&self) -> bool {
        self.position_size_recommendation == PositionSize::Avoid
    }

    pub fn layer(&self, layer: TriModularLayer) -> Option<&TriModularLayerResult> {
        self.layers.iter().find(|l| l.layer == layer)
    }
}

struct ContextReading {
    layer: TriModularLayerResult,
    status: ContextStatus,
    macro_event_near: bool,
    sentiment_missing: bool,
}

#[derive(Debug, Clone)]
pub struct TriModularAnalyzer {
    config: TriModularConfig,
}

impl TriModularAnalyzer {
    pub fn new(config: TriModularConfig) -> Self {
        Self { config }
    }

    /// Context age and macro proximity are measured at the window's last
    /// sample, so identical inputs give identical verdicts.
    pub fn analyze(
        &self,
        window: &PriceWindow,
        consensus: &RegimeConsensus,
        context: Option<&MarketContext>,
    ) -> Result<TriModularVerdict> {
        if window.id() != consensus.window_id {
            return Err(SignalError::InputMismatch(format!(
                "tri-modular window {} vs consensus {}",
                window.id(),
                consensus.window_id
            )));
        }
        let last = window.last().ok_or(SignalError::InsufficientData {
            component: "tri-modular analyzer",
            required: 1,
            actual: 0,
        })?;
        let as_of = last.timestamp;

        let structural = self.structural_layer(window);
        let momentum = self.momentum_layer(window);
        let reading = self.contextual_layer(context, as_of);

        let layers = vec![structural, momentum, reading.layer];
        let raw_score: f64 = layers.iter().map(|l| l.contribution()).sum();

        let direction = if consensus.weighted_direction.is_directional() {
            consensus.weighted_direction
        } else if consensus.conflict {
            Direction::Neutral
        } else {
            Direction::from_sign(raw_score)
        };
        let percentage = (raw_score * direction.sign()).clamp(0.0, 100.0);
        let position = self.position_size(percentage);
        let kill_switch_price = kill_switch(window, direction, self.config.swing_strength);

        debug!(
            window_id = %window.id(),
            direction = %direction,
            percentage,
            position = %position,
            kill_switch = %kill_switch_price,
            "Tri-modular verdict"
        );

        Ok(TriModularVerdict {
            window_id: window.id(),
            layers,
            raw_score,
            weighted_confidence_score: WeightedConfidenceScore {
                direction,
                percentage,
            },
            position_size_recommendation: position,
            kill_switch_price,
            context_status: reading.status,
            macro_event_near: reading.macro_event_near,
            sentiment_missing: reading.sentiment_missing,
        })
    }

    /// AVOID under the floor, linear PARTIAL up to FULL
    pub fn position_size(&self, percentage: f64) -> PositionSize {
        if percentage < self.config.avoid_floor {
            PositionSize::Avoid
        } else if percentage >= self.config.full_size_at {
            PositionSize::Full
        } else {
            let pct = (100.0 * percentage / self.config.full_size_at).round();
            PositionSize::Partial(pct.clamp(1.0, 99.0) as u8)
        }
    }

    fn structural_layer(&self, window: &PriceWindow) -> TriModularLayerResult {
        let weight = self.config.structural_weight;
        let closes = window.closes();
        let structure = swing_structure(&closes, self.config.swing_strength);
        if structure == SwingStructure::Mixed {
            return TriModularLayerResult::abstain(
                TriModularLayer::Structural,
                weight,
                "no clean swing structure",
            );
        }

        let direction = structure.direction();
        let close = closes.last().copied().unwrap_or_default();
        let highs = indicators::swing_highs(&closes, self.config.swing_strength);
        let lows = indicators::swing_lows(&closes, self.config.swing_strength);
        let mut confidence: f64 = 60.0;
        let mut notes = vec![format!("{:?}", structure)];

        let broke_out = match direction {
            Direction::Long => highs.last().is_some_and(|h| close > h.price),
            Direction::Short => lows.last().is_some_and(|l| close < l.price),
            Direction::Neutral => false,
        };
        if broke_out {
            confidence += 20.0;
            notes.push("close beyond last swing extreme".to_string());
        }

        if let (Some(high), Some(low)) = (highs.last(), lows.last()) {
            let range = high.price - low.price;
            if range > 0.0 {
                // Pullback depth against the prevailing structure
                let depth = match direction {
                    Direction::Short => (close - low.price) / range,
                    _ => (high.price - close) / range,
                };
                if (GOLDEN_ZONE.0..=GOLDEN_ZONE.1).contains(&depth) {
                    confidence += 15.0;
                    notes.push(format!("fib confluence at {:.3}", depth));
                }
            }
        }

        TriModularLayerResult {
            layer: TriModularLayer::Structural,
            direction_vote: direction,
            confidence_vote: confidence.min(100.0),
            weight,
            notes,
        }
    }

    fn momentum_layer(&self, window: &PriceWindow) -> TriModularLayerResult {
        let weight = self.config.momentum_weight;
        let closes = window.closes();
        let highs = window.highs();
        let lows = window.lows();
        let tolerance = closes.last().map_or(0.0, |c| c.abs() * 1e-9);

        let band = |value: f64, upper: f64, lower: f64| {
            if value > upper {
                1.0
            } else if value < lower {
                -1.0
            } else {
                0.0
            }
        };

        let mut readings: Vec<(&str, f64)> = Vec::new();
        if let Some(rsi) = indicators::rsi(&closes, RSI_PERIOD) {
            readings.push(("rsi", band(rsi, 55.0, 45.0)));
        }
        if let Some(macd) = indicators::macd(&closes) {
            readings.push(("macd_line", band(macd.line, tolerance, -tolerance)));
            readings.push(("macd_histogram", band(macd.histogram, tolerance, -tolerance)));
        }
        if let Some(k) = indicators::stochastic_k(&highs, &lows, &closes, STOCHASTIC_PERIOD) {
            readings.push(("stochastic", band(k, 60.0, 40.0)));
        }

        if readings.is_empty() {
            return TriModularLayerResult::abstain(
                TriModularLayer::Momentum,
                weight,
                "not enough data for oscillators",
            );
        }

        let net: f64 = readings.iter().map(|(_, v)| v).sum();
        let notes = readings
            .iter()
            .filter(|(_, v)| *v != 0.0)
            .map(|(name, v)| format!("{} {}", name, Direction::from_sign(*v)))
            .collect();

        TriModularLayerResult {
            layer: TriModularLayer::Momentum,
            direction_vote: Direction::from_sign(net),
            confidence_vote: net.abs() / readings.len() as f64 * 100.0,
            weight,
            notes,
        }
    }

    fn contextual_layer(
        &self,
        context: Option<&MarketContext>,
        as_of: DateTime<Utc>,
    ) -> ContextReading {
        let weight = self.config.contextual_weight;
        let Some(context) = context else {
            warn!("Macro context missing, contextual layer abstains");
            return ContextReading {
                layer: TriModularLayerResult::abstain(
                    TriModularLayer::Contextual,
                    weight,
                    "context missing",
                ),
                status: ContextStatus::Missing,
                macro_event_near: false,
                sentiment_missing: false,
            };
        };

        let status = if context.is_stale(as_of, Duration::minutes(self.config.stale_after_minutes)) {
            let age_minutes = context.age(as_of).num_minutes();
            warn!(age_minutes, "Macro context stale, down-weighting contextual layer");
            ContextStatus::Stale { age_minutes }
        } else {
            ContextStatus::Fresh
        };
        let macro_event_near = context.macro_event_within(
            as_of,
            Duration::hours(self.config.macro_event_window_hours),
        );

        let Some(index) = context.fear_greed_index else {
            warn!("Macro context has no sentiment reading, contextual layer abstains");
            let mut layer =
                TriModularLayerResult::abstain(TriModularLayer::Contextual, weight, "no sentiment reading");
            if macro_event_near {
                layer.notes.push("macro event approaching".to_string());
            }
            return ContextReading {
                layer,
                status,
                macro_event_near,
                sentiment_missing: true,
            };
        };

        let direction = if index > 55.0 {
            Direction::Long
        } else if index < 45.0 {
            Direction::Short
        } else {
            Direction::Neutral
        };
        let mut confidence = if direction.is_directional() {
            ((index - 50.0).abs() * 2.0).min(100.0)
        } else {
            0.0
        };
        let mut notes = vec![format!("fear/greed {:.0}", index)];
        if macro_event_near {
            confidence *= self.config.macro_event_factor;
            notes.push("macro event approaching".to_string());
        }
        if let ContextStatus::Stale { age_minutes } = status {
            confidence *= self.config.stale_factor;
            notes.push(format!("stale by {}m", age_minutes));
        }

        ContextReading {
            layer: TriModularLayerResult {
                layer: TriModularLayer::Contextual,
                direction_vote: direction,
                confidence_vote: confidence,
                weight,
                notes,
            },
            status,
            macro_event_near,
            sentiment_missing: false,
        }
    }
}

/// Invalidation level: the nearest swing against the trade, falling back to
/// the window extreme. NEUTRAL takes whichever side is closer.
pub fn kill_switch(window: &PriceWindow, direction: Direction, strength: usize) -> Decimal {
    let samples = window.samples();
    let Some(last) = samples.last() else {
        return Decimal::ZERO;
    };
    let close = last.close;
    let closes = window.closes();

    let below = indicators::swing_lows(&closes, strength)
        .iter()
        .map(|s| samples[s.index].low)
        .filter(|low| *low < close)
        .max()
        .or_else(|| samples.iter().map(|s| s.low).min())
        .unwrap_or(close);
    let above = indicators::swing_highs(&closes, strength)
        .iter()
        .map(|s| samples[s.index].high)
        .filter(|high| *high > close)
        .min()
        .or_else(|| samples.iter().map(|s| s.high).max())
        .unwrap_or(close);

    match direction {
        Direction::Long => below,
        Direction::Short => above,
        Direction::Neutral => {
            if above - close < close - below {
                above
            } else {
                below
            }
        }
    }
}
