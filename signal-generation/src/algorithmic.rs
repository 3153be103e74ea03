// Algorithmic Signal Generator
// Deterministic multi-timeframe confluence: every required timeframe votes
// from swing structure, EMA stack and order flow; the primary timeframe adds
// fair-value gaps, retracement location and key levels as evidence.
//
// Swings are detected on closes. Evidence is computed once here and carried
// unchanged through to the final verdict.

use crate::config::AlgorithmicConfig;
use crate::indicators::{self, SwingPoint};
use crate::{Result, SignalError};
use common::{Direction, MultiTimeframeWindows, PriceWindow, Timeframe, WindowId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

const GOLDEN_ZONE: (f64, f64) = (0.382, 0.618);
const ATR_PERIOD: usize = 14;
/// Distance to a key level, in ATRs, that counts as "at the level"
const LEVEL_PROXIMITY_ATR: f64 = 0.5;

/// Swing structure read from the last two swing highs and lows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwingStructure {
    /// Higher highs and higher lows
    HigherHighs,
    /// Lower highs and lower lows
    LowerLows,
    Mixed,
}

impl SwingStructure {
    pub fn direction(&self) -> Direction {
        match self {
            SwingStructure::HigherHighs => Direction::Long,
            SwingStructure::LowerLows => Direction::Short,
            SwingStructure::Mixed => Direction::Neutral,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvidenceKind {
    TimeframeAligned,
    TimeframeOpposed,
    SwingStructure,
    EmaStack,
    OrderFlow,
    FairValueGap,
    FibGoldenZone,
    NearSupport,
    NearResistance,
    NoConfluence,
}

impl fmt::Display for EvidenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvidenceKind::TimeframeAligned => "timeframe_aligned",
            EvidenceKind::TimeframeOpposed => "timeframe_opposed",
            EvidenceKind::SwingStructure => "swing_structure",
            EvidenceKind::EmaStack => "ema_stack",
            EvidenceKind::OrderFlow => "order_flow",
            EvidenceKind::FairValueGap => "fair_value_gap",
            EvidenceKind::FibGoldenZone => "fib_golden_zone",
            EvidenceKind::NearSupport => "near_support",
            EvidenceKind::NearResistance => "near_resistance",
            EvidenceKind::NoConfluence => "no_confluence",
        };
        f.write_str(name)
    }
}

/// Named, human-readable evidence item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub kind: EvidenceKind,
    pub timeframe: Option<Timeframe>,
    pub detail: String,
}

impl Evidence {
    fn new(kind: EvidenceKind, timeframe: Option<Timeframe>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            timeframe,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Evidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.timeframe {
            Some(tf) => write!(f, "{} [{}]: {}", self.kind, tf, self.detail),
            None => write!(f, "{}: {}", self.kind, self.detail),
        }
    }
}

/// One timeframe's structural reading and vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeframeVote {
    pub timeframe: Timeframe,
    pub window_id: WindowId,
    pub direction: Direction,
    pub structure: SwingStructure,
    pub ema_trend: Direction,
    /// Volume-weighted body imbalance, -1..1
    pub order_flow: f64,
    pub bullish_gaps: usize,
    pub bearish_gaps: usize,
}

/// Key levels on the primary timeframe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyLevels {
    pub close: f64,
    /// Highest swing low below the close
    pub support: Option<f64>,
    /// Lowest swing high above the close
    pub resistance: Option<f64>,
    /// Retracement depth of the close inside the latest swing range
    pub retracement: Option<f64>,
    pub atr: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmicSignal {
    /// Primary-timeframe window this signal describes
    pub window_id: WindowId,
    pub bias: Direction,
    /// 0..100
    pub confidence: f64,
    pub agreeing: usize,
    pub total: usize,
    pub votes: Vec<TimeframeVote>,
    pub levels: KeyLevels,
    pub supporting_factors: Vec<Evidence>,
    pub contra_factors: Vec<Evidence>,
}

pub struct AlgorithmicSignalGenerator {
    config: AlgorithmicConfig,
    primary: Timeframe,
}

impl AlgorithmicSignalGenerator {
    pub fn new(config: AlgorithmicConfig, primary: Timeframe) -> Self {
        Self { config, primary }
    }

    /// Required timeframes in ascending order, duplicates removed
    pub fn required_timeframes(&self) -> Vec<Timeframe> {
        let mut required = self.config.required_timeframes.clone();
        required.sort();
        required.dedup();
        required
    }

    pub fn analyze(&self, windows: &MultiTimeframeWindows) -> Result<AlgorithmicSignal> {
        let required = self.required_timeframes();

        // Every window must be present before any is judged too short
        for tf in required.iter().chain(std::iter::once(&self.primary)) {
            if windows.get(*tf).is_none() {
                return Err(SignalError::MissingTimeframe(*tf));
            }
        }

        let mut votes = Vec::with_capacity(required.len());
        for tf in &required {
            let window = windows
                .get(*tf)
                .ok_or(SignalError::MissingTimeframe(*tf))?;
            self.check_length(window)?;
            votes.push(self.vote(*tf, window));
        }

        let primary_window = windows
            .get(self.primary)
            .ok_or(SignalError::MissingTimeframe(self.primary))?;
        self.check_length(primary_window)?;

        let long = votes.iter().filter(|v| v.direction == Direction::Long).count();
        let short = votes.iter().filter(|v| v.direction == Direction::Short).count();
        let bias = if long > short {
            Direction::Long
        } else if short > long {
            Direction::Short
        } else {
            Direction::Neutral
        };
        let agreeing = match bias {
            Direction::Long => long,
            Direction::Short => short,
            Direction::Neutral => 0,
        };
        let total = votes.len();
        let confidence = if bias.is_directional() && total > 0 {
            agreeing as f64 / total as f64 * self.config.max_confidence
        } else {
            0.0
        };

        let primary_vote = match votes.iter().find(|v| v.timeframe == self.primary) {
            Some(vote) => vote.clone(),
            None => self.vote(self.primary, primary_window),
        };
        let levels = self.key_levels(primary_window);
        let (supporting_factors, contra_factors) =
            self.collect_evidence(bias, &votes, &primary_vote, &levels);

        debug!(
            window_id = %primary_window.id(),
            bias = %bias,
            confidence,
            agreeing,
            total,
            supporting = supporting_factors.len(),
            contra = contra_factors.len(),
            "Algorithmic confluence computed"
        );

        Ok(AlgorithmicSignal {
            window_id: primary_window.id(),
            bias,
            confidence,
            agreeing,
            total,
            votes,
            levels,
            supporting_factors,
            contra_factors,
        })
    }

    fn check_length(&self, window: &PriceWindow) -> Result<()> {
        if window.len() < self.config.min_length {
            return Err(SignalError::InsufficientData {
                component: "algorithmic signal generator",
                required: self.config.min_length,
                actual: window.len(),
            });
        }
        Ok(())
    }

    fn vote(&self, timeframe: Timeframe, window: &PriceWindow) -> TimeframeVote {
        let closes = window.closes();
        let highs = window.highs();
        let lows = window.lows();

        let structure = swing_structure(&closes, self.config.swing_strength);
        let ema_trend = ema_trend(&closes, self.config.fast_ema, self.config.slow_ema);
        let order_flow = order_flow_imbalance(
            &window.opens(),
            &closes,
            &window.volumes(),
            self.config.flow_lookback,
        );
        let flow_direction = if order_flow > self.config.flow_threshold {
            Direction::Long
        } else if order_flow < -self.config.flow_threshold {
            Direction::Short
        } else {
            Direction::Neutral
        };
        let (bullish_gaps, bearish_gaps) =
            unfilled_fair_value_gaps(&highs, &lows, self.config.gap_lookback);

        let score = structure.direction().sign() + ema_trend.sign() + flow_direction.sign();

        TimeframeVote {
            timeframe,
            window_id: window.id(),
            direction: Direction::from_sign(score),
            structure,
            ema_trend,
            order_flow,
            bullish_gaps,
            bearish_gaps,
        }
    }

    fn key_levels(&self, window: &PriceWindow) -> KeyLevels {
        let closes = window.closes();
        let close = closes.last().copied().unwrap_or_default();
        let swing_highs = indicators::swing_highs(&closes, self.config.swing_strength);
        let swing_lows = indicators::swing_lows(&closes, self.config.swing_strength);

        let support = swing_lows
            .iter()
            .map(|s| s.price)
            .filter(|&p| p < close)
            .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.max(p))));
        let resistance = swing_highs
            .iter()
            .map(|s| s.price)
            .filter(|&p| p > close)
            .fold(None, |best: Option<f64>, p| Some(best.map_or(p, |b| b.min(p))));

        KeyLevels {
            close,
            support,
            resistance,
            retracement: retracement_depth(&swing_highs, &swing_lows, close),
            atr: indicators::atr(&window.highs(), &window.lows(), &closes, ATR_PERIOD),
        }
    }

    fn collect_evidence(
        &self,
        bias: Direction,
        votes: &[TimeframeVote],
        primary: &TimeframeVote,
        levels: &KeyLevels,
    ) -> (Vec<Evidence>, Vec<Evidence>) {
        let mut supporting = Vec::new();
        let mut contra = Vec::new();

        if !bias.is_directional() {
            contra.push(Evidence::new(
                EvidenceKind::NoConfluence,
                None,
                "timeframes split without a directional majority",
            ));
            return (supporting, contra);
        }

        for vote in votes {
            if vote.direction == bias {
                supporting.push(Evidence::new(
                    EvidenceKind::TimeframeAligned,
                    Some(vote.timeframe),
                    format!("{} votes {}", vote.timeframe, vote.direction),
                ));
            } else if vote.direction.opposes(bias) {
                contra.push(Evidence::new(
                    EvidenceKind::TimeframeOpposed,
                    Some(vote.timeframe),
                    format!("{} votes {}", vote.timeframe, vote.direction),
                ));
            }
        }

        let tf = Some(primary.timeframe);
        let mut weigh = |direction: Direction, kind: EvidenceKind, detail: String| {
            if direction == bias {
                supporting.push(Evidence::new(kind, tf, detail));
            } else if direction.opposes(bias) {
                contra.push(Evidence::new(kind, tf, detail));
            }
        };

        weigh(
            primary.structure.direction(),
            EvidenceKind::SwingStructure,
            format!("{:?}", primary.structure),
        );
        weigh(
            primary.ema_trend,
            EvidenceKind::EmaStack,
            format!(
                "EMA {}/{} stack {}",
                self.config.fast_ema, self.config.slow_ema, primary.ema_trend
            ),
        );
        weigh(
            Direction::from_sign(if primary.order_flow.abs() > self.config.flow_threshold {
                primary.order_flow
            } else {
                0.0
            }),
            EvidenceKind::OrderFlow,
            format!("imbalance {:+.2}", primary.order_flow),
        );

        let (with_bias, against_bias) = match bias {
            Direction::Long => (primary.bullish_gaps, primary.bearish_gaps),
            _ => (primary.bearish_gaps, primary.bullish_gaps),
        };
        if with_bias > 0 {
            supporting.push(Evidence::new(
                EvidenceKind::FairValueGap,
                tf,
                format!("{} unfilled gap(s) with the bias", with_bias),
            ));
        }
        if against_bias > 0 {
            contra.push(Evidence::new(
                EvidenceKind::FairValueGap,
                tf,
                format!("{} unfilled gap(s) against the bias", against_bias),
            ));
        }

        if let Some(depth) = levels.retracement {
            if (GOLDEN_ZONE.0..=GOLDEN_ZONE.1).contains(&depth)
                && primary.structure.direction() == bias
            {
                supporting.push(Evidence::new(
                    EvidenceKind::FibGoldenZone,
                    tf,
                    format!("retraced {:.3} of the last swing", depth),
                ));
            }
        }

        if let Some(atr) = levels.atr.filter(|a| *a > 0.0) {
            let reach = atr * LEVEL_PROXIMITY_ATR;
            match bias {
                Direction::Long => {
                    if let Some(r) = levels.resistance.filter(|r| r - levels.close < reach) {
                        contra.push(Evidence::new(
                            EvidenceKind::NearResistance,
                            tf,
                            format!("resistance {:.4} within {:.2} ATR", r, LEVEL_PROXIMITY_ATR),
                        ));
                    }
                }
                Direction::Short => {
                    if let Some(s) = levels.support.filter(|s| levels.close - s < reach) {
                        contra.push(Evidence::new(
                            EvidenceKind::NearSupport,
                            tf,
                            format!("support {:.4} within {:.2} ATR", s, LEVEL_PROXIMITY_ATR),
                        ));
                    }
                }
                Direction::Neutral => {}
            }
        }

        (supporting, contra)
    }
}

/// Compare the last two swing highs and the last two swing lows
pub fn swing_structure(closes: &[f64], strength: usize) -> SwingStructure {
    let highs = indicators::swing_highs(closes, strength);
    let lows = indicators::swing_lows(closes, strength);
    let (Some(h), Some(l)) = (last_two(&highs), last_two(&lows)) else {
        return SwingStructure::Mixed;
    };

    if h.1 > h.0 && l.1 > l.0 {
        SwingStructure::HigherHighs
    } else if h.1 < h.0 && l.1 < l.0 {
        SwingStructure::LowerLows
    } else {
        SwingStructure::Mixed
    }
}

fn last_two(points: &[SwingPoint]) -> Option<(f64, f64)> {
    match points {
        [.., a, b] => Some((a.price, b.price)),
        _ => None,
    }
}

/// Close above a rising fast/slow stack is LONG, mirrored for SHORT.
/// Without enough data for the slow EMA only close vs fast is used.
pub fn ema_trend(closes: &[f64], fast: usize, slow: usize) -> Direction {
    let Some(&close) = closes.last() else {
        return Direction::Neutral;
    };
    let Some(fast_ema) = indicators::ema(closes, fast) else {
        return Direction::Neutral;
    };
    let tolerance = close.abs() * 1e-9;
    let above = |a: f64, b: f64| a - b > tolerance;
    match indicators::ema(closes, slow) {
        Some(slow_ema) if above(close, fast_ema) && above(fast_ema, slow_ema) => Direction::Long,
        Some(slow_ema) if above(fast_ema, close) && above(slow_ema, fast_ema) => Direction::Short,
        Some(_) => Direction::Neutral,
        None if above(close, fast_ema) => Direction::Long,
        None if above(fast_ema, close) => Direction::Short,
        None => Direction::Neutral,
    }
}

/// Σ(close − open)·volume / Σ|close − open|·volume over the last `lookback` bars
pub fn order_flow_imbalance(opens: &[f64], closes: &[f64], volumes: &[f64], lookback: usize) -> f64 {
    let n = closes.len().min(opens.len()).min(volumes.len());
    let start = n.saturating_sub(lookback);
    let (net, gross) = (start..n).fold((0.0, 0.0), |(net, gross), i| {
        let body = closes[i] - opens[i];
        (net + body * volumes[i], gross + body.abs() * volumes[i])
    });
    if gross > 0.0 {
        (net / gross).clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// Three-bar imbalances inside the last `lookback` bars that price has not
/// traded back through, as (bullish, bearish) counts
pub fn unfilled_fair_value_gaps(highs: &[f64], lows: &[f64], lookback: usize) -> (usize, usize) {
    let n = highs.len().min(lows.len());
    if n < 3 {
        return (0, 0);
    }
    let start = n.saturating_sub(lookback).max(2);
    let mut bullish = 0;
    let mut bearish = 0;
    for i in start..n {
        let bull_floor = highs[i - 2];
        if lows[i] > bull_floor && lows[i + 1..n].iter().all(|&l| l > bull_floor) {
            bullish += 1;
        }
        let bear_ceiling = lows[i - 2];
        if highs[i] < bear_ceiling && highs[i + 1..n].iter().all(|&h| h < bear_ceiling) {
            bearish += 1;
        }
    }
    (bullish, bearish)
}

/// How far the close has retraced the most recent swing leg (0 = at the
/// extreme, 1 = full retrace). `None` without both swing kinds or a flat leg.
fn retracement_depth(highs: &[SwingPoint], lows: &[SwingPoint], close: f64) -> Option<f64> {
    let high = highs.last()?;
    let low = lows.last()?;
    let range = high.price - low.price;
    if range <= 0.0 {
        return None;
    }
    let depth = if low.index < high.index {
        (high.price - close) / range
    } else {
        (close - low.price) / range
    };
    Some(depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{flat_window, ranging_window, trending_bundle, trending_window_on};

    fn generator() -> AlgorithmicSignalGenerator {
        AlgorithmicSignalGenerator::new(AlgorithmicConfig::default(), Timeframe::H1)
    }

    fn mixed_bundle(up: &[Timeframe]) -> MultiTimeframeWindows {
        Timeframe::ALL.iter().fold(MultiTimeframeWindows::new(), |bundle, tf| {
            let step = if up.contains(tf) { 0.5 } else { -0.5 };
            bundle.with_window(*tf, trending_window_on(80, 200.0, step, *tf))
        })
    }

    #[test]
    fn test_full_confluence_long() {
        let bundle = trending_bundle(80, 0.5);
        let signal = generator().analyze(&bundle).unwrap();

        assert_eq!(signal.bias, Direction::Long);
        assert_eq!(signal.agreeing, 5);
        assert_eq!(signal.total, 5);
        assert!((signal.confidence - 95.0).abs() < 1e-9);
        assert_eq!(signal.window_id, bundle.get(Timeframe::H1).unwrap().id());
        assert!(signal
            .votes
            .iter()
            .all(|v| v.structure == SwingStructure::HigherHighs));
        assert!(signal.supporting_factors.len() >= 5);
        assert!(signal.contra_factors.is_empty());
    }

    #[test]
    fn test_full_confluence_short() {
        let signal = generator().analyze(&trending_bundle(80, -0.5)).unwrap();
        assert_eq!(signal.bias, Direction::Short);
        assert!((signal.confidence - 95.0).abs() < 1e-9);
        assert!(signal
            .supporting_factors
            .iter()
            .any(|e| e.kind == EvidenceKind::SwingStructure));
    }

    #[test]
    fn test_partial_confluence_scales_confidence() {
        let bundle = mixed_bundle(&[Timeframe::M15, Timeframe::H1, Timeframe::H4]);
        let signal = generator().analyze(&bundle).unwrap();

        assert_eq!(signal.bias, Direction::Long);
        assert_eq!(signal.agreeing, 3);
        assert!((signal.confidence - 57.0).abs() < 1e-9);
        let opposed: Vec<_> = signal
            .contra_factors
            .iter()
            .filter(|e| e.kind == EvidenceKind::TimeframeOpposed)
            .filter_map(|e| e.timeframe)
            .collect();
        assert_eq!(opposed, vec![Timeframe::D1, Timeframe::W1]);
    }

    #[test]
    fn test_flat_market_is_neutral() {
        let bundle = Timeframe::ALL.iter().fold(MultiTimeframeWindows::new(), |b, tf| {
            b.with_window(*tf, flat_window(60, 100.0))
        });
        let signal = generator().analyze(&bundle).unwrap();

        assert_eq!(signal.bias, Direction::Neutral);
        assert_eq!(signal.confidence, 0.0);
        assert!(signal.supporting_factors.is_empty());
        assert_eq!(signal.contra_factors[0].kind, EvidenceKind::NoConfluence);
    }

    #[test]
    fn test_missing_timeframe() {
        let mut bundle = MultiTimeframeWindows::new();
        for tf in [Timeframe::M15, Timeframe::H1, Timeframe::H4, Timeframe::D1] {
            bundle.insert(tf, trending_window_on(80, 100.0, 0.5, tf));
        }
        let result = generator().analyze(&bundle);
        assert!(matches!(result, Err(SignalError::MissingTimeframe(Timeframe::W1))));
    }

    #[test]
    fn test_short_timeframe_window() {
        let bundle = trending_bundle(80, 0.5)
            .with_window(Timeframe::D1, trending_window_on(12, 100.0, 0.5, Timeframe::D1));
        let result = generator().analyze(&bundle);
        assert!(matches!(
            result,
            Err(SignalError::InsufficientData {
                required: 30,
                actual: 12,
                ..
            })
        ));
    }

    #[test]
    fn test_swing_structure() {
        let up = trending_window_on(60, 100.0, 0.5, Timeframe::H1).closes();
        assert_eq!(swing_structure(&up, 2), SwingStructure::HigherHighs);

        let down = trending_window_on(60, 200.0, -0.5, Timeframe::H1).closes();
        assert_eq!(swing_structure(&down, 2), SwingStructure::LowerLows);

        let sideways = ranging_window(60, 100.0, 1.0).closes();
        assert_eq!(swing_structure(&sideways, 2), SwingStructure::Mixed);
    }

    #[test]
    fn test_order_flow_imbalance() {
        let opens = [1.0, 2.0, 3.0, 4.0];
        let closes = [2.0, 3.0, 4.0, 3.0];
        let volumes = [100.0, 100.0, 100.0, 100.0];
        let flow = order_flow_imbalance(&opens, &closes, &volumes, 4);
        assert!((flow - 0.5).abs() < 1e-12);

        assert_eq!(order_flow_imbalance(&[1.0; 5], &[1.0; 5], &[0.0; 5], 5), 0.0);
    }

    #[test]
    fn test_fair_value_gaps() {
        // Bar 2 leaves a gap above bar 0's high that is never revisited
        let highs = [10.0, 12.0, 14.0, 15.0, 16.0];
        let lows = [9.0, 10.5, 11.0, 13.0, 14.0];
        let (bullish, bearish) = unfilled_fair_value_gaps(&highs, &lows, 10);
        assert!(bullish >= 1);
        assert_eq!(bearish, 0);

        // Filled once a later low trades back under the gap floor
        let lows_filled = [9.0, 10.5, 11.0, 13.0, 9.5];
        let (bullish_filled, _) = unfilled_fair_value_gaps(&highs, &lows_filled, 10);
        assert_eq!(bullish_filled, 0);
    }

    #[test]
    fn test_retracement_depth() {
        let highs = [SwingPoint { index: 10, price: 110.0 }];
        let lows = [SwingPoint { index: 4, price: 100.0 }];
        let depth = retracement_depth(&highs, &lows, 105.0).unwrap();
        assert!((depth - 0.5).abs() < 1e-12);
        assert!(retracement_depth(&highs, &[], 105.0).is_none());
    }
}
