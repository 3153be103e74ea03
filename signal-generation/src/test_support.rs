//! Deterministic synthetic price windows for tests

use crate::algorithmic::{AlgorithmicSignal, Evidence, EvidenceKind, KeyLevels};
use crate::neural::NeuralInferenceResult;
use crate::regime::{Regime, RegimeClassification};
use chrono::TimeZone;
use common::{
    DateTime, Decimal, Direction, MultiTimeframeWindows, PriceSample, PriceWindow, Timeframe,
    Utc, Uuid, WindowId,
};
use rust_decimal::prelude::*;

/// Zigzag offsets (in units of amplitude) repeated every six bars
const ZIGZAG: [f64; 6] = [0.0, 1.2, 2.0, 1.2, 0.0, -0.6];

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn dec(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap().round_dp(4)
}

/// Build a window from closes; opens are the previous close and wicks
/// extend `wick` either side of the bar body
pub fn window_from_closes(closes: &[f64], wick: f64, spacing: Timeframe) -> PriceWindow {
    let samples = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            let volume = if close >= open { 1200.0 } else { 800.0 };
            PriceSample::new(
                start_time() + spacing.duration() * i as i32,
                dec(open),
                dec(open.max(close) + wick),
                dec(open.min(close) - wick),
                dec(close),
                dec(volume),
            )
        })
        .collect();
    PriceWindow::new(samples).unwrap()
}

fn zigzag_closes(len: usize, start: f64, step: f64, amplitude: f64) -> Vec<f64> {
    // Phase chosen so the final bar closes a rising (or, mirrored, falling) leg
    let shift = (2 + 6 - (len.saturating_sub(1) % 6)) % 6;
    let mirror = if step < 0.0 { -1.0 } else { 1.0 };
    (0..len)
        .map(|i| start + step * i as f64 + mirror * amplitude * ZIGZAG[(i + shift) % 6])
        .collect()
}

/// Zigzag trend: `step` per bar with pullbacks; negative `step` trends down
pub fn trending_window(len: usize, start: f64, step: f64) -> PriceWindow {
    trending_window_on(len, start, step, Timeframe::H1)
}

pub fn trending_window_on(len: usize, start: f64, step: f64, timeframe: Timeframe) -> PriceWindow {
    let amplitude = (2.0 * step.abs()).max(0.5);
    window_from_closes(&zigzag_closes(len, start, step, amplitude), 0.2, timeframe)
}

/// Sideways oscillation around `center`
pub fn ranging_window(len: usize, center: f64, amplitude: f64) -> PriceWindow {
    let closes: Vec<f64> = (0..len)
        .map(|i| center + amplitude * ZIGZAG[i % 6] - amplitude * 0.6)
        .collect();
    window_from_closes(&closes, 0.2, Timeframe::H1)
}

pub fn flat_window(len: usize, price: f64) -> PriceWindow {
    window_from_closes(&vec![price; len], 0.0, Timeframe::H1)
}

/// All five timeframes following the same trend
pub fn trending_bundle(len: usize, step: f64) -> MultiTimeframeWindows {
    Timeframe::ALL
        .iter()
        .fold(MultiTimeframeWindows::new(), |bundle, tf| {
            bundle.with_window(*tf, trending_window_on(len, 100.0, step, *tf))
        })
}

pub fn window_id(n: u128) -> WindowId {
    WindowId(Uuid::from_u128(n))
}

pub fn regime_stub(id: WindowId, regime: Regime) -> RegimeClassification {
    let strength = match regime {
        Regime::Trending => 40.0,
        Regime::Ranging => 12.0,
    };
    RegimeClassification {
        window_id: id,
        regime,
        strength,
        plus_di: 20.0,
        minus_di: 20.0,
    }
}

pub fn neural_stub(id: WindowId, direction: Direction, confidence: f64) -> NeuralInferenceResult {
    let rest = (1.0 - confidence) / 2.0;
    let probabilities = match direction {
        Direction::Long => [confidence, rest, rest],
        Direction::Short => [rest, confidence, rest],
        Direction::Neutral => [rest, rest, confidence],
    };
    NeuralInferenceResult {
        window_id: id,
        direction,
        confidence,
        probabilities,
        weights_version: 1,
        trained: true,
    }
}

/// Algorithmic signal with `supporting` aligned and `contra` opposed timeframes
pub fn algorithmic_stub(
    id: WindowId,
    bias: Direction,
    confidence: f64,
    supporting: usize,
    contra: usize,
) -> AlgorithmicSignal {
    let evidence = |kind: EvidenceKind, n: usize| {
        Timeframe::ALL
            .iter()
            .cycle()
            .take(n)
            .map(|tf| Evidence {
                kind,
                timeframe: Some(*tf),
                detail: format!("{} stub", tf),
            })
            .collect::<Vec<_>>()
    };
    AlgorithmicSignal {
        window_id: id,
        bias,
        confidence,
        agreeing: supporting,
        total: supporting + contra,
        votes: Vec::new(),
        levels: KeyLevels {
            close: 100.0,
            support: Some(98.0),
            resistance: Some(103.0),
            retracement: None,
            atr: Some(1.0),
        },
        supporting_factors: evidence(EvidenceKind::TimeframeAligned, supporting),
        contra_factors: evidence(EvidenceKind::TimeframeOpposed, contra),
    }
}
