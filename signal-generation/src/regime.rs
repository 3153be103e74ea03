// Regime Classification
// Wilder directional-movement index over the primary window

use crate::config::RegimeConfig;
use crate::{Result, SignalError};
use common::{PriceWindow, WindowId};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    Trending,
    Ranging,
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Trending => f.write_str("TRENDING"),
            Regime::Ranging => f.write_str("RANGING"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeClassification {
    pub window_id: WindowId,
    pub regime: Regime,
    /// Raw ADX value (0..100)
    pub strength: f64,
    pub plus_di: f64,
    pub minus_di: f64,
}

/// Directional movement readings at the end of a window
#[derive(Debug, Clone, Copy, PartialEq)]
struct DirectionalIndex {
    adx: f64,
    plus_di: f64,
    minus_di: f64,
}

/// Classifies TRENDING vs RANGING from ADX
#[derive(Debug, Clone)]
pub struct RegimeClassifier {
    config: RegimeConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        Self { config }
    }

    /// Samples needed: configured floor, and enough bars to seed ADX
    pub fn required_length(&self) -> usize {
        self.config.min_length.max(2 * self.config.period + 1)
    }

    pub fn classify(&self, window: &PriceWindow) -> Result<RegimeClassification> {
        let required = self.required_length();
        if window.len() < required {
            return Err(SignalError::InsufficientData {
                component: "regime classifier",
                required,
                actual: window.len(),
            });
        }

        let index = directional_index(
            &window.highs(),
            &window.lows(),
            &window.closes(),
            self.config.period,
        );

        let regime = if index.adx > self.config.trending_threshold {
            Regime::Trending
        } else {
            Regime::Ranging
        };

        debug!(
            window_id = %window.id(),
            adx = index.adx,
            plus_di = index.plus_di,
            minus_di = index.minus_di,
            regime = %regime,
            "Classified regime"
        );

        Ok(RegimeClassification {
            window_id: window.id(),
            regime,
            strength: index.adx,
            plus_di: index.plus_di,
            minus_di: index.minus_di,
        })
    }
}

/// Wilder ADX; caller guarantees at least `2 * period + 1` bars
fn directional_index(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> DirectionalIndex {
    let n = closes.len();
    let p = period as f64;

    let mut tr = Vec::with_capacity(n - 1);
    let mut plus_dm = Vec::with_capacity(n - 1);
    let mut minus_dm = Vec::with_capacity(n - 1);
    for i in 1..n {
        let up = highs[i] - highs[i - 1];
        let down = lows[i - 1] - lows[i];
        plus_dm.push(if up > down && up > 0.0 { up } else { 0.0 });
        minus_dm.push(if down > up && down > 0.0 { down } else { 0.0 });
        tr.push(
            (highs[i] - lows[i])
                .max((highs[i] - closes[i - 1]).abs())
                .max((lows[i] - closes[i - 1]).abs()),
        );
    }

    let mut s_tr: f64 = tr[..period].iter().sum();
    let mut s_plus: f64 = plus_dm[..period].iter().sum();
    let mut s_minus: f64 = minus_dm[..period].iter().sum();

    let di = |s_dm: f64, s_tr: f64| if s_tr > 0.0 { 100.0 * s_dm / s_tr } else { 0.0 };
    let dx = |plus: f64, minus: f64| {
        let sum = plus + minus;
        if sum > 0.0 {
            100.0 * (plus - minus).abs() / sum
        } else {
            0.0
        }
    };

    let mut dx_values = vec![dx(di(s_plus, s_tr), di(s_minus, s_tr))];
    for i in period..tr.len() {
        s_tr = s_tr - s_tr / p + tr[i];
        s_plus = s_plus - s_plus / p + plus_dm[i];
        s_minus = s_minus - s_minus / p + minus_dm[i];
        dx_values.push(dx(di(s_plus, s_tr), di(s_minus, s_tr)));
    }

    let seed = period.min(dx_values.len());
    let mut adx = dx_values[..seed].iter().sum::<f64>() / seed as f64;
    for value in &dx_values[seed..] {
        adx = (adx * (p - 1.0) + value) / p;
    }

    DirectionalIndex {
        adx,
        plus_di: di(s_plus, s_tr),
        minus_di: di(s_minus, s_tr),
    }
}
