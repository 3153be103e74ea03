// Feature Extraction
// Turns a price window into the fixed-length vector the neural engine consumes

use crate::indicators;
use crate::{Result, SignalError};
use common::{PriceWindow, WindowId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Length of every feature vector
pub const FEATURE_DIM: usize = 20;

/// Return lookbacks, in bars
const RETURN_LOOKBACKS: [usize; 5] = [1, 3, 5, 10, 20];

/// Features are clamped to this magnitude after extraction
const FEATURE_CLAMP: f64 = 10.0;

pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "return_1",
    "return_3",
    "return_5",
    "return_10",
    "return_20",
    "volatility_20",
    "volatility_window",
    "close_vs_sma10",
    "close_vs_sma20",
    "sma10_vs_sma20",
    "rsi_14",
    "macd_line",
    "macd_histogram",
    "stochastic_k",
    "bollinger_b",
    "volume_ratio",
    "bar_range",
    "atr_14",
    "range_position",
    "up_bar_share",
];

/// Fixed-length feature vector, tied to the window it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    window_id: WindowId,
    values: [f64; FEATURE_DIM],
}

impl FeatureVector {
    /// Build a vector directly, e.g. for training data
    pub fn new(window_id: WindowId, values: [f64; FEATURE_DIM]) -> Self {
        Self { window_id, values }
    }

    pub fn window_id(&self) -> WindowId {
        self.window_id
    }

    pub fn values(&self) -> &[f64; FEATURE_DIM] {
        &self.values
    }
}

/// Stateless extractor; identical input gives bit-identical output
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract features, failing when the window holds fewer than `min_length` samples
    pub fn extract(&self, window: &PriceWindow, min_length: usize) -> Result<FeatureVector> {
        let required = min_length.max(2);
        if window.len() < required {
            return Err(SignalError::InsufficientData {
                component: "feature extractor",
                required,
                actual: window.len(),
            });
        }

        let closes = window.closes();
        let highs = window.highs();
        let lows = window.lows();
        let volumes = window.volumes();
        let returns = indicators::returns(&closes);
        let close = closes[closes.len() - 1];

        let mut values = [0.0; FEATURE_DIM];

        for (slot, lookback) in RETURN_LOOKBACKS.iter().enumerate() {
            values[slot] = indicators::pct_return(&closes, *lookback).unwrap_or(0.0);
        }

        let recent_returns = &returns[returns.len().saturating_sub(20)..];
        values[5] = indicators::std_dev(recent_returns).unwrap_or(0.0);
        values[6] = indicators::std_dev(&returns).unwrap_or(0.0);

        let sma10 = indicators::sma(&closes, 10);
        let sma20 = indicators::sma(&closes, 20);
        values[7] = relative(close, sma10);
        values[8] = relative(close, sma20);
        values[9] = match sma10 {
            Some(fast) => relative(fast, sma20),
            None => 0.0,
        };

        values[10] = indicators::rsi(&closes, 14)
            .map(|r| (r - 50.0) / 50.0)
            .unwrap_or(0.0);

        if let Some(macd) = indicators::macd(&closes) {
            values[11] = ratio(macd.line, close);
            values[12] = ratio(macd.histogram, close);
        }

        values[13] = indicators::stochastic_k(&highs, &lows, &closes, 14)
            .map(|k| (k - 50.0) / 50.0)
            .unwrap_or(0.0);
        values[14] = indicators::bollinger_percent_b(&closes, 20, 2.0)
            .map(|b| b - 0.5)
            .unwrap_or(0.0);

        let last_volume = volumes[volumes.len() - 1];
        values[15] = match indicators::sma(&volumes, 20.min(volumes.len())) {
            Some(avg) if avg > 0.0 => last_volume / avg - 1.0,
            _ => 0.0,
        };

        values[16] = ratio(highs[highs.len() - 1] - lows[lows.len() - 1], close);
        values[17] = indicators::atr(&highs, &lows, &closes, 14)
            .map(|a| ratio(a, close))
            .unwrap_or(0.0);

        let highest = highs.iter().copied().fold(f64::MIN, f64::max);
        let lowest = lows.iter().copied().fold(f64::MAX, f64::min);
        values[18] = if highest > lowest {
            (close - lowest) / (highest - lowest) - 0.5
        } else {
            0.0
        };

        if !recent_returns.is_empty() {
            let up = recent_returns.iter().filter(|r| **r > 0.0).count();
            values[19] = up as f64 / recent_returns.len() as f64 - 0.5;
        }

        for value in values.iter_mut() {
            *value = if value.is_finite() {
                value.clamp(-FEATURE_CLAMP, FEATURE_CLAMP)
            } else {
                0.0
            };
        }

        debug!(window_id = %window.id(), samples = window.len(), "Extracted features");

        Ok(FeatureVector::new(window.id(), values))
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

fn relative(value: f64, reference: Option<f64>) -> f64 {
    match reference {
        Some(r) if r != 0.0 => value / r - 1.0,
        _ => 0.0,
    }
}
