// Market Data Model
// Immutable price samples and the ordered windows the engine analyses

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Chart timeframe of a price window
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M15,
    H1,
    H4,
    D1,
    W1,
}

impl Timeframe {
    /// All supported timeframes, lowest first
    pub const ALL: [Timeframe; 5] = [
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
        Timeframe::W1,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1H",
            Timeframe::H4 => "4H",
            Timeframe::D1 => "1D",
            Timeframe::W1 => "1W",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
            Timeframe::W1 => Duration::weeks(1),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Directional call shared by every signal source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Long,
    Short,
    Neutral,
}

impl Direction {
    /// +1.0 for long, -1.0 for short, 0.0 for neutral
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
            Direction::Neutral => 0.0,
        }
    }

    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Direction::Long
        } else if value < 0.0 {
            Direction::Short
        } else {
            Direction::Neutral
        }
    }

    pub fn is_directional(&self) -> bool {
        *self != Direction::Neutral
    }

    /// True only for a flat long-vs-short disagreement
    pub fn opposes(&self, other: Direction) -> bool {
        matches!(
            (self, other),
            (Direction::Long, Direction::Short) | (Direction::Short, Direction::Long)
        )
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Long => "LONG",
            Direction::Short => "SHORT",
            Direction::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

/// One OHLCV observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl PriceSample {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// Deterministic fingerprint of a price window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowId(pub Uuid);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("sample at index {index} ({timestamp}) is older than its predecessor")]
    Unordered {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("duplicate sample timestamp {0}")]
    DuplicateTimestamp(DateTime<Utc>),
}

/// Ordered, duplicate-free run of price samples
#[derive(Debug, Clone)]
pub struct PriceWindow {
    id: WindowId,
    samples: Vec<PriceSample>,
}

impl PriceWindow {
    /// Validate ordering and fingerprint the window
    pub fn new(samples: Vec<PriceSample>) -> Result<Self, WindowError> {
        for (index, pair) in samples.windows(2).enumerate() {
            if pair[1].timestamp == pair[0].timestamp {
                return Err(WindowError::DuplicateTimestamp(pair[1].timestamp));
            }
            if pair[1].timestamp < pair[0].timestamp {
                return Err(WindowError::Unordered {
                    index: index + 1,
                    timestamp: pair[1].timestamp,
                });
            }
        }

        let id = Self::fingerprint(&samples);
        Ok(Self { id, samples })
    }

    fn fingerprint(samples: &[PriceSample]) -> WindowId {
        let mut bytes = Vec::with_capacity(samples.len() * 88);
        for sample in samples {
            bytes.extend_from_slice(&sample.timestamp.timestamp_millis().to_be_bytes());
            for value in [
                sample.open,
                sample.high,
                sample.low,
                sample.close,
                sample.volume,
            ] {
                // Normalise so 1.0 and 1.00 hash identically
                bytes.extend_from_slice(&value.normalize().serialize());
            }
        }
        WindowId(Uuid::new_v5(&Uuid::NAMESPACE_OID, &bytes))
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[PriceSample] {
        &self.samples
    }

    pub fn last(&self) -> Option<&PriceSample> {
        self.samples.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.series(|s| s.close)
    }

    pub fn opens(&self) -> Vec<f64> {
        self.series(|s| s.open)
    }

    pub fn highs(&self) -> Vec<f64> {
        self.series(|s| s.high)
    }

    pub fn lows(&self) -> Vec<f64> {
        self.series(|s| s.low)
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.series(|s| s.volume)
    }

    fn series(&self, field: impl Fn(&PriceSample) -> Decimal) -> Vec<f64> {
        self.samples
            .iter()
            .map(|s| field(s).to_f64().unwrap_or(0.0))
            .collect()
    }
}

/// One window per timeframe for the same asset
#[derive(Debug, Clone, Default)]
pub struct MultiTimeframeWindows {
    windows: BTreeMap<Timeframe, PriceWindow>,
}

impl MultiTimeframeWindows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(mut self, timeframe: Timeframe, window: PriceWindow) -> Self {
        self.insert(timeframe, window);
        self
    }

    pub fn insert(&mut self, timeframe: Timeframe, window: PriceWindow) {
        self.windows.insert(timeframe, window);
    }

    pub fn get(&self, timeframe: Timeframe) -> Option<&PriceWindow> {
        self.windows.get(&timeframe)
    }

    /// Timeframes present, lowest first
    pub fn timeframes(&self) -> impl Iterator<Item = Timeframe> + '_ {
        self.windows.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Timeframe, &PriceWindow)> {
        self.windows.iter().map(|(tf, w)| (*tf, w))
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(minute: i64, close: i64) -> PriceSample {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute);
        let price = Decimal::from(close);
        PriceSample::new(ts, price, price, price, price, Decimal::from(10))
    }

    #[test]
    fn test_window_rejects_duplicates() {
        let result = PriceWindow::new(vec![sample(0, 100), sample(0, 101)]);
        assert!(matches!(result, Err(WindowError::DuplicateTimestamp(_))));
    }

    #[test]
    fn test_window_rejects_unordered() {
        let result = PriceWindow::new(vec![sample(5, 100), sample(1, 101)]);
        assert!(matches!(result, Err(WindowError::Unordered { index: 1, .. })));
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = PriceWindow::new(vec![sample(0, 100), sample(1, 101)]).unwrap();
        let b = PriceWindow::new(vec![sample(0, 100), sample(1, 101)]).unwrap();
        let c = PriceWindow::new(vec![sample(0, 100), sample(1, 102)]).unwrap();

        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_fingerprint_ignores_decimal_scale() {
        let mut scaled = sample(0, 100);
        scaled.close = Decimal::from_str_exact("100.00").unwrap();
        let a = PriceWindow::new(vec![sample(0, 100)]).unwrap();
        let b = PriceWindow::new(vec![scaled]).unwrap();
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_direction_opposes() {
        assert!(Direction::Long.opposes(Direction::Short));
        assert!(!Direction::Long.opposes(Direction::Neutral));
        assert!(!Direction::Short.opposes(Direction::Short));
        assert_eq!(Direction::from_sign(-0.2), Direction::Short);
    }
}
