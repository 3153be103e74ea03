// Technical Indicators
// Pure slice-based helpers shared by the feature, regime, structural and
// momentum components. None of these panic on short or flat input.

use statrs::statistics::Statistics;

/// MACD line, signal line and histogram
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Swing point: bar index and price
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
}

/// Simple moving average of the last `period` values
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// EMA series seeded with the first value
pub fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return out;
    };
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = first;
    out.push(ema);
    for value in &values[1..] {
        ema = value * k + ema * (1.0 - k);
        out.push(ema);
    }
    out
}

/// Latest EMA value, once at least `period` values are available
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    ema_series(values, period).last().copied()
}

/// Wilder RSI over the whole slice
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period + 1 {
        return None;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=period {
        let change = values[i] - values[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss -= change;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;

    for i in (period + 1)..values.len() {
        let change = values[i] - values[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, -change)
        };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
    }

    if avg_loss == 0.0 {
        // Flat series reads neutral, a pure uptrend reads 100
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }
    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// Standard 12/26/9 MACD
pub fn macd(values: &[f64]) -> Option<Macd> {
    const FAST: usize = 12;
    const SLOW: usize = 26;
    const SIGNAL: usize = 9;

    if values.len() < SLOW + SIGNAL {
        return None;
    }
    let fast = ema_series(values, FAST);
    let slow = ema_series(values, SLOW);
    let lines: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal = *ema_series(&lines[SLOW - 1..], SIGNAL).last()?;
    let line = *lines.last()?;

    Some(Macd {
        line,
        signal,
        histogram: line - signal,
    })
}

/// Stochastic %K (0..100) over the last `period` bars
pub fn stochastic_k(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    let n = closes.len();
    if period == 0 || n < period || highs.len() != n || lows.len() != n {
        return None;
    }
    let highest = highs[n - period..].iter().copied().fold(f64::MIN, f64::max);
    let lowest = lows[n - period..].iter().copied().fold(f64::MAX, f64::min);
    let range = highest - lowest;
    if range <= 0.0 {
        return Some(50.0);
    }
    Some((closes[n - 1] - lowest) / range * 100.0)
}

/// Bollinger %B: 0 at the lower band, 1 at the upper band
pub fn bollinger_percent_b(closes: &[f64], period: usize, width: f64) -> Option<f64> {
    if closes.len() < period {
        return None;
    }
    let mean = sma(closes, period)?;
    let sd = std_dev(&closes[closes.len() - period..])?;
    if sd == 0.0 {
        return Some(0.5);
    }
    let lower = mean - width * sd;
    let upper = mean + width * sd;
    closes.last().map(|c| (c - lower) / (upper - lower))
}

/// True range of every bar after the first
pub fn true_ranges(highs: &[f64], lows: &[f64], closes: &[f64]) -> Vec<f64> {
    let n = closes.len().min(highs.len()).min(lows.len());
    (1..n)
        .map(|i| {
            let prev_close = closes[i - 1];
            (highs[i] - lows[i])
                .max((highs[i] - prev_close).abs())
                .max((lows[i] - prev_close).abs())
        })
        .collect()
}

/// Wilder-smoothed average true range
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Option<f64> {
    let ranges = true_ranges(highs, lows, closes);
    if period == 0 || ranges.len() < period {
        return None;
    }
    let mut value = ranges[..period].iter().sum::<f64>() / period as f64;
    for tr in &ranges[period..] {
        value = (value * (period as f64 - 1.0) + tr) / period as f64;
    }
    Some(value)
}

/// Percentage return over `lookback` bars
pub fn pct_return(values: &[f64], lookback: usize) -> Option<f64> {
    if lookback == 0 || values.len() <= lookback {
        return None;
    }
    let current = values[values.len() - 1];
    let past = values[values.len() - 1 - lookback];
    if past == 0.0 {
        return Some(0.0);
    }
    Some((current - past) / past)
}

/// Bar-to-bar percentage returns
pub fn returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| if w[0] == 0.0 { 0.0 } else { (w[1] - w[0]) / w[0] })
        .collect()
}

/// Sample standard deviation; `None` below two finite values
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let sd = values.iter().std_dev();
    sd.is_finite().then_some(sd)
}

/// Fractal swing highs: bars strictly above `strength` neighbours each side
pub fn swing_highs(highs: &[f64], strength: usize) -> Vec<SwingPoint> {
    swing_points(highs, strength, |candidate, other| candidate > other)
}

/// Fractal swing lows: bars strictly below `strength` neighbours each side
pub fn swing_lows(lows: &[f64], strength: usize) -> Vec<SwingPoint> {
    swing_points(lows, strength, |candidate, other| candidate < other)
}

fn swing_points(values: &[f64], strength: usize, dominates: fn(f64, f64) -> bool) -> Vec<SwingPoint> {
    if strength == 0 || values.len() < 2 * strength + 1 {
        return Vec::new();
    }
    (strength..values.len() - strength)
        .filter(|&i| {
            let candidate = values[i];
            values[i - strength..i]
                .iter()
                .chain(&values[i + 1..=i + strength])
                .all(|&other| dominates(candidate, other))
        })
        .map(|index| SwingPoint {
            index,
            price: values[index],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sma_and_ema() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(sma(&values, 3), Some(3.0));
        assert_eq!(sma(&values, 5), None);

        let series = ema_series(&values, 3);
        assert_eq!(series.len(), 4);
        assert_eq!(series[0], 1.0);
        assert!(series[3] > series[2]);
        assert_eq!(ema(&values, 3), series.last().copied());
    }

    #[test]
    fn test_rsi_extremes() {
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let flat = vec![100.0; 30];

        assert_eq!(rsi(&rising, 14), Some(100.0));
        assert!(rsi(&falling, 14).unwrap() < 1.0);
        assert_eq!(rsi(&flat, 14), Some(50.0));
        assert_eq!(rsi(&flat[..10], 14), None);
    }

    #[test]
    fn test_macd_sign_follows_trend() {
        let rising: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let falling: Vec<f64> = (0..60).map(|i| 200.0 - i as f64).collect();

        assert!(macd(&rising).unwrap().line > 0.0);
        assert!(macd(&falling).unwrap().line < 0.0);
        assert!(macd(&rising[..20]).is_none());
    }

    #[test]
    fn test_stochastic_and_bollinger_on_flat_input() {
        let flat = vec![10.0; 25];
        assert_eq!(stochastic_k(&flat, &flat, &flat, 14), Some(50.0));
        assert_eq!(bollinger_percent_b(&flat, 20, 2.0), Some(0.5));
    }

    #[test]
    fn test_atr() {
        let highs = vec![11.0; 20];
        let lows = vec![9.0; 20];
        let closes = vec![10.0; 20];
        let value = atr(&highs, &lows, &closes, 14).unwrap();
        assert!((value - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_returns_and_std_dev() {
        assert_eq!(pct_return(&[100.0, 110.0], 1), Some(0.1));
        assert_eq!(pct_return(&[0.0, 110.0], 1), Some(0.0));
        assert_eq!(returns(&[100.0, 110.0, 99.0]).len(), 2);
        assert_eq!(std_dev(&[1.0]), None);
        assert!((std_dev(&[1.0, 3.0]).unwrap() - 2f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_swing_points() {
        let highs = [1.0, 2.0, 5.0, 2.0, 1.0, 3.0, 6.0, 3.0, 2.0];
        let swings = swing_highs(&highs, 2);
        assert_eq!(
            swings,
            vec![
                SwingPoint { index: 2, price: 5.0 },
                SwingPoint { index: 6, price: 6.0 }
            ]
        );

        let lows: Vec<f64> = highs.iter().map(|h| -h).collect();
        assert_eq!(swing_lows(&lows, 2).len(), 2);
        assert!(swing_highs(&[1.0; 10], 2).is_empty());
    }
}
