// Macro / Sentiment Context
// Optional, possibly stale bundle supplied by an external collaborator

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Sentiment and macro-event context for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    /// When the bundle was produced by its source
    pub as_of: DateTime<Utc>,
    /// Fear/greed style index, 0 (extreme fear) to 100 (extreme greed)
    pub fear_greed_index: Option<f64>,
    /// Next scheduled macro event (rate decision, CPI print, ...)
    pub next_macro_event: Option<DateTime<Utc>>,
}

impl MarketContext {
    pub fn new(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            fear_greed_index: None,
            next_macro_event: None,
        }
    }

    pub fn with_fear_greed(mut self, index: f64) -> Self {
        self.fear_greed_index = Some(index.clamp(0.0, 100.0));
        self
    }

    pub fn with_macro_event(mut self, at: DateTime<Utc>) -> Self {
        self.next_macro_event = Some(at);
        self
    }

    /// Age of the bundle relative to the analysis time (never negative)
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.as_of).max(Duration::zero())
    }

    pub fn is_stale(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        self.age(now) > max_age
    }

    /// True when a scheduled event falls inside `[now, now + window]`
    pub fn macro_event_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.next_macro_event {
            Some(event) => event >= now && event - now <= window,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_staleness() {
        let as_of = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let context = MarketContext::new(as_of);

        assert!(!context.is_stale(as_of + Duration::hours(1), Duration::hours(6)));
        assert!(context.is_stale(as_of + Duration::hours(7), Duration::hours(6)));
        // A bundle from the future is treated as fresh
        assert_eq!(context.age(as_of - Duration::hours(1)), Duration::zero());
    }

    #[test]
    fn test_macro_event_proximity() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let context = MarketContext::new(now).with_macro_event(now + Duration::hours(10));

        assert!(context.macro_event_within(now, Duration::hours(24)));
        assert!(!context.macro_event_within(now, Duration::hours(6)));
        assert!(!MarketContext::new(now).macro_event_within(now, Duration::hours(24)));
    }
}
