//! Shared market data model
//!
//! Price samples, ordered windows, timeframes and the macro/sentiment
//! context bundle consumed by the signal engine.

mod context;
mod market;

pub use context::MarketContext;
pub use market::{
    Direction, MultiTimeframeWindows, PriceSample, PriceWindow, Timeframe, WindowError, WindowId,
};

pub use chrono::{DateTime, Duration, Utc};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
