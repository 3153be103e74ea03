// Example: End-to-end Signal Analysis
// Builds synthetic multi-timeframe windows, trains the neural engine in the
// background, then prints every presentation view for one verdict.
//
// Usage: cargo run --example analyze_demo [-- engine.toml]

use anyhow::Result;
use common::{
    DateTime, Decimal, Direction, Duration, MarketContext, MultiTimeframeWindows, PriceSample,
    PriceWindow, Timeframe, Utc,
};
use rust_decimal::prelude::*;
use signal_generation::{
    DetailPanel, EngineConfig, FileWeightStore, QualityBadge, SignalEngine, SummaryBanner,
    TrainingExample,
};
use std::sync::Arc;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => EngineConfig::load(&path)?,
        None => EngineConfig::default(),
    };

    let weights_path = std::env::temp_dir().join("signal-engine-demo-weights.json");
    let store = Arc::new(FileWeightStore::new(&weights_path));
    let engine = Arc::new(SignalEngine::new(config)?.with_weight_store(store));

    if !engine.restore_weights().await {
        info!("Starting from initialised weights");
    }

    let end = Utc::now();
    let bundle = bundle(end, 0.004);

    // Runs keep using the current snapshot while training proceeds
    let batch = training_batch(&engine, end)?;
    let training = tokio::spawn(Arc::clone(&engine).train_in_background(batch));

    let before = engine.analyze("BTC-USD", &bundle, None)?;
    println!("Before training: {}", SummaryBanner::from_verdict(&before));

    let summary = training.await??;
    info!(
        loss_before = summary.loss_before,
        loss_after = summary.loss_after,
        version = summary.version,
        "Training finished"
    );
    engine.persist_weights().await?;

    let context = MarketContext::new(end - Duration::minutes(20))
        .with_fear_greed(68.0)
        .with_macro_event(end + Duration::days(3));
    let verdict = engine.analyze("BTC-USD", &bundle, Some(&context))?;

    println!("\n{}", SummaryBanner::from_verdict(&verdict));
    println!("{}", QualityBadge::from_verdict(&verdict));
    println!("\n{}", DetailPanel::from_verdict(&verdict));
    println!("{}", serde_json::to_string_pretty(&verdict)?);

    Ok(())
}

/// Labelled windows: rising series as LONG, falling as SHORT, flat as NEUTRAL
fn training_batch(engine: &SignalEngine, end: DateTime<Utc>) -> Result<Vec<TrainingExample>> {
    let mut batch = Vec::new();
    for i in 0..8 {
        let shift = i as f64 * 0.3;
        for (drift, label) in [
            (0.004, Direction::Long),
            (-0.004, Direction::Short),
            (0.0, Direction::Neutral),
        ] {
            let window = synthetic_window(end, Timeframe::H1, 120, drift, shift)?;
            batch.push(engine.training_example(&window, label)?);
        }
    }
    Ok(batch)
}

fn bundle(end: DateTime<Utc>, drift: f64) -> MultiTimeframeWindows {
    Timeframe::ALL
        .iter()
        .fold(MultiTimeframeWindows::new(), |bundle, tf| {
            match synthetic_window(end, *tf, 120, drift, 0.0) {
                Ok(window) => bundle.with_window(*tf, window),
                Err(e) => {
                    tracing::warn!(timeframe = %tf, "Skipping window: {}", e);
                    bundle
                }
            }
        })
}

/// Geometric drift with a slow oscillation, ending at `end`
fn synthetic_window(
    end: DateTime<Utc>,
    timeframe: Timeframe,
    len: usize,
    drift: f64,
    phase: f64,
) -> Result<PriceWindow> {
    let mut samples = Vec::with_capacity(len);
    let mut prev = 40_000.0;
    for i in 0..len {
        let t = i as f64;
        let close = prev * (1.0 + drift + 0.006 * (t * 0.9 + phase).sin());
        let open = prev;
        let wick = close * 0.0015;
        let volume = 900.0 + 300.0 * (t * 0.4).cos().abs();
        let dec = |v: f64| Decimal::from_f64(v).unwrap_or_default().round_dp(2);
        samples.push(PriceSample::new(
            end - timeframe.duration() * (len - 1 - i) as i32,
            dec(open),
            dec(open.max(close) + wick),
            dec(open.min(close) - wick),
            dec(close),
            dec(volume),
        ));
        prev = close;
    }
    Ok(PriceWindow::new(samples)?)
}
