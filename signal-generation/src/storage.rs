// Weight Storage Interface
// Persists neural weight snapshots across process restarts

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Trait for weight storage backends
#[async_trait::async_trait]
pub trait WeightStore: Send + Sync {
    /// Load the last saved weights, `None` if nothing was saved yet
    async fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Save exported weights, replacing any previous copy
    async fn save(&self, bytes: &[u8]) -> Result<()>;

    /// Get storage statistics
    async fn stats(&self) -> Result<WeightStoreStats>;
}

/// Storage statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeightStoreStats {
    /// Saves made through this store instance
    pub saves: usize,
    pub last_saved: Option<DateTime<Utc>>,
    pub size_bytes: Option<usize>,
}

#[derive(Debug, Default)]
struct StoredWeights {
    bytes: Option<Vec<u8>>,
    stats: WeightStoreStats,
}

/// In-memory weight storage (for testing and development)
#[derive(Debug, Default)]
pub struct InMemoryWeightStore {
    state: tokio::sync::RwLock<StoredWeights>,
}

impl InMemoryWeightStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the store, e.g. with corrupt bytes in tests
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        Self {
            state: tokio::sync::RwLock::new(StoredWeights {
                stats: WeightStoreStats {
                    saves: 0,
                    last_saved: None,
                    size_bytes: Some(bytes.len()),
                },
                bytes: Some(bytes),
            }),
        }
    }
}

#[async_trait::async_trait]
impl WeightStore for InMemoryWeightStore {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        let state = self.state.read().await;
        Ok(state.bytes.clone())
    }

    async fn save(&self, bytes: &[u8]) -> Result<()> {
        let mut state = self.state.write().await;
        state.bytes = Some(bytes.to_vec());
        state.stats.saves += 1;
        state.stats.last_saved = Some(Utc::now());
        state.stats.size_bytes = Some(bytes.len());
        Ok(())
    }

    async fn stats(&self) -> Result<WeightStoreStats> {
        let state = self.state.read().await;
        Ok(state.stats.clone())
    }
}

/// Single-file weight storage
#[derive(Debug)]
pub struct FileWeightStore {
    path: PathBuf,
    saves: AtomicUsize,
}

impl FileWeightStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            saves: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl WeightStore for FileWeightStore {
    async fn load(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        }
    }

    async fn save(&self, bytes: &[u8]) -> Result<()> {
        // Write then rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn stats(&self) -> Result<WeightStoreStats> {
        let saves = self.saves.load(Ordering::Relaxed);
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) => Ok(WeightStoreStats {
                saves,
                last_saved: meta.modified().ok().map(DateTime::<Utc>::from),
                size_bytes: usize::try_from(meta.len()).ok(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(WeightStoreStats {
                saves,
                ..WeightStoreStats::default()
            }),
            Err(e) => Err(e.into()),
        }
    }
}
