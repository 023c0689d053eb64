use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::domain::stock::StockRecord;

/// Read/write handle over the single persisted snapshot artifact.
///
/// The artifact is a pretty-printed JSON array of [`StockRecord`]s. Writes
/// are plain overwrites: a reader racing a write may observe a partial file,
/// which the serving layer tolerates. A failed scrape never reaches this
/// type, so the previous snapshot survives every error path.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, records: &[StockRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create snapshot dir {}", parent.display()))?;
        }

        let json = serde_json::to_vec_pretty(records).context("failed to serialize snapshot")?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("failed to write snapshot {}", self.path.display()))?;

        Ok(())
    }

    /// Raw artifact bytes, for serving without a decode/encode round trip.
    pub async fn read_bytes(&self) -> Result<Vec<u8>> {
        tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("failed to read snapshot {}", self.path.display()))
    }

    pub async fn read(&self) -> Result<Vec<StockRecord>> {
        let bytes = self.read_bytes().await?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("snapshot {} is not valid JSON", self.path.display()))
    }
}
