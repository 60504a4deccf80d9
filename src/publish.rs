use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use crate::models::Snapshot;

/// Somewhere a finished snapshot is published. Each publish replaces the
/// previous snapshot wholesale.
#[async_trait]
pub trait SnapshotPublisher: Send + Sync {
    /// Human-readable destination, used in logs.
    fn target(&self) -> String;

    async fn publish(&self, snapshot: &Snapshot) -> anyhow::Result<()>;
}

/// Local JSON copy of the latest snapshot, read back by `show`.
pub struct FileCachePublisher {
    path: PathBuf,
}

impl FileCachePublisher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotPublisher for FileCachePublisher {
    fn target(&self) -> String {
        self.path.display().to_string()
    }

    async fn publish(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let body = serde_json::to_vec_pretty(snapshot).context("failed to serialize snapshot")?;
        write_atomic(&self.path, &body).await
    }
}

/// Writes next to the destination first and renames over it, so readers
/// only ever see a complete file.
pub async fn write_atomic(path: &Path, body: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let file_name = path
        .file_name()
        .with_context(|| format!("{} is not a file path", path.display()))?;
    let mut staging_name = file_name.to_os_string();
    staging_name.push(".partial");
    let staging = path.with_file_name(staging_name);

    tokio::fs::write(&staging, body)
        .await
        .with_context(|| format!("failed to write {}", staging.display()))?;
    tokio::fs::rename(&staging, path)
        .await
        .with_context(|| format!("failed to move snapshot into {}", path.display()))?;

    debug!("publish: wrote {} bytes to {}", body.len(), path.display());
    Ok(())
}

/// Returns the cached snapshot if it was written within `max_age`.
pub async fn read_fresh_cache(path: &Path, max_age: Duration) -> anyhow::Result<Option<String>> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to inspect {}", path.display()))
        }
    };

    let modified = metadata
        .modified()
        .with_context(|| format!("no modification time for {}", path.display()))?;
    let age = SystemTime::now()
        .duration_since(modified)
        .unwrap_or(Duration::ZERO);
    if age > max_age {
        debug!("publish: cache {} is {}s old, ignoring", path.display(), age.as_secs());
        return Ok(None);
    }

    let body = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Some(body))
}
