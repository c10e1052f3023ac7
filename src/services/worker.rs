use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::time::sleep;

const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
/// Files younger than this may still belong to an in-flight upload
const MIN_MAX_AGE: Duration = Duration::from_secs(3600);

/// Removes staging files left behind by crashes, power loss or explicit retention
pub struct StagingSweeper {
    staging_root: PathBuf,
    max_age: Duration,
    shutdown: watch::Receiver<bool>,
}

impl StagingSweeper {
    pub fn new(staging_root: PathBuf, max_age: Duration, shutdown: watch::Receiver<bool>) -> Self {
        let max_age = if max_age < MIN_MAX_AGE {
            tracing::warn!(
                "Staging sweeper max age {:?} is below {:?}, raising it",
                max_age,
                MIN_MAX_AGE
            );
            MIN_MAX_AGE
        } else {
            max_age
        };

        Self {
            staging_root,
            max_age,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Staging sweeper started");

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Staging sweeper shutting down");
                    break;
                }
                _ = sleep(SWEEP_INTERVAL) => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    async fn perform_cleanup(&self) {
        tracing::info!("🧹 Sweeping stale staging files...");

        match sweep_stale_files(&self.staging_root, self.max_age).await {
            Ok(0) => tracing::info!("✅ Staging sweep completed, nothing to remove"),
            Ok(n) => tracing::info!("✅ Staging sweep removed {} stale file(s)", n),
            Err(e) => tracing::error!("Staging sweep failed: {}", e),
        }
    }
}

/// Deletes regular files directly under `root` whose last modification is at
/// least `max_age` ago. Returns how many were removed.
pub async fn sweep_stale_files(root: &Path, max_age: Duration) -> io::Result<usize> {
    let mut entries = tokio::fs::read_dir(root).await?;
    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            // Raced with an ingestion finishing its own cleanup
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        if !metadata.is_file() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }

        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => {
                tracing::info!("Removed stale staging file: {}", entry.path().display());
                removed += 1;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Failed to remove stale staging file {}: {}",
                entry.path().display(),
                e
            ),
        }
    }

    Ok(removed)
}
