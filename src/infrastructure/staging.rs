use crate::config::IngestConfig;
use anyhow::Context;
use std::path::PathBuf;
use tracing::info;

/// Makes sure the staging root exists and is a directory we can use
pub async fn setup_staging_root(config: &IngestConfig) -> anyhow::Result<PathBuf> {
    let root = &config.staging_root;

    tokio::fs::create_dir_all(root)
        .await
        .with_context(|| format!("Failed to create staging root {}", root.display()))?;

    let metadata = tokio::fs::metadata(root).await?;
    if !metadata.is_dir() {
        anyhow::bail!("Staging root {} is not a directory", root.display());
    }
    if metadata.permissions().readonly() {
        anyhow::bail!("Staging root {} is read-only", root.display());
    }

    info!(
        "📁 Staging root: {} (retention: {:?})",
        root.display(),
        config.retention
    );

    Ok(root.clone())
}
