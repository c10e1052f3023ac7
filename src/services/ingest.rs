use crate::services::staging::StagedFile;
use crate::services::translator::Translator;
use crate::utils::validation::{ValidationPolicy, sanitize_filename, validate_media_type};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncRead;
use utoipa::ToSchema;

/// Every way an ingestion can fail. The first three are the client's fault.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    #[error(
        "Invalid audio file type: {media_type}. Allowed types are: {}",
        .allowed.join(", ")
    )]
    UnsupportedMediaType {
        media_type: String,
        allowed: Vec<String>,
    },

    #[error("Upload exceeds the maximum allowed size of {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("Could not save file on server: {0}")]
    StagingIo(#[from] std::io::Error),

    #[error("Failed to process audio: {0:#}")]
    ProcessingFailed(anyhow::Error),
}

impl IngestError {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            IngestError::InvalidFilename(_)
                | IngestError::UnsupportedMediaType { .. }
                | IngestError::PayloadTooLarge { .. }
        )
    }
}

/// Whether staged files survive the call that created them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
    #[default]
    Never,
    /// Keep the file when the translator fails, for debugging
    OnFailure,
    /// Keep the file after translation whatever the outcome, for audit
    Always,
}

impl RetentionPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "never" | "none" | "remove" => Some(Self::Never),
            "on_failure" | "on-failure" | "failure" => Some(Self::OnFailure),
            "always" | "keep" => Some(Self::Always),
            _ => None,
        }
    }

    fn keep_on_success(self) -> bool {
        self == Self::Always
    }

    fn keep_on_failure(self) -> bool {
        matches!(self, Self::OnFailure | Self::Always)
    }
}

pub struct UploadRequest<R> {
    /// Untrusted, may contain path components
    pub filename: String,
    /// Untrusted, only ever checked against the allow-list
    pub media_type: String,
    pub content: R,
}

#[derive(Debug, Clone)]
pub struct TranslationResult {
    pub source_filename: String,
    pub media_type: String,
    pub result_text: String,
    pub byte_count: u64,
    pub sha256: String,
    /// Where the bytes were staged. Only still on disk when `retained` is set.
    pub staged_path: PathBuf,
    pub retained: bool,
}

/// Validates an upload, stages it under a unique name, hands it to the
/// translator and cleans up. Holds no state shared between calls, so one
/// instance serves any number of concurrent uploads.
pub struct UploadIngestor {
    staging_root: PathBuf,
    policy: ValidationPolicy,
    retention: RetentionPolicy,
    translator: Arc<dyn Translator>,
}

impl UploadIngestor {
    pub fn new(
        staging_root: PathBuf,
        policy: ValidationPolicy,
        retention: RetentionPolicy,
        translator: Arc<dyn Translator>,
    ) -> Self {
        Self {
            staging_root,
            policy,
            retention,
            translator,
        }
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    pub fn translator(&self) -> &Arc<dyn Translator> {
        &self.translator
    }

    /// Runs validate → stage → translate → cleanup for one upload.
    ///
    /// At most one staged file exists per call. It is gone when this returns
    /// unless the retention policy asked to keep it, and it is also removed if
    /// the returned future is dropped before completion.
    pub async fn ingest<R>(&self, request: UploadRequest<R>) -> Result<TranslationResult, IngestError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let UploadRequest {
            filename,
            media_type,
            content,
        } = request;

        tracing::info!(
            filename = %filename,
            content_type = %media_type,
            "Received audio upload"
        );

        // 1. Validation, before anything touches the filesystem
        let media_type = validate_media_type(&media_type, &self.policy).inspect_err(|e| {
            tracing::warn!("Rejected upload '{}': {}", filename, e);
        })?;
        let source_filename = sanitize_filename(&filename).inspect_err(|e| {
            tracing::warn!("Rejected upload: {}", e);
        })?;

        // 2. Stage
        let mut staged = StagedFile::create(&self.staging_root, &source_filename)
            .await
            .inspect_err(|e| tracing::error!("Could not create staging file: {}", e))?;

        if let Err(e) = staged.write_from(content, self.policy.max_bytes).await {
            if e.is_client_error() {
                tracing::warn!("Rejected upload '{}': {}", source_filename, e);
            } else {
                tracing::error!("Error staging '{}': {}", source_filename, e);
            }
            // Partial bytes are never retained
            if let Err(rm_err) = staged.remove().await {
                tracing::warn!("Could not remove partial staging file: {}", rm_err);
            }
            return Err(e);
        }

        let byte_count = staged.byte_count();
        let sha256 = staged.sha256().to_string();
        let staged_path = staged.path().to_path_buf();
        tracing::info!(
            filename = %source_filename,
            bytes = byte_count,
            sha256 = %sha256,
            "Staged upload"
        );

        // 3. Translate
        let translated = self.translator.translate(&staged_path, &media_type).await;

        // 4. Cleanup according to retention, then respond
        match translated {
            Ok(result_text) => {
                let retained = Self::finish(staged, self.retention.keep_on_success()).await;
                tracing::info!("Processing complete for {}", source_filename);

                Ok(TranslationResult {
                    source_filename,
                    media_type,
                    result_text,
                    byte_count,
                    sha256,
                    staged_path,
                    retained,
                })
            }
            Err(e) => {
                tracing::error!(
                    "Error during translation processing for '{}': {:#}",
                    source_filename,
                    e
                );
                Self::finish(staged, self.retention.keep_on_failure()).await;
                Err(IngestError::ProcessingFailed(e))
            }
        }
    }

    async fn finish(staged: StagedFile, keep: bool) -> bool {
        if keep {
            match staged.retain() {
                Ok(path) => {
                    tracing::info!("Retained staged file: {}", path.display());
                    true
                }
                Err(e) => {
                    tracing::warn!("Could not retain staged file: {}", e);
                    false
                }
            }
        } else {
            if let Err(e) = staged.remove().await {
                tracing::warn!("Could not remove staged file: {}", e);
            }
            false
        }
    }
}
