use crate::services::ingest::IngestError;
use crate::utils::validation::staging_name_parts;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

const COPY_BUFFER_SIZE: usize = 64 * 1024;
const RANDOM_SUFFIX_LEN: usize = 16;

/// A single in-flight upload on disk.
///
/// The file is created with create-new semantics under a randomised name, so two
/// uploads sharing a client filename never touch the same path. Dropping a
/// `StagedFile` that was not explicitly retained deletes it, which also covers
/// callers that abandon the ingestion future mid-write.
pub struct StagedFile {
    file: NamedTempFile,
    byte_count: u64,
    sha256: String,
}

impl StagedFile {
    /// Creates an empty staged file named `<stem>-<random><.ext>` directly inside `root`.
    /// `sanitized_name` must already have passed `sanitize_filename`.
    pub async fn create(root: &Path, sanitized_name: &str) -> io::Result<Self> {
        let (stem, ext) = staging_name_parts(sanitized_name);
        let root = root.to_path_buf();

        let file = tokio::task::spawn_blocking(move || {
            let prefix = format!("{}-", stem);
            tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(&ext)
                .rand_bytes(RANDOM_SUFFIX_LEN)
                .tempfile_in(&root)
        })
        .await
        .map_err(io::Error::other)??;

        Ok(Self {
            file,
            byte_count: 0,
            sha256: String::new(),
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    /// Hex SHA-256 of the staged bytes, empty until `write_from` succeeds
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Streams `reader` into the staged file while counting and hashing.
    ///
    /// Stops with `PayloadTooLarge` as soon as the running count passes `max_bytes`;
    /// the bytes over the limit are never written.
    pub async fn write_from<R>(&mut self, mut reader: R, max_bytes: Option<u64>) -> Result<u64, IngestError>
    where
        R: AsyncRead + Unpin,
    {
        let mut out = tokio::fs::File::from_std(self.file.as_file().try_clone()?);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
        let mut total: u64 = 0;

        loop {
            let n = reader.read(&mut buffer).await?;
            if n == 0 {
                break;
            }

            total += n as u64;
            if let Some(limit) = max_bytes
                && total > limit
            {
                return Err(IngestError::PayloadTooLarge { limit });
            }

            hasher.update(&buffer[..n]);
            out.write_all(&buffer[..n]).await?;
        }

        out.flush().await?;
        out.sync_data().await?;

        self.byte_count = total;
        self.sha256 = hex::encode(hasher.finalize());
        Ok(total)
    }

    /// Deletes the staged file now, reporting any failure instead of deferring to drop
    pub async fn remove(self) -> io::Result<()> {
        let file = self.file;
        tokio::task::spawn_blocking(move || file.close())
            .await
            .map_err(io::Error::other)?
    }

    /// Keeps the staged file on disk past the end of the call and returns its path
    pub fn retain(self) -> io::Result<PathBuf> {
        self.file
            .keep()
            .map(|(_, path)| path)
            .map_err(|e| e.error)
    }
}
