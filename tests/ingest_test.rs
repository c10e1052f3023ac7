use anyhow::anyhow;
use async_trait::async_trait;
use barkback::services::ingest::{IngestError, RetentionPolicy, UploadIngestor, UploadRequest};
use barkback::services::translator::Translator;
use barkback::utils::validation::ValidationPolicy;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::sync::Barrier;

/// Echoes the media type and the staged size it sees on disk
struct EchoTranslator {
    calls: AtomicUsize,
    seen: Mutex<Vec<(PathBuf, u64)>>,
}

impl EchoTranslator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Translator for EchoTranslator {
    async fn translate(&self, path: &Path, media_type: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let len = tokio::fs::metadata(path).await?.len();
        self.seen.lock().unwrap().push((path.to_path_buf(), len));
        Ok(format!("echo:{}:{}", media_type, len))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

struct FailingTranslator;

#[async_trait]
impl Translator for FailingTranslator {
    async fn translate(&self, _path: &Path, _media_type: &str) -> anyhow::Result<String> {
        Err(anyhow!("model crashed"))
    }

    async fn health_check(&self) -> bool {
        false
    }
}

/// Holds every caller at a barrier so their staged files coexist on disk
struct BarrierTranslator {
    barrier: Barrier,
    seen: Mutex<Vec<(PathBuf, u64)>>,
}

#[async_trait]
impl Translator for BarrierTranslator {
    async fn translate(&self, path: &Path, _media_type: &str) -> anyhow::Result<String> {
        let len = tokio::fs::metadata(path).await?.len();
        self.seen.lock().unwrap().push((path.to_path_buf(), len));
        self.barrier.wait().await;
        Ok(format!("{} bytes", len))
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Hands out `chunks` reads of data, then fails like a dropped connection
struct BrokenReader {
    chunks: usize,
}

impl AsyncRead for BrokenReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.chunks == 0 {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "client went away",
            )));
        }
        self.chunks -= 1;
        let n = buf.remaining().min(4096);
        buf.put_slice(&vec![9u8; n]);
        Poll::Ready(Ok(()))
    }
}

fn policy(max_bytes: Option<u64>) -> ValidationPolicy {
    ValidationPolicy::new(["audio/wav", "audio/mpeg"], max_bytes)
}

fn ingestor(
    root: &TempDir,
    max_bytes: Option<u64>,
    retention: RetentionPolicy,
    translator: Arc<dyn Translator>,
) -> UploadIngestor {
    UploadIngestor::new(
        root.path().to_path_buf(),
        policy(max_bytes),
        retention,
        translator,
    )
}

fn request<'a>(filename: &str, media_type: &str, content: &'a [u8]) -> UploadRequest<&'a [u8]> {
    UploadRequest {
        filename: filename.to_string(),
        media_type: media_type.to_string(),
        content,
    }
}

fn staged_files(root: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(root)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect()
}

#[tokio::test]
async fn test_successful_ingest_cleans_up() {
    let root = tempfile::tempdir().unwrap();
    let translator = Arc::new(EchoTranslator::new());
    let ingestor = ingestor(&root, None, RetentionPolicy::Never, translator.clone());

    let content = vec![42u8; 1024];
    let result = ingestor
        .ingest(request("bark.wav", "audio/wav", &content))
        .await
        .unwrap();

    assert_eq!(result.source_filename, "bark.wav");
    assert_eq!(result.media_type, "audio/wav");
    assert_eq!(result.result_text, "echo:audio/wav:1024");
    assert_eq!(result.byte_count, 1024);
    assert_eq!(result.sha256.len(), 64);
    assert!(!result.retained);
    assert!(!result.staged_path.exists());

    assert_eq!(translator.calls.load(Ordering::SeqCst), 1);
    assert!(staged_files(root.path()).is_empty());
}

#[tokio::test]
async fn test_unsupported_media_type_writes_nothing() {
    let root = tempfile::tempdir().unwrap();
    let translator = Arc::new(EchoTranslator::new());
    let ingestor = ingestor(&root, None, RetentionPolicy::Always, translator.clone());

    for media_type in ["text/plain", "", "audio/flac", "application/octet-stream"] {
        let err = ingestor
            .ingest(request("x.txt", media_type, b"hello"))
            .await
            .unwrap_err();
        assert!(
            matches!(err, IngestError::UnsupportedMediaType { .. }),
            "{} was not rejected as unsupported: {:?}",
            media_type,
            err
        );
    }

    assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    assert!(staged_files(root.path()).is_empty());
}

#[tokio::test]
async fn test_oversized_upload_leaves_no_partial_file() {
    let root = tempfile::tempdir().unwrap();
    let translator = Arc::new(EchoTranslator::new());
    // Retention never applies to partial files
    let ingestor = ingestor(&root, Some(1000), RetentionPolicy::Always, translator.clone());

    let content = vec![1u8; 200 * 1024];
    let err = ingestor
        .ingest(request("howl.wav", "audio/wav", &content))
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::PayloadTooLarge { limit: 1000 }));
    assert!(err.is_client_error());
    assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    assert!(staged_files(root.path()).is_empty());
}

#[tokio::test]
async fn test_upload_at_limit_is_accepted() {
    let root = tempfile::tempdir().unwrap();
    let ingestor = ingestor(
        &root,
        Some(1000),
        RetentionPolicy::Never,
        Arc::new(EchoTranslator::new()),
    );

    let content = vec![1u8; 1000];
    let result = ingestor
        .ingest(request("edge.wav", "audio/wav", &content))
        .await
        .unwrap();
    assert_eq!(result.byte_count, 1000);
}

#[tokio::test]
async fn test_reader_error_mid_stream_removes_partial_file() {
    let root = tempfile::tempdir().unwrap();
    let translator = Arc::new(EchoTranslator::new());
    let ingestor = ingestor(&root, None, RetentionPolicy::Always, translator.clone());

    let err = ingestor
        .ingest(UploadRequest {
            filename: "bark.wav".to_string(),
            media_type: "audio/wav".to_string(),
            content: BrokenReader { chunks: 3 },
        })
        .await
        .unwrap_err();

    match &err {
        IngestError::StagingIo(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionReset),
        other => panic!("expected StagingIo, got {:?}", other),
    }
    assert!(!err.is_client_error());
    assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    assert!(staged_files(root.path()).is_empty());
}

#[tokio::test]
async fn test_translator_failure_removes_file_by_default() {
    let root = tempfile::tempdir().unwrap();
    let ingestor = ingestor(&root, None, RetentionPolicy::Never, Arc::new(FailingTranslator));

    let err = ingestor
        .ingest(request("bark.wav", "audio/wav", b"RIFF"))
        .await
        .unwrap_err();

    match err {
        IngestError::ProcessingFailed(cause) => assert_eq!(cause.to_string(), "model crashed"),
        other => panic!("expected ProcessingFailed, got {:?}", other),
    }
    assert!(staged_files(root.path()).is_empty());
}

#[tokio::test]
async fn test_translator_failure_retains_file_when_configured() {
    let root = tempfile::tempdir().unwrap();
    let ingestor = ingestor(
        &root,
        None,
        RetentionPolicy::OnFailure,
        Arc::new(FailingTranslator),
    );

    let err = ingestor
        .ingest(request("bark.wav", "audio/wav", b"RIFF"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::ProcessingFailed(_)));

    let files = staged_files(root.path());
    assert_eq!(files.len(), 1);
    assert_eq!(std::fs::read(&files[0]).unwrap(), b"RIFF");
}

#[tokio::test]
async fn test_on_failure_retention_still_cleans_successes() {
    let root = tempfile::tempdir().unwrap();
    let ingestor = ingestor(
        &root,
        None,
        RetentionPolicy::OnFailure,
        Arc::new(EchoTranslator::new()),
    );

    ingestor
        .ingest(request("bark.wav", "audio/wav", b"RIFF"))
        .await
        .unwrap();
    assert!(staged_files(root.path()).is_empty());
}

#[tokio::test]
async fn test_always_retention_keeps_successful_upload() {
    let root = tempfile::tempdir().unwrap();
    let ingestor = ingestor(
        &root,
        None,
        RetentionPolicy::Always,
        Arc::new(EchoTranslator::new()),
    );

    let result = ingestor
        .ingest(request("bark.wav", "audio/wav", b"woof"))
        .await
        .unwrap();

    assert!(result.retained);
    assert_eq!(std::fs::read(&result.staged_path).unwrap(), b"woof");
    assert_eq!(staged_files(root.path()), vec![result.staged_path]);
}

#[tokio::test]
async fn test_path_traversal_stays_inside_staging_root() {
    let root = tempfile::tempdir().unwrap();
    let translator = Arc::new(EchoTranslator::new());
    let ingestor = ingestor(&root, None, RetentionPolicy::Never, translator.clone());

    for filename in ["../../etc/passwd", "..\\..\\boot.ini", "/tmp/../../evil.wav"] {
        let result = ingestor
            .ingest(request(filename, "audio/wav", b"data"))
            .await
            .unwrap();
        assert!(!result.source_filename.contains('/'));
        assert!(!result.source_filename.contains('\\'));
        assert_eq!(result.staged_path.parent().unwrap(), root.path());
    }

    for (path, _) in translator.seen.lock().unwrap().iter() {
        assert_eq!(path.parent().unwrap(), root.path());
    }
    assert!(staged_files(root.path()).is_empty());
}

#[tokio::test]
async fn test_unusable_filename_is_rejected() {
    let root = tempfile::tempdir().unwrap();
    let translator = Arc::new(EchoTranslator::new());
    let ingestor = ingestor(&root, None, RetentionPolicy::Never, translator.clone());

    for filename in ["", "..", ".", "../", "audio/.."] {
        let err = ingestor
            .ingest(request(filename, "audio/wav", b"data"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidFilename(_)), "{:?}", filename);
    }

    assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    assert!(staged_files(root.path()).is_empty());
}

#[tokio::test]
async fn test_concurrent_uploads_with_same_name_do_not_clobber() {
    let root = tempfile::tempdir().unwrap();
    let translator = Arc::new(BarrierTranslator {
        barrier: Barrier::new(2),
        seen: Mutex::new(Vec::new()),
    });
    let ingestor = ingestor(&root, None, RetentionPolicy::Never, translator.clone());

    let small = vec![1u8; 3000];
    let large = vec![2u8; 70_000];
    let (a, b) = tokio::join!(
        ingestor.ingest(request("bark.wav", "audio/wav", &small)),
        ingestor.ingest(request("bark.wav", "audio/wav", &large)),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.byte_count, 3000);
    assert_eq!(b.byte_count, 70_000);
    assert_eq!(a.result_text, "3000 bytes");
    assert_eq!(b.result_text, "70000 bytes");
    assert_ne!(a.staged_path, b.staged_path);
    assert_ne!(a.sha256, b.sha256);

    let seen = translator.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_ne!(seen[0].0, seen[1].0);
    drop(seen);

    assert!(staged_files(root.path()).is_empty());
}

#[tokio::test]
async fn test_cancelled_ingest_removes_partial_file() {
    let root = tempfile::tempdir().unwrap();
    let ingestor = Arc::new(ingestor(
        &root,
        None,
        RetentionPolicy::Always,
        Arc::new(EchoTranslator::new()),
    ));

    // The client side stays open, so the upload never finishes on its own
    let (mut client, server) = tokio::io::duplex(1024);
    client.write_all(b"partial audio").await.unwrap();

    let task = {
        let ingestor = ingestor.clone();
        tokio::spawn(async move {
            ingestor
                .ingest(UploadRequest {
                    filename: "bark.wav".to_string(),
                    media_type: "audio/wav".to_string(),
                    content: server,
                })
                .await
        })
    };

    // Wait until the staged file shows up
    let mut appeared = false;
    for _ in 0..200 {
        if !staged_files(root.path()).is_empty() {
            appeared = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(appeared, "staged file never appeared");

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert!(staged_files(root.path()).is_empty());
    drop(client);
}

#[tokio::test]
async fn test_missing_staging_root_is_staging_error() {
    let root = tempfile::tempdir().unwrap();
    let ingestor = UploadIngestor::new(
        root.path().join("does-not-exist"),
        policy(None),
        RetentionPolicy::Never,
        Arc::new(EchoTranslator::new()),
    );

    let err = ingestor
        .ingest(request("bark.wav", "audio/wav", b"data"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::StagingIo(_)));
    assert!(!err.is_client_error());
}
