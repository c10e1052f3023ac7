use crate::services::ingest::RetentionPolicy;
use crate::utils::validation::ValidationPolicy;
use std::env;
use std::path::PathBuf;

/// Audio types accepted by the translation endpoint out of the box.
pub const DEFAULT_AUDIO_TYPES: &[&str] = &[
    "audio/mpeg",
    "audio/wav",
    "audio/ogg",
    "audio/aac",
    "audio/m4a",
    "audio/webm",
    "audio/amr",
    "audio/x-m4a",
];

/// Ingestion configuration for audio uploads
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Directory used for in-flight uploads (default: "<tmp>/animal_audio_uploads")
    pub staging_root: PathBuf,

    /// Maximum upload size in bytes, `None` for unlimited (default: 25 MB)
    pub max_file_size: Option<u64>,

    /// Exact-match allow-list of declared media types
    pub allowed_media_types: Vec<String>,

    /// Optional relaxation: also accept any media type starting with this prefix
    pub media_type_prefix: Option<String>,

    /// What happens to staged files once a call finishes (default: never retained)
    pub retention: RetentionPolicy,

    /// Include the server-side staging path in responses. Debug only.
    pub expose_staged_path: bool,

    /// Translator type: "placeholder" or "command" (default: "placeholder")
    pub translator_type: String,

    /// Program (and leading args, whitespace separated) for the command translator
    pub translator_command: Option<String>,

    /// Upper bound for one translator invocation in seconds (default: 60)
    pub translator_timeout_secs: u64,

    /// Stale staging file age in hours before the sweeper removes it (default: 24)
    pub staging_cleanup_age_hours: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            staging_root: env::temp_dir().join("animal_audio_uploads"),
            max_file_size: Some(25 * 1024 * 1024), // 25 MB
            allowed_media_types: DEFAULT_AUDIO_TYPES.iter().map(|s| s.to_string()).collect(),
            media_type_prefix: None,
            retention: RetentionPolicy::Never,
            expose_staged_path: false,
            translator_type: "placeholder".to_string(),
            translator_command: None,
            translator_timeout_secs: 60,
            staging_cleanup_age_hours: 24,
        }
    }
}

impl IngestConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            staging_root: env::var("STAGING_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.staging_root),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|v| if v == 0 { None } else { Some(v) })
                .unwrap_or(default.max_file_size),

            allowed_media_types: env::var("ALLOWED_MEDIA_TYPES")
                .ok()
                .map(|v| parse_list(&v))
                .filter(|list| !list.is_empty())
                .unwrap_or(default.allowed_media_types),

            media_type_prefix: env::var("MEDIA_TYPE_PREFIX")
                .ok()
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty()),

            retention: env::var("STAGING_RETENTION")
                .ok()
                .and_then(|v| RetentionPolicy::parse(&v))
                .unwrap_or(default.retention),

            expose_staged_path: env::var("EXPOSE_STAGED_PATH")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.expose_staged_path),

            translator_type: env::var("TRANSLATOR_TYPE").unwrap_or(default.translator_type),

            translator_command: env::var("TRANSLATOR_COMMAND")
                .ok()
                .filter(|v| !v.trim().is_empty()),

            translator_timeout_secs: env::var("TRANSLATOR_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.translator_timeout_secs),

            staging_cleanup_age_hours: parse_cleanup_age_hours(
                env::var("STAGING_CLEANUP_AGE_HOURS").ok().as_deref(),
                default.staging_cleanup_age_hours,
            ),
        }
    }

    /// Create config for development (retains failed uploads, exposes staged paths)
    pub fn development() -> Self {
        Self {
            retention: RetentionPolicy::OnFailure,
            expose_staged_path: true,
            ..Self::default()
        }
    }

    /// Create config for production (strict allow-list, nothing retained)
    pub fn production() -> Self {
        let default = Self::default();
        Self {
            staging_root: env::var("STAGING_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.staging_root),
            media_type_prefix: None,
            retention: RetentionPolicy::Never,
            expose_staged_path: false,
            translator_type: env::var("TRANSLATOR_TYPE").unwrap_or(default.translator_type),
            translator_command: env::var("TRANSLATOR_COMMAND").ok(),
            ..default
        }
    }

    /// Validation policy handed to the ingestor
    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy::new(self.allowed_media_types.iter().cloned(), self.max_file_size)
            .with_prefix_relaxation(self.media_type_prefix.clone())
    }

    /// Request body limit for the upload route, leaving room for multipart framing
    pub fn body_limit(&self) -> Option<usize> {
        self.max_file_size
            .map(|max| usize::try_from(max).unwrap_or(usize::MAX).saturating_add(1024 * 1024))
    }
}

/// Staged files of in-flight uploads must never look stale to the sweeper
pub const MIN_STAGING_CLEANUP_AGE_HOURS: u64 = 1;

fn parse_cleanup_age_hours(value: Option<&str>, default: u64) -> u64 {
    let hours = value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default);

    if hours < MIN_STAGING_CLEANUP_AGE_HOURS {
        tracing::warn!(
            "STAGING_CLEANUP_AGE_HOURS={} would sweep in-flight uploads, using {}",
            hours,
            MIN_STAGING_CLEANUP_AGE_HOURS
        );
        return MIN_STAGING_CLEANUP_AGE_HOURS;
    }
    hours
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
