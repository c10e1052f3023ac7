use crate::services::ingest::IngestError;
use serde::Serialize;
use std::path::Path;
use utoipa::ToSchema;

/// Longest staging name component we will build from a client filename
pub const MAX_FILENAME_BYTES: usize = 255;

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
pub struct ValidationPolicy {
    /// Normalised, sorted, de-duplicated allow-list
    pub allowed_media_types: Vec<String>,
    pub max_bytes: Option<u64>,
    pub prefix_relaxation: Option<String>,
}

impl ValidationPolicy {
    pub fn new<I, S>(allowed: I, max_bytes: Option<u64>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowed_media_types: Vec<String> = allowed
            .into_iter()
            .map(|m| normalize_media_type(m.as_ref()))
            .filter(|m| !m.is_empty())
            .collect();
        allowed_media_types.sort();
        allowed_media_types.dedup();

        Self {
            allowed_media_types,
            max_bytes,
            prefix_relaxation: None,
        }
    }

    pub fn with_prefix_relaxation(mut self, prefix: Option<String>) -> Self {
        self.prefix_relaxation = prefix
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty());
        self
    }

    pub fn allows(&self, normalized: &str) -> bool {
        if normalized.is_empty() {
            return false;
        }
        if self.allowed_media_types.iter().any(|m| m == normalized) {
            return true;
        }
        self.prefix_relaxation
            .as_deref()
            .is_some_and(|prefix| normalized.starts_with(prefix))
    }
}

/// Strips parameters, lower-cases and folds common client aliases onto one name
pub fn normalize_media_type(content_type: &str) -> String {
    let normalized = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase();

    match normalized.as_str() {
        "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => "audio/wav".to_string(),
        "audio/mp3" | "audio/mpeg3" | "audio/x-mpeg-3" => "audio/mpeg".to_string(),
        "audio/x-aac" => "audio/aac".to_string(),
        _ => normalized,
    }
}

/// Validates the declared media type against the policy and returns its normalised form
pub fn validate_media_type(content_type: &str, policy: &ValidationPolicy) -> Result<String, IngestError> {
    let normalized = normalize_media_type(content_type);

    if policy.allows(&normalized) {
        return Ok(normalized);
    }

    Err(IngestError::UnsupportedMediaType {
        media_type: content_type.to_string(),
        allowed: policy.allowed_media_types.clone(),
    })
}

/// Sanitizes an untrusted filename so it can only ever name a file directly inside
/// the staging root. Directory components are dropped, reserved characters replaced.
pub fn sanitize_filename(filename: &str) -> Result<String, IngestError> {
    // Treat both separators as separators regardless of host platform
    let component = filename.rsplit(['/', '\\']).next().unwrap_or("");
    if component.len() != filename.len() {
        tracing::warn!("Path components stripped from upload filename: {:?}", filename);
    }

    let last = component.trim();
    if last.is_empty() || last == "." || last == ".." {
        return Err(IngestError::InvalidFilename(format!(
            "'{}' does not name a file",
            filename
        )));
    }

    let sanitized: String = last
        .chars()
        .map(|c| {
            if c.is_control()
                || c == ':'
                || c == '*'
                || c == '?'
                || c == '"'
                || c == '<'
                || c == '>'
                || c == '|'
                || c == ';'
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = if sanitized.len() > MAX_FILENAME_BYTES {
        let mut end = MAX_FILENAME_BYTES;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    // A name made only of dots would still resolve outside a plain file
    if sanitized.chars().all(|c| c == '.') {
        return Err(IngestError::InvalidFilename(format!(
            "'{}' does not name a file",
            filename
        )));
    }

    Ok(sanitized)
}

/// Splits a sanitised name into the stem and extension used for the staging name.
/// The extension keeps its leading dot and is empty when there is none.
pub fn staging_name_parts(sanitized: &str) -> (String, String) {
    let path = Path::new(sanitized);
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("upload");
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    // Keep generated names comfortably under common filesystem limits
    let stem: String = stem.chars().take(64).collect();
    let ext: String = ext.chars().take(16).collect();
    (stem, ext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_policy() -> ValidationPolicy {
        ValidationPolicy::new(["audio/wav", "audio/mpeg", "AUDIO/OGG"], Some(1024))
    }

    #[test]
    fn test_policy_normalises_allow_list() {
        let policy = ValidationPolicy::new(["audio/wav", "Audio/WAV", "audio/x-wav"], None);
        assert_eq!(policy.allowed_media_types, vec!["audio/wav".to_string()]);
    }

    #[test]
    fn test_validate_media_type() {
        let policy = get_test_policy();
        assert_eq!(validate_media_type("audio/wav", &policy).unwrap(), "audio/wav");
        assert_eq!(validate_media_type("audio/ogg", &policy).unwrap(), "audio/ogg");
        assert_eq!(
            validate_media_type("audio/wav; codecs=1", &policy).unwrap(),
            "audio/wav"
        );
        assert_eq!(validate_media_type("audio/mp3", &policy).unwrap(), "audio/mpeg");

        assert!(matches!(
            validate_media_type("text/plain", &policy),
            Err(IngestError::UnsupportedMediaType { .. })
        ));
        assert!(validate_media_type("", &policy).is_err());
        // Exact match only: a shared prefix is not enough
        assert!(validate_media_type("audio/flac", &policy).is_err());
        assert!(validate_media_type("audio/wavx", &policy).is_err());
    }

    #[test]
    fn test_prefix_relaxation() {
        let policy = get_test_policy().with_prefix_relaxation(Some("audio/".to_string()));
        assert!(validate_media_type("audio/flac", &policy).is_ok());
        assert!(validate_media_type("video/webm", &policy).is_err());

        let policy = get_test_policy().with_prefix_relaxation(Some("  ".to_string()));
        assert!(policy.prefix_relaxation.is_none());
        assert!(validate_media_type("audio/flac", &policy).is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("bark.wav").unwrap(), "bark.wav");
        assert_eq!(sanitize_filename("my bark.wav").unwrap(), "my bark.wav");
        assert_eq!(
            sanitize_filename("bark<script>.wav").unwrap(),
            "bark_script_.wav"
        );
        assert_eq!(sanitize_filename("吠える.ogg").unwrap(), "吠える.ogg");
        assert_eq!(sanitize_filename(".hidden.wav").unwrap(), ".hidden.wav");

        // Path traversal
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(
            sanitize_filename("..\\..\\windows\\system32").unwrap(),
            "system32"
        );
        assert_eq!(sanitize_filename("/abs/path/meow.mp3").unwrap(), "meow.mp3");

        // Nothing left to name
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("   ").is_err());
        assert!(sanitize_filename(".").is_err());
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("../").is_err());
        assert!(sanitize_filename("dir/..").is_err());
        assert!(sanitize_filename("...").is_err());
    }

    #[test]
    fn test_sanitize_filename_truncates_on_char_boundary() {
        let long = "é".repeat(200);
        let sanitized = sanitize_filename(&long).unwrap();
        assert!(sanitized.len() <= MAX_FILENAME_BYTES);
        assert!(sanitized.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_staging_name_parts() {
        assert_eq!(
            staging_name_parts("bark.wav"),
            ("bark".to_string(), ".wav".to_string())
        );
        assert_eq!(
            staging_name_parts("noext"),
            ("noext".to_string(), String::new())
        );
        assert_eq!(
            staging_name_parts(".hidden"),
            (".hidden".to_string(), String::new())
        );
    }
}
