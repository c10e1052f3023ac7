use crate::AppState;
use crate::api::error::AppError;
use crate::services::ingest::UploadRequest;
use crate::utils::validation::ValidationPolicy;
use axum::{
    Json,
    extract::{Multipart, State, multipart::MultipartError},
    http::StatusCode,
};
use futures::TryStreamExt;
use serde::Serialize;
use tokio_util::io::StreamReader;
use utoipa::ToSchema;

/// Multipart field carrying the audio; must match the client's FormData key
pub const UPLOAD_FIELD: &str = "uploaded_file";

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct TranslateAudioForm {
    #[schema(value_type = String, format = Binary)]
    pub uploaded_file: Vec<u8>,
}

#[derive(Serialize, ToSchema)]
pub struct TranslationResponse {
    pub message: String,
    pub filename: String,
    pub content_type: String,
    pub translation: String,
    /// Server-side staging path, only present when debug exposure is enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_path: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/translate-audio",
    request_body(content = TranslateAudioForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File uploaded and processed", body = TranslationResponse),
        (status = 400, description = "Invalid file type, name or size"),
        (status = 500, description = "Could not store or process the file")
    ),
    tag = "translation"
)]
pub async fn translate_audio(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<TranslationResponse>, AppError> {
    let result: Result<Json<TranslationResponse>, AppError> = async {
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            if field.name() != Some(UPLOAD_FIELD) {
                continue;
            }

            let filename = field.file_name().unwrap_or_default().to_string();
            let media_type = field.content_type().unwrap_or_default().to_string();
            let reader = StreamReader::new(field.map_err(std::io::Error::other));

            let translated = state
                .ingestor
                .ingest(UploadRequest {
                    filename,
                    media_type,
                    content: reader,
                })
                .await?;

            let saved_path = state
                .config
                .expose_staged_path
                .then(|| translated.staged_path.display().to_string());

            return Ok(Json(TranslationResponse {
                message: "File uploaded and processed successfully!".to_string(),
                filename: translated.source_filename,
                content_type: translated.media_type,
                translation: translated.result_text,
                saved_path,
            }));
        }

        Err(AppError::BadRequest(format!(
            "No file provided in field '{}'",
            UPLOAD_FIELD
        )))
    }
    .await;

    match result {
        Ok(res) => Ok(res),
        Err(e) => {
            // Drain what the client is still sending so it sees our response instead of a reset
            tracing::warn!("Upload failed early: {}. Consuming remaining stream...", e);
            while let Ok(Some(mut field)) = multipart.next_field().await {
                while let Ok(Some(_)) = field.chunk().await {}
            }
            Err(e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/validation-policy",
    responses(
        (status = 200, description = "Upload validation policy", body = ValidationPolicy)
    ),
    tag = "translation"
)]
pub async fn get_validation_policy(State(state): State<AppState>) -> Json<ValidationPolicy> {
    Json(state.ingestor.policy().clone())
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::BadRequest("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(e.body_text())
    }
}
