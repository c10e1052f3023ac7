use crate::AppState;
use crate::api::error::AppError;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Deserialize, ToSchema, Validate)]
pub struct CreateMessageRequest {
    #[validate(length(min = 1, message = "Message text must not be empty"))]
    pub text: String,
}

#[derive(Serialize, ToSchema)]
pub struct CreateMessageResponse {
    pub inserted_id: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[utoipa::path(
    post,
    path = "/api/messages",
    request_body = CreateMessageRequest,
    responses(
        (status = 200, description = "Message stored", body = CreateMessageResponse),
        (status = 400, description = "Invalid message")
    ),
    tag = "messages"
)]
pub async fn create_message(
    State(state): State<AppState>,
    payload: Result<Json<CreateMessageRequest>, JsonRejection>,
) -> Result<Json<CreateMessageResponse>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let inserted_id = state.message_service.create(req.text).await?;

    Ok(Json(CreateMessageResponse { inserted_id }))
}

#[utoipa::path(
    get,
    path = "/api/messages",
    responses(
        (status = 200, description = "All stored messages, oldest first", body = [MessageResponse])
    ),
    tag = "messages"
)]
pub async fn list_messages(
    State(state): State<AppState>,
) -> Result<Json<Vec<MessageResponse>>, AppError> {
    let messages = state
        .message_service
        .list()
        .await?
        .into_iter()
        .map(|m| MessageResponse {
            id: m.id.to_string(),
            text: m.text,
            created_at: m.created_at,
        })
        .collect();

    Ok(Json(messages))
}
