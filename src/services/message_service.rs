use crate::api::error::AppError;
use crate::entities::{messages, prelude::*};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, QueryOrder, Set};

/// Insert/list access to stored text messages
pub struct MessageService {
    db: DatabaseConnection,
}

impl MessageService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Stores a message and returns its generated identifier as a string
    pub async fn create(&self, text: String) -> Result<String, AppError> {
        let message = messages::ActiveModel {
            text: Set(text),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        let saved = message.insert(&self.db).await?;
        tracing::info!("Stored message {}", saved.id);
        Ok(saved.id.to_string())
    }

    /// All stored messages, oldest first
    pub async fn list(&self) -> Result<Vec<messages::Model>, AppError> {
        let records = Messages::find()
            .order_by_asc(messages::Column::Id)
            .all(&self.db)
            .await?;
        Ok(records)
    }
}
