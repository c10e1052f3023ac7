use crate::config::IngestConfig;
use crate::services::translator::Translator;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub async fn setup_translator(config: &IngestConfig) -> Arc<dyn Translator> {
    let translator = crate::services::translator::create_translator(
        &config.translator_type,
        config.translator_command.as_deref(),
        Duration::from_secs(config.translator_timeout_secs),
    );

    if translator.health_check().await {
        info!("🐾 Translator ready ({})", config.translator_type);
    } else {
        tracing::warn!(
            "⚠️  Translator '{}' is unavailable! Uploads will fail with a processing error.",
            config.translator_type
        );
    }

    translator.into()
}
