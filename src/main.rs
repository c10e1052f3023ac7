use barkback::config::IngestConfig;
use barkback::infrastructure::{database, staging, translator};
use barkback::services::ingest::UploadIngestor;
use barkback::services::message_service::MessageService;
use barkback::services::worker::StagingSweeper;
use barkback::{AppState, create_app};
use clap::Parser;
use dotenvy::dotenv;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Service type to run (api, worker, all)
    #[arg(short, long, default_value = "all")]
    mode: String,

    /// Port for the API server
    #[arg(short, long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "barkback=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting BarkBack backend [Mode: {}]...", args.mode);

    // 2. Shared infrastructure
    let ingest_config = IngestConfig::from_env();
    info!(
        "🛡️  Ingest Config: Max Size={}, Allowed={}, Prefix={:?}, Translator={}",
        ingest_config
            .max_file_size
            .map(|b| format!("{}MB", b / 1024 / 1024))
            .unwrap_or_else(|| "unlimited".to_string()),
        ingest_config.allowed_media_types.join(","),
        ingest_config.media_type_prefix,
        ingest_config.translator_type
    );
    if ingest_config.expose_staged_path {
        tracing::warn!("⚠️  EXPOSE_STAGED_PATH is on: responses include server-side paths");
    }

    let staging_root = staging::setup_staging_root(&ingest_config).await?;

    // 3. Graceful shutdown channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut handles = Vec::new();

    // 4. Staging sweeper
    if args.mode == "worker" || args.mode == "all" {
        let sweeper = StagingSweeper::new(
            staging_root.clone(),
            Duration::from_secs(ingest_config.staging_cleanup_age_hours.saturating_mul(3600)),
            shutdown_rx.clone(),
        );
        handles.push(tokio::spawn(sweeper.run()));
        info!("👷 Staging sweeper initialized.");
    }

    // 5. API
    if args.mode == "api" || args.mode == "all" {
        let db = database::setup_database().await?;
        let translator_service = translator::setup_translator(&ingest_config).await;

        let ingestor = Arc::new(UploadIngestor::new(
            staging_root.clone(),
            ingest_config.validation_policy(),
            ingest_config.retention,
            translator_service,
        ));

        let state = AppState {
            db: db.clone(),
            ingestor,
            message_service: Arc::new(MessageService::new(db)),
            config: ingest_config.clone(),
        };

        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            );

        let app = create_app(state).layer(trace_layer);
        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
        info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

        let mut server_shutdown = shutdown_rx.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = server_shutdown.changed().await;
                })
                .await
            {
                error!("❌ Server runtime error: {}", e);
            }
        }));
    }

    // 6. Wait for a signal, then tell every task to stop
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    info!("🛑 Shutting down backend services...");
    for handle in handles {
        let _ = handle.await;
    }

    info!("👋 Backend exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
