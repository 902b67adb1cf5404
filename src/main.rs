use clap::{Parser, ValueEnum};
use dotenvy::dotenv;
use file_share_backend::api::middleware::request_id::{REQUEST_ID_HEADER, request_id_middleware};
use file_share_backend::config::AppConfig;
use file_share_backend::infrastructure::{database, storage};
use file_share_backend::services::sweeper::ExpirySweeper;
use file_share_backend::{AppState, create_app};
use std::net::SocketAddr;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// HTTP API only
    Api,
    /// Expiry sweeper only
    Worker,
    /// API and sweeper in one process
    All,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Services to run
    #[arg(short, long, value_enum, default_value_t = Mode::All)]
    mode: Mode,

    /// Port for the API server
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Refuse to start without an explicit JWT_SECRET
    #[arg(long)]
    production: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment & logging
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "file_share_backend=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting File Share Backend [Mode: {:?}]...", args.mode);

    let config = if args.production {
        AppConfig::production()?
    } else {
        AppConfig::from_env()
    };
    // 2. Shared infrastructure
    let db = database::setup_database(&config.database_url).await?;
    let storage_service = storage::setup_storage(&config.files_dir).await?;

    info!(
        "🛡️  Config: Max Size={}MB, Default Expiry={}min, Base URL={}",
        config.max_file_size / 1024 / 1024,
        config.default_share_expiry_minutes,
        config.base_url
    );

    // 3. Shutdown channel shared by every task
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // 4. Expiry sweeper
    let sweeper_handle = if matches!(args.mode, Mode::Worker | Mode::All) {
        let sweeper = ExpirySweeper::new(db.clone(), storage_service.clone(), shutdown_rx.clone());
        info!("👷 Expiry sweeper initialized.");
        Some(tokio::spawn(sweeper.run()))
    } else {
        None
    };

    // 5. API server
    if matches!(args.mode, Mode::Api | Mode::All) {
        let state = AppState {
            db: db.clone(),
            storage: storage_service.clone(),
            config: config.clone(),
        };

        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
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

        // request ids are assigned before the trace span is opened
        let app = create_app(state)
            .layer(trace_layer)
            .layer(axum::middleware::from_fn(request_id_middleware));

        let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;

        info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
        info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

        let server_shutdown = shutdown_tx.clone();
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = server_shutdown.send(true);
            })
            .await
        {
            error!("❌ Server runtime error: {}", e);
        }
    } else {
        shutdown_signal().await;
    }

    // 6. Stop the sweeper and wait for it to leave its loop
    info!("🛑 Shutting down backend services...");
    let _ = shutdown_tx.send(true);

    if let Some(handle) = sweeper_handle {
        if let Err(e) = handle.await {
            error!("❌ Expiry sweeper task failed: {}", e);
        }
    }

    info!("👋 Backend exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
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
