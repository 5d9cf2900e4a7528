use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use board_api::config::Config;
use board_api::db::loads::PgLoadStore;
use board_api::db::users::PgUserDirectory;
use board_api::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    // Connect to PostgreSQL.
    let db = board_api::db::pool::connect(&config.database_url).await;

    tracing::info!(
        handshake_timeout = ?config.handshake_timeout,
        outbound_buffer = config.outbound_buffer,
        "board-api configured"
    );

    let state = AppState::new(
        config,
        Arc::new(PgUserDirectory::new(db.clone())),
        Arc::new(PgLoadStore::new(db)),
    );
    let gateway = state.gateway.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(board_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "board-api listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::error!(?err, "failed to listen for shutdown signal");
            }
            tracing::info!(online = gateway.online_count(), "shutting down gateway");
            gateway.teardown();
        })
        .await
        .expect("server error");
}
