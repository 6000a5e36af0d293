// chess.com game cache server

use anyhow::Result;
use chess_cache::chesscom::{ChessComClient, GameSource};
use chess_cache::config::Config;
use chess_cache::database::Database;
use chess_cache::ratings::RatingSync;
use chess_cache::sync::SyncEngine;
use chess_cache::AppState;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chess_cache=info".parse()?)
                .add_directive("sqlx=warn".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!("Starting chess.com game cache");

    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Database: {}", config.database_url);
    info!("  chess.com API: {}", config.chesscom_api_url);
    info!("  HTTP timeout: {:?}", config.http_timeout);
    info!("  Page size: {}", config.page_size);
    info!("  Server Port: {}", config.port);

    let db = Database::init(&config.database_url).await?;

    let source: Arc<dyn GameSource> = Arc::new(ChessComClient::new(
        &config.chesscom_api_url,
        config.http_timeout,
        &config.user_agent,
    )?);

    let state = Arc::new(AppState {
        db: db.clone(),
        engine: SyncEngine::new(db.clone(), source.clone()).with_page_size(config.page_size),
        ratings: RatingSync::new(db, source),
    });

    let app = chess_cache::router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))
}
