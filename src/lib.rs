// chess.com game cache service
//
// Links app accounts to chess.com users, caches their recent games and
// ratings in SQLite, and serves paginated and searchable pages of games.

pub mod chesscom;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod models;
pub mod normalize;
pub mod pgn;
pub mod ratings;
pub mod sync;

#[cfg(test)]
mod testutil;

use axum::{
    routing::{get, post, put},
    Router,
};
use database::DbPool;
use ratings::RatingSync;
use std::sync::Arc;
use sync::SyncEngine;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
pub struct AppState {
    pub db: DbPool,
    pub engine: SyncEngine,
    pub ratings: RatingSync,
}

/// Build the HTTP router
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/accounts", post(handlers::create_account))
        .route(
            "/api/accounts/:id",
            get(handlers::get_account).delete(handlers::delete_account),
        )
        .route(
            "/api/accounts/:id/chesscom",
            put(handlers::update_chesscom_username),
        )
        .route("/api/accounts/:id/dashboard", get(handlers::dashboard))
        .route("/api/accounts/:id/games", get(handlers::load_more_games))
        .route("/api/accounts/:id/games/:game_id", get(handlers::get_game))
        .route("/api/accounts/:id/search", get(handlers::search_games))
        .route("/api/accounts/:id/profile", get(handlers::profile))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
