// HTTP handlers for accounts and the game dashboard

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::database::Database;
use crate::error::{AppError, Result};
use crate::models::{
    Account, CreateAccountRequest, GameDetail, GamePage, PageQuery, ProfileResponse, SearchQuery,
    UpdateChesscomRequest, MAX_LIMIT,
};
use crate::AppState;

/// chess.com usernames are 3-25 characters of letters, digits, `_` and `-`
pub fn validate_chesscom_username(name: &str) -> Result<String> {
    let name = name.trim();
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !(3..=25).contains(&name.len()) || !valid_chars {
        return Err(AppError::BadRequest(format!(
            "invalid chess.com username: '{}'",
            name
        )));
    }
    Ok(name.to_string())
}

async fn load_account(state: &AppState, id: i64) -> Result<Account> {
    Database::get_account(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("account {}", id)))
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_health = Database::ping(&state.db).await;

    Json(serde_json::json!({
        "status": if db_health { "healthy" } else { "unhealthy" },
        "database": if db_health { "up" } else { "down" },
    }))
}

/// Link a chess.com account
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>)> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(AppError::BadRequest("username must not be empty".to_string()));
    }
    let chesscom_username = validate_chesscom_username(&req.chesscom_username)?;

    let account = Database::create_account(&state.db, username, &chesscom_username).await?;
    info!("Linked account {} to chess.com user {}", account.id, chesscom_username);

    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Account>> {
    Ok(Json(load_account(&state, id).await?))
}

/// Change the linked chess.com username, dropping the old user's cache
pub async fn update_chesscom_username(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateChesscomRequest>,
) -> Result<Json<Account>> {
    let account = load_account(&state, id).await?;
    let chesscom_username = validate_chesscom_username(&req.chesscom_username)?;

    let (account, invalidated) =
        Database::update_chesscom_username(&state.db, &account, &chesscom_username).await?;
    if invalidated {
        info!("Cache invalidated for account {}", account.id);
    }

    Ok(Json(account))
}

pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    if Database::delete_account(&state.db, id).await? {
        info!("Deleted account {}", id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("account {}", id)))
    }
}

/// Dashboard head page
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<GamePage>> {
    let account = load_account(&state, id).await?;
    Ok(Json(state.engine.head_page(&account).await?))
}

/// Load-more pagination
pub async fn load_more_games(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<PageQuery>,
) -> Result<Json<GamePage>> {
    let account = load_account(&state, id).await?;
    let limit = query
        .limit
        .unwrap_or_else(|| state.engine.page_size())
        .clamp(1, MAX_LIMIT);
    Ok(Json(state.engine.offset_page(&account, query.offset.max(0), limit).await?))
}

/// Single cached game with its PGN, for the analysis board
pub async fn get_game(
    State(state): State<Arc<AppState>>,
    Path((id, game_id)): Path<(i64, i64)>,
) -> Result<Json<GameDetail>> {
    let account = load_account(&state, id).await?;
    let game = Database::get_game(&state.db, account.id, game_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("game {}", game_id)))?;
    Ok(Json(GameDetail::from(game)))
}

pub async fn search_games(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<GamePage>> {
    let account = load_account(&state, id).await?;
    Ok(Json(state.engine.search(&account, &query.query).await?))
}

/// Profile and rating sync
pub async fn profile(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<ProfileResponse>> {
    let account = load_account(&state, id).await?;
    Ok(Json(state.ratings.sync_profile(&account).await?))
}
