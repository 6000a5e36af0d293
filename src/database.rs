// Database layer for the game cache

use crate::error::{AppError, Result};
use crate::models::{
    Account, GameResult, NewGame, PlayerProfile, RatingSnapshot, StoredGame, TimeClass,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::info;

pub type DbPool = Pool<Sqlite>;

const GAME_COLUMNS: &str = "id, account_id, pgn, game_date, white_label, black_label, \
     time_control, result_label, move_count, account_is_white, cached_at";

/// Default cache ordering, total so that offsets are stable
const GAME_ORDER: &str = "ORDER BY game_date DESC, cached_at DESC, id DESC";

pub struct Database;

impl Database {
    /// Initialize database connection pool
    pub async fn init(database_url: &str) -> Result<DbPool> {
        info!("Connecting to database: {}", database_url);

        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database is a separate database
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(pool)
    }

    pub async fn ping(pool: &DbPool) -> bool {
        sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
    }

    // ---- accounts ----

    pub async fn create_account(
        pool: &DbPool,
        username: &str,
        chesscom_username: &str,
    ) -> Result<Account> {
        let account = sqlx::query_as::<_, Account>(
            "INSERT INTO accounts (username, chesscom_username, created_at)
             VALUES ($1, $2, $3)
             RETURNING id, username, chesscom_username, created_at",
        )
        .bind(username)
        .bind(chesscom_username)
        .bind(Utc::now())
        .fetch_one(pool)
        .await
        .map_err(|e| unique_to_conflict(e, "username already linked"))?;

        Ok(account)
    }

    pub async fn get_account(pool: &DbPool, id: i64) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT id, username, chesscom_username, created_at FROM accounts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(account)
    }

    /// Relink the account to another chess.com user.
    ///
    /// Cached games, ratings and profile belong to the old user and are
    /// dropped in the same transaction. Returns the updated account and
    /// whether the cache was invalidated.
    pub async fn update_chesscom_username(
        pool: &DbPool,
        account: &Account,
        chesscom_username: &str,
    ) -> Result<(Account, bool)> {
        if account.chesscom_username.to_lowercase() == chesscom_username.to_lowercase() {
            return Ok((account.clone(), false));
        }

        let mut tx = pool.begin().await?;

        let updated = sqlx::query_as::<_, Account>(
            "UPDATE accounts SET chesscom_username = $1 WHERE id = $2
             RETURNING id, username, chesscom_username, created_at",
        )
        .bind(chesscom_username)
        .bind(account.id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| unique_to_conflict(e, "chess.com username already linked"))?;

        let removed = sqlx::query("DELETE FROM games WHERE account_id = $1")
            .bind(account.id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM player_ratings WHERE account_id = $1")
            .bind(account.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM player_profiles WHERE account_id = $1")
            .bind(account.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            "Account {} relinked to {}, dropped {} cached games",
            account.id, chesscom_username, removed
        );
        Ok((updated, true))
    }

    /// Delete an account; games, ratings and profile cascade.
    pub async fn delete_account(pool: &DbPool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // ---- games ----

    pub async fn count_games(pool: &DbPool, account_id: i64) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM games WHERE account_id = $1")
            .bind(account_id)
            .fetch_one(pool)
            .await?;

        Ok(count)
    }

    pub async fn game_exists(pool: &DbPool, account_id: i64, pgn: &str) -> Result<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM games WHERE account_id = $1 AND pgn = $2 LIMIT 1",
        )
        .bind(account_id)
        .bind(pgn)
        .fetch_optional(pool)
        .await?;

        Ok(found.is_some())
    }

    pub async fn find_game(pool: &DbPool, account_id: i64, pgn: &str) -> Result<Option<StoredGame>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM games WHERE account_id = $1 AND pgn = $2",
            GAME_COLUMNS
        ))
        .bind(account_id)
        .bind(pgn)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(game_from_row).transpose()?)
    }

    /// Cached game by id, only if it belongs to the account
    pub async fn get_game(pool: &DbPool, account_id: i64, game_id: i64) -> Result<Option<StoredGame>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM games WHERE id = $1 AND account_id = $2",
            GAME_COLUMNS
        ))
        .bind(game_id)
        .bind(account_id)
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(game_from_row).transpose()?)
    }

    /// Insert a game unless the account already has one with the same PGN.
    ///
    /// Returns `None` when the uniqueness constraint suppressed the insert,
    /// which happens when a concurrent request cached the game first.
    pub async fn insert_game(
        pool: &DbPool,
        account_id: i64,
        game: &NewGame,
    ) -> Result<Option<StoredGame>> {
        let row = sqlx::query(&format!(
            "INSERT INTO games (
                account_id, pgn, game_date, white_label, black_label,
                time_control, result_label, move_count, account_is_white, cached_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (account_id, pgn) DO NOTHING
            RETURNING {}",
            GAME_COLUMNS
        ))
        .bind(account_id)
        .bind(&game.pgn)
        .bind(game.game_date)
        .bind(&game.white_label)
        .bind(&game.black_label)
        .bind(&game.time_control)
        .bind(game.result_label.as_str())
        .bind(game.move_count)
        .bind(game.account_is_white)
        .bind(Utc::now())
        .fetch_optional(pool)
        .await?;

        Ok(row.as_ref().map(game_from_row).transpose()?)
    }

    /// Cached games in default order, `limit` rows starting at `offset`
    pub async fn games_page(
        pool: &DbPool,
        account_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StoredGame>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM games WHERE account_id = $1 {} LIMIT $2 OFFSET $3",
            GAME_COLUMNS, GAME_ORDER
        ))
        .bind(account_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(game_from_row).collect::<sqlx::Result<_>>()?)
    }

    pub async fn latest_game(pool: &DbPool, account_id: i64) -> Result<Option<StoredGame>> {
        Ok(Self::games_page(pool, account_id, 1, 0).await?.into_iter().next())
    }

    /// Case-insensitive substring search over player labels and ISO date
    pub async fn search_games(
        pool: &DbPool,
        account_id: i64,
        query: &str,
    ) -> Result<Vec<StoredGame>> {
        let pattern = format!("%{}%", escape_like(&query.to_lowercase()));

        let rows = sqlx::query(&format!(
            "SELECT {} FROM games
             WHERE account_id = $1
               AND (LOWER(white_label) LIKE $2 ESCAPE '\\'
                 OR LOWER(black_label) LIKE $2 ESCAPE '\\'
                 OR game_date LIKE $2 ESCAPE '\\')
             {}",
            GAME_COLUMNS, GAME_ORDER
        ))
        .bind(account_id)
        .bind(&pattern)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(game_from_row).collect::<sqlx::Result<_>>()?)
    }

    // ---- ratings & profile ----

    pub async fn get_ratings(pool: &DbPool, account_id: i64) -> Result<Vec<RatingSnapshot>> {
        let rows = sqlx::query(
            "SELECT time_class, rating, rating_change, total_games,
                    win_count, loss_count, draw_count, last_updated
             FROM player_ratings WHERE account_id = $1
             ORDER BY CASE time_class WHEN 'bullet' THEN 0 WHEN 'blitz' THEN 1 ELSE 2 END",
        )
        .bind(account_id)
        .fetch_all(pool)
        .await?;

        Ok(rows.iter().map(rating_from_row).collect::<sqlx::Result<_>>()?)
    }

    pub async fn upsert_rating(
        pool: &DbPool,
        account_id: i64,
        snapshot: &RatingSnapshot,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO player_ratings (
                account_id, time_class, rating, rating_change, total_games,
                win_count, loss_count, draw_count, last_updated
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (account_id, time_class) DO UPDATE SET
                rating = excluded.rating,
                rating_change = excluded.rating_change,
                total_games = excluded.total_games,
                win_count = excluded.win_count,
                loss_count = excluded.loss_count,
                draw_count = excluded.draw_count,
                last_updated = excluded.last_updated",
        )
        .bind(account_id)
        .bind(snapshot.time_class.as_str())
        .bind(snapshot.rating)
        .bind(snapshot.rating_change)
        .bind(snapshot.total_games)
        .bind(snapshot.win_count)
        .bind(snapshot.loss_count)
        .bind(snapshot.draw_count)
        .bind(snapshot.last_updated)
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn get_profile(pool: &DbPool, account_id: i64) -> Result<Option<PlayerProfile>> {
        let profile = sqlx::query_as::<_, PlayerProfile>(
            "SELECT country_code, joined_at, followers, last_updated
             FROM player_profiles WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(pool)
        .await?;

        Ok(profile)
    }

    pub async fn upsert_profile(
        pool: &DbPool,
        account_id: i64,
        profile: &PlayerProfile,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO player_profiles (account_id, country_code, joined_at, followers, last_updated)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (account_id) DO UPDATE SET
                country_code = excluded.country_code,
                joined_at = excluded.joined_at,
                followers = excluded.followers,
                last_updated = excluded.last_updated",
        )
        .bind(account_id)
        .bind(&profile.country_code)
        .bind(profile.joined_at)
        .bind(profile.followers)
        .bind(profile.last_updated)
        .execute(pool)
        .await?;

        Ok(())
    }
}

fn game_from_row(row: &SqliteRow) -> sqlx::Result<StoredGame> {
    let result_label: String = row.try_get("result_label")?;
    Ok(StoredGame {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        pgn: row.try_get("pgn")?,
        game_date: row.try_get("game_date")?,
        white_label: row.try_get("white_label")?,
        black_label: row.try_get("black_label")?,
        time_control: row.try_get("time_control")?,
        result_label: GameResult::from_str(&result_label).map_err(|e| sqlx::Error::Decode(e.into()))?,
        move_count: row.try_get("move_count")?,
        account_is_white: row.try_get("account_is_white")?,
        cached_at: row.try_get::<DateTime<Utc>, _>("cached_at")?,
    })
}

fn rating_from_row(row: &SqliteRow) -> sqlx::Result<RatingSnapshot> {
    let time_class: String = row.try_get("time_class")?;
    Ok(RatingSnapshot {
        time_class: TimeClass::from_str(&time_class).map_err(|e| sqlx::Error::Decode(e.into()))?,
        rating: row.try_get("rating")?,
        rating_change: row.try_get("rating_change")?,
        total_games: row.try_get("total_games")?,
        win_count: row.try_get("win_count")?,
        loss_count: row.try_get("loss_count")?,
        draw_count: row.try_get("draw_count")?,
        last_updated: row.try_get("last_updated")?,
    })
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn unique_to_conflict(e: sqlx::Error, message: &str) -> AppError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => AppError::Conflict(message.to_string()),
        _ => AppError::Database(e),
    }
}
