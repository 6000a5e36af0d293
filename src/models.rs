// Data models for the chess.com game cache

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default number of games per dashboard page
pub const DEFAULT_LIMIT: i64 = 5;

/// Upper bound for a single load-more request
pub const MAX_LIMIT: i64 = 50;

/// App account with its linked chess.com username
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub username: String,
    pub chesscom_username: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Lowercased chess.com username, used to decide which side the account played
    pub fn viewer(&self) -> String {
        self.chesscom_username.to_lowercase()
    }
}

/// Outcome of a game from the owning account's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    Win,
    Draw,
    Loss,
}

impl GameResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameResult::Win => "Win",
            GameResult::Draw => "Draw",
            GameResult::Loss => "Loss",
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Win" => Ok(GameResult::Win),
            "Draw" => Ok(GameResult::Draw),
            "Loss" => Ok(GameResult::Loss),
            other => Err(format!("unknown result label: {}", other)),
        }
    }
}

/// Normalized game ready to be cached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGame {
    pub pgn: String,
    pub game_date: NaiveDate,
    pub white_label: String,
    pub black_label: String,
    pub time_control: String,
    pub result_label: GameResult,
    pub move_count: i64,
    pub account_is_white: bool,
}

/// Game row stored in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredGame {
    pub id: i64,
    pub account_id: i64,
    pub pgn: String,
    pub game_date: NaiveDate,
    pub white_label: String,
    pub black_label: String,
    pub time_control: String,
    pub result_label: GameResult,
    pub move_count: i64,
    pub account_is_white: bool,
    pub cached_at: DateTime<Utc>,
}

/// One row of a page as seen by the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameEntry {
    pub id: i64,
    pub white_label: String,
    pub black_label: String,
    pub time_control: String,
    pub result_label: GameResult,
    pub move_count: i64,
    pub date: String,
    pub is_account_white: bool,
}

impl From<&StoredGame> for GameEntry {
    fn from(game: &StoredGame) -> Self {
        GameEntry {
            id: game.id,
            white_label: game.white_label.clone(),
            black_label: game.black_label.clone(),
            time_control: game.time_control.clone(),
            result_label: game.result_label,
            move_count: game.move_count,
            date: game.game_date.format("%b %d, %Y").to_string(),
            is_account_white: game.account_is_white,
        }
    }
}

/// Full cached game, including the PGN handed to the analysis board
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameDetail {
    pub id: i64,
    pub pgn: String,
    pub white_label: String,
    pub black_label: String,
    pub time_control: String,
    pub result_label: GameResult,
    pub move_count: i64,
    pub date: String,
    pub is_account_white: bool,
}

impl From<StoredGame> for GameDetail {
    fn from(game: StoredGame) -> Self {
        let entry = GameEntry::from(&game);
        GameDetail {
            id: game.id,
            pgn: game.pgn,
            white_label: entry.white_label,
            black_label: entry.black_label,
            time_control: entry.time_control,
            result_label: entry.result_label,
            move_count: entry.move_count,
            date: entry.date,
            is_account_white: entry.is_account_white,
        }
    }
}

/// Where the rows of a page came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PageSource {
    Cache,
    Api,
    None,
}

/// Page of games with pagination metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GamePage {
    pub games: Vec<GameEntry>,
    pub source: PageSource,
    pub has_more: bool,
}

impl GamePage {
    pub fn empty() -> Self {
        GamePage {
            games: Vec::new(),
            source: PageSource::None,
            has_more: false,
        }
    }

    pub fn from_rows(rows: &[StoredGame], source: PageSource, has_more: bool) -> Self {
        GamePage {
            games: rows.iter().map(GameEntry::from).collect(),
            source,
            has_more,
        }
    }
}

/// Rated time classes tracked per account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeClass {
    Bullet,
    Blitz,
    Rapid,
}

impl TimeClass {
    pub const ALL: [TimeClass; 3] = [TimeClass::Bullet, TimeClass::Blitz, TimeClass::Rapid];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeClass::Bullet => "bullet",
            TimeClass::Blitz => "blitz",
            TimeClass::Rapid => "rapid",
        }
    }
}

impl FromStr for TimeClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bullet" => Ok(TimeClass::Bullet),
            "blitz" => Ok(TimeClass::Blitz),
            "rapid" => Ok(TimeClass::Rapid),
            other => Err(format!("unknown time class: {}", other)),
        }
    }
}

/// Rating snapshot for one time class
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatingSnapshot {
    pub time_class: TimeClass,
    pub rating: i64,
    pub rating_change: i64,
    pub total_games: i64,
    pub win_count: i64,
    pub loss_count: i64,
    pub draw_count: i64,
    pub last_updated: DateTime<Utc>,
}

/// chess.com profile details cached per account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct PlayerProfile {
    pub country_code: Option<String>,
    pub joined_at: Option<DateTime<Utc>>,
    pub followers: i64,
    pub last_updated: DateTime<Utc>,
}

/// Request to link a chess.com account
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub username: String,
    pub chesscom_username: String,
}

/// Request to change the linked chess.com username
#[derive(Debug, Deserialize)]
pub struct UpdateChesscomRequest {
    pub chesscom_username: String,
}

/// Query for load-more pagination
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub offset: i64,
    /// Defaults to the configured page size
    pub limit: Option<i64>,
}

/// Query for game search
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
}

/// Profile sync response
#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub account: Account,
    pub profile: Option<PlayerProfile>,
    pub ratings: Vec<RatingSnapshot>,
}
