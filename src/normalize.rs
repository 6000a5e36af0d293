// Mapping of raw chess.com games into the cached shape

use crate::chesscom::{RemoteGame, RemotePlayer};
use crate::models::{GameResult, NewGame};
use crate::pgn::count_moves;
use chrono::{NaiveDate, TimeZone, Utc};

/// chess.com result codes that end a game without a winner
const DRAW_RESULTS: [&str; 7] = [
    "agreed",
    "repetition",
    "stalemate",
    "insufficient",
    "50move",
    "timevsinsufficient",
    "draw",
];

/// Classify a chess.com result code for the side that received it.
///
/// Every code that is neither a win nor a draw (`checkmated`, `resigned`,
/// `timeout`, `abandoned`, ...) is a loss.
pub fn classify_result(code: &str) -> GameResult {
    if code == "win" {
        GameResult::Win
    } else if DRAW_RESULTS.contains(&code) {
        GameResult::Draw
    } else {
        GameResult::Loss
    }
}

pub fn player_label(player: &RemotePlayer) -> String {
    format!("{} ({})", player.username, player.rating)
}

pub fn time_control_label(time_class: Option<&str>) -> String {
    let mut chars = time_class.unwrap_or_default().chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => "Unknown".to_string(),
    }
}

/// UTC calendar date of a unix timestamp
pub fn game_date(end_time: i64) -> NaiveDate {
    Utc.timestamp_opt(end_time, 0)
        .single()
        .unwrap_or_else(Utc::now)
        .date_naive()
}

/// Whether the viewer (lowercased chess.com username) played white
pub fn is_viewer_white(game: &RemoteGame, viewer: &str) -> bool {
    game.white.username.to_lowercase() == viewer
}

/// The side the viewer did not play
pub fn opponent<'a>(game: &'a RemoteGame, viewer: &str) -> &'a RemotePlayer {
    if is_viewer_white(game, viewer) {
        &game.black
    } else {
        &game.white
    }
}

/// Normalize one archive game for the given viewer.
pub fn normalize(game: &RemoteGame, viewer: &str) -> NewGame {
    let account_is_white = is_viewer_white(game, viewer);
    let own = if account_is_white { &game.white } else { &game.black };

    NewGame {
        pgn: game.pgn.clone(),
        game_date: game_date(game.end_time),
        white_label: player_label(&game.white),
        black_label: player_label(&game.black),
        time_control: time_control_label(game.time_class.as_deref()),
        result_label: classify_result(&own.result),
        move_count: count_moves(&game.pgn),
        account_is_white,
    }
}
