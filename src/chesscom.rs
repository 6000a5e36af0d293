// chess.com public API client

use crate::error::SourceError;
use async_trait::async_trait;
use reqwest::{Client as HttpClient, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ArchiveList {
    #[serde(default)]
    archives: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ArchiveGames {
    #[serde(default)]
    games: Vec<RemoteGame>,
}

/// One game as listed in a monthly archive
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteGame {
    #[serde(default)]
    pub pgn: String,
    #[serde(default)]
    pub end_time: i64,
    #[serde(default)]
    pub time_class: Option<String>,
    pub white: RemotePlayer,
    pub black: RemotePlayer,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemotePlayer {
    pub username: String,
    #[serde(default)]
    pub rating: i64,
    #[serde(default)]
    pub result: String,
}

/// `/pub/player/{user}`
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteProfile {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub followers: i64,
    /// URL whose last path segment is the ISO country code
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub joined: Option<i64>,
}

impl RemoteProfile {
    pub fn country_code(&self) -> Option<String> {
        self.country
            .as_deref()
            .and_then(|url| url.trim_end_matches('/').rsplit('/').next())
            .filter(|code| code.len() == 2)
            .map(|code| code.to_uppercase())
    }
}

/// `/pub/player/{user}/stats`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteStats {
    pub chess_bullet: Option<TimeClassStats>,
    pub chess_blitz: Option<TimeClassStats>,
    pub chess_rapid: Option<TimeClassStats>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeClassStats {
    #[serde(default)]
    pub last: Option<RatingPoint>,
    #[serde(default)]
    pub record: Record,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RatingPoint {
    #[serde(default)]
    pub rating: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub win: i64,
    #[serde(default)]
    pub loss: i64,
    #[serde(default)]
    pub draw: i64,
}

/// Remote source of games, ratings and profiles
#[async_trait]
pub trait GameSource: Send + Sync {
    /// Monthly archive URLs, oldest first
    async fn archives(&self, username: &str) -> Result<Vec<String>, SourceError>;

    /// Games of one archive, in the order the API lists them
    async fn archive_games(&self, archive_url: &str) -> Result<Vec<RemoteGame>, SourceError>;

    async fn profile(&self, username: &str) -> Result<RemoteProfile, SourceError>;

    async fn stats(&self, username: &str) -> Result<RemoteStats, SourceError>;
}

pub struct ChessComClient {
    http_client: HttpClient,
    base_url: String,
}

impl ChessComClient {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self, SourceError> {
        let http_client = HttpClient::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn player_url(&self, username: &str) -> String {
        format!("{}/pub/player/{}", self.base_url, username.to_lowercase())
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        debug!("GET {}", url);
        let resp = self.http_client.get(url).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        Ok(resp.json().await?)
    }
}

#[async_trait]
impl GameSource for ChessComClient {
    async fn archives(&self, username: &str) -> Result<Vec<String>, SourceError> {
        let url = format!("{}/games/archives", self.player_url(username));
        let list: ArchiveList = self.get_json(&url).await?;
        Ok(list.archives)
    }

    async fn archive_games(&self, archive_url: &str) -> Result<Vec<RemoteGame>, SourceError> {
        let page: ArchiveGames = self.get_json(archive_url).await?;
        Ok(page.games)
    }

    async fn profile(&self, username: &str) -> Result<RemoteProfile, SourceError> {
        let url = self.player_url(username);
        match self.get_json(&url).await {
            Err(SourceError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(SourceError::PlayerNotFound(username.to_string()))
            }
            other => other,
        }
    }

    async fn stats(&self, username: &str) -> Result<RemoteStats, SourceError> {
        let url = format!("{}/stats", self.player_url(username));
        self.get_json(&url).await
    }
}
