// In-memory GameSource for engine tests

use crate::chesscom::{GameSource, RemoteGame, RemotePlayer, RemoteProfile, RemoteStats};
use crate::error::SourceError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn remote_game(pgn: &str, end_time: i64, white: &str, black: &str) -> RemoteGame {
    RemoteGame {
        pgn: pgn.to_string(),
        end_time,
        time_class: Some("blitz".to_string()),
        white: RemotePlayer {
            username: white.to_string(),
            rating: 1500,
            result: "win".to_string(),
        },
        black: RemotePlayer {
            username: black.to_string(),
            rating: 1480,
            result: "checkmated".to_string(),
        },
    }
}

#[derive(Default)]
pub struct FakeSource {
    archives: Mutex<Vec<Vec<RemoteGame>>>,
    profile: Mutex<Option<RemoteProfile>>,
    stats: Mutex<RemoteStats>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl FakeSource {
    /// Archives oldest first, games within each archive oldest first
    pub fn with_archives(archives: Vec<Vec<RemoteGame>>) -> Self {
        Self {
            archives: Mutex::new(archives),
            ..Default::default()
        }
    }

    pub fn push_game(&self, game: RemoteGame) {
        let mut archives = self.archives.lock().unwrap();
        match archives.last_mut() {
            Some(latest) => latest.push(game),
            None => archives.push(vec![game]),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_profile(&self, profile: RemoteProfile) {
        *self.profile.lock().unwrap() = Some(profile);
    }

    pub fn set_stats(&self, stats: RemoteStats) {
        *self.stats.lock().unwrap() = stats;
    }

    /// Number of remote requests served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn request(&self, url: &str) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Status {
                status: 503,
                url: url.to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl GameSource for FakeSource {
    async fn archives(&self, username: &str) -> Result<Vec<String>, SourceError> {
        self.request(username)?;
        let count = self.archives.lock().unwrap().len();
        Ok((0..count).map(|i| format!("fake://archive/{}", i)).collect())
    }

    async fn archive_games(&self, archive_url: &str) -> Result<Vec<RemoteGame>, SourceError> {
        self.request(archive_url)?;
        let index: usize = archive_url
            .rsplit('/')
            .next()
            .and_then(|i| i.parse().ok())
            .unwrap_or(usize::MAX);
        Ok(self
            .archives
            .lock()
            .unwrap()
            .get(index)
            .cloned()
            .unwrap_or_default())
    }

    async fn profile(&self, username: &str) -> Result<RemoteProfile, SourceError> {
        self.request(username)?;
        self.profile
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| SourceError::PlayerNotFound(username.to_string()))
    }

    async fn stats(&self, username: &str) -> Result<RemoteStats, SourceError> {
        self.request(username)?;
        Ok(self.stats.lock().unwrap().clone())
    }
}
