// Rating and profile synchronization

use crate::chesscom::{GameSource, RemoteStats, TimeClassStats};
use crate::database::{Database, DbPool};
use crate::error::Result;
use crate::models::{Account, PlayerProfile, ProfileResponse, RatingSnapshot, TimeClass};
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Rating delta between two snapshots.
///
/// A rating of 0 means "unknown", so any delta involving it is 0.
pub fn rating_change(prior: i64, current: i64) -> i64 {
    if prior != 0 && current != 0 {
        current - prior
    } else {
        0
    }
}

fn stats_for(stats: &RemoteStats, time_class: TimeClass) -> Option<&TimeClassStats> {
    match time_class {
        TimeClass::Bullet => stats.chess_bullet.as_ref(),
        TimeClass::Blitz => stats.chess_blitz.as_ref(),
        TimeClass::Rapid => stats.chess_rapid.as_ref(),
    }
}

#[derive(Clone)]
pub struct RatingSync {
    pool: DbPool,
    source: Arc<dyn GameSource>,
}

impl RatingSync {
    pub fn new(pool: DbPool, source: Arc<dyn GameSource>) -> Self {
        Self { pool, source }
    }

    /// Refresh rating snapshots, writing only the time classes whose rating
    /// moved. Returns the stored snapshots.
    pub async fn sync_ratings(&self, account: &Account) -> Result<Vec<RatingSnapshot>> {
        let stored = Database::get_ratings(&self.pool, account.id).await?;

        let stats = match self.source.stats(&account.chesscom_username).await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Failed to fetch stats for {}: {}", account.chesscom_username, e);
                return Ok(stored);
            }
        };

        let previous: HashMap<TimeClass, i64> =
            stored.iter().map(|s| (s.time_class, s.rating)).collect();

        let mut updated = 0;
        for time_class in TimeClass::ALL {
            let Some(remote) = stats_for(&stats, time_class) else {
                continue;
            };
            let current = remote.last.as_ref().map(|p| p.rating).unwrap_or(0);
            let prior = previous.get(&time_class).copied();
            if prior == Some(current) {
                continue;
            }

            let record = &remote.record;
            let snapshot = RatingSnapshot {
                time_class,
                rating: current,
                rating_change: rating_change(prior.unwrap_or(0), current),
                total_games: record.win + record.loss + record.draw,
                win_count: record.win,
                loss_count: record.loss,
                draw_count: record.draw,
                last_updated: Utc::now(),
            };
            Database::upsert_rating(&self.pool, account.id, &snapshot).await?;
            updated += 1;
        }

        if updated > 0 {
            info!("Updated {} ratings for {}", updated, account.chesscom_username);
            Database::get_ratings(&self.pool, account.id).await
        } else {
            Ok(stored)
        }
    }

    /// Refresh the chess.com profile, then the ratings.
    pub async fn sync_profile(&self, account: &Account) -> Result<ProfileResponse> {
        match self.source.profile(&account.chesscom_username).await {
            Ok(remote) => {
                let profile = PlayerProfile {
                    country_code: remote.country_code(),
                    joined_at: remote.joined.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
                    followers: remote.followers,
                    last_updated: Utc::now(),
                };
                Database::upsert_profile(&self.pool, account.id, &profile).await?;
            }
            Err(e) => {
                warn!("Failed to fetch profile for {}: {}", account.chesscom_username, e);
            }
        }

        let ratings = self.sync_ratings(account).await?;
        let profile = Database::get_profile(&self.pool, account.id).await?;

        Ok(ProfileResponse {
            account: account.clone(),
            profile,
            ratings,
        })
    }
}
