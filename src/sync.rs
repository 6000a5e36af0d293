// Game cache synchronization and pagination
//
// Every read path (dashboard, load-more, search) goes through `SyncEngine`.
// Remote failures are logged and absorbed: callers always get whatever the
// cache holds. Only database errors propagate.

use crate::chesscom::{GameSource, RemoteGame};
use crate::database::{Database, DbPool};
use crate::error::{Result, SourceError};
use crate::models::{Account, GamePage, PageSource, StoredGame, DEFAULT_LIMIT};
use crate::normalize::{game_date, normalize, opponent};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Number of most recent archives scanned by a remote search
pub const SEARCH_ARCHIVES: usize = 6;

/// Maximum number of games returned by a remote search
pub const SEARCH_RESULTS: usize = 10;

#[derive(Clone)]
pub struct SyncEngine {
    pool: DbPool,
    source: Arc<dyn GameSource>,
    page_size: i64,
}

impl SyncEngine {
    pub fn new(pool: DbPool, source: Arc<dyn GameSource>) -> Self {
        Self {
            pool,
            source,
            page_size: DEFAULT_LIMIT,
        }
    }

    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    /// Newest archive's games, or `None` when the account has no archives.
    async fn latest_archive(
        &self,
        account: &Account,
    ) -> std::result::Result<Option<Vec<RemoteGame>>, SourceError> {
        let archives = self.source.archives(&account.chesscom_username).await?;

        let Some(latest_url) = archives.last() else {
            return Ok(None);
        };

        Ok(Some(self.source.archive_games(latest_url).await?))
    }

    /// Insert the game unless it is already cached for the account.
    ///
    /// Returns the new row, or `None` if the game was already present
    /// (including when a concurrent request won the insert race).
    async fn cache_game(&self, account: &Account, viewer: &str, game: &RemoteGame) -> Result<Option<StoredGame>> {
        if game.pgn.is_empty() || Database::game_exists(&self.pool, account.id, &game.pgn).await? {
            return Ok(None);
        }

        let inserted = Database::insert_game(&self.pool, account.id, &normalize(game, viewer)).await?;
        if inserted.is_none() {
            debug!("Game already cached for account {} by a concurrent request", account.id);
        }
        Ok(inserted)
    }

    /// Dashboard page: refresh from the newest archive when the cache looks
    /// stale, then serve the first page from the cache.
    pub async fn head_page(&self, account: &Account) -> Result<GamePage> {
        let n = self.page_size;
        let latest_cached = Database::latest_game(&self.pool, account.id).await?;

        let mut source = PageSource::Cache;
        match self.latest_archive(account).await {
            Ok(None) => {
                info!("No archives for {}", account.chesscom_username);
                return Ok(GamePage::empty());
            }
            Ok(Some(games)) => {
                let cached_count = Database::count_games(&self.pool, account.id).await?;
                let stale = match (&latest_cached, games.last()) {
                    (None, _) => true,
                    (Some(cached), Some(remote)) => cached.pgn != remote.pgn,
                    (Some(_), None) => false,
                } || cached_count < n;

                if stale {
                    let viewer = account.viewer();
                    let start = games.len().saturating_sub(n as usize);
                    let mut inserted = 0;
                    for game in &games[start..] {
                        if self.cache_game(account, &viewer, game).await?.is_some() {
                            inserted += 1;
                        }
                    }
                    info!(
                        "Synced head page for {}: {} new games",
                        account.chesscom_username, inserted
                    );
                    source = PageSource::Api;
                }
            }
            Err(e) => {
                warn!("Failed to fetch latest archive for {}: {}", account.chesscom_username, e);
                debug!("Serving cached head page for account {}", account.id);
            }
        }

        let rows = Database::games_page(&self.pool, account.id, n, 0).await?;
        let total = Database::count_games(&self.pool, account.id).await?;
        Ok(GamePage::from_rows(&rows, source, total > n))
    }

    /// Load-more page at `offset`. Falls back to the newest archive once the
    /// cache is exhausted.
    pub async fn offset_page(&self, account: &Account, offset: i64, limit: i64) -> Result<GamePage> {
        let offset = offset.max(0);
        let limit = limit.max(1);

        let rows = Database::games_page(&self.pool, account.id, limit, offset).await?;
        if !rows.is_empty() {
            let total = Database::count_games(&self.pool, account.id).await?;
            return Ok(GamePage::from_rows(&rows, PageSource::Cache, total > offset + limit));
        }

        let games = match self.latest_archive(account).await {
            Ok(Some(games)) => games,
            Ok(None) => return Ok(GamePage::empty()),
            Err(e) => {
                warn!("Failed to fetch latest archive for {}: {}", account.chesscom_username, e);
                return Ok(GamePage::empty());
            }
        };

        let viewer = account.viewer();
        let mut inserted = Vec::new();
        for game in games.iter().rev() {
            if inserted.len() as i64 >= limit {
                break;
            }
            if let Some(row) = self.cache_game(account, &viewer, game).await? {
                inserted.push(row);
            }
        }

        if inserted.is_empty() {
            return Ok(GamePage::empty());
        }

        info!(
            "Cache exhausted at offset {} for {}, fetched {} games",
            offset,
            account.chesscom_username,
            inserted.len()
        );
        // The remote may hold nothing more; the client finds out on the next call.
        Ok(GamePage::from_rows(&inserted, PageSource::Api, true))
    }

    /// Search cached games, escalating to the recent archives when the cache
    /// has no match.
    pub async fn search(&self, account: &Account, query: &str) -> Result<GamePage> {
        let query = query.trim();
        if query.is_empty() {
            let rows = Database::games_page(&self.pool, account.id, self.page_size, 0).await?;
            let total = Database::count_games(&self.pool, account.id).await?;
            return Ok(GamePage::from_rows(&rows, PageSource::Cache, total > self.page_size));
        }

        let hits = Database::search_games(&self.pool, account.id, query).await?;
        if !hits.is_empty() {
            return Ok(GamePage::from_rows(&hits, PageSource::Cache, false));
        }

        let found = self.search_remote(account, &query.to_lowercase()).await?;
        if found.is_empty() {
            return Ok(GamePage::empty());
        }
        Ok(GamePage::from_rows(&found, PageSource::Api, false))
    }

    async fn search_remote(&self, account: &Account, needle: &str) -> Result<Vec<StoredGame>> {
        let username = &account.chesscom_username;
        let archives = match self.source.archives(username).await {
            Ok(archives) => archives,
            Err(e) => {
                warn!("Failed to fetch archives for {}: {}", username, e);
                return Ok(Vec::new());
            }
        };

        let viewer = account.viewer();
        let mut found: Vec<StoredGame> = Vec::new();

        'archives: for url in archives.iter().rev().take(SEARCH_ARCHIVES) {
            let games = match self.source.archive_games(url).await {
                Ok(games) => games,
                Err(e) => {
                    warn!("Failed to fetch archive {}: {}", url, e);
                    continue;
                }
            };

            for game in games.iter().rev() {
                if game.pgn.is_empty() {
                    continue;
                }
                let opponent_name = opponent(game, &viewer).username.to_lowercase();
                let iso_date = game_date(game.end_time).to_string();
                if !opponent_name.contains(needle) && !iso_date.contains(needle) {
                    continue;
                }

                let row = match self.cache_game(account, &viewer, game).await? {
                    Some(row) => Some(row),
                    None => Database::find_game(&self.pool, account.id, &game.pgn).await?,
                };
                if let Some(row) = row {
                    if !found.iter().any(|g| g.id == row.id) {
                        found.push(row);
                    }
                }
                if found.len() >= SEARCH_RESULTS {
                    break 'archives;
                }
            }
        }

        info!("Remote search for '{}' on {} found {} games", needle, username, found.len());
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::memory_pool;
    use crate::models::GameResult;
    use crate::testutil::{remote_game, FakeSource};

    const DAY: i64 = 86_400;
    /// 2024-10-01T12:00:00Z
    const OCT_1: i64 = 1_727_784_000;

    async fn setup(source: FakeSource) -> (SyncEngine, Account, Arc<FakeSource>) {
        let pool = memory_pool().await;
        let account = Database::create_account(&pool, "alice", "Alice").await.unwrap();
        let source = Arc::new(source);
        let engine = SyncEngine::new(pool, source.clone());
        (engine, account, source)
    }

    /// `count` games on consecutive days of one archive, oldest first
    fn month(count: usize) -> Vec<RemoteGame> {
        (0..count)
            .map(|i| remote_game(&format!("pgn-{}", i), OCT_1 + i as i64 * DAY, "alice", &format!("opp{}", i)))
            .collect()
    }

    fn pgns(page: &GamePage, engine_rows: &[StoredGame]) -> Vec<String> {
        page.games
            .iter()
            .map(|entry| engine_rows.iter().find(|g| g.id == entry.id).unwrap().pgn.clone())
            .collect()
    }

    async fn all_rows(engine: &SyncEngine, account: &Account) -> Vec<StoredGame> {
        Database::games_page(&engine.pool, account.id, 1000, 0).await.unwrap()
    }

    #[tokio::test]
    async fn test_cold_start_syncs_latest_five() {
        let (engine, account, _) = setup(FakeSource::with_archives(vec![month(7)])).await;

        let page = engine.head_page(&account).await.unwrap();
        let rows = all_rows(&engine, &account).await;

        assert_eq!(page.source, PageSource::Api);
        assert_eq!(rows.len(), 5);
        assert_eq!(
            pgns(&page, &rows),
            vec!["pgn-6", "pgn-5", "pgn-4", "pgn-3", "pgn-2"]
        );
        assert!(!page.has_more);
        assert_eq!(page.games[0].date, "Oct 07, 2024");
        assert_eq!(page.games[0].result_label, GameResult::Win);
        assert!(page.games[0].is_account_white);
    }

    #[tokio::test]
    async fn test_head_page_is_idempotent() {
        let (engine, account, _) = setup(FakeSource::with_archives(vec![month(7)])).await;

        engine.head_page(&account).await.unwrap();
        let before = all_rows(&engine, &account).await;
        let first = engine.head_page(&account).await.unwrap();
        let second = engine.head_page(&account).await.unwrap();
        let after = all_rows(&engine, &account).await;

        assert_eq!(before, after);
        assert_eq!(first, second);
        assert_eq!(second.source, PageSource::Cache);
    }

    #[tokio::test]
    async fn test_new_remote_game_triggers_resync() {
        let (engine, account, source) = setup(FakeSource::with_archives(vec![month(6)])).await;
        engine.head_page(&account).await.unwrap();

        source.push_game(remote_game("pgn-new", OCT_1 + 10 * DAY, "bob", "alice"));
        let page = engine.head_page(&account).await.unwrap();
        let rows = all_rows(&engine, &account).await;

        assert_eq!(page.source, PageSource::Api);
        assert_eq!(rows.len(), 6);
        assert_eq!(pgns(&page, &rows)[0], "pgn-new");
        assert!(!page.games[0].is_account_white);
        assert!(page.has_more);
    }

    #[tokio::test]
    async fn test_small_cache_triggers_resync() {
        let (engine, account, _) = setup(FakeSource::with_archives(vec![month(3)])).await;

        // Fewer than a page cached keeps the head page in sync mode
        let first = engine.head_page(&account).await.unwrap();
        let second = engine.head_page(&account).await.unwrap();
        assert_eq!(first.source, PageSource::Api);
        assert_eq!(second.source, PageSource::Api);
        assert_eq!(all_rows(&engine, &account).await.len(), 3);
    }

    #[tokio::test]
    async fn test_no_archives_returns_empty_page() {
        let (engine, account, _) = setup(FakeSource::with_archives(vec![])).await;

        let page = engine.head_page(&account).await.unwrap();
        assert_eq!(page, GamePage::empty());
    }

    #[tokio::test]
    async fn test_remote_failure_serves_cache() {
        let (engine, account, source) = setup(FakeSource::with_archives(vec![month(7)])).await;
        engine.head_page(&account).await.unwrap();

        source.set_failing(true);
        let page = engine.head_page(&account).await.unwrap();
        assert_eq!(page.source, PageSource::Cache);
        assert_eq!(page.games.len(), 5);

        let (engine, account, source) = setup(FakeSource::with_archives(vec![month(7)])).await;
        source.set_failing(true);
        let page = engine.head_page(&account).await.unwrap();
        assert!(page.games.is_empty());
        assert_eq!(page.source, PageSource::Cache);
    }

    #[tokio::test]
    async fn test_pagination_is_complete() {
        let (engine, account, _) = setup(FakeSource::with_archives(vec![])).await;
        let viewer = account.viewer();
        for game in month(12) {
            engine.cache_game(&account, &viewer, &game).await.unwrap();
        }
        let expected: Vec<i64> = all_rows(&engine, &account).await.iter().map(|g| g.id).collect();

        let mut seen = Vec::new();
        let mut offset = 0;
        loop {
            let page = engine.offset_page(&account, offset, 5).await.unwrap();
            assert_eq!(page.source, PageSource::Cache);
            seen.extend(page.games.iter().map(|g| g.id));
            offset += 5;
            if !page.has_more {
                break;
            }
        }

        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn test_exhausted_cache_falls_back_to_remote() {
        let (engine, account, _) = setup(FakeSource::with_archives(vec![month(12)])).await;
        engine.head_page(&account).await.unwrap();

        let page = engine.offset_page(&account, 5, 5).await.unwrap();
        let rows = all_rows(&engine, &account).await;

        assert_eq!(page.source, PageSource::Api);
        assert!(page.has_more);
        // pgn-11..pgn-7 were cached by the head page; newest uncached first
        assert_eq!(pgns(&page, &rows), vec!["pgn-6", "pgn-5", "pgn-4", "pgn-3", "pgn-2"]);
        assert_eq!(rows.len(), 10);
    }

    #[tokio::test]
    async fn test_offset_fallback_with_nothing_new() {
        let (engine, account, _) = setup(FakeSource::with_archives(vec![month(5)])).await;
        engine.head_page(&account).await.unwrap();

        let page = engine.offset_page(&account, 5, 5).await.unwrap();
        assert_eq!(page, GamePage::empty());
    }

    #[tokio::test]
    async fn test_offset_fallback_on_remote_failure() {
        let (engine, account, source) = setup(FakeSource::with_archives(vec![month(5)])).await;
        source.set_failing(true);

        let page = engine.offset_page(&account, 0, 5).await.unwrap();
        assert_eq!(page, GamePage::empty());
    }

    #[tokio::test]
    async fn test_search_hits_cache_first() {
        let (engine, account, source) = setup(FakeSource::with_archives(vec![month(7)])).await;
        engine.head_page(&account).await.unwrap();
        let calls = source.calls();

        let page = engine.search(&account, "OPP6").await.unwrap();
        assert_eq!(page.source, PageSource::Cache);
        assert_eq!(page.games.len(), 1);
        assert_eq!(source.calls(), calls);

        let page = engine.search(&account, "2024-10-05").await.unwrap();
        assert_eq!(page.games.len(), 1);
    }

    #[tokio::test]
    async fn test_search_escalates_to_remote_archives() {
        let older = vec![remote_game("sep-1", OCT_1 - 20 * DAY, "carol", "alice")];
        let (engine, account, _) = setup(FakeSource::with_archives(vec![older, month(7)])).await;
        engine.head_page(&account).await.unwrap();

        // opp1 only exists in the remote archive, carol only in an older month
        let page = engine.search(&account, "opp1").await.unwrap();
        assert_eq!(page.source, PageSource::Api);
        assert_eq!(page.games.len(), 1);

        let page = engine.search(&account, "carol").await.unwrap();
        assert_eq!(page.source, PageSource::Api);
        assert_eq!(page.games.len(), 1);
        assert_eq!(page.games[0].result_label, GameResult::Loss);

        // now cached
        let page = engine.search(&account, "carol").await.unwrap();
        assert_eq!(page.source, PageSource::Cache);
    }

    #[tokio::test]
    async fn test_remote_search_is_bounded() {
        let archives: Vec<Vec<RemoteGame>> = (0..8)
            .map(|m| {
                (0..4)
                    .map(|i| remote_game(&format!("m{}-{}", m, i), OCT_1 + (m * 31 + i) as i64 * DAY, "alice", "rival"))
                    .collect()
            })
            .collect();
        let (engine, account, source) = setup(FakeSource::with_archives(archives)).await;

        let page = engine.search(&account, "rival").await.unwrap();
        assert_eq!(page.games.len(), SEARCH_RESULTS);
        // 1 archive list + 3 archives of 4 games each
        assert_eq!(source.calls(), 4);
        assert!(source.calls() <= 1 + SEARCH_ARCHIVES);
    }

    #[tokio::test]
    async fn test_search_without_match_is_empty() {
        let (engine, account, _) = setup(FakeSource::with_archives(vec![month(3)])).await;

        let page = engine.search(&account, "nobody").await.unwrap();
        assert_eq!(page, GamePage::empty());
    }

    #[tokio::test]
    async fn test_blank_search_returns_cached_head() {
        let (engine, account, source) = setup(FakeSource::with_archives(vec![month(7)])).await;
        engine.head_page(&account).await.unwrap();
        let calls = source.calls();

        let page = engine.search(&account, "   ").await.unwrap();
        assert_eq!(page.games.len(), 5);
        assert_eq!(page.source, PageSource::Cache);
        assert_eq!(source.calls(), calls);
    }
}
