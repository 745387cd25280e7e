//! Query layer for the deal board.
//!
//! `BoardQuery` supervises the fetch lifecycle for the `"deals"` key:
//! - serves the cached **assembled board** while it is fresh
//! - retries a failed fetch (once by default) before surfacing an error
//! - evicts boards older than the cache window and never serves them
//! - shares one in-flight fetch between concurrent callers
//! - lets only the most recently started fetch write to the cache

use crate::board::{assemble_documents, Board, BoardTemplate};
use crate::db::DocumentList;
use crate::errors::BoardError;
use crate::source::DealSource;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Logical cache key of the board query.
pub const BOARD_QUERY_KEY: &str = "deals";

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Board>, BoardError>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryConfig {
    /// How long a fetched board is served without re-fetching
    pub stale_time: Duration,
    /// How long a fetched board is kept at all
    pub cache_time: Duration,
    /// Automatic retries after a failed fetch
    pub retry: u32,
    pub retry_delay: Duration,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            cache_time: Duration::from_secs(10 * 60),
            retry: 1,
            retry_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    /// Nothing fetched yet
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

struct CachedBoard {
    board: Arc<Board>,
    fetched_at: Instant,
}

struct InFlight {
    generation: u64,
    fetch: SharedFetch,
}

#[derive(Default)]
struct QueryEntry {
    cached: Option<CachedBoard>,
    in_flight: Option<InFlight>,
    /// Generation of the most recently started fetch
    latest_generation: u64,
    status: QueryStatus,
    last_error: Option<BoardError>,
}

pub struct BoardQuery<S: DealSource> {
    source: Arc<S>,
    template: Arc<BoardTemplate>,
    config: QueryConfig,
    entry: Mutex<QueryEntry>,
    assemblies: Arc<AtomicU64>,
}

impl<S: DealSource> BoardQuery<S> {
    pub fn new(source: S, template: BoardTemplate, config: QueryConfig) -> Self {
        if config.cache_time < config.stale_time {
            warn!(
                stale_secs = config.stale_time.as_secs(),
                cache_secs = config.cache_time.as_secs(),
                "cache window shorter than staleness window; boards expire before going stale"
            );
        }

        Self {
            source: Arc::new(source),
            template: Arc::new(template),
            config,
            entry: Mutex::new(QueryEntry::default()),
            assemblies: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn key(&self) -> &'static str {
        BOARD_QUERY_KEY
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn template(&self) -> &BoardTemplate {
        &self.template
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Number of boards assembled so far (one per successful fetch).
    pub fn assemblies(&self) -> u64 {
        self.assemblies.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> QueryStatus {
        self.lock_entry().status
    }

    pub fn last_error(&self) -> Option<BoardError> {
        self.lock_entry().last_error.clone()
    }

    /// The board, fetched only when the cached one is missing or stale.
    pub async fn fetch_board(&self) -> Result<Arc<Board>, BoardError> {
        let (generation, fetch) = {
            let mut entry = self.lock_entry();
            let now = Instant::now();
            self.evict_if_expired(&mut entry, now);

            if let Some(cached) = &entry.cached {
                if now.duration_since(cached.fetched_at) < self.config.stale_time {
                    debug!(key = BOARD_QUERY_KEY, "serving fresh board from cache");
                    return Ok(Arc::clone(&cached.board));
                }
            }

            let joined = entry
                .in_flight
                .as_ref()
                .map(|in_flight| (in_flight.generation, in_flight.fetch.clone()));
            match joined {
                Some((generation, fetch)) => {
                    debug!(key = BOARD_QUERY_KEY, generation, "joining in-flight fetch");
                    (generation, fetch)
                }
                None => self.start_fetch(&mut entry),
            }
        };

        let result = fetch.await;
        self.settle(generation, result)
    }

    /// Fetch unconditionally, superseding any fetch already running.
    pub async fn refetch(&self) -> Result<Arc<Board>, BoardError> {
        let (generation, fetch) = {
            let mut entry = self.lock_entry();
            self.start_fetch(&mut entry)
        };

        let result = fetch.await;
        self.settle(generation, result)
    }

    /// The cached board if it has not expired, without fetching.
    pub fn peek(&self) -> Option<Arc<Board>> {
        let mut entry = self.lock_entry();
        self.evict_if_expired(&mut entry, Instant::now());
        entry.cached.as_ref().map(|cached| Arc::clone(&cached.board))
    }

    /// True when there is no cached board or it is past the staleness window.
    pub fn is_stale(&self) -> bool {
        let entry = self.lock_entry();
        entry
            .cached
            .as_ref()
            .map_or(true, |cached| cached.fetched_at.elapsed() >= self.config.stale_time)
    }

    /// Drop the cached board; the next `fetch_board` goes to the source.
    pub fn invalidate(&self) {
        let mut entry = self.lock_entry();
        if entry.cached.take().is_some() {
            debug!(key = BOARD_QUERY_KEY, "cached board invalidated");
        }
    }

    /// Evict an expired board now. Returns `true` if one was evicted.
    pub fn evict_expired(&self) -> bool {
        let mut entry = self.lock_entry();
        self.evict_if_expired(&mut entry, Instant::now())
    }

    fn lock_entry(&self) -> MutexGuard<'_, QueryEntry> {
        self.entry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evict_if_expired(&self, entry: &mut QueryEntry, now: Instant) -> bool {
        let expired = entry
            .cached
            .as_ref()
            .is_some_and(|cached| now.duration_since(cached.fetched_at) >= self.config.cache_time);

        if expired {
            entry.cached = None;
            info!(key = BOARD_QUERY_KEY, "cached board expired and evicted");
        }
        expired
    }

    fn start_fetch(&self, entry: &mut QueryEntry) -> (u64, SharedFetch) {
        entry.latest_generation += 1;
        let generation = entry.latest_generation;

        let source = Arc::clone(&self.source);
        let template = Arc::clone(&self.template);
        let assemblies = Arc::clone(&self.assemblies);
        let config = self.config.clone();

        let fetch = async move {
            let response = fetch_with_retry(source.as_ref(), &config).await?;
            let board = assemble_documents(&template, &response).map_err(|err| {
                error!(error = %err, "Error processing deals data");
                BoardError::from(err)
            })?;
            assemblies.fetch_add(1, Ordering::Relaxed);
            Ok(Arc::new(board))
        }
        .boxed()
        .shared();

        debug!(key = BOARD_QUERY_KEY, generation, "starting fetch");
        entry.in_flight = Some(InFlight {
            generation,
            fetch: fetch.clone(),
        });
        entry.status = QueryStatus::Loading;

        (generation, fetch)
    }

    /// Record a finished fetch. Every awaiter of a generation calls this;
    /// only the one that clears the in-flight slot commits, and only when
    /// its generation is still the latest.
    fn settle(
        &self,
        generation: u64,
        result: Result<Arc<Board>, BoardError>,
    ) -> Result<Arc<Board>, BoardError> {
        let mut entry = self.lock_entry();

        let owns_commit = entry
            .in_flight
            .as_ref()
            .is_some_and(|in_flight| in_flight.generation == generation);
        if owns_commit {
            entry.in_flight = None;
        }

        if generation != entry.latest_generation {
            debug!(
                key = BOARD_QUERY_KEY,
                generation,
                latest = entry.latest_generation,
                "discarding result of superseded fetch"
            );
            return result;
        }

        // Another awaiter of this fetch already recorded it
        if !owns_commit {
            return result;
        }

        match &result {
            Ok(board) => {
                entry.cached = Some(CachedBoard {
                    board: Arc::clone(board),
                    fetched_at: Instant::now(),
                });
                info!(
                    key = BOARD_QUERY_KEY,
                    generation,
                    cards = board.total_cards(),
                    "board cached"
                );
                entry.status = QueryStatus::Success;
                entry.last_error = None;
            }
            Err(err) => {
                entry.status = QueryStatus::Error;
                entry.last_error = Some(err.clone());
            }
        }

        result
    }
}

async fn fetch_with_retry<S: DealSource>(
    source: &S,
    config: &QueryConfig,
) -> Result<DocumentList, BoardError> {
    let attempts = config.retry.saturating_add(1);
    let mut attempt = 1;

    loop {
        match source.fetch_deals().await {
            Ok(response) => return Ok(response),
            Err(err) if attempt < attempts => {
                warn!(attempt, error = %err, "deal fetch failed, retrying");
                tokio::time::sleep(config.retry_delay).await;
                attempt += 1;
            }
            Err(err) => {
                error!(attempts, error = %err, "Error fetching deals");
                return Err(BoardError::from(err));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::ColumnTemplate;
    use crate::errors::{BoardErrorKind, FetchError, LOAD_FAILED_MESSAGE, PROCESSING_FAILED_MESSAGE};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    /// Replays scripted responses, each after an optional delay.
    #[derive(Default)]
    struct ScriptedSource {
        script: Mutex<VecDeque<(Duration, Result<DocumentList, FetchError>)>>,
        calls: AtomicUsize,
    }

    impl ScriptedSource {
        fn new(script: Vec<(Duration, Result<DocumentList, FetchError>)>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DealSource for ScriptedSource {
        async fn fetch_deals(&self) -> Result<DocumentList, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            let (delay, result) = next.unwrap_or((
                Duration::ZERO,
                Err(FetchError::Unavailable("script exhausted".to_string())),
            ));
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            result
        }
    }

    fn documents(names: &[&str]) -> DocumentList {
        let documents: Vec<Value> = names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                json!({
                    "$id": format!("d{}", i),
                    "$createdAt": format!("2024-01-{:02}", i + 1),
                    "name": name,
                    "price": 100,
                    "status": "new"
                })
            })
            .collect();
        DocumentList {
            total: documents.len(),
            documents,
        }
    }

    fn ok(names: &[&str]) -> (Duration, Result<DocumentList, FetchError>) {
        (Duration::ZERO, Ok(documents(names)))
    }

    fn fail() -> (Duration, Result<DocumentList, FetchError>) {
        (
            Duration::ZERO,
            Err(FetchError::Unavailable("connection refused".to_string())),
        )
    }

    fn query(script: Vec<(Duration, Result<DocumentList, FetchError>)>) -> BoardQuery<ScriptedSource> {
        let template = BoardTemplate::new(vec![
            ColumnTemplate::new("new", "New"),
            ColumnTemplate::new("won", "Won"),
        ])
        .unwrap();
        BoardQuery::new(ScriptedSource::new(script), template, QueryConfig::default())
    }

    fn card_names(board: &Board) -> Vec<String> {
        board.columns[0].items.iter().map(|c| c.name.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fresh_board_is_reused() {
        let q = query(vec![ok(&["A", "B"]), ok(&["C"])]);
        assert_eq!(q.status(), QueryStatus::Idle);

        let first = q.fetch_board().await.unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        let second = q.fetch_board().await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(q.source().calls(), 1);
        assert_eq!(q.assemblies(), 1);
        assert_eq!(q.status(), QueryStatus::Success);
        assert_eq!(q.key(), "deals");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_board_is_refetched() {
        let q = query(vec![ok(&["A"]), ok(&["B"])]);

        q.fetch_board().await.unwrap();
        assert!(!q.is_stale());
        tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
        assert!(q.is_stale());
        let board = q.fetch_board().await.unwrap();

        assert_eq!(card_names(&board), vec!["B"]);
        assert_eq!(q.source().calls(), 2);
        assert_eq!(q.assemblies(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_is_retried_once() {
        let q = query(vec![fail(), ok(&["A"])]);

        let board = q.fetch_board().await.unwrap();

        assert_eq!(card_names(&board), vec!["A"]);
        assert_eq!(q.source().calls(), 2);
        assert_eq!(q.assemblies(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_error_after_retry() {
        let q = query(vec![fail(), fail(), ok(&["never"])]);

        let err = q.fetch_board().await.unwrap_err();

        assert_eq!(err.kind, BoardErrorKind::Transport);
        assert_eq!(err.message, LOAD_FAILED_MESSAGE);
        assert!(err.detail.contains("connection refused"));
        assert_eq!(q.source().calls(), 2);
        assert_eq!(q.assemblies(), 0);
        assert_eq!(q.status(), QueryStatus::Error);
        assert_eq!(q.last_error(), Some(err));
        assert!(q.peek().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transform_error_is_not_retried() {
        let bad = DocumentList {
            total: 1,
            documents: vec![json!("not a document")],
        };
        let q = query(vec![(Duration::ZERO, Ok(bad))]);

        let err = q.fetch_board().await.unwrap_err();

        assert_eq!(err.kind, BoardErrorKind::Transform);
        assert_eq!(err.message, PROCESSING_FAILED_MESSAGE);
        assert_eq!(q.source().calls(), 1);
        assert!(q.peek().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_board_is_never_served() {
        let q = query(vec![ok(&["A"]), fail(), fail()]);

        q.fetch_board().await.unwrap();
        tokio::time::advance(Duration::from_secs(10 * 60)).await;

        assert!(q.peek().is_none());
        let err = q.fetch_board().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired() {
        let q = query(vec![ok(&["A"])]);

        q.fetch_board().await.unwrap();
        tokio::time::advance(Duration::from_secs(9 * 60)).await;
        assert!(!q.evict_expired());
        assert!(q.peek().is_some());

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(q.evict_expired());
        assert!(q.peek().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_board_survives_failed_refresh_until_expiry() {
        let q = query(vec![ok(&["A"]), fail(), fail()]);

        q.fetch_board().await.unwrap();
        tokio::time::advance(Duration::from_secs(6 * 60)).await;

        assert!(q.fetch_board().await.is_err());
        let cached = q.peek().unwrap();
        assert_eq!(card_names(&cached), vec!["A"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetches_are_coalesced() {
        let q = query(vec![(Duration::from_millis(100), Ok(documents(&["A"])))]);

        let (a, b, c) = tokio::join!(q.fetch_board(), q.fetch_board(), q.fetch_board());
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
        assert_eq!(q.source().calls(), 1);
        assert_eq!(q.assemblies(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_fetch_does_not_overwrite_newer_board() {
        let q = query(vec![
            (Duration::from_millis(200), Ok(documents(&["old"]))),
            (Duration::from_millis(10), Ok(documents(&["new"]))),
        ]);

        let (older, newer) = tokio::join!(q.fetch_board(), q.refetch());

        // Each caller gets its own fetch back
        assert_eq!(card_names(&older.unwrap()), vec!["old"]);
        assert_eq!(card_names(&newer.unwrap()), vec!["new"]);
        // Only the most recently started one is cached
        assert_eq!(card_names(&q.peek().unwrap()), vec!["new"]);
        assert_eq!(q.status(), QueryStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_ignores_freshness() {
        let q = query(vec![ok(&["A"]), ok(&["B"])]);

        q.fetch_board().await.unwrap();
        let board = q.refetch().await.unwrap();

        assert_eq!(card_names(&board), vec!["B"]);
        assert_eq!(card_names(&q.fetch_board().await.unwrap()), vec!["B"]);
        assert_eq!(q.source().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_fetch() {
        let q = query(vec![ok(&["A"]), ok(&["B"])]);

        q.fetch_board().await.unwrap();
        q.invalidate();
        assert!(q.peek().is_none());
        let board = q.fetch_board().await.unwrap();

        assert_eq!(card_names(&board), vec!["B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_awaiter_does_not_undo_invalidate() {
        let q = query(vec![ok(&["A"])]);

        let (generation, fetch) = {
            let mut entry = q.lock_entry();
            q.start_fetch(&mut entry)
        };
        let first = fetch.clone().await;
        let second = fetch.await;

        assert!(q.settle(generation, first).is_ok());
        assert!(q.peek().is_some());
        q.invalidate();

        let late = q.settle(generation, second).unwrap();
        assert_eq!(card_names(&late), vec!["A"]);
        assert!(q.peek().is_none());
        assert!(q.is_stale());
        assert_eq!(q.source().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retry_config() {
        let template = BoardTemplate::default();
        let config = QueryConfig {
            retry: 0,
            ..QueryConfig::default()
        };
        let q = BoardQuery::new(ScriptedSource::new(vec![fail(), ok(&["A"])]), template, config);

        assert!(q.fetch_board().await.is_err());
        assert_eq!(q.source().calls(), 1);
    }
}
