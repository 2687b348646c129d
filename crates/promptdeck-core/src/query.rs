//! Query and mutation cache
//!
//! Wraps the persistence service with the read/write semantics front ends
//! expect from an async query cache:
//!
//! - reads are cached per [`QueryKey`] and stay fresh for
//!   [`QueryOptions::stale_time`] (5 minutes by default)
//! - failed reads are retried (3 times by default, with doubling delays)
//!   before the query enters the `Error` state; errors that cannot succeed
//!   on retry fail at once
//! - successful writes invalidate the list key so the next read refetches,
//!   even when the write lands while a fetch of that key is running;
//!   failed writes leave the cache untouched and hand the error back
//! - there are no optimistic updates
//!
//! Each key follows `Idle -> Loading -> {Success, Error}`. A later fetch or
//! refetch re-enters `Loading`. Only one fetch per key runs at a time;
//! callers arriving mid-fetch wait for it and then read its result.
//!
//! ## Usage
//!
//! ```ignore
//! let queries = PromptQueries::new(Arc::new(service));
//!
//! let state = queries.list().await;
//! if let Some(items) = state.data { /* render */ }
//!
//! queries.save_item().mutate_async(item).await?;
//! // list key is now invalidated, the next list() refetches
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::models::{Collection, PromptItem};
use crate::service::PromptService;
use crate::store::{StoreError, StoreResult};

/// Longest delay between two retries
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Hierarchical cache key, e.g. `["prompts", "list"]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Every query of a collection
    pub fn all(collection: Collection) -> Self {
        Self::new([collection.query_root()])
    }

    /// List queries of a collection
    pub fn lists(collection: Collection) -> Self {
        Self::new([collection.query_root(), "list"])
    }

    /// A single record of a collection
    pub fn detail(collection: Collection, id: &str) -> Self {
        Self::new([collection.query_root(), "detail", id])
    }

    /// Whether `prefix` names this key or one of its ancestors
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Freshness and retry policy for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryOptions {
    /// How long fetched data is served without refetching
    pub stale_time: Duration,
    /// Retries after the first failed attempt
    pub retry: u32,
    /// Delay before the first retry; doubles on each further retry
    pub retry_delay: Duration,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            retry: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl QueryOptions {
    /// Delay before retry number `retry_index` (0-based), capped at 30s
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_index);
        self.retry_delay
            .checked_mul(factor)
            .unwrap_or(MAX_RETRY_DELAY)
            .min(MAX_RETRY_DELAY)
    }
}

/// Lifecycle of a cached query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
    /// Never fetched
    #[default]
    Idle,
    /// A fetch is in progress
    Loading,
    /// The last fetch succeeded
    Success,
    /// The last fetch failed after all retries
    Error,
}

/// A read that failed after exhausting its retries
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Query failed after {attempts} attempt(s): {message}")]
pub struct QueryError {
    /// Message of the last failed attempt
    pub message: String,
    /// Number of attempts made
    pub attempts: u32,
}

/// Snapshot of one cached query
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T> {
    pub status: QueryStatus,
    /// Data from the last successful fetch, kept across later failures
    pub data: Option<T>,
    pub error: Option<QueryError>,
    /// When `data` was fetched
    pub updated_at: Option<Instant>,
    /// Set by invalidation, cleared by the next successful fetch
    pub invalidated: bool,
    /// Failed attempts in the current or last fetch
    pub failure_count: u32,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            status: QueryStatus::Idle,
            data: None,
            error: None,
            updated_at: None,
            invalidated: false,
            failure_count: 0,
        }
    }
}

impl<T> QueryState<T> {
    pub fn is_loading(&self) -> bool {
        self.status == QueryStatus::Loading
    }

    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == QueryStatus::Error
    }

    /// Whether the data may be served without refetching
    pub fn is_fresh(&self, stale_time: Duration) -> bool {
        self.is_success()
            && !self.invalidated
            && self
                .updated_at
                .is_some_and(|at| at.elapsed() < stale_time)
    }
}

struct Entry<T> {
    state: watch::Sender<QueryState<T>>,
    /// Serializes fetches of this key
    fetch_lock: tokio::sync::Mutex<()>,
    /// Bumped by every invalidation
    generation: AtomicU64,
}

impl<T: Clone> Entry<T> {
    fn new() -> Self {
        let (state, _) = watch::channel(QueryState::default());
        Self {
            state,
            fetch_lock: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    fn current(&self) -> QueryState<T> {
        self.state.borrow().clone()
    }
}

/// Keyed cache of query results
pub struct QueryCache<T> {
    entries: Mutex<HashMap<QueryKey, Arc<Entry<T>>>>,
}

impl<T> Default for QueryCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> QueryCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &QueryKey) -> Arc<Entry<T>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Entry::new()))
            .clone()
    }

    /// Current state of `key` (`Idle` if never fetched)
    pub fn get_state(&self, key: &QueryKey) -> QueryState<T> {
        self.entry(key).current()
    }

    /// Watch state changes of `key`
    pub fn subscribe(&self, key: &QueryKey) -> watch::Receiver<QueryState<T>> {
        self.entry(key).state.subscribe()
    }

    /// Return fresh cached data or fetch it
    ///
    /// Failed attempts are retried while `should_retry` accepts the error.
    pub async fn fetch<F, Fut, E, R>(
        &self,
        key: &QueryKey,
        options: &QueryOptions,
        fetcher: F,
        should_retry: R,
    ) -> QueryState<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        R: Fn(&E) -> bool,
    {
        let entry = self.entry(key);
        if entry.current().is_fresh(options.stale_time) {
            debug!("Query {} served from cache", key);
            return entry.current();
        }

        let _guard = entry.fetch_lock.lock().await;
        // Another caller may have fetched while we waited
        let state = entry.current();
        if state.is_fresh(options.stale_time) {
            debug!("Query {} fetched by a concurrent caller", key);
            return state;
        }

        run_fetch(&entry, key, options, fetcher, should_retry).await
    }

    /// Fetch `key` regardless of freshness
    pub async fn refetch<F, Fut, E, R>(
        &self,
        key: &QueryKey,
        options: &QueryOptions,
        fetcher: F,
        should_retry: R,
    ) -> QueryState<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
        R: Fn(&E) -> bool,
    {
        let entry = self.entry(key);
        let _guard = entry.fetch_lock.lock().await;
        run_fetch(&entry, key, options, fetcher, should_retry).await
    }

    /// Mark every key under `prefix` stale; returns how many were marked
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let mut count = 0;
        for (key, entry) in entries.iter().filter(|(key, _)| key.starts_with(prefix)) {
            entry.generation.fetch_add(1, Ordering::SeqCst);
            entry.state.send_modify(|state| state.invalidated = true);
            debug!("Invalidated query {}", key);
            count += 1;
        }
        count
    }
}

async fn run_fetch<T, F, Fut, E, R>(
    entry: &Entry<T>,
    key: &QueryKey,
    options: &QueryOptions,
    mut fetcher: F,
    should_retry: R,
) -> QueryState<T>
where
    T: Clone,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    R: Fn(&E) -> bool,
{
    entry.state.send_modify(|state| {
        state.status = QueryStatus::Loading;
        state.error = None;
        state.failure_count = 0;
    });

    let mut attempt = 0;
    loop {
        let generation = entry.generation.load(Ordering::SeqCst);
        match fetcher().await {
            Ok(data) => {
                // An invalidation during the fetch means `data` may predate a write
                let invalidated = entry.generation.load(Ordering::SeqCst) != generation;
                if invalidated {
                    debug!("Query {} was invalidated while fetching", key);
                }
                entry.state.send_modify(|state| {
                    state.status = QueryStatus::Success;
                    state.data = Some(data);
                    state.error = None;
                    state.updated_at = Some(Instant::now());
                    state.invalidated = invalidated;
                    state.failure_count = 0;
                });
                break;
            }
            Err(e) => {
                entry.state.send_modify(|state| state.failure_count += 1);

                if attempt < options.retry && should_retry(&e) {
                    let delay = options.delay_for(attempt);
                    warn!(
                        "Query {} failed (attempt {}), retrying in {:?}: {}",
                        key,
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }

                error!("Query {} failed after {} attempt(s): {}", key, attempt + 1, e);
                entry.state.send_modify(|state| {
                    state.status = QueryStatus::Error;
                    state.error = Some(QueryError {
                        message: e.to_string(),
                        attempts: attempt + 1,
                    });
                });
                break;
            }
        }
    }

    entry.current()
}

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type MutationFn<I> = for<'a> fn(&'a PromptService, I) -> BoxFuture<'a, StoreResult<()>>;

/// A write operation that invalidates the list query on success
pub struct Mutation<I> {
    name: &'static str,
    service: Arc<PromptService>,
    cache: Arc<QueryCache<Vec<PromptItem>>>,
    invalidates: QueryKey,
    pending: Arc<AtomicUsize>,
    run: MutationFn<I>,
}

impl<I> Clone for Mutation<I> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            service: Arc::clone(&self.service),
            cache: Arc::clone(&self.cache),
            invalidates: self.invalidates.clone(),
            pending: Arc::clone(&self.pending),
            run: self.run,
        }
    }
}

impl<I> Mutation<I> {
    /// Whether a call of this mutation is in flight
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst) > 0
    }

    /// Run the write and wait for the store to confirm it
    pub async fn mutate_async(&self, input: I) -> StoreResult<()> {
        let _pending = PendingGuard::enter(&self.pending);

        match (self.run)(self.service.as_ref(), input).await {
            Ok(()) => {
                self.cache.invalidate(&self.invalidates);
                Ok(())
            }
            Err(e) => {
                error!("Mutation {} failed: {}", self.name, e);
                Err(e)
            }
        }
    }
}

struct PendingGuard<'a>(&'a AtomicUsize);

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn save_item(service: &PromptService, item: PromptItem) -> BoxFuture<'_, StoreResult<()>> {
    Box::pin(service.save_one(item))
}

fn delete_item(service: &PromptService, id: String) -> BoxFuture<'_, StoreResult<()>> {
    Box::pin(async move { service.delete_one(&id).await })
}

fn save_all(service: &PromptService, items: Vec<PromptItem>) -> BoxFuture<'_, StoreResult<()>> {
    Box::pin(service.save_all(items))
}

/// Cached reads and invalidating writes for one collection
pub struct PromptQueries {
    service: Arc<PromptService>,
    cache: Arc<QueryCache<Vec<PromptItem>>>,
    options: QueryOptions,
    pending: [Arc<AtomicUsize>; 3],
}

impl PromptQueries {
    /// Create queries with a private cache
    pub fn new(service: Arc<PromptService>) -> Self {
        Self::with_cache(service, Arc::new(QueryCache::new()))
    }

    /// Create queries sharing `cache` with other collections
    pub fn with_cache(service: Arc<PromptService>, cache: Arc<QueryCache<Vec<PromptItem>>>) -> Self {
        Self {
            service,
            cache,
            options: QueryOptions::default(),
            pending: Default::default(),
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn service(&self) -> &PromptService {
        &self.service
    }

    /// Key of the list query
    pub fn list_key(&self) -> QueryKey {
        QueryKey::lists(self.service.collection())
    }

    /// Current list state without fetching
    pub fn state(&self) -> QueryState<Vec<PromptItem>> {
        self.cache.get_state(&self.list_key())
    }

    /// Watch list state changes
    pub fn subscribe(&self) -> watch::Receiver<QueryState<Vec<PromptItem>>> {
        self.cache.subscribe(&self.list_key())
    }

    /// All records, from cache while fresh
    pub async fn list(&self) -> QueryState<Vec<PromptItem>> {
        let key = self.list_key();
        self.cache
            .fetch(
                &key,
                &self.options,
                || load_list(&self.service),
                StoreError::is_transient,
            )
            .await
    }

    /// Fetch the list now, even if the cached data is fresh
    pub async fn refetch(&self) -> QueryState<Vec<PromptItem>> {
        let key = self.list_key();
        self.cache
            .refetch(
                &key,
                &self.options,
                || load_list(&self.service),
                StoreError::is_transient,
            )
            .await
    }

    /// Mark the list stale so the next read refetches
    pub fn refresh(&self) {
        self.cache.invalidate(&self.list_key());
    }

    /// Upsert one record
    pub fn save_item(&self) -> Mutation<PromptItem> {
        self.mutation("save_item", 0, save_item)
    }

    /// Delete one record by id
    pub fn delete_item(&self) -> Mutation<String> {
        self.mutation("delete_item", 1, delete_item)
    }

    /// Replace the whole collection (reorder)
    pub fn save_all(&self) -> Mutation<Vec<PromptItem>> {
        self.mutation("save_all", 2, save_all)
    }

    fn mutation<I>(&self, name: &'static str, slot: usize, run: MutationFn<I>) -> Mutation<I> {
        Mutation {
            name,
            service: Arc::clone(&self.service),
            cache: Arc::clone(&self.cache),
            invalidates: self.list_key(),
            pending: Arc::clone(&self.pending[slot]),
            run,
        }
    }
}

/// Read the list, seeding defaults for collections that want them
async fn load_list(service: &PromptService) -> StoreResult<Vec<PromptItem>> {
    let items = service.get_all().await;
    if !items.is_empty() || !service.collection().seeds_defaults_on_read() {
        return Ok(items);
    }

    service.initialize_defaults().await?;
    Ok(service.get_all().await)
}
