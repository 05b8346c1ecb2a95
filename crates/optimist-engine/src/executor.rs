//! Query executor: resolves reads against the store, deduplicating fetches.
//!
//! For any key at most one fetch is outstanding at a time: concurrent reads
//! join the in-flight fetch. Each fetch carries a per-key sequence number
//! and the store revision it observed when it started; its result is only
//! written if the entry was not touched in the meantime.
//!
//! Fetches are driven by a spawned task, so they settle even if every
//! reader stops waiting. Reads must run inside a Tokio runtime.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use indexmap::IndexMap;
use optimist_core::{CacheKey, Domain, KeyKind, record};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::FetchError;
use crate::metrics::EngineMetrics;
use crate::store::{CacheStore, EntryState};

/// Boxed future returned by fetch functions.
pub type FetchFuture = BoxFuture<'static, Result<Value, FetchError>>;

/// Fetch function registered for an active query.
pub type Fetcher = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

type SharedFetch = Shared<FetchFuture>;

/// Per-read options.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use optimist_engine::ReadOptions;
///
/// let options = ReadOptions::new()
///     .stale_time(Duration::from_secs(30))
///     .keep_previous_data(true);
/// assert!(!options.force);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Overrides the configured staleness policy.
    pub stale_time: Option<Duration>,
    /// Overrides the configured keep-previous-data flag.
    pub keep_previous_data: Option<bool>,
    /// Starts a new fetch even if the entry is fresh or a fetch is in flight.
    pub force: bool,
    /// Drops previous data when the fetch fails.
    pub discard_on_error: bool,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = Some(stale_time);
        self
    }

    pub fn keep_previous_data(mut self, keep: bool) -> Self {
        self.keep_previous_data = Some(keep);
        self
    }

    /// Supersedes any in-flight fetch for the key.
    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn discard_on_error(mut self) -> Self {
        self.discard_on_error = true;
        self
    }
}

/// What the UI should render for a key right now.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryView {
    pub state: EntryState,
    pub data: Option<Value>,
    pub error: Option<FetchError>,
    /// `data` belongs to the most recently settled key of the same domain
    /// and kind (keep-previous-data).
    pub is_placeholder: bool,
    /// `data` is older than the staleness policy allows.
    pub is_stale: bool,
}

impl QueryView {
    /// Returns true while the key has no data of its own.
    pub fn is_loading(&self) -> bool {
        self.is_placeholder || (self.data.is_none() && self.state == EntryState::Fetching)
    }
}

struct InFlight {
    seq: u64,
    future: SharedFetch,
}

enum ReadStart {
    Cached(Value),
    Pending(SharedFetch),
}

struct ExecutorInner {
    store: CacheStore,
    config: Arc<EngineConfig>,
    metrics: EngineMetrics,
    next_seq: AtomicU64,
    in_flight: Mutex<HashMap<CacheKey, InFlight>>,
    active: Mutex<IndexMap<CacheKey, Fetcher>>,
    last_settled: Mutex<HashMap<(Domain, KeyKind), CacheKey>>,
}

impl ExecutorInner {
    fn settle(
        &self,
        key: &CacheKey,
        seq: u64,
        revision: u64,
        result: &Result<Value, FetchError>,
        discard_on_error: bool,
    ) {
        let written = self
            .store
            .complete_fetch(key, revision, result, discard_on_error);

        let mut in_flight = self.in_flight.lock();
        if !in_flight.get(key).is_some_and(|f| f.seq == seq) {
            debug!(key = %key, seq = seq, "Superseded fetch result discarded");
            return;
        }
        in_flight.remove(key);

        if !written {
            // La entry cambio mientras el fetch estaba en curso
            self.store.release_fetch(key);
            debug!(key = %key, seq = seq, "Fetch result discarded, entry changed while fetching");
            return;
        }

        match result {
            Ok(_) => {
                self.last_settled
                    .lock()
                    .insert((key.domain().clone(), key.kind()), key.clone());
                debug!(key = %key, seq = seq, "Fetch settled");
            },
            Err(error) => {
                debug!(key = %key, seq = seq, error = %error, "Fetch failed");
            },
        }
    }
}

/// Resolves reads against the cache store.
///
/// Cloning is cheap and yields a handle to the same executor.
#[derive(Clone)]
pub struct QueryExecutor {
    inner: Arc<ExecutorInner>,
}

impl QueryExecutor {
    pub fn new(store: CacheStore, config: Arc<EngineConfig>, metrics: EngineMetrics) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                store,
                config,
                metrics,
                next_seq: AtomicU64::new(0),
                in_flight: Mutex::new(HashMap::new()),
                active: Mutex::new(IndexMap::new()),
                last_settled: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Returns the store this executor reads from.
    pub fn store(&self) -> &CacheStore {
        &self.inner.store
    }

    /// Resolves `key`.
    ///
    /// A fresh entry is returned without calling `fetch`. Otherwise the read
    /// joins the in-flight fetch for the key, or starts one. On success the
    /// result is stored with `set`; on failure with `set_error`, and every
    /// waiter receives the same error.
    pub async fn read<F, Fut>(
        &self,
        key: CacheKey,
        fetch: F,
        options: ReadOptions,
    ) -> Result<Value, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        match self.start_read(key, fetch, &options) {
            ReadStart::Cached(data) => Ok(data),
            ReadStart::Pending(fetch) => fetch.await,
        }
    }

    /// Like [`read`](Self::read), decoding the result into `T`.
    pub async fn read_as<T, F, Fut>(
        &self,
        key: CacheKey,
        fetch: F,
        options: ReadOptions,
    ) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        let data = self.read(key, fetch, options).await?;
        Ok(record::decode(&data)?)
    }

    /// Starts a read without waiting for it. Returns true if a fetch was
    /// started or joined.
    pub fn prefetch<F, Fut>(&self, key: CacheKey, fetch: F, options: ReadOptions) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        matches!(self.start_read(key, fetch, &options), ReadStart::Pending(_))
    }

    /// Returns what should be rendered for `key` without fetching.
    ///
    /// With keep-previous-data, a key without data of its own shows the data
    /// of the most recently settled key of the same domain and kind.
    pub fn view(&self, key: &CacheKey, options: &ReadOptions) -> QueryView {
        let stale_time = self.stale_time(key, options);
        let keep = options
            .keep_previous_data
            .unwrap_or(self.inner.config.keep_previous_data);

        let entry = self.inner.store.get(key);
        if let Some(entry) = &entry
            && let Some(data) = entry.data()
        {
            return QueryView {
                state: entry.state(),
                data: Some(data.clone()),
                error: entry.error().cloned(),
                is_placeholder: false,
                is_stale: entry.state() != EntryState::Fetching
                    && !entry.is_fresh_within(stale_time),
            };
        }

        let placeholder = if keep {
            let previous = self
                .inner
                .last_settled
                .lock()
                .get(&(key.domain().clone(), key.kind()))
                .filter(|previous| *previous != key)
                .cloned();
            previous.and_then(|previous| self.inner.store.data(&previous))
        } else {
            None
        };

        QueryView {
            state: entry.as_ref().map_or(EntryState::Idle, |e| e.state()),
            error: entry.as_ref().and_then(|e| e.error().cloned()),
            is_placeholder: placeholder.is_some(),
            data: placeholder,
            is_stale: false,
        }
    }

    /// Registers the fetcher of an active query, used by background refetch.
    pub fn register<F, Fut>(&self, key: CacheKey, fetch: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        let fetcher: Fetcher = Arc::new(move || fetch().boxed());
        debug!(key = %key, "Active query registered");
        self.inner.active.lock().insert(key, fetcher);
    }

    /// Removes an active query. Returns true if it was registered.
    pub fn unregister(&self, key: &CacheKey) -> bool {
        self.inner.active.lock().shift_remove(key).is_some()
    }

    /// Returns true if a fetch for `key` is outstanding.
    pub fn is_fetching(&self, key: &CacheKey) -> bool {
        self.inner.in_flight.lock().contains_key(key)
    }

    /// Refetches every active query whose entry is stale, idle or gone, and
    /// waits for them. Keys with an outstanding fetch join it instead of
    /// starting another. Returns the number of keys refetched.
    pub async fn refetch_stale(&self) -> usize {
        let active: Vec<(CacheKey, Fetcher)> = self
            .inner
            .active
            .lock()
            .iter()
            .map(|(key, fetcher)| (key.clone(), fetcher.clone()))
            .collect();

        let mut pending = Vec::new();
        for (key, fetcher) in active {
            let needs_fetch = self
                .inner
                .store
                .get(&key)
                .is_none_or(|entry| matches!(entry.state(), EntryState::Stale | EntryState::Idle));
            if !needs_fetch {
                continue;
            }
            if let ReadStart::Pending(fetch) = self.start_read(key, move || fetcher(), &ReadOptions::new()) {
                pending.push(fetch);
            }
        }

        let count = pending.len();
        if count > 0 {
            debug!(count = count, "Refetching stale active queries");
        }
        join_all(pending).await;
        count
    }

    /// Forgets in-flight fetches, active queries and placeholders.
    /// Outstanding fetches still settle but can no longer write.
    pub fn clear(&self) {
        self.inner.in_flight.lock().clear();
        self.inner.active.lock().clear();
        self.inner.last_settled.lock().clear();
    }

    fn stale_time(&self, key: &CacheKey, options: &ReadOptions) -> Option<Duration> {
        options
            .stale_time
            .or_else(|| self.inner.config.stale_time_for(key.domain()))
    }

    fn start_read<F, Fut>(&self, key: CacheKey, fetch: F, options: &ReadOptions) -> ReadStart
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        let stale_time = self.stale_time(&key, options);

        if !options.force
            && let Some(entry) = self.inner.store.get(&key)
            && entry.is_fresh_within(stale_time)
            && let Some(data) = entry.data()
        {
            self.inner.metrics.record_hit();
            return ReadStart::Cached(data.clone());
        }

        let mut in_flight = self.inner.in_flight.lock();
        if !options.force
            && let Some(current) = in_flight.get(&key)
        {
            self.inner.metrics.record_deduplicated();
            debug!(key = %key, seq = current.seq, "Joined in-flight fetch");
            return ReadStart::Pending(current.future.clone());
        }

        self.inner.metrics.record_miss();
        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let revision = self.inner.store.begin_fetch(&key);
        debug!(key = %key, seq = seq, "Fetch started");

        let future = run_fetch(
            self.inner.clone(),
            key.clone(),
            seq,
            revision,
            options.discard_on_error,
            fetch(),
        )
        .boxed()
        .shared();

        in_flight.insert(
            key,
            InFlight {
                seq,
                future: future.clone(),
            },
        );
        drop(in_flight);

        tokio::spawn(future.clone().map(drop));
        ReadStart::Pending(future)
    }
}

async fn run_fetch<Fut>(
    inner: Arc<ExecutorInner>,
    key: CacheKey,
    seq: u64,
    revision: u64,
    discard_on_error: bool,
    fetch: Fut,
) -> Result<Value, FetchError>
where
    Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
{
    let started = Instant::now();
    inner.metrics.record_fetch(key.domain().as_str());

    let result = fetch.await;

    inner
        .metrics
        .record_fetch_duration(key.domain().as_str(), started.elapsed());
    inner.settle(&key, seq, revision, &result, discard_on_error);
    result
}
