//! Translation cache: in-memory store, in-flight deduplication, concurrency
//! gate and timeouts in front of a [`TranslationBackend`].
//!
//! Lookup order for a key:
//! 1. live store entry (resolved, or failed and not yet expired) is returned as is;
//! 2. an in-flight fetch for the key is awaited for at most `wait_timeout`;
//! 3. otherwise this caller starts the fetch: it is registered as pending,
//!    waits for a gate slot, and the backend call races `fetch_timeout`.
//!
//! Failures never reach callers. Errors and timeouts become a negative entry
//! that lapses after `negative_ttl`, so the key is retried later.
//!
//! The check of steps 1 and 2 and the registration of step 3 happen under one
//! lock, so two callers can never both start a fetch for the same key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backend::{StoreStats, TranslationBackend};
use crate::config::TranslationConfig;
use crate::deadline::{race, race_detached};
use crate::epoch::{CacheEpoch, EpochGuard};
use crate::gate::ConcurrencyGate;
use crate::media::{CacheKey, MediaTarget, Translatable};
use crate::metrics::{metric_names, MetricSummary, MetricsRegistry};
use crate::store::{Lookup, TranslationStore};

pub use crate::store::TranslationResult;

type SharedOutcome = Shared<BoxFuture<'static, Option<TranslationResult>>>;

struct PendingFetch {
    id: u64,
    outcome: SharedOutcome,
}

struct CacheState {
    store: TranslationStore,
    pending: HashMap<CacheKey, PendingFetch>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConcurrencyStats {
    pub active_count: usize,
    pub queue_length: usize,
    pub cache_size: usize,
    pub pending_count: usize,
}

/// How a backend call settled.
enum FetchOutcome {
    Resolved(Option<TranslationResult>),
    Failed,
}

enum Claim {
    Ready(Option<TranslationResult>),
    Borrowed(SharedOutcome),
    Started(SharedOutcome),
}

pub(crate) struct Inner<B> {
    backend: Arc<B>,
    pub(crate) config: TranslationConfig,
    gate: ConcurrencyGate,
    state: Mutex<CacheState>,
    epoch: CacheEpoch,
    next_fetch_id: AtomicU64,
    pub(crate) metrics: Arc<MetricsRegistry>,
}

/// Cheap-clone handle to one translation cache. Must be used inside a tokio
/// runtime: fetches and expiry timers run as spawned tasks.
pub struct TranslationCache<B> {
    pub(crate) inner: Arc<Inner<B>>,
}

impl<B> Clone for TranslationCache<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: TranslationBackend> TranslationCache<B> {
    pub fn new(backend: B, config: TranslationConfig) -> Self {
        Self::with_backend(Arc::new(backend), config)
    }

    pub fn with_backend(backend: Arc<B>, config: TranslationConfig) -> Self {
        let config = config.normalized();
        Self {
            inner: Arc::new(Inner {
                backend,
                gate: ConcurrencyGate::new(config.max_concurrent),
                state: Mutex::new(CacheState {
                    store: TranslationStore::new(config.negative_ttl()),
                    pending: HashMap::new(),
                }),
                epoch: CacheEpoch::new(),
                next_fetch_id: AtomicU64::new(1),
                metrics: Arc::new(MetricsRegistry::new()),
                config,
            }),
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.inner.config
    }

    /// Translation for `target`, or `None` when there is none, the backend
    /// failed, or a borrowed fetch took too long.
    pub async fn get_translation(&self, target: MediaTarget) -> Option<TranslationResult> {
        let key = target.cache_key();
        match self.inner.claim(&key, target) {
            Claim::Ready(value) => value,
            Claim::Started(outcome) => outcome.await,
            Claim::Borrowed(outcome) => {
                debug!(key = %key, "awaiting in-flight fetch");
                let span = self.inner.metrics.span(metric_names::BORROWED_WAIT);
                let wait_timeout = self.inner.config.wait_timeout();
                match race(wait_timeout, outcome).await {
                    Ok(value) => {
                        span.finish();
                        value
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "in-flight fetch too slow, returning no data");
                        None
                    }
                }
            }
        }
    }

    /// Non-blocking lookup for render paths. A live store entry is delivered
    /// synchronously and `None` is returned; otherwise the lookup runs on a
    /// spawned task whose handle is returned. Entities without a Trakt id are
    /// ignored and the callback is never invoked.
    pub fn load_translation_async<E, F>(&self, entity: &E, callback: F) -> Option<JoinHandle<()>>
    where
        E: Translatable + ?Sized,
        F: FnOnce(Option<TranslationResult>) + Send + 'static,
    {
        let target = entity.media_target()?;
        let key = target.cache_key();

        let cached = {
            let mut state = self.inner.state.lock();
            match state.store.lookup(&key, Instant::now()) {
                Lookup::Hit(value) => Some(value),
                Lookup::Absent => None,
            }
        };
        if let Some(value) = cached {
            callback(value);
            return None;
        }

        let cache = self.clone();
        Some(tokio::spawn(async move {
            let value = cache.get_translation(target).await;
            callback(value);
        }))
    }

    /// Empty the store and forget in-flight fetches. Running fetches are not
    /// cancelled, but their results are no longer written anywhere.
    pub fn clear_cache(&self) {
        let mut state = self.inner.state.lock();
        let dropped = state.store.len();
        let in_flight = state.pending.len();
        state.store.clear();
        state.pending.clear();
        let epoch = self.inner.epoch.advance();
        info!(dropped, in_flight, epoch, "translation cache cleared");
    }

    pub fn concurrency_stats(&self) -> ConcurrencyStats {
        let (cache_size, pending_count) = {
            let state = self.inner.state.lock();
            (state.store.len(), state.pending.len())
        };
        ConcurrencyStats {
            active_count: self.inner.gate.active_count(),
            queue_length: self.inner.gate.queue_length(),
            cache_size,
            pending_count,
        }
    }

    /// Clamp to 1..=10 and apply to the gate. Returns the effective limit.
    pub fn set_max_concurrency(&self, max_concurrent: usize) -> usize {
        let effective = self.inner.gate.set_max_concurrent(max_concurrent);
        info!(requested = max_concurrent, effective, "translation concurrency updated");
        effective
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.gate.max_concurrent()
    }

    /// Ask the backend to drop its expired rows. Failures read as zero.
    pub async fn clear_expired_translations(&self) -> u32 {
        match self.inner.backend.clear_expired().await {
            Ok(count) => {
                info!(count, "expired translations cleared");
                count
            }
            Err(e) => {
                warn!(error = %e, "clearing expired translations failed");
                0
            }
        }
    }

    /// Backend storage counters. Failures read as zeros.
    pub async fn translation_store_stats(&self) -> StoreStats {
        self.inner.backend.store_stats().await.unwrap_or_else(|e| {
            warn!(error = %e, "reading translation store stats failed");
            StoreStats::default()
        })
    }

    pub fn metrics_summary(&self) -> HashMap<String, MetricSummary> {
        self.inner.metrics.summary()
    }

    /// Whether `target` has a live store entry (resolved or unexpired failure).
    pub fn is_cached(&self, target: MediaTarget) -> bool {
        self.inner
            .state
            .lock()
            .store
            .contains_live(&target.cache_key(), Instant::now())
    }
}

impl<B: TranslationBackend> Inner<B> {
    /// Check store, then pending, then register a new fetch, atomically.
    fn claim(self: &Arc<Self>, key: &CacheKey, target: MediaTarget) -> Claim {
        let mut state = self.state.lock();
        if let Lookup::Hit(value) = state.store.lookup(key, Instant::now()) {
            return Claim::Ready(value);
        }
        if let Some(pending) = state.pending.get(key) {
            return Claim::Borrowed(pending.outcome.clone());
        }

        let id = self.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let guard = SettleGuard {
            inner: Arc::downgrade(self),
            key: key.clone(),
            fetch_id: id,
            settled: false,
        };
        let handle = tokio::spawn(Arc::clone(self).drive_fetch(
            target,
            self.epoch.guard(),
            guard,
        ));
        let outcome: SharedOutcome = async move {
            match handle.await {
                Ok(value) => value,
                Err(e) => {
                    error!(error = %e, "translation fetch task failed");
                    None
                }
            }
        }
        .boxed()
        .shared();

        state.pending.insert(
            key.clone(),
            PendingFetch {
                id,
                outcome: outcome.clone(),
            },
        );
        debug!(key = %key, fetch_id = id, "translation fetch started");
        Claim::Started(outcome)
    }

    /// Runs one fetch for a claimed key. The gate slot is released as soon as
    /// the fetch timeout fires, while the abandoned backend call finishes in
    /// the background, so live backend calls can briefly exceed the limit.
    async fn drive_fetch(
        self: Arc<Self>,
        target: MediaTarget,
        epoch: EpochGuard,
        mut guard: SettleGuard<B>,
    ) -> Option<TranslationResult> {
        let gate_span = self.metrics.span(metric_names::GATE_WAIT);
        let permit = self.gate.acquire().await;
        gate_span.finish();

        let fetch_span = self.metrics.span(metric_names::BACKEND_FETCH);
        let backend = Arc::clone(&self.backend);
        let fetch_timeout = self.config.fetch_timeout();
        let result =
            race_detached(fetch_timeout, async move { backend.fetch_translation(target).await })
                .await;
        drop(permit);
        fetch_span.finish();

        let outcome = match result {
            Ok(Ok(data)) => FetchOutcome::Resolved(data.map(TranslationResult::from)),
            Ok(Err(e)) => {
                warn!(%target, error = %e, "translation backend failed");
                FetchOutcome::Failed
            }
            Err(e) => {
                warn!(%target, error = %e, "translation fetch abandoned");
                FetchOutcome::Failed
            }
        };

        guard.settled = true;
        self.settle(&guard.key, guard.fetch_id, &epoch, outcome)
    }

    /// Clear the pending entry, then write the outcome if this fetch still owns
    /// the key. A fetch that lost ownership (cache cleared, or replaced by a
    /// newer fetch) only reports its value to its own waiters.
    fn settle(
        self: &Arc<Self>,
        key: &CacheKey,
        fetch_id: u64,
        epoch: &EpochGuard,
        outcome: FetchOutcome,
    ) -> Option<TranslationResult> {
        let mut state = self.state.lock();
        let owns_key = state.pending.get(key).is_some_and(|p| p.id == fetch_id);
        if owns_key {
            state.pending.remove(key);
        }
        if !owns_key || !self.epoch.is_current(epoch) {
            debug!(key = %key, fetch_id, "discarding stale translation result");
            return match outcome {
                FetchOutcome::Resolved(value) => value,
                FetchOutcome::Failed => None,
            };
        }

        match outcome {
            FetchOutcome::Resolved(value) => {
                state.store.resolve(key.clone(), value.clone());
                value
            }
            FetchOutcome::Failed => {
                let expires_at = state.store.fail(key.clone(), Instant::now());
                self.schedule_expiry(key.clone(), expires_at, epoch.clone());
                None
            }
        }
    }

    /// Drop the negative entry once its TTL runs out. Cancelled with the epoch.
    fn schedule_expiry(self: &Arc<Self>, key: CacheKey, expires_at: Instant, epoch: EpochGuard) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(expires_at) => {}
                _ = epoch.token().cancelled() => return,
            }
            if let Some(inner) = weak.upgrade() {
                if inner.state.lock().store.expire(&key, expires_at) {
                    debug!(key = %key, "negative translation entry expired");
                }
            }
        });
    }
}

/// Removes the pending entry if the fetch task ends without settling
/// (panic or runtime shutdown), so the key is not blocked forever.
struct SettleGuard<B> {
    inner: Weak<Inner<B>>,
    key: CacheKey,
    fetch_id: u64,
    settled: bool,
}

impl<B> Drop for SettleGuard<B> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(inner) = self.inner.upgrade() {
            let mut state = inner.state.lock();
            if state.pending.get(&self.key).is_some_and(|p| p.id == self.fetch_id) {
                state.pending.remove(&self.key);
            }
        }
    }
}
