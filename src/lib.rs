// src/lib.rs
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, warn};
use thiserror::Error;

pub mod cache;
pub mod flag;
pub mod scheduler;
pub mod transport;

pub use crate::flag::{FlagEntry, FlagSet};
pub use crate::transport::RequestDecorator;

use crate::cache::{Commit, FlagCache};
use crate::scheduler::RefreshScheduler;
use crate::transport::Transport;

const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_millis(30_000);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum FlagError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status code: {0}")]
    Api(reqwest::StatusCode),

    #[error("malformed flag payload: {0}")]
    Decode(String),

    #[error("request decoration failed: {0}")]
    Decoration(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Where the currently served flags came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    /// Serving the fallback set; no refresh has committed yet.
    Seeded,
    /// Serving remote data.
    Live,
    /// Serving the fallback set after a failed refresh.
    Degraded,
}

struct ResolverInner {
    transport: Transport,
    cache: FlagCache,
    fallback: FlagSet,
    state: RwLock<ResolverState>,
    next_generation: AtomicU64,
    change_count: AtomicU64,
    disposed: AtomicBool,
}

/// The consumer-facing façade: owns the cache, the transport and the
/// background refresh task.
///
/// `get` never blocks on network I/O and never fails; it answers from
/// whatever the cache currently holds (remote data, or the fallback
/// before the first refresh and after a failed one).
pub struct Resolver {
    inner: Arc<ResolverInner>,
    scheduler: RefreshScheduler,
}

impl Resolver {
    pub fn builder() -> ResolverBuilder {
        ResolverBuilder::new()
    }

    /// Value of the first flag named `name`, or `""` if absent.
    /// Synchronous and safe to call while a refresh is in flight.
    pub fn get(&self, name: &str) -> String {
        self.inner
            .cache
            .read()
            .value_of(name)
            .unwrap_or_default()
            .to_string()
    }

    /// Snapshot of the whole current set.
    pub fn current_flag_set(&self) -> Arc<FlagSet> {
        self.inner.cache.read()
    }

    pub fn state(&self) -> ResolverState {
        *self.inner.state.read().unwrap()
    }

    /// Number of times a refresh actually replaced the served set.
    /// Identical consecutive fetches do not move this counter.
    pub fn change_count(&self) -> u64 {
        self.inner.change_count.load(Ordering::SeqCst)
    }

    /// Timestamp of the last successful remote fetch, `None` until one
    /// succeeds.
    pub fn last_fetched(&self) -> Option<DateTime<Utc>> {
        self.inner.cache.last_fetched()
    }

    /// Stops the refresh schedule. An in-flight fetch is not aborted;
    /// its result is dropped when it lands. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.scheduler.stop();
        debug!("resolver shut down");
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One refresh cycle. Runs on the scheduler task, which makes it the
/// sole writer of the cache.
async fn run_refresh(inner: Arc<ResolverInner>) {
    // Taken before the fetch starts, so overlapping cycles resolve by
    // start order: the later-started refresh wins.
    let generation = inner.next_generation.fetch_add(1, Ordering::SeqCst) + 1;

    match inner.transport.fetch().await {
        Ok(set) => {
            if inner.disposed.load(Ordering::SeqCst) {
                debug!("dropping refresh result that arrived after shutdown");
                return;
            }
            inner.cache.mark_fetched(Utc::now());
            match inner.cache.commit(generation, set) {
                Commit::Swapped => {
                    inner.change_count.fetch_add(1, Ordering::SeqCst);
                    *inner.state.write().unwrap() = ResolverState::Live;
                    debug!("committed remote flag set (generation {})", generation);
                }
                Commit::Unchanged => {
                    debug!("remote flag set unchanged");
                }
                Commit::Superseded => {
                    debug!("discarded out-of-order refresh (generation {})", generation);
                }
            }
        }
        Err(e) => {
            error!("flag refresh failed after retries: {}", e);
            if inner.disposed.load(Ordering::SeqCst) {
                return;
            }
            match inner.cache.commit(generation, inner.fallback.clone()) {
                Commit::Swapped => {
                    inner.change_count.fetch_add(1, Ordering::SeqCst);
                    *inner.state.write().unwrap() = ResolverState::Degraded;
                    warn!("serving fallback flags");
                }
                Commit::Unchanged => {
                    // Already on the fallback; stay Degraded without a
                    // repeat notification.
                    *inner.state.write().unwrap() = ResolverState::Degraded;
                }
                Commit::Superseded => {}
            }
        }
    }
}

pub struct ResolverBuilder {
    url: Option<String>,
    cache_timeout: Duration,
    retry_delay: Duration,
    fallback: Option<FlagSet>,
    decorator: Option<Arc<dyn RequestDecorator>>,
}

impl ResolverBuilder {
    fn new() -> Self {
        Self {
            url: None,
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            fallback: None,
            decorator: None,
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn with_cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    /// Base of the linear backoff between retry attempts.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_fallback(mut self, fallback: FlagSet) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_decorator(mut self, decorator: Arc<dyn RequestDecorator>) -> Self {
        self.decorator = Some(decorator);
        self
    }

    /// Seeds the cache with the fallback and starts the refresh
    /// schedule; the first fetch fires immediately. Requires a running
    /// tokio runtime.
    pub fn build(self) -> Result<Resolver, FlagError> {
        let url = self
            .url
            .ok_or_else(|| FlagError::Config("url is required".to_string()))?;
        let fallback = self
            .fallback
            .ok_or_else(|| FlagError::Config("fallback flag set is required".to_string()))?;

        let inner = Arc::new(ResolverInner {
            transport: Transport::new(url, self.decorator, self.retry_delay),
            cache: FlagCache::seeded_with(fallback.clone()),
            fallback,
            state: RwLock::new(ResolverState::Seeded),
            next_generation: AtomicU64::new(0),
            change_count: AtomicU64::new(0),
            disposed: AtomicBool::new(false),
        });

        // Refresh at half the cache timeout so a fresh fetch lands
        // before the cached set expires.
        let period = (self.cache_timeout / 2).max(Duration::from_millis(1));
        let task_inner = Arc::clone(&inner);
        let scheduler = RefreshScheduler::start(
            period,
            Arc::new(move || {
                let inner = Arc::clone(&task_inner);
                Box::pin(run_refresh(inner))
            }),
        );

        Ok(Resolver { inner, scheduler })
    }
}
