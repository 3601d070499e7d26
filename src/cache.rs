//! Keyed token cache with singleflight fetches.
//!
//! Each key holds either a ready entry or a fetch in flight. A fetch runs as
//! its own task and every concurrent caller for that key awaits the same
//! shared result, so the producer runs at most once per fetch no matter how
//! many callers pile up behind it. The map lock is only held to inspect or
//! swap a slot, never across an await, and the producer is never invoked
//! under it.

use crate::error::{Error, Result};
use crate::token::UserAccess;
use chrono::{DateTime, Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Value that can be stored in a [`TokenCache`]
pub trait CacheEntry: Clone + Send + Sync + 'static {
    /// When the entry stops being valid, if it ever does
    fn expires_at(&self) -> Option<DateTime<Utc>>;
}

impl CacheEntry for Arc<UserAccess> {
    fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.token.expires_at
    }
}

/// Cache key derived from the identity endpoint and the user identifier.
/// Equal inputs always produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    identity_endpoint: String,
    user: String,
}

impl CacheKey {
    pub fn new(identity_endpoint: &str, user: &str) -> Self {
        CacheKey {
            identity_endpoint: identity_endpoint.trim_end_matches('/').to_string(),
            user: user.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.identity_endpoint)
    }
}

type SharedFetch<T> = Shared<BoxFuture<'static, std::result::Result<T, Arc<Error>>>>;
type SlotMap<T> = Arc<Mutex<HashMap<CacheKey, Slot<T>>>>;

enum Slot<T> {
    Ready { entry: T, fetched_at: DateTime<Utc> },
    Pending { generation: u64, fetch: SharedFetch<T> },
}

/// Token cache keyed by [`CacheKey`]
pub struct TokenCache<T> {
    slots: SlotMap<T>,
    next_generation: AtomicU64,
    refresh_margin: Duration,
}

impl<T: CacheEntry> TokenCache<T> {
    /// Create an empty cache. Entries expiring within `refresh_margin` are
    /// treated as already expired; for entries issued with a shorter lifetime
    /// the margin shrinks to half of that lifetime.
    pub fn new(refresh_margin: std::time::Duration) -> Self {
        TokenCache {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            refresh_margin: Duration::from_std(refresh_margin).unwrap_or_else(|_| Duration::zero()),
        }
    }

    /// Get the entry for `key`, running `producer` when there is no live entry
    /// or when `force_refresh` is set.
    ///
    /// A caller that finds a fetch already in flight joins it instead of
    /// starting another one, forced or not: that fetch began after whatever
    /// entry the caller wants replaced. A failed (or panicking) fetch reaches
    /// every waiter as [`Error::TokenFetch`] and leaves the key empty.
    /// Cancelling only stops this caller from waiting; the fetch keeps going
    /// for the others.
    pub async fn get<F, Fut>(
        &self,
        key: &CacheKey,
        producer: F,
        force_refresh: bool,
        cancel: &CancellationToken,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let (fetch, start) = {
            let mut slots = self.slots.lock();

            let in_flight = match slots.get(key) {
                Some(Slot::Ready { entry, fetched_at })
                    if !force_refresh && !self.is_stale(entry, *fetched_at, Utc::now()) =>
                {
                    debug!(key = %key, "token cache hit");
                    return Ok(entry.clone());
                }
                Some(Slot::Pending { fetch, .. }) => Some(fetch.clone()),
                _ => None,
            };

            match in_flight {
                Some(fetch) => {
                    debug!(key = %key, "joining in-flight token fetch");
                    (fetch, None)
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    debug!(key = %key, force_refresh, generation, "starting token fetch");
                    let (fetch, start) = self.spawn_fetch::<Fut>(key.clone(), generation);
                    slots.insert(
                        key.clone(),
                        Slot::Pending {
                            generation,
                            fetch: fetch.clone(),
                        },
                    );
                    (fetch, Some(start))
                }
            }
        };

        // the slot is reserved; build the producer future outside the lock
        if let Some(start) = start {
            let _ = start.send(producer());
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Error::Cancelled),
            result = fetch => result.map_err(Error::TokenFetch),
        }
    }

    /// Drop whatever is stored for `key`. A fetch already in flight still
    /// completes for its waiters but its result is not stored.
    pub fn invalidate(&self, key: &CacheKey) {
        self.slots.lock().remove(key);
    }

    /// Number of keys holding an entry or a fetch in flight
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Check whether the cache holds nothing
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_stale(&self, entry: &T, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match entry.expires_at() {
            Some(expires_at) => {
                let margin = self
                    .refresh_margin
                    .min((expires_at - fetched_at) / 2)
                    .max(Duration::zero());
                expires_at <= now + margin
            }
            None => false,
        }
    }

    /// Spawn the task for one fetch. The producer future is handed over
    /// through the returned sender once the slot has been reserved.
    fn spawn_fetch<Fut>(&self, key: CacheKey, generation: u64) -> (SharedFetch<T>, oneshot::Sender<Fut>)
    where
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (start, producer) = oneshot::channel::<Fut>();
        let task_slots = Arc::clone(&self.slots);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let result = match producer.await {
                Ok(producer) => AssertUnwindSafe(producer)
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(Error::Other(format!(
                            "token producer panicked: {}",
                            panic_message(panic.as_ref())
                        )))
                    }),
                Err(_) => Err(Error::Other("token producer was never started".to_string())),
            }
            .map_err(Arc::new);

            settle(&task_slots, &task_key, generation, &result);
            result
        });

        let slots = Arc::clone(&self.slots);
        let fetch = async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let result = Err(Arc::new(Error::Other(format!("token fetch task failed: {}", e))));
                    settle(&slots, &key, generation, &result);
                    result
                }
            }
        }
        .boxed()
        .shared();

        (fetch, start)
    }
}

/// Store the outcome of fetch `generation`, unless the slot has since been
/// invalidated or taken over by a newer fetch.
fn settle<T: CacheEntry>(
    slots: &SlotMap<T>,
    key: &CacheKey,
    generation: u64,
    result: &std::result::Result<T, Arc<Error>>,
) {
    let mut slots = slots.lock();
    let current = matches!(
        slots.get(key),
        Some(Slot::Pending { generation: g, .. }) if *g == generation
    );
    if !current {
        return;
    }

    match result {
        Ok(entry) => {
            slots.insert(
                key.clone(),
                Slot::Ready {
                    entry: entry.clone(),
                    fetched_at: Utc::now(),
                },
            );
        }
        Err(e) => {
            warn!(key = %key, error = %e, "token fetch failed");
            slots.remove(key);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

impl<T: CacheEntry> Default for TokenCache<T> {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(60))
    }
}

impl<T> fmt::Debug for TokenCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCache")
            .field("entries", &self.slots.lock().len())
            .field("refresh_margin", &self.refresh_margin)
            .finish()
    }
}
