//! Cache of server views, keyed by [`QueryKey`]
//!
//! Reads go through [`ViewCache::get`], which serves a value while it is
//! fresh and otherwise fetches it, sharing one request between concurrent
//! readers of the same key. Nothing but a fetch result is ever stored:
//! realtime events only invalidate.

mod key;

use futures::future::{BoxFuture, FutureExt, Shared};
use log::{debug, trace, warn};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::error::{Error, Result};
use crate::notify::{Notification, Notifier};

pub use key::*;

type Value = Arc<dyn Any + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, Result<Value>>>;

struct Entry {
    value: Option<Value>,
    fetched_at: Option<Instant>,
    stale: bool,
    /// Bumped by every invalidation; only a fetch started in the current
    /// generation can make the entry fresh.
    generation: u64,
    /// Generation of the fetch that stored `value`.
    value_generation: u64,
    in_flight: Option<InFlight>,
}

impl Entry {
    fn new(generation: u64) -> Self {
        Self {
            value: None,
            fetched_at: None,
            stale: true,
            generation,
            value_generation: generation,
            in_flight: None,
        }
    }

    fn is_fresh(&self, staleness: Duration) -> bool {
        !self.stale
            && self.value.is_some()
            && self
                .fetched_at
                .map_or(false, |fetched_at| fetched_at.elapsed() < staleness)
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<QueryKey, Entry>,
    next_generation: u64,
}

impl State {
    fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }
}

struct Inner {
    state: Mutex<State>,
    staleness: Duration,
    events: broadcast::Sender<CacheEvent>,
    notifier: Arc<dyn Notifier>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Shared, cloneable handle to the view cache
#[derive(Clone)]
pub struct ViewCache {
    inner: Arc<Inner>,
}

impl ViewCache {
    pub fn new(staleness: Duration, notifier: Arc<dyn Notifier>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                staleness,
                events,
                notifier,
            }),
        }
    }

    pub fn staleness(&self) -> Duration {
        self.inner.staleness
    }

    /// Returns the cached value for `key` while it is fresh; otherwise runs
    /// `fetch` (or joins the fetch already running for the key).
    ///
    /// A failed fetch keeps the previous value, notifies the user and
    /// returns the error to every caller waiting on it.
    pub async fn get<T, F, Fut>(&self, key: QueryKey, fetch: F) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let in_flight = {
            let mut state = lock(&self.inner.state);
            let generation = match state.entries.get(&key) {
                Some(entry) => entry.generation,
                None => {
                    let generation = state.next_generation();
                    state.entries.insert(key.clone(), Entry::new(generation));
                    generation
                }
            };
            let entry = match state.entries.get_mut(&key) {
                Some(entry) => entry,
                None => return Err(Error::general(format!("cache entry {} vanished", key))),
            };

            let cached = entry
                .is_fresh(self.inner.staleness)
                .then(|| entry.value.clone())
                .flatten()
                .and_then(|value| value.downcast::<T>().ok());
            if let Some(value) = cached {
                trace!("Cache hit for {}", key);
                return Ok(value);
            }

            match entry.in_flight.clone() {
                Some(in_flight) => {
                    trace!("Joining fetch in flight for {}", key);
                    in_flight
                }
                None => {
                    debug!("Fetching {}", key);
                    let in_flight = Self::start(
                        Arc::downgrade(&self.inner),
                        key.clone(),
                        generation,
                        fetch(),
                    );
                    entry.in_flight = Some(in_flight.clone());
                    in_flight
                }
            }
        };

        let value = in_flight.await?;
        value
            .downcast::<T>()
            .map_err(|_| Error::general(format!("cached value for {} has another type", key)))
    }

    fn start<T, Fut>(inner: Weak<Inner>, key: QueryKey, generation: u64, fetch: Fut) -> InFlight
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        async move {
            let result = fetch.await.map(|value| Arc::new(value) as Value);
            match inner.upgrade() {
                Some(inner) => inner.complete(&key, generation, result),
                None => result,
            }
        }
        .boxed()
        .shared()
    }

    /// The last stored value for `key`, fresh or not.
    pub fn peek<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let state = lock(&self.inner.state);
        let value = state.entries.get(key)?.value.clone()?;
        value.downcast::<T>().ok()
    }

    /// Whether `get` would currently serve `key` without fetching.
    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        let state = lock(&self.inner.state);
        state
            .entries
            .get(key)
            .map_or(false, |entry| entry.is_fresh(self.inner.staleness))
    }

    /// Marks `key` stale so the next read fetches it again.
    ///
    /// A fetch already running for the key may still store its result but
    /// can no longer make the entry fresh.
    pub fn invalidate(&self, key: &QueryKey) {
        {
            let mut state = lock(&self.inner.state);
            let generation = state.next_generation();
            if let Some(entry) = state.entries.get_mut(key) {
                entry.stale = true;
                entry.generation = generation;
                entry.in_flight = None;
            }
        }
        debug!("Invalidated {}", key);
        let _ = self.inner.events.send(CacheEvent::Invalidated(key.clone()));
    }

    /// Invalidates every cached key of a resource kind, e.g. `"auctions"`.
    pub fn invalidate_kind(&self, kind: &str) {
        let keys: Vec<QueryKey> = lock(&self.inner.state)
            .entries
            .keys()
            .filter(|key| key.kind() == kind)
            .cloned()
            .collect();
        for key in &keys {
            self.invalidate(key);
        }
    }

    /// Drops every entry. Fetches still running are discarded when they
    /// complete.
    pub fn clear(&self) {
        let keys: Vec<QueryKey> = {
            let mut state = lock(&self.inner.state);
            state.entries.drain().map(|(key, _)| key).collect()
        };
        debug!("Cache cleared ({} entries)", keys.len());
        for key in keys {
            let _ = self.inner.events.send(CacheEvent::Invalidated(key));
        }
    }

    /// Receiver of invalidations and updates, for consumers that re-read
    /// when something changes.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }
}

impl Inner {
    fn complete(&self, key: &QueryKey, generation: u64, result: Result<Value>) -> Result<Value> {
        let stored = {
            let mut state = lock(&self.state);
            match state.entries.get_mut(key) {
                None => {
                    debug!("Dropping result for {}, cache was cleared", key);
                    false
                }
                Some(entry) => {
                    let current = entry.generation == generation;
                    if current {
                        entry.in_flight = None;
                    }
                    match &result {
                        Ok(value) if generation >= entry.value_generation => {
                            entry.value = Some(value.clone());
                            entry.value_generation = generation;
                            if current {
                                entry.fetched_at = Some(Instant::now());
                                entry.stale = false;
                            } else {
                                debug!("{} was invalidated during the fetch, keeping it stale", key);
                            }
                            true
                        }
                        Ok(_) => {
                            debug!("Dropping outdated result for {}", key);
                            false
                        }
                        Err(_) => false,
                    }
                }
            }
        };

        match &result {
            Ok(_) if stored => {
                let _ = self.events.send(CacheEvent::Updated(key.clone()));
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to load {}: {}", key, e);
                self.notifier.notify(Notification::error(
                    &format!("Failed to Load {}", key.label()),
                    e.user_message(&format!("Unable to fetch {}.", key.label().to_lowercase())),
                ));
            }
        }
        result
    }
}
