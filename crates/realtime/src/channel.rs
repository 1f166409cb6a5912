use crate::client::{ConnectionState, RealtimeClient};
use crate::error::RealtimeError;
use crate::message::{ChannelEvent, Payload};
use log::{debug, trace};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

pub(crate) type CallbackFn = Box<dyn Fn(&Payload) + Send + Sync>;
pub(crate) type StateCallbackFn = Box<dyn Fn(ConnectionState) + Send + Sync>;

struct EventHandler {
    event: ChannelEvent,
    callback: CallbackFn,
}

/// Handlers registered on one client, keyed by auction channel.
///
/// Dispatch holds the read lock while callbacks run and deregistration takes
/// the write lock, so once a `Subscription` has been dropped its callback can
/// no longer be running or be called again. Callbacks must therefore not drop
/// subscriptions of the same client themselves.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    channels: RwLock<HashMap<String, HashMap<String, EventHandler>>>,
    lifecycle: RwLock<HashMap<String, StateCallbackFn>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl HandlerRegistry {
    fn add_event(&self, auction_id: &str, event: ChannelEvent, callback: CallbackFn) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        write(&self.channels)
            .entry(auction_id.to_string())
            .or_default()
            .insert(id.clone(), EventHandler { event, callback });
        id
    }

    fn add_state(&self, callback: StateCallbackFn) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        write(&self.lifecycle).insert(id.clone(), callback);
        id
    }

    fn remove(&self, id: &str, target: &Target) {
        match target {
            Target::Channel(auction_id) => {
                let mut channels = write(&self.channels);
                if let Some(handlers) = channels.get_mut(auction_id) {
                    handlers.remove(id);
                    if handlers.is_empty() {
                        channels.remove(auction_id);
                    }
                }
            }
            Target::Lifecycle => {
                write(&self.lifecycle).remove(id);
            }
        }
    }

    /// Calls every handler registered for the payload's auction and event.
    /// Returns how many handlers ran.
    pub(crate) fn dispatch(&self, payload: &Payload) -> usize {
        let channels = read(&self.channels);
        let Some(handlers) = channels.get(&payload.auction_id) else {
            trace!("No handlers for auction {}", payload.auction_id);
            return 0;
        };
        let mut called = 0;
        for handler in handlers.values().filter(|h| h.event == payload.event) {
            (handler.callback)(payload);
            called += 1;
        }
        called
    }

    pub(crate) fn dispatch_state(&self, state: ConnectionState) {
        let lifecycle = read(&self.lifecycle);
        trace!("Notifying {} lifecycle handlers of {:?}", lifecycle.len(), state);
        for callback in lifecycle.values() {
            (callback)(state);
        }
    }

    pub(crate) fn handler_count(&self, auction_id: &str) -> usize {
        read(&self.channels).get(auction_id).map_or(0, HashMap::len)
    }
}

enum Target {
    Channel(String),
    Lifecycle,
}

/// アクティブな購読を表す
///
/// Dropping the value detaches the handler synchronously.
pub struct Subscription {
    id: String,
    target: Target,
    registry: Weak<HandlerRegistry>,
}

impl Subscription {
    pub(crate) fn state(registry: &Arc<HandlerRegistry>, callback: StateCallbackFn) -> Self {
        let id = registry.add_state(callback);
        Self {
            id,
            target: Target::Lifecycle,
            registry: Arc::downgrade(registry),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The auction channel this handler listens on, `None` for lifecycle handlers.
    pub fn auction_id(&self) -> Option<&str> {
        match &self.target {
            Target::Channel(auction_id) => Some(auction_id),
            Target::Lifecycle => None,
        }
    }

    /// Detaches the handler. Same as dropping the subscription.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.id, &self.target);
            debug!("Subscription {} detached", self.id);
        }
    }
}

/// オークションチャンネルの購読設定ビルダー
///
/// Registering handlers does not join the channel on the server; call
/// [`RealtimeClient::join`] for that.
pub struct ChannelBuilder<'a> {
    client: &'a RealtimeClient,
    auction_id: String,
    callbacks: Vec<(ChannelEvent, CallbackFn)>,
}

impl<'a> ChannelBuilder<'a> {
    pub(crate) fn new(client: &'a RealtimeClient, auction_id: &str) -> Self {
        Self {
            client,
            auction_id: auction_id.to_string(),
            callbacks: Vec::new(),
        }
    }

    /// イベントのコールバックを登録
    pub fn on<F>(mut self, event: ChannelEvent, callback: F) -> Self
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.callbacks.push((event, Box::new(callback)));
        self
    }

    /// Registers every callback and returns one subscription per callback.
    pub fn subscribe(self) -> Result<Vec<Subscription>, RealtimeError> {
        if self.auction_id.is_empty() {
            return Err(RealtimeError::ChannelError(
                "auction id must not be empty".to_string(),
            ));
        }
        if let Some((event, _)) = self.callbacks.iter().find(|(e, _)| !e.is_auction_event()) {
            return Err(RealtimeError::ChannelError(format!(
                "{} is not an auction channel event",
                event
            )));
        }

        let registry = self.client.registry();
        let subscriptions = self
            .callbacks
            .into_iter()
            .map(|(event, callback)| {
                let id = registry.add_event(&self.auction_id, event, callback);
                Subscription {
                    id,
                    target: Target::Channel(self.auction_id.clone()),
                    registry: Arc::downgrade(registry),
                }
            })
            .collect::<Vec<_>>();

        debug!(
            "Registered {} handlers on auction channel {}",
            subscriptions.len(),
            self.auction_id
        );
        Ok(subscriptions)
    }
}
