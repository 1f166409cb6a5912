//! Live view of one auction
//!
//! An [`AuctionLiveView`] joins the auction's channel for as long as it is
//! mounted and turns pushed events into cache invalidations, ephemeral
//! flags and notifications. Prices and bids always come from a re-fetch.

mod events;

use auction_live_realtime::{ChannelEvent, ConnectionState, Payload, RealtimeClient, Subscription};
use log::{debug, error, info, trace, warn};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::api::types::{Auction, Bid};
use crate::auth::SessionStore;
use crate::cache::{QueryKey, ViewCache};
use crate::error::{Error, Result};
use crate::format::{format_countdown, format_money};
use crate::notify::{Notification, Notifier};

pub use events::*;

/// Number of bids a view shows unless told otherwise
pub const DEFAULT_BIDS_LIMIT: u32 = 20;

/// Lifecycle of a view's channel membership
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Unsubscribed,
    /// Handlers are registered, waiting for the transport to connect
    Subscribing,
    Subscribed,
    /// The transport dropped; the join is re-sent when it is back
    Reconnecting,
}

#[derive(Debug)]
struct LiveState {
    subscription: SubscriptionState,
    viewer_count: u32,
    is_ending_soon: bool,
    ending_soon_warned: bool,
    online: bool,
}

/// What the registered callbacks share with the view
struct LiveHandler {
    auction_id: String,
    title: Option<String>,
    transport: RealtimeClient,
    cache: ViewCache,
    session: Arc<SessionStore>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<LiveState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LiveHandler {
    fn keys(&self) -> [QueryKey; 2] {
        [
            QueryKey::auction(&self.auction_id),
            QueryKey::auction_bids(&self.auction_id),
        ]
    }

    fn invalidate(&self) {
        for key in &self.keys() {
            self.cache.invalidate(key);
        }
    }

    fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.auction_id)
    }

    fn on_event(&self, payload: &Payload) {
        trace!("{} for auction {}: {}", payload.event, payload.auction_id, payload.data);
        let event = match LiveEvent::from_payload(payload) {
            Ok(event) => event,
            Err(e) => {
                error!("Malformed {} payload for auction {}: {}", payload.event, self.auction_id, e);
                // Still a sign the auction moved.
                if self.is_mounted() && payload.event.changes_auction() {
                    self.invalidate();
                }
                return;
            }
        };

        let warn_ending_soon = {
            let mut state = lock(&self.state);
            if state.subscription == SubscriptionState::Unsubscribed {
                trace!("Ignoring {} after unmount", payload.event);
                return;
            }
            match &event {
                LiveEvent::ViewerCount { count, .. } => {
                    state.viewer_count = *count;
                    false
                }
                LiveEvent::EndingSoon { .. } => {
                    state.is_ending_soon = true;
                    !std::mem::replace(&mut state.ending_soon_warned, true)
                }
                _ => false,
            }
        };

        match event {
            LiveEvent::NewBid {
                amount, bidder_name, ..
            } => {
                debug!("New bid of {} by {} on {}", amount, bidder_name, self.auction_id);
                self.invalidate();
                // An outbid user may have had funds returned.
                self.refresh_session();
            }
            LiveEvent::ViewerCount { .. } => {}
            LiveEvent::EndingSoon {
                seconds_remaining, ..
            } => {
                if warn_ending_soon {
                    let when = match seconds_remaining {
                        Some(seconds) => format!("ends in {}", format_countdown(seconds)),
                        None => "ends soon".to_string(),
                    };
                    self.notifier.notify(Notification::warning(
                        "Auction Ending Soon!",
                        format!(
                            "Auction \"{}\" {}! Place your final bids now.",
                            self.display_name(),
                            when
                        ),
                    ));
                }
            }
            LiveEvent::Sold {
                winner_name,
                final_price,
                ..
            } => {
                info!("Auction {} sold to {}", self.auction_id, winner_name);
                self.invalidate();
                self.notifier.notify(Notification::success(
                    "Auction Sold!",
                    format!("Item sold to {} for {}", winner_name, format_money(final_price)),
                ));
                self.refresh_session();
            }
            LiveEvent::Expired { .. } => {
                info!("Auction {} expired", self.auction_id);
                self.invalidate();
                self.notifier.notify(Notification::info(
                    "Auction Expired",
                    "The auction has ended without a sale.",
                ));
            }
        }
    }

    fn on_connection_state(&self, connection: ConnectionState) {
        match connection {
            ConnectionState::Connected => {
                {
                    let mut state = lock(&self.state);
                    if state.subscription == SubscriptionState::Unsubscribed {
                        return;
                    }
                    state.online = true;
                    state.subscription = SubscriptionState::Subscribed;
                }
                // Membership is not assumed to survive a reconnect.
                if let Err(e) = self.transport.rejoin(&self.auction_id) {
                    debug!("Rejoin of {} skipped: {}", self.auction_id, e);
                }
                // Events may have been missed while offline.
                self.invalidate();
                debug!("Auction {} subscribed", self.auction_id);
            }
            ConnectionState::Reconnecting | ConnectionState::Disconnected => {
                let mut state = lock(&self.state);
                if state.subscription == SubscriptionState::Unsubscribed {
                    return;
                }
                state.online = false;
                state.subscription = SubscriptionState::Reconnecting;
                debug!("Auction {} offline ({:?})", self.auction_id, connection);
            }
            ConnectionState::Connecting => {}
        }
    }

    fn is_mounted(&self) -> bool {
        lock(&self.state).subscription != SubscriptionState::Unsubscribed
    }

    fn refresh_session(&self) {
        if !self.session.is_authenticated() {
            return;
        }
        let session = self.session.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.refresh().await {
                        debug!("Background session refresh failed: {}", e);
                    }
                });
            }
            Err(_) => warn!("No runtime available to refresh the session"),
        }
    }
}

/// One mounted auction detail view
///
/// Dropping the view unmounts it.
pub struct AuctionLiveView {
    handler: Arc<LiveHandler>,
    subscriptions: Mutex<Vec<Subscription>>,
    bids_limit: u32,
}

impl AuctionLiveView {
    /// Registers the auction's event handlers and joins its channel.
    ///
    /// If the transport is not connected yet the view stays `Subscribing`
    /// and joins as soon as the connection comes up.
    pub fn mount(
        auction_id: &str,
        title: Option<&str>,
        transport: RealtimeClient,
        cache: ViewCache,
        session: Arc<SessionStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        if auction_id.trim().is_empty() {
            return Err(Error::InvalidArgument(
                "auction id must not be empty".to_string(),
            ));
        }

        let handler = Arc::new(LiveHandler {
            auction_id: auction_id.to_string(),
            title: title.map(str::to_string),
            transport: transport.clone(),
            cache,
            session,
            notifier,
            state: Mutex::new(LiveState {
                subscription: SubscriptionState::Subscribing,
                viewer_count: 0,
                is_ending_soon: false,
                ending_soon_warned: false,
                online: transport.is_connected(),
            }),
        });

        let mut channel = transport.channel(auction_id);
        for event in ChannelEvent::AUCTION_EVENTS {
            let handler = handler.clone();
            channel = channel.on(event, move |payload| handler.on_event(payload));
        }
        let mut subscriptions = channel.subscribe()?;
        {
            let handler = handler.clone();
            subscriptions.push(transport.on_connection_state(move |state| {
                handler.on_connection_state(state)
            }));
        }

        match transport.join(auction_id) {
            Ok(()) => {
                let mut state = lock(&handler.state);
                state.subscription = SubscriptionState::Subscribed;
                state.online = true;
                debug!("Joined auction {}", auction_id);
            }
            Err(e) => debug!("Join of {} deferred until connected: {}", auction_id, e),
        }

        Ok(Self {
            handler,
            subscriptions: Mutex::new(subscriptions),
            bids_limit: DEFAULT_BIDS_LIMIT,
        })
    }

    pub fn with_bids_limit(mut self, limit: u32) -> Self {
        self.bids_limit = limit;
        self
    }

    pub fn auction_id(&self) -> &str {
        &self.handler.auction_id
    }

    pub fn title(&self) -> Option<&str> {
        self.handler.title.as_deref()
    }

    pub fn state(&self) -> SubscriptionState {
        lock(&self.handler.state).subscription
    }

    pub fn viewer_count(&self) -> u32 {
        lock(&self.handler.state).viewer_count
    }

    pub fn is_ending_soon(&self) -> bool {
        lock(&self.handler.state).is_ending_soon
    }

    /// Connectivity indicator; `false` while the transport is down
    pub fn is_online(&self) -> bool {
        lock(&self.handler.state).online
    }

    /// The auction, from the cache or a fresh fetch.
    pub async fn auction(&self) -> Result<Arc<Auction>> {
        let session = self.handler.session.clone();
        let id = self.handler.auction_id.clone();
        self.handler
            .cache
            .get(QueryKey::auction(&id), move || async move {
                let result = session.api().get_auction(&id).await;
                session.expire_on_unauthorized(result).await
            })
            .await
    }

    /// Most recent bids first, at most the view's limit.
    pub async fn bids(&self) -> Result<Vec<Bid>> {
        let session = self.handler.session.clone();
        let id = self.handler.auction_id.clone();
        let limit = self.bids_limit;
        let list = self
            .handler
            .cache
            .get(QueryKey::auction_bids(&id), move || async move {
                let result = session.api().get_auction_bids(&id, limit).await;
                session.expire_on_unauthorized(result).await
            })
            .await?;
        Ok(list.for_display(limit as usize))
    }

    /// Leaves the channel and detaches every handler. Safe to call more
    /// than once; once it returns no handler of this view runs again.
    pub fn unmount(&self) {
        {
            let mut state = lock(&self.handler.state);
            if state.subscription == SubscriptionState::Unsubscribed {
                return;
            }
            state.subscription = SubscriptionState::Unsubscribed;
            state.online = false;
        }

        if let Err(e) = self.handler.transport.leave(&self.handler.auction_id) {
            debug!("Leave of {} failed: {}", self.handler.auction_id, e);
        }
        // Dropping waits for a dispatch in progress, so the state lock must
        // not be held here.
        let subscriptions = std::mem::take(&mut *lock(&self.subscriptions));
        drop(subscriptions);
        debug!("Unmounted auction {}", self.handler.auction_id);
    }
}

impl Drop for AuctionLiveView {
    fn drop(&mut self) {
        self.unmount();
    }
}
