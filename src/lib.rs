//! auction-live
//!
//! A Rust client for a live-auction marketplace API. It keeps what a user
//! sees consistent with the server: a session store for the signed-in user,
//! a cache of server views, and live auction views that turn realtime events
//! into re-fetches.
//!
//! Nothing is rendered here. Messages meant for the user are handed to the
//! [`Notifier`](notify::Notifier) the application supplies.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod format;
pub mod live;
pub mod notify;
pub mod storage;

pub use auction_live_realtime as realtime;

use log::{debug, info, warn};
use reqwest::Client;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::api::types::*;
use crate::api::ApiClient;
use crate::auth::{SessionStore, User};
use crate::cache::{MyAuctionsKind, QueryKey, ViewCache};
use crate::config::ClientOptions;
use crate::error::{Error, Result};
use crate::format::format_money;
use crate::live::AuctionLiveView;
use crate::notify::{Notification, Notifier};
use crate::realtime::RealtimeClient;
use crate::storage::{FileTokenStore, MemoryTokenStore, TokenStore};

/// How many entries the "my auctions" views load
pub const MY_AUCTIONS_LIMIT: u32 = 100;

/// The main entry point: one session, one cache and one realtime connection
pub struct AuctionClient {
    options: ClientOptions,
    api: Arc<ApiClient>,
    cache: ViewCache,
    session: Arc<SessionStore>,
    realtime: RealtimeClient,
    notifier: Arc<dyn Notifier>,
}

impl AuctionClient {
    /// Create a new client
    ///
    /// The token is kept in memory, or in `options.token_path` when
    /// `options.persist_session` is set.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use auction_live::{AuctionClient, config::ClientOptions, notify::LogNotifier};
    ///
    /// let options = ClientOptions::new("http://localhost:3000").unwrap();
    /// let client = AuctionClient::new(options, Arc::new(LogNotifier)).unwrap();
    /// ```
    pub fn new(options: ClientOptions, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let tokens: Arc<dyn TokenStore> = if options.persist_session {
            Arc::new(FileTokenStore::new(&options.token_path))
        } else {
            Arc::new(MemoryTokenStore::new())
        };
        Self::with_token_store(options, notifier, tokens)
    }

    /// Create a new client with options read from the environment
    pub fn from_env(notifier: Arc<dyn Notifier>) -> Result<Self> {
        Self::new(ClientOptions::from_env()?, notifier)
    }

    /// Create a new client that keeps its token in `tokens`
    pub fn with_token_store(
        options: ClientOptions,
        notifier: Arc<dyn Notifier>,
        tokens: Arc<dyn TokenStore>,
    ) -> Result<Self> {
        let http_client = Client::builder().build()?;
        let api = Arc::new(ApiClient::new(
            &options.api_url,
            http_client,
            tokens,
            options.request_timeout,
        ));
        let realtime = RealtimeClient::new_with_options(&options.ws_url, options.realtime.clone());
        let session = Arc::new(SessionStore::new(
            api.clone(),
            realtime.clone(),
            notifier.clone(),
        ));
        let cache = ViewCache::new(options.staleness, notifier.clone());
        debug!("Client created for {}", options.api_url);

        Ok(Self {
            options,
            api,
            cache,
            session,
            realtime,
            notifier,
        })
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn cache(&self) -> &ViewCache {
        &self.cache
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn realtime(&self) -> &RealtimeClient {
        &self.realtime
    }

    // --- cached reads ---

    pub async fn auctions(&self, query: AuctionQuery) -> Result<Arc<AuctionPage>> {
        let api = self.api.clone();
        let session = self.session.clone();
        let key = QueryKey::Auctions(query.clone());
        self.cache
            .get(key, move || async move {
                session.expire_on_unauthorized(api.list_auctions(&query).await).await
            })
            .await
    }

    pub async fn auction(&self, id: &str) -> Result<Arc<Auction>> {
        let api = self.api.clone();
        let session = self.session.clone();
        let id = id.to_string();
        self.cache
            .get(QueryKey::auction(&id), move || async move {
                session.expire_on_unauthorized(api.get_auction(&id).await).await
            })
            .await
    }

    /// Most recent bids first, at most `bids_limit` of them.
    pub async fn auction_bids(&self, id: &str) -> Result<Vec<Bid>> {
        let api = self.api.clone();
        let session = self.session.clone();
        let id = id.to_string();
        let limit = self.options.bids_limit;
        let list = self
            .cache
            .get(QueryKey::auction_bids(&id), move || async move {
                session
                    .expire_on_unauthorized(api.get_auction_bids(&id, limit).await)
                    .await
            })
            .await?;
        Ok(list.for_display(limit as usize))
    }

    /// Auctions the signed-in user has bid on.
    pub async fn my_bids(&self) -> Result<Arc<UserBidPage>> {
        if !self.session.is_authenticated() {
            return Err(Error::MissingSession);
        }
        let api = self.api.clone();
        let session = self.session.clone();
        self.cache
            .get(QueryKey::MyAuctions(MyAuctionsKind::Bids), move || async move {
                session.expire_on_unauthorized(api.my_bids(MY_AUCTIONS_LIMIT).await).await
            })
            .await
    }

    /// Auctions the signed-in user is selling.
    pub async fn my_listings(&self) -> Result<Arc<AuctionPage>> {
        let user = self.session.current_user().ok_or(Error::MissingSession)?;
        let api = self.api.clone();
        let session = self.session.clone();
        let query = AuctionQuery {
            limit: Some(MY_AUCTIONS_LIMIT),
            seller_id: Some(user.id),
            ..Default::default()
        };
        self.cache
            .get(QueryKey::MyAuctions(MyAuctionsKind::Listings), move || async move {
                session.expire_on_unauthorized(api.list_auctions(&query).await).await
            })
            .await
    }

    // --- actions ---

    /// Places a bid. The new price and balance are re-fetched from the
    /// server, never computed here.
    pub async fn place_bid(&self, auction_id: &str, amount: Decimal) -> Result<PlaceBidResponse> {
        if auction_id.trim().is_empty() {
            return Err(Error::InvalidArgument("auction id must not be empty".to_string()));
        }
        match self.api.place_bid(auction_id, amount).await {
            Ok(response) => {
                info!("Bid of {} placed on {}", amount, auction_id);
                self.notifier.notify(Notification::success(
                    "Bid Placed",
                    format!("Successfully placed bid of {}", format_money(amount)),
                ));
                self.cache.invalidate(&QueryKey::auction(auction_id));
                self.cache.invalidate(&QueryKey::auction_bids(auction_id));
                self.cache.invalidate(&QueryKey::MyAuctions(MyAuctionsKind::Bids));
                if let Err(e) = self.session.refresh().await {
                    warn!("Balance refresh after bid failed: {}", e);
                }
                Ok(response)
            }
            Err(e) => {
                warn!("Bid on {} failed: {}", auction_id, e);
                if e.is_unauthorized() {
                    self.session.handle_unauthorized().await;
                }
                self.notifier.notify(Notification::error(
                    "Bid Failed",
                    e.user_message("Failed to place bid"),
                ));
                Err(e)
            }
        }
    }

    pub async fn create_auction(&self, request: &CreateAuctionRequest) -> Result<Auction> {
        match self.api.create_auction(request).await {
            Ok(auction) => {
                info!("Auction {} created", auction.id);
                self.notifier.notify(Notification::success(
                    "Auction Created",
                    "Your auction has been successfully listed.",
                ));
                self.cache.invalidate_kind(QueryKey::AUCTIONS);
                self.cache.invalidate_kind(QueryKey::MY_AUCTIONS);
                Ok(auction)
            }
            Err(e) => {
                warn!("Creating auction failed: {}", e);
                if e.is_unauthorized() {
                    self.session.handle_unauthorized().await;
                }
                self.notifier.notify(Notification::error(
                    "Failed to Create Auction",
                    e.user_message("Please check your inputs and try again."),
                ));
                Err(e)
            }
        }
    }

    /// Adds funds; the balance afterwards is the one the server reports.
    pub async fn deposit(&self, amount: Decimal) -> Result<User> {
        let result = self.session.deposit(amount).await;
        if result.is_ok() {
            self.cache.invalidate(&QueryKey::Profile);
        }
        result
    }

    /// Mounts a live view of one auction over the shared connection.
    pub fn watch_auction(&self, auction_id: &str, title: Option<&str>) -> Result<AuctionLiveView> {
        let view = AuctionLiveView::mount(
            auction_id,
            title,
            self.realtime.clone(),
            self.cache.clone(),
            self.session.clone(),
            self.notifier.clone(),
        )?;
        Ok(view.with_bids_limit(self.options.bids_limit))
    }

    /// Ends the session and forgets every cached view.
    pub async fn logout(&self) {
        self.session.logout().await;
        self.cache.clear();
    }
}

/// Commonly used types
pub mod prelude {
    pub use crate::api::types::{
        Auction, AuctionPage, AuctionQuery, AuctionStatus, Bid, CreateAuctionRequest,
    };
    pub use crate::auth::{LoginRequest, RegisterRequest, Session, User};
    pub use crate::cache::{CacheEvent, MyAuctionsKind, QueryKey};
    pub use crate::config::ClientOptions;
    pub use crate::error::{Error, Result};
    pub use crate::live::{AuctionLiveView, LiveEvent, SubscriptionState};
    pub use crate::notify::{ChannelNotifier, LogNotifier, Notification, NotificationLevel, Notifier};
    pub use crate::AuctionClient;
}
