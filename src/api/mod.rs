//! The auction marketplace HTTP API
//!
//! Thin request/response wrappers; no rule of the marketplace (minimum bid,
//! balance checks, auction state) is enforced here.

pub mod types;

use log::{debug, warn};
use reqwest::{Client, Method};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthResponse, DepositRequest, DepositResponse, LoginRequest, RegisterRequest, User};
use crate::error::{Error, Result};
use crate::fetch::{Fetch, FetchBuilder};
use crate::storage::TokenStore;
use types::*;

/// Client for the auction HTTP API
pub struct ApiClient {
    /// Base URL without a trailing slash
    base_url: String,

    /// HTTP client used for requests
    client: Client,

    /// Source of the bearer token
    tokens: Arc<dyn TokenStore>,

    timeout: Option<Duration>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        client: Client,
        tokens: Arc<dyn TokenStore>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            tokens,
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A request without credentials.
    fn public(&self, method: Method, path: &str) -> FetchBuilder<'_> {
        let url = self.url(path);
        let builder = if method == Method::GET {
            Fetch::get(&self.client, &url)
        } else {
            Fetch::post(&self.client, &url)
        };
        builder.timeout(self.timeout)
    }

    /// A request carrying the stored token, if there is one.
    fn authed(&self, method: Method, path: &str) -> FetchBuilder<'_> {
        let builder = self.public(method, path);
        match self.tokens.load() {
            Some(token) => builder.bearer_auth(&token),
            None => builder,
        }
    }

    /// A 401 on an authenticated request means the token is no good any more.
    fn check<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(Error::Unauthorized(message)) = &result {
            warn!("Request rejected as unauthorized ({}), clearing token", message);
            self.tokens.clear();
        }
        result
    }

    // --- auth ---

    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse> {
        debug!("Logging in as {}", credentials.email);
        self.public(Method::POST, "/auth/login")
            .json(credentials)?
            .execute()
            .await
    }

    pub async fn register(&self, data: &RegisterRequest) -> Result<AuthResponse> {
        debug!("Registering {}", data.email);
        self.public(Method::POST, "/auth/register")
            .json(data)?
            .execute()
            .await
    }

    pub async fn profile(&self) -> Result<User> {
        let result = self.authed(Method::GET, "/auth/profile").execute().await;
        self.check(result)
    }

    pub async fn logout(&self) -> Result<()> {
        self.authed(Method::POST, "/auth/logout").execute_empty().await
    }

    /// Adds funds to the wallet. The returned balance is the server's.
    pub async fn deposit(&self, amount: Decimal) -> Result<DepositResponse> {
        let request = self
            .authed(Method::POST, "/auth/add-funds")
            .json(&DepositRequest { amount })?;
        let result = request.execute().await;
        self.check(result)
    }

    // --- auctions ---

    pub async fn list_auctions(&self, query: &AuctionQuery) -> Result<AuctionPage> {
        let result = self
            .authed(Method::GET, "/auctions")
            .query("page", query.page)
            .query("limit", query.limit)
            .query("status", query.status)
            .query("sellerId", query.seller_id.as_deref())
            .execute()
            .await;
        self.check(result)
    }

    pub async fn get_auction(&self, id: &str) -> Result<Auction> {
        let result = self
            .authed(Method::GET, &format!("/auctions/{}", id))
            .execute()
            .await;
        self.check(result)
    }

    pub async fn get_auction_bids(&self, id: &str, limit: u32) -> Result<BidList> {
        let result = self
            .authed(Method::GET, &format!("/auctions/{}/bids", id))
            .query("limit", Some(limit))
            .execute()
            .await;
        self.check(result)
    }

    pub async fn place_bid(&self, id: &str, amount: Decimal) -> Result<PlaceBidResponse> {
        let request = self
            .authed(Method::POST, &format!("/auctions/{}/bid", id))
            .json(&PlaceBidRequest { amount })?;
        let result = request.execute().await;
        self.check(result)
    }

    pub async fn create_auction(&self, data: &CreateAuctionRequest) -> Result<Auction> {
        let request = self.authed(Method::POST, "/auctions").json(data)?;
        let result = request.execute().await;
        self.check(result)
    }

    /// Bids placed by the current user, newest first.
    pub async fn my_bids(&self, limit: u32) -> Result<UserBidPage> {
        let result = self
            .authed(Method::GET, "/auctions/my-bids")
            .query("limit", Some(limit))
            .execute()
            .await;
        self.check(result)
    }
}
