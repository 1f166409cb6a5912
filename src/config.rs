//! Configuration options for the auction-live client

use std::path::PathBuf;
use std::time::Duration;

use auction_live_realtime::RealtimeClientOptions;
use url::Url;

use crate::error::{Error, Result};

/// Configuration options for the auction-live client
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Base URL of the HTTP API, e.g. `https://api.example.com`
    pub api_url: String,

    /// URL of the realtime socket
    pub ws_url: String,

    /// The request timeout
    pub request_timeout: Option<Duration>,

    /// Maximum age at which a cached view is served without re-fetching
    pub staleness: Duration,

    /// How many bids an auction detail view shows
    pub bids_limit: u32,

    /// Whether the session token survives restarts
    pub persist_session: bool,

    /// Where the token is written when `persist_session` is set
    pub token_path: PathBuf,

    /// Realtime transport options
    pub realtime: RealtimeClientOptions,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            ws_url: "ws://localhost:3000".to_string(),
            request_timeout: Some(Duration::from_secs(30)),
            staleness: Duration::from_secs(30),
            bids_limit: 20,
            persist_session: false,
            token_path: PathBuf::from(".auction-live/token"),
            realtime: RealtimeClientOptions::default(),
        }
    }
}

impl ClientOptions {
    /// Options for an API at `api_url`, with the socket on the same host.
    pub fn new(api_url: &str) -> Result<Self> {
        let ws_url = socket_url_for(api_url)?;
        Ok(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            ws_url,
            ..Default::default()
        })
    }

    /// Reads options from the environment, loading `.env` first.
    ///
    /// `AUCTION_API_URL` is required. `AUCTION_WS_URL`, `AUCTION_STALE_SECS`
    /// and `AUCTION_PERSIST_SESSION` are optional.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let api_url = std::env::var("AUCTION_API_URL")
            .map_err(|_| Error::config("AUCTION_API_URL environment variable not found"))?;
        let mut options = Self::new(&api_url)?;

        if let Ok(ws_url) = std::env::var("AUCTION_WS_URL") {
            options.ws_url = ws_url;
        }
        if let Ok(secs) = std::env::var("AUCTION_STALE_SECS") {
            let secs = secs
                .parse::<u64>()
                .map_err(|e| Error::config(format!("AUCTION_STALE_SECS: {}", e)))?;
            options.staleness = Duration::from_secs(secs);
        }
        if let Ok(flag) = std::env::var("AUCTION_PERSIST_SESSION") {
            options.persist_session = matches!(flag.as_str(), "1" | "true" | "yes");
        }
        Ok(options)
    }

    /// Set the socket URL
    pub fn with_ws_url(mut self, value: &str) -> Self {
        self.ws_url = value.to_string();
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, value: Option<Duration>) -> Self {
        self.request_timeout = value;
        self
    }

    /// Set the staleness window
    pub fn with_staleness(mut self, value: Duration) -> Self {
        self.staleness = value;
        self
    }

    /// Set the number of bids shown per auction
    pub fn with_bids_limit(mut self, value: u32) -> Self {
        self.bids_limit = value;
        self
    }

    /// Set whether to persist the session token to `path`
    pub fn with_persist_session(mut self, value: bool, path: impl Into<PathBuf>) -> Self {
        self.persist_session = value;
        self.token_path = path.into();
        self
    }

    /// Set the realtime transport options
    pub fn with_realtime(mut self, value: RealtimeClientOptions) -> Self {
        self.realtime = value;
        self
    }
}

fn socket_url_for(api_url: &str) -> Result<String> {
    let mut url = Url::parse(api_url)?;
    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => return Err(Error::config(format!("Unsupported API URL scheme: {}", other))),
    };
    url.set_scheme(scheme)
        .map_err(|_| Error::config(format!("Cannot derive socket URL from {}", api_url)))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}
