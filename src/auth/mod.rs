//! Authentication and the signed-in user's session

mod session;
mod types;

use auction_live_realtime::RealtimeClient;
use log::{debug, info, warn};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;

use crate::api::ApiClient;
use crate::error::{Error, Result};
use crate::notify::{Notification, Notifier};

pub use session::*;
pub use types::*;

/// Owner of the current user and the realtime connection's lifetime
///
/// The user is only ever what the server last returned from login,
/// registration or a profile fetch; nothing here adjusts it locally. The
/// transport is connected when a session is established and torn down when it
/// ends.
pub struct SessionStore {
    api: Arc<ApiClient>,
    transport: RealtimeClient,
    notifier: Arc<dyn Notifier>,
    state: watch::Sender<Session>,
}

impl SessionStore {
    pub fn new(api: Arc<ApiClient>, transport: RealtimeClient, notifier: Arc<dyn Notifier>) -> Self {
        let (state, _) = watch::channel(Session::initial());
        Self {
            api,
            transport,
            notifier,
            state,
        }
    }

    /// Current session snapshot
    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receiver that sees every change to the session
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading
    }

    pub fn balance(&self) -> Option<Decimal> {
        self.state.borrow().balance()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    /// The stored bearer token
    pub fn token(&self) -> Option<String> {
        self.api.tokens().load()
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn transport(&self) -> &RealtimeClient {
        &self.transport
    }

    /// Restores the session from a stored token at start-up.
    ///
    /// A rejected token is cleared and reported as an expired session.
    /// Other failures keep the token so a later attempt can succeed.
    pub async fn load(&self) -> Result<Option<User>> {
        let token = match self.token() {
            Some(token) => token,
            None => {
                self.set_loading(false);
                return Ok(None);
            }
        };

        debug!("Loading user profile");
        let outcome = match self.api.profile().await {
            Ok(user) if self.token_unchanged(&token) => {
                debug!("User profile loaded for {}", user.username);
                self.set_user(Some(user.clone()));
                self.connect(&token).await;
                Ok(Some(user))
            }
            Ok(_) => Ok(None),
            Err(e) if e.is_unauthorized() => {
                self.expire().await;
                Ok(None)
            }
            Err(e) => {
                warn!("Failed to load user: {}", e);
                Err(e)
            }
        };
        self.set_loading(false);
        outcome
    }

    pub async fn login(&self, credentials: &LoginRequest) -> Result<User> {
        match self.api.login(credentials).await {
            Ok(response) => {
                let user = self.establish(response).await;
                self.notifier.notify(Notification::success(
                    "Login Successful",
                    format!("Welcome back, {}!", user.username),
                ));
                Ok(user)
            }
            Err(e) => {
                warn!("Login failed: {}", e);
                self.notifier.notify(Notification::error(
                    "Login Failed",
                    e.user_message("Invalid credentials"),
                ));
                Err(e)
            }
        }
    }

    pub async fn register(&self, data: &RegisterRequest) -> Result<User> {
        match self.api.register(data).await {
            Ok(response) => {
                let user = self.establish(response).await;
                self.notifier.notify(Notification::success(
                    "Registration Successful",
                    format!("Welcome, {}!", user.username),
                ));
                Ok(user)
            }
            Err(e) => {
                warn!("Registration failed: {}", e);
                self.notifier.notify(Notification::error(
                    "Registration Failed",
                    e.user_message("Failed to create account"),
                ));
                Err(e)
            }
        }
    }

    /// Re-fetches the profile.
    ///
    /// A 401 ends the session. Any other failure leaves the stale session in
    /// place and is returned to the caller.
    pub async fn refresh(&self) -> Result<User> {
        let token = match self.token() {
            Some(token) => token,
            None => {
                if self.is_authenticated() {
                    self.expire().await;
                }
                return Err(Error::MissingSession);
            }
        };

        match self.api.profile().await {
            Ok(user) => {
                // A logout or re-login while the request was out wins.
                if self.token_unchanged(&token) {
                    self.set_user(Some(user.clone()));
                } else {
                    debug!("Session changed during refresh, dropping profile");
                }
                Ok(user)
            }
            Err(e) if e.is_unauthorized() => {
                self.handle_unauthorized().await;
                Err(e)
            }
            Err(e) => {
                warn!("Failed to refresh user: {}", e);
                Err(e)
            }
        }
    }

    /// Ends the session. The server call is best effort; local state is
    /// cleared regardless.
    pub async fn logout(&self) {
        if self.token().is_some() {
            if let Err(e) = self.api.logout().await {
                debug!("Server logout failed, clearing session anyway: {}", e);
            }
        }
        self.api.tokens().clear();
        self.set_user(None);
        self.disconnect().await;
        info!("Logged out");
        self.notifier.notify(Notification::info(
            "Logged Out",
            "You have been logged out successfully.",
        ));
    }

    /// Adds funds, then re-fetches the profile so the balance shown is the
    /// server's.
    pub async fn deposit(&self, amount: Decimal) -> Result<User> {
        match self.api.deposit(amount).await {
            Ok(response) => {
                debug!("Deposit of {} accepted, server balance {}", amount, response.balance);
                self.notifier.notify(Notification::success(
                    "Funds Added",
                    "Your account balance has been updated successfully.",
                ));
                self.refresh().await
            }
            Err(e) => {
                if e.is_unauthorized() {
                    self.handle_unauthorized().await;
                }
                self.notifier.notify(Notification::error(
                    "Failed to Add Funds",
                    e.user_message("Something went wrong. Please try again."),
                ));
                Err(e)
            }
        }
    }

    /// Ends the session after the server rejected its token.
    ///
    /// Several rejected requests in a row expire the session once.
    pub async fn handle_unauthorized(&self) {
        if self.is_authenticated() || self.token().is_some() {
            self.expire().await;
        }
    }

    /// Passes `result` through, expiring the session first when the server
    /// answered 401.
    pub async fn expire_on_unauthorized<T>(&self, result: Result<T>) -> Result<T> {
        if matches!(&result, Err(e) if e.is_unauthorized()) {
            self.handle_unauthorized().await;
        }
        result
    }

    async fn expire(&self) {
        warn!("Session expired");
        self.api.tokens().clear();
        self.set_user(None);
        self.disconnect().await;
        self.notifier.notify(Notification::error(
            "Session Expired",
            "Please log in again.",
        ));
    }

    async fn establish(&self, response: AuthResponse) -> User {
        let AuthResponse { access_token, user } = response;
        // The token has to be in place before anything uses the connection.
        self.api.tokens().store(&access_token);
        self.state.send_modify(|session| {
            session.user = Some(user.clone());
            session.is_loading = false;
        });
        self.connect(&access_token).await;
        user
    }

    async fn connect(&self, token: &str) {
        self.transport.set_auth(Some(token.to_string())).await;
        match self.transport.connect().await {
            Ok(()) => debug!("Realtime connection established"),
            Err(e) => warn!("Realtime connection failed: {}", e),
        }
    }

    async fn disconnect(&self) {
        if let Err(e) = self.transport.disconnect().await {
            debug!("Realtime disconnect failed: {}", e);
        }
        self.transport.set_auth(None).await;
    }

    fn token_unchanged(&self, token: &str) -> bool {
        self.token().as_deref() == Some(token)
    }

    fn set_user(&self, user: Option<User>) {
        self.state.send_modify(|session| session.user = user);
    }

    fn set_loading(&self, loading: bool) {
        self.state.send_modify(|session| session.is_loading = loading);
    }
}
