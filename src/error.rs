//! Error handling for the auction-live client

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Unified error type for the auction-live client
///
/// The type is `Clone` so one failed fetch can be handed to every caller
/// that was waiting on it; sources that are not `Clone` are kept behind an
/// `Arc`.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Network or HTTP related errors
    #[error("HTTP error: {0}")]
    Http(Arc<reqwest::Error>),

    /// JSON serialization or deserialization errors
    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// The server rejected the credentials or the session (HTTP 401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Any other non-success response, with the server's message
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Realtime transport errors
    #[error("Realtime error: {0}")]
    Realtime(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A caller passed something the client refuses to send
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation needs a logged-in session
    #[error("Missing session")]
    MissingSession,

    /// General errors
    #[error("{0}")]
    General(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(Arc::new(err))
    }
}

impl From<auction_live_realtime::RealtimeError> for Error {
    fn from(err: auction_live_realtime::RealtimeError) -> Self {
        Error::Realtime(err.to_string())
    }
}

impl Error {
    /// Create a new realtime error
    pub fn realtime<T: fmt::Display>(msg: T) -> Self {
        Error::Realtime(msg.to_string())
    }

    /// Create a new configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Error::Config(msg.to_string())
    }

    /// Create a new general error
    pub fn general<T: fmt::Display>(msg: T) -> Self {
        Error::General(msg.to_string())
    }

    /// Builds the error for a non-success response from its status and body.
    ///
    /// The body is expected to look like `{"message": "..."}`; validation
    /// failures may send an array of messages, which are joined.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| match value.get("message")? {
                serde_json::Value::String(message) => Some(message.clone()),
                serde_json::Value::Array(messages) => Some(
                    messages
                        .iter()
                        .filter_map(|m| m.as_str())
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
                _ => None,
            })
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| body.trim().to_string());

        if status == 401 {
            Error::Unauthorized(message)
        } else {
            Error::Api { status, message }
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Error::Unauthorized(_))
    }

    /// HTTP status of the failed response, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Unauthorized(_) => Some(401),
            Error::Api { status, .. } => Some(*status),
            Error::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The message to show a user: the server's own text when it sent one,
    /// otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            Error::Unauthorized(message) | Error::Api { message, .. } if !message.is_empty() => {
                message.clone()
            }
            Error::InvalidArgument(message) => message.clone(),
            _ => fallback.to_string(),
        }
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_response_reads_message() {
        let err = Error::from_response(401, r#"{"message":"Invalid credentials"}"#);
        assert!(err.is_unauthorized());
        assert_eq!(err.user_message("fallback"), "Invalid credentials");
    }

    #[test]
    fn test_from_response_joins_validation_messages() {
        let err = Error::from_response(
            400,
            r#"{"message":["amount must be positive","amount must be a number"]}"#,
        );
        assert_eq!(err.status(), Some(400));
        assert_eq!(
            err.user_message("fallback"),
            "amount must be positive, amount must be a number"
        );
    }

    #[test]
    fn test_from_response_without_json_body() {
        let err = Error::from_response(502, "Bad Gateway");
        assert_eq!(err.user_message("fallback"), "Bad Gateway");

        let empty = Error::from_response(500, "");
        assert_eq!(empty.user_message("Something went wrong"), "Something went wrong");
    }

    #[test]
    fn test_transport_errors_use_fallback() {
        let err = Error::realtime("socket closed");
        assert_eq!(err.user_message("Try again"), "Try again");
        assert_eq!(err.status(), None);
    }
}
