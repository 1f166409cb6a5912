//! Types for authentication and the user's wallet

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::types::Auction;

/// User data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// The user ID
    pub id: String,

    /// The user's email address
    pub email: String,

    /// Display name
    pub username: String,

    /// Wallet balance; the server sends either a string or a number
    pub balance: Decimal,

    /// Auctions this user has won, when the profile includes them
    #[serde(default)]
    pub won_auctions: Option<Vec<Auction>>,
}

/// Body of `POST /auth/login`
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            email: email.to_string(),
            password: password.to_string(),
        }
    }
}

/// Body of `POST /auth/register`
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Authentication response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// The access token
    pub access_token: String,

    /// The user data
    pub user: User,
}

/// Body of `POST /auth/add-funds`
#[derive(Debug, Clone, Serialize)]
pub struct DepositRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// Response of `POST /auth/add-funds`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositResponse {
    pub balance: Decimal,
}
