//! Types for auctions and bids

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an auction, decided by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuctionStatus {
    Pending,
    Active,
    Sold,
    Expired,
}

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Sold => "sold",
            Self::Expired => "expired",
        }
    }

    /// Whether bids can still change the outcome
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The user who listed an auction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    pub id: String,
    pub email: String,
}

/// An auction as returned by the server
///
/// `current_price` and `status` are only ever taken from a server response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Auction {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub starting_price: Decimal,
    pub current_price: Decimal,
    pub minimum_bid_increment: Decimal,
    pub status: AuctionStatus,
    pub seller_id: String,
    #[serde(default)]
    pub creator: Option<Creator>,
    #[serde(default)]
    pub highest_bidder_id: Option<String>,
    #[serde(default)]
    pub highest_bidder_username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub viewer_count: Option<u32>,
}

/// A placed bid. Bids never change once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: String,
    pub amount: Decimal,
    pub user_id: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Response of `GET /auctions/:id/bids`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BidList {
    pub bids: Vec<Bid>,
}

impl BidList {
    /// Most recent first, at most `limit` bids.
    pub fn for_display(&self, limit: usize) -> Vec<Bid> {
        let mut bids = self.bids.clone();
        bids.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        bids.truncate(limit);
        bids
    }
}

/// Paging information of a list response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

/// Response of `GET /auctions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionPage {
    pub items: Vec<Auction>,
    pub pagination: Pagination,
}

/// Filters for `GET /auctions`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct AuctionQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<AuctionStatus>,
    pub seller_id: Option<String>,
}

impl AuctionQuery {
    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }

    pub fn status(mut self, status: AuctionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn seller(mut self, seller_id: &str) -> Self {
        self.seller_id = Some(seller_id.to_string());
        self
    }
}

/// Body of `POST /auctions/:id/bid`
#[derive(Debug, Clone, Serialize)]
pub struct PlaceBidRequest {
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
}

/// Response of `POST /auctions/:id/bid`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceBidResponse {
    pub bid: Bid,
    pub auction: Auction,
}

/// Body of `POST /auctions`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAuctionRequest {
    pub title: String,
    pub description: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub starting_price: Decimal,
    pub ends_at: DateTime<Utc>,
}

/// A bid of the current user together with the auction it was placed on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserBid {
    pub id: String,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
    pub auction: Auction,
}

/// Response of `GET /auctions/my-bids`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserBidPage {
    pub items: Vec<UserBid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn bid(id: &str, minute: u32) -> Bid {
        Bid {
            id: id.to_string(),
            amount: Decimal::new(100, 0),
            user_id: "u1".to_string(),
            username: "alice".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_auction_from_server_json() {
        let auction: Auction = serde_json::from_value(json!({
            "id": "a1",
            "title": "Lamp",
            "description": "Brass",
            "startingPrice": 50,
            "currentPrice": "120.50",
            "minimumBidIncrement": 1,
            "status": "active",
            "sellerId": "s1",
            "creator": {"id": "s1", "email": "s@example.com"},
            "highestBidderUsername": "bob",
            "createdAt": "2024-05-01T12:00:00Z",
            "endsAt": "2024-05-02T12:00:00Z"
        }))
        .unwrap();

        assert_eq!(auction.current_price, Decimal::new(12050, 2));
        assert_eq!(auction.starting_price, Decimal::new(50, 0));
        assert_eq!(auction.status, AuctionStatus::Active);
        assert_eq!(auction.highest_bidder_username.as_deref(), Some("bob"));
        assert_eq!(auction.highest_bidder_id, None);
    }

    #[test]
    fn test_bids_for_display_newest_first_and_capped() {
        let list = BidList {
            bids: (0..25).map(|m| bid(&format!("b{}", m), m)).collect(),
        };
        let shown = list.for_display(20);
        assert_eq!(shown.len(), 20);
        assert_eq!(shown[0].id, "b24");
        assert_eq!(shown[19].id, "b5");
    }

    #[test]
    fn test_amounts_serialize_as_numbers() {
        let body = serde_json::to_value(PlaceBidRequest {
            amount: Decimal::new(12000, 2),
        })
        .unwrap();
        assert_eq!(body, json!({"amount": 120.0}));
    }

    #[test]
    fn test_status_display() {
        assert_eq!(AuctionStatus::Expired.to_string(), "expired");
        assert!(AuctionStatus::Active.is_open());
        assert!(!AuctionStatus::Sold.is_open());
    }
}
