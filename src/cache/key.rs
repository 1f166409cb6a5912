//! Keys of cached server views

use std::fmt;

use crate::api::types::AuctionQuery;

/// Which of the user's own auctions a view lists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MyAuctionsKind {
    /// Auctions the user has bid on
    Bids,
    /// Auctions the user is selling
    Listings,
}

impl MyAuctionsKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bids => "bids",
            Self::Listings => "listings",
        }
    }
}

/// Identity of one cached server response
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Auction(String),
    AuctionBids(String),
    Auctions(AuctionQuery),
    MyAuctions(MyAuctionsKind),
    Profile,
}

impl QueryKey {
    pub const AUCTION: &'static str = "auction";
    pub const AUCTION_BIDS: &'static str = "auction-bids";
    pub const AUCTIONS: &'static str = "auctions";
    pub const MY_AUCTIONS: &'static str = "my-auctions";
    pub const PROFILE: &'static str = "profile";

    pub fn auction(id: &str) -> Self {
        Self::Auction(id.to_string())
    }

    pub fn auction_bids(id: &str) -> Self {
        Self::AuctionBids(id.to_string())
    }

    /// The resource kind, shared by every key of the same shape.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auction(_) => Self::AUCTION,
            Self::AuctionBids(_) => Self::AUCTION_BIDS,
            Self::Auctions(_) => Self::AUCTIONS,
            Self::MyAuctions(_) => Self::MY_AUCTIONS,
            Self::Profile => Self::PROFILE,
        }
    }

    /// What the key holds, as shown to a user when loading it fails.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Auction(_) => "Auction",
            Self::AuctionBids(_) => "Bids",
            Self::Auctions(_) => "Auctions",
            Self::MyAuctions(MyAuctionsKind::Bids) => "Your Bids",
            Self::MyAuctions(MyAuctionsKind::Listings) => "Your Listings",
            Self::Profile => "Profile",
        }
    }

    /// The auction this key belongs to, for per-auction keys.
    pub fn auction_id(&self) -> Option<&str> {
        match self {
            Self::Auction(id) | Self::AuctionBids(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auction(id) | Self::AuctionBids(id) => write!(f, "{}:{}", self.kind(), id),
            Self::Auctions(query) => {
                write!(f, "{}", self.kind())?;
                if let Some(page) = query.page {
                    write!(f, ":page={}", page)?;
                }
                if let Some(status) = query.status {
                    write!(f, ":status={}", status)?;
                }
                if let Some(seller) = &query.seller_id {
                    write!(f, ":seller={}", seller)?;
                }
                Ok(())
            }
            Self::MyAuctions(kind) => write!(f, "{}:{}", self.kind(), kind.as_str()),
            Self::Profile => f.write_str(self.kind()),
        }
    }
}

/// Change notifications published by the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// The entry must be re-fetched before it is fresh again
    Invalidated(QueryKey),
    /// A fetch stored a new value
    Updated(QueryKey),
}

impl CacheEvent {
    pub fn key(&self) -> &QueryKey {
        match self {
            Self::Invalidated(key) | Self::Updated(key) => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::AuctionStatus;
    use std::collections::HashSet;

    #[test]
    fn test_kinds() {
        assert_eq!(QueryKey::auction("a1").kind(), "auction");
        assert_eq!(QueryKey::auction_bids("a1").kind(), "auction-bids");
        assert_eq!(QueryKey::Auctions(AuctionQuery::default()).kind(), "auctions");
        assert_eq!(QueryKey::MyAuctions(MyAuctionsKind::Bids).kind(), "my-auctions");
        assert_eq!(QueryKey::Profile.kind(), "profile");
    }

    #[test]
    fn test_list_keys_differ_by_filter() {
        let mut keys = HashSet::new();
        keys.insert(QueryKey::Auctions(AuctionQuery::default().page(1, 12)));
        keys.insert(QueryKey::Auctions(AuctionQuery::default().page(2, 12)));
        keys.insert(QueryKey::Auctions(
            AuctionQuery::default().page(1, 12).status(AuctionStatus::Active),
        ));
        keys.insert(QueryKey::Auctions(AuctionQuery::default().page(1, 12)));
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_display() {
        assert_eq!(QueryKey::auction("a1").to_string(), "auction:a1");
        assert_eq!(
            QueryKey::Auctions(AuctionQuery::default().page(2, 12).status(AuctionStatus::Sold))
                .to_string(),
            "auctions:page=2:status=sold"
        );
        assert_eq!(QueryKey::MyAuctions(MyAuctionsKind::Listings).to_string(), "my-auctions:listings");
        assert_eq!(QueryKey::auction_bids("a1").auction_id(), Some("a1"));
        assert_eq!(QueryKey::Profile.auction_id(), None);
    }
}
