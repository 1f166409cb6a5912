//! Typed payloads of the events pushed to an auction channel

use auction_live_realtime::{ChannelEvent, Payload};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::Deserialize;

/// One event received for an auction the client has joined
///
/// Events are treated as signals that server state moved. Their amounts and
/// names are only used for notifications, never written into cached views.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    NewBid {
        auction_id: String,
        amount: Decimal,
        bidder_name: String,
        timestamp: Option<DateTime<Utc>>,
    },
    ViewerCount {
        auction_id: String,
        count: u32,
    },
    EndingSoon {
        auction_id: String,
        seconds_remaining: Option<u64>,
    },
    Sold {
        auction_id: String,
        winner_name: String,
        final_price: Decimal,
    },
    Expired {
        auction_id: String,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewBidData {
    amount: Decimal,
    #[serde(default)]
    bidder_name: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct ViewerCountData {
    count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndingSoonData {
    #[serde(default)]
    seconds_remaining: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SoldData {
    winner_name: String,
    final_price: Decimal,
}

impl LiveEvent {
    /// Reads the event out of a routed channel payload.
    pub fn from_payload(payload: &Payload) -> Result<Self, serde_json::Error> {
        let auction_id = payload.auction_id.clone();
        let data = payload.data.clone();
        let event = match payload.event {
            ChannelEvent::NewBid => {
                let NewBidData {
                    amount,
                    bidder_name,
                    timestamp,
                } = serde_json::from_value(data)?;
                Self::NewBid {
                    auction_id,
                    amount,
                    bidder_name,
                    timestamp,
                }
            }
            ChannelEvent::ViewerCount => {
                let ViewerCountData { count } = serde_json::from_value(data)?;
                Self::ViewerCount { auction_id, count }
            }
            ChannelEvent::AuctionEndingSoon => {
                let EndingSoonData { seconds_remaining } = serde_json::from_value(data)?;
                Self::EndingSoon {
                    auction_id,
                    seconds_remaining,
                }
            }
            ChannelEvent::AuctionSold => {
                let SoldData {
                    winner_name,
                    final_price,
                } = serde_json::from_value(data)?;
                Self::Sold {
                    auction_id,
                    winner_name,
                    final_price,
                }
            }
            ChannelEvent::AuctionExpired => Self::Expired { auction_id },
            other => {
                return Err(serde_json::Error::custom(format!(
                    "{} is not an auction channel event",
                    other
                )))
            }
        };
        Ok(event)
    }

    pub fn auction_id(&self) -> &str {
        match self {
            Self::NewBid { auction_id, .. }
            | Self::ViewerCount { auction_id, .. }
            | Self::EndingSoon { auction_id, .. }
            | Self::Sold { auction_id, .. }
            | Self::Expired { auction_id } => auction_id,
        }
    }

    pub fn channel_event(&self) -> ChannelEvent {
        match self {
            Self::NewBid { .. } => ChannelEvent::NewBid,
            Self::ViewerCount { .. } => ChannelEvent::ViewerCount,
            Self::EndingSoon { .. } => ChannelEvent::AuctionEndingSoon,
            Self::Sold { .. } => ChannelEvent::AuctionSold,
            Self::Expired { .. } => ChannelEvent::AuctionExpired,
        }
    }
}
