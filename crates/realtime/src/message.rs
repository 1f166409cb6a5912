use serde::{Deserialize, Serialize};

/// A full frame sent or received over the WebSocket.
///
/// Both directions use the same envelope: `{"event": "...", "payload": {...}}`.
/// The event is kept as a raw string so frames with events this client does
/// not know about still parse and can be logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RealtimeMessage {
    pub fn new(event: ChannelEvent, payload: serde_json::Value) -> Self {
        Self {
            event: event.as_str().to_string(),
            payload,
        }
    }

    /// The typed event, if the name is one this client understands.
    pub fn channel_event(&self) -> Option<ChannelEvent> {
        ChannelEvent::from_name(&self.event)
    }

    /// Auction the frame is scoped to, read from `payload.auctionId`.
    ///
    /// Numeric ids are accepted and rendered as strings.
    pub fn auction_id(&self) -> Option<String> {
        match self.payload.get("auctionId")? {
            serde_json::Value::String(id) if !id.is_empty() => Some(id.clone()),
            serde_json::Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

/// チャンネルイベント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelEvent {
    // Server -> client, scoped to a joined auction channel
    #[serde(rename = "NEW_BID")]
    NewBid,
    #[serde(rename = "VIEWER_COUNT")]
    ViewerCount,
    #[serde(rename = "AUCTION_ENDING_SOON")]
    AuctionEndingSoon,
    #[serde(rename = "AUCTION_SOLD")]
    AuctionSold,
    #[serde(rename = "AUCTION_EXPIRED")]
    AuctionExpired,

    // Client -> server
    #[serde(rename = "join_auction")]
    JoinAuction,
    #[serde(rename = "leave_auction")]
    LeaveAuction,
    #[serde(rename = "ping")]
    Ping,
}

impl ChannelEvent {
    /// The five events a server pushes to an auction channel.
    pub const AUCTION_EVENTS: [ChannelEvent; 5] = [
        ChannelEvent::NewBid,
        ChannelEvent::ViewerCount,
        ChannelEvent::AuctionEndingSoon,
        ChannelEvent::AuctionSold,
        ChannelEvent::AuctionExpired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewBid => "NEW_BID",
            Self::ViewerCount => "VIEWER_COUNT",
            Self::AuctionEndingSoon => "AUCTION_ENDING_SOON",
            Self::AuctionSold => "AUCTION_SOLD",
            Self::AuctionExpired => "AUCTION_EXPIRED",
            Self::JoinAuction => "join_auction",
            Self::LeaveAuction => "leave_auction",
            Self::Ping => "ping",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "NEW_BID" => Some(Self::NewBid),
            "VIEWER_COUNT" => Some(Self::ViewerCount),
            "AUCTION_ENDING_SOON" => Some(Self::AuctionEndingSoon),
            "AUCTION_SOLD" => Some(Self::AuctionSold),
            "AUCTION_EXPIRED" => Some(Self::AuctionExpired),
            "join_auction" => Some(Self::JoinAuction),
            "leave_auction" => Some(Self::LeaveAuction),
            "ping" => Some(Self::Ping),
            _ => None,
        }
    }

    /// Whether the server sends this event to auction channels.
    pub fn is_auction_event(&self) -> bool {
        Self::AUCTION_EVENTS.contains(self)
    }

    /// Whether the event means the auction's price, status or bids may have
    /// changed. Viewer counts and ending-soon warnings do not.
    pub fn changes_auction(&self) -> bool {
        matches!(self, Self::NewBid | Self::AuctionSold | Self::AuctionExpired)
    }
}

impl std::fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// メッセージペイロード
#[derive(Debug, Clone)]
pub struct Payload {
    pub event: ChannelEvent,
    pub auction_id: String,
    /// Raw event payload as sent by the server.
    pub data: serde_json::Value,
}
