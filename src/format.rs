//! Display helpers for prices and countdowns

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};

use crate::api::types::Auction;

/// `$120.00`
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${:.2}", rounded.abs())
    } else {
        format!("${:.2}", rounded.abs())
    }
}

/// Smallest bid the UI suggests. The server decides what it accepts.
pub fn minimum_next_bid(auction: &Auction) -> Decimal {
    auction.current_price + auction.minimum_bid_increment
}

pub fn is_auction_ended(ends_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    ends_at <= now
}

/// Remaining time in the two largest units: `1d 2h`, `3h 4m`, `5m 6s`, `7s`.
pub fn format_time_remaining(ends_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if is_auction_ended(ends_at, now) {
        return "Ended".to_string();
    }
    let total = (ends_at - now).num_seconds();
    let (days, hours, minutes, seconds) = (
        total / 86_400,
        total % 86_400 / 3_600,
        total % 3_600 / 60,
        total % 60,
    );
    if days > 0 {
        format!("{}d {}h", days, hours)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// `5 minutes`, `1 minute`, `45 seconds`
pub fn format_countdown(seconds: u64) -> String {
    fn plural(n: u64, unit: &str) -> String {
        if n == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", n, unit)
        }
    }
    if seconds >= 60 {
        plural(seconds / 60 + u64::from(seconds % 60 >= 30), "minute")
    } else {
        plural(seconds, "second")
    }
}

/// `Highest Bid: bob`, when the auction has a highest bidder
pub fn highest_bid_label(auction: &Auction) -> Option<String> {
    auction
        .highest_bidder_username
        .as_deref()
        .filter(|name| !name.is_empty())
        .map(|name| format!("Highest Bid: {}", name))
}
