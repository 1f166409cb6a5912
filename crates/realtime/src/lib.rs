//! Realtime auction channel transport for Rust
//!
//! This crate owns the single WebSocket connection of an auction-live client.
//! It authenticates once at connect time, emits `join_auction` /
//! `leave_auction` intents and routes the server's named auction events to
//! handlers registered per auction channel.

mod channel;
mod client;
mod error;
mod message;

pub use channel::{ChannelBuilder, Subscription};
pub use client::{ConnectionState, RealtimeClient, RealtimeClientOptions};
pub use error::RealtimeError;
pub use message::{ChannelEvent, Payload, RealtimeMessage};
