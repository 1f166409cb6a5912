use auction_live::format::{format_money, format_time_remaining, highest_bid_label};
use auction_live::prelude::*;
use chrono::Utc;
use std::env;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, Duration};

async fn print_auction(view: &AuctionLiveView) {
    match view.auction().await {
        Ok(auction) => {
            println!(
                "{} [{}] {} {} (ends in {}){}",
                auction.title,
                auction.status,
                format_money(auction.current_price),
                highest_bid_label(&auction).unwrap_or_default(),
                format_time_remaining(auction.ends_at, Utc::now()),
                if view.is_ending_soon() { " ENDING SOON" } else { "" },
            );
        }
        Err(e) => println!("Could not load auction: {}", e),
    }
    if let Ok(bids) = view.bids().await {
        for bid in bids.iter().take(5) {
            println!("  {} by {}", format_money(bid.amount), bid.username);
        }
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    dotenv::dotenv().ok();

    let email = env::var("AUCTION_EMAIL").map_err(|_| "AUCTION_EMAIL must be set")?;
    let password = env::var("AUCTION_PASSWORD").map_err(|_| "AUCTION_PASSWORD must be set")?;
    let auction_id = env::var("AUCTION_ID").map_err(|_| "AUCTION_ID must be set")?;

    let (notifier, mut notifications) = ChannelNotifier::new();
    let client = AuctionClient::from_env(Arc::new(notifier))?;

    println!("Starting watch_auction example");

    client.session().load().await?;
    if !client.session().is_authenticated() {
        client
            .session()
            .login(&LoginRequest::new(&email, &password))
            .await?;
    }
    if let Some(balance) = client.session().balance() {
        println!("Balance: {}", format_money(balance));
    }

    let title = client.auction(&auction_id).await?.title.clone();
    let view = client.watch_auction(&auction_id, Some(&title))?;
    let mut cache_events = client.cache().subscribe();
    let mut status = interval(Duration::from_secs(10));

    print_auction(&view).await;
    println!("Watching \"{}\", press Ctrl-C to stop", title);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(notification) = notifications.recv() => {
                println!("[{:?}] {}", notification.level, notification);
            }
            event = cache_events.recv() => match event {
                Ok(CacheEvent::Invalidated(QueryKey::Auction(id))) if id == view.auction_id() => {
                    print_auction(&view).await;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => log::warn!("Skipped {} cache events", skipped),
                Err(RecvError::Closed) => break,
            },
            _ = status.tick() => {
                println!(
                    "{:?}, {} watching, {}",
                    view.state(),
                    view.viewer_count(),
                    if view.is_online() { "online" } else { "offline" },
                );
            }
        }
    }

    view.unmount();
    client.logout().await;
    println!("Example completed");
    Ok(())
}
