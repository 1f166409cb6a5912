use auction_live_realtime::{
    ChannelEvent, ConnectionState, RealtimeClient, RealtimeClientOptions, RealtimeMessage,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(3);

/// One accepted connection on the mock server.
struct MockConnection {
    /// Request path and query of the handshake.
    uri: String,
    /// Frames received from the client.
    inbound: mpsc::UnboundedReceiver<RealtimeMessage>,
    /// Frames to push to the client. `None` closes the socket.
    outbound: mpsc::UnboundedSender<Option<serde_json::Value>>,
}

impl MockConnection {
    async fn next_frame(&mut self, event: &str) -> RealtimeMessage {
        loop {
            let frame = timeout(WAIT, self.inbound.recv())
                .await
                .expect("timed out waiting for client frame")
                .expect("connection gone");
            if frame.event == event {
                return frame;
            }
        }
    }

    fn push(&self, frame: serde_json::Value) {
        self.outbound.send(Some(frame)).unwrap();
    }

    fn close(&self) {
        self.outbound.send(None).unwrap();
    }
}

// Helper function to start a mock WebSocket server that hands every accepted
// connection to the test.
async fn start_mock_server() -> (SocketAddr, mpsc::UnboundedReceiver<MockConnection>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (conn_tx, conn_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let uri = Arc::new(Mutex::new(String::new()));
            let uri_clone = uri.clone();
            let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                *uri_clone.lock().unwrap() = req.uri().to_string();
                Ok(resp)
            };
            let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                continue;
            };

            let (in_tx, in_rx) = mpsc::unbounded_channel();
            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Option<serde_json::Value>>();
            let uri = uri.lock().unwrap().clone();
            if conn_tx
                .send(MockConnection {
                    uri,
                    inbound: in_rx,
                    outbound: out_tx,
                })
                .is_err()
            {
                break;
            }

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        msg = ws.next() => match msg {
                            Some(Ok(Message::Text(text))) => {
                                if let Ok(frame) = serde_json::from_str::<RealtimeMessage>(&text) {
                                    let _ = in_tx.send(frame);
                                }
                            }
                            Some(Ok(_)) => {}
                            _ => break,
                        },
                        out = out_rx.recv() => match out {
                            Some(Some(frame)) => {
                                if ws.send(Message::Text(frame.to_string())).await.is_err() {
                                    break;
                                }
                            }
                            _ => {
                                let _ = ws.close(None).await;
                                break;
                            }
                        }
                    }
                }
            });
        }
    });

    (addr, conn_rx)
}

async fn next_connection(conns: &mut mpsc::UnboundedReceiver<MockConnection>) -> MockConnection {
    timeout(WAIT, conns.recv())
        .await
        .expect("timed out waiting for connection")
        .expect("server gone")
}

async fn wait_for_state(client: &RealtimeClient, wanted: ConnectionState) {
    timeout(WAIT, async {
        while client.connection_state() != wanted {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("state never became {:?}", wanted));
}

fn fast_reconnect() -> RealtimeClientOptions {
    RealtimeClientOptions {
        reconnect_interval: 20,
        max_reconnect_interval: 100,
        ..Default::default()
    }
}

#[test]
fn test_client_creation_custom_options() {
    let options = RealtimeClientOptions {
        auto_reconnect: false,
        max_reconnect_attempts: Some(2),
        ..Default::default()
    };
    let client = RealtimeClient::new_with_options("wss://live.example.com/socket", options);
    assert_eq!(client.url(), "wss://live.example.com/socket");
    assert!(!client.options().auto_reconnect);
    assert_eq!(client.options().max_reconnect_attempts, Some(2));
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_set_auth() {
    let client = RealtimeClient::new("ws://localhost:1234");
    assert!(client.access_token().await.is_none());

    client.set_auth(Some("jwt".to_string())).await;
    assert_eq!(client.access_token().await.as_deref(), Some("jwt"));

    client.set_auth(None).await;
    assert!(client.access_token().await.is_none());
}

#[tokio::test]
async fn test_connect_sends_token_and_disconnects() {
    let _ = pretty_env_logger::try_init();
    let (addr, mut conns) = start_mock_server().await;
    let client = RealtimeClient::new(&format!("http://{}", addr));
    client.set_auth(Some("secret-token".to_string())).await;

    let mut state_rx = client.on_state_change();
    client.connect().await.expect("connect failed");
    assert_eq!(state_rx.recv().await.unwrap(), ConnectionState::Connecting);
    assert_eq!(state_rx.recv().await.unwrap(), ConnectionState::Connected);

    let conn = next_connection(&mut conns).await;
    assert!(conn.uri.contains("token=secret-token"), "uri was {}", conn.uri);

    client.disconnect().await.unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert!(matches!(
        client.emit(ChannelEvent::Ping, json!({})),
        Err(auction_live_realtime::RealtimeError::NotConnected)
    ));
}

#[tokio::test]
async fn test_join_and_leave_frames() {
    let (addr, mut conns) = start_mock_server().await;
    let client = RealtimeClient::new(&format!("ws://{}", addr));
    client.connect().await.unwrap();
    let mut conn = next_connection(&mut conns).await;
    wait_for_state(&client, ConnectionState::Connected).await;

    client.join("a1").unwrap();
    let join = conn.next_frame("join_auction").await;
    assert_eq!(join.payload, json!({"auctionId": "a1"}));

    // A second member keeps the channel joined.
    client.join("a1").unwrap();
    conn.next_frame("join_auction").await;
    client.leave("a1").unwrap();
    assert_eq!(client.joined_auctions(), vec!["a1".to_string()]);

    client.leave("a1").unwrap();
    let leave = conn.next_frame("leave_auction").await;
    assert_eq!(leave.payload, json!({"auctionId": "a1"}));
    assert!(client.joined_auctions().is_empty());

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_events_routed_to_auction_channel() {
    let (addr, mut conns) = start_mock_server().await;
    let client = RealtimeClient::new(&format!("ws://{}", addr));
    client.connect().await.unwrap();
    let conn = next_connection(&mut conns).await;
    wait_for_state(&client, ConnectionState::Connected).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let tx_other = tx.clone();
    let _a1 = client
        .channel("a1")
        .on(ChannelEvent::NewBid, move |payload| {
            let _ = tx.send(("a1", payload.data.clone()));
        })
        .subscribe()
        .unwrap();
    let _a2 = client
        .channel("a2")
        .on(ChannelEvent::NewBid, move |payload| {
            let _ = tx_other.send(("a2", payload.data.clone()));
        })
        .subscribe()
        .unwrap();

    conn.push(json!({"event": "NEW_BID", "payload": {"auctionId": "a1", "amount": 120, "bidderName": "bob"}}));
    conn.push(json!({"event": "NEW_BID", "payload": {"amount": 5}}));
    conn.push(json!({"event": "NEW_BID", "payload": {"auctionId": "a2", "amount": 7}}));

    let (first_channel, first) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(first_channel, "a1");
    assert_eq!(first["bidderName"], "bob");
    // The frame without an auction id is dropped, so a2's frame comes next.
    let (second_channel, second) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(second_channel, "a2");
    assert_eq!(second["amount"], 7);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_dropped_subscription_receives_nothing() {
    let (addr, mut conns) = start_mock_server().await;
    let client = RealtimeClient::new(&format!("ws://{}", addr));
    client.connect().await.unwrap();
    let conn = next_connection(&mut conns).await;
    wait_for_state(&client, ConnectionState::Connected).await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let tx_sold = tx.clone();
    let viewer_subs = client
        .channel("a1")
        .on(ChannelEvent::ViewerCount, move |payload| {
            let _ = tx.send(payload.event);
        })
        .subscribe()
        .unwrap();
    let _sold_subs = client
        .channel("a1")
        .on(ChannelEvent::AuctionSold, move |payload| {
            let _ = tx_sold.send(payload.event);
        })
        .subscribe()
        .unwrap();

    drop(viewer_subs);
    conn.push(json!({"event": "VIEWER_COUNT", "payload": {"auctionId": "a1", "count": 4}}));
    conn.push(json!({"event": "AUCTION_SOLD", "payload": {"auctionId": "a1", "winnerName": "bob", "finalPrice": 120}}));

    // Frames arrive in order, so the sold event proves the viewer count was skipped.
    let received = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(received, ChannelEvent::AuctionSold);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let (addr, mut conns) = start_mock_server().await;
    let client = RealtimeClient::new_with_options(&format!("ws://{}", addr), fast_reconnect());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let _lifecycle = client.on_connection_state(move |state| {
        seen_clone.lock().unwrap().push(state);
    });

    client.connect().await.unwrap();
    let first = next_connection(&mut conns).await;
    wait_for_state(&client, ConnectionState::Connected).await;

    first.close();
    let _second = next_connection(&mut conns).await;
    wait_for_state(&client, ConnectionState::Connected).await;

    let states = seen.lock().unwrap().clone();
    assert_eq!(
        states,
        vec![
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Reconnecting,
            ConnectionState::Connected,
        ]
    );
    assert_eq!(client.reconnect_attempts(), 0);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_no_reconnect_when_disabled() {
    let (addr, mut conns) = start_mock_server().await;
    let options = RealtimeClientOptions {
        auto_reconnect: false,
        ..fast_reconnect()
    };
    let client = RealtimeClient::new_with_options(&format!("ws://{}", addr), options);
    client.connect().await.unwrap();
    let conn = next_connection(&mut conns).await;
    wait_for_state(&client, ConnectionState::Connected).await;

    conn.close();
    wait_for_state(&client, ConnectionState::Disconnected).await;
    assert!(timeout(Duration::from_millis(200), conns.recv()).await.is_err());
}

#[tokio::test]
async fn test_connect_failure_reports_error() {
    // Bind and drop to get a port nobody listens on.
    let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let client = RealtimeClient::new(&format!("ws://{}", addr));
    assert!(client.connect().await.is_err());
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_rejects_unsupported_scheme() {
    let client = RealtimeClient::new("ftp://localhost:21");
    assert!(client.connect().await.is_err());
}
