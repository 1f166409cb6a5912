#![allow(dead_code)]

use auction_live::config::ClientOptions;
use auction_live::notify::{ChannelNotifier, Notification};
use auction_live::realtime::{RealtimeClientOptions, RealtimeMessage};
use auction_live::storage::{MemoryTokenStore, TokenStore};
use auction_live::AuctionClient;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const WAIT: Duration = Duration::from_secs(3);

/// A socket URL nothing listens on
pub const DEAD_SOCKET: &str = "ws://127.0.0.1:1";

pub fn user_json(balance: Value) -> Value {
    json!({
        "id": "u1",
        "email": "alice@example.com",
        "username": "alice",
        "balance": balance
    })
}

pub fn auction_json(id: &str, current_price: Value, highest_bidder: Option<&str>) -> Value {
    json!({
        "id": id,
        "title": "Brass Lamp",
        "description": "Works",
        "startingPrice": 50,
        "currentPrice": current_price,
        "minimumBidIncrement": 1,
        "status": "active",
        "sellerId": "s1",
        "highestBidderUsername": highest_bidder,
        "createdAt": "2024-05-01T12:00:00Z",
        "endsAt": "2099-05-02T12:00:00Z"
    })
}

pub fn bids_json(amounts: &[(i64, &str)]) -> Value {
    let bids: Vec<Value> = amounts
        .iter()
        .enumerate()
        .map(|(i, (amount, username))| {
            json!({
                "id": format!("b{}", i),
                "amount": amount,
                "userId": format!("user-{}", username),
                "username": username,
                "createdAt": format!("2024-05-01T12:{:02}:00Z", i)
            })
        })
        .collect();
    json!({ "bids": bids })
}

pub struct TestClient {
    pub client: AuctionClient,
    pub tokens: Arc<MemoryTokenStore>,
    pub notifications: mpsc::UnboundedReceiver<Notification>,
}

impl TestClient {
    /// Everything received so far.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut received = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            received.push(notification);
        }
        received
    }

    pub async fn next_notification(&mut self) -> Notification {
        timeout(WAIT, self.notifications.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("notifier gone")
    }
}

pub fn test_client(api_url: &str, ws_url: &str) -> TestClient {
    let options = ClientOptions::new(api_url)
        .unwrap()
        .with_ws_url(ws_url)
        .with_request_timeout(Some(Duration::from_secs(5)))
        .with_realtime(RealtimeClientOptions {
            reconnect_interval: 300,
            max_reconnect_interval: 500,
            ..Default::default()
        });
    let tokens = Arc::new(MemoryTokenStore::new());
    let (notifier, notifications) = ChannelNotifier::new();
    let client = AuctionClient::with_token_store(
        options,
        Arc::new(notifier),
        tokens.clone() as Arc<dyn TokenStore>,
    )
    .unwrap();
    TestClient {
        client,
        tokens,
        notifications,
    }
}

pub async fn mount_login(server: &MockServer, token: &str, balance: Value) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": token,
            "user": user_json(balance)
        })))
        .mount(server)
        .await;
}

pub async fn mount_profile(server: &MockServer, balance: Value) {
    Mock::given(method("GET"))
        .and(path("/auth/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json(balance)))
        .mount(server)
        .await;
}

/// One accepted connection on the mock socket server
pub struct MockConnection {
    /// Request path and query of the handshake
    pub uri: String,
    inbound: mpsc::UnboundedReceiver<RealtimeMessage>,
    outbound: mpsc::UnboundedSender<Option<Value>>,
}

impl MockConnection {
    /// Waits for the next frame with the given event, skipping others.
    pub async fn next_frame(&mut self, event: &str) -> RealtimeMessage {
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

    pub fn push(&self, event: &str, payload: Value) {
        self.outbound
            .send(Some(json!({ "event": event, "payload": payload })))
            .unwrap();
    }

    pub fn close(&self) {
        self.outbound.send(None).unwrap();
    }
}

pub struct MockSocketServer {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<MockConnection>,
}

impl MockSocketServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (conn_tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let uri = Arc::new(Mutex::new(String::new()));
                let uri_clone = uri.clone();
                let callback =
                    move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        *uri_clone.lock().unwrap() = req.uri().to_string();
                        Ok(resp)
                    };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    continue;
                };

                let (in_tx, inbound) = mpsc::unbounded_channel();
                let (outbound, mut out_rx) = mpsc::unbounded_channel::<Option<Value>>();
                let uri = uri.lock().unwrap().clone();
                if conn_tx
                    .send(MockConnection {
                        uri,
                        inbound,
                        outbound,
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

        Self { addr, connections }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn next_connection(&mut self) -> MockConnection {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("timed out waiting for connection")
            .expect("server gone")
    }
}

/// Polls `condition` until it holds or the wait runs out.
pub async fn wait_until<F: Fn() -> bool>(what: &str, condition: F) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", what));
}
