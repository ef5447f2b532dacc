#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use sigrelay_common::types::{message_type, WS_PATH};
use sigrelay_common::ConnectionId;
use sigrelay_server::config::ServerConfig;
use sigrelay_server::server::ServerState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

pub fn test_config(listen: SocketAddr) -> ServerConfig {
    ServerConfig {
        listen,
        metrics_addr: "127.0.0.1:0".parse().unwrap(),
        static_dir: std::env::temp_dir(),
        ..ServerConfig::default()
    }
}

pub fn ws_url(addr: &SocketAddr) -> String {
    format!("ws://{addr}{WS_PATH}")
}

pub struct TestClient {
    pub ws_tx: futures_util::stream::SplitSink<WsStream, Message>,
    pub ws_rx: futures_util::stream::SplitStream<WsStream>,
    pub id: ConnectionId,
}

impl TestClient {
    /// Connect and consume the `myId` greeting, which must be the first message.
    pub async fn connect(addr: &SocketAddr) -> Self {
        let (ws, _) = tokio_tungstenite::connect_async(ws_url(addr)).await.unwrap();
        let (ws_tx, ws_rx) = ws.split();
        let mut client = Self {
            ws_tx,
            ws_rx,
            id: ConnectionId::from_bytes([0; 16]),
        };

        let greeting = client.recv_json().await;
        assert_eq!(greeting["type"], message_type::MY_ID, "first message was {greeting}");
        client.id = greeting["id"].as_str().unwrap().parse().unwrap();
        client
    }

    pub async fn send_json(&mut self, value: Value) {
        self.send_raw(&value.to_string()).await;
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws_tx
            .send(Message::Text(text.to_string()))
            .await
            .unwrap();
    }

    pub async fn recv_json(&mut self) -> Value {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), self.ws_rx.next())
                .await
                .expect("timeout waiting for message")
                .expect("connection ended")
                .unwrap();
            match msg {
                Message::Text(text) => return serde_json::from_str(&text).unwrap(),
                Message::Ping(_) | Message::Pong(_) => {}
                other => panic!("expected text message, got {other:?}"),
            }
        }
    }

    pub async fn recv_json_timeout(&mut self, timeout: Duration) -> Option<Value> {
        tokio::time::timeout(timeout, self.recv_json()).await.ok()
    }

    /// Read until a `peerCount` announcing `expected` arrives. Other counts
    /// are skipped; any relayed message on the way is a test failure.
    pub async fn wait_for_peer_count(&mut self, expected: u64) {
        loop {
            let msg = self.recv_json().await;
            assert_eq!(msg["type"], message_type::PEER_COUNT, "unexpected message {msg}");
            if msg["count"] == expected {
                return;
            }
        }
    }

    /// Next message that is not a `peerCount` notification.
    pub async fn recv_relayed(&mut self) -> Value {
        loop {
            let msg = self.recv_json().await;
            if msg["type"] != message_type::PEER_COUNT {
                return msg;
            }
        }
    }

    pub async fn recv_relayed_timeout(&mut self, timeout: Duration) -> Option<Value> {
        tokio::time::timeout(timeout, self.recv_relayed()).await.ok()
    }

    pub async fn close(mut self) {
        let _ = self.ws_tx.close().await;
    }
}

/// Poll `check` until it holds or five seconds pass.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub async fn start_server() -> (SocketAddr, Arc<ServerState>) {
    start_server_with(|_| {}).await
}

pub async fn start_server_with(
    configure: impl FnOnce(&mut ServerConfig),
) -> (SocketAddr, Arc<ServerState>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mut config = test_config(addr);
    configure(&mut config);
    let state = Arc::new(ServerState::new(config));

    let state_clone = state.clone();
    tokio::spawn(async move {
        if let Err(e) = sigrelay_server::run(listener, state_clone).await {
            eprintln!("server error in test: {e}");
        }
    });

    (addr, state)
}
