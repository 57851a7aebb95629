//! Test server lifecycle management
//!
//! Each test gets its own server on a random local port. When dropped, the
//! server is told to shut down.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use echo_ack_server::server::{ServerConfig, WebSocketServer};
use futures_util::StreamExt;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

pub type RawSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long any single read may take before a test fails
pub const READ_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    /// WebSocket URL, e.g. "ws://127.0.0.1:12345"
    pub url: String,
    server: Arc<WebSocketServer>,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(ServerConfig::new("127.0.0.1".to_string(), 0)).await
    }

    pub async fn spawn_with(config: ServerConfig) -> Self {
        let server = Arc::new(
            WebSocketServer::bind(config)
                .await
                .expect("Failed to bind test server"),
        );
        let url = format!("ws://{}", server.local_addr().expect("No local address"));

        let runner = Arc::clone(&server);
        let handle = tokio::spawn(async move { runner.run().await });

        Self {
            url,
            server,
            handle: Some(handle),
        }
    }

    /// Shut the server down and wait for every connection to finish
    pub async fn stop(mut self) {
        self.server.shutdown();
        if let Some(handle) = self.handle.take() {
            timeout(READ_TIMEOUT, handle)
                .await
                .expect("Server did not stop in time")
                .expect("Server task panicked")
                .expect("Server returned an error");
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

/// Open a raw WebSocket connection on any path
pub async fn connect_raw(url: &str) -> RawSocket {
    let (ws, _) = connect_async(url)
        .await
        .expect("Failed to connect to WebSocket");
    ws
}

/// Read the next text frame as JSON, failing on anything else
pub async fn next_json(ws: &mut RawSocket) -> Value {
    let msg = timeout(READ_TIMEOUT, ws.next())
        .await
        .expect("Timed out waiting for a frame")
        .expect("Stream ended")
        .expect("WebSocket error");

    match msg {
        Message::Text(text) => serde_json::from_str(&text).expect("Frame is not JSON"),
        other => panic!("Expected text frame, got {:?}", other),
    }
}
