//! WebSocket server implementation
//!
//! Provides a WebSocket server that listens on a configurable address and
//! runs one echo handler task per accepted connection.

use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_tungstenite::accept_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, error, info};

use super::handler::{shutdown_requested, ConnectionError, ConnectionHandler, Disconnect};
use super::protocol::{DEFAULT_BIND, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PORT};

/// Configuration for the WebSocket server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind: String,
    /// Port to listen on
    pub port: u16,
    /// Largest inbound message or frame accepted, in bytes
    pub max_message_size: usize,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(bind: String, port: u16) -> Self {
        Self {
            bind,
            port,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Set the inbound message size limit
    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// tungstenite settings applied to every accepted connection
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            max_message_size: Some(self.max_message_size),
            max_frame_size: Some(self.max_message_size),
            ..Default::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BIND.to_string(), DEFAULT_PORT)
    }
}

/// WebSocket server answering every client with welcome and echo messages
pub struct WebSocketServer {
    config: ServerConfig,
    listener: TcpListener,
    shutdown_tx: watch::Sender<bool>,
}

impl WebSocketServer {
    /// Bind the listening socket
    pub async fn bind(config: ServerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(config.socket_addr()).await?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            listener,
            shutdown_tx,
        })
    }

    /// Address the listener is actually bound to
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Trigger server shutdown
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Run the WebSocket server
    ///
    /// Accepts connections until shutdown is triggered, then closes every open
    /// connection and waits for its handler to finish.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("WebSocket server started on ws://{}", self.local_addr()?);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let shutdown_rx = self.shutdown_tx.subscribe();
                            let ws_config = self.config.websocket_config();

                            connections.spawn(async move {
                                let outcome = handle_connection(
                                    stream,
                                    peer_addr,
                                    ws_config,
                                    shutdown_rx,
                                )
                                .await;
                                if let Err(e) = outcome {
                                    error!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
                _ = shutdown_requested(&mut shutdown_rx) => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        if !connections.is_empty() {
            info!("Waiting for {} active connections to close...", connections.len());
        }
        while connections.join_next().await.is_some() {}

        Ok(())
    }
}

/// Upgrade a TCP stream and hand it to a connection handler
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ws_config: WebSocketConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<Disconnect, ConnectionError> {
    // A client that never sends the upgrade request must not hold up shutdown
    let ws_stream = tokio::select! {
        result = accept_async_with_config(stream, Some(ws_config)) => {
            result.map_err(ConnectionError::Handshake)?
        }
        _ = shutdown_requested(&mut shutdown_rx) => {
            debug!("Shutdown during handshake with {}, dropping connection", peer_addr);
            return Ok(Disconnect::Shutdown);
        }
    };

    let handler = ConnectionHandler::new(peer_addr);
    info!(connection = %handler.id(), "Client connected from {}", handler.peer_addr());

    let outcome = handler.run(ws_stream, shutdown_rx).await;
    match &outcome {
        Ok(Disconnect::PeerClosed) => {
            info!(connection = %handler.id(), "Client disconnected");
        }
        Ok(Disconnect::Shutdown) => {
            info!(connection = %handler.id(), "Connection closed for shutdown");
        }
        Err(e) => {
            debug!(connection = %handler.id(), "Handler failed: {:?}", e);
        }
    }
    outcome
}
