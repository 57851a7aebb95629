//! WebSocket connection handler
//!
//! Runs the per-connection loop: greet the client once, then answer every
//! inbound text frame with an echo acknowledgment, strictly in receive order,
//! until the peer goes away or the server shuts down.

use std::io::ErrorKind;
use std::net::SocketAddr;

use futures_util::{Sink, SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::error::ProtocolError as WsProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::protocol::{ProtocolError, ServerMessage};

/// Errors that end a connection other than a clean peer close
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[source] WsError),

    #[error("WebSocket transport error: {0}")]
    Transport(#[from] WsError),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] ProtocolError),
}

impl ConnectionError {
    /// Whether this error only means the peer went away
    pub fn is_peer_closed(&self) -> bool {
        let ConnectionError::Transport(err) = self else {
            return false;
        };

        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => true,
            WsError::Protocol(WsProtocolError::ResetWithoutClosingHandshake) => true,
            WsError::Io(io) => matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// How a connection ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// The client closed the connection or dropped the socket
    PeerClosed,
    /// The server is shutting down and closed the connection itself
    Shutdown,
}

/// Handles a single WebSocket connection
pub struct ConnectionHandler {
    id: Uuid,
    peer_addr: SocketAddr,
}

impl ConnectionHandler {
    /// Create a new connection handler
    pub fn new(peer_addr: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer_addr,
        }
    }

    /// Connection id used to correlate log lines
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Remote address of the client
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Run the greeting and echo loop on an upgraded stream
    ///
    /// A peer that closes or drops the connection, at any point, yields
    /// `Ok(Disconnect::PeerClosed)`. Every other failure is returned.
    pub async fn run<S>(
        &self,
        ws_stream: WebSocketStream<S>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Disconnect, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        match self.serve(ws_stream, shutdown_rx).await {
            Err(e) if e.is_peer_closed() => {
                debug!(connection = %self.id, "Peer dropped connection: {}", e);
                Ok(Disconnect::PeerClosed)
            }
            other => other,
        }
    }

    async fn serve<S>(
        &self,
        ws_stream: WebSocketStream<S>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Disconnect, ConnectionError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        send_message(&mut ws_sender, &ServerMessage::welcome()).await?;
        debug!(connection = %self.id, "Sent welcome message to {}", self.peer_addr);

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            info!(connection = %self.id, "Received: {}", text);
                            send_message(&mut ws_sender, &ServerMessage::echo(text)).await?;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            warn!(
                                connection = %self.id,
                                "Received binary message from {} ({} bytes), ignoring",
                                self.peer_addr,
                                data.len()
                            );
                        }
                        Some(Ok(Message::Ping(_))) => {
                            // tungstenite queues the pong on its own
                            trace!(connection = %self.id, "Ping received");
                        }
                        Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                        Some(Ok(Message::Close(frame))) => {
                            debug!(connection = %self.id, ?frame, "Client requested close");
                            // Flushes the close reply tungstenite queued
                            let _ = ws_sender.close().await;
                            return Ok(Disconnect::PeerClosed);
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(Disconnect::PeerClosed),
                    }
                }
                _ = shutdown_requested(&mut shutdown_rx) => {
                    debug!(
                        connection = %self.id,
                        "Shutdown signal received, closing connection to {}",
                        self.peer_addr
                    );
                    let _ = ws_sender.send(Message::Close(None)).await;
                    return Ok(Disconnect::Shutdown);
                }
            }
        }
    }
}

/// Resolves once shutdown has been requested or the server is gone
///
/// The flag is sticky, so a receiver subscribed after the request still sees it.
pub(crate) async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

/// Encode a server message and send it as a single text frame
async fn send_message<K>(sink: &mut K, message: &ServerMessage) -> Result<(), ConnectionError>
where
    K: Sink<Message, Error = WsError> + Unpin,
{
    let json = message.to_json()?;
    sink.send(Message::Text(json)).await?;
    Ok(())
}
