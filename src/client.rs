//! Echo client
//!
//! Connects to the echo server, reads the welcome status and exchanges text
//! messages for typed echo replies. Used by the `echo-client` binary and the
//! end-to-end tests.

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};

use crate::server::{ProtocolError, ServerMessage};

/// Errors that can occur while talking to the server
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect: {0}")]
    Connect(#[source] WsError),

    #[error("WebSocket transport error: {0}")]
    Transport(#[from] WsError),

    #[error("Invalid server message: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Unexpected server message: {0:?}")]
    UnexpectedMessage(ServerMessage),

    #[error("Unexpected binary frame ({0} bytes)")]
    UnexpectedBinary(usize),

    #[error("Connection closed by server")]
    Closed,
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;

/// A connected echo client
pub struct EchoClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    welcome: String,
}

impl EchoClient {
    /// Connect and wait for the server's welcome status
    pub async fn connect(url: &str) -> ClientResult<Self> {
        let (ws, _) = connect_async(url).await.map_err(ClientError::Connect)?;
        let mut client = Self {
            ws,
            welcome: String::new(),
        };

        match client.next_message().await? {
            ServerMessage::Status { message } => {
                debug!("Connected to {}: {}", url, message);
                client.welcome = message;
                Ok(client)
            }
            other => Err(ClientError::UnexpectedMessage(other)),
        }
    }

    /// Status text the server greeted us with
    pub fn welcome(&self) -> &str {
        &self.welcome
    }

    /// Send one text frame
    pub async fn send_text(&mut self, text: impl Into<String>) -> ClientResult<()> {
        self.ws.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Read the next server message, skipping control frames
    pub async fn next_message(&mut self) -> ClientResult<ServerMessage> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(ServerMessage::from_json(&text)?),
                Some(Ok(Message::Binary(data))) => {
                    return Err(ClientError::UnexpectedBinary(data.len()))
                }
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                    trace!("Control frame received");
                }
                Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(_))) | None => return Err(ClientError::Closed),
                Some(Err(WsError::ConnectionClosed)) => return Err(ClientError::Closed),
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Send a message and wait for its echo, returning the echoed payload
    pub async fn echo(&mut self, text: impl Into<String>) -> ClientResult<String> {
        self.send_text(text).await?;
        match self.next_message().await? {
            ServerMessage::Echo { received, .. } => Ok(received),
            other => Err(ClientError::UnexpectedMessage(other)),
        }
    }

    /// Close the connection with a normal close handshake
    pub async fn close(mut self) -> ClientResult<()> {
        match self.ws.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
