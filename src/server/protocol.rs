//! Protocol message definitions
//!
//! Defines the JSON messages the server sends to clients. Inbound client text
//! is opaque and never parsed, so only the server side of the wire is typed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Greeting carried by the status message sent on connect
pub const WELCOME_TEXT: &str = "Connected to server";

/// Default bind address
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Default listen port
pub const DEFAULT_PORT: u16 = 8765;

/// Maximum inbound message size (1MB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

// ============================================================================
// Error Types
// ============================================================================

/// Protocol-related errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

// ============================================================================
// Server Messages
// ============================================================================

/// Acknowledgment marker attached to every echo
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AckStatus {
    #[serde(rename = "OK")]
    Ok,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Status message, sent once right after the handshake
    Status {
        /// Human readable status text
        message: String,
    },

    /// Acknowledgment of one inbound text message
    Echo {
        /// The inbound payload, verbatim
        received: String,
        /// Always `OK`
        status: AckStatus,
    },
}

impl ServerMessage {
    /// Create the welcome status message
    pub fn welcome() -> Self {
        ServerMessage::Status {
            message: WELCOME_TEXT.to_string(),
        }
    }

    /// Create an echo acknowledgment for a received payload
    pub fn echo(received: impl Into<String>) -> Self {
        ServerMessage::Echo {
            received: received.into(),
            status: AckStatus::Ok,
        }
    }

    /// Serialize the message to compact JSON
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a server message from JSON (used by the client side)
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
