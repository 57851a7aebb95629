//! Echo-ack WebSocket server
//!
//! Greets every client with a status message and answers each text frame with
//! an `echo` acknowledgment carrying the original payload.

pub mod client;
pub mod server;
