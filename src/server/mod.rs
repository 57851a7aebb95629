//! WebSocket server module
//!
//! Accepts WebSocket connections and runs one echo handler per client.

mod handler;
mod protocol;
mod websocket;

pub use handler::*;
pub use protocol::*;
pub use websocket::*;
