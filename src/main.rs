//! Echo-ack WebSocket server
//!
//! Greets every WebSocket client with a status message and acknowledges each
//! text message it sends with an echo.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use echo_ack_server::server::{
    ServerConfig, WebSocketServer, DEFAULT_BIND, DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PORT,
};

/// Echo-ack WebSocket server
///
/// Sends a welcome status on connect and echoes every text message back
#[derive(Parser, Debug)]
#[command(name = "echo-ack-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Bind address
    #[arg(long, default_value = DEFAULT_BIND)]
    bind: String,

    /// Largest accepted inbound message, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_MESSAGE_SIZE)]
    max_message_size: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("Echo-ack server v{}", env!("CARGO_PKG_VERSION"));

    let config =
        ServerConfig::new(args.bind, args.port).with_max_message_size(args.max_message_size);

    let server = Arc::new(WebSocketServer::bind(config).await?);
    let server_handle = Arc::clone(&server);

    // Spawn shutdown signal handler
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Initiating graceful shutdown...");
        server_handle.shutdown();
    });

    server.run().await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }
}
