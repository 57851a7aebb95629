//! Echo client
//!
//! Connects to an echo-ack server, sends a greeting, then sends a timestamped
//! message on a fixed interval and logs every acknowledgment.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::signal;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use echo_ack_server::client::{ClientError, EchoClient};

/// Echo-ack client
#[derive(Parser, Debug)]
#[command(name = "echo-client")]
#[command(version, about, long_about = None)]
struct Args {
    /// Server URL
    #[arg(short, long, default_value = "ws://127.0.0.1:8765")]
    url: String,

    /// Seconds between periodic messages
    #[arg(short, long, default_value_t = 5)]
    interval_secs: u64,

    /// Stop after this many periodic messages
    #[arg(short, long)]
    count: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

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

    let mut client = EchoClient::connect(&args.url).await?;
    info!("Connected to {}: {}", args.url, client.welcome());

    // One handler for the whole session, also watched while an echo is in flight
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let greeting = unless_interrupted(client.echo("Hello from echo-client"), &mut ctrl_c).await;
    let Some(greeting) = greeting else {
        info!("Received SIGINT (Ctrl+C)");
        client.close().await?;
        return Ok(());
    };
    info!("Acknowledged: {}", greeting?);

    let started = Instant::now();
    let mut ticker = interval(Duration::from_secs(args.interval_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    let mut sent = 0u64;
    while args.count.map_or(true, |count| sent < count) {
        if unless_interrupted(ticker.tick(), &mut ctrl_c).await.is_none() {
            info!("Received SIGINT (Ctrl+C)");
            break;
        }

        let message = format!("echo-client time: {}", started.elapsed().as_millis());
        match unless_interrupted(client.echo(message.as_str()), &mut ctrl_c).await {
            Some(Ok(received)) => info!("Sent: {} / acknowledged: {}", message, received),
            Some(Err(ClientError::Closed)) => {
                warn!("Server closed the connection");
                return Ok(());
            }
            Some(Err(e)) => return Err(e.into()),
            None => {
                info!("Received SIGINT (Ctrl+C)");
                break;
            }
        }
        sent += 1;
    }

    client.close().await?;
    info!("Disconnected");
    Ok(())
}

/// Drive `work` to completion unless `interrupt` resolves first
async fn unless_interrupted<F, I>(work: F, interrupt: &mut Pin<&mut I>) -> Option<F::Output>
where
    F: Future,
    I: Future,
{
    tokio::select! {
        output = work => Some(output),
        _ = interrupt.as_mut() => None,
    }
}
