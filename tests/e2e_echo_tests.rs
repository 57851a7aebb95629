//! End-to-end tests for the echo-ack server
//!
//! Real TCP connections against a server bound to an ephemeral port.

mod common;

use std::time::Duration;

use common::{connect_raw, next_json, TestServer, READ_TIMEOUT};
use echo_ack_server::client::{ClientError, EchoClient};
use echo_ack_server::server::{ServerConfig, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

#[tokio::test]
async fn test_first_frame_is_welcome() {
    let server = TestServer::spawn().await;
    let mut ws = connect_raw(&server.url).await;

    let welcome = next_json(&mut ws).await;
    assert_eq!(
        welcome,
        serde_json::json!({"type": "status", "message": "Connected to server"})
    );
}

#[tokio::test]
async fn test_any_path_is_accepted() {
    let server = TestServer::spawn().await;
    let mut ws = connect_raw(&format!("{}/some/nested/path?x=1", server.url)).await;

    let welcome = next_json(&mut ws).await;
    assert_eq!(welcome["type"], "status");
}

#[tokio::test]
async fn test_echo_is_verbatim() {
    let server = TestServer::spawn().await;
    let mut ws = connect_raw(&server.url).await;
    next_json(&mut ws).await;

    let payloads = [
        "",
        "hello",
        "{\"type\":\"status\"}",
        "quotes \" and backslashes \\ and braces {}",
        "line one\nline two\r\n",
        "unicode: ünïcödé 日本語 \u{1F980}",
        "   ",
    ];

    for payload in payloads {
        ws.send(Message::Text(payload.to_string())).await.unwrap();
        let reply = next_json(&mut ws).await;
        assert_eq!(reply["type"], "echo");
        assert_eq!(reply["received"], payload);
        assert_eq!(reply["status"], "OK");
    }
}

#[tokio::test]
async fn test_echo_order_matches_send_order() {
    let server = TestServer::spawn().await;
    let mut ws = connect_raw(&server.url).await;
    next_json(&mut ws).await;

    ws.send(Message::Text("first".into())).await.unwrap();
    ws.send(Message::Text("second".into())).await.unwrap();

    assert_eq!(next_json(&mut ws).await["received"], "first");
    assert_eq!(next_json(&mut ws).await["received"], "second");
}

#[tokio::test]
async fn test_concurrent_clients_get_only_their_own_echoes() {
    let server = TestServer::spawn().await;
    let mut alice = EchoClient::connect(&server.url).await.unwrap();
    let mut bob = EchoClient::connect(&server.url).await.unwrap();

    let (a, b) = tokio::join!(
        async {
            let mut seen = Vec::new();
            for i in 0..50 {
                seen.push(alice.echo(format!("alice-{i}")).await.unwrap());
            }
            seen
        },
        async {
            let mut seen = Vec::new();
            for i in 0..50 {
                seen.push(bob.echo(format!("bob-{i}")).await.unwrap());
            }
            seen
        }
    );

    assert_eq!(a, (0..50).map(|i| format!("alice-{i}")).collect::<Vec<_>>());
    assert_eq!(b, (0..50).map(|i| format!("bob-{i}")).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_server_survives_client_disconnects() {
    let server = TestServer::spawn().await;

    let client = EchoClient::connect(&server.url).await.unwrap();
    client.close().await.unwrap();

    // Drop a socket without a close handshake
    let mut ws = connect_raw(&server.url).await;
    next_json(&mut ws).await;
    drop(ws);

    let mut client = EchoClient::connect(&server.url).await.unwrap();
    assert_eq!(client.welcome(), "Connected to server");
    assert_eq!(client.echo("still here").await.unwrap(), "still here");
}

#[tokio::test]
async fn test_thousand_rapid_messages() {
    const COUNT: usize = 1000;

    let server = TestServer::spawn().await;
    let mut ws = connect_raw(&server.url).await;
    next_json(&mut ws).await;

    let (mut sink, mut stream) = ws.split();

    let writer = tokio::spawn(async move {
        for i in 0..COUNT {
            sink.send(Message::Text(format!("msg-{i}"))).await.unwrap();
        }
        sink
    });

    for i in 0..COUNT {
        let msg = timeout(READ_TIMEOUT, stream.next())
            .await
            .expect("Timed out waiting for echo")
            .expect("Stream ended")
            .expect("WebSocket error");
        let text = match msg {
            Message::Text(text) => text,
            other => panic!("Expected text frame, got {:?}", other),
        };
        assert_eq!(
            ServerMessage::from_json(&text).unwrap(),
            ServerMessage::echo(format!("msg-{i}"))
        );
    }

    let _sink = writer.await.unwrap();

    // Nothing beyond the thousand echoes
    let extra = timeout(Duration::from_millis(200), stream.next()).await;
    assert!(extra.is_err(), "Unexpected extra frame: {:?}", extra);
}

#[tokio::test]
async fn test_binary_frames_get_no_reply() {
    let server = TestServer::spawn().await;
    let mut ws = connect_raw(&server.url).await;
    next_json(&mut ws).await;

    ws.send(Message::Binary(b"\x00\x01binary".to_vec())).await.unwrap();
    ws.send(Message::Text("text".into())).await.unwrap();

    let reply = next_json(&mut ws).await;
    assert_eq!(reply["received"], "text");
}

#[tokio::test]
async fn test_oversized_message_drops_connection() {
    let config = ServerConfig::new("127.0.0.1".to_string(), 0).with_max_message_size(1024);
    let server = TestServer::spawn_with(config).await;
    let mut client = EchoClient::connect(&server.url).await.unwrap();

    let result = timeout(READ_TIMEOUT, client.echo("x".repeat(4096)))
        .await
        .expect("Timed out waiting for the server to drop the connection");
    assert!(result.is_err(), "Oversized message was echoed: {:?}", result);

    // Other clients are unaffected
    let mut other = EchoClient::connect(&server.url).await.unwrap();
    assert_eq!(other.echo("small").await.unwrap(), "small");
}

#[tokio::test]
async fn test_shutdown_closes_open_connections() {
    let server = TestServer::spawn().await;
    let mut client = EchoClient::connect(&server.url).await.unwrap();
    assert_eq!(client.echo("before").await.unwrap(), "before");

    server.stop().await;

    let next = timeout(READ_TIMEOUT, client.next_message())
        .await
        .expect("Timed out waiting for close");
    assert!(matches!(next, Err(ClientError::Closed)), "Got {:?}", next);
}
