use crate::config::Settings;
use crate::hub::{ChatMessage, Hub};
use crate::relay::Relay;
use crate::transport::websocket::WebSocketServer;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tungstenite::protocol::Message as WsMessage;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    hub: Hub,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

async fn start_server(relay_url: Option<String>) -> TestServer {
    let mut settings = Settings::default();
    settings.server.port = 0;
    settings.relay.url = relay_url;
    settings.relay.timeout_ms = 1000;

    let (hub, dispatcher) = Hub::new(&settings.hub);
    tokio::spawn(dispatcher.run());
    let relay = Relay::new(&settings.relay).expect("relay");

    let server = WebSocketServer::bind(&settings, hub.clone(), relay)
        .await
        .expect("bind");
    let addr = server.local_addr().expect("local addr");
    let (shutdown, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(server.run(shutdown_rx));

    TestServer {
        addr,
        hub,
        shutdown,
        task,
    }
}

async fn connect(server: &TestServer) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/ws", server.addr))
        .await
        .expect("WebSocket handshake failed");
    ws
}

/// Connects `n` clients and waits until the hub has registered all of them.
async fn connect_all(server: &TestServer, n: usize) -> Vec<Client> {
    let mut clients = Vec::new();
    for _ in 0..n {
        clients.push(connect(server).await);
    }
    let registry = server.hub.registry().clone();
    wait_until(|| registry.len() == n).await;
    clients
}

async fn wait_until(cond: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn send(ws: &mut Client, channel: &str, message: &str, from: &str) {
    let frame = json!({"channelId": channel, "message": message, "messageFrom": from});
    ws.send(WsMessage::text(frame.to_string()))
        .await
        .expect("Failed to send message");
}

async fn next_message(ws: &mut Client) -> ChatMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("read failed");
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap_or_else(|e| {
                panic!("Failed to deserialize ChatMessage from '{}': {e}", text.as_str())
            });
        }
    }
}

#[tokio::test]
async fn test_message_reaches_every_connection() {
    let persistence = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(body_json(json!({
            "channelId": "c1",
            "message": "hi",
            "messageFrom": "u1"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "abc"})))
        .expect(1)
        .mount(&persistence)
        .await;

    let server = start_server(Some(format!("{}/messages", persistence.uri()))).await;
    let mut clients = connect_all(&server, 2).await;

    let before = Utc::now();
    let frame = json!({
        "channelId": "c1",
        "message": "hi",
        "messageFrom": "u1",
        "timeStamp": "1999-12-31T23:59:59Z"
    });
    clients[0]
        .send(WsMessage::text(frame.to_string()))
        .await
        .unwrap();

    for ws in clients.iter_mut() {
        let msg = next_message(ws).await;
        assert_eq!(msg.channel_id, "c1");
        assert_eq!(msg.message, "hi");
        assert_eq!(msg.message_from, "u1");
        assert!(msg.timestamp >= before);
        assert!(msg.timestamp <= Utc::now());
    }

    persistence.verify().await;
}

#[tokio::test]
async fn test_unreachable_persistence_still_broadcasts() {
    let server = start_server(Some("http://127.0.0.1:1/messages".to_string())).await;
    let mut clients = connect_all(&server, 2).await;

    send(&mut clients[0], "c1", "first", "u1").await;
    assert_eq!(next_message(&mut clients[1]).await.message, "first");

    // The sender stays open and can keep talking.
    send(&mut clients[0], "c1", "second", "u1").await;
    assert_eq!(next_message(&mut clients[1]).await.message, "second");
    assert_eq!(server.hub.registry().len(), 2);
}

#[tokio::test]
async fn test_dropped_peer_does_not_affect_others() {
    let server = start_server(None).await;
    let mut clients = connect_all(&server, 3).await;

    // Drop the third client without a close handshake.
    let gone = clients.pop().unwrap();
    drop(gone);

    for text in ["one", "two", "three"] {
        send(&mut clients[0], "c1", text, "u1").await;
    }
    for ws in clients.iter_mut() {
        for expected in ["one", "two", "three"] {
            assert_eq!(next_message(ws).await.message, expected);
        }
    }

    let registry = server.hub.registry().clone();
    wait_until(|| registry.len() == 2).await;
}

#[tokio::test]
async fn test_closed_connections_are_deregistered() {
    let server = start_server(None).await;
    let mut clients = connect_all(&server, 3).await;

    clients[0].close(None).await.unwrap();
    clients[1].close(None).await.unwrap();

    let registry = server.hub.registry().clone();
    wait_until(|| registry.len() == 1).await;

    send(&mut clients[2], "c9", "still here", "u3").await;
    assert_eq!(next_message(&mut clients[2]).await.message, "still here");
}

#[tokio::test]
async fn test_wrong_path_is_rejected() {
    let server = start_server(None).await;

    let result = connect_async(format!("ws://{}/elsewhere", server.addr)).await;

    match result {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), tungstenite::http::StatusCode::NOT_FOUND);
        }
        other => panic!(
            "Expected a 404 handshake failure, got {:?}",
            other.map(|_| ())
        ),
    }
    assert!(server.hub.registry().is_empty());
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let server = start_server(None).await;
    let mut clients = connect_all(&server, 2).await;

    server.shutdown.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(3), server.task)
        .await
        .expect("server did not stop")
        .unwrap();

    assert!(server.hub.registry().is_empty());
    for ws in clients.iter_mut() {
        let end = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("client was not closed");
        assert!(matches!(end, None | Some(Ok(WsMessage::Close(_))) | Some(Err(_))));
    }
}

async fn plain_get(addr: SocketAddr, target: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {target} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_string(&mut response))
        .await
        .expect("timed out reading response")
        .unwrap();
    response
}

#[tokio::test]
async fn test_root_answers_liveness_checks() {
    let server = start_server(None).await;

    let response = plain_get(server.addr, "/").await;

    assert!(response.starts_with("HTTP/1.1 200 OK"), "got {response:?}");
    assert!(response.ends_with("ok\n"));
    assert!(server.hub.registry().is_empty());
}

#[tokio::test]
async fn test_plain_request_elsewhere_is_not_found() {
    let server = start_server(None).await;

    let response = plain_get(server.addr, "/ws").await;

    assert!(response.starts_with("HTTP/1.1 404 Not Found"), "got {response:?}");

    // WebSocket clients on the same port are unaffected.
    let _clients = connect_all(&server, 1).await;
}
