// End-to-end tests for the relay over real HTTP and WebSocket connections

use chatrelay::{Event, Message, MessageStore, Relay, RelayServer};
use futures::StreamExt;
use hyper::{Body, Client, Method, Request, StatusCode};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

async fn start_server(admin_keys: &[&str], db_path: &Path) -> SocketAddr {
    let store = MessageStore::open(db_path).unwrap();
    let keys: HashSet<String> = admin_keys.iter().map(|k| k.to_string()).collect();
    let relay = Arc::new(Relay::new(store, keys));

    let server = RelayServer::bind("127.0.0.1:0".parse().unwrap(), relay).unwrap();
    let addr = server.local_addr();
    tokio::spawn(server.run());

    addr
}

async fn post(
    addr: SocketAddr,
    path: &str,
    content_type: &str,
    body: String,
) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method(Method::POST)
        .uri(format!("http://{}{}", addr, path))
        .header("content-type", content_type)
        .body(Body::from(body))
        .unwrap();

    let res = Client::new().request(req).await.unwrap();
    let status = res.status();
    let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);

    (status, json)
}

async fn post_json(
    addr: SocketAddr,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    post(addr, path, "application/json", body.to_string()).await
}

async fn fetch_messages(addr: SocketAddr) -> Vec<Message> {
    let res = Client::new()
        .get(format!("http://{}/messages", addr).parse().unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let bytes = hyper::body::to_bytes(res.into_body()).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn recv_event<S>(ws: &mut S) -> Event
where
    S: StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .expect("live channel ended")
            .expect("websocket error");

        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn test_submit_fetch_delete_scenario() {
    let dir = tempdir().unwrap();
    let addr = start_server(&["secret"], &dir.path().join("relay.db")).await;

    // First submission gets id 1
    let (status, json) = post_json(
        addr,
        "/send-message",
        serde_json::json!({"nick": "a", "message": "hi"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["id"], 1);
    assert_eq!(json["nickname"], "a");
    assert_eq!(json["message"], "hi");
    assert!(json["timestamp"].as_str().is_some_and(|t| !t.is_empty()));

    // Emoji stripped from the nickname, id 2 assigned
    let (status, json) = post_json(
        addr,
        "/send-message",
        serde_json::json!({"nick": "b😀", "message": "yo"}),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["id"], 2);
    assert_eq!(json["nickname"], "b");

    // Both messages, ascending id order
    let messages = fetch_messages(addr).await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].id, 1);
    assert_eq!(messages[1].id, 2);

    // Admin delete of id 1
    let (status, json) = post_json(
        addr,
        "/delete-message",
        serde_json::json!({"messageId": 1, "adminkey": "secret"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["deleted"], 1);

    let messages = fetch_messages(addr).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, 2);
}

#[tokio::test]
async fn test_form_encoded_submission() {
    let dir = tempdir().unwrap();
    let addr = start_server(&[], &dir.path().join("relay.db")).await;

    let (status, json) = post(
        addr,
        "/send-message",
        "application/x-www-form-urlencoded",
        "nick=form-user&message=hello+form".to_string(),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["nickname"], "form-user");
    assert_eq!(json["message"], "hello form");
}

#[tokio::test]
async fn test_submit_validation_rejected() {
    let dir = tempdir().unwrap();
    let addr = start_server(&[], &dir.path().join("relay.db")).await;

    let (status, _) = post_json(
        addr,
        "/send-message",
        serde_json::json!({"nick": "", "message": "hi"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Emoji-only nickname is empty after sanitization
    let (status, _) = post_json(
        addr,
        "/send-message",
        serde_json::json!({"nick": "😀", "message": "hi"}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(fetch_messages(addr).await.is_empty());
}

#[tokio::test]
async fn test_delete_auth_and_not_found() {
    let dir = tempdir().unwrap();
    let addr = start_server(&["secret"], &dir.path().join("relay.db")).await;

    post_json(
        addr,
        "/send-message",
        serde_json::json!({"nick": "a", "message": "hi"}),
    )
    .await;

    let (status, _) = post_json(
        addr,
        "/delete-message",
        serde_json::json!({"messageId": 1, "adminkey": "wrong"}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = post_json(
        addr,
        "/delete-message",
        serde_json::json!({"messageId": 999, "adminkey": "secret"}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The rejected requests left the message in place
    assert_eq!(fetch_messages(addr).await.len(), 1);
}

#[tokio::test]
async fn test_unknown_route() {
    let dir = tempdir().unwrap();
    let addr = start_server(&[], &dir.path().join("relay.db")).await;

    let res = Client::new()
        .get(format!("http://{}/nope", addr).parse().unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_live_channel_receives_submissions_and_deletes() {
    let dir = tempdir().unwrap();
    let addr = start_server(&["secret"], &dir.path().join("relay.db")).await;

    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();

    post_json(
        addr,
        "/send-message",
        serde_json::json!({"nick": "a", "message": "hi"}),
    )
    .await;

    match recv_event(&mut ws).await {
        Event::Message(m) => {
            assert_eq!(m.id, 1);
            assert_eq!(m.nickname, "a");
            assert_eq!(m.body, "hi");
        }
        other => panic!("unexpected event: {:?}", other),
    }

    post_json(
        addr,
        "/delete-message",
        serde_json::json!({"messageId": 1, "adminkey": "secret"}),
    )
    .await;

    assert_eq!(recv_event(&mut ws).await, Event::Delete { id: 1 });
}

#[tokio::test]
async fn test_live_channel_history_then_live_no_duplicates() {
    let dir = tempdir().unwrap();
    let addr = start_server(&[], &dir.path().join("relay.db")).await;

    // Two messages exist before the listener connects
    for body in ["one", "two"] {
        post_json(
            addr,
            "/send-message",
            serde_json::json!({"nick": "a", "message": body}),
        )
        .await;
    }

    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();

    // Snapshot arrives first, in order
    let mut seen = Vec::new();
    for _ in 0..2 {
        match recv_event(&mut ws).await {
            Event::Message(m) => seen.push(m.id),
            other => panic!("unexpected event: {:?}", other),
        }
    }
    assert_eq!(seen, vec![1, 2]);

    // Then live events, exactly once each
    post_json(
        addr,
        "/send-message",
        serde_json::json!({"nick": "a", "message": "three"}),
    )
    .await;

    match recv_event(&mut ws).await {
        Event::Message(m) => {
            assert_eq!(m.id, 3);
            assert_eq!(m.body, "three");
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_late_listener_misses_earlier_broadcasts() {
    let dir = tempdir().unwrap();
    let addr = start_server(&[], &dir.path().join("relay.db")).await;

    let (mut early, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();

    post_json(
        addr,
        "/send-message",
        serde_json::json!({"nick": "a", "message": "first"}),
    )
    .await;
    assert_eq!(recv_event(&mut early).await.id(), 1);

    // The late listener still sees id 1, but via the history snapshot,
    // not as a live broadcast.
    let (mut late, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    match recv_event(&mut late).await {
        Event::Message(m) => assert_eq!(m.id, 1),
        other => panic!("unexpected event: {:?}", other),
    }
}

#[tokio::test]
async fn test_concurrent_submissions_over_http() {
    let dir = tempdir().unwrap();
    let addr = start_server(&[], &dir.path().join("relay.db")).await;

    let mut handles = Vec::new();
    for i in 0..25 {
        handles.push(tokio::spawn(async move {
            let (status, json) = post_json(
                addr,
                "/send-message",
                serde_json::json!({"nick": format!("c{}", i), "message": "hello"}),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            json["id"].as_i64().unwrap()
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 25);

    let messages = fetch_messages(addr).await;
    assert_eq!(messages.len(), 25);
    assert!(messages.windows(2).all(|w| w[0].id < w[1].id));
}
