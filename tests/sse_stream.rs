//! End-to-end tests for the event stream endpoint.
//!
//! These spin up the real router on an ephemeral port and drive it with a
//! streaming HTTP client, matching the wiring in main.rs: subscribe over
//! GET /events, receive the initial ping, then broadcast events in-process
//! and watch them arrive on the wire.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use flipcast::api::{router, AppState};
use flipcast::{Broadcaster, EventKind};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde_json::json;

async fn start_server(auth_token: Option<&str>) -> (SocketAddr, Broadcaster) {
    let broadcaster = Broadcaster::new();
    let state = AppState {
        broadcaster: broadcaster.clone(),
        auth_token: auth_token.map(Arc::from),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.expect("serve");
    });
    (addr, broadcaster)
}

/// Reassembles blank-line-terminated messages from a chunked byte stream.
struct MessageReader {
    stream: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: Vec<u8>,
}

impl MessageReader {
    fn new(stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static) -> Self {
        Self {
            stream: stream.boxed(),
            buffer: Vec::new(),
        }
    }

    async fn next_message(&mut self) -> String {
        loop {
            if let Some(pos) = self
                .buffer
                .windows(2)
                .position(|window| window == b"\n\n")
            {
                let message: Vec<u8> = self.buffer.drain(..pos + 2).collect();
                return String::from_utf8(message).expect("utf8 frame");
            }
            let chunk = tokio::time::timeout(Duration::from_secs(5), self.stream.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("stream ended unexpectedly")
                .expect("stream error");
            self.buffer.extend_from_slice(&chunk);
        }
    }

    /// Drives the stream until it terminates (or errors, which a closed
    /// server connection may surface as).
    async fn read_to_end(&mut self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match tokio::time::timeout_at(deadline, self.stream.next()).await {
                Ok(Some(Ok(chunk))) => self.buffer.extend_from_slice(&chunk),
                Ok(Some(Err(_))) | Ok(None) => return,
                Err(_) => panic!("stream did not end in time"),
            }
        }
    }
}

async fn wait_for_count(broadcaster: &Broadcaster, expected: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while broadcaster.connection_count() != expected {
        assert!(
            tokio::time::Instant::now() < deadline,
            "connection count never reached {expected}",
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn stream_delivers_initial_ping_then_broadcasts() {
    let (addr, broadcaster) = start_server(None).await;

    let response = reqwest::get(format!("http://{addr}/events?user_id=flipper-7"))
        .await
        .expect("connect");
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream",
    );
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-cache");
    assert_eq!(response.headers().get("x-accel-buffering").unwrap(), "no");

    let mut reader = MessageReader::new(response.bytes_stream());
    let first = reader.next_message().await;
    assert!(first.starts_with("event: ping\n"), "got: {first}");
    assert!(first.contains("flipper-7"));

    broadcaster
        .emit(EventKind::ListingFound, &json!({ "id": "m1" }))
        .expect("emit");
    let second = reader.next_message().await;
    assert!(second.starts_with("event: listing.found\n"), "got: {second}");
    assert!(second.contains("\"id\":\"m1\""));
}

#[tokio::test]
async fn events_requires_the_configured_token() {
    let (addr, _broadcaster) = start_server(Some("s3cret")).await;
    let client = reqwest::Client::new();

    let denied = client
        .get(format!("http://{addr}/events"))
        .send()
        .await
        .expect("request");
    assert_eq!(denied.status(), 401);

    let wrong = client
        .get(format!("http://{addr}/events"))
        .bearer_auth("wrong")
        .send()
        .await
        .expect("request");
    assert_eq!(wrong.status(), 401);

    let via_header = client
        .get(format!("http://{addr}/events"))
        .bearer_auth("s3cret")
        .send()
        .await
        .expect("request");
    assert_eq!(via_header.status(), 200);

    let via_query = client
        .get(format!("http://{addr}/events?token=s3cret"))
        .send()
        .await
        .expect("request");
    assert_eq!(via_query.status(), 200);
}

#[tokio::test]
async fn client_disconnect_removes_the_subscriber() {
    let (addr, broadcaster) = start_server(None).await;

    let response = reqwest::get(format!("http://{addr}/events"))
        .await
        .expect("connect");
    let mut reader = MessageReader::new(response.bytes_stream());
    reader.next_message().await;
    assert_eq!(broadcaster.connection_count(), 1);

    drop(reader);
    wait_for_count(&broadcaster, 0).await;
}

#[tokio::test]
async fn disconnect_all_ends_open_streams() {
    let (addr, broadcaster) = start_server(None).await;

    let first = reqwest::get(format!("http://{addr}/events"))
        .await
        .expect("connect");
    let second = reqwest::get(format!("http://{addr}/events"))
        .await
        .expect("connect");
    let mut first = MessageReader::new(first.bytes_stream());
    let mut second = MessageReader::new(second.bytes_stream());
    first.next_message().await;
    second.next_message().await;
    assert_eq!(broadcaster.connection_count(), 2);

    broadcaster.disconnect_all();
    assert_eq!(broadcaster.connection_count(), 0);

    // Both response bodies terminate once their transports are closed.
    first.read_to_end().await;
    second.read_to_end().await;

    let delivered = broadcaster
        .emit(EventKind::JobComplete, &json!({}))
        .expect("emit");
    assert_eq!(delivered, 0);
}
