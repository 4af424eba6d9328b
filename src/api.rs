use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    extract::{Query, State},
    http::{
        header::{self, HeaderName},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::io::ReaderStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::broadcaster::{Broadcaster, Subscription};
use crate::event::{unix_millis, Event, EventKind};
use crate::sink::StreamSink;

/// Bytes buffered between a subscriber's forwarder task and the HTTP
/// response body. A client that stops reading fills this, then the duplex
/// write stalls and the write timeout evicts the subscriber.
const STREAM_BUFFER: usize = 8 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub broadcaster: Broadcaster,
    /// Static bearer token for `/events`. `None` leaves the endpoint open.
    pub auth_token: Option<Arc<str>>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connections: state.broadcaster.connection_count(),
    })
}

#[derive(Deserialize)]
struct EventsQuery {
    user_id: Option<String>,
    /// EventSource cannot set request headers, so the token is also
    /// accepted as a query parameter.
    token: Option<String>,
}

async fn events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Response {
    if !authorized(state.auth_token.as_deref(), &headers, query.token.as_deref()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let (writer, reader) = tokio::io::duplex(STREAM_BUFFER);
    let subscription = state.broadcaster.subscribe(StreamSink::new(writer));

    // Confirm liveness to this client before any broadcast reaches it. Sent
    // directly so earlier events can never leak in and the payload can name
    // the caller.
    let hello = Event::from_value(
        EventKind::Ping,
        json!({
            "ts": unix_millis(),
            "user_id": query.user_id,
            "subscriber": subscription.id().to_string(),
        }),
    );
    subscription.notify(&hello);
    tracing::debug!(subscriber = %subscription.id(), "event stream opened");

    let body = Body::from_stream(EventStreamBody {
        frames: ReaderStream::new(reader),
        _subscription: subscription,
    });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response()
}

/// Response body that owns the subscription: when the client disconnects,
/// the body is dropped and the drop unsubscribes.
struct EventStreamBody {
    frames: ReaderStream<tokio::io::DuplexStream>,
    _subscription: Subscription,
}

impl Stream for EventStreamBody {
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().frames).poll_next(cx)
    }
}

fn authorized(expected: Option<&str>, headers: &HeaderMap, query_token: Option<&str>) -> bool {
    let Some(expected) = expected else {
        return true;
    };
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    match bearer.or(query_token) {
        Some(provided) => token_matches(expected, provided),
        None => false,
    }
}

fn token_matches(expected: &str, provided: &str) -> bool {
    use subtle::ConstantTimeEq;
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/events", get(events))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
