//! Event delivery endpoints: a JSON long-poll and a framed event stream.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    response::sse::{Event as SseEvent, Sse},
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use frontdesk_core::cursor::Cursor;
use frontdesk_core::domain::event::{TaskEvent, TenantId};

use crate::api::{require_tenant, Rejection};
use crate::poll::PollEngine;

/// Reconnect hint sent once at the start of every stream.
const STREAM_RETRY: Duration = Duration::from_millis(5000);

const STREAM_CHANNEL_DEPTH: usize = 16;

#[derive(Clone)]
pub struct EventsState {
    engine: Arc<PollEngine>,
    heartbeat: Duration,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub tenant_id: Option<String>,
    pub cursor: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<TaskEvent>,
    pub cursor: String,
}

pub fn router(engine: Arc<PollEngine>, heartbeat: Duration) -> Router {
    Router::new()
        .route("/api/v1/events", get(poll_events))
        .route("/api/v1/events/stream", get(stream_events))
        .with_state(EventsState { engine, heartbeat })
}

/// Long-poll for events. Returns immediately when events are available,
/// otherwise waits up to the (capped) requested timeout. Never 5xx: a
/// flaky event backend degrades to an empty list the client retries on.
pub async fn poll_events(
    Query(query): Query<EventsQuery>,
    State(state): State<EventsState>,
) -> Result<Json<EventsResponse>, Rejection> {
    let tenant = require_tenant(query.tenant_id.as_deref())?;
    let cursor = supplied_cursor(query.cursor);

    let outcome = state.engine.poll(&tenant, cursor, query.timeout_secs.unwrap_or(0)).await;
    Ok(Json(EventsResponse { events: outcome.events, cursor: outcome.cursor.into_inner() }))
}

/// Stream events as framed chunks: one frame per event, a retry hint once
/// at the start, and `ping` frames carrying `{ts, cursor}` while idle. The
/// producer stops as soon as the client goes away.
pub async fn stream_events(
    Query(query): Query<EventsQuery>,
    State(state): State<EventsState>,
) -> Result<Sse<ReceiverStream<Result<SseEvent, Infallible>>>, Rejection> {
    let tenant = require_tenant(query.tenant_id.as_deref())?;
    let cursor = supplied_cursor(query.cursor);

    let (tx, rx) = mpsc::channel::<Result<SseEvent, Infallible>>(STREAM_CHANNEL_DEPTH);
    tokio::spawn(stream_producer(state, tenant, cursor, tx));

    Ok(Sse::new(ReceiverStream::new(rx)))
}

async fn stream_producer(
    state: EventsState,
    tenant: TenantId,
    mut cursor: Option<Cursor>,
    tx: mpsc::Sender<Result<SseEvent, Infallible>>,
) {
    if tx.send(Ok(SseEvent::default().retry(STREAM_RETRY))).await.is_err() {
        return;
    }

    loop {
        let outcome = tokio::select! {
            _ = tx.closed() => break,
            outcome = state.engine.poll(&tenant, cursor.clone(), state.heartbeat.as_secs()) => outcome,
        };

        if outcome.events.is_empty() {
            let ping = SseEvent::default().event("ping").data(
                json!({"ts": Utc::now().to_rfc3339(), "cursor": outcome.cursor.as_str()})
                    .to_string(),
            );
            if tx.send(Ok(ping)).await.is_err() {
                break;
            }
        } else {
            for event in &outcome.events {
                if tx.send(Ok(event_frame(event))).await.is_err() {
                    debug!(
                        event_name = "events.stream.disconnected",
                        tenant_id = tenant.as_str(),
                        "client went away mid-batch; stopping stream"
                    );
                    return;
                }
            }
        }

        cursor = Some(outcome.cursor);
    }
}

fn event_frame(event: &TaskEvent) -> SseEvent {
    let frame = SseEvent::default().event(event.kind.as_str());
    match serde_json::to_string(event) {
        Ok(data) => frame.data(data),
        Err(error) => {
            warn!(
                event_name = "events.stream.unserializable",
                subject_id = %event.subject_id,
                error = %error,
                "event failed to serialize; sending an empty frame"
            );
            frame.data("{}")
        }
    }
}

fn supplied_cursor(raw: Option<String>) -> Option<Cursor> {
    raw.filter(|value| !value.trim().is_empty()).map(Cursor::from_raw)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::extract::{Query, State};
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use serde_json::json;
    use tower::util::ServiceExt;

    use frontdesk_core::cursor::Cursor;
    use frontdesk_core::domain::event::{TaskEventKind, TenantId};
    use frontdesk_db::repositories::InMemoryTaskRepository;
    use frontdesk_db::EventStore;

    use crate::poll::{PollEngine, PollSettings};

    use super::{poll_events, router, EventsQuery, EventsState};

    fn engine_with_store() -> (Arc<EventStore>, Arc<PollEngine>) {
        let store = Arc::new(EventStore::in_memory(100));
        let engine = Arc::new(PollEngine::new(
            store.clone(),
            Arc::new(InMemoryTaskRepository::default()),
            PollSettings {
                interval: Duration::from_secs(1),
                fetch_limit: 100,
                reconcile_limit: 100,
            },
        ));
        (store, engine)
    }

    fn query(tenant: Option<&str>, cursor: Option<&str>) -> Query<EventsQuery> {
        Query(EventsQuery {
            tenant_id: tenant.map(ToString::to_string),
            cursor: cursor.map(ToString::to_string),
            timeout_secs: Some(0),
        })
    }

    #[tokio::test]
    async fn poll_returns_events_and_advances_the_cursor() {
        let (store, engine) = engine_with_store();
        let tenant = TenantId("acme-dental".to_string());
        let before = Cursor::at(Utc::now() - chrono::Duration::seconds(1));

        store.publish(&tenant, TaskEventKind::Created, "task-1", json!({})).await.expect("publish");

        let state = EventsState { engine, heartbeat: Duration::from_secs(15) };
        let response = poll_events(query(Some("acme-dental"), Some(before.as_str())), State(state))
            .await
            .expect("poll should succeed");

        assert_eq!(response.0.events.len(), 1);
        assert_eq!(response.0.cursor, response.0.events[0].cursor.as_str());
    }

    #[tokio::test]
    async fn poll_without_tenant_is_a_bad_request() {
        let (_, engine) = engine_with_store();
        let state = EventsState { engine, heartbeat: Duration::from_secs(15) };

        let rejection = poll_events(query(None, None), State(state)).await.unwrap_err();
        assert_eq!(rejection.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn router_rejects_missing_tenant_with_400() {
        let (_, engine) = engine_with_store();
        let app = router(engine, Duration::from_secs(15));

        let response = app
            .oneshot(Request::get("/api/v1/events").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    async fn read_stream_until(
        response: axum::response::Response,
        needle: &str,
    ) -> String {
        use tokio_stream::StreamExt;

        let mut stream = response.into_body().into_data_stream();
        let mut collected = String::new();
        while !collected.contains(needle) {
            let chunk = tokio::time::timeout(Duration::from_secs(5), stream.next())
                .await
                .expect("stream should produce frames promptly")
                .expect("stream should stay open")
                .expect("stream chunk");
            collected.push_str(&String::from_utf8_lossy(&chunk));
        }
        collected
    }

    #[tokio::test]
    async fn stream_emits_retry_hint_then_event_frames() {
        let (store, engine) = engine_with_store();
        let tenant = TenantId("acme-dental".to_string());
        let before = Cursor::at(Utc::now() - chrono::Duration::seconds(1));
        store
            .publish(&tenant, TaskEventKind::StatusChanged, "task-1", json!({"status": "accepted"}))
            .await
            .expect("publish");

        let app = router(engine, Duration::from_secs(1));
        let response = app
            .oneshot(
                Request::get(format!(
                    "/api/v1/events/stream?tenant_id=acme-dental&cursor={}",
                    before.as_str()
                ))
                .body(Body::empty())
                .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let content_type =
            response.headers().get("content-type").and_then(|value| value.to_str().ok());
        assert_eq!(content_type, Some("text/event-stream"));

        let collected = read_stream_until(response, "event: status_changed").await;
        assert!(collected.starts_with("retry: 5000"));
        assert!(collected.contains("\"subject_id\":\"task-1\""));
    }

    #[tokio::test]
    async fn idle_stream_sends_ping_heartbeats_with_a_cursor() {
        let (_, engine) = engine_with_store();
        let app = router(engine, Duration::from_secs(1));

        let response = app
            .oneshot(
                Request::get("/api/v1/events/stream?tenant_id=acme-dental")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        let collected = read_stream_until(response, "event: ping").await;
        assert!(collected.contains("\"cursor\""));
        assert!(collected.contains("\"ts\""));
    }
}
