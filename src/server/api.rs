//! Operation and event endpoints
//!
//! - `POST /operations` - start a catalog operation, 202 with its id
//! - `GET /operations` - list the catalog
//! - `GET /events` - newline-delimited JSON stream of progress events
//! - `GET /metrics` - Prometheus text format

use super::health::ReadinessState;
use super::metrics::SharedMetrics;
use crate::adapter::{Adapter, AdapterError, Operation, OperationRequest, OPERATIONS};
use crate::events::{EventBroadcaster, EventError, EventSink, ProgressEvent};
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{FromRef, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::Stream;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

const NDJSON: &str = "application/x-ndjson";

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub adapter: Adapter,
    pub broadcaster: Arc<EventBroadcaster>,
    pub readiness: ReadinessState,
    pub metrics: SharedMetrics,
}

impl FromRef<AppState> for ReadinessState {
    fn from_ref(state: &AppState) -> Self {
        state.readiness.clone()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
    pub operation_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub error: String,
}

pub(super) async fn apply_operation(
    State(state): State<AppState>,
    Json(mut request): Json<OperationRequest>,
) -> Response {
    let operation_id = request.ensure_operation_id().to_string();

    match state.adapter.apply_operation(request).await {
        Ok(_handle) => (StatusCode::ACCEPTED, Json(Accepted { operation_id })).into_response(),
        Err(err @ AdapterError::InvalidOperation(_)) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                code: err.code(),
                error: err.to_string(),
            }),
        )
            .into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                code: err.code(),
                error: err.to_string(),
            }),
        )
            .into_response(),
    }
}

pub(super) async fn list_operations() -> Json<&'static [Operation]> {
    Json(OPERATIONS)
}

pub(super) async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.encode() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// A serialized event and the signal that the body stream took it
type Handoff = (String, oneshot::Sender<()>);

/// Forwards events to one HTTP response body
///
/// An event counts as sent only once the body stream has pulled it. If the
/// client disconnects first, the unacknowledged event is reported as a
/// failed send and the broadcaster requeues it.
pub(super) struct ChannelSink {
    sender: mpsc::Sender<Handoff>,
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&mut self, event: &ProgressEvent) -> Result<(), EventError> {
        let mut line =
            serde_json::to_string(event).map_err(|e| EventError::Send(e.to_string()))?;
        line.push('\n');

        let (ack, acked) = oneshot::channel();
        self.sender
            .send((line, ack))
            .await
            .map_err(|_| EventError::Closed)?;
        acked.await.map_err(|_| EventError::Closed)
    }

    fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Sink for the broadcaster and the body stream it feeds, with one slot between them
pub(super) fn event_channel() -> (
    ChannelSink,
    impl Stream<Item = Result<String, Infallible>> + Send + 'static,
) {
    let (sender, receiver) = mpsc::channel::<Handoff>(1);
    let body = futures::stream::unfold(receiver, |mut receiver| async move {
        let (line, ack) = receiver.recv().await?;
        let _ = ack.send(());
        Some((Ok::<_, Infallible>(line), receiver))
    });
    (ChannelSink { sender }, body)
}

pub(super) async fn stream_events(State(state): State<AppState>) -> Response {
    let (mut sink, body) = event_channel();
    let broadcaster = state.broadcaster.clone();

    tokio::spawn(async move {
        match broadcaster.stream_events(&mut sink).await {
            Err(EventError::Closed) => debug!("Event subscriber disconnected"),
            Err(e) => info!(error = %e, "Event stream ended"),
            Ok(()) => {}
        }
    });

    (
        [(header::CONTENT_TYPE, NDJSON)],
        Body::from_stream(body),
    )
        .into_response()
}
