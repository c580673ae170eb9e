//! `GET /api/stream` (spec §4.5): a long-lived SSE connection that
//! subscribes to the bus with the wildcard handler and filters every
//! message against the caller's tenant/session/agent/event-type filter.
//! Grounded on `vex-api::routes::get_job_stream`'s `stream::unfold` +
//! `Sse::new(...).keep_alive(...)` shape, generalized from single-job
//! polling to a broadcast subscription.

use axum::{
    extract::{Query, State},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    Extension,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::auth::AuthContext;
use crate::bus::{BusMessage, StreamFilter};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    pub event_types: Option<String>,
}

fn frame(event_name: &str, message: &BusMessage) -> SseEvent {
    let data = match message {
        BusMessage::EventIngested { event, timestamp, .. } => {
            serde_json::json!({ "event": event, "timestamp": timestamp })
        }
        BusMessage::SessionUpdated { session, timestamp, .. } => {
            serde_json::json!({ "session": session, "timestamp": timestamp })
        }
        BusMessage::AlertTriggered { rule_id, history, .. } => {
            serde_json::json!({ "ruleId": rule_id, "history": history })
        }
    };
    SseEvent::default()
        .event(event_name)
        .json_data(data)
        .unwrap_or_else(|_| SseEvent::default().event(event_name).data("{}"))
}

enum Frame {
    Bus(BusMessage),
    Heartbeat,
}

pub async fn stream_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let filter = StreamFilter {
        tenant_id: auth.tenant_id.clone(),
        session_id: query.session_id,
        agent_id: query.agent_id,
        event_types: query.event_types.map(|s| {
            s.split(',')
                .filter_map(|t| super::query::parse_event_type(t).ok())
                .collect::<Vec<_>>()
        }),
    };

    let rx = state.bus().subscribe();
    let initial = stream::once(async { Ok(SseEvent::default().event("heartbeat").data("connected")) });
    let body = stream::unfold((rx, filter), move |(mut rx, filter)| async move {
        loop {
            let next = tokio::select! {
                msg = rx.recv() => Frame::Bus(match msg {
                    Ok(m) => m,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }),
                _ = tokio::time::sleep(Duration::from_secs(30)) => Frame::Heartbeat,
            };

            match next {
                Frame::Heartbeat => {
                    return Some((Ok(SseEvent::default().event("heartbeat").data("alive")), (rx, filter)));
                }
                Frame::Bus(message) => {
                    if !filter.matches(&message) {
                        continue;
                    }
                    let name = match &message {
                        BusMessage::EventIngested { .. } => "event",
                        BusMessage::SessionUpdated { .. } => "session_update",
                        BusMessage::AlertTriggered { .. } => "alert",
                    };
                    return Some((Ok(frame(name, &message)), (rx, filter)));
                }
            }
        }
    });

    Sse::new(initial.chain(body)).keep_alive(KeepAlive::default())
}
