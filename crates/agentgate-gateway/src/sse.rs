//! `GET /api/v1/runs/:id/stream`: server-sent events over a run's
//! progress, closing automatically once the run reaches a terminal event.

use crate::state::GatewayState;
use agentgate_core::{Id, ProgressEventKind};
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

fn is_terminal(kind: &ProgressEventKind) -> bool {
    matches!(
        kind,
        ProgressEventKind::RunCompleted { .. }
            | ProgressEventKind::RunFailed { .. }
            | ProgressEventKind::RunCanceled { .. }
    )
}

pub async fn stream_run(
    State(state): State<Arc<GatewayState>>,
    Path(run_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (sub_id, mut rx) = state.bus.subscribe();
    let bus = state.bus.clone();
    let target_run_id: Id = run_id.into();

    let stream = async_stream::stream! {
        loop {
            let Some(batch) = rx.recv().await else { break };
            let mut done = false;
            for event in batch {
                if event.run_id != target_run_id {
                    continue;
                }
                if is_terminal(&event.kind) {
                    done = true;
                }
                yield Ok(Event::default()
                    .event(event_name(&event.kind))
                    .data(serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string())));
            }
            if done {
                break;
            }
        }
        bus.unsubscribe(&sub_id);
    };

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

fn event_name(kind: &ProgressEventKind) -> String {
    serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.get("type").and_then(|t| t.as_str().map(str::to_string)))
        .unwrap_or_else(|| "event".to_string())
}
