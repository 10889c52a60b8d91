//! Server-sent-events endpoint: initial replay, then live bus events.

use super::AppState;
use crate::services::events::Event;
use axum::extract::State;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;

/// Heartbeat comment cadence.
const KEEP_ALIVE: Duration = Duration::from_secs(30);

/// `GET /api/sse`
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (initial, subscription) = state.collector.subscribe().await;
    log::debug!("SSE subscriber connected ({} replay events)", initial.len() + 1);

    let connected = stream::once(async { Ok(SseEvent::default().comment("connected")) });
    let replay = stream::iter(initial).map(|event| Ok(to_sse(&event)));
    let live = stream::unfold(subscription, |mut subscription| async move {
        subscription
            .recv()
            .await
            .map(|event| (Ok(to_sse(&event)), subscription))
    });

    Sse::new(connected.chain(replay).chain(live))
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE).text(""))
}

fn to_sse(event: &Event) -> SseEvent {
    SseEvent::default()
        .event(event.name())
        .data(event.payload().to_string())
}
