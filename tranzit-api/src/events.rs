use std::convert::Infallible;
use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EventFilter {
    pub booking_id: Option<Uuid>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/bookings/events", get(stream_events))
}

/// Live feed of committed transitions, optionally narrowed to one booking.
pub async fn stream_events(
    State(state): State<AppState>,
    Query(filter): Query<EventFilter>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.machine.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let wanted = filter.booking_id;
        async move {
            match result {
                Ok(event) if wanted.map_or(true, |id| id == event.booking_id) => {
                    match Event::default().event("booking_transitioned").json_data(&event) {
                        Ok(sse) => Some(Ok(sse)),
                        Err(e) => {
                            tracing::warn!("Dropping unserializable event: {}", e);
                            None
                        }
                    }
                }
                Ok(_) => None,
                Err(e) => {
                    // Slow subscriber; skipped events are not replayed
                    tracing::debug!("SSE subscriber lagged: {}", e);
                    None
                }
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
