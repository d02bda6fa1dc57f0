//! Server-Sent Events endpoints

use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

/// GET /api/events - submission and archive progress events
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tally_common::sse::create_event_sse_stream("tally-ri", &state.event_bus)
}

/// GET /events - connection status heartbeat
pub async fn status_stream() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tally_common::sse::create_heartbeat_sse_stream("tally-ri")
}
