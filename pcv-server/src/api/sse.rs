//! Live session stream

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;

use pcv_common::sse::session_event_stream;

use crate::api::AuthenticatedUser;
use crate::AppState;

/// GET /events - SSE stream of the caller's finished verifications
pub async fn session_events(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sessions.connect(&user.id).await;
    session_event_stream(user.id, rx)
}
