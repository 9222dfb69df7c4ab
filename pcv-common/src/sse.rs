//! Server-Sent Events (SSE) utilities
//!
//! Turns a live session receiver into an SSE response with a heartbeat.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::events::PcvEvent;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Stream a user's live session channel as SSE
///
/// Sends a `ConnectionStatus` event first, then one event per pushed
/// [`PcvEvent`] (named by [`PcvEvent::event_type`], JSON payload), with a
/// heartbeat comment whenever the channel is quiet.
pub fn session_event_stream(
    user_id: String,
    mut rx: broadcast::Receiver<PcvEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(user_id = %user_id, "New SSE client connected to session events");

    let stream = async_stream::stream! {
        yield Ok(Event::default()
            .event("ConnectionStatus")
            .data("connected"));

        loop {
            tokio::select! {
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    debug!("SSE: Sending heartbeat");
                    yield Ok(Event::default().comment("heartbeat"));
                }

                received = rx.recv() => match received {
                    Ok(event) => {
                        let event_type = event.event_type().to_string();
                        match serde_json::to_string(&event) {
                            Ok(event_json) => {
                                debug!(user_id = %user_id, "SSE: Forwarding event: {}", event_type);
                                yield Ok(Event::default()
                                    .event(event_type)
                                    .data(event_json));
                            }
                            Err(e) => {
                                warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(user_id = %user_id, skipped, "SSE: Session lagged, events dropped");
                    }
                    Err(RecvError::Closed) => {
                        info!(user_id = %user_id, "SSE: Session channel closed");
                        break;
                    }
                },
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(HEARTBEAT_INTERVAL)
            .text("heartbeat"),
    )
}
