//! Live session channels
//!
//! Each connected user gets a broadcast channel keyed by their user id. The
//! verification pipeline pushes finished results into it; the SSE endpoint
//! streams it to the browser. Delivery is best effort: a user without an open
//! session simply misses the push and finds the result via the history query.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::db::ResultRecord;

/// Events pushed to a user's live session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PcvEvent {
    /// A submitted file finished verification
    VerificationCompleted {
        result: ResultRecord,
    },
}

impl PcvEvent {
    /// SSE event name
    pub fn event_type(&self) -> &str {
        match self {
            PcvEvent::VerificationCompleted { .. } => "VerificationCompleted",
        }
    }
}

/// Outcome of a best-effort delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handed to this many open sessions
    Delivered(usize),
    /// The user had no open session
    NoSession,
}

/// Registry of per-user broadcast channels
#[derive(Clone)]
pub struct SessionChannels {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<PcvEvent>>>>,
    capacity: usize,
}

impl SessionChannels {
    /// Create a registry whose channels buffer `capacity` events per user
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Open a session for `user_id`.
    ///
    /// A user may hold several sessions (tabs); all of them receive each event.
    pub async fn connect(&self, user_id: &str) -> broadcast::Receiver<PcvEvent> {
        let mut channels = self.channels.write().await;
        channels.retain(|_, tx| tx.receiver_count() > 0);
        channels
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Push `event` to every open session of `user_id`
    pub async fn deliver(&self, user_id: &str, event: PcvEvent) -> DeliveryOutcome {
        let sent = {
            let channels = self.channels.read().await;
            match channels.get(user_id) {
                Some(tx) => tx.send(event),
                None => return DeliveryOutcome::NoSession,
            }
        };

        match sent {
            Ok(receivers) => DeliveryOutcome::Delivered(receivers),
            Err(_) => {
                // Every session for this user has closed; drop the stale sender
                let mut channels = self.channels.write().await;
                if channels
                    .get(user_id)
                    .is_some_and(|tx| tx.receiver_count() == 0)
                {
                    channels.remove(user_id);
                    debug!(user_id, "Pruned closed session channel");
                }
                DeliveryOutcome::NoSession
            }
        }
    }

    /// Number of users with at least one open session
    pub async fn user_count(&self) -> usize {
        self.channels
            .read()
            .await
            .values()
            .filter(|tx| tx.receiver_count() > 0)
            .count()
    }
}

impl Default for SessionChannels {
    fn default() -> Self {
        Self::new(16)
    }
}
