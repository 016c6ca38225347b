//! Presence tracking for power-save devices
//!
//! Per-session sleep/awake state machine, independent of registration
//! validity. Transitions are only meaningful while the owning session is
//! active; once a session closes its entry is discarded and any in-flight
//! presence event for that session misses the lookup and is dropped;
//! a presence event never resurrects a session.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::events::{EventBus, GatewayEvent};
use crate::registry::{SessionId, SessionRegistry};

/// Power-save status of a registered device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    /// Reachable; outbound commands may be sent immediately
    Awake,
    /// In power-save; outbound commands should be queued by the caller
    Asleep,
}

/// Tracks sleep/awake state per session
///
/// A session with no entry is in the terminal unknown state: either it was
/// never tracked or it has closed and been discarded.
pub struct PresenceTracker {
    state: RwLock<HashMap<SessionId, PresenceStatus>>,
    registry: Arc<SessionRegistry>,
    events: Arc<dyn EventBus>,
}

impl PresenceTracker {
    /// Create a new tracker over the given registry and bus
    pub fn new(registry: Arc<SessionRegistry>, events: Arc<dyn EventBus>) -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            registry,
            events,
        }
    }

    /// Start tracking a freshly opened session
    ///
    /// Seeds `Awake` without emitting an event: a device that just
    /// registered is reachable, so a redundant awake report right after
    /// registration stays a no-op.
    pub async fn track(&self, session_id: &str) {
        self.state
            .write()
            .await
            .entry(session_id.to_string())
            .or_insert(PresenceStatus::Awake);
    }

    /// Mark a session's device as asleep; idempotent
    ///
    /// Returns whether a `PresenceChanged` event was emitted.
    pub async fn mark_asleep(&self, session_id: &str) -> bool {
        self.set_status(session_id, PresenceStatus::Asleep).await
    }

    /// Mark a session's device as awake; idempotent
    ///
    /// Returns whether a `PresenceChanged` event was emitted.
    pub async fn mark_awake(&self, session_id: &str) -> bool {
        self.set_status(session_id, PresenceStatus::Awake).await
    }

    /// Discard a session's presence entry; idempotent
    ///
    /// Invoked when the registry reports the session closing. Subsequent
    /// presence events for this session are dropped.
    pub async fn discard(&self, session_id: &str) -> bool {
        self.state.write().await.remove(session_id).is_some()
    }

    /// Get a session's current status, if tracked
    pub async fn status(&self, session_id: &str) -> Option<PresenceStatus> {
        self.state.read().await.get(session_id).copied()
    }

    /// Get the number of tracked sessions
    pub async fn tracked_count(&self) -> usize {
        self.state.read().await.len()
    }

    async fn set_status(&self, session_id: &str, status: PresenceStatus) -> bool {
        let session = match self.registry.lookup(session_id).await {
            Some(s) if s.is_active() => s,
            _ => {
                debug!(session = %session_id, ?status, "Dropping presence event for closed session");
                return false;
            }
        };

        let mut state = self.state.write().await;
        let current = state
            .entry(session_id.to_string())
            .or_insert(PresenceStatus::Awake);
        if *current == status {
            debug!(session = %session_id, ?status, "Presence unchanged");
            return false;
        }
        *current = status;

        // Published under the write lock: transition and emission must not
        // reorder across concurrent presence events for the same session.
        self.events
            .publish(GatewayEvent::PresenceChanged {
                session_id: session_id.to_string(),
                device_key: session.device_key,
                status,
            })
            .await;

        true
    }
}
