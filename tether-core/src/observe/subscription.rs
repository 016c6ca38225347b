//! Subscription record and delivery outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::SessionId;

/// Unique identifier for one outstanding observation
pub type SubscriptionId = String;

/// One outstanding observation on a device resource path
///
/// References its owning session by ID only; a subscription never extends
/// the session's lifetime and is purged when the session closes.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Unique subscription identifier
    pub subscription_id: SubscriptionId,
    /// Owning session (weak reference by ID)
    pub session_id: SessionId,
    /// Logical resource path being observed
    pub path: String,
    /// Highest sequence number accepted so far; `None` until the first
    /// delivery (the transport's starting value is not assumed)
    pub last_notification_seq: Option<u64>,
    /// When the observation was established
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Create a new subscription for the given session and path
    pub fn new(session_id: impl Into<SessionId>, path: impl Into<String>) -> Self {
        Self {
            subscription_id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            path: path.into(),
            last_notification_seq: None,
            created_at: Utc::now(),
        }
    }

    /// Whether `seq` advances past everything accepted so far
    pub fn advances(&self, seq: u64) -> bool {
        match self.last_notification_seq {
            None => true,
            Some(last) => seq > last,
        }
    }
}

/// Result of routing one notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted and forwarded downstream
    Delivered,
    /// Out-of-order or duplicate sequence; dropped, not an error
    Stale,
    /// The subscription was already purged
    OrphanSubscription,
    /// The owning session no longer exists or is not active
    OrphanSession,
}

impl DeliveryOutcome {
    /// Whether the payload reached the downstream consumer
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }
}

/// Observation error categories reported by the transport collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservationErrorKind {
    /// The device did not answer within the transport's deadline
    Timeout,
    /// The peer reset the exchange
    Reset,
    /// The notification payload could not be decoded
    Decode,
    /// Any other connection-level failure
    Transport,
}
