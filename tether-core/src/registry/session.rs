//! Session record and registration state machine
//!
//! A [`Session`] is one device's active registration instance. Session IDs
//! are unique per registration, not per device: when a device re-registers
//! it gets a fresh ID and the old session is superseded.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one registration instance
pub type SessionId = String;

/// Stable device identity (endpoint name), constant across re-registrations
pub type DeviceKey = String;

/// Opaque reference to the transport collaborator's connection object
///
/// The core stores and returns the handle; it never interprets it. The
/// collaborator that created it can recover the concrete type with
/// [`TransportHandle::downcast`].
#[derive(Clone)]
pub struct TransportHandle(Arc<dyn Any + Send + Sync>);

impl TransportHandle {
    /// Wrap a transport-owned object
    pub fn new<T: Any + Send + Sync>(inner: T) -> Self {
        Self(Arc::new(inner))
    }

    /// Recover the concrete type, if it matches
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0).downcast::<T>().ok()
    }
}

impl fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportHandle").finish_non_exhaustive()
    }
}

/// State of a session
///
/// `Registering`, `Updating` and `Deregistering` are transient: the registry
/// passes through them while it holds its write lock, so observers only ever
/// see `Active` sessions in the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registration accepted, not yet visible
    Registering,
    /// Registered and reachable
    Active,
    /// Processing a registration update
    Updating,
    /// Processing an explicit de-registration
    Deregistering,
    /// Lifetime elapsed without an update
    Expired,
    /// Terminal; removed from the active map
    Closed,
}

impl SessionState {
    /// Whether the session still owns its device registration
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active | SessionState::Updating)
    }

    /// Whether the session has reached its terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

/// Why a session was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// The device sent an explicit de-register
    Deregistered,
    /// The registration lifetime elapsed (reported by the transport timer)
    Expired,
    /// The same device re-registered with a new session
    Superseded,
    /// The transport collaborator reported a fatal connection error
    TransportError,
}

/// One device's active registration
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique per registration instance
    pub session_id: SessionId,
    /// Stable device identity
    pub device_key: DeviceKey,
    /// Transport collaborator's connection object, forwarded untouched
    pub handle: TransportHandle,
    /// Registered lifetime; the session expires when no update arrives
    /// within this window (expiry detection lives in the transport timer)
    pub lifetime_seconds: u64,
    /// Timestamp of the last successful register or update
    pub last_seen: DateTime<Utc>,
    /// When this registration instance was created
    pub created_at: DateTime<Utc>,
    /// Current lifecycle state
    pub state: SessionState,
}

impl Session {
    /// Create a new session in the `Registering` state
    pub fn new(
        device_key: impl Into<DeviceKey>,
        handle: TransportHandle,
        lifetime_seconds: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            device_key: device_key.into(),
            handle,
            lifetime_seconds,
            last_seen: now,
            created_at: now,
            state: SessionState::Registering,
        }
    }

    /// Whether the session still owns its device registration
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Refresh `last_seen`, optionally replacing the lifetime
    pub fn touch(&mut self, lifetime_seconds: Option<u64>) {
        self.last_seen = Utc::now();
        if let Some(lifetime) = lifetime_seconds {
            self.lifetime_seconds = lifetime;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== SessionState Tests ====================

    #[test]
    fn active_and_updating_are_active() {
        assert!(SessionState::Active.is_active());
        assert!(SessionState::Updating.is_active());
        assert!(!SessionState::Registering.is_active());
        assert!(!SessionState::Deregistering.is_active());
        assert!(!SessionState::Expired.is_active());
        assert!(!SessionState::Closed.is_active());
    }

    #[test]
    fn only_closed_is_terminal() {
        assert!(SessionState::Closed.is_terminal());
        assert!(!SessionState::Active.is_terminal());
        assert!(!SessionState::Expired.is_terminal());
    }

    #[test]
    fn session_state_serializes_to_snake_case() {
        let json = serde_json::to_string(&SessionState::Deregistering).unwrap();
        assert_eq!(json, "\"deregistering\"");
    }

    #[test]
    fn close_reason_serialization_roundtrip() {
        for reason in [
            CloseReason::Deregistered,
            CloseReason::Expired,
            CloseReason::Superseded,
            CloseReason::TransportError,
        ] {
            let json = serde_json::to_string(&reason).unwrap();
            let parsed: CloseReason = serde_json::from_str(&json).unwrap();
            assert_eq!(reason, parsed);
        }
    }

    // ==================== Session Tests ====================

    #[test]
    fn new_session_starts_registering_with_unique_id() {
        let s1 = Session::new("dev1", TransportHandle::new(()), 300);
        let s2 = Session::new("dev1", TransportHandle::new(()), 300);

        assert_eq!(s1.state, SessionState::Registering);
        assert_eq!(s1.device_key, "dev1");
        assert_eq!(s1.lifetime_seconds, 300);
        assert_ne!(s1.session_id, s2.session_id);
    }

    #[test]
    fn touch_refreshes_last_seen_and_lifetime() {
        let mut session = Session::new("dev1", TransportHandle::new(()), 300);
        let before = session.last_seen;

        session.touch(Some(600));

        assert!(session.last_seen >= before);
        assert_eq!(session.lifetime_seconds, 600);
    }

    #[test]
    fn touch_without_lifetime_keeps_existing() {
        let mut session = Session::new("dev1", TransportHandle::new(()), 300);

        session.touch(None);

        assert_eq!(session.lifetime_seconds, 300);
    }

    // ==================== TransportHandle Tests ====================

    #[test]
    fn transport_handle_downcast_recovers_inner_type() {
        let handle = TransportHandle::new("coap://10.0.0.7:5683".to_string());

        let inner = handle.downcast::<String>().unwrap();
        assert_eq!(inner.as_str(), "coap://10.0.0.7:5683");
    }

    #[test]
    fn transport_handle_downcast_wrong_type_returns_none() {
        let handle = TransportHandle::new(42u32);

        assert!(handle.downcast::<String>().is_none());
    }

    #[test]
    fn transport_handle_clone_shares_inner() {
        let handle = TransportHandle::new(7u64);
        let cloned = handle.clone();

        assert_eq!(*cloned.downcast::<u64>().unwrap(), 7);
    }
}
