//! Outbound event type definitions
//!
//! One event is emitted per accepted transition. Every variant carries the
//! owning `session_id` and `device_key` so downstream consumers
//! (persistence, telemetry ingestion, RPC) can correlate without a lookup.

use serde::{Deserialize, Serialize};

use crate::observe::ObservationErrorKind;
use crate::presence::PresenceStatus;
use crate::registry::{CloseReason, DeviceKey, SessionId};

/// Events emitted by the gateway core to downstream collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// A device registered; `previous_session_id` is set when the
    /// registration superseded an existing session
    SessionOpened {
        session_id: SessionId,
        device_key: DeviceKey,
        previous_session_id: Option<SessionId>,
    },

    /// A registration update refreshed the session
    SessionUpdated {
        session_id: SessionId,
        device_key: DeviceKey,
    },

    /// A session left the active map
    SessionClosed {
        session_id: SessionId,
        device_key: DeviceKey,
        reason: CloseReason,
    },

    /// An observation was established on a resource path
    ObservationOpened {
        session_id: SessionId,
        device_key: DeviceKey,
        subscription_id: String,
        path: String,
    },

    /// A notification passed the stale/orphan filters and was accepted
    ObservationDelivered {
        session_id: SessionId,
        device_key: DeviceKey,
        path: String,
        payload: Vec<u8>,
    },

    /// The transport reported an observation error; the subscription
    /// itself stays open
    ObservationError {
        session_id: SessionId,
        device_key: DeviceKey,
        path: String,
        kind: ObservationErrorKind,
    },

    /// A device moved between awake and asleep
    PresenceChanged {
        session_id: SessionId,
        device_key: DeviceKey,
        status: PresenceStatus,
    },
}

impl GatewayEvent {
    /// The session this event belongs to
    pub fn session_id(&self) -> &str {
        match self {
            GatewayEvent::SessionOpened { session_id, .. } => session_id,
            GatewayEvent::SessionUpdated { session_id, .. } => session_id,
            GatewayEvent::SessionClosed { session_id, .. } => session_id,
            GatewayEvent::ObservationOpened { session_id, .. } => session_id,
            GatewayEvent::ObservationDelivered { session_id, .. } => session_id,
            GatewayEvent::ObservationError { session_id, .. } => session_id,
            GatewayEvent::PresenceChanged { session_id, .. } => session_id,
        }
    }

    /// The device this event belongs to
    pub fn device_key(&self) -> &str {
        match self {
            GatewayEvent::SessionOpened { device_key, .. } => device_key,
            GatewayEvent::SessionUpdated { device_key, .. } => device_key,
            GatewayEvent::SessionClosed { device_key, .. } => device_key,
            GatewayEvent::ObservationOpened { device_key, .. } => device_key,
            GatewayEvent::ObservationDelivered { device_key, .. } => device_key,
            GatewayEvent::ObservationError { device_key, .. } => device_key,
            GatewayEvent::PresenceChanged { device_key, .. } => device_key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Serialization Tests ====================

    #[test]
    fn session_opened_serialization_roundtrip() {
        let event = GatewayEvent::SessionOpened {
            session_id: "s-new".to_string(),
            device_key: "dev1".to_string(),
            previous_session_id: Some("s-old".to_string()),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: GatewayEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            parsed,
            GatewayEvent::SessionOpened { previous_session_id: Some(prev), .. } if prev == "s-old"
        ));
    }

    #[test]
    fn session_closed_serializes_reason_as_snake_case() {
        let event = GatewayEvent::SessionClosed {
            session_id: "s1".to_string(),
            device_key: "dev1".to_string(),
            reason: CloseReason::TransportError,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"session_closed\""));
        assert!(json.contains("\"transport_error\""));
    }

    #[test]
    fn observation_delivered_serialization_roundtrip() {
        let event = GatewayEvent::ObservationDelivered {
            session_id: "s1".to_string(),
            device_key: "dev1".to_string(),
            path: "/3303/0/5700".to_string(),
            payload: vec![0x42, 0x19],
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: GatewayEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            parsed,
            GatewayEvent::ObservationDelivered { path, payload, .. }
                if path == "/3303/0/5700" && payload == vec![0x42, 0x19]
        ));
    }

    #[test]
    fn presence_changed_serialization_roundtrip() {
        let event = GatewayEvent::PresenceChanged {
            session_id: "s1".to_string(),
            device_key: "dev1".to_string(),
            status: PresenceStatus::Asleep,
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: GatewayEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            parsed,
            GatewayEvent::PresenceChanged { status: PresenceStatus::Asleep, .. }
        ));
    }

    // ==================== Correlation Accessor Tests ====================

    #[test]
    fn every_variant_exposes_session_and_device() {
        let events = [
            GatewayEvent::SessionOpened {
                session_id: "s1".to_string(),
                device_key: "d1".to_string(),
                previous_session_id: None,
            },
            GatewayEvent::SessionUpdated {
                session_id: "s1".to_string(),
                device_key: "d1".to_string(),
            },
            GatewayEvent::SessionClosed {
                session_id: "s1".to_string(),
                device_key: "d1".to_string(),
                reason: CloseReason::Deregistered,
            },
            GatewayEvent::ObservationOpened {
                session_id: "s1".to_string(),
                device_key: "d1".to_string(),
                subscription_id: "sub1".to_string(),
                path: "/1/0/1".to_string(),
            },
            GatewayEvent::ObservationDelivered {
                session_id: "s1".to_string(),
                device_key: "d1".to_string(),
                path: "/1/0/1".to_string(),
                payload: vec![],
            },
            GatewayEvent::ObservationError {
                session_id: "s1".to_string(),
                device_key: "d1".to_string(),
                path: "/1/0/1".to_string(),
                kind: ObservationErrorKind::Timeout,
            },
            GatewayEvent::PresenceChanged {
                session_id: "s1".to_string(),
                device_key: "d1".to_string(),
                status: PresenceStatus::Awake,
            },
        ];

        for event in &events {
            assert_eq!(event.session_id(), "s1");
            assert_eq!(event.device_key(), "d1");
        }
    }
}
