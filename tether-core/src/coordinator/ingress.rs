//! Inbound transport events
//!
//! The transport collaborator delivers one [`TransportEvent`] per physical
//! network event. Each variant carries only the fields its handler needs;
//! dispatch is a tagged match, not a callback object.

use crate::observe::ObservationErrorKind;
use crate::registry::{DeviceKey, SessionId, TransportHandle};

/// One inbound event from the transport collaborator
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A device registered (or re-registered)
    Register {
        device_key: DeviceKey,
        handle: TransportHandle,
        lifetime_seconds: u64,
    },

    /// A registration update for an existing session
    Update {
        session_id: SessionId,
        lifetime_seconds: Option<u64>,
    },

    /// The device explicitly de-registered
    Deregister { session_id: SessionId },

    /// The transport's lifetime timer expired the session
    Expire { session_id: SessionId },

    /// The session's connection failed fatally (e.g. security teardown)
    TransportError { session_id: SessionId },

    /// A notification arrived for an outstanding observation
    ObservationResponse {
        subscription_id: String,
        seq: u64,
        payload: Vec<u8>,
    },

    /// The transport failed to handle a notification
    ObservationError {
        subscription_id: String,
        kind: ObservationErrorKind,
    },

    /// The device entered power-save
    Sleep { session_id: SessionId },

    /// The device woke up
    Awake { session_id: SessionId },
}
