//! LifecycleCoordinator: the single ingress point for transport events
//!
//! The coordinator serializes register/update/close per device key so
//! non-commutative lifecycle events for one device apply in arrival order,
//! and propagates every session close to the observation router and the
//! presence tracker before the close handler returns. Operations keyed by
//! an already-resolved session or subscription ID (notify, presence) skip
//! the per-device section: a session ID is immutable once assigned and
//! superseding always mints a fresh one.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::config::CoreConfig;
use crate::error::RegistryError;
use crate::events::{EventBus, MemoryEventBus};
use crate::observe::{DeliveryOutcome, ObservationErrorKind, ObservationRouter};
use crate::presence::PresenceTracker;
use crate::registry::{CloseReason, DeviceKey, SessionId, SessionRegistry, TransportHandle};

use super::ingress::TransportEvent;

/// Receives raw transport events and drives the three core components
pub struct LifecycleCoordinator {
    config: CoreConfig,
    registry: Arc<SessionRegistry>,
    router: Arc<ObservationRouter>,
    presence: Arc<PresenceTracker>,
    events: Arc<dyn EventBus>,
    /// Per-device ordering domain. Entries are created on first contact
    /// and retained for the coordinator's lifetime; reaping one while a
    /// task still holds it would let a second mutex exist for the same
    /// device.
    device_locks: Mutex<HashMap<DeviceKey, Arc<Mutex<()>>>>,
}

impl LifecycleCoordinator {
    /// Create a coordinator with its own in-memory event bus
    pub fn new(config: CoreConfig) -> Self {
        let events: Arc<dyn EventBus> = Arc::new(MemoryEventBus::new(config.event_capacity));
        Self::with_event_bus(config, events)
    }

    /// Create a coordinator publishing to an injected event bus
    pub fn with_event_bus(config: CoreConfig, events: Arc<dyn EventBus>) -> Self {
        let registry = Arc::new(SessionRegistry::new(events.clone()));
        let router = Arc::new(ObservationRouter::new(registry.clone(), events.clone()));
        let presence = Arc::new(PresenceTracker::new(registry.clone(), events.clone()));

        Self {
            config,
            registry,
            router,
            presence,
            events,
            device_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The observation router
    pub fn router(&self) -> &Arc<ObservationRouter> {
        &self.router
    }

    /// The presence tracker
    pub fn presence(&self) -> &Arc<PresenceTracker> {
        &self.presence
    }

    /// The outbound event bus
    pub fn events(&self) -> &Arc<dyn EventBus> {
        &self.events
    }

    /// Route one inbound transport event to its handler
    pub async fn dispatch(&self, event: TransportEvent) {
        match event {
            TransportEvent::Register {
                device_key,
                handle,
                lifetime_seconds,
            } => {
                self.on_register(&device_key, handle, lifetime_seconds).await;
            }
            TransportEvent::Update {
                session_id,
                lifetime_seconds,
            } => self.on_update(&session_id, lifetime_seconds).await,
            TransportEvent::Deregister { session_id } => self.on_deregister(&session_id).await,
            TransportEvent::Expire { session_id } => self.on_expire(&session_id).await,
            TransportEvent::TransportError { session_id } => {
                self.on_transport_error(&session_id).await;
            }
            TransportEvent::ObservationResponse {
                subscription_id,
                seq,
                payload,
            } => {
                self.on_observation_response(&subscription_id, seq, payload)
                    .await;
            }
            TransportEvent::ObservationError {
                subscription_id,
                kind,
            } => self.on_observation_error(&subscription_id, kind).await,
            TransportEvent::Sleep { session_id } => self.on_sleep(&session_id).await,
            TransportEvent::Awake { session_id } => self.on_awake(&session_id).await,
        }
    }

    /// Handle a device registration
    ///
    /// A `lifetime_seconds` of zero falls back to the configured default.
    /// If the device already had an active session it is superseded, and
    /// its subscriptions and presence state are purged before this returns.
    pub async fn on_register(
        &self,
        device_key: &str,
        handle: TransportHandle,
        lifetime_seconds: u64,
    ) -> SessionId {
        let lifetime = if lifetime_seconds == 0 {
            self.config.default_lifetime_secs
        } else {
            lifetime_seconds
        };

        let lock = self.device_lock(device_key).await;
        let _ordering = lock.lock().await;

        let outcome = self.registry.register(device_key, handle, lifetime).await;

        if let Some(old_id) = &outcome.superseded {
            self.router.close_subscriptions_for_session(old_id).await;
            self.presence.discard(old_id).await;
        }
        self.presence.track(&outcome.session_id).await;

        outcome.session_id
    }

    /// Handle a registration update; unknown sessions are logged and dropped
    pub async fn on_update(&self, session_id: &str, lifetime_seconds: Option<u64>) {
        let Some(session) = self.registry.lookup(session_id).await else {
            debug!(session = %session_id, "Ignoring update for unknown session");
            return;
        };

        let lock = self.device_lock(&session.device_key).await;
        let _ordering = lock.lock().await;

        if let Err(RegistryError::NotFound(_)) =
            self.registry.update(session_id, lifetime_seconds).await
        {
            debug!(session = %session_id, "Update raced a close; dropped");
        }
    }

    /// Handle an explicit de-registration
    pub async fn on_deregister(&self, session_id: &str) {
        self.close_session(session_id, CloseReason::Deregistered)
            .await;
    }

    /// Handle a lifetime expiry reported by the transport timer
    pub async fn on_expire(&self, session_id: &str) {
        self.close_session(session_id, CloseReason::Expired).await;
    }

    /// Handle a fatal transport error on a session's connection
    pub async fn on_transport_error(&self, session_id: &str) {
        self.close_session(session_id, CloseReason::TransportError)
            .await;
    }

    /// Handle an observation notification
    pub async fn on_observation_response(
        &self,
        subscription_id: &str,
        seq: u64,
        payload: Vec<u8>,
    ) -> DeliveryOutcome {
        self.router.notify(subscription_id, seq, payload).await
    }

    /// Handle a transport-reported observation error
    pub async fn on_observation_error(&self, subscription_id: &str, kind: ObservationErrorKind) {
        self.router.notify_error(subscription_id, kind).await;
    }

    /// Handle a device entering power-save
    pub async fn on_sleep(&self, session_id: &str) {
        self.presence.mark_asleep(session_id).await;
    }

    /// Handle a device waking up
    pub async fn on_awake(&self, session_id: &str) {
        self.presence.mark_awake(session_id).await;
    }

    /// Close a session and synchronously propagate the cleanup
    ///
    /// Subscription purge and presence discard complete before this
    /// returns, so callers never observe a half-closed session.
    async fn close_session(&self, session_id: &str, reason: CloseReason) {
        let Some(session) = self.registry.lookup(session_id).await else {
            debug!(session = %session_id, ?reason, "Ignoring close for unknown session");
            return;
        };

        let lock = self.device_lock(&session.device_key).await;
        let _ordering = lock.lock().await;

        match self.registry.close(session_id, reason).await {
            Ok(_) => {
                self.router.close_subscriptions_for_session(session_id).await;
                self.presence.discard(session_id).await;
            }
            Err(RegistryError::NotFound(_)) => {
                debug!(session = %session_id, ?reason, "Close raced a supersede; dropped");
            }
        }
    }

    async fn device_lock(&self, device_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.device_locks.lock().await;
        locks
            .entry(device_key.to_string())
            .or_default()
            .clone()
    }
}
