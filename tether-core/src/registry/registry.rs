//! SessionRegistry: the authoritative map of active device sessions
//!
//! The registry exclusively owns all [`Session`] records. Cross-component
//! effects (subscription purge, presence discard) happen through the
//! coordinator, never by reaching into these maps.
//!
//! Callers are expected to serialize register/update/close per device key
//! (the coordinator's ordering domain); the registry itself only guarantees
//! that each individual operation is atomic.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::events::{EventBus, GatewayEvent};

use super::session::{CloseReason, DeviceKey, Session, SessionId, SessionState, TransportHandle};

/// Result of a registration
#[derive(Debug, Clone)]
pub struct RegisterOutcome {
    /// The freshly created session
    pub session_id: SessionId,
    /// Session that was closed with reason `Superseded`, if the device
    /// already had an active registration
    pub superseded: Option<SessionId>,
}

#[derive(Default)]
struct RegistryState {
    /// Active sessions indexed by session ID
    sessions: HashMap<SessionId, Session>,
    /// Device key -> session ID of the one active session for that device
    by_device: HashMap<DeviceKey, SessionId>,
}

/// Authoritative registry of active device sessions
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
    events: Arc<dyn EventBus>,
}

impl SessionRegistry {
    /// Create a new registry publishing to the given bus
    pub fn new(events: Arc<dyn EventBus>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            events,
        }
    }

    /// Register a device, superseding any existing active session
    ///
    /// The superseded session (if any) is closed atomically with the new
    /// session becoming active: no observer ever sees two active sessions
    /// for one device key. `SessionClosed { Superseded }` is published
    /// before the new `SessionOpened`.
    pub async fn register(
        &self,
        device_key: &str,
        handle: TransportHandle,
        lifetime_seconds: u64,
    ) -> RegisterOutcome {
        let mut session = Session::new(device_key, handle, lifetime_seconds);
        session.state = SessionState::Active;
        let session_id = session.session_id.clone();

        let superseded = {
            let mut state = self.state.write().await;

            let superseded = state
                .by_device
                .remove(device_key)
                .and_then(|old_id| state.sessions.remove(&old_id))
                .map(|mut old| {
                    old.state = SessionState::Closed;
                    old.session_id
                });

            state
                .by_device
                .insert(device_key.to_string(), session_id.clone());
            state.sessions.insert(session_id.clone(), session);

            superseded
        };

        if let Some(old_id) = &superseded {
            info!(device_key, old_session = %old_id, new_session = %session_id, "Superseding session");
            self.events
                .publish(GatewayEvent::SessionClosed {
                    session_id: old_id.clone(),
                    device_key: device_key.to_string(),
                    reason: CloseReason::Superseded,
                })
                .await;
        } else {
            info!(device_key, session = %session_id, "Registered");
        }

        self.events
            .publish(GatewayEvent::SessionOpened {
                session_id: session_id.clone(),
                device_key: device_key.to_string(),
                previous_session_id: superseded.clone(),
            })
            .await;

        RegisterOutcome {
            session_id,
            superseded,
        }
    }

    /// Refresh a session on a registration update
    ///
    /// Fails with [`RegistryError::NotFound`] when the session is gone
    /// (already closed or superseded); the caller logs and drops.
    pub async fn update(
        &self,
        session_id: &str,
        lifetime_seconds: Option<u64>,
    ) -> Result<(), RegistryError> {
        let device_key = {
            let mut state = self.state.write().await;
            let session = state
                .sessions
                .get_mut(session_id)
                .filter(|s| s.is_active())
                .ok_or_else(|| RegistryError::NotFound(session_id.to_string()))?;

            session.state = SessionState::Updating;
            session.touch(lifetime_seconds);
            session.state = SessionState::Active;
            session.device_key.clone()
        };

        debug!(device_key, session = %session_id, "Updated");
        self.events
            .publish(GatewayEvent::SessionUpdated {
                session_id: session_id.to_string(),
                device_key,
            })
            .await;

        Ok(())
    }

    /// Close a session and remove it from the active map
    ///
    /// A stale close for an already superseded session resolves to
    /// `NotFound` and never touches the device's new session.
    pub async fn close(
        &self,
        session_id: &str,
        reason: CloseReason,
    ) -> Result<Session, RegistryError> {
        let closed = {
            let mut state = self.state.write().await;
            let mut session = state
                .sessions
                .remove(session_id)
                .ok_or_else(|| RegistryError::NotFound(session_id.to_string()))?;

            session.state = match reason {
                CloseReason::Expired => SessionState::Expired,
                _ => SessionState::Deregistering,
            };
            session.state = SessionState::Closed;

            // Only drop the device mapping if it still points at this
            // session; a superseded entry already points at the successor.
            if state.by_device.get(&session.device_key) == Some(&session.session_id) {
                state.by_device.remove(&session.device_key);
            }

            session
        };

        info!(
            device_key = %closed.device_key,
            session = %session_id,
            ?reason,
            "Closed"
        );
        self.events
            .publish(GatewayEvent::SessionClosed {
                session_id: session_id.to_string(),
                device_key: closed.device_key.clone(),
                reason,
            })
            .await;

        Ok(closed)
    }

    /// Get a session by ID
    pub async fn lookup(&self, session_id: &str) -> Option<Session> {
        self.state.read().await.sessions.get(session_id).cloned()
    }

    /// Get the active session for a device, if any
    pub async fn lookup_by_device_key(&self, device_key: &str) -> Option<Session> {
        let state = self.state.read().await;
        let session_id = state.by_device.get(device_key)?;
        state.sessions.get(session_id).cloned()
    }

    /// List all active session IDs
    pub async fn list_sessions(&self) -> Vec<SessionId> {
        self.state.read().await.sessions.keys().cloned().collect()
    }

    /// Get the number of active sessions
    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::MemoryEventBus;

    fn create_test_registry() -> (SessionRegistry, Arc<MemoryEventBus>) {
        let bus = Arc::new(MemoryEventBus::new(100));
        let registry = SessionRegistry::new(bus.clone());
        (registry, bus)
    }

    fn handle() -> TransportHandle {
        TransportHandle::new(())
    }

    // ==================== Register Tests ====================

    #[tokio::test]
    async fn register_creates_active_session() {
        let (registry, _bus) = create_test_registry();

        let outcome = registry.register("dev1", handle(), 300).await;

        assert!(outcome.superseded.is_none());
        let session = registry.lookup(&outcome.session_id).await.unwrap();
        assert_eq!(session.state, SessionState::Active);
        assert_eq!(session.device_key, "dev1");
        assert_eq!(session.lifetime_seconds, 300);
    }

    #[tokio::test]
    async fn register_emits_session_opened() {
        let (registry, bus) = create_test_registry();

        let outcome = registry.register("dev1", handle(), 300).await;

        let events = bus.events_from(0).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0].1,
            GatewayEvent::SessionOpened { session_id, previous_session_id: None, .. }
                if *session_id == outcome.session_id
        ));
    }

    #[tokio::test]
    async fn re_register_produces_strictly_new_session_id() {
        let (registry, _bus) = create_test_registry();

        let first = registry.register("dev1", handle(), 300).await;
        let second = registry.register("dev1", handle(), 300).await;

        assert_ne!(first.session_id, second.session_id);
        assert_eq!(second.superseded.as_deref(), Some(first.session_id.as_str()));
    }

    #[tokio::test]
    async fn supersede_closes_old_session() {
        let (registry, _bus) = create_test_registry();

        let first = registry.register("dev1", handle(), 300).await;
        let second = registry.register("dev1", handle(), 300).await;

        // Old session no longer resolves; device maps to the new one
        assert!(registry.lookup(&first.session_id).await.is_none());
        let current = registry.lookup_by_device_key("dev1").await.unwrap();
        assert_eq!(current.session_id, second.session_id);
        assert_eq!(registry.session_count().await, 1);
    }

    #[tokio::test]
    async fn supersede_emits_closed_before_opened() {
        let (registry, bus) = create_test_registry();

        let first = registry.register("dev1", handle(), 300).await;
        let second = registry.register("dev1", handle(), 300).await;

        let events = bus.events_from(0).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[1].1,
            GatewayEvent::SessionClosed { session_id, reason: CloseReason::Superseded, .. }
                if *session_id == first.session_id
        ));
        assert!(matches!(
            &events[2].1,
            GatewayEvent::SessionOpened { session_id, previous_session_id: Some(prev), .. }
                if *session_id == second.session_id && *prev == first.session_id
        ));
    }

    // ==================== Update Tests ====================

    #[tokio::test]
    async fn update_refreshes_last_seen_and_lifetime() {
        let (registry, bus) = create_test_registry();

        let outcome = registry.register("dev1", handle(), 300).await;
        let before = registry.lookup(&outcome.session_id).await.unwrap().last_seen;

        registry
            .update(&outcome.session_id, Some(600))
            .await
            .unwrap();

        let session = registry.lookup(&outcome.session_id).await.unwrap();
        assert!(session.last_seen >= before);
        assert_eq!(session.lifetime_seconds, 600);
        assert_eq!(session.state, SessionState::Active);

        let events = bus.events_from(0).await;
        assert!(matches!(
            &events.last().unwrap().1,
            GatewayEvent::SessionUpdated { session_id, .. }
                if *session_id == outcome.session_id
        ));
    }

    #[tokio::test]
    async fn update_without_lifetime_keeps_existing() {
        let (registry, _bus) = create_test_registry();

        let outcome = registry.register("dev1", handle(), 300).await;
        registry.update(&outcome.session_id, None).await.unwrap();

        let session = registry.lookup(&outcome.session_id).await.unwrap();
        assert_eq!(session.lifetime_seconds, 300);
    }

    #[tokio::test]
    async fn update_unknown_session_returns_not_found() {
        let (registry, _bus) = create_test_registry();

        let result = registry.update("nonexistent", None).await;

        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_after_close_returns_not_found() {
        let (registry, _bus) = create_test_registry();

        let outcome = registry.register("dev1", handle(), 300).await;
        registry
            .close(&outcome.session_id, CloseReason::Deregistered)
            .await
            .unwrap();

        let result = registry.update(&outcome.session_id, None).await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    // ==================== Close Tests ====================

    #[tokio::test]
    async fn close_removes_session_and_emits_reason() {
        let (registry, bus) = create_test_registry();

        let outcome = registry.register("dev1", handle(), 300).await;
        let closed = registry
            .close(&outcome.session_id, CloseReason::Expired)
            .await
            .unwrap();

        assert_eq!(closed.state, SessionState::Closed);
        assert!(registry.lookup(&outcome.session_id).await.is_none());
        assert!(registry.lookup_by_device_key("dev1").await.is_none());

        let events = bus.events_from(0).await;
        assert!(matches!(
            &events.last().unwrap().1,
            GatewayEvent::SessionClosed { reason: CloseReason::Expired, .. }
        ));
    }

    #[tokio::test]
    async fn close_unknown_session_returns_not_found() {
        let (registry, _bus) = create_test_registry();

        let result = registry.close("nonexistent", CloseReason::Deregistered).await;

        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn double_close_returns_not_found() {
        let (registry, _bus) = create_test_registry();

        let outcome = registry.register("dev1", handle(), 300).await;
        registry
            .close(&outcome.session_id, CloseReason::Deregistered)
            .await
            .unwrap();

        let result = registry
            .close(&outcome.session_id, CloseReason::Deregistered)
            .await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn stale_close_of_superseded_session_spares_new_session() {
        let (registry, _bus) = create_test_registry();

        let first = registry.register("dev1", handle(), 300).await;
        let second = registry.register("dev1", handle(), 300).await;

        // A late deregister for the superseded session is a no-op against
        // the new one
        let result = registry
            .close(&first.session_id, CloseReason::Deregistered)
            .await;
        assert!(matches!(result, Err(RegistryError::NotFound(_))));

        let current = registry.lookup_by_device_key("dev1").await.unwrap();
        assert_eq!(current.session_id, second.session_id);
        assert!(current.is_active());
    }

    // ==================== Lookup Tests ====================

    #[tokio::test]
    async fn lookup_by_device_key_finds_active_session() {
        let (registry, _bus) = create_test_registry();

        let outcome = registry.register("dev1", handle(), 300).await;

        let session = registry.lookup_by_device_key("dev1").await.unwrap();
        assert_eq!(session.session_id, outcome.session_id);
        assert!(registry.lookup_by_device_key("other").await.is_none());
    }

    #[tokio::test]
    async fn list_sessions_returns_all_active_ids() {
        let (registry, _bus) = create_test_registry();

        let a = registry.register("dev1", handle(), 300).await;
        let b = registry.register("dev2", handle(), 300).await;

        let ids = registry.list_sessions().await;
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.session_id));
        assert!(ids.contains(&b.session_id));
    }

    // ==================== Concurrency Tests ====================

    #[tokio::test]
    async fn concurrent_registration_of_different_devices_is_safe() {
        let bus = Arc::new(MemoryEventBus::new(1000));
        let registry = Arc::new(SessionRegistry::new(bus));
        let mut handles = vec![];

        for i in 0..10 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry
                    .register(&format!("dev{}", i), TransportHandle::new(()), 300)
                    .await
            }));
        }

        let mut ids = vec![];
        for h in handles {
            ids.push(h.await.unwrap().session_id);
        }

        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 10);
        assert_eq!(registry.session_count().await, 10);
    }

    #[tokio::test]
    async fn concurrent_registration_of_same_device_keeps_one_active() {
        let bus = Arc::new(MemoryEventBus::new(1000));
        let registry = Arc::new(SessionRegistry::new(bus));
        let mut handles = vec![];

        for _ in 0..10 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.register("dev1", TransportHandle::new(()), 300).await
            }));
        }

        for h in handles {
            h.await.unwrap();
        }

        // Nine superseded, exactly one survivor
        assert_eq!(registry.session_count().await, 1);
        assert!(registry.lookup_by_device_key("dev1").await.is_some());
    }
}
