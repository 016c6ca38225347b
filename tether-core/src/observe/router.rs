//! ObservationRouter: routes inbound notifications to owning sessions
//!
//! Sequence numbers are assigned per subscription by the transport and are
//! monotonic at the source, but the datagram layer underneath may reorder
//! or duplicate deliveries. Gating on a strictly advancing sequence gives
//! downstream consumers at-most-once, in-order delivery without buffering.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::RouterError;
use crate::events::{EventBus, GatewayEvent};
use crate::registry::{Session, SessionId, SessionRegistry};

use super::subscription::{DeliveryOutcome, ObservationErrorKind, Subscription, SubscriptionId};

#[derive(Default)]
struct RouterState {
    /// Outstanding subscriptions indexed by ID
    subscriptions: HashMap<SubscriptionId, Subscription>,
    /// Session ID -> subscriptions owned by that session
    by_session: HashMap<SessionId, HashSet<SubscriptionId>>,
}

/// Routes observation notifications, filtering stale and orphaned deliveries
pub struct ObservationRouter {
    state: RwLock<RouterState>,
    registry: Arc<SessionRegistry>,
    events: Arc<dyn EventBus>,
}

impl ObservationRouter {
    /// Create a new router over the given registry and bus
    pub fn new(registry: Arc<SessionRegistry>, events: Arc<dyn EventBus>) -> Self {
        Self {
            state: RwLock::new(RouterState::default()),
            registry,
            events,
        }
    }

    /// Open an observation on a resource path of an active session
    pub async fn open_subscription(
        &self,
        session_id: &str,
        path: &str,
    ) -> Result<SubscriptionId, RouterError> {
        let session = self
            .active_session(session_id)
            .await
            .ok_or_else(|| RouterError::SessionNotFound(session_id.to_string()))?;

        let subscription = Subscription::new(session_id, path);
        let subscription_id = subscription.subscription_id.clone();

        {
            let mut state = self.state.write().await;
            state
                .by_session
                .entry(session_id.to_string())
                .or_default()
                .insert(subscription_id.clone());
            state
                .subscriptions
                .insert(subscription_id.clone(), subscription);
        }

        self.events
            .publish(GatewayEvent::ObservationOpened {
                session_id: session_id.to_string(),
                device_key: session.device_key,
                subscription_id: subscription_id.clone(),
                path: path.to_string(),
            })
            .await;

        Ok(subscription_id)
    }

    /// Route one notification
    ///
    /// Accepted only when the subscription still exists, its owning session
    /// is still active, and `seq` strictly advances. Everything else is
    /// dropped and reported through the returned outcome, never retried.
    pub async fn notify(
        &self,
        subscription_id: &str,
        seq: u64,
        payload: Vec<u8>,
    ) -> DeliveryOutcome {
        let session_id = {
            let state = self.state.read().await;
            match state.subscriptions.get(subscription_id) {
                Some(sub) => sub.session_id.clone(),
                None => {
                    debug!(subscription = %subscription_id, seq, "Dropping notification for purged subscription");
                    return DeliveryOutcome::OrphanSubscription;
                }
            }
        };

        let Some(session) = self.active_session(&session_id).await else {
            debug!(session = %session_id, seq, "Dropping notification for closed session");
            return DeliveryOutcome::OrphanSession;
        };

        let mut state = self.state.write().await;
        // Re-check: the subscription may have been purged while the
        // registry was consulted.
        let Some(sub) = state.subscriptions.get_mut(subscription_id) else {
            return DeliveryOutcome::OrphanSubscription;
        };
        if !sub.advances(seq) {
            debug!(
                subscription = %subscription_id,
                seq,
                last = ?sub.last_notification_seq,
                "Dropping stale notification"
            );
            return DeliveryOutcome::Stale;
        }
        sub.last_notification_seq = Some(seq);
        let path = sub.path.clone();

        // Published under the write lock: acceptance and emission must not
        // reorder across concurrent deliveries to the same subscription.
        self.events
            .publish(GatewayEvent::ObservationDelivered {
                session_id,
                device_key: session.device_key,
                path,
                payload,
            })
            .await;

        DeliveryOutcome::Delivered
    }

    /// Forward a transport-reported observation error downstream
    ///
    /// Does not terminate the subscription; whether to retry or cancel the
    /// underlying observation is the transport collaborator's call.
    pub async fn notify_error(&self, subscription_id: &str, kind: ObservationErrorKind) {
        let (session_id, path) = {
            let state = self.state.read().await;
            match state.subscriptions.get(subscription_id) {
                Some(sub) => (sub.session_id.clone(), sub.path.clone()),
                None => {
                    debug!(subscription = %subscription_id, ?kind, "Dropping error for purged subscription");
                    return;
                }
            }
        };

        let Some(session) = self.active_session(&session_id).await else {
            debug!(session = %session_id, ?kind, "Dropping error for closed session");
            return;
        };

        self.events
            .publish(GatewayEvent::ObservationError {
                session_id,
                device_key: session.device_key,
                path,
                kind,
            })
            .await;
    }

    /// Purge all subscriptions owned by a session; idempotent
    pub async fn close_subscriptions_for_session(&self, session_id: &str) -> usize {
        let mut state = self.state.write().await;
        let Some(ids) = state.by_session.remove(session_id) else {
            return 0;
        };

        for id in &ids {
            state.subscriptions.remove(id);
        }

        debug!(session = %session_id, purged = ids.len(), "Purged subscriptions");
        ids.len()
    }

    /// Cancel one observation; idempotent
    pub async fn close_subscription(&self, subscription_id: &str) -> bool {
        let mut state = self.state.write().await;
        let Some(sub) = state.subscriptions.remove(subscription_id) else {
            return false;
        };

        if let Some(ids) = state.by_session.get_mut(&sub.session_id) {
            ids.remove(subscription_id);
            if ids.is_empty() {
                state.by_session.remove(&sub.session_id);
            }
        }

        true
    }

    /// Get the number of outstanding subscriptions
    pub async fn subscription_count(&self) -> usize {
        self.state.read().await.subscriptions.len()
    }

    /// List subscription IDs owned by a session
    pub async fn subscriptions_for_session(&self, session_id: &str) -> Vec<SubscriptionId> {
        self.state
            .read()
            .await
            .by_session
            .get(session_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    async fn active_session(&self, session_id: &str) -> Option<Session> {
        self.registry
            .lookup(session_id)
            .await
            .filter(|s| s.is_active())
    }
}
