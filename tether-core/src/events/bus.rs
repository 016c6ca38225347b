//! EventBus trait definition
//!
//! The EventBus is the seam between the core and its downstream consumers
//! (persistence, telemetry ingestion, RPC). Publishing is fire-and-forget:
//! the core never waits for a consumer and a lagging consumer never rolls
//! back a state transition.

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::GatewayEvent;

/// Sequence number for emitted events (monotonically increasing)
pub type EventSeq = u64;

/// Event bus for publishing and subscribing to gateway events
///
/// Implementations must support:
/// - Publishing events with sequence numbers
/// - Live subscriptions via broadcast channel
/// - Historical replay for late-joining consumers
/// - Device-scoped event retrieval
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event, returns its sequence number
    async fn publish(&self, event: GatewayEvent) -> EventSeq;

    /// Subscribe to all events from now (live stream)
    fn subscribe(&self) -> broadcast::Receiver<(EventSeq, GatewayEvent)>;

    /// Get all events starting from a sequence number (for replay)
    async fn events_from(&self, seq: EventSeq) -> Vec<(EventSeq, GatewayEvent)>;

    /// Get all events for a specific device (for late joiners)
    async fn events_for_device(&self, device_key: &str) -> Vec<(EventSeq, GatewayEvent)>;

    /// Current sequence number (high water mark)
    fn current_seq(&self) -> EventSeq;
}
