//! tether-core: Session lifecycle and notification routing for the tether
//! device gateway
//!
//! This crate provides the concurrent core of the gateway:
//!
//! - **Session registry** - [`SessionRegistry`] holds the authoritative map
//!   of active device registrations and enforces one active session per
//!   device
//! - **Observation routing** - [`ObservationRouter`] delivers notifications
//!   to the owning session at most once, dropping stale and orphaned
//!   deliveries
//! - **Presence tracking** - [`PresenceTracker`] follows each device's
//!   power-save sleep/awake transitions
//! - **Lifecycle coordination** - [`LifecycleCoordinator`] is the single
//!   ingress for transport events, serialized per device key
//! - **Event system** - [`EventBus`] trait and [`MemoryEventBus`] carry
//!   [`GatewayEvent`]s to downstream consumers
//!
//! # Quick Start
//!
//! ```no_run
//! use tether_core::{CoreConfig, LifecycleCoordinator, TransportHandle};
//!
//! #[tokio::main]
//! async fn main() {
//!     let coordinator = LifecycleCoordinator::new(CoreConfig::default());
//!
//!     // The transport collaborator reports a device registration
//!     let session_id = coordinator
//!         .on_register("urn:dev:ops:thermostat-17", TransportHandle::new(()), 300)
//!         .await;
//!
//!     // Downstream consumers watch the event stream
//!     let _events = coordinator.events().subscribe();
//!     println!("registered as {}", session_id);
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! transport events ──▶ LifecycleCoordinator ──▶ SessionRegistry
//!                            │                  ObservationRouter
//!                            │                  PresenceTracker
//!                            └──────────▶ EventBus ──▶ persistence,
//!                                                      telemetry, RPC
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod observe;
pub mod presence;
pub mod registry;

// Re-export key types for convenience
pub use config::CoreConfig;
pub use coordinator::{LifecycleCoordinator, TransportEvent};
pub use error::{GatewayError, RegistryError, RouterError};
pub use events::{EventBus, EventSeq, GatewayEvent, MemoryEventBus};
pub use observe::{
    DeliveryOutcome, ObservationErrorKind, ObservationRouter, Subscription, SubscriptionId,
};
pub use presence::{PresenceStatus, PresenceTracker};
pub use registry::{
    CloseReason, DeviceKey, RegisterOutcome, Session, SessionId, SessionRegistry, SessionState,
    TransportHandle,
};
