//! Observation routing

pub mod router;
pub mod subscription;

// Re-export key types for convenience
pub use router::ObservationRouter;
pub use subscription::{DeliveryOutcome, ObservationErrorKind, Subscription, SubscriptionId};
