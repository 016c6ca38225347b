//! Error types for tether-core
//!
//! Every failure here is scoped to a single session or subscription and is
//! reported as a typed value; nothing in the core is process-fatal. Dropped
//! notifications (stale, orphaned) are not errors at all; see
//! [`crate::observe::DeliveryOutcome`].

use thiserror::Error;

/// Top-level error type for tether-core
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Router error: {0}")]
    Router(#[from] RouterError),
}

/// Errors from the session registry
#[derive(Error, Debug)]
pub enum RegistryError {
    /// The session is unknown or already closed. Callers treat this as
    /// "ignore, the transport already dropped it", never retried.
    #[error("Session not found: {0}")]
    NotFound(String),
}

/// Errors from the observation router
#[derive(Error, Debug)]
pub enum RouterError {
    /// The owning session is unknown or no longer active, so no
    /// subscription can be opened against it.
    #[error("Session not found or not active: {0}")]
    SessionNotFound(String),
}
