//! Configuration for the gateway core

use serde::{Deserialize, Serialize};

/// Configuration consumed by [`crate::coordinator::LifecycleCoordinator`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Capacity of the event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Lifetime applied when a device registers with `lifetime_seconds == 0`
    #[serde(default = "default_lifetime_secs")]
    pub default_lifetime_secs: u64,
}

fn default_event_capacity() -> usize {
    256
}

fn default_lifetime_secs() -> u64 {
    86_400
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            default_lifetime_secs: default_lifetime_secs(),
        }
    }
}
