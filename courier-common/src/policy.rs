//! Queueing and storage policy for a destination

use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_retry_interval() -> u64 {
    10_000 // 10 seconds
}

const fn default_failure_backoff_max() -> u64 {
    60_000 // 1 minute
}

const fn default_failure_backoff_jitter() -> f64 {
    0.1 // ±10%
}

const fn default_buffer_capacity() -> usize {
    1000
}

const fn enabled() -> bool {
    true
}

/// How a destination queues and retries messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConnectorProperties {
    /// Whether messages that can't be delivered right away are queued
    #[serde(default, alias = "queue_enabled")]
    pub enabled: bool,

    /// Attempt delivery before placing a message on the queue
    #[serde(default)]
    pub send_first: bool,

    /// Rebuild the send parameters from the message on every queued attempt,
    /// rather than reusing the ones stored by the first attempt
    #[serde(default)]
    pub regenerate_template: bool,

    /// How many times a failed send is retried within a single attempt
    ///
    /// Default: 0
    #[serde(default)]
    pub retry_count: u32,

    /// Pause between retries, and between polls of an empty queue (in milliseconds)
    ///
    /// Default: 10000 milliseconds (10 seconds)
    #[serde(default = "default_retry_interval")]
    pub retry_interval_millis: u64,

    /// Upper bound on the pause after repeated failures to process the same
    /// queued message (in milliseconds)
    ///
    /// Default: 60000 milliseconds (1 minute)
    #[serde(default = "default_failure_backoff_max")]
    pub failure_backoff_max_millis: u64,

    /// Randomness applied to the failure backoff (0.0 to 1.0)
    ///
    /// Default: 0.1 (±10%)
    #[serde(default = "default_failure_backoff_jitter")]
    pub failure_backoff_jitter: f64,

    /// How many queued messages are held in memory at once
    ///
    /// Default: 1000
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
}

impl Default for QueueConnectorProperties {
    fn default() -> Self {
        Self {
            enabled: false,
            send_first: false,
            regenerate_template: false,
            retry_count: 0,
            retry_interval_millis: default_retry_interval(),
            failure_backoff_max_millis: default_failure_backoff_max(),
            failure_backoff_jitter: default_failure_backoff_jitter(),
            buffer_capacity: default_buffer_capacity(),
        }
    }
}

impl QueueConnectorProperties {
    #[must_use]
    pub const fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_millis)
    }

    #[must_use]
    pub const fn failure_backoff_max(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_max_millis)
    }
}

/// What a destination persists while processing a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "Each flag is an independent storage switch"
)]
pub struct StorageSettings {
    #[serde(default = "enabled")]
    pub store_sent: bool,

    #[serde(default = "enabled")]
    pub store_response: bool,

    #[serde(default = "enabled")]
    pub store_processed_response: bool,

    #[serde(default = "enabled")]
    pub store_response_map: bool,

    /// Whether commits must survive a crash
    #[serde(default = "enabled")]
    pub durable: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            store_sent: true,
            store_response: true,
            store_processed_response: true,
            store_response_map: true,
            durable: true,
        }
    }
}
