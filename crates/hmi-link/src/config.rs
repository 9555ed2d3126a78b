//! Link timing and sizing configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Link configuration
///
/// Every field affects timing or buffer sizing only, never protocol
/// semantics. Missing fields fall back to their defaults when deserialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Wait for each chunk of response bytes (ms)
    pub read_timeout_ms: u64,
    /// Wait for a written command to drain to the transport (ms)
    pub transmit_timeout_ms: u64,
    /// Wait to acquire the command lock (ms)
    pub lock_timeout_ms: u64,
    /// Wait for already-sent event bytes when draining inline (ms)
    pub drain_timeout_ms: u64,
    /// Receive ring buffer capacity (bytes)
    pub rx_buffer_size: usize,
    /// Exclusive upper bound on a transparent data session (bytes)
    pub max_transparent_bytes: usize,
    /// Spawn a background reader task instead of reading inline
    pub background_reader: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 100,
            transmit_timeout_ms: 100,
            lock_timeout_ms: 1000,
            drain_timeout_ms: 0,
            rx_buffer_size: 1024,
            max_transparent_bytes: 4096,
            background_reader: true,
        }
    }
}

impl LinkConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn transmit_timeout(&self) -> Duration {
        Duration::from_millis(self.transmit_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// Inline reads (no background task)
    pub fn inline() -> Self {
        Self {
            background_reader: false,
            ..Self::default()
        }
    }
}
