//! Tunables named in spec.md §4.C and §5, with the defaults the spec
//! states. Overridable by the CLI surface added in SPEC_FULL.md §6 so
//! tests can run the keepalive/handshake timing budget fast.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct TransportConfig {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
    pub handshake_timeout: Duration,
    /// Bounded per-peer outbound queue capacity (spec.md §5).
    pub queue_capacity: usize,
    /// Deadline before a Block/Transaction that can't be enqueued
    /// closes the session (spec.md §5).
    pub enqueue_deadline: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(10),
            queue_capacity: 1024,
            enqueue_deadline: Duration::from_secs(1),
        }
    }
}
