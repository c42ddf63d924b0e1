//! Bounded per-peer outbound queue with the backpressure policy from
//! spec.md §5: overflow drops the oldest non-critical message (Ping,
//! DHT responses); a Block or Transaction that still can't be
//! enqueued after the deadline closes the session instead of
//! stalling the broadcast path.

use eastsea_codec::Message;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

fn is_critical(msg: &Message) -> bool {
    matches!(msg, Message::Block(_) | Message::Transaction(_))
}

pub struct OutboundQueue {
    capacity: usize,
    inner: Mutex<VecDeque<Message>>,
    notify: Notify,
}

/// The queue refused to admit a critical message within its deadline;
/// the caller should close the session (spec.md §5).
#[derive(Debug, thiserror::Error)]
#[error("send queue full")]
pub struct QueueFull;

impl OutboundQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            notify: Notify::new(),
        }
    }

    /// Enqueue `msg`, applying the drop/close policy if the queue is
    /// already at capacity.
    pub async fn enqueue(&self, msg: Message, deadline: Duration) -> Result<(), QueueFull> {
        let critical = is_critical(&msg);
        let deadline_at = Instant::now() + deadline;

        loop {
            {
                let mut q = self.inner.lock().await;
                if q.len() < self.capacity {
                    q.push_back(msg);
                    self.notify.notify_one();
                    return Ok(());
                }
                if !critical {
                    // Drop the oldest non-critical entry to make room;
                    // if every queued entry is critical, drop this
                    // message rather than evict one the policy
                    // protects.
                    if let Some(pos) = q.iter().position(|m| !is_critical(m)) {
                        q.remove(pos);
                        q.push_back(msg);
                        self.notify.notify_one();
                    }
                    return Ok(());
                }
            }

            if Instant::now() >= deadline_at {
                return Err(QueueFull);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Pop the next message, waiting if the queue is currently empty.
    pub async fn dequeue(&self) -> Message {
        loop {
            {
                let mut q = self.inner.lock().await;
                if let Some(m) = q.pop_front() {
                    return m;
                }
            }
            self.notify.notified().await;
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}
