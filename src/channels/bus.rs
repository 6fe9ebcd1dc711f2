//! Broadcast fan-out channel.
//!
//! [`BroadcastBus`] wraps a [`tokio::sync::broadcast`] channel. The
//! connection driver publishes every broadcast frame payload through the
//! bus, and all interested consumers subscribe independently.

use serde_json::Value;
use tokio::sync::broadcast;

/// Fan-out bus for broadcast frame payloads.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity.
/// When the ring buffer is full, the oldest payloads are dropped for
/// lagging receivers.
#[derive(Debug, Clone)]
pub struct BroadcastBus {
    sender: broadcast::Sender<Value>,
}

impl BroadcastBus {
    /// Creates a new `BroadcastBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes a payload to all subscribers.
    ///
    /// Returns the number of receivers that received the payload.
    /// If there are no active receivers, the payload is silently dropped.
    pub fn publish(&self, payload: Value) -> usize {
        self.sender.send(payload).unwrap_or(0)
    }

    /// Creates a new receiver that will receive all future payloads.
    ///
    /// Dropping the receiver removes exactly that one subscription.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
