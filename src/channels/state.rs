//! Reactive store for the latest channel snapshot.
//!
//! [`ChannelState`] holds the most recent [`ChannelSnapshot`] received
//! over the connection's broadcast channel and exposes it through a
//! [`tokio::sync::watch`] channel: subscribers observe the current value
//! immediately and are notified on every update.
//!
//! The broadcast listener is resource-scoped: a forwarder task attaches
//! to the connection on the first subscription and detaches once the
//! last subscriber is dropped.

use std::sync::{Arc, Mutex};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::snapshot::ChannelSnapshot;
use crate::link::Connection;

/// Latest-snapshot store fed by broadcast frames.
///
/// Each broadcast payload is normalized to exactly
/// [`CHANNEL_COUNT`](super::CHANNEL_COUNT) levels and replaces the
/// snapshot wholesale; non-array payloads are ignored.
#[derive(Debug)]
pub struct ChannelState {
    connection: Connection,
    snapshot_tx: watch::Sender<ChannelSnapshot>,
    forwarder: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ChannelState {
    /// Creates a store over the given connection.
    ///
    /// No broadcast listener is attached yet; that happens on the first
    /// [`ChannelState::subscribe`] call.
    #[must_use]
    pub fn new(connection: Connection) -> Self {
        let (snapshot_tx, _) = watch::channel(ChannelSnapshot::default());
        Self {
            connection,
            snapshot_tx,
            forwarder: Arc::new(Mutex::new(None)),
        }
    }

    /// Subscribes to snapshot updates.
    ///
    /// The receiver observes the current snapshot immediately
    /// (`borrow()`) and is notified on every subsequent replacement
    /// (`changed()`). Dropping the receiver unsubscribes; when the last
    /// receiver is dropped the broadcast listener detaches from the
    /// connection.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChannelSnapshot> {
        let receiver = self.snapshot_tx.subscribe();
        self.ensure_forwarder();
        receiver
    }

    /// Returns a clone of the current snapshot.
    #[must_use]
    pub fn latest(&self) -> ChannelSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Returns `true` while a forwarder task is attached to the
    /// connection's broadcast channel.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.forwarder.lock().map_or(false, |slot| slot.is_some())
    }

    /// Spawns the forwarder task unless one is already attached.
    ///
    /// The task clears its own slot (under the same lock) before
    /// exiting, so an occupied slot always means a live listener.
    fn ensure_forwarder(&self) {
        let Ok(mut slot) = self.forwarder.lock() else {
            return;
        };
        if slot.is_some() {
            return;
        }

        let mut events = self.connection.broadcasts();
        let snapshot_tx = self.snapshot_tx.clone();
        let forwarder = Arc::clone(&self.forwarder);

        *slot = Some(tokio::spawn(async move {
            loop {
                tokio::select! {
                    payload = events.recv() => match payload {
                        Ok(payload) => {
                            if let Some(snapshot) = ChannelSnapshot::from_value(&payload) {
                                snapshot_tx.send_replace(snapshot);
                            } else {
                                tracing::debug!("ignoring non-array broadcast payload");
                            }
                        }
                        Err(RecvError::Lagged(missed)) => {
                            tracing::warn!(missed, "channel state lagged behind broadcast bus");
                        }
                        Err(RecvError::Closed) => {
                            if let Ok(mut slot) = forwarder.lock() {
                                *slot = None;
                            }
                            break;
                        }
                    },
                    () = snapshot_tx.closed() => {
                        // Detach only if no subscriber raced in between
                        // the wakeup and this check.
                        let Ok(mut slot) = forwarder.lock() else {
                            break;
                        };
                        if snapshot_tx.receiver_count() == 0 {
                            *slot = None;
                            break;
                        }
                    }
                }
            }
        }));
    }
}
