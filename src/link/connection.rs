//! Connection handle and driver loop.
//!
//! [`Connection`] is the single point of truth for the outbound socket:
//! it hides readiness and correlation bookkeeping from callers. All
//! inbound dispatch runs on one driver task, in frame-arrival order.
//!
//! Outbound frames submitted while the transport is still connecting are
//! buffered and flushed FIFO, exactly once, on the open transition;
//! frames submitted afterwards go directly to the transport.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use super::messages::{self, InboundFrame, OutboundRequest};
use super::services::ServiceRegistry;
use super::transport::Transport;
use crate::channels::BroadcastBus;
use crate::error::LinkError;

/// Shared connection internals.
///
/// Mutated only by the driver task (dispatch, open transition) and by
/// the synchronous, non-awaiting critical sections in the public
/// operations below.
#[derive(Debug)]
struct ConnectionInner {
    /// Next correlation id; ids start at 1 and are never reused while
    /// pending. Id 0 is reserved for broadcast frames.
    next_request_id: AtomicU64,
    /// In-flight requests keyed by correlation id.
    pending: Mutex<HashMap<u64, oneshot::Sender<Value>>>,
    /// Named handlers for uncorrelated service pushes.
    services: ServiceRegistry,
    /// Fan-out for broadcast frame payloads.
    broadcasts: BroadcastBus,
    /// Lifecycle state: `false` while connecting, `true` once open.
    open_tx: watch::Sender<bool>,
    /// Outbound frames to the driver, in submission order.
    outbound: mpsc::UnboundedSender<String>,
}

/// Cloneable handle to one persistent connection.
///
/// All clones share the same transport, pending-request table, service
/// registry, and broadcast bus. Construct through
/// [`LinkContext::connection`](crate::context::LinkContext::connection)
/// to get the context-owned instance, or directly via
/// [`Connection::open`] with a custom [`Transport`].
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    /// Opens a connection over the given transport.
    ///
    /// Spawns the driver task immediately; the transport dials in the
    /// background while callers are free to submit frames.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn open<T: Transport>(transport: T, broadcast_capacity: usize) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (open_tx, _) = watch::channel(false);

        let inner = Arc::new(ConnectionInner {
            next_request_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            services: ServiceRegistry::new(),
            broadcasts: BroadcastBus::new(broadcast_capacity),
            open_tx,
            outbound: outbound_tx,
        });

        tokio::spawn(drive(transport, Arc::clone(&inner), outbound_rx));

        Self { inner }
    }

    /// Sends a fire-and-forget frame.
    ///
    /// Queued while the transport is connecting, sent directly once
    /// open. The queue is unbounded: if the transport never opens, the
    /// frames wait forever.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized or the
    /// driver has shut down.
    pub fn send<T: Serialize>(&self, payload: &T) -> Result<(), LinkError> {
        let frame = serde_json::to_string(payload)?;
        self.send_raw(frame)
    }

    /// Sends a correlated request and waits for its response.
    ///
    /// Allocates a fresh correlation id, records the pending entry, and
    /// routes the frame through the same ready-or-queue path as
    /// [`Connection::send`]. The future resolves with the payload of the
    /// response carrying the matching id, exactly once; responses with
    /// unknown ids never resolve it.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized or the
    /// driver shuts down before a response arrives.
    pub async fn request<T: Serialize>(&self, payload: &T) -> Result<Value, LinkError> {
        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_string(&OutboundRequest {
            request_id,
            request: payload,
        })?;

        let (waiter_tx, waiter_rx) = oneshot::channel();
        if let Ok(mut pending) = self.inner.pending.lock() {
            pending.insert(request_id, waiter_tx);
        }

        if let Err(e) = self.send_raw(frame) {
            if let Ok(mut pending) = self.inner.pending.lock() {
                pending.remove(&request_id);
            }
            return Err(e);
        }

        waiter_rx.await.map_err(|_| LinkError::ConnectionClosed)
    }

    /// Registers a named service handler for uncorrelated pushes.
    ///
    /// Last registration wins: a second handler under the same name
    /// replaces the first, it does not stack.
    pub fn register_service<F>(&self, name: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.inner.services.register(name, handler);
    }

    /// Subscribes to broadcast frames (correlation id 0).
    ///
    /// Every subscriber receives every broadcast payload, uninterpreted.
    /// Dropping the receiver removes exactly that one subscription.
    #[must_use]
    pub fn broadcasts(&self) -> broadcast::Receiver<Value> {
        self.inner.broadcasts.subscribe()
    }

    /// Completes once the connection is open; immediately if it already
    /// is. Suspends indefinitely while the transport never opens.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection state can no longer be
    /// observed.
    pub async fn ready(&self) -> Result<(), LinkError> {
        let mut open_rx = self.inner.open_tx.subscribe();
        open_rx
            .wait_for(|open| *open)
            .await
            .map(|_| ())
            .map_err(|_| LinkError::ConnectionClosed)
    }

    /// Returns `true` once the open transition has fired.
    #[must_use]
    pub fn is_open(&self) -> bool {
        *self.inner.open_tx.borrow()
    }

    fn send_raw(&self, frame: String) -> Result<(), LinkError> {
        self.inner
            .outbound
            .send(frame)
            .map_err(|_| LinkError::ConnectionClosed)
    }
}

impl ConnectionInner {
    /// Routes one decoded inbound frame: broadcast fan-out, pending
    /// resolution, service push, or discard. Never fatal.
    fn dispatch(&self, text: &str) {
        match messages::decode(text) {
            InboundFrame::Broadcast(payload) => {
                let receivers = self.broadcasts.publish(payload);
                tracing::trace!(receivers, "broadcast frame fanned out");
            }
            InboundFrame::Correlated {
                request_id,
                service,
                payload,
            } => {
                let waiter = match self.pending.lock() {
                    Ok(mut pending) => pending.remove(&request_id),
                    Err(_) => None,
                };
                if let Some(waiter) = waiter {
                    // The requester may have dropped its future; a
                    // response nobody awaits is not an error.
                    let _ = waiter.send(payload);
                } else if let Some(name) = service {
                    if !self.services.dispatch(&name, payload) {
                        tracing::debug!(
                            service = %name,
                            request_id,
                            "push for unregistered service discarded"
                        );
                    }
                } else {
                    tracing::debug!(request_id, "frame with unknown correlation id discarded");
                }
            }
            InboundFrame::Malformed => {
                tracing::debug!("malformed frame discarded");
            }
        }
    }

    /// Drops all pending waiters so their requesters observe
    /// [`LinkError::ConnectionClosed`] instead of hanging on a response
    /// that can no longer arrive.
    fn fail_pending(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.clear();
        }
    }
}

/// Runs the connect/flush/dispatch loop for one connection.
async fn drive<T: Transport>(
    mut transport: T,
    inner: Arc<ConnectionInner>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    // Connecting phase: buffer outbound frames until the handshake
    // completes. The mpsc channel preserves submission order, so the
    // buffer is FIFO across the open transition as well.
    let mut queue: Vec<String> = Vec::new();
    {
        let ready = transport.ready();
        tokio::pin!(ready);
        loop {
            tokio::select! {
                result = &mut ready => {
                    match result {
                        Ok(()) => break,
                        Err(e) => {
                            tracing::error!(error = %e, "transport failed to open");
                            inner.fail_pending();
                            return;
                        }
                    }
                }
                frame = outbound.recv() => match frame {
                    Some(frame) => queue.push(frame),
                    // Every handle dropped before the transport opened.
                    None => return,
                },
            }
        }
    }

    // Open transition, fired exactly once: flush the queue in FIFO
    // order, then mark open. No further queueing after this point.
    if !queue.is_empty() {
        tracing::debug!(frames = queue.len(), "flushing readiness queue");
    }
    for frame in queue.drain(..) {
        if let Err(e) = transport.send(frame).await {
            tracing::error!(error = %e, "flush failed");
            inner.fail_pending();
            return;
        }
    }
    inner.open_tx.send_replace(true);

    // Open phase: forward outbound frames directly and dispatch inbound
    // frames strictly in transport delivery order.
    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = transport.send(frame).await {
                        tracing::error!(error = %e, "send failed");
                        break;
                    }
                }
                None => break,
            },
            message = transport.recv() => match message {
                Some(text) => inner.dispatch(&text),
                None => {
                    tracing::debug!("transport closed");
                    break;
                }
            },
        }
    }

    inner.fail_pending();
}

#[cfg(test)]
#[allow(clippy::panic, clippy::unwrap_used)]
mod tests {
    use serde_json::json;
    use tokio::task::yield_now;

    use super::*;
    use crate::link::transport::testing::mock_pair;

    /// Lets the driver task run far enough to process everything
    /// currently queued.
    async fn settle() {
        for _ in 0..20 {
            yield_now().await;
        }
    }

    #[tokio::test]
    async fn frames_queue_until_open_then_flush_in_order() {
        let (transport, mut remote) = mock_pair();
        let connection = Connection::open(transport, 16);

        connection.send(&json!({"op": "first"})).unwrap();
        connection.send(&json!({"op": "second"})).unwrap();
        connection.send(&json!({"op": "third"})).unwrap();
        settle().await;

        // Nothing reaches the transport before the open transition.
        assert!(remote.sent.try_recv().is_err());
        assert!(!connection.is_open());

        remote.open();
        settle().await;

        assert_eq!(remote.sent.recv().await.unwrap(), r#"{"op":"first"}"#);
        assert_eq!(remote.sent.recv().await.unwrap(), r#"{"op":"second"}"#);
        assert_eq!(remote.sent.recv().await.unwrap(), r#"{"op":"third"}"#);
        assert!(remote.sent.try_recv().is_err());
    }

    #[tokio::test]
    async fn sends_after_open_go_directly_to_the_transport() {
        let (transport, mut remote) = mock_pair();
        let connection = Connection::open(transport, 16);
        remote.open();
        connection.ready().await.unwrap();

        connection.send(&json!({"op": "live"})).unwrap();
        assert_eq!(remote.sent.recv().await.unwrap(), r#"{"op":"live"}"#);
    }

    #[tokio::test]
    async fn request_resolves_with_matching_response() {
        let (transport, mut remote) = mock_pair();
        let connection = Connection::open(transport, 16);
        remote.open();

        let requester = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.request(&json!({"op": "ping"})).await })
        };

        let frame = remote.sent.recv().await.unwrap();
        assert_eq!(frame, r#"{"request_id":1,"request":{"op":"ping"}}"#);

        remote.push(r#"{"request_id":1,"response":"pong"}"#);
        let response = requester.await.unwrap().unwrap();
        assert_eq!(response, json!("pong"));
    }

    #[tokio::test]
    async fn request_while_connecting_is_first_frame_flushed() {
        let (transport, mut remote) = mock_pair();
        let connection = Connection::open(transport, 16);

        let requester = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.request(&json!({"op": "ping"})).await })
        };
        settle().await;
        assert!(remote.sent.try_recv().is_err());

        remote.open();
        let first = remote.sent.recv().await.unwrap();
        assert_eq!(first, r#"{"request_id":1,"request":{"op":"ping"}}"#);

        remote.push(r#"{"request_id":1,"response":"pong"}"#);
        assert_eq!(requester.await.unwrap().unwrap(), json!("pong"));
    }

    #[tokio::test]
    async fn concurrent_requests_get_distinct_ids_and_do_not_cross() {
        let (transport, mut remote) = mock_pair();
        let connection = Connection::open(transport, 16);
        remote.open();

        let first = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.request(&json!({"op": "a"})).await })
        };
        let second = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.request(&json!({"op": "b"})).await })
        };

        let sent_one = remote.sent.recv().await.unwrap();
        let sent_two = remote.sent.recv().await.unwrap();
        let id_of = |frame: &str| {
            serde_json::from_str::<Value>(frame)
                .unwrap()
                .get("request_id")
                .and_then(Value::as_u64)
                .unwrap()
        };
        let (id_one, id_two) = (id_of(&sent_one), id_of(&sent_two));
        assert_ne!(id_one, id_two);

        // Respond out of submission order; each future must resolve
        // with its own payload.
        remote.push(&format!(r#"{{"request_id":{id_two},"response":"beta"}}"#));
        remote.push(&format!(r#"{{"request_id":{id_one},"response":"alpha"}}"#));

        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();
        if sent_one.contains(r#""op":"a""#) {
            assert_eq!(first, json!("alpha"));
            assert_eq!(second, json!("beta"));
        } else {
            assert_eq!(first, json!("beta"));
            assert_eq!(second, json!("alpha"));
        }
    }

    #[tokio::test]
    async fn response_with_unknown_id_is_dropped() {
        let (transport, mut remote) = mock_pair();
        let connection = Connection::open(transport, 16);
        remote.open();
        connection.ready().await.unwrap();

        remote.push(r#"{"request_id":99,"response":"stray"}"#);
        settle().await;

        // The connection stays fully functional afterwards.
        let requester = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.request(&json!({"op": "ping"})).await })
        };
        let _ = remote.sent.recv().await.unwrap();
        remote.push(r#"{"request_id":1,"response":"pong"}"#);
        assert_eq!(requester.await.unwrap().unwrap(), json!("pong"));
    }

    #[tokio::test]
    async fn mismatched_id_never_resolves_the_future() {
        let (transport, mut remote) = mock_pair();
        let connection = Connection::open(transport, 16);
        remote.open();

        let requester = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.request(&json!({"op": "ping"})).await })
        };
        let _ = remote.sent.recv().await.unwrap();

        remote.push(r#"{"request_id":2,"response":"not yours"}"#);
        settle().await;
        assert!(!requester.is_finished());

        remote.push(r#"{"request_id":1,"response":"yours"}"#);
        assert_eq!(requester.await.unwrap().unwrap(), json!("yours"));
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber_and_skips_pending() {
        let (transport, mut remote) = mock_pair();
        let connection = Connection::open(transport, 16);
        remote.open();
        connection.ready().await.unwrap();

        let mut rx1 = connection.broadcasts();
        let mut rx2 = connection.broadcasts();

        let requester = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.request(&json!({"op": "slow"})).await })
        };
        let _ = remote.sent.recv().await.unwrap();

        remote.push(r#"{"request_id":0,"response":[1,2,3]}"#);

        assert_eq!(rx1.recv().await.unwrap(), json!([1, 2, 3]));
        assert_eq!(rx2.recv().await.unwrap(), json!([1, 2, 3]));
        // The broadcast did not touch the pending table.
        assert!(!requester.is_finished());
        remote.push(r#"{"request_id":1,"response":"done"}"#);
        assert_eq!(requester.await.unwrap().unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn bare_channels_frame_is_treated_as_broadcast() {
        let (transport, mut remote) = mock_pair();
        let connection = Connection::open(transport, 16);
        remote.open();
        connection.ready().await.unwrap();

        let mut rx = connection.broadcasts();
        remote.push(r#"{"channels":[255,0,128]}"#);
        assert_eq!(rx.recv().await.unwrap(), json!([255, 0, 128]));
    }

    #[tokio::test]
    async fn service_push_invokes_registered_handler() {
        let (transport, mut remote) = mock_pair();
        let connection = Connection::open(transport, 16);
        remote.open();
        connection.ready().await.unwrap();

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        connection.register_service("patch", move |payload| {
            let _ = seen_tx.send(payload);
        });

        remote.push(r#"{"request_id":7,"service":"patch","response":{"fixture":12}}"#);
        assert_eq!(seen_rx.recv().await.unwrap(), json!({"fixture": 12}));
    }

    #[tokio::test]
    async fn pending_entry_takes_precedence_over_service_handler() {
        let (transport, mut remote) = mock_pair();
        let connection = Connection::open(transport, 16);
        remote.open();

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        connection.register_service("patch", move |payload| {
            let _ = seen_tx.send(payload);
        });

        let requester = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.request(&json!({"op": "patch"})).await })
        };
        let _ = remote.sent.recv().await.unwrap();

        // Response names a service, but the pending entry wins.
        remote.push(r#"{"request_id":1,"service":"patch","response":"resolved"}"#);
        assert_eq!(requester.await.unwrap().unwrap(), json!("resolved"));
        settle().await;
        assert!(seen_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn malformed_frames_are_ignored() {
        let (transport, mut remote) = mock_pair();
        let connection = Connection::open(transport, 16);
        remote.open();
        connection.ready().await.unwrap();

        remote.push("not json at all");
        remote.push(r#"{"response":"no id"}"#);
        settle().await;

        connection.send(&json!({"op": "still alive"})).unwrap();
        assert_eq!(
            remote.sent.recv().await.unwrap(),
            r#"{"op":"still alive"}"#
        );
    }

    #[tokio::test]
    async fn ready_completes_immediately_once_open() {
        let (transport, mut remote) = mock_pair();
        let connection = Connection::open(transport, 16);

        let waiter = {
            let connection = connection.clone();
            tokio::spawn(async move { connection.ready().await })
        };
        settle().await;
        assert!(!waiter.is_finished());

        remote.open();
        waiter.await.unwrap().unwrap();

        // Already open: completes without suspending on the transition.
        connection.ready().await.unwrap();
        assert!(connection.is_open());
    }
}
