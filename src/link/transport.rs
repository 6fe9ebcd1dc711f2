//! Transport capability: the seam between the connection driver and the
//! actual socket.
//!
//! The driver only needs three things from a transport: a readiness
//! signal, text-frame send, and text-frame receive. [`WsTransport`] is
//! the production implementation over `tokio-tungstenite`; tests inject
//! scriptable in-memory transports through the same trait.

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::LinkError;

/// Minimal transport capability consumed by the connection driver.
///
/// Implementations must deliver frames in order; the driver relies on
/// that for its FIFO flush guarantee.
pub trait Transport: Send + 'static {
    /// Completes when the underlying socket is open. Called once by the
    /// driver before any frame is written.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be established.
    fn ready(&mut self) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket rejects the write.
    fn send(&mut self, frame: String) -> impl Future<Output = Result<(), LinkError>> + Send;

    /// Receives the next text frame, or `None` once the socket closes.
    fn recv(&mut self) -> impl Future<Output = Option<String>> + Send;
}

/// Production WebSocket transport.
///
/// Construction is infallible and performs no I/O; the socket is dialed
/// lazily on the first [`Transport::ready`] call so that frames submitted
/// before the handshake completes are observably queued by the driver.
#[derive(Debug)]
pub struct WsTransport {
    url: String,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
}

impl WsTransport {
    /// Creates a transport that will dial the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream: None,
        }
    }
}

impl Transport for WsTransport {
    async fn ready(&mut self) -> Result<(), LinkError> {
        if self.stream.is_none() {
            let (stream, _) = connect_async(self.url.as_str()).await?;
            tracing::debug!(url = %self.url, "websocket handshake complete");
            self.stream = Some(stream);
        }
        Ok(())
    }

    async fn send(&mut self, frame: String) -> Result<(), LinkError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(LinkError::ConnectionClosed);
        };
        stream.send(Message::text(frame)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<String> {
        let stream = self.stream.as_mut()?;
        loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(text.to_string()),
                Some(Ok(Message::Close(_))) | None => return None,
                // Ping/pong is handled by tungstenite; binary frames are
                // not part of the protocol.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "websocket read error");
                    return None;
                }
            }
        }
    }
}
