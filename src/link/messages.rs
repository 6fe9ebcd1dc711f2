//! Wire message types: envelopes and the decoded inbound frame.
//!
//! Frames are JSON text. The general protocol is the correlated variant
//! (`request_id` plus `response`/`service`); the degenerate broadcast-only
//! variant (a bare `channels` array) is accepted as an implicit broadcast
//! for backward compatibility with older server builds.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id reserved for broadcast frames.
pub const BROADCAST_ID: u64 = 0;

/// Outbound request envelope.
///
/// Symmetric with the inbound shape: the response to this frame arrives
/// as `{"request_id": <same id>, "response": <payload>}`.
#[derive(Debug, Serialize)]
pub struct OutboundRequest<'a, T> {
    /// Correlation id allocated for this request.
    pub request_id: u64,
    /// Caller-provided request payload.
    pub request: &'a T,
}

/// Raw inbound envelope as it appears on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    /// Correlation id; `0` means broadcast. Absent means the frame is
    /// only valid as the broadcast-only shape.
    pub request_id: Option<u64>,
    /// Response payload for correlated frames.
    #[serde(default)]
    pub response: Value,
    /// Target service for uncorrelated pushes.
    pub service: Option<String>,
    /// Channel levels of the broadcast-only shape.
    pub channels: Option<Value>,
}

/// A decoded inbound frame, classified for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Unsolicited push fanned out to every broadcast subscriber.
    Broadcast(Value),
    /// Frame carrying a positive correlation id: either the response to
    /// a pending request or a service push.
    Correlated {
        /// Correlation id (always non-zero here).
        request_id: u64,
        /// Service name for pushes with no pending entry.
        service: Option<String>,
        /// Response payload.
        payload: Value,
    },
    /// Undecodable frame, or one lacking correlation metadata.
    Malformed,
}

/// Decodes a raw text frame into an [`InboundFrame`].
#[must_use]
pub fn decode(text: &str) -> InboundFrame {
    let Ok(envelope) = serde_json::from_str::<InboundEnvelope>(text) else {
        return InboundFrame::Malformed;
    };

    match (envelope.request_id, envelope.channels) {
        (Some(BROADCAST_ID), _) => InboundFrame::Broadcast(envelope.response),
        (Some(request_id), _) => InboundFrame::Correlated {
            request_id,
            service: envelope.service,
            payload: envelope.response,
        },
        (None, Some(channels)) => InboundFrame::Broadcast(channels),
        (None, None) => InboundFrame::Malformed,
    }
}
