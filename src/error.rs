//! Link error types.
//!
//! [`LinkError`] is the central error type for the crate. Frame-level
//! conditions (malformed frames, unknown correlation ids, unknown
//! services) are not errors: the dispatch loop discards them and logs at
//! `debug`. `LinkError` covers only the failures surfaced to callers.

/// Client-side error enum.
///
/// None of these variants are fatal to the process; a failed request
/// simply returns the error to its caller. The connection itself has no
/// failure/retry state machine (reconnection is out of scope).
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// A payload could not be serialized to a JSON text frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The underlying WebSocket transport reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// The connection driver has shut down; no further frames can be
    /// sent and no pending response will ever arrive.
    #[error("connection closed")]
    ConnectionClosed,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn serialization_errors_convert() {
        let result = serde_json::from_str::<u32>("not json");
        let Err(json_err) = result else {
            panic!("expected parse failure");
        };
        let err: LinkError = json_err.into();
        assert!(err.to_string().starts_with("serialization error"));
    }

    #[test]
    fn connection_closed_display() {
        assert_eq!(LinkError::ConnectionClosed.to_string(), "connection closed");
    }
}
