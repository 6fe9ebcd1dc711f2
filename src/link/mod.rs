//! Connection layer: transport seam, wire messages, correlation, and
//! dispatch.
//!
//! One driver task per connection owns the socket and routes every
//! inbound frame to the matching pending request, a named service
//! handler, or the broadcast bus.

pub mod connection;
pub mod messages;
pub mod services;
pub mod transport;

pub use connection::Connection;
pub use services::ServiceRegistry;
pub use transport::{Transport, WsTransport};
