//! Owning context for the process-wide connection.
//!
//! The connection is deliberately not a language-level static: the
//! context owns it explicitly and enforces construction idempotency, so
//! consumers get injection and tests get isolation. Cloning a context
//! shares the same connection slot.

use std::sync::{Arc, OnceLock};

use crate::config::LinkConfig;
use crate::link::{Connection, WsTransport};

/// Lazily-initialized owner of the one [`Connection`] per context.
///
/// Every part of the application should receive a clone of the same
/// context; repeated [`LinkContext::connection`] calls return the same
/// instance and only ever open one transport.
#[derive(Debug, Clone)]
pub struct LinkContext {
    config: LinkConfig,
    connection: Arc<OnceLock<Connection>>,
}

impl LinkContext {
    /// Creates a context with the given configuration. No connection is
    /// opened yet.
    #[must_use]
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            connection: Arc::new(OnceLock::new()),
        }
    }

    /// Returns the context configuration.
    #[must_use]
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Returns the context-owned connection, opening the transport on
    /// the first call. Construction is idempotent: later calls (from any
    /// clone of this context) return the existing instance.
    ///
    /// # Panics
    ///
    /// Panics if the first call happens outside a tokio runtime.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        self.connection.get_or_init(|| {
            tracing::info!(url = %self.config.url(), "opening link connection");
            Connection::open(
                WsTransport::new(self.config.url()),
                self.config.broadcast_capacity,
            )
        })
    }
}
