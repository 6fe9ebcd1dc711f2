//! Named service handlers for uncorrelated pushes.
//!
//! A service push is an inbound frame whose correlation id has no
//! pending entry and whose envelope names a registered service. Handlers
//! are invoked synchronously during dispatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use serde_json::Value;

/// Callback invoked with the payload of a service push.
pub type ServiceHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Registry of named service handlers for one connection.
///
/// Registration is last-wins: registering a handler under an existing
/// name replaces the previous one, it does not stack.
#[derive(Default)]
pub struct ServiceRegistry {
    handlers: Mutex<HashMap<String, ServiceHandler>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous handler
    /// with the same name.
    pub fn register<F>(&self, name: &str, handler: F)
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        if let Ok(mut guard) = self.handlers.lock() {
            guard.insert(name.to_string(), Arc::new(handler));
        }
    }

    /// Invokes the handler registered under `name`, if any.
    ///
    /// Returns `true` if a handler was found and invoked. The handler is
    /// called outside the registry lock, so it may itself register
    /// services.
    pub fn dispatch(&self, name: &str, payload: Value) -> bool {
        let handler = match self.handlers.lock() {
            Ok(guard) => guard.get(name).map(Arc::clone),
            Err(_) => None,
        };
        match handler {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }

    /// Returns the number of registered services.
    #[must_use]
    pub fn count(&self) -> usize {
        self.handlers.lock().map_or(0, |guard| guard.len())
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("count", &self.count())
            .finish()
    }
}
