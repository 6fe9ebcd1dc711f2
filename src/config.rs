//! Link configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). The defaults match the deployed
//! visualizer server: plain `ws` on port 8080 at `/ws`.

/// Top-level link configuration.
///
/// Loaded once at startup via [`LinkConfig::from_env`].
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// WebSocket scheme, `ws` or `wss`.
    pub scheme: String,

    /// Server hostname. A `host:port` value is stripped to the bare
    /// hostname; an empty value falls back to `localhost`.
    pub host: String,

    /// Server port.
    pub port: u16,

    /// WebSocket endpoint path, including the leading slash.
    pub path: String,

    /// Capacity of the broadcast fan-out channel.
    pub broadcast_capacity: usize,
}

impl LinkConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let scheme = std::env::var("DMX_WS_SCHEME").unwrap_or_else(|_| "ws".to_string());
        let host = sanitize_host(&std::env::var("DMX_WS_HOST").unwrap_or_default());
        let port = parse_env("DMX_WS_PORT", 8080);
        let path = std::env::var("DMX_WS_PATH").unwrap_or_else(|_| "/ws".to_string());
        let broadcast_capacity = parse_env("DMX_BROADCAST_CAPACITY", 1024);

        Self {
            scheme,
            host,
            port,
            path,
            broadcast_capacity,
        }
    }

    /// Builds the WebSocket URL, e.g. `ws://localhost:8080/ws`.
    #[must_use]
    pub fn url(&self) -> String {
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, self.path)
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            scheme: "ws".to_string(),
            host: "localhost".to_string(),
            port: 8080,
            path: "/ws".to_string(),
            broadcast_capacity: 1024,
        }
    }
}

/// Strips a `:port` suffix from a host value and falls back to
/// `localhost` when the result is empty.
fn sanitize_host(raw: &str) -> String {
    let host = raw.split(':').next().unwrap_or_default();
    if host.is_empty() {
        "localhost".to_string()
    } else {
        host.to_string()
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn default_url_matches_deployment() {
        let config = LinkConfig::default();
        assert_eq!(config.url(), "ws://localhost:8080/ws");
    }

    #[test]
    fn sanitize_host_strips_port() {
        assert_eq!(sanitize_host("example.com:5173"), "example.com");
    }

    #[test]
    fn sanitize_host_plain_hostname_unchanged() {
        assert_eq!(sanitize_host("stage.local"), "stage.local");
    }

    #[test]
    fn sanitize_host_empty_falls_back_to_localhost() {
        assert_eq!(sanitize_host(""), "localhost");
        assert_eq!(sanitize_host(":8080"), "localhost");
    }

    #[test]
    fn secure_scheme_builds_wss_url() {
        let config = LinkConfig {
            scheme: "wss".to_string(),
            host: "venue.example".to_string(),
            ..LinkConfig::default()
        };
        assert_eq!(config.url(), "wss://venue.example:8080/ws");
    }
}
