//! dmx-monitor entry point.
//!
//! Connects to the visualizer server, subscribes to the live channel
//! state, and logs a summary of every snapshot update.

use tracing_subscriber::EnvFilter;

use dmx_link::channels::ChannelState;
use dmx_link::config::LinkConfig;
use dmx_link::context::LinkContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = LinkConfig::from_env();
    tracing::info!(url = %config.url(), "starting dmx-monitor");

    // Open the connection through the owning context
    let context = LinkContext::new(config);
    let connection = context.connection().clone();
    connection.ready().await?;
    tracing::info!("connection open");

    // Follow the live channel state
    let state = ChannelState::new(connection);
    let mut levels = state.subscribe();
    loop {
        levels.changed().await?;
        let snapshot = levels.borrow_and_update().clone();
        tracing::info!(
            active = snapshot.active_count(),
            peak = snapshot.peak(),
            "channels updated"
        );
    }
}
