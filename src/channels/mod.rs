//! Channel domain: broadcast fan-out, the fixed-size snapshot, and the
//! reactive latest-snapshot store consumed by presentation code.

pub mod bus;
pub mod snapshot;
pub mod state;

pub use bus::BroadcastBus;
pub use snapshot::{CHANNEL_COUNT, ChannelSnapshot};
pub use state::ChannelState;
