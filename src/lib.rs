//! # dmx-link
//!
//! Client-side WebSocket connection manager and live channel store for
//! DMX visualizer frontends.
//!
//! One persistent socket carries three kinds of traffic: correlated
//! request/response calls, unsolicited service pushes, and a broadcast
//! channel with live channel levels. The connection manager hides
//! readiness and correlation bookkeeping; the channel store exposes the
//! latest broadcast snapshot reactively.
//!
//! ## Architecture
//!
//! ```text
//! Application code
//!     │
//!     ├── LinkContext (context) ── owns the one Connection
//!     ├── Connection (link/) ───── correlation, queueing, dispatch
//!     │       │
//!     │       └── Transport (link/transport) ── tokio-tungstenite
//!     │
//!     ├── BroadcastBus (channels/) ── broadcast fan-out
//!     └── ChannelState (channels/) ── reactive 512-level snapshot
//! ```

pub mod channels;
pub mod config;
pub mod context;
pub mod error;
pub mod link;
