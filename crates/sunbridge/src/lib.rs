//! Control-side services for the Sunny DAW bridge
//!
//! - [`client`]: request/response over any [`sunlink::Transport`], correlated
//!   by callback id, plus observe notifications
//! - [`router`]: dispatch of incoming OSC messages by address prefix
//! - [`forwarder`]: drains the real-time outbox into a transport
//! - [`telemetry`]: tracing subscriber setup for the binary

pub mod client;
pub mod forwarder;
pub mod router;
pub mod telemetry;

pub use client::{BridgeClient, ClientError, ObserveHandler};
pub use forwarder::{Forwarder, ForwarderStats};
pub use router::{AddressRouter, OscHandler};
