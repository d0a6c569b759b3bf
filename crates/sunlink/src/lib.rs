//! Sunny network link
//!
//! Carries bytes between the control thread and the DAW bridge:
//!
//! - [`transport`]: the [`Transport`] trait with a length-framed stream (TCP)
//!   and a connectionless datagram (UDP) implementation, both with
//!   automatic reconnection and exponential [`backoff`]
//! - [`session`]: connection × playback-mode state with observers
//! - [`dispatch`]: the ordered event queue both use to run callbacks without
//!   holding their locks
//!
//! Everything here runs on control threads. Nothing is RT-safe.

pub mod backoff;
pub mod dispatch;
pub mod error;
pub mod framing;
pub mod session;
pub mod transport;

mod sync;

pub use backoff::Backoff;
pub use error::TransportError;
pub use session::{ConnectionState, SessionMode, SessionState, SessionStateChange, SessionStateMachine};
pub use transport::{
    AnyTransport, DatagramTransport, MessageCallback, StateCallback, StreamTransport, Transport,
    TransportConfig, TransportKind, TransportState,
};
