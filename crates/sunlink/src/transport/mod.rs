//! Byte transports to the DAW bridge
//!
//! Two implementations behind one [`Transport`] trait:
//!
//! - [`StreamTransport`]: TCP, every message framed as
//!   `[u32 BE length][payload]` (see [`framing`](crate::framing))
//! - [`DatagramTransport`]: UDP, one datagram per message
//!
//! Both share the connection lifecycle:
//!
//! ```text
//! Disconnected -> Connecting -> Connected
//!                      |            |  loss / send failure / protocol error
//!                      v            v
//!                    Error  <-----Error -> Reconnecting -> Connected
//!               (initial failure         (backoff, retried until
//!                is not retried)          disconnect())
//! ```
//!
//! Each transition fires the state callback exactly once, in order, with no
//! transport lock held. Callbacks run on the transport's own threads (or on
//! the thread calling `connect`/`send`/`disconnect`) and must not block for
//! long. Calling `disconnect()` from inside a callback is tolerated but cannot
//! wait for the calling thread itself. A callback must not block on a thread
//! that is inside `disconnect()` on the same transport.

mod config;
mod datagram;
mod link;
mod stream;

pub use config::{TransportConfig, TransportKind};
pub use datagram::{DatagramTransport, MAX_DATAGRAM_LEN};
pub use stream::StreamTransport;

use std::fmt;
use std::time::Duration;

use crate::error::TransportError;

/// Receive loops wake at least this often to check for shutdown.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Called with every complete received message.
pub type MessageCallback = Box<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Called with the new state and a human-readable reason.
pub type StateCallback = Box<dyn Fn(TransportState, &str) + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TransportState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Reconnecting = 3,
    Error = 4,
}

impl TransportState {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Disconnected),
            1 => Some(Self::Connecting),
            2 => Some(Self::Connected),
            3 => Some(Self::Reconnecting),
            4 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bidirectional message link.
///
/// All methods take `&self` so a transport can be shared behind an `Arc`
/// between the thread that sends and the code that owns the connection.
pub trait Transport: Send + Sync {
    /// Open the link. An initial failure is reported (here and via the state
    /// callback) but not retried.
    fn connect(&self) -> Result<(), TransportError>;

    /// Stop all threads and close the socket. When this returns no callback
    /// will fire again, and a state callback another thread was running has
    /// finished.
    fn disconnect(&self);

    /// Send one message. `false` if not connected, too large, or the write
    /// failed (which also moves the transport to `Error` and triggers a
    /// reconnect).
    fn send(&self, bytes: &[u8]) -> bool;

    fn set_message_callback(&self, callback: MessageCallback);

    fn set_state_callback(&self, callback: StateCallback);

    fn state(&self) -> TransportState;

    fn is_connected(&self) -> bool {
        self.state() == TransportState::Connected
    }
}

/// Either transport, picked at runtime from configuration without dynamic
/// dispatch on the send/receive path.
pub enum AnyTransport {
    Stream(StreamTransport),
    Datagram(DatagramTransport),
}

impl AnyTransport {
    pub fn new(kind: TransportKind, config: TransportConfig) -> Self {
        match kind {
            TransportKind::Stream => AnyTransport::Stream(StreamTransport::new(config)),
            TransportKind::Datagram => AnyTransport::Datagram(DatagramTransport::new(config)),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            AnyTransport::Stream(_) => TransportKind::Stream,
            AnyTransport::Datagram(_) => TransportKind::Datagram,
        }
    }
}

impl Transport for AnyTransport {
    fn connect(&self) -> Result<(), TransportError> {
        match self {
            AnyTransport::Stream(t) => t.connect(),
            AnyTransport::Datagram(t) => t.connect(),
        }
    }

    fn disconnect(&self) {
        match self {
            AnyTransport::Stream(t) => t.disconnect(),
            AnyTransport::Datagram(t) => t.disconnect(),
        }
    }

    #[inline]
    fn send(&self, bytes: &[u8]) -> bool {
        match self {
            AnyTransport::Stream(t) => t.send(bytes),
            AnyTransport::Datagram(t) => t.send(bytes),
        }
    }

    fn set_message_callback(&self, callback: MessageCallback) {
        match self {
            AnyTransport::Stream(t) => t.set_message_callback(callback),
            AnyTransport::Datagram(t) => t.set_message_callback(callback),
        }
    }

    fn set_state_callback(&self, callback: StateCallback) {
        match self {
            AnyTransport::Stream(t) => t.set_state_callback(callback),
            AnyTransport::Datagram(t) => t.set_state_callback(callback),
        }
    }

    fn state(&self) -> TransportState {
        match self {
            AnyTransport::Stream(t) => t.state(),
            AnyTransport::Datagram(t) => t.state(),
        }
    }
}
