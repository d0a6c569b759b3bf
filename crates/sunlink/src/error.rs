use std::io;
use std::net::SocketAddr;

/// Why `connect()` failed. The same failure is also reported through the
/// state callback as [`TransportState::Error`](crate::TransportState::Error).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to resolve {host}:{port}: {reason}")]
    Resolve {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Connection to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind datagram socket: {0}")]
    Bind(#[source] io::Error),

    #[error("Socket setup failed: {0}")]
    Socket(#[from] io::Error),

    #[error("Transport already connected")]
    AlreadyConnected,

    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}
