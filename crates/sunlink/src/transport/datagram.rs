//! Connectionless UDP transport.

use std::io::{self, ErrorKind};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::Arc;

use tracing::debug;

use super::link::{Channel, Link, Poll};
use super::{MessageCallback, StateCallback, Transport, TransportConfig, TransportState, POLL_INTERVAL};
use crate::error::TransportError;

/// Largest payload that fits in one UDP/IPv4 datagram.
pub const MAX_DATAGRAM_LEN: usize = 65_507;

/// One datagram is one message, no framing. `connect()` binds a local socket
/// and fixes the peer address so `send()` needs no destination.
///
/// Until the peer is listening the OS may report ICMP port-unreachable as
/// `ConnectionRefused`; that is logged and ignored rather than treated as a
/// lost connection.
pub struct DatagramTransport {
    link: Arc<Link<DatagramChannel>>,
}

impl DatagramTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            link: Link::new(config),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        self.link.config()
    }
}

impl Transport for DatagramTransport {
    fn connect(&self) -> Result<(), TransportError> {
        self.link.connect()
    }

    fn disconnect(&self) {
        self.link.disconnect()
    }

    fn send(&self, bytes: &[u8]) -> bool {
        self.link.send(bytes)
    }

    fn set_message_callback(&self, callback: MessageCallback) {
        self.link.set_message_callback(callback)
    }

    fn set_state_callback(&self, callback: StateCallback) {
        self.link.set_state_callback(callback)
    }

    fn state(&self) -> TransportState {
        self.link.state()
    }
}

impl Drop for DatagramTransport {
    fn drop(&mut self) {
        self.link.disconnect();
    }
}

pub(crate) struct DatagramChannel;

pub(crate) struct DatagramReader {
    socket: UdpSocket,
    buf: Box<[u8]>,
}

impl Channel for DatagramChannel {
    type Writer = UdpSocket;
    type Reader = DatagramReader;

    const NAME: &'static str = "datagram";

    fn max_payload() -> usize {
        MAX_DATAGRAM_LEN
    }

    fn port(config: &TransportConfig) -> u16 {
        config.datagram_port()
    }

    fn open(
        config: &TransportConfig,
        addr: SocketAddr,
    ) -> Result<(UdpSocket, DatagramReader), TransportError> {
        let local: SocketAddr = match addr {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, config.datagram_bind_port()).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, config.datagram_bind_port()).into(),
        };
        let socket = UdpSocket::bind(local).map_err(TransportError::Bind)?;
        socket
            .connect(addr)
            .map_err(|source| TransportError::Connect { addr, source })?;
        socket.set_read_timeout(Some(POLL_INTERVAL))?;
        if let Ok(bound) = socket.local_addr() {
            debug!("Datagram socket bound to {} for peer {}", bound, addr);
        }
        let reader = DatagramReader {
            socket: socket.try_clone()?,
            buf: vec![0u8; 64 * 1024].into_boxed_slice(),
        };
        Ok((socket, reader))
    }

    fn write(writer: &mut UdpSocket, bytes: &[u8]) -> io::Result<()> {
        let sent = writer.send(bytes)?;
        if sent != bytes.len() {
            return Err(io::Error::new(
                ErrorKind::WriteZero,
                format!("datagram truncated: {} of {} bytes sent", sent, bytes.len()),
            ));
        }
        Ok(())
    }

    fn close(_writer: &UdpSocket) {
        // nothing to shut down; the reader wakes on its poll interval
    }

    fn poll(reader: &mut DatagramReader) -> Poll<'_> {
        match reader.socket.recv(&mut reader.buf) {
            Ok(n) => Poll::Message(&reader.buf[..n]),
            Err(e) => match e.kind() {
                ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted => Poll::Idle,
                ErrorKind::ConnectionRefused => {
                    debug!("Datagram peer not listening yet");
                    Poll::Idle
                }
                _ => Poll::Lost(e.to_string()),
            },
        }
    }

    fn is_fatal_send_error(err: &io::Error) -> bool {
        err.kind() != ErrorKind::ConnectionRefused
    }
}
