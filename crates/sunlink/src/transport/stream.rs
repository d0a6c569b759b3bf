//! Length-framed TCP transport.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;

use tracing::warn;

use super::link::{Channel, Link, Poll};
use super::{MessageCallback, StateCallback, Transport, TransportConfig, TransportState, POLL_INTERVAL};
use crate::error::TransportError;
use crate::framing::{self, FrameDecoder, FrameError, MAX_FRAME_LEN};

/// Reliable transport over TCP. Each message travels as one
/// `[u32 BE length][payload]` frame; frames over 1 MiB are a protocol error
/// that drops the connection and starts a reconnect.
pub struct StreamTransport {
    link: Arc<Link<StreamChannel>>,
}

impl StreamTransport {
    pub fn new(config: TransportConfig) -> Self {
        Self {
            link: Link::new(config),
        }
    }

    pub fn config(&self) -> &TransportConfig {
        self.link.config()
    }
}

impl Transport for StreamTransport {
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

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.link.disconnect();
    }
}

pub(crate) struct StreamChannel;

pub(crate) struct StreamReader {
    stream: TcpStream,
    decoder: FrameDecoder,
}

impl Channel for StreamChannel {
    type Writer = TcpStream;
    type Reader = StreamReader;

    const NAME: &'static str = "stream";

    fn max_payload() -> usize {
        MAX_FRAME_LEN
    }

    fn port(config: &TransportConfig) -> u16 {
        config.stream_port()
    }

    fn open(
        config: &TransportConfig,
        addr: SocketAddr,
    ) -> Result<(TcpStream, StreamReader), TransportError> {
        let stream = TcpStream::connect_timeout(&addr, config.connect_timeout())
            .map_err(|source| TransportError::Connect { addr, source })?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(POLL_INTERVAL))?;
        // bounds how long send() can hold the write lock on a stalled peer
        stream.set_write_timeout(Some(config.connect_timeout()))?;
        let reader = StreamReader {
            stream: stream.try_clone()?,
            decoder: FrameDecoder::new(),
        };
        Ok((stream, reader))
    }

    fn write(writer: &mut TcpStream, bytes: &[u8]) -> io::Result<()> {
        let header = framing::encode_header(bytes.len())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        writer.write_all(&header)?;
        writer.write_all(bytes)?;
        writer.flush()
    }

    fn close(writer: &TcpStream) {
        // also unblocks the cloned read half
        let _ = writer.shutdown(Shutdown::Both);
    }

    fn poll(reader: &mut StreamReader) -> Poll<'_> {
        let StreamReader { stream, decoder } = reader;
        match decoder.read_frame(stream) {
            Ok(Some(frame)) => Poll::Message(frame),
            Ok(None) => Poll::Idle,
            Err(e @ FrameError::Oversized { .. }) => {
                warn!("Dropping stream connection: {}", e);
                Poll::Lost(e.to_string())
            }
            Err(e) => Poll::Lost(e.to_string()),
        }
    }
}
