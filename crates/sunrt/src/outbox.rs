//! OSC messages from the audio thread
//!
//! The audio callback encodes straight into a fixed-size [`OscPacket`] on
//! its stack and pushes it by value into a ring. A control thread drains the
//! [`OutboxReceiver`] and hands the bytes to a transport.

use std::fmt;

use sunproto::osc::{OscArg, OscError, OscWriter};

use crate::ring::{Consumer, Producer, RingBuffer};

/// Packet size that fits every address in the bridge address space plus a
/// handful of arguments.
pub const DEFAULT_PACKET_SIZE: usize = 256;

/// Default number of packets the outbox can hold.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OutboxError {
    #[error("Encode failed: {0}")]
    Encode(#[from] OscError),

    #[error("Outbox full")]
    Full,
}

/// One encoded OSC message in inline storage.
#[derive(Clone, Copy)]
pub struct OscPacket<const P: usize = DEFAULT_PACKET_SIZE> {
    bytes: [u8; P],
    len: usize,
}

impl<const P: usize> OscPacket<P> {
    /// Encode a message. Fails if it does not fit in `P` bytes.
    pub fn encode(address: &str, args: &[OscArg<'_>]) -> Result<Self, OscError> {
        let mut packet = Self {
            bytes: [0; P],
            len: 0,
        };
        let mut w = OscWriter::new(&mut packet.bytes);
        w.begin(address);
        for &arg in args {
            w.add(arg);
        }
        w.end();
        if let Some(e) = w.error() {
            return Err(e);
        }
        packet.len = w.len();
        Ok(packet)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const P: usize> fmt::Debug for OscPacket<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OscPacket").field("len", &self.len).finish()
    }
}

/// Audio-thread side of the outbox.
pub struct OscOutbox<const P: usize = DEFAULT_PACKET_SIZE, const N: usize = DEFAULT_OUTBOX_CAPACITY>
{
    tx: Producer<OscPacket<P>, N>,
    dropped: u64,
}

impl<const P: usize, const N: usize> OscOutbox<P, N> {
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Self, OutboxReceiver<P, N>) {
        let (tx, rx) = RingBuffer::<OscPacket<P>, N>::new();
        (Self { tx, dropped: 0 }, OutboxReceiver { rx })
    }

    /// Encode and enqueue. A full outbox counts the message as dropped.
    pub fn send(&mut self, address: &str, args: &[OscArg<'_>]) -> Result<(), OutboxError> {
        let packet = OscPacket::encode(address, args)?;
        self.push(packet)
    }

    pub fn push(&mut self, packet: OscPacket<P>) -> Result<(), OutboxError> {
        match self.tx.try_push(packet) {
            Ok(()) => Ok(()),
            Err(_) => {
                self.dropped += 1;
                Err(OutboxError::Full)
            }
        }
    }

    /// Messages rejected because the outbox was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn pending(&self) -> usize {
        self.tx.size()
    }
}

/// Control-thread side of the outbox.
pub struct OutboxReceiver<const P: usize = DEFAULT_PACKET_SIZE, const N: usize = DEFAULT_OUTBOX_CAPACITY>
{
    rx: Consumer<OscPacket<P>, N>,
}

impl<const P: usize, const N: usize> OutboxReceiver<P, N> {
    pub fn try_recv(&mut self) -> Option<OscPacket<P>> {
        self.rx.try_pop()
    }

    pub fn pending(&self) -> usize {
        self.rx.size()
    }

    /// True once the audio side has dropped its [`OscOutbox`].
    pub fn is_closed(&self) -> bool {
        self.rx.is_abandoned()
    }
}
