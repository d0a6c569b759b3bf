//! OSC 1.0 wire codec
//!
//! Packet layout, all multi-byte values big-endian:
//!
//! ```text
//! address\0 [pad to 4] | ,tags\0 [pad to 4] | arg data...
//!
//! i  int32    4 bytes, two's complement
//! f  float32  4 bytes, IEEE-754 bit pattern
//! s  string   bytes + \0, zero-padded to 4
//! b  blob     int32 length + bytes, zero-padded to 4
//! ```
//!
//! [`OscWriter`] and [`OscReader`] are the real-time half: they work over
//! caller-owned byte slices, never allocate and never panic. Errors are sticky
//! and reported through `has_error()`/`error()` instead of `Result`, so a chain of
//! `add_*` calls can be checked once at the end.
//!
//! [`OscMessage`] is the owned control-thread form built on top of both.

pub mod address;
mod message;
mod reader;
mod writer;

pub use message::{OscMessage, OscValue};
pub use reader::{OscArguments, OscReader};
pub use writer::OscWriter;

/// Maximum number of arguments a writer can stage for one message.
pub const OSC_MAX_ARGS: usize = 64;

/// Codec failures. Every variant is `Copy` so errors can be recorded on the RT thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OscError {
    #[error("Invalid address: must be non-empty and start with '/'")]
    InvalidAddress,

    #[error("String contains an interior NUL byte")]
    InteriorNul,

    #[error("Buffer overflow: need {needed} bytes, {available} available")]
    BufferOverflow { needed: usize, available: usize },

    #[error("Too many arguments (max 64)")]
    TooManyArguments,

    #[error("Blob too large: {0} bytes")]
    BlobTooLarge(usize),

    #[error("Call out of order: {0}")]
    OutOfOrder(&'static str),

    #[error("Packet is empty")]
    EmptyPacket,

    #[error("Packet truncated at offset {0}")]
    Truncated(usize),

    #[error("Packet length {0} is not a multiple of 4")]
    Misaligned(usize),

    #[error("Invalid type tag {0:?}")]
    InvalidTypeTag(char),

    #[error("Type tag string must start with ','")]
    MissingTagComma,

    #[error("Invalid UTF-8 at offset {0}")]
    InvalidUtf8(usize),

    #[error("Negative blob size at offset {0}")]
    NegativeBlobSize(usize),
}

/// One argument, borrowed from the caller (writer) or the packet (reader).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OscArg<'a> {
    Int32(i32),
    Float32(f32),
    String(&'a str),
    Blob(&'a [u8]),
}

impl OscArg<'_> {
    /// The type tag character for this argument.
    pub fn tag(&self) -> u8 {
        match self {
            OscArg::Int32(_) => b'i',
            OscArg::Float32(_) => b'f',
            OscArg::String(_) => b's',
            OscArg::Blob(_) => b'b',
        }
    }

    /// Encoded size of the argument data, padding included.
    pub fn encoded_len(&self) -> usize {
        match self {
            OscArg::Int32(_) | OscArg::Float32(_) => 4,
            OscArg::String(s) => padded_str_len(s.len()),
            OscArg::Blob(b) => 4 + align4(b.len()),
        }
    }
}

/// Round up to the next multiple of four.
#[inline]
pub(crate) const fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Space taken by a string of `len` bytes once NUL-terminated and padded.
#[inline]
pub(crate) const fn padded_str_len(len: usize) -> usize {
    align4(len + 1)
}

/// Encoded size of a whole message with the given address and arguments.
pub fn encoded_len(address: &str, args: &[OscArg<'_>]) -> usize {
    padded_str_len(address.len())
        + padded_str_len(1 + args.len())
        + args.iter().map(OscArg::encoded_len).sum::<usize>()
}
