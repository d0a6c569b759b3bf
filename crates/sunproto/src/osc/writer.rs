//! Two-phase OSC writer over a caller-owned buffer.

use super::{align4, padded_str_len, OscArg, OscError, OSC_MAX_ARGS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Open,
    Ended,
}

/// Builds exactly one OSC message into `buf`.
///
/// `add_*` calls only stage arguments; nothing touches the buffer until
/// [`end`](Self::end), which writes address, type tags and data in one pass.
/// The first failure is recorded and every later call becomes a no-op, so
/// callers chain freely and check [`packet`](Self::packet) once:
///
/// ```
/// use sunproto::OscWriter;
///
/// let mut buf = [0u8; 64];
/// let mut w = OscWriter::new(&mut buf);
/// w.begin("/live/song/set/tempo").add_float32(140.0).end();
/// assert_eq!(w.packet().map(<[u8]>::len), Some(32));
/// ```
pub struct OscWriter<'buf, 'a> {
    buf: &'buf mut [u8],
    address: &'a str,
    args: [OscArg<'a>; OSC_MAX_ARGS],
    arg_count: usize,
    pos: usize,
    phase: Phase,
    error: Option<OscError>,
}

impl<'buf, 'a> OscWriter<'buf, 'a> {
    pub fn new(buf: &'buf mut [u8]) -> Self {
        Self {
            buf,
            address: "",
            args: [OscArg::Int32(0); OSC_MAX_ARGS],
            arg_count: 0,
            pos: 0,
            phase: Phase::Fresh,
            error: None,
        }
    }

    /// Start the message. The address must be non-empty and begin with `/`.
    pub fn begin(&mut self, address: &'a str) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        if self.phase != Phase::Fresh {
            return self.fail(OscError::OutOfOrder("begin() called twice"));
        }
        if !address.starts_with('/') {
            return self.fail(OscError::InvalidAddress);
        }
        if address.as_bytes().contains(&0) {
            return self.fail(OscError::InteriorNul);
        }
        self.address = address;
        self.arg_count = 0;
        self.pos = 0;
        self.phase = Phase::Open;
        self
    }

    pub fn add_int32(&mut self, v: i32) -> &mut Self {
        self.add(OscArg::Int32(v))
    }

    pub fn add_float32(&mut self, v: f32) -> &mut Self {
        self.add(OscArg::Float32(v))
    }

    pub fn add_string(&mut self, s: &'a str) -> &mut Self {
        self.add(OscArg::String(s))
    }

    pub fn add_blob(&mut self, data: &'a [u8]) -> &mut Self {
        self.add(OscArg::Blob(data))
    }

    /// Stage any argument.
    pub fn add(&mut self, arg: OscArg<'a>) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        if self.phase != Phase::Open {
            return self.fail(OscError::OutOfOrder("argument added outside begin()/end()"));
        }
        if self.arg_count >= OSC_MAX_ARGS {
            return self.fail(OscError::TooManyArguments);
        }
        match arg {
            OscArg::String(s) if s.as_bytes().contains(&0) => {
                return self.fail(OscError::InteriorNul);
            }
            OscArg::Blob(b) if i32::try_from(b.len()).is_err() => {
                return self.fail(OscError::BlobTooLarge(b.len()));
            }
            _ => {}
        }
        self.args[self.arg_count] = arg;
        self.arg_count += 1;
        self
    }

    /// Serialize the staged message into the buffer.
    pub fn end(&mut self) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        match self.phase {
            Phase::Fresh => return self.fail(OscError::OutOfOrder("end() before begin()")),
            Phase::Ended => return self.fail(OscError::OutOfOrder("end() called twice")),
            Phase::Open => {}
        }

        let needed = super::encoded_len(self.address, &self.args[..self.arg_count]);
        if needed > self.buf.len() {
            return self.fail(OscError::BufferOverflow {
                needed,
                available: self.buf.len(),
            });
        }

        let address = self.address;
        self.put_str(address.as_bytes());
        self.put_tags();
        for i in 0..self.arg_count {
            match self.args[i] {
                OscArg::Int32(v) => self.put_word(v.to_be_bytes()),
                OscArg::Float32(v) => self.put_word(v.to_bits().to_be_bytes()),
                OscArg::String(s) => self.put_str(s.as_bytes()),
                OscArg::Blob(b) => {
                    // length fits, checked in add()
                    self.put_word((b.len() as u32).to_be_bytes());
                    self.put_padded(b, align4(b.len()));
                }
            }
        }
        debug_assert_eq!(self.pos, needed);

        self.phase = Phase::Ended;
        self
    }

    /// The encoded message, once `end()` succeeded.
    pub fn packet(&self) -> Option<&[u8]> {
        match (self.phase, self.error) {
            (Phase::Ended, None) => Some(&self.buf[..self.pos]),
            _ => None,
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// The first error recorded, if any.
    pub fn error(&self) -> Option<OscError> {
        self.error
    }

    /// Bytes written so far: the packet length after `end()`, 0 otherwise.
    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    fn fail(&mut self, e: OscError) -> &mut Self {
        if self.error.is_none() {
            self.error = Some(e);
        }
        self.pos = 0;
        self
    }

    // The put_* helpers run after the total size was checked against the buffer.

    fn put_word(&mut self, word: [u8; 4]) {
        self.buf[self.pos..self.pos + 4].copy_from_slice(&word);
        self.pos += 4;
    }

    fn put_str(&mut self, s: &[u8]) {
        self.put_padded(s, padded_str_len(s.len()));
    }

    fn put_padded(&mut self, data: &[u8], padded: usize) {
        let end = self.pos + padded;
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.buf[self.pos + data.len()..end].fill(0);
        self.pos = end;
    }

    fn put_tags(&mut self) {
        let tag_len = 1 + self.arg_count;
        let end = self.pos + padded_str_len(tag_len);
        self.buf[self.pos] = b',';
        for i in 0..self.arg_count {
            self.buf[self.pos + 1 + i] = self.args[i].tag();
        }
        self.buf[self.pos + tag_len..end].fill(0);
        self.pos = end;
    }
}
