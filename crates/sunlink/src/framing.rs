//! Length-prefixed framing for the stream transport
//!
//! ```text
//! [u32 big-endian payload length][payload]
//! ```
//!
//! Payloads over [`MAX_FRAME_LEN`] are a protocol error. The decoder checks
//! the header before reading any payload, so a hostile length never causes a
//! large read or allocation.

use std::io::{self, ErrorKind, Read};

pub const HEADER_LEN: usize = 4;

/// 1 MiB.
pub const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Protocol error: frame of {len} bytes exceeds the 1 MiB limit")]
    Oversized { len: usize },

    #[error("Peer closed the connection")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub fn encode_header(len: usize) -> Result<[u8; HEADER_LEN], FrameError> {
    if len > MAX_FRAME_LEN {
        return Err(FrameError::Oversized { len });
    }
    // fits: MAX_FRAME_LEN < u32::MAX
    Ok((len as u32).to_be_bytes())
}

/// Incremental frame reader.
///
/// Works over a socket with a read timeout: a timeout mid-frame keeps the
/// partial header/payload and the next call picks up where it stopped.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    header: [u8; HEADER_LEN],
    header_filled: usize,
    payload: Vec<u8>,
    payload_filled: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read until a whole frame is available (`Some`) or the reader times
    /// out (`None`). The returned slice is valid until the next call.
    pub fn read_frame<R: Read>(&mut self, reader: &mut R) -> Result<Option<&[u8]>, FrameError> {
        while self.header_filled < HEADER_LEN {
            match read_some(reader, &mut self.header[self.header_filled..])? {
                Some(n) => self.header_filled += n,
                None => return Ok(None),
            }
            if self.header_filled == HEADER_LEN {
                let len = u32::from_be_bytes(self.header) as usize;
                if len > MAX_FRAME_LEN {
                    return Err(FrameError::Oversized { len });
                }
                self.payload.clear();
                self.payload.resize(len, 0);
                self.payload_filled = 0;
            }
        }

        while self.payload_filled < self.payload.len() {
            match read_some(reader, &mut self.payload[self.payload_filled..])? {
                Some(n) => self.payload_filled += n,
                None => return Ok(None),
            }
        }

        self.header_filled = 0;
        Ok(Some(&self.payload))
    }

    /// True while a frame has been partly received.
    pub fn in_progress(&self) -> bool {
        self.header_filled > 0
    }
}

/// One read; `None` on timeout, `Closed` on EOF.
fn read_some<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<Option<usize>, FrameError> {
    loop {
        return match reader.read(buf) {
            Ok(0) => Err(FrameError::Closed),
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(FrameError::Io(e)),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io::Cursor;

    /// Reader that hands out scripted chunks and times out between them.
    struct Trickle {
        chunks: VecDeque<Option<Vec<u8>>>,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(Some(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    if n < chunk.len() {
                        self.chunks.push_front(Some(chunk[n..].to_vec()));
                    }
                    Ok(n)
                }
                Some(None) => Err(io::Error::new(ErrorKind::WouldBlock, "timeout")),
                None => Ok(0),
            }
        }
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut out = encode_header(payload.len()).unwrap().to_vec();
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn reads_back_to_back_frames() {
        let mut bytes = frame(b"hello");
        bytes.extend(frame(b""));
        bytes.extend(frame(b"world!"));
        let mut cursor = Cursor::new(bytes);
        let mut decoder = FrameDecoder::new();

        assert_eq!(decoder.read_frame(&mut cursor).unwrap(), Some(&b"hello"[..]));
        assert_eq!(decoder.read_frame(&mut cursor).unwrap(), Some(&b""[..]));
        assert_eq!(decoder.read_frame(&mut cursor).unwrap(), Some(&b"world!"[..]));
        assert!(matches!(decoder.read_frame(&mut cursor), Err(FrameError::Closed)));
    }

    #[test]
    fn survives_timeouts_mid_frame() {
        let bytes = frame(b"partial payload");
        let mut reader = Trickle {
            chunks: VecDeque::from(vec![
                Some(bytes[..2].to_vec()),
                None,
                Some(bytes[2..7].to_vec()),
                None,
                Some(bytes[7..].to_vec()),
            ]),
        };
        let mut decoder = FrameDecoder::new();

        assert_eq!(decoder.read_frame(&mut reader).unwrap(), None);
        assert!(decoder.in_progress());
        assert_eq!(decoder.read_frame(&mut reader).unwrap(), None);
        assert_eq!(
            decoder.read_frame(&mut reader).unwrap(),
            Some(&b"partial payload"[..])
        );
        assert!(!decoder.in_progress());
    }

    #[test]
    fn rejects_oversized_header_without_reading_payload() {
        // 2 MiB header followed by only a few bytes
        let mut bytes = vec![0x00, 0x20, 0x00, 0x00];
        bytes.extend_from_slice(b"tail");
        let mut cursor = Cursor::new(bytes);
        let mut decoder = FrameDecoder::new();

        match decoder.read_frame(&mut cursor) {
            Err(FrameError::Oversized { len }) => assert_eq!(len, 2 * 1024 * 1024),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn max_frame_is_accepted() {
        assert!(encode_header(MAX_FRAME_LEN).is_ok());
        assert!(matches!(
            encode_header(MAX_FRAME_LEN + 1),
            Err(FrameError::Oversized { .. })
        ));
    }

    #[test]
    fn eof_mid_frame_is_closed() {
        let bytes = frame(b"cut short");
        let mut cursor = Cursor::new(bytes[..6].to_vec());
        let mut decoder = FrameDecoder::new();
        assert!(matches!(decoder.read_frame(&mut cursor), Err(FrameError::Closed)));
    }
}
