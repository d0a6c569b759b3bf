//! Zero-copy OSC reader.

use super::{align4, OscArg, OscError};

/// Borrowing view over one encoded OSC message.
///
/// The whole packet is validated up front, so once [`has_error`](Self::has_error)
/// is false, [`arguments`](Self::arguments) cannot fail. A packet that ends right
/// after the address (no type tag string) is accepted as a message with no
/// arguments. Bytes after the last argument are ignored.
#[derive(Debug, Clone, Copy)]
pub struct OscReader<'a> {
    address: &'a str,
    tags: &'a [u8],
    data: &'a [u8],
    error: Option<OscError>,
}

impl<'a> OscReader<'a> {
    pub fn new(packet: &'a [u8]) -> Self {
        match Self::validate(packet) {
            Ok(reader) => reader,
            Err(e) => Self {
                address: "",
                tags: &[],
                data: &[],
                error: Some(e),
            },
        }
    }

    /// Like [`new`](Self::new) but returns the validation error directly.
    pub fn parse(packet: &'a [u8]) -> Result<Self, OscError> {
        Self::validate(packet)
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error(&self) -> Option<OscError> {
        self.error
    }

    /// The address pattern, or `""` if the packet was rejected.
    pub fn address(&self) -> &'a str {
        self.address
    }

    /// Type tag characters without the leading comma.
    pub fn type_tags(&self) -> &'a [u8] {
        self.tags
    }

    pub fn argument_count(&self) -> usize {
        self.tags.len()
    }

    /// Iterate the arguments in order. Empty if the packet was rejected.
    pub fn arguments(&self) -> OscArguments<'a> {
        OscArguments {
            tags: self.tags,
            data: self.data,
            index: 0,
            offset: 0,
        }
    }

    fn validate(packet: &'a [u8]) -> Result<Self, OscError> {
        if packet.is_empty() {
            return Err(OscError::EmptyPacket);
        }
        if packet.len() % 4 != 0 {
            return Err(OscError::Misaligned(packet.len()));
        }

        let (address, mut offset) = read_str(packet, 0)?;
        if !address.starts_with('/') {
            return Err(OscError::InvalidAddress);
        }

        if offset == packet.len() {
            return Ok(Self {
                address,
                tags: &[],
                data: &[],
                error: None,
            });
        }

        let (tag_str, next) = read_str(packet, offset)?;
        let tags = match tag_str.as_bytes().split_first() {
            Some((b',', rest)) => rest,
            _ => return Err(OscError::MissingTagComma),
        };
        offset = next;
        let data_start = offset;

        for &tag in tags {
            offset = match tag {
                b'i' | b'f' => {
                    if packet.len() - offset < 4 {
                        return Err(OscError::Truncated(offset));
                    }
                    offset + 4
                }
                b's' => read_str(packet, offset)?.1,
                b'b' => {
                    let size = read_word(packet, offset).ok_or(OscError::Truncated(offset))?;
                    let size = i32::from_be_bytes(size);
                    let size =
                        usize::try_from(size).map_err(|_| OscError::NegativeBlobSize(offset))?;
                    let end = offset + 4 + align4(size);
                    if end > packet.len() {
                        return Err(OscError::Truncated(offset));
                    }
                    end
                }
                other => return Err(OscError::InvalidTypeTag(char::from(other))),
            };
        }

        Ok(Self {
            address,
            tags,
            data: &packet[data_start..offset],
            error: None,
        })
    }
}

/// Iterator over the arguments of a validated packet.
#[derive(Debug, Clone)]
pub struct OscArguments<'a> {
    tags: &'a [u8],
    data: &'a [u8],
    index: usize,
    offset: usize,
}

impl<'a> Iterator for OscArguments<'a> {
    type Item = OscArg<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = *self.tags.get(self.index)?;
        let (arg, next) = match tag {
            b'i' => {
                let word = read_word(self.data, self.offset)?;
                (OscArg::Int32(i32::from_be_bytes(word)), self.offset + 4)
            }
            b'f' => {
                let word = read_word(self.data, self.offset)?;
                let bits = u32::from_be_bytes(word);
                (OscArg::Float32(f32::from_bits(bits)), self.offset + 4)
            }
            b's' => {
                let (s, next) = read_str(self.data, self.offset).ok()?;
                (OscArg::String(s), next)
            }
            b'b' => {
                let size = u32::from_be_bytes(read_word(self.data, self.offset)?) as usize;
                let start = self.offset + 4;
                let blob = self.data.get(start..start + size)?;
                (OscArg::Blob(blob), start + align4(size))
            }
            _ => return None,
        };
        self.index += 1;
        self.offset = next;
        Some(arg)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.tags.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for OscArguments<'_> {}

fn read_word(data: &[u8], offset: usize) -> Option<[u8; 4]> {
    data.get(offset..offset + 4)?.try_into().ok()
}

/// Read a NUL-terminated, 4-byte padded string starting at `offset`.
/// Returns the string and the offset just past its padding.
fn read_str(data: &[u8], offset: usize) -> Result<(&str, usize), OscError> {
    let rest = data.get(offset..).ok_or(OscError::Truncated(offset))?;
    let nul = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or(OscError::Truncated(offset))?;
    let next = offset + align4(nul + 1);
    if next > data.len() {
        return Err(OscError::Truncated(offset));
    }
    let s = std::str::from_utf8(&rest[..nul]).map_err(|_| OscError::InvalidUtf8(offset))?;
    Ok((s, next))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osc::OscWriter;

    fn encode(address: &str, args: &[OscArg<'_>]) -> Vec<u8> {
        let mut buf = vec![0u8; 512];
        let len = {
            let mut w = OscWriter::new(&mut buf);
            w.begin(address);
            for &arg in args {
                w.add(arg);
            }
            w.end();
            w.packet().expect("encode").len()
        };
        buf.truncate(len);
        buf
    }

    #[test]
    fn tempo_roundtrip() {
        let packet = encode("/live/song/set/tempo", &[OscArg::Float32(140.0)]);
        let reader = OscReader::new(&packet);
        assert!(!reader.has_error());
        assert_eq!(reader.address(), "/live/song/set/tempo");
        let args: Vec<_> = reader.arguments().collect();
        assert_eq!(args, vec![OscArg::Float32(140.0)]);
    }

    #[test]
    fn mixed_arguments() {
        let blob = [9u8, 8, 7];
        let packet = encode(
            "/mix",
            &[
                OscArg::Int32(i32::MIN),
                OscArg::String(""),
                OscArg::Blob(&blob),
                OscArg::Float32(-0.0),
                OscArg::Blob(&[]),
                OscArg::String("abcd"),
            ],
        );
        let reader = OscReader::parse(&packet).expect("valid");
        assert_eq!(reader.type_tags(), b"isbfbs");
        let args: Vec<_> = reader.arguments().collect();
        assert_eq!(args[0], OscArg::Int32(i32::MIN));
        assert_eq!(args[1], OscArg::String(""));
        assert_eq!(args[2], OscArg::Blob(&blob));
        match args[3] {
            OscArg::Float32(f) => assert_eq!(f.to_bits(), (-0.0f32).to_bits()),
            other => panic!("unexpected arg: {:?}", other),
        }
        assert_eq!(args[4], OscArg::Blob(&[]));
        assert_eq!(args[5], OscArg::String("abcd"));
    }

    #[test]
    fn missing_type_tags_means_no_arguments() {
        let reader = OscReader::new(b"/status\0");
        assert!(!reader.has_error());
        assert_eq!(reader.address(), "/status");
        assert_eq!(reader.argument_count(), 0);
        assert_eq!(reader.arguments().count(), 0);
    }

    #[test]
    fn tag_string_without_comma_is_rejected() {
        let reader = OscReader::new(b"/a\0\0if\0\0\0\0\0\x01\0\0\0\0");
        assert_eq!(reader.error(), Some(OscError::MissingTagComma));
        assert_eq!(reader.arguments().count(), 0);
    }

    #[test]
    fn empty_packet() {
        assert_eq!(OscReader::new(&[]).error(), Some(OscError::EmptyPacket));
    }

    #[test]
    fn misaligned_packet() {
        let mut packet = encode("/x", &[OscArg::Int32(1)]);
        packet.push(0);
        assert_eq!(OscReader::new(&packet).error(), Some(OscError::Misaligned(13)));
    }

    #[test]
    fn truncated_argument_data() {
        let packet = encode("/x", &[OscArg::Int32(1), OscArg::Int32(2)]);
        let cut = &packet[..packet.len() - 4];
        assert_eq!(OscReader::new(cut).error(), Some(OscError::Truncated(12)));
    }

    #[test]
    fn unterminated_address() {
        assert_eq!(OscReader::new(b"/abc").error(), Some(OscError::Truncated(0)));
    }

    #[test]
    fn blob_running_past_end() {
        // ",b" then a blob claiming 16 bytes with only 4 present
        let packet = b"/b\0\0,b\0\0\0\0\0\x10abcd";
        assert_eq!(OscReader::new(packet).error(), Some(OscError::Truncated(8)));
    }

    #[test]
    fn negative_blob_size() {
        let packet = b"/b\0\0,b\0\0\xff\xff\xff\xff";
        assert_eq!(
            OscReader::new(packet).error(),
            Some(OscError::NegativeBlobSize(8))
        );
    }

    #[test]
    fn unknown_type_tag() {
        let packet = b"/t\0\0,T\0\0";
        assert_eq!(
            OscReader::new(packet).error(),
            Some(OscError::InvalidTypeTag('T'))
        );
    }

    #[test]
    fn address_must_start_with_slash() {
        let packet = b"abc\0,\0\0\0";
        assert_eq!(OscReader::new(packet).error(), Some(OscError::InvalidAddress));
    }

    #[test]
    fn trailing_bytes_are_ignored() {
        let mut packet = encode("/x", &[OscArg::Int32(7)]);
        packet.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        let reader = OscReader::new(&packet);
        assert!(!reader.has_error());
        assert_eq!(reader.arguments().collect::<Vec<_>>(), vec![OscArg::Int32(7)]);
    }
}
