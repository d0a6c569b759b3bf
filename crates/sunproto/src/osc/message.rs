//! Owned OSC messages for the control thread.

use super::{OscArg, OscError, OscReader, OscWriter};

/// Owned counterpart of [`OscArg`].
#[derive(Debug, Clone, PartialEq)]
pub enum OscValue {
    Int32(i32),
    Float32(f32),
    String(String),
    Blob(Vec<u8>),
}

impl OscValue {
    pub fn as_arg(&self) -> OscArg<'_> {
        match self {
            OscValue::Int32(v) => OscArg::Int32(*v),
            OscValue::Float32(v) => OscArg::Float32(*v),
            OscValue::String(s) => OscArg::String(s),
            OscValue::Blob(b) => OscArg::Blob(b),
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            OscValue::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            OscValue::Float32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            OscValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<OscArg<'_>> for OscValue {
    fn from(arg: OscArg<'_>) -> Self {
        match arg {
            OscArg::Int32(v) => OscValue::Int32(v),
            OscArg::Float32(v) => OscValue::Float32(v),
            OscArg::String(s) => OscValue::String(s.to_owned()),
            OscArg::Blob(b) => OscValue::Blob(b.to_vec()),
        }
    }
}

impl From<i32> for OscValue {
    fn from(v: i32) -> Self {
        OscValue::Int32(v)
    }
}

impl From<f32> for OscValue {
    fn from(v: f32) -> Self {
        OscValue::Float32(v)
    }
}

impl From<&str> for OscValue {
    fn from(s: &str) -> Self {
        OscValue::String(s.to_owned())
    }
}

impl From<String> for OscValue {
    fn from(s: String) -> Self {
        OscValue::String(s)
    }
}

impl From<Vec<u8>> for OscValue {
    fn from(b: Vec<u8>) -> Self {
        OscValue::Blob(b)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscValue>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    pub fn with_arg(mut self, arg: impl Into<OscValue>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn encoded_len(&self) -> usize {
        let args: Vec<OscArg<'_>> = self.args.iter().map(OscValue::as_arg).collect();
        super::encoded_len(&self.address, &args)
    }

    /// Encode through [`OscWriter`] into an exactly-sized buffer.
    pub fn encode(&self) -> Result<Vec<u8>, OscError> {
        let mut buf = vec![0u8; self.encoded_len()];
        let len = {
            let mut w = OscWriter::new(&mut buf);
            w.begin(&self.address);
            for arg in &self.args {
                w.add(arg.as_arg());
            }
            w.end();
            match (w.error(), w.packet()) {
                (None, Some(packet)) => packet.len(),
                (Some(e), _) => return Err(e),
                (None, None) => return Err(OscError::OutOfOrder("end() not reached")),
            }
        };
        buf.truncate(len);
        Ok(buf)
    }

    pub fn decode(packet: &[u8]) -> Result<Self, OscError> {
        let reader = OscReader::parse(packet)?;
        Ok(Self {
            address: reader.address().to_owned(),
            args: reader.arguments().map(OscValue::from).collect(),
        })
    }
}
