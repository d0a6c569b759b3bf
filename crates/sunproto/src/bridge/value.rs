use serde::{Deserialize, Serialize};

/// Argument or result value carried by the bridge envelope.
///
/// Serialized as the bare JSON value. On decode, variants are tried in
/// declaration order: an integral number is an `Int`, a mixed list of
/// integral and fractional numbers is a `DoubleArray`, and `[]` decodes as an
/// empty `IntArray`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BridgeValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    IntArray(Vec<i64>),
    DoubleArray(Vec<f64>),
    BoolArray(Vec<bool>),
    StringArray(Vec<String>),
    Notes(Vec<Note>),
}

impl BridgeValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            BridgeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            BridgeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            BridgeValue::Double(v) => Some(*v),
            BridgeValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BridgeValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for BridgeValue {
    fn from(v: bool) -> Self {
        BridgeValue::Bool(v)
    }
}

impl From<i64> for BridgeValue {
    fn from(v: i64) -> Self {
        BridgeValue::Int(v)
    }
}

impl From<i32> for BridgeValue {
    fn from(v: i32) -> Self {
        BridgeValue::Int(i64::from(v))
    }
}

impl From<f64> for BridgeValue {
    fn from(v: f64) -> Self {
        BridgeValue::Double(v)
    }
}

impl From<&str> for BridgeValue {
    fn from(v: &str) -> Self {
        BridgeValue::String(v.to_owned())
    }
}

impl From<String> for BridgeValue {
    fn from(v: String) -> Self {
        BridgeValue::String(v)
    }
}

impl From<Vec<Note>> for BridgeValue {
    fn from(v: Vec<Note>) -> Self {
        BridgeValue::Notes(v)
    }
}

/// A MIDI note as the clip note operations expect it. Times are in beats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    pub start: f64,
    pub duration: f64,
    pub velocity: u8,
    #[serde(default)]
    pub muted: bool,
}

impl Note {
    pub fn new(pitch: u8, start: f64, duration: f64, velocity: u8) -> Self {
        Self {
            pitch,
            start,
            duration,
            velocity,
            muted: false,
        }
    }
}
