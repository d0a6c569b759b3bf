//! Sunny wire formats
//!
//! Two layers live here:
//!
//! - [`osc`]: a byte-exact OSC 1.0 codec. The writer and reader never allocate
//!   and are safe to call from the audio callback.
//! - [`bridge`]: the JSON request/response envelope spoken to the DAW bridge
//!   over an established transport. Control thread only.

pub mod bridge;
pub mod osc;

pub use bridge::{
    deserialize_request, deserialize_response, serialize_notes, serialize_request,
    serialize_response, BridgeError, BridgePath, BridgeRequest, BridgeResponse, BridgeValue,
    Note, RequestKind,
};
pub use osc::{OscArg, OscError, OscMessage, OscReader, OscValue, OscWriter, OSC_MAX_ARGS};
