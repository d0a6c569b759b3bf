//! Realtime-safe building blocks for crossing the audio/control thread boundary.
//!
//! - [`ring`]: bounded single-producer/single-consumer queue
//! - [`cell`]: latest-value atomic cells for parameters
//! - [`outbox`]: fixed-size OSC packets encoded on the audio thread and
//!   queued for a control thread to send
//!
//! Everything on the hot path is wait-free: no allocation, no locks, no
//! syscalls. Allocation only happens when a ring is created.

pub mod cell;
pub mod outbox;
pub mod ring;

pub use cell::{AtomicCell, AtomicValue};
pub use outbox::{OscOutbox, OscPacket, OutboxReceiver};
pub use ring::{Consumer, Producer, RingBuffer};
