//! Wire protocol for pairmerge.
//!
//! Defines the four message kinds exchanged between two merge workers and the
//! one-line-per-message text encoding used on every transport.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{LineCodec, EMPTY_BOUND, MAX_LINE_BYTES, MAX_VALUES};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{Message, MessageKind};
