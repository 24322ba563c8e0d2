//! Message channel for pairmerge.
//!
//! A [`Channel`] carries typed protocol messages between exactly two named
//! endpoints. Underneath it sits a [`LineTransport`], which only moves lines of
//! text and knows nothing about message kinds.
//!
//! Three transports are provided:
//!
//! - [`MemoryTransport`]: in-process queues, for two tasks in one runtime
//! - [`StreamTransport`]: any async byte stream: pipes, TCP, `tokio::io::duplex`
//! - [`FileTransport`]: an append-only inbox/outbox file pair polled for new lines

pub mod channel;
pub mod error;
pub mod file;
pub mod memory;
pub mod stream;
pub mod transport;

pub use channel::Channel;
pub use error::{ChannelError, ChannelResult};
pub use file::{FileTransport, DEFAULT_POLL_INTERVAL};
pub use memory::MemoryTransport;
pub use stream::StreamTransport;
pub use transport::LineTransport;
