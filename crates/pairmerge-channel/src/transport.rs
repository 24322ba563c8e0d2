use async_trait::async_trait;

use crate::error::{ChannelError, ChannelResult};

/// Ordered, reliable delivery of text lines to and from one partner.
///
/// Lines are passed without their terminator. Implementations must deliver
/// lines in the order the partner sent them.
#[async_trait]
pub trait LineTransport: Send {
    /// Queue a line for the partner. Fails with `Unavailable` once closed.
    async fn send_line(&mut self, line: &str) -> ChannelResult<()>;

    /// Wait for the next line. Fails with `Closed` after the partner has
    /// closed and every earlier line has been returned.
    async fn recv_line(&mut self) -> ChannelResult<String>;

    /// Return the next line if one is already available.
    async fn try_recv_line(&mut self) -> ChannelResult<Option<String>>;

    /// Stop sending. Lines already queued still reach the partner.
    async fn close(&mut self) -> ChannelResult<()>;

    /// Position in the inbound stream just past the last line returned, for
    /// transports that can replay from a position. `None` otherwise.
    fn resume_point(&self) -> Option<u64> {
        None
    }

    /// Continue reading from a position taken earlier from [`resume_point`](Self::resume_point).
    async fn resume_from(&mut self, point: u64) -> ChannelResult<()> {
        Err(ChannelError::Unavailable(format!(
            "{} cannot resume from position {point}",
            self.describe()
        )))
    }

    /// Short human-readable description for logs.
    fn describe(&self) -> String;
}

#[async_trait]
impl LineTransport for Box<dyn LineTransport> {
    async fn send_line(&mut self, line: &str) -> ChannelResult<()> {
        (**self).send_line(line).await
    }

    async fn recv_line(&mut self) -> ChannelResult<String> {
        (**self).recv_line().await
    }

    async fn try_recv_line(&mut self) -> ChannelResult<Option<String>> {
        (**self).try_recv_line().await
    }

    async fn close(&mut self) -> ChannelResult<()> {
        (**self).close().await
    }

    fn resume_point(&self) -> Option<u64> {
        (**self).resume_point()
    }

    async fn resume_from(&mut self, point: u64) -> ChannelResult<()> {
        (**self).resume_from(point).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
