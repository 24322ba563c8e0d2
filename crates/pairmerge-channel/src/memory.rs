use async_trait::async_trait;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::{ChannelError, ChannelResult};
use crate::transport::LineTransport;

/// In-process transport backed by two unbounded tokio queues.
pub struct MemoryTransport {
    tx: Option<UnboundedSender<String>>,
    rx: UnboundedReceiver<String>,
}

impl MemoryTransport {
    /// Two connected endpoints: lines sent on one are received on the other.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = unbounded_channel();
        let (b_tx, a_rx) = unbounded_channel();
        (
            Self { tx: Some(a_tx), rx: a_rx },
            Self { tx: Some(b_tx), rx: b_rx },
        )
    }
}

#[async_trait]
impl LineTransport for MemoryTransport {
    async fn send_line(&mut self, line: &str) -> ChannelResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| ChannelError::Unavailable("closed locally".into()))?;
        tx.send(line.to_string())
            .map_err(|_| ChannelError::Unavailable("partner endpoint dropped".into()))
    }

    async fn recv_line(&mut self) -> ChannelResult<String> {
        self.rx.recv().await.ok_or(ChannelError::Closed)
    }

    async fn try_recv_line(&mut self) -> ChannelResult<Option<String>> {
        match self.rx.try_recv() {
            Ok(line) => Ok(Some(line)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ChannelError::Closed),
        }
    }

    async fn close(&mut self) -> ChannelResult<()> {
        self.tx.take();
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".into()
    }
}
