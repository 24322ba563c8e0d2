use pairmerge_protocol::{LineCodec, Message};
use pairmerge_types::WorkerId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ChannelError, ChannelResult};
use crate::transport::LineTransport;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChannelState {
    Open,
    /// A malformed line arrived; the peer can no longer be trusted.
    Faulted,
    Closed,
}

/// Typed message channel between one worker and its partner.
pub struct Channel<T> {
    transport: T,
    local: WorkerId,
    partner: WorkerId,
    state: ChannelState,
}

impl<T: LineTransport> Channel<T> {
    pub fn new(transport: T, local: WorkerId, partner: WorkerId) -> Self {
        Self { transport, local, partner, state: ChannelState::Open }
    }

    pub fn local(&self) -> &WorkerId {
        &self.local
    }

    pub fn partner(&self) -> &WorkerId {
        &self.partner
    }

    pub fn is_faulted(&self) -> bool {
        self.state == ChannelState::Faulted
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Encode and send one message.
    pub async fn send<V: Serialize>(&mut self, msg: &Message<V>) -> ChannelResult<()> {
        self.ensure_open()?;
        let line = LineCodec::encode(msg)?;
        self.transport.send_line(&line).await?;
        debug!(from = %self.local, to = %self.partner, kind = %msg.kind(), "message sent");
        Ok(())
    }

    /// Wait for the partner's next message.
    pub async fn receive<V: DeserializeOwned + Ord>(&mut self) -> ChannelResult<Message<V>> {
        self.ensure_open()?;
        loop {
            let line = self.transport.recv_line().await.map_err(|e| self.fault(e))?;
            if line.trim().is_empty() {
                continue;
            }
            return self.decode(&line);
        }
    }

    /// The partner's next message, if one has already arrived.
    pub async fn try_receive<V: DeserializeOwned + Ord>(
        &mut self,
    ) -> ChannelResult<Option<Message<V>>> {
        self.ensure_open()?;
        loop {
            match self.transport.try_recv_line().await.map_err(|e| self.fault(e))? {
                None => return Ok(None),
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => return self.decode(&line).map(Some),
            }
        }
    }

    /// Stop sending. Idempotent.
    pub async fn close(&mut self) -> ChannelResult<()> {
        if self.state == ChannelState::Closed {
            return Ok(());
        }
        self.state = ChannelState::Closed;
        self.transport.close().await?;
        debug!(local = %self.local, transport = %self.transport.describe(), "channel closed");
        Ok(())
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    fn ensure_open(&self) -> ChannelResult<()> {
        match self.state {
            ChannelState::Open => Ok(()),
            ChannelState::Faulted => Err(ChannelError::Unavailable(format!(
                "channel from {} faulted by an earlier receive error",
                self.partner
            ))),
            ChannelState::Closed => Err(ChannelError::Unavailable("channel closed locally".into())),
        }
    }

    fn decode<V: DeserializeOwned + Ord>(&mut self, line: &str) -> ChannelResult<Message<V>> {
        match LineCodec::decode(line) {
            Ok(msg) => {
                debug!(from = %self.partner, to = %self.local, kind = %msg.kind(), "message received");
                Ok(msg)
            }
            Err(e) => Err(self.fault(e.into())),
        }
    }

    /// Any receive failure leaves the inbound stream at an unknown position.
    fn fault(&mut self, e: ChannelError) -> ChannelError {
        self.state = ChannelState::Faulted;
        warn!(from = %self.partner, error = %e, "receive failed; channel faulted");
        e
    }
}
