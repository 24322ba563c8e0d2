use std::time::Duration;

use pairmerge_channel::ChannelError;
use pairmerge_types::{Phase, WorkerId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("protocol violation detected by {worker} in {phase}: {reason}")]
    Violation { worker: WorkerId, phase: Phase, reason: String },

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("no message from partner within {waited:?}")]
    Stall { waited: Duration },

    #[error("output error: {0}")]
    Output(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("worker task failed: {0}")]
    Join(String),
}

impl MergeError {
    /// True when the error only reflects the partner going away, which is
    /// usually a consequence of a failure on the other side.
    pub fn is_partner_closed(&self) -> bool {
        matches!(
            self,
            Self::Channel(ChannelError::Closed) | Self::Channel(ChannelError::Unavailable(_))
        )
    }
}

pub type MergeResult<T> = Result<T, MergeError>;
