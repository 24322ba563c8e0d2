use serde::{Deserialize, Serialize};

/// Work counters for one worker.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Head comparisons performed.
    pub comparisons: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    /// Values this worker appended to the merged output.
    pub values_output: u64,
    /// TAKE requests sent; a subset of `messages_sent`.
    pub takes_sent: u64,
}
