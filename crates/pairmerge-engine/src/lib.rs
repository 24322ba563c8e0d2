//! Merge engine for pairmerge.
//!
//! Two workers each own one sorted list and cooperate over a channel to write
//! the merged result to a shared output, every value exactly once, in order.
//!
//! - [`MergeEngine`]: the per-worker INIT → MERGE → DONE state machine; pure, no I/O
//! - [`Worker`]: drives an engine over a [`pairmerge_channel::Channel`]
//! - [`CheckpointFile`]: per-worker state saved between steps for restarts
//! - [`run_pair`]: both workers in one runtime over in-memory queues
//!
//! ```no_run
//! # async fn demo() -> pairmerge_engine::MergeResult<()> {
//! use pairmerge_engine::run_pair;
//! use pairmerge_types::SortedList;
//!
//! let left = SortedList::from_unsorted(vec![5, 1, 3]);
//! let right = SortedList::from_unsorted(vec![2, 6, 3]);
//! let outcome = run_pair(left, right).await?;
//! assert_eq!(outcome.merged, vec![1, 2, 3, 3, 5, 6]);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod output;
pub mod pair;
pub mod state;
pub mod stats;
pub mod worker;

pub use checkpoint::{CheckpointFile, WorkerCheckpoint};
pub use config::WorkerConfig;
pub use engine::{Action, MergeEngine};
pub use error::{MergeError, MergeResult};
pub use output::{FileOutput, MergedOutput, SharedOutput};
pub use pair::{run_pair, run_pair_with, PairOutcome, DEFAULT_STALL_TIMEOUT};
pub use state::{PartnerHead, WorkerLocalState};
pub use stats::WorkerStats;
pub use worker::{Worker, WorkerReport};
