//! Foundation types for pairmerge.
//!
//! Two workers each hold a private [`SortedList`] and cooperate over a message
//! channel to produce one globally sorted sequence. This crate holds the data
//! model shared by every other pairmerge crate.
//!
//! # Key Types
//!
//! - [`MergeValue`]: Bound satisfied by any value that can be merged and sent on the wire
//! - [`SortedList`]: A worker's private, immutable, non-decreasing input
//! - [`RangeSummary`]: `{min, max, count}` exchanged during INIT
//! - [`WorkerId`]: Name of a protocol endpoint
//! - [`TieBreak`]: Which worker emits when both heads are equal
//! - [`Phase`]: INIT / MERGE / DONE

pub mod error;
pub mod identity;
pub mod list;
pub mod phase;

pub use error::TypeError;
pub use identity::{TieBreak, WorkerId};
pub use list::{MergeValue, RangeSummary, SortedList};
pub use phase::Phase;
