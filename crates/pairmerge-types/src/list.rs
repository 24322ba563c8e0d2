use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Values that can be merged by the protocol.
///
/// The protocol itself only needs a total order; the serde bounds let the
/// value travel in a wire message and land in an output sink.
pub trait MergeValue:
    Ord + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<T> MergeValue for T where
    T: Ord + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// A worker's private input: an owned, non-decreasing sequence.
///
/// Once built the list never changes; progress through it is tracked by the
/// engine's cursor, not by mutating the list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SortedList<V> {
    values: Vec<V>,
}

impl<V: Ord> SortedList<V> {
    /// Wrap an already sorted vector, rejecting out-of-order input.
    pub fn new(values: Vec<V>) -> Result<Self, TypeError> {
        if let Some(pos) = values.windows(2).position(|w| w[1] < w[0]) {
            return Err(TypeError::NotSorted { index: pos + 1 });
        }
        Ok(Self { values })
    }

    /// Sort arbitrary input into a list.
    pub fn from_unsorted(mut values: Vec<V>) -> Self {
        values.sort();
        Self { values }
    }

    pub fn empty() -> Self {
        Self { values: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&V> {
        self.values.get(index)
    }

    pub fn as_slice(&self) -> &[V] {
        &self.values
    }

    pub fn into_inner(self) -> Vec<V> {
        self.values
    }
}

impl<V: Clone + Ord> SortedList<V> {
    /// The `{min, max, count}` summary announced in a RANG message.
    pub fn summary(&self) -> RangeSummary<V> {
        RangeSummary {
            min: self.values.first().cloned(),
            max: self.values.last().cloned(),
            count: self.values.len() as u64,
        }
    }
}

impl<'de, V: Ord + Deserialize<'de>> Deserialize<'de> for SortedList<V> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values = Vec::<V>::deserialize(deserializer)?;
        SortedList::new(values).map_err(serde::de::Error::custom)
    }
}

/// Summary statistics a worker reveals about its list.
///
/// `min` and `max` are `None` exactly when `count` is zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSummary<V> {
    pub min: Option<V>,
    pub max: Option<V>,
    pub count: u64,
}

impl<V: Ord> RangeSummary<V> {
    pub fn empty() -> Self {
        Self { min: None, max: None, count: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Whether `value` lies within `[min, max]`. Always false for an empty summary.
    pub fn contains(&self, value: &V) -> bool {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => min <= value && value <= max,
            _ => false,
        }
    }

    /// Check the internal consistency a conformant peer guarantees.
    pub fn is_consistent(&self) -> bool {
        match (&self.min, &self.max) {
            (None, None) => self.count == 0,
            (Some(min), Some(max)) => self.count > 0 && min <= max,
            _ => false,
        }
    }
}
