use thiserror::Error;

/// Errors produced by type construction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("input is not sorted: element {index} is smaller than its predecessor")]
    NotSorted { index: usize },

    #[error("invalid worker id {0:?}: must be non-empty and contain no whitespace")]
    InvalidWorkerId(String),
}
