use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol phase of a single worker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    /// Exchanging range summaries.
    #[default]
    Init,
    /// Comparing heads and emitting values.
    Merge,
    /// Terminal: both sides exhausted and acknowledged.
    Done,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Merge => "MERGE",
            Self::Done => "DONE",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
