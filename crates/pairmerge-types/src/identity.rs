use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Name of one protocol endpoint, e.g. `"A"` or `"B"`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(name: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(TypeError::InvalidWorkerId(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for WorkerId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for WorkerId {
    type Error = TypeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<WorkerId> for String {
    fn from(id: WorkerId) -> Self {
        id.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkerId({})", self.0)
    }
}

/// How a worker resolves equal heads.
///
/// Exactly one of the two workers must hold `Priority`. The priority worker
/// treats a tie as "my head is smaller"; the other treats it as "my head is
/// larger".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreak {
    Priority,
    Defer,
}

impl TieBreak {
    /// Derive the rule from both identities: the smaller id has priority.
    ///
    /// Both workers evaluate this with swapped arguments and reach opposite
    /// answers. Equal ids have no consistent answer and yield `None`.
    pub fn by_identity(me: &WorkerId, partner: &WorkerId) -> Option<Self> {
        match me.cmp(partner) {
            std::cmp::Ordering::Less => Some(Self::Priority),
            std::cmp::Ordering::Greater => Some(Self::Defer),
            std::cmp::Ordering::Equal => None,
        }
    }

    pub fn has_priority(self) -> bool {
        matches!(self, Self::Priority)
    }

    /// The rule the partner must be running.
    pub fn opposite(self) -> Self {
        match self {
            Self::Priority => Self::Defer,
            Self::Defer => Self::Priority,
        }
    }
}
