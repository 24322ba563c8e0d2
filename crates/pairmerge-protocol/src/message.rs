use std::fmt;
use std::str::FromStr;

use pairmerge_types::RangeSummary;
use serde::{Deserialize, Serialize};

/// All messages a worker can send its partner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message<V> {
    /// Summary of the sender's list, sent once during INIT.
    Rang(RangeSummary<V>),
    /// The sender's current smallest unemitted value.
    Head(V),
    /// The sender has emitted its whole list.
    End,
    /// The sender has determined the receiver holds the minimum: emit it.
    Take,
}

/// Discriminant of a [`Message`], as written on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Rang,
    Head,
    End,
    Take,
}

impl MessageKind {
    pub const ALL: [MessageKind; 4] = [Self::Rang, Self::Head, Self::End, Self::Take];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rang => "RANG",
            Self::Head => "HEAD",
            Self::End => "END",
            Self::Take => "TAKE",
        }
    }

    /// Number of entries in the `values` array for this kind.
    pub fn arity(self) -> usize {
        match self {
            Self::Rang => 3,
            Self::Head => 1,
            Self::End | Self::Take => 0,
        }
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown message kind {s:?}"))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<V> Message<V> {
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Rang(_) => MessageKind::Rang,
            Self::Head(_) => MessageKind::Head,
            Self::End => MessageKind::End,
            Self::Take => MessageKind::Take,
        }
    }
}
