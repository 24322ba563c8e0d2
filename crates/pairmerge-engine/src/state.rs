use pairmerge_types::{Phase, RangeSummary};
use serde::{Deserialize, Serialize};

/// What a worker knows about its partner's head.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartnerHead<V> {
    /// No HEAD or END received yet.
    Unknown,
    /// The value from the partner's latest HEAD.
    Value(V),
    /// The partner sent END.
    Exhausted,
}

impl<V> PartnerHead<V> {
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

/// Per-worker mutable protocol record.
///
/// `cursor` only moves forward. The current head and exhaustion flag are not
/// stored: they are read off the list at `cursor` by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerLocalState<V> {
    pub cursor: usize,
    pub phase: Phase,
    pub partner_summary: Option<RangeSummary<V>>,
    pub partner_head: PartnerHead<V>,
    /// HEAD messages received; never exceeds the partner's advertised count.
    pub partner_heads_seen: u64,
    pub rang_sent: bool,
    pub end_sent: bool,
    /// A TAKE is outstanding; the next HEAD/END from the partner answers it.
    pub awaiting_reply: bool,
}

impl<V> Default for WorkerLocalState<V> {
    fn default() -> Self {
        Self {
            cursor: 0,
            phase: Phase::Init,
            partner_summary: None,
            partner_head: PartnerHead::Unknown,
            partner_heads_seen: 0,
            rang_sent: false,
            end_sent: false,
            awaiting_reply: false,
        }
    }
}
