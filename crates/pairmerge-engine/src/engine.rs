use pairmerge_protocol::Message;
use pairmerge_types::{MergeValue, Phase, RangeSummary, SortedList, TieBreak, WorkerId};
use tracing::{debug, info, warn};

use crate::checkpoint::WorkerCheckpoint;
use crate::error::{MergeError, MergeResult};
use crate::state::{PartnerHead, WorkerLocalState};
use crate::stats::WorkerStats;

/// A side effect the driver must carry out, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action<V> {
    /// Append this value to the merged output.
    Emit(V),
    /// Send this message to the partner.
    Send(Message<V>),
}

/// Per-worker merge state machine.
///
/// The engine performs no I/O. [`start`](Self::start) and
/// [`handle`](Self::handle) return the actions to perform. Emits always come
/// before the message announcing the next head, which is what keeps the
/// partner's later emits causally after ours.
///
/// Roles within MERGE: the worker whose head is larger (or who defers on a
/// tie) sends TAKE; the worker holding the minimum waits for that TAKE and
/// emits on receipt. A head therefore only moves on TAKE, or when draining
/// after the partner's END, so every TAKE refers to the receiver's current
/// head.
pub struct MergeEngine<V> {
    id: WorkerId,
    list: SortedList<V>,
    tie_break: TieBreak,
    state: WorkerLocalState<V>,
    stats: WorkerStats,
}

impl<V: MergeValue> MergeEngine<V> {
    pub fn new(id: WorkerId, list: SortedList<V>, tie_break: TieBreak) -> Self {
        Self { id, list, tie_break, state: WorkerLocalState::default(), stats: WorkerStats::default() }
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    pub fn phase(&self) -> Phase {
        self.state.phase
    }

    pub fn is_done(&self) -> bool {
        self.state.phase.is_terminal()
    }

    pub fn state(&self) -> &WorkerLocalState<V> {
        &self.state
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    pub fn current_head(&self) -> Option<&V> {
        self.list.get(self.state.cursor)
    }

    pub fn is_exhausted(&self) -> bool {
        self.state.cursor >= self.list.len()
    }

    /// Snapshot of everything but the list, for persisting between steps.
    pub fn checkpoint(&self, partner: &WorkerId, inbox_offset: Option<u64>) -> WorkerCheckpoint<V> {
        WorkerCheckpoint {
            worker: self.id.clone(),
            partner: partner.clone(),
            tie_break: self.tie_break,
            list_len: self.list.len(),
            state: self.state.clone(),
            stats: self.stats.clone(),
            inbox_offset,
        }
    }

    /// Continue from a checkpoint taken by an engine over the same list.
    pub fn resume(mut self, checkpoint: WorkerCheckpoint<V>) -> MergeResult<Self> {
        if checkpoint.worker != self.id {
            return Err(MergeError::Checkpoint(format!(
                "checkpoint belongs to worker {}, not {}",
                checkpoint.worker, self.id
            )));
        }
        if checkpoint.list_len != self.list.len() || checkpoint.state.cursor > self.list.len() {
            return Err(MergeError::Checkpoint(format!(
                "checkpoint was taken over {} values at cursor {}, input has {}",
                checkpoint.list_len,
                checkpoint.state.cursor,
                self.list.len()
            )));
        }
        info!(
            worker = %self.id,
            phase = %checkpoint.state.phase,
            cursor = checkpoint.state.cursor,
            "resuming engine"
        );
        self.tie_break = checkpoint.tie_break;
        self.state = checkpoint.state;
        self.stats = checkpoint.stats;
        Ok(self)
    }

    /// Enter INIT: announce this worker's range summary.
    pub fn start(&mut self) -> MergeResult<Vec<Action<V>>> {
        if self.state.rang_sent {
            return Err(self.violation("start called twice"));
        }
        let summary = self.list.summary();
        info!(worker = %self.id, count = summary.count, tie_break = ?self.tie_break, "entering INIT");
        let mut out = Vec::new();
        self.state.rang_sent = true;
        self.send(&mut out, Message::Rang(summary));
        Ok(out)
    }

    /// Consume one message from the partner.
    pub fn handle(&mut self, msg: Message<V>) -> MergeResult<Vec<Action<V>>> {
        if !self.state.rang_sent {
            return Err(self.violation(format!("{} received before start", msg.kind())));
        }
        self.stats.messages_received += 1;
        let mut out = Vec::new();
        match (self.state.phase, msg) {
            (Phase::Done, msg) => {
                return Err(self.violation(format!("{} received after DONE", msg.kind())));
            }
            (Phase::Init, Message::Rang(summary)) => self.on_rang(&mut out, summary)?,
            (Phase::Init, msg) => {
                return Err(self.violation(format!("{} received before partner RANG", msg.kind())));
            }
            (Phase::Merge, Message::Rang(_)) => {
                return Err(self.violation("duplicate RANG"));
            }
            (Phase::Merge, Message::Head(value)) => self.on_head(&mut out, value)?,
            (Phase::Merge, Message::End) => self.on_end(&mut out)?,
            (Phase::Merge, Message::Take) => self.on_take(&mut out)?,
        }
        Ok(out)
    }

    fn on_rang(&mut self, out: &mut Vec<Action<V>>, summary: RangeSummary<V>) -> MergeResult<()> {
        if !summary.is_consistent() {
            return Err(self.violation("inconsistent RANG summary"));
        }
        self.state.partner_summary = Some(summary);
        self.state.phase = Phase::Merge;
        info!(worker = %self.id, exhausted = self.is_exhausted(), "entering MERGE");
        self.announce(out);
        self.evaluate(out);
        Ok(())
    }

    fn on_head(&mut self, out: &mut Vec<Action<V>>, value: V) -> MergeResult<()> {
        match &self.state.partner_head {
            PartnerHead::Exhausted => return Err(self.violation("HEAD after END")),
            PartnerHead::Value(prev) if value < *prev => {
                return Err(self.violation(format!("HEAD {value:?} is below previous head {prev:?}")));
            }
            _ => {}
        }
        let (in_range, advertised) = match &self.state.partner_summary {
            Some(summary) => (summary.contains(&value), summary.count),
            None => (false, 0),
        };
        if !in_range {
            return Err(self.violation(format!("HEAD {value:?} outside advertised range")));
        }
        self.state.partner_heads_seen += 1;
        if self.state.partner_heads_seen > advertised {
            return Err(self.violation(format!("more HEADs than the advertised count {advertised}")));
        }
        self.state.partner_head = PartnerHead::Value(value);
        self.state.awaiting_reply = false;
        self.evaluate(out);
        Ok(())
    }

    fn on_end(&mut self, out: &mut Vec<Action<V>>) -> MergeResult<()> {
        if self.state.partner_head.is_exhausted() {
            return Err(self.violation("duplicate END"));
        }
        debug!(worker = %self.id, "partner exhausted");
        self.state.partner_head = PartnerHead::Exhausted;
        self.state.awaiting_reply = false;
        self.evaluate(out);
        Ok(())
    }

    fn on_take(&mut self, out: &mut Vec<Action<V>>) -> MergeResult<()> {
        if self.is_exhausted() {
            return Err(self.violation("TAKE while exhausted"));
        }
        if self.state.awaiting_reply {
            return Err(self.violation("TAKE crossed our own TAKE; both workers deferred (tie-break misconfigured?)"));
        }
        if self.state.partner_head.value().is_none() {
            return Err(self.violation("TAKE without a partner head"));
        }
        self.emit_head(out);
        self.announce(out);
        self.evaluate(out);
        Ok(())
    }

    /// Decision loop, run after every state change in MERGE.
    fn evaluate(&mut self, out: &mut Vec<Action<V>>) {
        if self.is_exhausted() {
            if self.state.partner_head.is_exhausted() {
                self.finish(out);
            }
            return;
        }
        let partner = self.state.partner_head.clone();
        match partner {
            PartnerHead::Unknown => {}
            PartnerHead::Exhausted => {
                let before = self.stats.values_output;
                while !self.is_exhausted() {
                    self.emit_head(out);
                }
                debug!(worker = %self.id, drained = self.stats.values_output - before, "drained after partner END");
                self.announce(out);
                self.finish(out);
            }
            PartnerHead::Value(theirs) => {
                if self.state.awaiting_reply {
                    return;
                }
                let Some(mine) = self.current_head().cloned() else { return };
                self.stats.comparisons += 1;
                if self.holds_minimum(&mine, &theirs) {
                    debug!(worker = %self.id, mine = ?mine, theirs = ?theirs, "holding minimum; waiting for TAKE");
                } else {
                    self.state.awaiting_reply = true;
                    self.send(out, Message::Take);
                }
            }
        }
    }

    fn holds_minimum(&self, mine: &V, theirs: &V) -> bool {
        mine < theirs || (mine == theirs && self.tie_break.has_priority())
    }

    /// Append the current head and move the cursor past it.
    fn emit_head(&mut self, out: &mut Vec<Action<V>>) {
        if let Some(value) = self.current_head().cloned() {
            out.push(Action::Emit(value));
            self.state.cursor += 1;
            self.stats.values_output += 1;
        }
    }

    /// Tell the partner where this worker now stands: HEAD, or END once.
    fn announce(&mut self, out: &mut Vec<Action<V>>) {
        match self.current_head().cloned() {
            Some(head) => self.send(out, Message::Head(head)),
            None if !self.state.end_sent => {
                self.state.end_sent = true;
                self.send(out, Message::End);
            }
            None => {}
        }
    }

    fn finish(&mut self, out: &mut Vec<Action<V>>) {
        if !self.state.end_sent {
            self.announce(out);
        }
        self.state.phase = Phase::Done;
        info!(
            worker = %self.id,
            emitted = self.stats.values_output,
            sent = self.stats.messages_sent,
            received = self.stats.messages_received,
            "entering DONE"
        );
    }

    fn send(&mut self, out: &mut Vec<Action<V>>, msg: Message<V>) {
        self.stats.messages_sent += 1;
        if matches!(msg, Message::Take) {
            self.stats.takes_sent += 1;
        }
        out.push(Action::Send(msg));
    }

    fn violation(&self, reason: impl Into<String>) -> MergeError {
        let reason = reason.into();
        warn!(worker = %self.id, phase = %self.state.phase, %reason, "protocol violation");
        MergeError::Violation { worker: self.id.clone(), phase: self.state.phase, reason }
    }
}
