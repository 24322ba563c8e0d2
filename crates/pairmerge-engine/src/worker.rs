use std::path::PathBuf;

use pairmerge_channel::{Channel, LineTransport};
use pairmerge_protocol::Message;
use pairmerge_types::{MergeValue, Phase, SortedList, TieBreak, WorkerId};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use crate::checkpoint::CheckpointFile;
use crate::config::WorkerConfig;
use crate::engine::{Action, MergeEngine};
use crate::error::{MergeError, MergeResult};
use crate::output::MergedOutput;
use crate::stats::WorkerStats;

/// Summary of a finished worker run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WorkerReport {
    pub id: WorkerId,
    pub tie_break: TieBreak,
    pub phase: Phase,
    pub stats: WorkerStats,
}

/// Drives one [`MergeEngine`] over a channel until DONE.
///
/// The worker is single-threaded: it applies the engine's actions, then
/// suspends on `receive` until the partner's next message arrives. With a
/// checkpoint file attached, the engine state and inbox position are saved
/// after every applied step.
pub struct Worker<V, T, O> {
    config: WorkerConfig,
    engine: MergeEngine<V>,
    channel: Channel<T>,
    output: O,
    checkpoint: Option<CheckpointFile>,
}

impl<V, T, O> Worker<V, T, O>
where
    V: MergeValue,
    T: LineTransport,
    O: MergedOutput<V>,
{
    pub fn new(config: WorkerConfig, list: SortedList<V>, transport: T, output: O) -> MergeResult<Self> {
        let tie_break = config.resolve_tie_break()?;
        let engine = MergeEngine::new(config.id.clone(), list, tie_break);
        let channel = Channel::new(transport, config.id.clone(), config.partner.clone());
        Ok(Self { config, engine, channel, output, checkpoint: None })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Persist progress to `path`, continuing from it if it already exists.
    ///
    /// Resuming needs a transport that can seek its inbox, such as
    /// [`pairmerge_channel::FileTransport`], once any message was received.
    pub async fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> MergeResult<Self> {
        let file = CheckpointFile::new(path);
        if let Some(saved) = file.load::<V>()? {
            if saved.partner != self.config.partner || saved.tie_break != self.engine.tie_break() {
                return Err(MergeError::Checkpoint(format!(
                    "{} was written for partner {} with {:?}, not {} with {:?}",
                    file.path().display(),
                    saved.partner,
                    saved.tie_break,
                    self.config.partner,
                    self.engine.tie_break()
                )));
            }
            let offset = saved.inbox_offset;
            let received = saved.stats.messages_received;
            self.engine = self.engine.resume(saved)?;
            match offset {
                Some(point) => self.channel.transport_mut().resume_from(point).await?,
                None if received > 0 => {
                    return Err(MergeError::Checkpoint(format!(
                        "{} has no inbox position to resume from",
                        file.path().display()
                    )));
                }
                None => {}
            }
            info!(
                worker = %self.config.id,
                path = %file.path().display(),
                phase = %self.engine.phase(),
                inbox_offset = ?offset,
                "resuming from checkpoint"
            );
        }
        self.checkpoint = Some(file);
        Ok(self)
    }

    /// Run the protocol to completion.
    ///
    /// Any error aborts the run. Dropping the worker drops its transport,
    /// which the partner observes as a closed channel.
    pub async fn run(mut self) -> MergeResult<WorkerReport> {
        let span = info_span!("worker", id = %self.config.id, partner = %self.config.partner);
        async move {
            self.begin().await?;
            while !self.step().await? {}
            if let Err(e) = self.channel.close().await {
                warn!(error = %e, "failed to close channel after DONE");
            }
            Ok(WorkerReport {
                id: self.config.id.clone(),
                tie_break: self.engine.tie_break(),
                phase: self.engine.phase(),
                stats: self.engine.stats().clone(),
            })
        }
        .instrument(span)
        .await
    }

    /// Send RANG unless a resumed checkpoint shows it already went out.
    pub async fn begin(&mut self) -> MergeResult<()> {
        if !self.engine.state().rang_sent {
            let actions = self.engine.start()?;
            self.apply(actions).await?;
        }
        self.save()
    }

    /// Handle one partner message. Returns true once DONE.
    pub async fn step(&mut self) -> MergeResult<bool> {
        if !self.engine.is_done() {
            let msg = self.next_message().await?;
            let actions = self.engine.handle(msg)?;
            self.apply(actions).await?;
            self.save()?;
        }
        Ok(self.engine.is_done())
    }

    fn save(&self) -> MergeResult<()> {
        match &self.checkpoint {
            Some(file) => {
                let offset = self.channel.transport().resume_point();
                file.save(&self.engine.checkpoint(&self.config.partner, offset))
            }
            None => Ok(()),
        }
    }

    async fn next_message(&mut self) -> MergeResult<Message<V>> {
        match self.config.stall_timeout() {
            Some(limit) => match tokio::time::timeout(limit, self.channel.receive()).await {
                Ok(received) => Ok(received?),
                Err(_) => {
                    warn!(phase = %self.engine.phase(), waited = ?limit, "partner stalled");
                    Err(MergeError::Stall { waited: limit })
                }
            },
            None => Ok(self.channel.receive().await?),
        }
    }

    async fn apply(&mut self, actions: Vec<Action<V>>) -> MergeResult<()> {
        for action in actions {
            match action {
                Action::Emit(value) => self.output.append(&value)?,
                Action::Send(msg) => self.channel.send(&msg).await?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{FileOutput, SharedOutput};
    use pairmerge_channel::{ChannelError, FileTransport, MemoryTransport, StreamTransport};
    use std::time::Duration;

    fn id(s: &str) -> WorkerId {
        WorkerId::new(s).unwrap()
    }

    fn list(v: &[i64]) -> SortedList<i64> {
        SortedList::new(v.to_vec()).unwrap()
    }

    fn configs() -> (WorkerConfig, WorkerConfig) {
        (
            WorkerConfig::new(id("A"), id("B")).with_stall_timeout(Duration::from_secs(5)),
            WorkerConfig::new(id("B"), id("A")).with_stall_timeout(Duration::from_secs(5)),
        )
    }

    #[tokio::test]
    async fn workers_merge_over_memory() {
        let (ta, tb) = MemoryTransport::pair();
        let out = SharedOutput::new();
        let (ca, cb) = configs();
        let a = Worker::new(ca, list(&[1, 3, 5]), ta, out.clone()).unwrap();
        let b = Worker::new(cb, list(&[2, 3, 6]), tb, out.clone()).unwrap();
        let (ra, rb) = tokio::join!(tokio::spawn(a.run()), tokio::spawn(b.run()));
        let (ra, rb) = (ra.unwrap().unwrap(), rb.unwrap().unwrap());
        assert_eq!(out.snapshot().unwrap(), vec![1, 2, 3, 3, 5, 6]);
        assert_eq!(ra.phase, Phase::Done);
        assert_eq!(rb.phase, Phase::Done);
        assert_eq!(ra.tie_break, TieBreak::Priority);
        assert_eq!(ra.stats.values_output + rb.stats.values_output, 6);
    }

    #[tokio::test]
    async fn workers_merge_over_a_byte_stream() {
        let (left, right) = tokio::io::duplex(256);
        let (lr, lw) = tokio::io::split(left);
        let (rr, rw) = tokio::io::split(right);
        let out = SharedOutput::new();
        let (ca, cb) = configs();
        let a = Worker::new(ca, list(&[10]), StreamTransport::new(lr, lw, "a"), out.clone()).unwrap();
        let b = Worker::new(cb, list(&[1, 2, 3]), StreamTransport::new(rr, rw, "b"), out.clone()).unwrap();
        let (ra, rb) = tokio::join!(tokio::spawn(a.run()), tokio::spawn(b.run()));
        let ra = ra.unwrap().unwrap();
        rb.unwrap().unwrap();
        assert_eq!(out.snapshot().unwrap(), vec![1, 2, 3, 10]);
        assert_eq!(ra.stats.takes_sent, 3);
    }

    #[tokio::test]
    async fn workers_merge_over_files() {
        let dir = tempfile::tempdir().unwrap();
        let a_to_b = dir.path().join("a_to_b.jsonl");
        let b_to_a = dir.path().join("b_to_a.jsonl");
        let merged = dir.path().join("merged.txt");
        let poll = Duration::from_millis(1);
        let (ca, cb) = configs();
        let a = Worker::new(
            ca,
            list(&[]),
            FileTransport::new(&b_to_a, &a_to_b).with_poll_interval(poll),
            FileOutput::open(&merged).unwrap(),
        )
        .unwrap();
        let b = Worker::new(
            cb,
            list(&[4, 5]),
            FileTransport::new(&a_to_b, &b_to_a).with_poll_interval(poll),
            FileOutput::open(&merged).unwrap(),
        )
        .unwrap();
        let (ra, rb) = tokio::join!(tokio::spawn(a.run()), tokio::spawn(b.run()));
        let ra = ra.unwrap().unwrap();
        rb.unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(&merged).unwrap(), "4\n5\n");
        assert_eq!(ra.stats.messages_sent, 2);
        let sent_by_a = std::fs::read_to_string(&a_to_b).unwrap();
        assert_eq!(
            sent_by_a,
            "{\"msg_type\":\"RANG\",\"values\":[-1,-1,0]}\n{\"msg_type\":\"END\",\"values\":[]}\n"
        );
    }

    #[tokio::test]
    async fn stopped_file_worker_resumes_from_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let a_to_b = dir.path().join("a_to_b.jsonl");
        let b_to_a = dir.path().join("b_to_a.jsonl");
        let merged = dir.path().join("merged.txt");
        let state = dir.path().join("a.state");
        let poll = Duration::from_millis(1);
        let (ca, cb) = configs();

        let b = Worker::new(
            cb,
            list(&[2, 3, 6]),
            FileTransport::new(&a_to_b, &b_to_a).with_poll_interval(poll),
            FileOutput::open(&merged).unwrap(),
        )
        .unwrap();
        let b = tokio::spawn(b.run());

        let mut first = Worker::new(
            ca.clone(),
            list(&[1, 3, 5]),
            FileTransport::new(&b_to_a, &a_to_b).with_poll_interval(poll),
            FileOutput::<i64>::open(&merged).unwrap(),
        )
        .unwrap()
        .with_checkpoint(&state)
        .await
        .unwrap();
        first.begin().await.unwrap();
        assert!(!first.step().await.unwrap());
        assert!(!first.step().await.unwrap());
        drop(first);

        let saved = CheckpointFile::new(&state).load::<i64>().unwrap().unwrap();
        assert_eq!(saved.state.phase, Phase::Merge);
        assert_eq!(saved.stats.messages_received, 2);
        assert!(saved.inbox_offset.unwrap() > 0);

        let second = Worker::new(
            ca,
            list(&[1, 3, 5]),
            FileTransport::new(&b_to_a, &a_to_b).with_poll_interval(poll),
            FileOutput::open(&merged).unwrap(),
        )
        .unwrap()
        .with_checkpoint(&state)
        .await
        .unwrap();
        let ra = second.run().await.unwrap();
        let rb = b.await.unwrap().unwrap();

        assert_eq!(std::fs::read_to_string(&merged).unwrap(), "1\n2\n3\n3\n5\n6\n");
        assert_eq!(ra.phase, Phase::Done);
        assert_eq!(ra.stats.values_output + rb.stats.values_output, 6);
        let rangs = std::fs::read_to_string(&a_to_b).unwrap().matches("RANG").count();
        assert_eq!(rangs, 1);
    }

    #[tokio::test]
    async fn checkpoint_for_another_partner_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("a.state");
        let engine = MergeEngine::new(id("A"), list(&[1]), TieBreak::Priority);
        CheckpointFile::new(&state).save(&engine.checkpoint(&id("C"), None)).unwrap();

        let (ta, _tb) = MemoryTransport::pair();
        let a = Worker::new(WorkerConfig::new(id("A"), id("B")), list(&[1]), ta, Vec::new()).unwrap();
        let err = a.with_checkpoint(&state).await.err().unwrap();
        assert!(matches!(err, MergeError::Checkpoint(_)));
    }

    #[tokio::test]
    async fn memory_transport_cannot_resume_mid_merge() {
        let dir = tempfile::tempdir().unwrap();
        let state = dir.path().join("a.state");
        let mut engine = MergeEngine::new(id("A"), list(&[1]), TieBreak::Priority);
        engine.start().unwrap();
        engine.handle(Message::Rang(pairmerge_types::RangeSummary::empty())).unwrap();
        CheckpointFile::new(&state).save(&engine.checkpoint(&id("B"), Some(40))).unwrap();

        let (ta, _tb) = MemoryTransport::pair();
        let a = Worker::new(WorkerConfig::new(id("A"), id("B")), list(&[1]), ta, Vec::new()).unwrap();
        let err = a.with_checkpoint(&state).await.err().unwrap();
        assert!(matches!(err, MergeError::Channel(ChannelError::Unavailable(_))));
    }

    #[tokio::test]
    async fn silent_partner_triggers_stall() {
        let (ta, _tb) = MemoryTransport::pair();
        let config = WorkerConfig::new(id("A"), id("B")).with_stall_timeout(Duration::from_millis(20));
        let a = Worker::new(config, list(&[1]), ta, Vec::new()).unwrap();
        let err = a.run().await.unwrap_err();
        assert!(matches!(err, MergeError::Stall { .. }));
    }

    #[tokio::test]
    async fn vanished_partner_is_a_channel_error() {
        let (ta, tb) = MemoryTransport::pair();
        drop(tb);
        let a = Worker::new(WorkerConfig::new(id("A"), id("B")), list(&[1]), ta, Vec::new()).unwrap();
        let err = a.run().await.unwrap_err();
        assert!(err.is_partner_closed());
    }

    #[tokio::test]
    async fn malformed_partner_message_aborts() {
        let (ta, mut tb) = MemoryTransport::pair();
        tb.send_line("{\"msg_type\":\"RANG\",\"values\":[1]}").await.unwrap();
        let a = Worker::new(WorkerConfig::new(id("A"), id("B")), list(&[1]), ta, Vec::new()).unwrap();
        let err = a.run().await.unwrap_err();
        assert!(matches!(err, MergeError::Channel(ChannelError::Protocol(_))));
    }

    #[tokio::test]
    async fn out_of_phase_message_aborts() {
        let (ta, mut tb) = MemoryTransport::pair();
        tb.send_line("{\"msg_type\":\"TAKE\",\"values\":[]}").await.unwrap();
        let a = Worker::new(WorkerConfig::new(id("A"), id("B")), list(&[1]), ta, Vec::new()).unwrap();
        let err = a.run().await.unwrap_err();
        assert!(matches!(err, MergeError::Violation { phase: Phase::Init, .. }));
    }

    #[test]
    fn equal_ids_rejected_at_construction() {
        let (ta, _tb) = MemoryTransport::pair();
        let config = WorkerConfig::new(id("A"), id("A"));
        assert!(Worker::new(config, list(&[1]), ta, Vec::<i64>::new()).is_err());
    }
}
