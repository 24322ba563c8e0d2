use std::time::Duration;

use pairmerge_channel::MemoryTransport;
use pairmerge_types::{MergeValue, SortedList, WorkerId};
use tokio::task::JoinError;
use tracing::info;

use crate::config::WorkerConfig;
use crate::error::{MergeError, MergeResult};
use crate::output::SharedOutput;
use crate::worker::{Worker, WorkerReport};

/// Stall timeout applied by [`run_pair`].
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of merging two lists in-process.
#[derive(Clone, Debug)]
pub struct PairOutcome<V> {
    pub merged: Vec<V>,
    pub left: WorkerReport,
    pub right: WorkerReport,
}

/// Merge two sorted lists with two workers, "A" and "B", in this runtime.
pub async fn run_pair<V: MergeValue>(left: SortedList<V>, right: SortedList<V>) -> MergeResult<PairOutcome<V>> {
    let a = WorkerId::new("A").map_err(|e| MergeError::Config(e.to_string()))?;
    let b = WorkerId::new("B").map_err(|e| MergeError::Config(e.to_string()))?;
    let left_config = WorkerConfig::new(a.clone(), b.clone()).with_stall_timeout(DEFAULT_STALL_TIMEOUT);
    let right_config = WorkerConfig::new(b, a).with_stall_timeout(DEFAULT_STALL_TIMEOUT);
    run_pair_with(left_config, left, right_config, right).await
}

/// Like [`run_pair`], with caller-supplied configurations.
///
/// Both workers share one [`SharedOutput`]. When both fail, the error that is
/// not just "partner went away" is returned, since that one names the cause.
pub async fn run_pair_with<V: MergeValue>(
    left_config: WorkerConfig,
    left: SortedList<V>,
    right_config: WorkerConfig,
    right: SortedList<V>,
) -> MergeResult<PairOutcome<V>> {
    if left_config.partner != right_config.id || right_config.partner != left_config.id {
        return Err(MergeError::Config(format!(
            "workers {} and {} do not name each other as partners",
            left_config.id, right_config.id
        )));
    }
    let (left_transport, right_transport) = MemoryTransport::pair();
    let output = SharedOutput::new();
    let left_worker = Worker::new(left_config, left, left_transport, output.clone())?;
    let right_worker = Worker::new(right_config, right, right_transport, output.clone())?;

    let (left_joined, right_joined) =
        tokio::join!(tokio::spawn(left_worker.run()), tokio::spawn(right_worker.run()));
    let (left_report, right_report) = match (flatten(left_joined), flatten(right_joined)) {
        (Ok(l), Ok(r)) => (l, r),
        (Err(e), Ok(_)) | (Ok(_), Err(e)) => return Err(e),
        (Err(l), Err(r)) => return Err(if l.is_partner_closed() { r } else { l }),
    };

    let merged = output.snapshot()?;
    info!(
        values = merged.len(),
        left_sent = left_report.stats.messages_sent,
        right_sent = right_report.stats.messages_sent,
        "pair merge complete"
    );
    Ok(PairOutcome { merged, left: left_report, right: right_report })
}

fn flatten(joined: Result<MergeResult<WorkerReport>, JoinError>) -> MergeResult<WorkerReport> {
    joined.map_err(|e| MergeError::Join(e.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairmerge_types::{Phase, TieBreak};

    fn list(v: &[i64]) -> SortedList<i64> {
        SortedList::new(v.to_vec()).unwrap()
    }

    fn id(s: &str) -> WorkerId {
        WorkerId::new(s).unwrap()
    }

    #[tokio::test]
    async fn merges_interleaved_lists() {
        let outcome = run_pair(list(&[1, 3, 5]), list(&[2, 3, 6])).await.unwrap();
        assert_eq!(outcome.merged, vec![1, 2, 3, 3, 5, 6]);
        assert_eq!(outcome.left.phase, Phase::Done);
        assert_eq!(outcome.right.phase, Phase::Done);
    }

    #[tokio::test]
    async fn merges_with_one_side_empty() {
        let outcome = run_pair(list(&[]), list(&[4, 5])).await.unwrap();
        assert_eq!(outcome.merged, vec![4, 5]);
        assert_eq!(outcome.left.stats.messages_sent, 2);
        assert_eq!(outcome.left.stats.values_output, 0);
        assert_eq!(outcome.right.stats.values_output, 2);
    }

    #[tokio::test]
    async fn merges_both_empty() {
        let outcome = run_pair::<i64>(list(&[]), list(&[])).await.unwrap();
        assert!(outcome.merged.is_empty());
    }

    #[tokio::test]
    async fn merges_strings() {
        let left = SortedList::new(vec!["apple".to_string(), "pear".to_string()]).unwrap();
        let right = SortedList::new(vec!["fig".to_string()]).unwrap();
        let outcome = run_pair(left, right).await.unwrap();
        assert_eq!(outcome.merged, vec!["apple", "fig", "pear"]);
    }

    #[tokio::test]
    async fn explicit_tie_break_reversed() {
        let outcome = run_pair_with(
            WorkerConfig::new(id("A"), id("B")).with_tie_break(TieBreak::Defer),
            list(&[3, 3]),
            WorkerConfig::new(id("B"), id("A")).with_tie_break(TieBreak::Priority),
            list(&[3]),
        )
        .await
        .unwrap();
        assert_eq!(outcome.merged, vec![3, 3, 3]);
        assert_eq!(outcome.left.tie_break, TieBreak::Defer);
    }

    #[tokio::test]
    async fn misconfigured_tie_break_is_reported() {
        let err = run_pair_with(
            WorkerConfig::new(id("A"), id("B")).with_tie_break(TieBreak::Defer),
            list(&[5]),
            WorkerConfig::new(id("B"), id("A")).with_tie_break(TieBreak::Defer),
            list(&[5]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MergeError::Violation { .. }), "got {err}");
    }

    #[tokio::test]
    async fn mismatched_partners_rejected() {
        let err = run_pair_with(
            WorkerConfig::new(id("A"), id("B")),
            list(&[1]),
            WorkerConfig::new(id("C"), id("A")),
            list(&[2]),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MergeError::Config(_)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn sorted() -> impl Strategy<Value = Vec<i64>> {
            proptest::collection::vec(-50i64..50, 0..16).prop_map(|mut v| {
                v.sort();
                v
            })
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn async_workers_agree_with_sort(a in sorted(), b in sorted()) {
                let rt = tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .enable_all()
                    .build()
                    .unwrap();
                let outcome = rt
                    .block_on(run_pair(SortedList::new(a.clone()).unwrap(), SortedList::new(b.clone()).unwrap()))
                    .unwrap();
                let mut expected = [a.clone(), b.clone()].concat();
                expected.sort();
                prop_assert_eq!(outcome.merged, expected);
                let bound = (a.len() + b.len() + 2) as u64;
                prop_assert!(outcome.left.stats.messages_sent <= bound);
                prop_assert!(outcome.right.stats.messages_sent <= bound);
            }
        }
    }
}
