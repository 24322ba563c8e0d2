use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use pairmerge_types::{TieBreak, WorkerId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MergeError, MergeResult};
use crate::state::WorkerLocalState;
use crate::stats::WorkerStats;

/// Everything a worker needs to continue after a restart.
///
/// The input list itself is not stored; the restarted worker loads it again
/// and `list_len` guards against a different list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCheckpoint<V> {
    pub worker: WorkerId,
    pub partner: WorkerId,
    pub tie_break: TieBreak,
    pub list_len: usize,
    pub state: WorkerLocalState<V>,
    pub stats: WorkerStats,
    /// Transport position just past the last message handled.
    pub inbox_offset: Option<u64>,
}

/// JSON checkpoint file, replaced whole on every save.
#[derive(Clone, Debug)]
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored checkpoint, or `None` when no file exists yet.
    pub fn load<V: DeserializeOwned>(&self) -> MergeResult<Option<WorkerCheckpoint<V>>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.error(e)),
        };
        serde_json::from_str(&raw).map(Some).map_err(|e| self.error(e))
    }

    /// Write to a sibling temp file, sync, then rename over the old checkpoint.
    pub fn save<V: Serialize>(&self, checkpoint: &WorkerCheckpoint<V>) -> MergeResult<()> {
        let json = serde_json::to_vec(checkpoint).map_err(|e| self.error(e))?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut file = File::create(&tmp).map_err(|e| self.error(e))?;
        file.write_all(&json).and_then(|_| file.sync_all()).map_err(|e| self.error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.error(e))?;
        debug!(
            path = %self.path.display(),
            phase = %checkpoint.state.phase,
            cursor = checkpoint.state.cursor,
            inbox_offset = ?checkpoint.inbox_offset,
            "checkpoint saved"
        );
        Ok(())
    }

    fn error(&self, e: impl std::fmt::Display) -> MergeError {
        MergeError::Checkpoint(format!("{}: {e}", self.path.display()))
    }
}
