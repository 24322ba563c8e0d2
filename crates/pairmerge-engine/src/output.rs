use std::fs::{File, OpenOptions};
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::error::{MergeError, MergeResult};

/// Append-only sink for merged values.
///
/// A sink only records what it is given. Exactly-once emission is the
/// engine's job, not the sink's.
pub trait MergedOutput<V>: Send {
    fn append(&mut self, value: &V) -> MergeResult<()>;
}

impl<V: Clone + Send> MergedOutput<V> for Vec<V> {
    fn append(&mut self, value: &V) -> MergeResult<()> {
        self.push(value.clone());
        Ok(())
    }
}

/// In-memory log shared by both workers of one process.
///
/// Clones share the same log; the mutex serializes appends.
#[derive(Debug)]
pub struct SharedOutput<V> {
    log: Arc<Mutex<Vec<V>>>,
}

impl<V> Clone for SharedOutput<V> {
    fn clone(&self) -> Self {
        Self { log: Arc::clone(&self.log) }
    }
}

impl<V> Default for SharedOutput<V> {
    fn default() -> Self {
        Self { log: Arc::new(Mutex::new(Vec::new())) }
    }
}

impl<V: Clone> SharedOutput<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything appended so far, in append order.
    pub fn snapshot(&self) -> MergeResult<Vec<V>> {
        let log = self.log.lock().map_err(|_| MergeError::Output("output lock poisoned".into()))?;
        Ok(log.clone())
    }
}

impl<V: Clone + Send> MergedOutput<V> for SharedOutput<V> {
    fn append(&mut self, value: &V) -> MergeResult<()> {
        let mut log = self.log.lock().map_err(|_| MergeError::Output("output lock poisoned".into()))?;
        log.push(value.clone());
        Ok(())
    }
}

/// Appends one JSON-encoded value per line to a file.
///
/// Two worker processes may share the same path: each line is written with a
/// single append, and the protocol never has both workers emitting at once.
pub struct FileOutput<V> {
    path: PathBuf,
    file: File,
    _values: PhantomData<fn(&V)>,
}

impl<V> FileOutput<V> {
    pub fn open(path: impl AsRef<Path>) -> MergeResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MergeError::Output(format!("{}: {e}", path.display())))?;
        Ok(Self { path, file, _values: PhantomData })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<V: Serialize> MergedOutput<V> for FileOutput<V> {
    fn append(&mut self, value: &V) -> MergeResult<()> {
        let mut line = serde_json::to_string(value).map_err(|e| MergeError::Output(e.to_string()))?;
        line.push('\n');
        self.file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
            .map_err(|e| MergeError::Output(format!("{}: {e}", self.path.display())))
    }
}
