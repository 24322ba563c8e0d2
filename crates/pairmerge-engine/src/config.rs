use std::path::Path;
use std::time::Duration;

use pairmerge_types::{TieBreak, WorkerId};
use serde::{Deserialize, Serialize};

use crate::error::{MergeError, MergeResult};

/// Startup configuration for one worker.
///
/// ```toml
/// id = "A"
/// partner = "B"
/// tie_break = "priority"     # optional; defaults to the smaller id winning
/// stall_timeout_ms = 5000    # optional; no timeout when absent
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    pub id: WorkerId,
    pub partner: WorkerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tie_break: Option<TieBreak>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stall_timeout_ms: Option<u64>,
}

impl WorkerConfig {
    pub fn new(id: WorkerId, partner: WorkerId) -> Self {
        Self { id, partner, tie_break: None, stall_timeout_ms: None }
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = Some(tie_break);
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout_ms = Some(timeout.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    pub fn stall_timeout(&self) -> Option<Duration> {
        self.stall_timeout_ms.map(Duration::from_millis)
    }

    /// The tie-break rule this worker runs with.
    ///
    /// An explicit setting wins; otherwise the smaller id has priority.
    pub fn resolve_tie_break(&self) -> MergeResult<TieBreak> {
        self.validate()?;
        match self.tie_break {
            Some(explicit) => Ok(explicit),
            None => TieBreak::by_identity(&self.id, &self.partner)
                .ok_or_else(|| MergeError::Config("worker and partner ids are equal".into())),
        }
    }

    pub fn validate(&self) -> MergeResult<()> {
        if self.id == self.partner {
            return Err(MergeError::Config(format!("worker and partner share the id {}", self.id)));
        }
        if self.stall_timeout_ms == Some(0) {
            return Err(MergeError::Config("stall_timeout_ms must be positive".into()));
        }
        Ok(())
    }

    pub fn from_toml_str(s: &str) -> MergeResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| MergeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> MergeResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MergeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> MergeResult<String> {
        toml::to_string(self).map_err(|e| MergeError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> WorkerId {
        WorkerId::new(s).unwrap()
    }

    #[test]
    fn tie_break_derived_from_ids() {
        let a = WorkerConfig::new(id("A"), id("B"));
        let b = WorkerConfig::new(id("B"), id("A"));
        assert_eq!(a.resolve_tie_break().unwrap(), TieBreak::Priority);
        assert_eq!(b.resolve_tie_break().unwrap(), TieBreak::Defer);
    }

    #[test]
    fn explicit_tie_break_wins() {
        let a = WorkerConfig::new(id("A"), id("B")).with_tie_break(TieBreak::Defer);
        assert_eq!(a.resolve_tie_break().unwrap(), TieBreak::Defer);
    }

    #[test]
    fn equal_ids_rejected() {
        let c = WorkerConfig::new(id("A"), id("A"));
        assert!(matches!(c.resolve_tie_break(), Err(MergeError::Config(_))));
    }

    #[test]
    fn parse_toml() {
        let c = WorkerConfig::from_toml_str(
            r#"
            id = "left"
            partner = "right"
            tie_break = "defer"
            stall_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(c.id, id("left"));
        assert_eq!(c.tie_break, Some(TieBreak::Defer));
        assert_eq!(c.stall_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn parse_minimal_toml() {
        let c = WorkerConfig::from_toml_str("id = \"B\"\npartner = \"A\"\n").unwrap();
        assert_eq!(c.tie_break, None);
        assert_eq!(c.stall_timeout(), None);
    }

    #[test]
    fn reject_bad_toml() {
        assert!(WorkerConfig::from_toml_str("id = \"A\"\n").is_err());
        assert!(WorkerConfig::from_toml_str("id = \"A\"\npartner = \"A\"\n").is_err());
        assert!(WorkerConfig::from_toml_str("id = \"A\"\npartner = \"B\"\nstall_timeout_ms = 0\n").is_err());
        assert!(WorkerConfig::from_toml_str("id = \"A\"\npartner = \"B\"\ncolour = 1\n").is_err());
        assert!(WorkerConfig::from_toml_str("id = \"\"\npartner = \"B\"\n").is_err());
    }

    #[test]
    fn toml_roundtrip_and_load() {
        let c = WorkerConfig::new(id("A"), id("B")).with_stall_timeout(Duration::from_secs(2));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worker.toml");
        std::fs::write(&path, c.to_toml_string().unwrap()).unwrap();
        assert_eq!(WorkerConfig::load(&path).unwrap(), c);
        assert!(WorkerConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
