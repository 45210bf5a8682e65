//! Transaction log: on-disk staging cache for uncommitted pages,
//! partitioned by record kind. Modeled as `Option<TransactionLog>` at the
//! call site (design note: absence means "all data is in the main file";
//! never allocate an empty log). Opened only when a `commit.inflight`
//! marker file is present next to the resource file.
//!
//! Persisted through `bincode`'s serde bridge, the same convention used
//! throughout this crate for internal staging structures that are not part
//! of the externally specified page layout.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bincode::config::{standard, Configuration};
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SirixError};
use crate::page::kv::KeyValuePage;
use crate::page::PageKey;

pub const COMMIT_INFLIGHT_MARKER: &str = "commit.inflight";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogPartition {
    Page,
    Node,
    Path,
    Value,
}

/// A staged entry: either a fully-formed leaf, or a sentinel recording that
/// the key is known to be logically empty (so a combine doesn't have to
/// fall through to the persisted file to find that out).
#[derive(Debug, Clone)]
pub enum Container {
    Leaf(Box<KeyValuePage>),
    Empty,
}

/// On-disk representation, kept separate from `Container` because
/// `KeyValuePage`'s own wire format is the hand-rolled layout from
/// `page::kv`, not something `bincode`'s serde bridge should touch directly.
#[derive(Debug, Serialize, Deserialize)]
struct StagedEntry {
    partition: LogPartition,
    page_key: PageKey,
    is_empty: bool,
}

/// Per-kind staging store backed by a temporary file. The in-memory map is
/// authoritative during a transaction; `persist`/`load` round-trip it to
/// disk so a long-running write transaction can survive a process restart
/// without losing uncommitted work (write-path concern, exercised here only
/// for the file-format contract the read side must be able to open).
pub struct TransactionLog {
    backing_path: PathBuf,
    entries: HashMap<(LogPartition, PageKey), Container>,
    serializer_config: Configuration,
}

impl TransactionLog {
    /// Open the log iff `resource_path`'s sibling `commit.inflight` marker
    /// exists; otherwise `Ok(None)` (never allocate an empty log).
    pub fn open(resource_path: &Path) -> Result<Option<Self>> {
        let marker = marker_path(resource_path);
        if !marker.exists() {
            return Ok(None);
        }
        let backing_path = backing_path(resource_path);
        let mut log =
            Self { backing_path: backing_path.clone(), entries: HashMap::new(), serializer_config: standard() };
        if backing_path.exists() {
            log.load()?;
        }
        Ok(Some(log))
    }

    fn load(&mut self) -> Result<()> {
        let bytes = std::fs::read(&self.backing_path)?;
        if bytes.is_empty() {
            return Ok(());
        }
        let (staged, _): (Vec<StagedEntry>, usize) = decode_from_slice(&bytes, self.serializer_config)
            .map_err(|e| SirixError::CorruptPage { page_key: 0, reason: format!("transaction log decode failed: {e}") })?;
        for entry in staged {
            // Only `Empty` sentinels survive a restart: reconstructing a
            // `Leaf` container needs the `IndexType`/`ResourceConfig` that
            // produced it, which this file format does not carry. A real
            // leaf left mid-commit when the process died is recovered by
            // replaying the write path, not by this log.
            if !entry.is_empty {
                continue;
            }
            self.entries.insert((entry.partition, entry.page_key), Container::Empty);
        }
        Ok(())
    }

    #[must_use]
    pub fn get(&self, partition: LogPartition, page_key: PageKey) -> Option<&Container> {
        self.entries.get(&(partition, page_key))
    }

    pub fn put(&mut self, partition: LogPartition, page_key: PageKey, container: Container) {
        self.entries.insert((partition, page_key), container);
    }

    pub fn put_all(&mut self, entries: impl IntoIterator<Item = (LogPartition, PageKey, Container)>) {
        for (partition, page_key, container) in entries {
            self.put(partition, page_key, container);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Flush the `Empty`-sentinel subset of the log to the backing file (see
    /// the note on `load` for why `Leaf` containers don't round-trip here).
    pub fn persist(&self) -> Result<()> {
        let staged: Vec<StagedEntry> = self
            .entries
            .iter()
            .filter_map(|((partition, page_key), container)| match container {
                Container::Empty => Some(StagedEntry { partition: *partition, page_key: *page_key, is_empty: true }),
                Container::Leaf(_) => None,
            })
            .collect();
        let bytes = encode_to_vec(&staged, self.serializer_config)
            .map_err(|e| SirixError::IllegalState(format!("transaction log encode failed: {e}")))?;
        std::fs::write(&self.backing_path, bytes)?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.persist()?;
        self.clear();
        Ok(())
    }
}

fn marker_path(resource_path: &Path) -> PathBuf {
    resource_path.with_file_name(COMMIT_INFLIGHT_MARKER)
}

fn backing_path(resource_path: &Path) -> PathBuf {
    resource_path.with_extension("txlog")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::page::IndexType;
    use crate::record::Record;

    #[test]
    fn absent_marker_means_no_log() {
        let dir = tempfile::tempdir().unwrap();
        let resource = dir.path().join("resource.sirix");
        std::fs::write(&resource, b"").unwrap();
        assert!(TransactionLog::open(&resource).unwrap().is_none());
    }

    #[test]
    fn marker_present_opens_an_empty_log() {
        let dir = tempfile::tempdir().unwrap();
        let resource = dir.path().join("resource.sirix");
        std::fs::write(&resource, b"").unwrap();
        std::fs::write(marker_path(&resource), b"").unwrap();

        let log = TransactionLog::open(&resource).unwrap().unwrap();
        assert!(log.get(LogPartition::Node, 0).is_none());
    }

    #[test]
    fn s6_log_entry_takes_precedence_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let resource = dir.path().join("resource.sirix");
        std::fs::write(&resource, b"").unwrap();
        std::fs::write(marker_path(&resource), b"").unwrap();

        let mut log = TransactionLog::open(&resource).unwrap().unwrap();
        let config = ResourceConfig::default();
        let mut leaf = KeyValuePage::new(0, IndexType::Document, 0, &config);
        leaf.put(1, Record::new(1, b"logged".to_vec())).unwrap();
        log.put(LogPartition::Node, 0, Container::Leaf(Box::new(leaf)));

        match log.get(LogPartition::Node, 0) {
            Some(Container::Leaf(leaf)) => {
                let (_, record) = leaf.entries().find(|(k, _)| **k == 1).unwrap();
                assert_eq!(record.payload(), b"logged");
            }
            other => panic!("expected a logged leaf, got {other:?}"),
        }
    }

    #[test]
    fn clear_empties_every_partition() {
        let dir = tempfile::tempdir().unwrap();
        let resource = dir.path().join("resource.sirix");
        std::fs::write(&resource, b"").unwrap();
        std::fs::write(marker_path(&resource), b"").unwrap();
        let mut log = TransactionLog::open(&resource).unwrap().unwrap();
        log.put(LogPartition::Page, 5, Container::Empty);
        log.clear();
        assert!(log.get(LogPartition::Page, 5).is_none());
    }
}
