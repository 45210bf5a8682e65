//! Page read transaction: the orchestrator a caller actually talks to.
//!
//! Bound to exactly one reader thread (see design note on thread affinity):
//! every method takes `&mut self`, there is no interior locking anywhere in
//! this module. Owns the [`PageReader`], the [`UberPage`] and the bound
//! [`RevisionRootPage`], the four caches for record/path/value/page lookups,
//! and an optional [`TransactionLog`]. `get_record` is the one operation
//! everything else exists to support: resolve a `NodeKey` to its
//! `RecordPageKey`, consult the log and caches, fall back to
//! `revisioning::collect_snapshot_leaves` + `combine` on a full miss.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::cache::PageCacheSet;
use crate::codec::ByteReader;
use crate::config::ResourceConfig;
use crate::error::{Result, SirixError};
use crate::io::{FilePageReader, PageReader};
use crate::page::indirect::IndirectPage;
use crate::page::kv::KeyValuePage;
use crate::page::uber::{RevisionRootPage, UberPage};
use crate::page::{record_page_key, IndexType, NodeKey, PageKey, RecordPageKey, Revision};
use crate::record::RecordSerializer;
use crate::revisioning::{self, RevisionSource};
use crate::txlog::{Container, LogPartition, TransactionLog};

/// A name-index disambiguator (element/attribute/namespace-prefix, in the
/// XQuery front-end this storage core serves). Opaque here: the name
/// subtree addresses purely by `NodeKey`, so `kind` is caller bookkeeping
/// only, never folded into the lookup key (index-controller policy is out
/// of scope for this crate).
pub type NameKind = u8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheLane {
    Record,
    Path,
    Value,
}

fn cache_lane_for(subtree: IndexType) -> CacheLane {
    match subtree {
        IndexType::Path | IndexType::PathSummary => CacheLane::Path,
        IndexType::Cas => CacheLane::Value,
        IndexType::Document | IndexType::ChangedNodes | IndexType::RecordToRevisions | IndexType::Name => {
            CacheLane::Record
        }
    }
}

fn log_partition_for(subtree: IndexType) -> LogPartition {
    match subtree {
        IndexType::Path | IndexType::PathSummary => LogPartition::Path,
        IndexType::Cas => LogPartition::Value,
        IndexType::Document | IndexType::ChangedNodes | IndexType::RecordToRevisions | IndexType::Name => {
            LogPartition::Node
        }
    }
}

pub struct PageReadTxn {
    reader: Box<dyn PageReader>,
    config: ResourceConfig,
    serializer: Arc<dyn RecordSerializer>,

    uber: UberPage,
    revision: Revision,
    revision_root: RevisionRootPage,
    revision_root_cache: HashMap<Revision, RevisionRootPage>,

    /// Indirect pages, cached by [`PageKey`]. Kept separate from the leaf
    /// caches (`PageCacheSet<Container>`) because it holds a different page
    /// variant and is never subject to TTL expiry: it stays unbounded for
    /// the life of the transaction.
    leaf_caches: PageCacheSet<Container>,
    meta_cache: HashMap<PageKey, IndirectPage>,

    log: Option<TransactionLog>,
    closed: bool,
}

impl PageReadTxn {
    /// Open the resource file at `resource_path`, load the uber page, and
    /// bind to `revision`. Opens a [`TransactionLog`] iff a `commit.inflight`
    /// marker sits next to `resource_path`.
    pub fn open(
        resource_path: &Path,
        revision: Revision,
        config: ResourceConfig,
        serializer: Arc<dyn RecordSerializer>,
    ) -> Result<Self> {
        let reader: Box<dyn PageReader> = Box::new(FilePageReader::open(resource_path)?);
        let log = TransactionLog::open(resource_path)?;
        Self::with_reader(reader, revision, config, serializer, log)
    }

    /// Construct directly from an already-open [`PageReader`], bypassing the
    /// file-sibling conventions `open` uses to find the uber page and the
    /// transaction log. The entry point tests (and any caller with its own
    /// resource-location scheme) use.
    pub fn with_reader(
        mut reader: Box<dyn PageReader>,
        revision: Revision,
        config: ResourceConfig,
        serializer: Arc<dyn RecordSerializer>,
        log: Option<TransactionLog>,
    ) -> Result<Self> {
        let uber_bytes = reader.read_page(0)?;
        let mut uber_reader = ByteReader::new(&uber_bytes, 0);
        let uber = UberPage::deserialize(&mut uber_reader)?;

        if revision < 0 || revision > uber.latest_revision() {
            return Err(SirixError::IllegalState(format!(
                "revision {revision} is not committed (latest is {})",
                uber.latest_revision()
            )));
        }

        let leaf_caches = PageCacheSet::new(&config);
        let mut txn = Self {
            reader,
            revision_root: RevisionRootPage::new(revision, 0, None, None),
            revision,
            uber,
            revision_root_cache: HashMap::new(),
            leaf_caches,
            meta_cache: HashMap::new(),
            log,
            closed: false,
            config,
            serializer,
        };
        txn.revision_root = txn.fetch_revision_root_page(revision)?;
        Ok(txn)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(SirixError::TransactionClosed);
        }
        Ok(())
    }

    #[must_use]
    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn uber_page(&self) -> Result<&UberPage> {
        self.ensure_open()?;
        Ok(&self.uber)
    }

    pub fn revision_root(&self) -> Result<&RevisionRootPage> {
        self.ensure_open()?;
        Ok(&self.revision_root)
    }

    /// Resolve `revision`'s root page, consulting `revision_root_cache`
    /// before descending the revision-root trie rooted at
    /// `uber.revision_root_trie_root()`. Shares the fanout exponents used
    /// by the per-subtree indirect tries; there is no dedicated exponent
    /// list for the revision-root trie itself (recorded as an Open Question
    /// decision in DESIGN.md).
    fn fetch_revision_root_page(&mut self, revision: Revision) -> Result<RevisionRootPage> {
        if let Some(cached) = self.revision_root_cache.get(&revision) {
            return Ok(cached.clone());
        }
        let exps = self.config.indirect_fanout_exponents.clone();
        let start = *self.uber.revision_root_trie_root();
        let leaf_ref = revisioning::dereference_leaf(&start, revision as u64, IndexType::Document, &exps, self)?
            .ok_or_else(|| SirixError::IllegalState(format!("no revision root for revision {revision}")))?;
        let page_key = leaf_ref
            .page_key()
            .ok_or_else(|| SirixError::IllegalState("revision root reference is unpersisted".to_string()))?;
        let bytes = self.reader.read_page(page_key)?;
        let mut rdr = ByteReader::new(&bytes, page_key);
        let root = RevisionRootPage::deserialize(&mut rdr)?;
        self.revision_root_cache.insert(revision, root.clone());
        Ok(root)
    }

    fn get_from_lane(&mut self, lane: CacheLane, key: PageKey) -> Option<Container> {
        match lane {
            CacheLane::Record => self.leaf_caches.record.get(&key),
            CacheLane::Path => self.leaf_caches.path.as_mut().and_then(|c| c.get(&key)),
            CacheLane::Value => self.leaf_caches.value.as_mut().and_then(|c| c.get(&key)),
        }
    }

    fn insert_into_lane(&mut self, lane: CacheLane, key: PageKey, value: Container) {
        match lane {
            CacheLane::Record => self.leaf_caches.record.insert(key, value),
            CacheLane::Path => {
                if let Some(c) = self.leaf_caches.path.as_mut() {
                    c.insert(key, value);
                }
            }
            CacheLane::Value => {
                if let Some(c) = self.leaf_caches.value.as_mut() {
                    c.insert(key, value);
                }
            }
        }
    }

    /// Resolve a `RecordPageKey` to its [`Container`]: cache, then log, then
    /// a full `collect_snapshot_leaves` + `combine` pass.
    fn load_container(&mut self, page_key: RecordPageKey, subtree: IndexType) -> Result<Container> {
        let lane = cache_lane_for(subtree);
        if let Some(container) = self.get_from_lane(lane, page_key) {
            log::debug!("cache hit for record page {page_key} ({subtree:?})");
            return Ok(container);
        }

        let partition = log_partition_for(subtree);
        if let Some(container) = self.log.as_ref().and_then(|log| log.get(partition, page_key).cloned()) {
            log::debug!("log hit for record page {page_key} ({subtree:?}), skipping combine");
            self.insert_into_lane(lane, page_key, container.clone());
            return Ok(container);
        }

        log::debug!("cache and log miss for record page {page_key} ({subtree:?}), combining snapshot leaves");
        let policy = self.config.revisioning.policy;
        let revisions_to_restore = self.config.revisioning.revisions_to_restore;
        let revision = self.revision;
        let leaves = revisioning::collect_snapshot_leaves(
            self,
            page_key,
            subtree,
            revision,
            policy,
            revisions_to_restore,
        )?;
        let container = match revisioning::combine(policy, leaves) {
            Some(leaf) => Container::Leaf(Box::new(leaf)),
            None => Container::Empty,
        };
        self.insert_into_lane(lane, page_key, container.clone());
        Ok(container)
    }

    /// Look up `node_key` in `subtree` at the bound revision. A tombstone
    /// record (a record whose payload encodes a deleted marker) is never
    /// returned: it surfaces as `None`, the same as an absent key.
    pub fn get_record(&mut self, node_key: NodeKey, subtree: IndexType) -> Result<Option<crate::record::Record>> {
        self.ensure_open()?;

        let exps = self.uber.page_count_exponents(subtree).to_vec();
        let total_bits: u32 = exps.iter().map(|&e| u32::from(e)).sum();
        let page_key = record_page_key(node_key);
        if total_bits < 64 && (page_key >> total_bits) != 0 {
            return Err(SirixError::UnsupportedKey(node_key));
        }

        let container = match self.load_container(page_key, subtree) {
            Ok(c) => c,
            Err(e) => {
                log::error!("get_record({node_key}, {subtree:?}) failed resolving page {page_key}: {e}");
                return Err(e);
            }
        };
        match container {
            Container::Empty => Ok(None),
            Container::Leaf(mut leaf) => {
                let record = leaf.get(node_key, self.reader.as_mut(), self.serializer.as_ref()).map_err(|e| {
                    log::error!("get_record({node_key}, {subtree:?}) failed decoding record: {e}");
                    e
                })?;
                Ok(record.filter(|r| !r.is_tombstone()))
            }
        }
    }

    fn decode_name_record(&mut self, name_key: NodeKey) -> Result<Option<(u64, Vec<u8>)>> {
        let Some(record) = self.get_record(name_key, IndexType::Name)? else {
            return Ok(None);
        };
        let mut reader = ByteReader::new(record.payload(), name_key);
        let count = reader.read_varint_u64()?;
        let remaining = reader.remaining();
        let bytes = reader.read_bytes(remaining)?.to_vec();
        Ok(Some((count, bytes)))
    }

    /// The UTF-8 name stored at `name_key`, or `None` if the key is absent.
    /// `kind` is accepted for API parity with the out-of-scope index
    /// controller but does not participate in the lookup (see [`NameKind`]).
    pub fn name(&mut self, name_key: NodeKey, _kind: NameKind) -> Result<Option<String>> {
        self.ensure_open()?;
        match self.decode_name_record(name_key)? {
            Some((_, bytes)) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }

    /// The raw bytes of the name stored at `name_key`, without the UTF-8
    /// decode `name` performs.
    pub fn raw_name(&mut self, name_key: NodeKey, _kind: NameKind) -> Result<Option<Vec<u8>>> {
        self.ensure_open()?;
        Ok(self.decode_name_record(name_key)?.map(|(_, bytes)| bytes))
    }

    /// Number of times the name at `name_key` occurs, or `0` if absent.
    pub fn name_count(&mut self, name_key: NodeKey, _kind: NameKind) -> Result<u32> {
        self.ensure_open()?;
        Ok(self
            .decode_name_record(name_key)?
            .map_or(0, |(count, _)| crate::utils::num::usize_to_u32_saturating(count as usize)))
    }

    /// Invalidate every cache and truncate the transaction log.
    pub fn clear_caches(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.leaf_caches.clear_all();
        self.meta_cache.clear();
        self.revision_root_cache.clear();
        if let Some(log) = &mut self.log {
            log.clear();
        }
        Ok(())
    }

    /// Close the reader and the transaction log. Idempotent; every
    /// operation after the first successful `close` fails with
    /// `TransactionClosed`.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if let Some(log) = self.log.take() {
            log.close()?;
        }
        self.closed = true;
        Ok(())
    }
}

impl RevisionSource for PageReadTxn {
    fn uber_page(&self) -> &UberPage {
        &self.uber
    }

    fn load_revision_root(&mut self, revision: Revision) -> Result<RevisionRootPage> {
        self.fetch_revision_root_page(revision)
    }

    fn load_indirect(&mut self, page_key: PageKey, index_type: IndexType, fanout: usize) -> Result<IndirectPage> {
        if let Some(page) = self.meta_cache.get(&page_key) {
            if page.fanout() == fanout {
                return Ok(page.clone());
            }
        }
        let bytes = self.reader.read_page(page_key)?;
        let mut rdr = ByteReader::new(&bytes, page_key);
        let page = IndirectPage::deserialize(&mut rdr, fanout, index_type, page_key)?;
        self.meta_cache.insert(page_key, page.clone());
        Ok(page)
    }

    fn load_leaf(&mut self, page_key: PageKey, index_type: IndexType) -> Result<KeyValuePage> {
        let bytes = self.reader.read_page(page_key)?;
        let mut rdr = ByteReader::new(&bytes, page_key);
        KeyValuePage::deserialize(&mut rdr, index_type, page_key, &self.config, self.serializer.as_ref())
    }
}

impl Drop for PageReadTxn {
    /// Release every exit path, including an unwinding panic (design note:
    /// "every exit path ... must release them"). `close` is infallible
    /// after its first success, so a best-effort call here never panics in
    /// turn.
    fn drop(&mut self) {
        let _ = self.close();
    }
}
