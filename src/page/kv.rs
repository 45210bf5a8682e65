//! Key-value leaf page: the central component of the page hierarchy.
//!
//! Holds up to `NDP_NODE_COUNT` records for one contiguous key range:
//! inline `slots`, `overflow_refs` for oversized payloads, and (when the
//! resource stores dewey ids) a `dewey_index` used to reorder serialization
//! so that dewey-bearing records can be delta-compressed against their
//! lexicographic predecessor.

use std::collections::HashMap;

use crate::codec::{must_fit_usize, BitSet, ByteBuffer, ByteReader};
use crate::error::{Result, SirixError};
use crate::io::PageReader;
use crate::page::overflow::OverflowPage;
use crate::page::reference::{PageReference, PageReferenceTarget};
use crate::page::{IndexType, NodeKey, PageArena, PageKey, RecordPageKey, Revision};
use crate::record::{Record, RecordSerializer};

#[derive(Debug, Clone)]
pub struct KeyValuePage {
    record_page_key: RecordPageKey,
    revision: Revision,
    index_type: IndexType,
    node_count: u32,
    max_record_size: u32,
    store_dewey_ids: bool,

    records: HashMap<NodeKey, Record>,
    slots: HashMap<NodeKey, Vec<u8>>,
    overflow_refs: HashMap<NodeKey, PageReference>,
    /// Dewey ids for inline-sized records only. A record that overflows
    /// keeps its entry here in memory, but the wire format has no dewey-id
    /// field for `overflow_refs` entries, so the id does not survive a
    /// serialize/deserialize round trip (see `classify_dirty_records`).
    dewey_index: HashMap<NodeKey, Vec<u8>>,

    cached_bytes: Option<Vec<u8>>,
    content_hash: Option<u32>,
    dirty: bool,
}

impl KeyValuePage {
    #[must_use]
    pub fn new(
        record_page_key: RecordPageKey,
        index_type: IndexType,
        revision: Revision,
        config: &crate::config::ResourceConfig,
    ) -> Self {
        Self {
            record_page_key,
            revision,
            index_type,
            node_count: config.node_count(),
            max_record_size: config.max_record_size,
            store_dewey_ids: config.store_dewey_ids,
            records: HashMap::new(),
            slots: HashMap::new(),
            overflow_refs: HashMap::new(),
            dewey_index: HashMap::new(),
            cached_bytes: None,
            content_hash: None,
            dirty: false,
        }
    }

    #[must_use]
    pub fn record_page_key(&self) -> RecordPageKey {
        self.record_page_key
    }

    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }

    #[must_use]
    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    #[must_use]
    pub fn overflow_refs(&self) -> &HashMap<NodeKey, PageReference> {
        &self.overflow_refs
    }

    #[must_use]
    pub fn slots(&self) -> &HashMap<NodeKey, Vec<u8>> {
        &self.slots
    }

    /// Content hash of the last serialized form (crc32 of the bytes). TODO:
    /// the source this design is drawn from computes an equivalent hash and
    /// immediately discards it before it reaches anything that reads it; the
    /// intended consumer is unknown, so this is left unwired rather than
    /// guessed at.
    #[must_use]
    pub fn content_hash(&self) -> Option<u32> {
        self.content_hash
    }

    /// Layer `older`'s entries into `self` for any key `self` does not
    /// already have, in any of `records`/`slots`/`overflow_refs`/
    /// `dewey_index`. Used by `revisioning::combine` to merge a chain of
    /// leaves latest-first: `self` is always the newer side and always
    /// wins on overlap.
    pub(crate) fn layer_missing_from(&mut self, older: &KeyValuePage) {
        let present: std::collections::HashSet<NodeKey> = self
            .slots
            .keys()
            .chain(self.overflow_refs.keys())
            .chain(self.records.keys())
            .copied()
            .collect();
        for (&key, bytes) in &older.slots {
            if !present.contains(&key) {
                self.slots.insert(key, bytes.clone());
            }
        }
        for (&key, oref) in &older.overflow_refs {
            if !present.contains(&key) {
                self.overflow_refs.insert(key, *oref);
            }
        }
        for (&key, record) in &older.records {
            if !present.contains(&key) {
                self.records.insert(key, record.clone());
            }
        }
        for (&key, id) in &older.dewey_index {
            if !present.contains(&key) {
                self.dewey_index.insert(key, id.clone());
            }
        }
    }

    fn assert_same_record_page(&self, key: NodeKey) -> Result<()> {
        if key >> self.node_count.trailing_zeros() != self.record_page_key {
            return Err(SirixError::IllegalState(format!(
                "node key {key} does not belong to record page {}",
                self.record_page_key
            )));
        }
        Ok(())
    }

    /// `records[key]` if materialized, else decode from `overflow_refs` via
    /// `reader` and memoize. Returns `None` if the key is absent entirely.
    pub fn get(
        &mut self,
        key: NodeKey,
        reader: &mut dyn PageReader,
        serializer: &dyn RecordSerializer,
    ) -> Result<Option<Record>> {
        if let Some(record) = self.records.get(&key) {
            return Ok(Some(record.clone()));
        }
        if let Some(oref) = self.overflow_refs.get(&key).copied() {
            let page_key = match oref.target() {
                Some(PageReferenceTarget::Persisted(pk)) => pk,
                _ => {
                    return Err(SirixError::DanglingReference { node_key: key, page_key: 0 });
                }
            };
            let bytes = reader.read_overflow(page_key).map_err(|_| {
                log::warn!("overflow reference for node {key} points at unreachable page {page_key}");
                SirixError::DanglingReference { node_key: key, page_key }
            })?;
            let mut overflow_reader = ByteReader::new(&bytes, page_key);
            let overflow = OverflowPage::deserialize(&mut overflow_reader, page_key)?;
            let dewey_id = self.dewey_index.get(&key).cloned();
            let mut record_reader = ByteReader::new(overflow.data(), page_key);
            let record = serializer.deserialize(key, dewey_id, &mut record_reader)?;
            self.records.insert(key, record.clone());
            return Ok(Some(record));
        }
        Ok(None)
    }

    /// View over materialized records. Does not trigger overflow loads.
    pub fn entries(&self) -> impl Iterator<Item = (&NodeKey, &Record)> {
        self.records.iter()
    }

    /// Insert/replace `record` under `key`. Marks the page dirty so the next
    /// `serialize` reclassifies it into `slots` or `overflow_refs`.
    pub fn put(&mut self, key: NodeKey, record: Record) -> Result<()> {
        self.assert_same_record_page(key)?;
        if self.store_dewey_ids {
            match record.dewey_id() {
                Some(id) => {
                    self.dewey_index.insert(key, id.to_vec());
                }
                None => {
                    self.dewey_index.remove(&key);
                }
            }
        }
        self.slots.remove(&key);
        self.overflow_refs.remove(&key);
        self.records.insert(key, record);
        self.dirty = true;
        self.cached_bytes = None;
        Ok(())
    }

    /// Drop the cached serialized form, freeing memory after a commit.
    /// Semantically a no-op: the next `serialize` simply recomputes.
    pub fn clear_bytes(&mut self) {
        self.cached_bytes = None;
    }

    /// Hand each still-in-memory overflow page to `writer` for persistence,
    /// replacing the reference with the resulting `PageKey`.
    pub fn commit(&mut self, arena: &mut PageArena, writer: &mut dyn FnMut(&[u8]) -> Result<PageKey>) -> Result<()> {
        for oref in self.overflow_refs.values_mut() {
            if let Some(PageReferenceTarget::InMemory(handle)) = oref.target() {
                let Some(crate::page::Page::Overflow(page)) = arena.get(handle) else {
                    return Err(SirixError::IllegalState(
                        "overflow reference points at a non-overflow arena entry".to_string(),
                    ));
                };
                let mut buf = ByteBuffer::new();
                page.serialize(&mut buf);
                let page_key = writer(buf.as_slice())?;
                *oref = PageReference::persisted(oref.index_type, page_key);
            }
        }
        Ok(())
    }

    fn classify_dirty_records(&mut self, arena: &mut PageArena, serializer: &dyn RecordSerializer) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let keys: Vec<NodeKey> = self.records.keys().copied().collect();
        for key in keys {
            if self.slots.contains_key(&key) || self.overflow_refs.contains_key(&key) {
                continue;
            }
            let record = self.records.get(&key).expect("key from self.records");
            let mut scratch = ByteBuffer::new();
            serializer.serialize(record, &mut scratch)?;
            let bytes = scratch.into_vec();
            if bytes.len() as u32 > self.max_record_size {
                log::trace!(
                    "record {key} in page {} is {} bytes (> {}), routing to overflow",
                    self.record_page_key,
                    bytes.len(),
                    self.max_record_size
                );
                if self.dewey_index.contains_key(&key) {
                    // The on-disk layout has no field for an overflow entry's
                    // dewey id (only the inline dewey-ordered section carries
                    // one), so this record's dewey id does not survive a
                    // serialize/deserialize round trip.
                    log::warn!(
                        "record {key} in page {} carries a dewey id but overflows; the id will not round-trip",
                        self.record_page_key
                    );
                }
                let handle = arena.alloc(crate::page::Page::Overflow(OverflowPage::new(bytes)));
                self.overflow_refs.insert(key, PageReference::in_memory(self.index_type, handle));
            } else {
                log::trace!("record {key} in page {} is {} bytes, inlined", self.record_page_key, bytes.len());
                self.slots.insert(key, bytes);
            }
        }
        self.dirty = false;
        Ok(())
    }

    /// Serialize per the on-disk layout in order: header, optional
    /// dewey-ordered section (pulling matching entries out of `slots`),
    /// bitset-governed inline section, overflow section, index-type tag.
    pub fn serialize(
        &mut self,
        out: &mut ByteBuffer,
        arena: &mut PageArena,
        serializer: &dyn RecordSerializer,
    ) -> Result<()> {
        self.classify_dirty_records(arena, serializer)?;

        if let Some(cached) = &self.cached_bytes {
            out.write_bytes(cached);
            return Ok(());
        }

        let mut body = ByteBuffer::new();
        body.write_varint_u64(self.record_page_key);
        body.write_i32_be(self.revision);

        // Dewey-ordered section: entries here are pulled out of `slots` and
        // are not repeated in the bitset-governed section below.
        let mut dewey_written: std::collections::HashSet<NodeKey> = std::collections::HashSet::new();
        if self.store_dewey_ids {
            let mut dewey_keys: Vec<NodeKey> = self
                .dewey_index
                .keys()
                .copied()
                .filter(|k| self.slots.contains_key(k))
                .collect();
            dewey_keys.sort_by(|a, b| {
                let ia = &self.dewey_index[a];
                let ib = &self.dewey_index[b];
                ia.len().cmp(&ib.len()).then_with(|| ia.cmp(ib))
            });
            body.write_i32_be(crate::utils::num::usize_to_u32_saturating(dewey_keys.len()) as i32);
            let mut prev: Option<Vec<u8>> = None;
            for key in dewey_keys {
                let id = self.dewey_index[&key].clone();
                serializer.serialize_dewey_id(prev.as_deref(), &id, &mut body)?;
                body.write_varint_u64(key);
                let slot = &self.slots[&key];
                body.write_i32_be(crate::utils::num::usize_to_u32_saturating(slot.len()) as i32);
                body.write_bytes(slot);
                dewey_written.insert(key);
                prev = Some(id);
            }
        }

        let base = self.record_page_key * u64::from(self.node_count);
        let mut slot_bits = BitSet::new(self.node_count as usize);
        let mut overflow_bits = BitSet::new(self.node_count as usize);
        for &key in self.slots.keys() {
            if dewey_written.contains(&key) {
                continue;
            }
            slot_bits.set(must_fit_usize(key - base)?);
        }
        for &key in self.overflow_refs.keys() {
            overflow_bits.set(must_fit_usize(key - base)?);
        }
        slot_bits.serialize(&mut body);
        overflow_bits.serialize(&mut body);

        let mut remaining_slot_keys: Vec<NodeKey> =
            self.slots.keys().copied().filter(|k| !dewey_written.contains(k)).collect();
        remaining_slot_keys.sort_unstable();
        body.write_i32_be(crate::utils::num::usize_to_u32_saturating(remaining_slot_keys.len()) as i32);
        for key in &remaining_slot_keys {
            let data = &self.slots[key];
            body.write_i32_be(crate::utils::num::usize_to_u32_saturating(data.len()) as i32);
            body.write_bytes(data);
        }

        let mut overflow_keys: Vec<NodeKey> = self.overflow_refs.keys().copied().collect();
        overflow_keys.sort_unstable();
        body.write_i32_be(crate::utils::num::usize_to_u32_saturating(overflow_keys.len()) as i32);
        for key in &overflow_keys {
            body.write_u64_be(self.overflow_refs[key].to_disk_key());
        }

        body.write_u8(self.index_type.id());

        for key in dewey_written {
            self.slots.remove(&key);
        }

        let bytes = body.into_vec();
        self.content_hash = Some(crc32fast::hash(&bytes));
        out.write_bytes(&bytes);
        self.cached_bytes = Some(bytes);
        Ok(())
    }

    /// Symmetric inverse of `serialize`.
    pub fn deserialize(
        input: &mut ByteReader,
        index_type: IndexType,
        page_key: PageKey,
        config: &crate::config::ResourceConfig,
        serializer: &dyn RecordSerializer,
    ) -> Result<Self> {
        let record_page_key = input.read_varint_u64()?;
        let revision = input.read_i32_be()?;
        let node_count = config.node_count();
        let base = record_page_key * u64::from(node_count);

        let mut page = Self {
            record_page_key,
            revision,
            index_type,
            node_count,
            max_record_size: config.max_record_size,
            store_dewey_ids: config.store_dewey_ids,
            records: HashMap::new(),
            slots: HashMap::new(),
            overflow_refs: HashMap::new(),
            dewey_index: HashMap::new(),
            cached_bytes: None,
            content_hash: None,
            dirty: false,
        };

        if config.store_dewey_ids {
            let dewey_count = input.read_i32_be()?;
            if dewey_count < 0 {
                return Err(SirixError::CorruptPage {
                    page_key,
                    reason: "negative dewey_count".to_string(),
                });
            }
            let mut prev: Option<Vec<u8>> = None;
            for _ in 0..dewey_count {
                let id = serializer.deserialize_dewey_id(prev.as_deref(), input)?;
                let node_key = input.read_varint_u64()?;
                let slot_len = input.read_i32_be()?;
                let slot_len = must_fit_usize(u64::try_from(slot_len).map_err(|_| {
                    SirixError::CorruptPage { page_key, reason: "negative slot_len".to_string() }
                })?)?;
                let data = input.read_bytes(slot_len)?;
                let mut record_reader = ByteReader::new(data, page_key);
                let record = serializer.deserialize(node_key, Some(id.clone()), &mut record_reader)?;
                page.records.insert(node_key, record);
                page.dewey_index.insert(node_key, id.clone());
                prev = Some(id);
            }
        }

        let slot_bits = BitSet::deserialize(input, node_count as usize)?;
        let overflow_bits = BitSet::deserialize(input, node_count as usize)?;

        let slot_entries_count = input.read_i32_be()?;
        let slot_keys: Vec<NodeKey> =
            slot_bits.iter_set().map(|off| base + off as u64).collect();
        if slot_entries_count < 0 || slot_entries_count as usize != slot_keys.len() {
            return Err(SirixError::CorruptPage {
                page_key,
                reason: format!(
                    "slot_entries_count {slot_entries_count} does not match slot_bits population {}",
                    slot_keys.len()
                ),
            });
        }
        for &node_key in &slot_keys {
            let len = input.read_i32_be()?;
            let len = must_fit_usize(u64::try_from(len).map_err(|_| SirixError::CorruptPage {
                page_key,
                reason: "negative slot len".to_string(),
            })?)?;
            let data = input.read_bytes(len)?;
            let mut record_reader = ByteReader::new(data, page_key);
            let record = serializer.deserialize(node_key, None, &mut record_reader)?;
            page.slots.insert(node_key, data.to_vec());
            page.records.insert(node_key, record);
        }

        let overflow_entries_count = input.read_i32_be()?;
        let overflow_keys: Vec<NodeKey> =
            overflow_bits.iter_set().map(|off| base + off as u64).collect();
        if overflow_entries_count < 0 || overflow_entries_count as usize != overflow_keys.len() {
            return Err(SirixError::CorruptPage {
                page_key,
                reason: format!(
                    "overflow_entries_count {overflow_entries_count} does not match overflow_bits population {}",
                    overflow_keys.len()
                ),
            });
        }
        for &node_key in &overflow_keys {
            let target = input.read_u64_be()?;
            page.overflow_refs.insert(node_key, PageReference::from_disk_key(index_type, target));
        }

        let tagged_index_type = IndexType::from_id(input.read_u8()?)?;
        page.index_type = tagged_index_type;
        for r in page.overflow_refs.values_mut() {
            r.retag(tagged_index_type);
        }

        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceConfig;
    use crate::record::BytesSerializer;
    use crate::test_support::InMemoryPageReader;

    fn roundtrip(page: &mut KeyValuePage, config: &ResourceConfig) -> KeyValuePage {
        let serializer = BytesSerializer;
        let mut arena = PageArena::new();
        let mut out = ByteBuffer::new();
        page.serialize(&mut out, &mut arena, &serializer).unwrap();
        let bytes = out.into_vec();
        let mut reader = ByteReader::new(&bytes, 0);
        KeyValuePage::deserialize(&mut reader, page.index_type(), 0, config, &serializer).unwrap()
    }

    #[test]
    fn s1_inline_round_trip() {
        let config = ResourceConfig { store_dewey_ids: false, ..ResourceConfig::default() };
        let mut page = KeyValuePage::new(0, IndexType::Document, 0, &config);
        page.put(5, Record::new(5, b"aa".to_vec())).unwrap();
        page.put(300, Record::new(300, b"bb".to_vec())).unwrap();

        let decoded = roundtrip(&mut page, &config);
        assert_eq!(decoded.slots.len(), 2);
        assert!(decoded.overflow_refs.is_empty());
        let mut keys: Vec<_> = decoded.records.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![5, 300]);
    }

    #[test]
    fn s2_overflow_boundary() {
        let config = ResourceConfig {
            store_dewey_ids: false,
            max_record_size: 16,
            ..ResourceConfig::default()
        };
        let mut page = KeyValuePage::new(0, IndexType::Document, 0, &config);
        page.put(1, Record::new(1, vec![0u8; 17])).unwrap();
        page.put(2, Record::new(2, vec![0u8; 16])).unwrap();

        let mut arena = PageArena::new();
        let mut out = ByteBuffer::new();
        page.serialize(&mut out, &mut arena, &BytesSerializer).unwrap();

        assert!(page.overflow_refs.contains_key(&1));
        assert!(page.slots.contains_key(&2));
        assert!(!page.overflow_refs.contains_key(&2));
        assert!(!page.slots.contains_key(&1));
    }

    #[test]
    fn s3_dewey_ordering_by_length_then_lex() {
        let config = ResourceConfig::default();
        let mut page = KeyValuePage::new(0, IndexType::Document, 0, &config);
        page.put(1, Record::with_dewey_id(1, vec![0x01], b"a".to_vec())).unwrap();
        page.put(2, Record::with_dewey_id(2, vec![0x01, 0x02], b"b".to_vec())).unwrap();
        page.put(3, Record::with_dewey_id(3, vec![0x02], b"c".to_vec())).unwrap();

        let decoded = roundtrip(&mut page, &config);
        let mut ids: Vec<(NodeKey, Vec<u8>)> =
            decoded.dewey_index.iter().map(|(k, v)| (*k, v.clone())).collect();
        ids.sort_by_key(|(k, _)| *k);
        assert_eq!(decoded.records.len(), 3);
        assert_eq!(decoded.dewey_index.get(&1), Some(&vec![0x01]));
        assert_eq!(decoded.dewey_index.get(&2), Some(&vec![0x01, 0x02]));
        assert_eq!(decoded.dewey_index.get(&3), Some(&vec![0x02]));
    }

    #[test]
    fn dewey_id_does_not_survive_overflow_round_trip() {
        let config = ResourceConfig { max_record_size: 4, ..ResourceConfig::default() };
        let mut page = KeyValuePage::new(0, IndexType::Document, 0, &config);
        page.put(1, Record::with_dewey_id(1, vec![0x01], vec![9u8; 20])).unwrap();
        assert!(page.dewey_index.contains_key(&1));

        let decoded = roundtrip(&mut page, &config);
        assert!(decoded.overflow_refs.contains_key(&1));
        assert!(decoded.dewey_index.get(&1).is_none());
    }

    #[test]
    fn overflow_get_reads_through_reader_and_memoizes() {
        let config = ResourceConfig {
            store_dewey_ids: false,
            max_record_size: 4,
            ..ResourceConfig::default()
        };
        let mut page = KeyValuePage::new(0, IndexType::Document, 0, &config);
        page.put(1, Record::new(1, vec![9u8; 20])).unwrap();

        let mut arena = PageArena::new();
        let mut out = ByteBuffer::new();
        page.serialize(&mut out, &mut arena, &BytesSerializer).unwrap();

        let mut writer_reader = InMemoryPageReader::new();
        let oref = page.overflow_refs.get(&1).unwrap();
        let PageReferenceTarget::InMemory(handle) = oref.target().unwrap() else {
            panic!("expected in-memory overflow ref");
        };
        let crate::page::Page::Overflow(overflow) = arena.get(handle).unwrap() else {
            panic!("expected overflow page in arena");
        };
        let mut ovbuf = ByteBuffer::new();
        overflow.serialize(&mut ovbuf);
        let key = writer_reader.store_overflow(ovbuf.into_vec());
        page.overflow_refs.insert(1, PageReference::persisted(IndexType::Document, key));
        page.records.remove(&1);

        let got = page.get(1, &mut writer_reader, &BytesSerializer).unwrap();
        assert_eq!(got.unwrap().payload(), &vec![9u8; 20][..]);
        assert!(page.records.contains_key(&1));
    }
}
