//! Revision root and uber page.
//!
//! `UberPage` is the single global root: it carries the indirect-tree root
//! whose leaves are `RevisionRootPage`s, plus the per-subtree fanout
//! exponents every descent (`revisioning::dereference_leaf`) consults.
//! `RevisionRootPage` is one committed revision's entry point: one indirect
//! root reference per [`IndexType`] subtree, created lazily on first use.

use std::collections::HashMap;

use crate::codec::{ByteBuffer, ByteReader};
use crate::error::Result;
use crate::page::reference::PageReference;
use crate::page::{IndexType, Revision};

#[derive(Debug, Clone)]
pub struct RevisionRootPage {
    revision: Revision,
    roots: HashMap<IndexType, PageReference>,
    timestamp: i64,
    author: Option<String>,
    commit_message: Option<String>,
}

impl RevisionRootPage {
    #[must_use]
    pub fn new(revision: Revision, timestamp: i64, author: Option<String>, commit_message: Option<String>) -> Self {
        Self { revision, roots: HashMap::new(), timestamp, author, commit_message }
    }

    #[must_use]
    pub fn revision(&self) -> Revision {
        self.revision
    }

    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[must_use]
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    #[must_use]
    pub fn commit_message(&self) -> Option<&str> {
        self.commit_message.as_deref()
    }

    #[must_use]
    pub fn root_ref(&self, index_type: IndexType) -> Option<&PageReference> {
        self.roots.get(&index_type)
    }

    /// Lazily create (as a null reference awaiting a first write) the root
    /// for `index_type` if it doesn't exist yet.
    pub fn root_ref_or_create(&mut self, index_type: IndexType) -> &mut PageReference {
        self.roots.entry(index_type).or_insert_with(|| PageReference::null(index_type))
    }

    pub fn set_root_ref(&mut self, index_type: IndexType, reference: PageReference) {
        self.roots.insert(index_type, reference);
    }

    pub fn serialize(&self, out: &mut ByteBuffer) {
        out.write_i32_be(self.revision);
        out.write_u64_be(i64_to_u64_bits(self.timestamp));
        write_optional_string(out, self.author.as_deref());
        write_optional_string(out, self.commit_message.as_deref());
        out.write_i32_be(crate::utils::num::usize_to_u32_saturating(self.roots.len()) as i32);
        let mut entries: Vec<_> = self.roots.iter().collect();
        entries.sort_by_key(|(k, _)| k.id());
        for (index_type, reference) in entries {
            out.write_u8(index_type.id());
            out.write_u64_be(reference.to_disk_key());
        }
    }

    pub fn deserialize(input: &mut ByteReader) -> Result<Self> {
        let revision = input.read_i32_be()?;
        let timestamp = u64_bits_to_i64(input.read_u64_be()?);
        let author = read_optional_string(input)?;
        let commit_message = read_optional_string(input)?;
        let root_count = input.read_i32_be()?;
        let mut roots = HashMap::new();
        for _ in 0..root_count {
            let index_type = IndexType::from_id(input.read_u8()?)?;
            let key = input.read_u64_be()?;
            roots.insert(index_type, PageReference::from_disk_key(index_type, key));
        }
        Ok(Self { revision, roots, timestamp, author, commit_message })
    }
}

#[derive(Debug, Clone)]
pub struct UberPage {
    latest_revision: Revision,
    revision_root_trie_root: PageReference,
    page_count_exponents: HashMap<IndexType, Vec<u8>>,
}

impl UberPage {
    #[must_use]
    pub fn new(page_count_exponents: HashMap<IndexType, Vec<u8>>) -> Self {
        Self {
            latest_revision: -1,
            revision_root_trie_root: PageReference::null(IndexType::Document),
            page_count_exponents,
        }
    }

    #[must_use]
    pub fn latest_revision(&self) -> Revision {
        self.latest_revision
    }

    pub fn set_latest_revision(&mut self, revision: Revision) {
        self.latest_revision = revision;
    }

    #[must_use]
    pub fn revision_root_trie_root(&self) -> &PageReference {
        &self.revision_root_trie_root
    }

    pub fn set_revision_root_trie_root(&mut self, reference: PageReference) {
        self.revision_root_trie_root = reference;
    }

    #[must_use]
    pub fn page_count_exponents(&self, index_type: IndexType) -> &[u8] {
        self.page_count_exponents.get(&index_type).map_or(&[], Vec::as_slice)
    }

    pub fn serialize(&self, out: &mut ByteBuffer) {
        out.write_i32_be(self.latest_revision);
        out.write_u64_be(self.revision_root_trie_root.to_disk_key());
        out.write_i32_be(crate::utils::num::usize_to_u32_saturating(self.page_count_exponents.len()) as i32);
        let mut entries: Vec<_> = self.page_count_exponents.iter().collect();
        entries.sort_by_key(|(k, _)| k.id());
        for (index_type, exps) in entries {
            out.write_u8(index_type.id());
            out.write_i32_be(crate::utils::num::usize_to_u32_saturating(exps.len()) as i32);
            out.write_bytes(exps);
        }
    }

    pub fn deserialize(input: &mut ByteReader) -> Result<Self> {
        let latest_revision = input.read_i32_be()?;
        let trie_key = input.read_u64_be()?;
        let entry_count = input.read_i32_be()?;
        let mut page_count_exponents = HashMap::new();
        for _ in 0..entry_count {
            let index_type = IndexType::from_id(input.read_u8()?)?;
            let len = input.read_i32_be()?;
            let len = crate::codec::must_fit_usize(u64::try_from(len).unwrap_or(0))?;
            let exps = input.read_bytes(len)?.to_vec();
            page_count_exponents.insert(index_type, exps);
        }
        Ok(Self {
            latest_revision,
            revision_root_trie_root: PageReference::from_disk_key(IndexType::Document, trie_key),
            page_count_exponents,
        })
    }
}

fn i64_to_u64_bits(v: i64) -> u64 {
    v as u64
}

fn u64_bits_to_i64(v: u64) -> i64 {
    v as i64
}

fn write_optional_string(out: &mut ByteBuffer, s: Option<&str>) {
    match s {
        Some(s) => {
            out.write_u8(1);
            let bytes = s.as_bytes();
            out.write_i32_be(crate::utils::num::usize_to_u32_saturating(bytes.len()) as i32);
            out.write_bytes(bytes);
        }
        None => out.write_u8(0),
    }
}

fn read_optional_string(input: &mut ByteReader) -> Result<Option<String>> {
    let present = input.read_u8()?;
    if present == 0 {
        return Ok(None);
    }
    let len = input.read_i32_be()?;
    let len = crate::codec::must_fit_usize(u64::try_from(len).unwrap_or(0))?;
    let bytes = input.read_bytes(len)?;
    Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revision_root_round_trips_with_metadata() {
        let mut root = RevisionRootPage::new(3, 1_700_000_000, Some("alice".into()), None);
        root.set_root_ref(IndexType::Document, PageReference::persisted(IndexType::Document, 77));

        let mut buf = ByteBuffer::new();
        root.serialize(&mut buf);
        let bytes = buf.into_vec();
        let mut reader = ByteReader::new(&bytes, 0);
        let decoded = RevisionRootPage::deserialize(&mut reader).unwrap();

        assert_eq!(decoded.revision(), 3);
        assert_eq!(decoded.author(), Some("alice"));
        assert_eq!(decoded.commit_message(), None);
        assert_eq!(decoded.root_ref(IndexType::Document).unwrap().page_key(), Some(77));
    }

    #[test]
    fn uber_page_round_trips_fanout_exponents() {
        let mut exps = HashMap::new();
        exps.insert(IndexType::Document, vec![9, 9, 9]);
        let mut page = UberPage::new(exps);
        page.set_latest_revision(5);
        page.set_revision_root_trie_root(PageReference::persisted(IndexType::Document, 1));

        let mut buf = ByteBuffer::new();
        page.serialize(&mut buf);
        let bytes = buf.into_vec();
        let mut reader = ByteReader::new(&bytes, 0);
        let decoded = UberPage::deserialize(&mut reader).unwrap();

        assert_eq!(decoded.latest_revision(), 5);
        assert_eq!(decoded.page_count_exponents(IndexType::Document), &[9, 9, 9]);
        assert_eq!(decoded.revision_root_trie_root().page_key(), Some(1));
    }
}
