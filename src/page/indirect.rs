//! Indirect page: a fixed-fanout array of page references forming one
//! level of the revisioned trie. Immutable once persisted; a writer clones
//! it (copy-on-write) before mutating `refs`.

use crate::codec::{ByteBuffer, ByteReader};
use crate::error::{Result, SirixError};
use crate::page::reference::PageReference;
use crate::page::{IndexType, PageKey};

#[derive(Debug, Clone)]
pub struct IndirectPage {
    index_type: IndexType,
    refs: Vec<PageReference>,
}

impl IndirectPage {
    #[must_use]
    pub fn new(fanout: usize, index_type: IndexType) -> Self {
        Self { index_type, refs: vec![PageReference::null(index_type); fanout] }
    }

    #[must_use]
    pub fn fanout(&self) -> usize {
        self.refs.len()
    }

    #[must_use]
    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn ref_at(&self, offset: usize) -> Result<&PageReference> {
        self.refs.get(offset).ok_or_else(|| SirixError::UnsupportedKey(offset as u64))
    }

    pub fn set_ref_at(&mut self, offset: usize, reference: PageReference) -> Result<()> {
        let slot = self.refs.get_mut(offset).ok_or(SirixError::UnsupportedKey(offset as u64))?;
        *slot = reference;
        Ok(())
    }

    pub fn serialize(&self, out: &mut ByteBuffer) {
        for r in &self.refs {
            out.write_u64_be(r.to_disk_key());
        }
    }

    pub fn deserialize(
        input: &mut ByteReader,
        fanout: usize,
        index_type: IndexType,
        page_key: PageKey,
    ) -> Result<Self> {
        let mut refs = Vec::with_capacity(fanout);
        for _ in 0..fanout {
            let key = input.read_u64_be().map_err(|_| SirixError::CorruptPage {
                page_key,
                reason: "truncated indirect page".to_string(),
            })?;
            refs.push(PageReference::from_disk_key(index_type, key));
        }
        Ok(Self { index_type, refs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_page_is_all_null() {
        let page = IndirectPage::new(128, IndexType::Document);
        assert!(page.ref_at(0).unwrap().is_null());
        assert!(page.ref_at(127).unwrap().is_null());
    }

    #[test]
    fn out_of_range_offset_is_unsupported_key() {
        let page = IndirectPage::new(4, IndexType::Document);
        assert!(matches!(page.ref_at(4), Err(SirixError::UnsupportedKey(4))));
    }

    #[test]
    fn round_trips_mixed_null_and_persisted_refs() {
        let mut page = IndirectPage::new(8, IndexType::Name);
        page.set_ref_at(0, PageReference::persisted(IndexType::Name, 10)).unwrap();
        page.set_ref_at(5, PageReference::persisted(IndexType::Name, 99)).unwrap();

        let mut buf = ByteBuffer::new();
        page.serialize(&mut buf);
        let bytes = buf.into_vec();
        let mut reader = ByteReader::new(&bytes, 1);
        let decoded = IndirectPage::deserialize(&mut reader, 8, IndexType::Name, 1).unwrap();

        assert_eq!(decoded.ref_at(0).unwrap().page_key(), Some(10));
        assert_eq!(decoded.ref_at(5).unwrap().page_key(), Some(99));
        assert!(decoded.ref_at(1).unwrap().is_null());
    }
}
