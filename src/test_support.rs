//! In-memory `PageReader` test double: a `Vec<u8>`-backed fake resource so
//! the rest of the suite never touches the filesystem.

use std::collections::HashMap;

use crate::error::{Result, SirixError};
use crate::io::{frame_page, PageReader};
use crate::page::PageKey;

#[derive(Debug, Default)]
pub struct InMemoryPageReader {
    pages: HashMap<PageKey, Vec<u8>>,
    next_key: PageKey,
}

impl InMemoryPageReader {
    #[must_use]
    pub fn new() -> Self {
        Self { pages: HashMap::new(), next_key: 0 }
    }

    /// Store raw (unframed) page bytes and return the key assigned to them.
    pub fn store_page(&mut self, data: Vec<u8>) -> PageKey {
        let key = self.next_key;
        self.next_key += frame_page(&data).len() as u64;
        self.pages.insert(key, data);
        key
    }

    /// Overflow pages are stored the same way as any other page; the
    /// distinction between `read_page` and `read_overflow` exists at the
    /// trait level for callers that want to route them differently (e.g. a
    /// production reader that keeps overflow pages in a separate file).
    pub fn store_overflow(&mut self, data: Vec<u8>) -> PageKey {
        self.store_page(data)
    }
}

impl PageReader for InMemoryPageReader {
    fn read_page(&mut self, key: PageKey) -> Result<Vec<u8>> {
        self.pages
            .get(&key)
            .cloned()
            .ok_or(SirixError::DanglingReference { node_key: 0, page_key: key })
    }

    fn read_overflow(&mut self, key: PageKey) -> Result<Vec<u8>> {
        self.read_page(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_reads_back_pages() {
        let mut reader = InMemoryPageReader::new();
        let key = reader.store_page(b"payload".to_vec());
        assert_eq!(reader.read_page(key).unwrap(), b"payload".to_vec());
    }

    #[test]
    fn unknown_key_is_a_dangling_reference() {
        let mut reader = InMemoryPageReader::new();
        assert!(matches!(
            reader.read_page(999),
            Err(SirixError::DanglingReference { page_key: 999, .. })
        ));
    }
}
