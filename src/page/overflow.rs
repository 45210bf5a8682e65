//! Overflow page: opaque storage for a single record whose serialized
//! form is too large to inline in a [`super::kv::KeyValuePage`] slot.
//! Write-once once committed; only its reference travels in future leaves.

use crate::codec::{ByteBuffer, ByteReader};
use crate::error::Result;
use crate::page::PageKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverflowPage {
    data: Vec<u8>,
}

impl OverflowPage {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn serialize(&self, out: &mut ByteBuffer) {
        out.write_i32_be(crate::utils::num::usize_to_u32_saturating(self.data.len()) as i32);
        out.write_bytes(&self.data);
    }

    pub fn deserialize(input: &mut ByteReader, page_key: PageKey) -> Result<Self> {
        let len = input.read_i32_be()?;
        let len = crate::codec::must_fit_usize(u64::try_from(len).map_err(|_| {
            crate::error::SirixError::CorruptPage {
                page_key,
                reason: "negative overflow page length".to_string(),
            }
        })?)?;
        let data = input.read_bytes(len)?.to_vec();
        Ok(Self { data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_arbitrary_payload() {
        let page = OverflowPage::new(vec![9u8; 4096]);
        let mut buf = ByteBuffer::new();
        page.serialize(&mut buf);
        let bytes = buf.into_vec();
        let mut reader = ByteReader::new(&bytes, 7);
        let decoded = OverflowPage::deserialize(&mut reader, 7).unwrap();
        assert_eq!(decoded, page);
    }

    #[test]
    fn round_trips_empty_payload() {
        let page = OverflowPage::new(Vec::new());
        let mut buf = ByteBuffer::new();
        page.serialize(&mut buf);
        let bytes = buf.into_vec();
        let mut reader = ByteReader::new(&bytes, 0);
        let decoded = OverflowPage::deserialize(&mut reader, 0).unwrap();
        assert_eq!(decoded, page);
    }
}
