//! Records and their serializer capability.
//!
//! A [`Record`] is an opaque payload plus the two capabilities every page
//! layer needs: its [`NodeKey`] and an optional dewey id. Encoding and
//! decoding the payload itself is delegated to a [`RecordSerializer`],
//! because the storage core is deliberately agnostic to what a record
//! *means* (that is the XQuery layer's job, out of scope here).

use crate::codec::{ByteBuffer, ByteReader};
use crate::error::{Result, SirixError};
use crate::page::NodeKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    node_key: NodeKey,
    dewey_id: Option<Vec<u8>>,
    payload: Vec<u8>,
}

impl Record {
    #[must_use]
    pub fn new(node_key: NodeKey, payload: Vec<u8>) -> Self {
        Self { node_key, dewey_id: None, payload }
    }

    #[must_use]
    pub fn with_dewey_id(node_key: NodeKey, dewey_id: Vec<u8>, payload: Vec<u8>) -> Self {
        Self { node_key, dewey_id: Some(dewey_id), payload }
    }

    #[must_use]
    pub fn node_key(&self) -> NodeKey {
        self.node_key
    }

    #[must_use]
    pub fn dewey_id(&self) -> Option<&[u8]> {
        self.dewey_id.as_deref()
    }

    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// A record whose payload is the single sentinel byte `0xFF` is a
    /// tombstone: `revisioning::combine` and `reader::PageReadTxn::get_record`
    /// both treat it as "logically absent", never as an error.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.payload.as_slice() == [0xFFu8]
    }

    #[must_use]
    pub fn tombstone(node_key: NodeKey) -> Self {
        Self { node_key, dewey_id: None, payload: vec![0xFF] }
    }
}

/// Object-safe capability for turning a [`Record`]'s payload into bytes and
/// back. `NodePersistenter`-style dewey support is a capability subset of
/// this same trait (default methods return `IllegalState`), probed via
/// [`RecordSerializer::supports_dewey_ids`] rather than a separate marker
/// type, per the "detect via capability probe, not inheritance" design note.
pub trait RecordSerializer: Send + Sync {
    fn serialize(&self, record: &Record, out: &mut ByteBuffer) -> Result<()>;

    fn deserialize(
        &self,
        node_key: NodeKey,
        dewey_id: Option<Vec<u8>>,
        input: &mut ByteReader,
    ) -> Result<Record>;

    fn supports_dewey_ids(&self) -> bool {
        false
    }

    /// Delta-encode `curr` against `prev` (`None` for the first id in a
    /// page). Sorted order (by byte length, then lexicographically) is the
    /// caller's responsibility; this only handles the prefix-sharing.
    fn serialize_dewey_id(
        &self,
        _prev: Option<&[u8]>,
        _curr: &[u8],
        _out: &mut ByteBuffer,
    ) -> Result<()> {
        Err(SirixError::IllegalState("serializer does not support dewey ids".to_string()))
    }

    fn deserialize_dewey_id(
        &self,
        _prev: Option<&[u8]>,
        _input: &mut ByteReader,
    ) -> Result<Vec<u8>> {
        Err(SirixError::IllegalState("serializer does not support dewey ids".to_string()))
    }
}

/// Default serializer: treats the payload as opaque bytes (no schema),
/// dewey ids encoded as a shared-prefix-length varint followed by the
/// differing suffix. Lets the storage core be exercised and tested without
/// the XQuery node-persistence layer this engine's original front-end
/// supplies.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesSerializer;

impl RecordSerializer for BytesSerializer {
    fn serialize(&self, record: &Record, out: &mut ByteBuffer) -> Result<()> {
        out.write_bytes(record.payload());
        Ok(())
    }

    fn deserialize(
        &self,
        node_key: NodeKey,
        dewey_id: Option<Vec<u8>>,
        input: &mut ByteReader,
    ) -> Result<Record> {
        let payload = input.read_bytes(input.remaining())?.to_vec();
        Ok(match dewey_id {
            Some(id) => Record::with_dewey_id(node_key, id, payload),
            None => Record::new(node_key, payload),
        })
    }

    fn supports_dewey_ids(&self) -> bool {
        true
    }

    fn serialize_dewey_id(
        &self,
        prev: Option<&[u8]>,
        curr: &[u8],
        out: &mut ByteBuffer,
    ) -> Result<()> {
        let shared = prev.map_or(0, |p| common_prefix_len(p, curr));
        out.write_varint_u32(crate::utils::num::usize_to_u32_saturating(shared));
        let suffix = &curr[shared..];
        out.write_varint_u32(crate::utils::num::usize_to_u32_saturating(suffix.len()));
        out.write_bytes(suffix);
        Ok(())
    }

    fn deserialize_dewey_id(
        &self,
        prev: Option<&[u8]>,
        input: &mut ByteReader,
    ) -> Result<Vec<u8>> {
        let shared = input.read_varint_u32()? as usize;
        let suffix_len = input.read_varint_u32()? as usize;
        let suffix = input.read_bytes(suffix_len)?;
        let mut id = Vec::with_capacity(shared + suffix_len);
        if shared > 0 {
            let prev = prev.ok_or_else(|| SirixError::RecordDecode {
                node_key: 0,
                reason: "dewey delta references a shared prefix with no previous id".to_string(),
            })?;
            if shared > prev.len() {
                return Err(SirixError::RecordDecode {
                    node_key: 0,
                    reason: "dewey delta shared-prefix length exceeds previous id".to_string(),
                });
            }
            id.extend_from_slice(&prev[..shared]);
        }
        id.extend_from_slice(suffix);
        Ok(id)
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
