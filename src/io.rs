//! Byte-level I/O capability (spec: "byte-level I/O... reduced to a
//! `PageReader` capability"). [`FilePageReader`] is the production
//! implementation; compression, encryption, and the write path belong to a
//! layer above this crate.
//!
//! On-disk framing: each page is a length-prefixed, checksummed frame
//! (`u32` big-endian length, `u32` big-endian crc32, then the payload) at a
//! byte offset that doubles as its [`PageKey`]. The resource file carries
//! the uber page's frame at offset 0, with committed revisions appended
//! after it.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Result, SirixError};
use crate::page::PageKey;

const FRAME_HEADER_LEN: u64 = 8;

pub trait PageReader: Send {
    fn read_page(&mut self, key: PageKey) -> Result<Vec<u8>>;
    fn read_overflow(&mut self, key: PageKey) -> Result<Vec<u8>>;
}

/// Reads page frames out of a single resource file opened read-only for the
/// lifetime of one [`crate::reader::PageReadTxn`].
pub struct FilePageReader {
    file: File,
}

impl FilePageReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self { file })
    }

    fn read_frame(&mut self, key: PageKey) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(key))?;
        let mut header = [0u8; FRAME_HEADER_LEN as usize];
        self.file.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                SirixError::DanglingReference { node_key: 0, page_key: key }
            } else {
                SirixError::Io(e)
            }
        })?;
        let len = u32::from_be_bytes(header[0..4].try_into().expect("checked length"));
        let crc = u32::from_be_bytes(header[4..8].try_into().expect("checked length"));
        let mut data = vec![0u8; len as usize];
        self.file.read_exact(&mut data)?;
        let actual = crc32fast::hash(&data);
        if actual != crc {
            return Err(SirixError::CorruptPage {
                page_key: key,
                reason: format!("checksum mismatch: expected {crc:#x}, computed {actual:#x}"),
            });
        }
        Ok(data)
    }
}

impl PageReader for FilePageReader {
    fn read_page(&mut self, key: PageKey) -> Result<Vec<u8>> {
        self.read_frame(key)
    }

    fn read_overflow(&mut self, key: PageKey) -> Result<Vec<u8>> {
        self.read_frame(key)
    }
}

/// Frame a page's bytes the way [`FilePageReader`] expects to read them
/// back. Used by the (out-of-scope) write path and by test fixtures that
/// build a resource file on disk rather than in memory.
#[must_use]
pub fn frame_page(data: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(FRAME_HEADER_LEN as usize + data.len());
    framed.extend_from_slice(&(crate::utils::num::usize_to_u32_saturating(data.len())).to_be_bytes());
    framed.extend_from_slice(&crc32fast::hash(data).to_be_bytes());
    framed.extend_from_slice(data);
    framed
}
