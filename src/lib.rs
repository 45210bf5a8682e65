#![forbid(unsafe_code)]

//! A versioned, append-only, tree-structured page storage core: the
//! copy-on-write revision trie, dewey-ordered key-value leaves, and
//! page-combining revisioning that sit underneath a document/XQuery engine.
//! This crate owns the storage layer only: wire codec, page types,
//! the revisioning algorithm, the transaction log, and the read-side
//! transaction that ties them together. Compression, encryption, the write
//! path, and index-controller policy are out of scope, left to the layer
//! above.
//!
//! [`reader::PageReadTxn`] is the entry point a caller actually talks to.

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod io;
pub mod logger;
pub mod page;
pub mod reader;
pub mod record;
pub mod revisioning;
pub mod txlog;
pub mod utils;

#[cfg(test)]
pub mod test_support;

pub use config::{ResourceConfig, RevisioningConfig};
pub use error::{Result, SirixError};
pub use page::IndexType;
pub use reader::PageReadTxn;
pub use record::{BytesSerializer, Record, RecordSerializer};
pub use revisioning::RevisioningPolicy;

use std::path::Path;
use std::sync::Arc;

use page::Revision;

/// Open `resource_path` at `revision`. Thin wrapper over
/// [`PageReadTxn::open`]: the crate-level entry point a caller reaches for
/// first.
pub fn open(
    resource_path: &Path,
    revision: Revision,
    config: ResourceConfig,
    serializer: Arc<dyn RecordSerializer>,
) -> Result<PageReadTxn> {
    PageReadTxn::open(resource_path, revision, config, serializer)
}
