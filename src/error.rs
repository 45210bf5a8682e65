//! Error taxonomy for the storage core.
//!
//! One variant per failure mode named in the design (`Io`, `CorruptPage`,
//! `RecordDecode`, `DanglingReference`, `UnsupportedKey`, `TransactionClosed`,
//! `IllegalState`). Every public operation returns `Result<T, SirixError>`;
//! page-load errors are surfaced verbatim, cache-load failures simply
//! invalidate the cache entry rather than being cached themselves.

use thiserror::Error;

use crate::page::{NodeKey, PageKey};

#[derive(Debug, Error)]
pub enum SirixError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt page at key {page_key}: {reason}")]
    CorruptPage { page_key: PageKey, reason: String },

    #[error("failed to decode record {node_key}: {reason}")]
    RecordDecode { node_key: NodeKey, reason: String },

    #[error("overflow reference for node {node_key} points at an unreachable page {page_key}")]
    DanglingReference { node_key: NodeKey, page_key: PageKey },

    #[error("node key {0} is outside the maximum addressable range")]
    UnsupportedKey(NodeKey),

    #[error("operation attempted on a closed transaction")]
    TransactionClosed,

    #[error("illegal state: {0}")]
    IllegalState(String),
}

pub type Result<T> = std::result::Result<T, SirixError>;
