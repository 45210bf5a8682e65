//! Page reference: a slot carrying either an in-memory page, a
//! persisted file key, or a transaction-log key, decorated with the
//! [`IndexType`] subtree it points into. Exactly one variant is
//! authoritative at any moment.

use crate::page::{IndexType, LogKey, PageHandle, PageKey, NULL_ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageReferenceTarget {
    Persisted(PageKey),
    Logged(LogKey),
    InMemory(PageHandle),
}

/// A page reference is never bare: it always knows which subtree it routes
/// into, because a reference read out of an indirect page only gets that
/// tag once the descent (see `revisioning::dereference_leaf`) assigns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageReference {
    pub index_type: IndexType,
    target: Option<PageReferenceTarget>,
}

impl PageReference {
    #[must_use]
    pub fn null(index_type: IndexType) -> Self {
        Self { index_type, target: None }
    }

    #[must_use]
    pub fn persisted(index_type: IndexType, key: PageKey) -> Self {
        Self { index_type, target: Some(PageReferenceTarget::Persisted(key)) }
    }

    #[must_use]
    pub fn logged(index_type: IndexType, key: LogKey) -> Self {
        Self { index_type, target: Some(PageReferenceTarget::Logged(key)) }
    }

    #[must_use]
    pub fn in_memory(index_type: IndexType, handle: PageHandle) -> Self {
        Self { index_type, target: Some(PageReferenceTarget::InMemory(handle)) }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.target.is_none()
    }

    #[must_use]
    pub fn target(&self) -> Option<PageReferenceTarget> {
        self.target
    }

    #[must_use]
    pub fn page_key(&self) -> Option<PageKey> {
        match self.target {
            Some(PageReferenceTarget::Persisted(key)) => Some(key),
            _ => None,
        }
    }

    /// Re-tag this reference with the subtree it was descended through.
    /// Indirect-page storage does not itself record a subtree; the
    /// descent in `revisioning::dereference_leaf` stamps it on the way out.
    pub fn retag(&mut self, index_type: IndexType) {
        self.index_type = index_type;
    }

    /// `u64` form used by the fixed-size on-disk `IndirectPage` layout:
    /// `NULL_ID` for anything that is not a persisted reference (in-memory
    /// and logged references are resolved to a `PageKey` at commit time,
    /// before they ever reach this encoding).
    #[must_use]
    pub fn to_disk_key(&self) -> u64 {
        self.page_key().unwrap_or(NULL_ID)
    }

    #[must_use]
    pub fn from_disk_key(index_type: IndexType, key: u64) -> Self {
        if key == NULL_ID {
            Self::null(index_type)
        } else {
            Self::persisted(index_type, key)
        }
    }
}
