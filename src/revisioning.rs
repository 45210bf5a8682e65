//! Revisioning / page combining: the algorithm that walks a chain of
//! historical leaves and merges them into the fully materialized leaf a
//! reader actually sees at a given revision.

use std::collections::HashSet;

use crate::error::{Result, SirixError};
use crate::page::indirect::IndirectPage;
use crate::page::kv::KeyValuePage;
use crate::page::reference::PageReference;
use crate::page::uber::{RevisionRootPage, UberPage};
use crate::page::{IndexType, PageKey, RecordPageKey, Revision};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevisioningPolicy {
    Full,
    Differential,
    Incremental,
    SlidingSnapshot,
}

/// What `collect_snapshot_leaves` needs from the surrounding transaction:
/// the uber page (for fanout exponents), revision roots, indirect pages,
/// and persisted leaves. Implemented by [`crate::reader::PageReadTxn`].
pub trait RevisionSource {
    fn uber_page(&self) -> &UberPage;
    fn load_revision_root(&mut self, revision: Revision) -> Result<RevisionRootPage>;
    fn load_indirect(
        &mut self,
        page_key: PageKey,
        index_type: IndexType,
        fanout: usize,
    ) -> Result<IndirectPage>;
    fn load_leaf(&mut self, page_key: PageKey, index_type: IndexType) -> Result<KeyValuePage>;
}

/// Descend the indirect trie rooted at `start_ref` for `key` (a
/// `RecordPageKey`), consuming `exps` as a sequence of most-significant-bit
/// first, variable-width digits (the conventional radix-trie shape: level 0
/// consumes the highest `exps[0]` bits remaining, the last level the
/// lowest). Returns `None` as soon as a null reference is hit instead of
/// erroring, since "no page at this revision for this key" is a normal,
/// expected outcome of walking older revisions.
pub fn dereference_leaf(
    start_ref: &PageReference,
    key: u64,
    subtree: IndexType,
    exps: &[u8],
    source: &mut dyn RevisionSource,
) -> Result<Option<PageReference>> {
    let mut current = *start_ref;
    let total_bits: u32 = exps.iter().map(|&e| u32::from(e)).sum();
    let mut shift_remaining = total_bits;
    for &exp in exps {
        if current.is_null() {
            return Ok(None);
        }
        shift_remaining -= u32::from(exp);
        let mask = (1u64 << exp) - 1;
        let offset = ((key >> shift_remaining) & mask) as usize;
        let Some(page_key) = current.page_key() else {
            return Err(SirixError::IllegalState(
                "cannot descend through an unpersisted indirect reference".to_string(),
            ));
        };
        let fanout = 1usize << exp;
        let indirect = source.load_indirect(page_key, subtree, fanout)?;
        let mut next = *indirect.ref_at(offset)?;
        next.retag(subtree);
        current = next;
    }
    Ok(Some(current))
}

/// Walk revisions `revision` down to `0`, gathering the chain of historical
/// leaf references the combine step needs, per the policy's cutoff rule.
pub fn collect_snapshot_leaves(
    source: &mut dyn RevisionSource,
    record_page_key: RecordPageKey,
    subtree: IndexType,
    revision: Revision,
    policy: RevisioningPolicy,
    revisions_to_restore: u32,
) -> Result<Vec<KeyValuePage>> {
    let mut refs: Vec<PageReference> = Vec::new();
    let mut seen: HashSet<PageKey> = HashSet::new();
    let mut i = revision;

    loop {
        if i < 0 {
            break;
        }
        let root = source.load_revision_root(i)?;
        let Some(subtree_root) = root.root_ref(subtree).copied() else {
            break;
        };
        let exps = source.uber_page().page_count_exponents(subtree).to_vec();
        let Some(leaf_ref) = dereference_leaf(&subtree_root, record_page_key, subtree, &exps, source)?
        else {
            break;
        };
        if leaf_ref.is_null() {
            break;
        }

        let include = match leaf_ref.page_key() {
            Some(pk) => seen.insert(pk),
            None => true,
        };
        if include {
            refs.push(leaf_ref);
        }

        let stop = refs.len() as u32 == revisions_to_restore
            || policy == RevisioningPolicy::Full
            || (policy == RevisioningPolicy::Differential && refs.len() == 2);
        if stop {
            break;
        }

        if policy == RevisioningPolicy::Differential {
            if i == 0 {
                break;
            }
            let jump = i.saturating_sub(revisions_to_restore as i32).saturating_add(1);
            i = jump.max(1);
        } else {
            if i == 0 {
                break;
            }
            i -= 1;
        }
    }

    let mut leaves = Vec::with_capacity(refs.len());
    for r in refs {
        let page_key = r.page_key().ok_or_else(|| {
            SirixError::IllegalState("cannot read an unpersisted leaf during combine".to_string())
        })?;
        leaves.push(source.load_leaf(page_key, subtree)?);
    }
    Ok(leaves)
}

/// Merge a chain of leaves (ordered latest-first, as produced by
/// `collect_snapshot_leaves`) per `policy`. `None` iff `leaves` is empty.
#[must_use]
pub fn combine(policy: RevisioningPolicy, mut leaves: Vec<KeyValuePage>) -> Option<KeyValuePage> {
    if leaves.is_empty() {
        return None;
    }
    match policy {
        RevisioningPolicy::Full => Some(leaves.remove(0)),
        RevisioningPolicy::Differential => {
            let mut result = leaves.remove(0);
            if !leaves.is_empty() {
                let base = leaves.remove(0);
                result.layer_missing_from(&base);
            }
            Some(result)
        }
        RevisioningPolicy::Incremental | RevisioningPolicy::SlidingSnapshot => {
            let mut iter = leaves.into_iter();
            let mut result = iter.next()?;
            for older in iter {
                result.layer_missing_from(&older);
            }
            Some(result)
        }
    }
}
