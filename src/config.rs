//! Resource configuration: plain data describing page sizing, fanout, and
//! cache geometry. A struct with documented defaults, no parser attached.
//! CLI/env parsing is out of scope for the storage core.

use crate::page::NDP_NODE_COUNT_EXPONENT;
use crate::revisioning::RevisioningPolicy;

/// Default page size used to derive `MAX_RECORD_SIZE` (1 MiB).
pub const DEFAULT_PAGE_SIZE: u32 = 1 << 20;
/// Fixed per-page header reserved out of `DEFAULT_PAGE_SIZE`.
pub const DEFAULT_PAGE_HEADER_RESERVED: u32 = 64;

#[derive(Debug, Clone)]
pub struct RevisioningConfig {
    pub policy: RevisioningPolicy,
    pub revisions_to_restore: u32,
}

impl Default for RevisioningConfig {
    fn default() -> Self {
        Self { policy: RevisioningPolicy::Incremental, revisions_to_restore: 3 }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceConfig {
    /// Maximum serialized record size before it spills to an overflow page.
    pub max_record_size: u32,
    pub ndp_node_count_exponent: u32,
    /// Indirect-page fanout exponents, most significant level first, shared
    /// by every subtree unless overridden per `IndexType` by a caller.
    pub indirect_fanout_exponents: Vec<u8>,
    pub store_dewey_ids: bool,
    pub revisioning: RevisioningConfig,

    pub record_cache_capacity: usize,
    pub record_cache_ttl_secs: u64,
    pub path_cache_capacity: usize,
    pub path_cache_enabled: bool,
    pub value_cache_capacity: usize,
    pub value_cache_enabled: bool,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            max_record_size: DEFAULT_PAGE_SIZE - DEFAULT_PAGE_HEADER_RESERVED,
            ndp_node_count_exponent: NDP_NODE_COUNT_EXPONENT,
            indirect_fanout_exponents: vec![7, 7, 7, 7],
            store_dewey_ids: true,
            revisioning: RevisioningConfig::default(),
            record_cache_capacity: 1000,
            record_cache_ttl_secs: 5000,
            path_cache_capacity: 20,
            path_cache_enabled: true,
            value_cache_capacity: 20,
            value_cache_enabled: true,
        }
    }
}

impl ResourceConfig {
    #[must_use]
    pub fn node_count(&self) -> u32 {
        1 << self.ndp_node_count_exponent
    }

    /// Fanout (number of refs) at `level` of the indirect trie.
    #[must_use]
    pub fn fanout_at(&self, level: usize) -> usize {
        self.indirect_fanout_exponents
            .get(level)
            .map_or(1, |exp| 1usize << exp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_constants() {
        let cfg = ResourceConfig::default();
        assert_eq!(cfg.node_count(), 512);
        assert_eq!(cfg.max_record_size, (1 << 20) - 64);
        assert_eq!(cfg.fanout_at(0), 128);
        assert_eq!(cfg.revisioning.revisions_to_restore, 3);
    }

    #[test]
    fn fanout_beyond_configured_levels_is_one() {
        let cfg = ResourceConfig::default();
        assert_eq!(cfg.fanout_at(99), 1);
    }
}
