//! Property tests for the storage-core invariants: round-tripping,
//! ordering, and revisioning behavior that should hold for any input, not
//! just the hand-picked cases in `scenarios.rs`. Randomized via `proptest`
//! (already a dev-dependency; reused as-is), exercised through public API
//! only.

use std::collections::HashMap;

use proptest::prelude::*;

use sirix_storage_core::codec::{ByteBuffer, ByteReader};
use sirix_storage_core::config::ResourceConfig;
use sirix_storage_core::page::kv::KeyValuePage;
use sirix_storage_core::page::{IndexType, PageArena};
use sirix_storage_core::record::{BytesSerializer, Record};
use sirix_storage_core::revisioning::{combine, RevisioningPolicy};

fn roundtrip(page: &mut KeyValuePage, config: &ResourceConfig) -> KeyValuePage {
    let serializer = BytesSerializer;
    let mut arena = PageArena::new();
    let mut out = ByteBuffer::new();
    page.serialize(&mut out, &mut arena, &serializer).unwrap();
    let bytes = out.into_vec();
    let mut reader = ByteReader::new(&bytes, 0);
    KeyValuePage::deserialize(&mut reader, page.index_type(), 0, config, &serializer).unwrap()
}

fn entries_without_duplicates(pairs: Vec<(u64, Vec<u8>)>) -> HashMap<u64, Vec<u8>> {
    pairs.into_iter().collect()
}

proptest! {
    /// Invariant 1 (round-trip) + invariant 4 (overflow threshold): every
    /// inserted key comes back with the same payload, and lands in exactly
    /// the bucket its size dictates.
    #[test]
    fn round_trip_and_overflow_threshold(
        pairs in prop::collection::vec((0u64..500, prop::collection::vec(any::<u8>(), 0..40)), 0..30),
    ) {
        let config = ResourceConfig { store_dewey_ids: false, max_record_size: 16, ..ResourceConfig::default() };
        let input = entries_without_duplicates(pairs);

        let mut page = KeyValuePage::new(0, IndexType::Document, 0, &config);
        for (key, payload) in &input {
            page.put(*key, Record::new(*key, payload.clone())).unwrap();
        }

        let mut arena = PageArena::new();
        let mut scratch = ByteBuffer::new();
        page.serialize(&mut scratch, &mut arena, &BytesSerializer).unwrap();

        for (key, payload) in &input {
            if payload.len() as u32 <= config.max_record_size {
                prop_assert!(page.slots().contains_key(key));
                prop_assert!(!page.overflow_refs().contains_key(key));
            } else {
                prop_assert!(page.overflow_refs().contains_key(key));
                prop_assert!(!page.slots().contains_key(key));
            }
        }

        // Invariant 2 (partition): no key straddles both buckets.
        let slot_keys: std::collections::HashSet<_> = page.slots().keys().copied().collect();
        let overflow_keys: std::collections::HashSet<_> = page.overflow_refs().keys().copied().collect();
        prop_assert!(slot_keys.is_disjoint(&overflow_keys));

        let decoded = roundtrip(&mut page, &config);
        let mut decoded_inline: HashMap<u64, Vec<u8>> = HashMap::new();
        for (key, record) in decoded.entries() {
            if !decoded.overflow_refs().contains_key(key) {
                decoded_inline.insert(*key, record.payload().to_vec());
            }
        }
        for (key, payload) in &input {
            if payload.len() as u32 <= config.max_record_size {
                prop_assert_eq!(decoded_inline.get(key), Some(payload));
            }
        }
    }

    /// Invariant 5 (dewey ordering), checked as decode correctness: every
    /// dewey id stored comes back unchanged regardless of insertion order
    /// (the delta-compression the wire format applies is transparent to a
    /// caller reading through `get`/`entries`).
    #[test]
    fn dewey_ids_round_trip_regardless_of_insertion_order(
        ids in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..6), 1..12),
    ) {
        let config = ResourceConfig::default();
        let mut page = KeyValuePage::new(0, IndexType::Document, 0, &config);
        let mut expected = HashMap::new();
        for (i, id) in ids.into_iter().enumerate() {
            let key = i as u64;
            page.put(key, Record::with_dewey_id(key, id.clone(), vec![i as u8])).unwrap();
            expected.insert(key, id);
        }

        let decoded = roundtrip(&mut page, &config);
        for (key, id) in &expected {
            let (_, record) = decoded.entries().find(|(k, _)| *k == key).unwrap();
            prop_assert_eq!(record.dewey_id(), Some(id.as_slice()));
        }
    }

    /// Invariant 6 (snapshot merge): `combine(FULL, chain)` is exactly the
    /// head; `combine(INCREMENTAL, chain)` resolves each key to the
    /// newest leaf (earliest in the latest-first `chain`) that contains it.
    #[test]
    fn combine_resolves_each_key_to_its_newest_layer(
        chain in prop::collection::vec(
            prop::collection::vec((0u64..20, prop::collection::vec(any::<u8>(), 0..6)), 0..6),
            1..5,
        ),
    ) {
        let config = ResourceConfig::default();
        let layers: Vec<HashMap<u64, Vec<u8>>> = chain.into_iter().map(entries_without_duplicates).collect();

        let build = |rev: i32, layer: &HashMap<u64, Vec<u8>>| -> KeyValuePage {
            let mut page = KeyValuePage::new(0, IndexType::Document, rev, &config);
            for (k, v) in layer {
                page.put(*k, Record::new(*k, v.clone())).unwrap();
            }
            page
        };

        let head = build(layers.len() as i32, &layers[0]);
        let full_leaves: Vec<KeyValuePage> =
            layers.iter().enumerate().map(|(i, l)| build((layers.len() - i) as i32, l)).collect();
        let full_combined = combine(RevisioningPolicy::Full, full_leaves.clone()).unwrap();
        let mut full_keys: Vec<u64> = full_combined.entries().map(|(k, _)| *k).collect();
        let mut head_keys: Vec<u64> = head.entries().map(|(k, _)| *k).collect();
        full_keys.sort_unstable();
        head_keys.sort_unstable();
        prop_assert_eq!(full_keys, head_keys);

        let incremental_leaves: Vec<KeyValuePage> =
            layers.iter().enumerate().map(|(i, l)| build((layers.len() - i) as i32, l)).collect();
        let combined = combine(RevisioningPolicy::Incremental, incremental_leaves).unwrap();

        let mut expected: HashMap<u64, Vec<u8>> = HashMap::new();
        for layer in layers.iter().rev() {
            for (k, v) in layer {
                expected.insert(*k, v.clone());
            }
        }

        let mut got: HashMap<u64, Vec<u8>> = HashMap::new();
        for (k, r) in combined.entries() {
            got.insert(*k, r.payload().to_vec());
        }
        prop_assert_eq!(got, expected);
    }
}
