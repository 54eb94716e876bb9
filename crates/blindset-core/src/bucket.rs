//! Bucket distribution engine
//!
//! Partitions the owner's dataset into `B` buckets of equal length:
//!
//! 1. SHA-1 of the entry index (ASCII decimal), read big-endian, mod `B`
//! 2. Linear probing (wrapping) past buckets already holding `⌊N/B⌋ + 1` entries
//! 3. Padding with sentinel `(0, 0)` slots up to the longest bucket
//!
//! Slot positions are 1-based and follow insertion order. The same positions
//! address the universe points during setup, response and aggregation.
//!
//! Probing terminates because `B * (⌊N/B⌋ + 1) > N` for every `B >= 1`.

use std::collections::HashMap;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::LookupError;
use crate::store::KeyedStore;

/// One private bit owned by the data owner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetEntry {
    /// Universe index in `[1, N]`
    pub index: u64,
    pub bit: u8,
}

impl DatasetEntry {
    pub fn new(index: u64, bit: u8) -> Self {
        Self { index, bit }
    }
}

/// A bucket slot: a real entry or the `(0, 0)` sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub index: u64,
    pub bit: u8,
}

impl Slot {
    pub const SENTINEL: Slot = Slot { index: 0, bit: 0 };

    pub fn is_sentinel(&self) -> bool {
        self.index == 0
    }
}

impl From<DatasetEntry> for Slot {
    fn from(entry: DatasetEntry) -> Self {
        Self {
            index: entry.index,
            bit: entry.bit,
        }
    }
}

/// Where an entry landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRef {
    pub bucket_id: u64,
    /// 1-based position inside the bucket
    pub position: u64,
}

/// Padded buckets plus the reverse index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketTable {
    buckets: Vec<Vec<Slot>>,
    #[serde(skip)]
    locations: HashMap<u64, SlotRef>,
}

/// Candidate bucket for an index before probing
pub fn bucket_for_index(index: u64, num_buckets: usize) -> u64 {
    let digest = Sha1::digest(index.to_string().as_bytes());
    let value = BigUint::from_bytes_be(&digest) % BigUint::from(num_buckets);
    // Below num_buckets, so always fits
    value.to_u64_digits().first().copied().unwrap_or(0)
}

/// Distribute entries into `num_buckets` equal-length buckets.
///
/// Returns `None` when `num_buckets == 0`.
pub fn distribute_entries(entries: &[DatasetEntry], num_buckets: usize) -> Option<BucketTable> {
    if num_buckets == 0 {
        return None;
    }

    let capacity = entries.len() / num_buckets + 1;
    let mut buckets: Vec<Vec<Slot>> = vec![Vec::with_capacity(capacity); num_buckets];

    for entry in entries {
        let mut bucket_id = bucket_for_index(entry.index, num_buckets) as usize;
        while buckets[bucket_id].len() >= capacity {
            bucket_id = (bucket_id + 1) % num_buckets;
        }
        buckets[bucket_id].push(Slot::from(*entry));
    }

    let slot_len = buckets.iter().map(Vec::len).max().unwrap_or(0);
    for bucket in &mut buckets {
        bucket.resize(slot_len, Slot::SENTINEL);
    }

    tracing::debug!(
        entries = entries.len(),
        num_buckets,
        capacity,
        slot_len,
        "Distributed entries into buckets"
    );

    Some(BucketTable::from_buckets(buckets))
}

impl BucketTable {
    /// Build from already padded buckets
    pub fn from_buckets(buckets: Vec<Vec<Slot>>) -> Self {
        let mut table = Self {
            buckets,
            locations: HashMap::new(),
        };
        table.rebuild_locations();
        table
    }

    /// Rebuild the reverse index (called after construction or deserialization)
    pub fn rebuild_locations(&mut self) {
        self.locations.clear();
        for (bucket_id, bucket) in self.buckets.iter().enumerate() {
            for (offset, slot) in bucket.iter().enumerate() {
                if !slot.is_sentinel() {
                    self.locations.insert(
                        slot.index,
                        SlotRef {
                            bucket_id: bucket_id as u64,
                            position: offset as u64 + 1,
                        },
                    );
                }
            }
        }
    }

    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    /// Common length `L` of every bucket
    pub fn slot_len(&self) -> usize {
        self.buckets.first().map(Vec::len).unwrap_or(0)
    }

    pub fn bucket(&self, bucket_id: u64) -> Option<&[Slot]> {
        self.buckets.get(bucket_id as usize).map(Vec::as_slice)
    }

    /// `(bucket_id, slots)` in ascending bucket order
    pub fn iter(&self) -> impl Iterator<Item = (u64, &[Slot])> {
        self.buckets
            .iter()
            .enumerate()
            .map(|(id, slots)| (id as u64, slots.as_slice()))
    }

    /// Locate the slot holding a dataset index
    pub fn locate(&self, index: u64) -> Result<SlotRef, LookupError> {
        self.locations
            .get(&index)
            .copied()
            .ok_or(LookupError::NotFound(index))
    }

    /// All real entries in bucket order
    pub fn real_entries(&self) -> impl Iterator<Item = &Slot> {
        self.buckets
            .iter()
            .flatten()
            .filter(|slot| !slot.is_sentinel())
    }

    /// Publish the `index -> SlotRef` view used by the intermediary
    pub fn publish_lookup<S: KeyedStore<u64, SlotRef> + ?Sized>(&self, store: &S) {
        for (&index, &slot_ref) in &self.locations {
            store.put(index, slot_ref);
        }
    }

    /// Publish the `bucket_id -> slots` view used by the server
    pub fn publish_buckets<S: KeyedStore<u64, Vec<Slot>> + ?Sized>(&self, store: &S) {
        for (bucket_id, slots) in self.iter() {
            store.put(bucket_id, slots.to_vec());
        }
    }
}
