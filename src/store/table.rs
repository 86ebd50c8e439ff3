use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Geometry;
use crate::store::key::{EntryPtr, Key, SlotRecord};
use crate::store::region::Region;

/// The cluster-chained, set-associative hash table over the slot half of the
/// memory region.
///
/// Keys hash into the main bucket region only. Within a bucket the first
/// `associativity - 1` slots hold data; the last slot is reserved for the
/// chain link, whose `vid` field names the next bucket in the indirect
/// region. Overflow buckets are slots in the same array, so the whole table
/// stays one contiguous region a remote peer can read byte-for-byte.
///
/// Inserts run under one of `num_locks` bucket stripes. A chain is only ever
/// extended at its tail while the stripe of its head bucket is held, and the
/// stripe is chosen from the primary bucket id, so two inserts racing for
/// the same key serialize and the duplicate check is meaningful. Lookups
/// take no locks: they are only legal once the build phases are over and the
/// table is immutable.
pub(crate) struct BucketTable {
    region: Arc<Region>,
    geo: Geometry,
    bucket_locks: Box<[Mutex<()>]>,
    last_ext: Mutex<u64>,
}

impl BucketTable {
    pub(crate) fn new(region: Arc<Region>, geo: Geometry, num_locks: usize) -> Self {
        Self {
            region,
            geo,
            bucket_locks: (0..num_locks).map(|_| Mutex::new(())).collect(),
            last_ext: Mutex::new(0),
        }
    }

    fn data_slots(&self) -> u64 {
        self.geo.associativity - 1
    }

    fn chain_bound(&self) -> u64 {
        self.geo.num_buckets_ext + 1
    }

    /// Inserts `key` and returns the slot id it now occupies. The caller
    /// stores the pointer word separately via [`BucketTable::set_ptr`].
    ///
    /// # Panics
    ///
    /// Panics on a duplicate key or when the indirect region runs out of
    /// overflow buckets; both mean corrupted input or an undersized table.
    pub(crate) fn insert(&self, key: Key) -> u64 {
        debug_assert!(!key.is_empty());
        let primary = key.hash() % self.geo.num_buckets;
        let stripe = (primary % self.bucket_locks.len() as u64) as usize;
        let _guard = self.bucket_locks[stripe].lock();

        let mut bucket = primary;
        let mut hops = 0u64;
        loop {
            assert!(
                hops < self.chain_bound(),
                "bucket chain from {} exceeds the indirect region",
                primary
            );
            hops += 1;

            let base = self.geo.bucket_first_slot(bucket);
            for slot in base..base + self.data_slots() {
                let word = self.region.load(self.geo.slot_key_word(slot));
                assert!(
                    word != key.packed(),
                    "duplicate key {:?} in slot {}",
                    key,
                    slot
                );
                if word == 0 {
                    self.region.store(self.geo.slot_key_word(slot), key.packed());
                    return slot;
                }
            }

            let chain = base + self.data_slots();
            let link = self.region.load(self.geo.slot_key_word(chain));
            if link != 0 {
                bucket = Key::from_packed(link).vid();
                continue;
            }

            // Tail of the chain: link in a fresh overflow bucket and place
            // the key in its first slot.
            let next = self.allocate_ext_bucket();
            self.region
                .store(self.geo.slot_key_word(chain), Key::link(next).packed());
            let slot = self.geo.bucket_first_slot(next);
            self.region.store(self.geo.slot_key_word(slot), key.packed());
            return slot;
        }
    }

    fn allocate_ext_bucket(&self) -> u64 {
        let mut last_ext = self.last_ext.lock();
        assert!(
            *last_ext < self.geo.num_buckets_ext,
            "indirect region exhausted: {} overflow buckets",
            self.geo.num_buckets_ext
        );
        let bucket = self.geo.num_buckets + *last_ext;
        *last_ext += 1;
        bucket
    }

    /// Stores the pointer word of `slot`.
    pub(crate) fn set_ptr(&self, slot: u64, ptr: EntryPtr) {
        self.region.store(self.geo.slot_ptr_word(slot), ptr.raw());
    }

    /// Walks the bucket chain for `key`. Lock-free; callers must not race
    /// with inserts.
    ///
    /// # Panics
    ///
    /// Panics when a chain fails to terminate within the indirect region.
    pub(crate) fn lookup(&self, key: Key) -> Option<SlotRecord> {
        let primary = key.hash() % self.geo.num_buckets;
        let mut bucket = primary;
        let mut hops = 0u64;
        loop {
            assert!(
                hops < self.chain_bound(),
                "bucket chain from {} exceeds the indirect region",
                primary
            );
            hops += 1;

            let base = self.geo.bucket_first_slot(bucket);
            for slot in base..base + self.data_slots() {
                if self.region.load(self.geo.slot_key_word(slot)) == key.packed() {
                    let ptr = self.region.load(self.geo.slot_ptr_word(slot));
                    return Some(SlotRecord {
                        key,
                        ptr: EntryPtr::from_raw(ptr),
                    });
                }
            }

            let link = self.region.load(self.geo.slot_key_word(base + self.data_slots()));
            if link == 0 {
                return None;
            }
            bucket = Key::from_packed(link).vid();
        }
    }

    /// Decodes the slot at `slot_id` as stored.
    pub(crate) fn slot(&self, slot_id: u64) -> SlotRecord {
        SlotRecord {
            key: Key::from_packed(self.region.load(self.geo.slot_key_word(slot_id))),
            ptr: EntryPtr::from_raw(self.region.load(self.geo.slot_ptr_word(slot_id))),
        }
    }

    /// Overflow buckets allocated so far.
    pub(crate) fn allocated_ext(&self) -> u64 {
        *self.last_ext.lock()
    }

    /// Occupied data slots across the bucket range `[from, to)`.
    pub(crate) fn used_data_slots(&self, from: u64, to: u64) -> u64 {
        let mut used = 0;
        for bucket in from..to {
            let base = self.geo.bucket_first_slot(bucket);
            for slot in base..base + self.data_slots() {
                if self.region.load(self.geo.slot_key_word(slot)) != 0 {
                    used += 1;
                }
            }
        }
        used
    }
}
