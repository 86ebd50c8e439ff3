use crate::error::{Result, StoreError};
use crate::store::{EDGE_BYTES, SLOT_BYTES};

/// Configuration options supplied when opening a [`crate::GraphStore`].
///
/// All replicas of a cluster must be built from options that resolve to the
/// same [`Geometry`], otherwise remote readers would address foreign slot
/// arrays with the wrong offsets.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Total slot budget of the hash table (rounded down to whole buckets).
    pub num_keys: u64,
    /// Size of the memory region backing the slot array and entry arena.
    pub memstore_bytes: usize,
    /// Number of servers the graph is partitioned across.
    pub num_servers: usize,
    /// This replica's server id.
    pub sid: usize,
    /// Slots per bucket; the last slot of each bucket is the chain link.
    pub associativity: u64,
    /// Percentage of buckets placed in the main (primary) region.
    pub main_ratio: u64,
    /// Number of bucket lock stripes used during build.
    pub num_locks: usize,
    /// Number of reader threads the remote path reserves scratch buffers for.
    pub num_threads: usize,
    /// Whether remote lookups memoize slot records.
    pub enable_caching: bool,
    /// Number of direct-mapped cache slots.
    pub cache_capacity: usize,
    /// Whether the build additionally materializes per-vertex predicate
    /// lists and the all-vertices / all-predicates index sets.
    pub versatile: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            num_keys: 1 << 20,
            memstore_bytes: 64 << 20,
            num_servers: 1,
            sid: 0,
            associativity: 8,
            main_ratio: 80,
            num_locks: 1024,
            num_threads: 16,
            enable_caching: false,
            cache_capacity: 100_000,
            versatile: false,
        }
    }
}

impl StoreOptions {
    /// Creates options with the given slot budget and region size.
    pub fn new(num_keys: u64, memstore_bytes: usize) -> Self {
        Self {
            num_keys,
            memstore_bytes,
            ..Self::default()
        }
    }

    /// Sets the cluster size.
    pub fn num_servers(mut self, n: usize) -> Self {
        self.num_servers = n;
        self
    }

    /// Sets this replica's server id.
    pub fn sid(mut self, sid: usize) -> Self {
        self.sid = sid;
        self
    }

    /// Sets the slots-per-bucket count.
    pub fn associativity(mut self, slots: u64) -> Self {
        self.associativity = slots;
        self
    }

    /// Sets the main-region percentage.
    pub fn main_ratio(mut self, pct: u64) -> Self {
        self.main_ratio = pct;
        self
    }

    /// Sets the bucket lock stripe count.
    pub fn num_locks(mut self, n: usize) -> Self {
        self.num_locks = n;
        self
    }

    /// Sets the reader thread budget.
    pub fn num_threads(mut self, n: usize) -> Self {
        self.num_threads = n;
        self
    }

    /// Enables or disables the remote lookup cache.
    pub fn enable_caching(mut self, enabled: bool) -> Self {
        self.enable_caching = enabled;
        self
    }

    /// Sets the remote lookup cache capacity.
    pub fn cache_capacity(mut self, slots: usize) -> Self {
        self.cache_capacity = slots;
        self
    }

    /// Enables or disables versatile-mode index material.
    pub fn versatile(mut self, enabled: bool) -> Self {
        self.versatile = enabled;
        self
    }
}

/// Resolved sizing of the memory region: how many slots, buckets and entries
/// the store lays out. Identical options resolve to identical geometry on
/// every replica, which is what makes remote bucket addressing possible.
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    /// Total slots, main and indirect regions together.
    pub num_slots: u64,
    /// Primary buckets; keys hash into this range only.
    pub num_buckets: u64,
    /// Overflow buckets in the indirect region.
    pub num_buckets_ext: u64,
    /// Capacity of the entry arena, in edge entries.
    pub num_entries: u64,
    /// Slots per bucket.
    pub associativity: u64,
}

impl Geometry {
    pub(crate) fn resolve(opts: &StoreOptions, region_bytes: usize) -> Result<Self> {
        if opts.associativity < 2 {
            return Err(StoreError::Config(format!(
                "associativity {} leaves no data slots",
                opts.associativity
            )));
        }
        if opts.main_ratio == 0 || opts.main_ratio > 100 {
            return Err(StoreError::Config(format!(
                "main_ratio {} is not a percentage in 1..=100",
                opts.main_ratio
            )));
        }
        if opts.num_servers == 0 {
            return Err(StoreError::Config("num_servers must be at least 1".into()));
        }
        if opts.sid >= opts.num_servers {
            return Err(StoreError::Config(format!(
                "sid {} outside cluster of {} servers",
                opts.sid, opts.num_servers
            )));
        }
        if opts.num_locks == 0 || opts.num_threads == 0 {
            return Err(StoreError::Config(
                "num_locks and num_threads must be at least 1".into(),
            ));
        }

        let buckets_total = opts.num_keys / opts.associativity;
        let num_buckets = buckets_total * opts.main_ratio / 100;
        if num_buckets == 0 {
            return Err(StoreError::Config(format!(
                "{} keys resolve to an empty main region",
                opts.num_keys
            )));
        }
        let num_buckets_ext = buckets_total - num_buckets;
        let num_slots = buckets_total * opts.associativity;

        let slot_bytes = num_slots * SLOT_BYTES as u64;
        if region_bytes as u64 <= slot_bytes {
            return Err(StoreError::Config(format!(
                "{} byte region cannot hold a {} byte slot array",
                region_bytes, slot_bytes
            )));
        }
        let num_entries = (region_bytes as u64 - slot_bytes) / EDGE_BYTES as u64;
        if num_entries == 0 {
            return Err(StoreError::Config(
                "region leaves no room for the entry arena".into(),
            ));
        }

        Ok(Self {
            num_slots,
            num_buckets,
            num_buckets_ext,
            num_entries,
            associativity: opts.associativity,
        })
    }

    /// Total buckets across the main and indirect regions.
    pub fn total_buckets(&self) -> u64 {
        self.num_buckets + self.num_buckets_ext
    }

    /// Size of the slot array in bytes; the entry arena starts here.
    pub fn slot_region_bytes(&self) -> u64 {
        self.num_slots * SLOT_BYTES as u64
    }

    /// First slot id of `bucket`.
    pub(crate) fn bucket_first_slot(&self, bucket: u64) -> u64 {
        bucket * self.associativity
    }

    /// Byte offset of `bucket` within the region, as addressed remotely.
    pub(crate) fn bucket_byte_off(&self, bucket: u64) -> u64 {
        bucket * self.associativity * SLOT_BYTES as u64
    }

    /// Byte offset of entry `off`, as addressed remotely.
    pub(crate) fn entry_byte_off(&self, off: u64) -> u64 {
        self.slot_region_bytes() + off * EDGE_BYTES as u64
    }

    /// Word index of the key word of `slot`.
    pub(crate) fn slot_key_word(&self, slot: u64) -> u64 {
        debug_assert!(slot < self.num_slots);
        slot * 2
    }

    /// Word index of the pointer word of `slot`.
    pub(crate) fn slot_ptr_word(&self, slot: u64) -> u64 {
        debug_assert!(slot < self.num_slots);
        slot * 2 + 1
    }

    /// Word index of entry `off` in the arena.
    pub(crate) fn entry_word(&self, off: u64) -> u64 {
        debug_assert!(off < self.num_entries);
        self.num_slots * 2 + off
    }
}
